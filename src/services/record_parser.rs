//! 记录解析器
//!
//! 在内存映射的字节缓冲区上解码日志行。所有访问都经过边界检查，
//! 字段推进通过 [`scan_field`] / [`FieldCursor`] 完成，不做裸指针运算。
//!
//! 数值字段采用十六进制文本。宽度超过阈值的数值按浮点有损转换，
//! 这是日志格式的既有限制，解析结果必须与写入方保持一致。

use std::time::{SystemTime, UNIX_EPOCH};

use crate::models::record::{
    ArchiveState, Protocol, Record, FILE_NAME_OFFSET, HOST_OFFSET, LINE_TERMINATOR,
    LOG_DATE_LENGTH, MAX_HOSTNAME_LENGTH, PROTOCOL_OFFSET, SEPARATOR_CHAR,
};

/// 精确解析的最大十六进制位数（不含）
const EXACT_HEX_DIGITS: usize = 9;
/// 有损解析的最大十六进制位数（含），更宽的数值视为无穷大
const LOSSY_HEX_DIGITS: usize = 20;
/// 归档删除时间前的宽限秒数
const PENDING_DELETION_MARGIN: u64 = 5;

/**
 * 从 `pos` 开始扫描一个字段
 *
 * 字段以分隔符、行终止符或缓冲区末尾结束。返回字段文本和下一个位置：
 * 遇到分隔符时跳过分隔符，遇到行终止符或末尾时停在该处。
 */
pub fn scan_field(buf: &[u8], pos: usize) -> (&[u8], usize) {
    let pos = pos.min(buf.len());
    let end = buf[pos..]
        .iter()
        .position(|&b| b == SEPARATOR_CHAR || b == LINE_TERMINATOR)
        .map_or(buf.len(), |i| pos + i);
    let next = if end < buf.len() && buf[end] == SEPARATOR_CHAR {
        end + 1
    } else {
        end
    };
    (&buf[pos..end], next)
}

/// 行内字段游标
#[derive(Debug, Clone)]
pub struct FieldCursor<'a> {
    buf: &'a [u8],
    pos: usize,
    exhausted: bool,
}

impl<'a> FieldCursor<'a> {
    pub fn new(buf: &'a [u8], pos: usize) -> Self {
        Self {
            buf,
            pos: pos.min(buf.len()),
            exhausted: false,
        }
    }

    /// 当前位置（下一个字段的起点）
    pub fn position(&self) -> usize {
        self.pos
    }

    /// 读取下一个字段，行结束后返回 `None`
    pub fn next_field(&mut self) -> Option<&'a [u8]> {
        if self.exhausted {
            return None;
        }
        let (text, next) = scan_field(self.buf, self.pos);
        if next == self.pos + text.len() {
            // 没有跳过分隔符，说明本行已经结束
            self.exhausted = true;
        }
        self.pos = next;
        Some(text)
    }
}

/// 判断归档状态所需的时间参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveClock {
    /// 当前时间（Unix 秒）
    pub now: u64,
    /// 归档保留步长（秒）
    pub step_time: u64,
}

impl ArchiveClock {
    pub fn new(now: u64, step_time: u64) -> Self {
        Self { now, step_time }
    }

    /// 以系统当前时间构造
    pub fn system(step_time: u64) -> Self {
        Self::new(unix_now(), step_time)
    }

    pub fn classify(&self, archive_path: Option<&str>) -> ArchiveState {
        let Some(path) = archive_path else {
            return ArchiveState::NotArchived;
        };
        let Some(delete_time) = archive_delete_time(path) else {
            return ArchiveState::Present;
        };
        if self.now > delete_time.saturating_add(self.step_time) {
            ArchiveState::Deleted
        } else if self.now > delete_time.saturating_sub(PENDING_DELETION_MARGIN) {
            ArchiveState::PendingDeletion
        } else {
            ArchiveState::Present
        }
    }
}

/// 当前 Unix 时间（秒）
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// 解码后的一行：记录本身及其在缓冲区中的位置信息
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedLine {
    pub record: Record,
    /// 行起始偏移
    pub line_start: usize,
    /// 作业 ID 字段的偏移
    pub job_id_offset: usize,
    /// 下一行的起始偏移
    pub next_line: usize,
}

/// 解码 `line_start` 处的记录；归档状态由调用方给出的时钟（含配置的保留步长）判断
pub fn decode_record(buf: &[u8], line_start: usize, clock: &ArchiveClock) -> Record {
    decode_line(buf, line_start, clock).record
}

/**
 * 解码一整行
 *
 * 格式错误不会失败：缺失或无法解析的数值为 0，缺失的文本字段为空。
 */
pub fn decode_line(buf: &[u8], line_start: usize, clock: &ArchiveClock) -> DecodedLine {
    let line_start = line_start.min(buf.len());
    let line_end = line_end(buf, line_start);
    let line = &buf[line_start..line_end];
    let next_line = if line_end < buf.len() {
        line_end + 1
    } else {
        line_end
    };

    let timestamp = parse_hex_u64(&line[..LOG_DATE_LENGTH.min(line.len())]);
    let host = line
        .get(HOST_OFFSET..(HOST_OFFSET + MAX_HOSTNAME_LENGTH).min(line.len()))
        .map(|h| lossy(h).trim_end().to_string())
        .unwrap_or_default();
    let protocol = line
        .get(PROTOCOL_OFFSET)
        .map_or(Protocol::Unknown, |&c| Protocol::from_code(c));

    let mut cursor = FieldCursor::new(line, FILE_NAME_OFFSET);
    let local_name = cursor.next_field().map(lossy).unwrap_or_default();
    let remote_name = cursor.next_field().filter(|f| !f.is_empty()).map(lossy);
    let size = parse_hex_u64(cursor.next_field().unwrap_or_default());
    let duration = parse_decimal(cursor.next_field().unwrap_or_default());
    let job_id_offset = line_start + cursor.position();
    let job_id = parse_hex_u64(cursor.next_field().unwrap_or_default()) as u32;
    let unique_name = cursor.next_field().filter(|f| !f.is_empty()).map(lossy);
    let archive_path = cursor.next_field().filter(|f| !f.is_empty()).map(lossy);
    let archive_state = clock.classify(archive_path.as_deref());

    DecodedLine {
        record: Record {
            timestamp,
            host,
            protocol,
            local_name,
            remote_name,
            size,
            duration,
            job_id,
            unique_name,
            archive_path,
            archive_state,
        },
        line_start,
        job_id_offset,
        next_line,
    }
}

/// 只读取行首的时间戳
pub fn read_timestamp(buf: &[u8], line_start: usize) -> u64 {
    let start = line_start.min(buf.len());
    let end = (start + LOG_DATE_LENGTH).min(buf.len());
    parse_hex_u64(&buf[start..end])
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn hex_digits(text: &[u8]) -> &[u8] {
    let start = text.iter().position(|b| *b != b' ').unwrap_or(text.len());
    let text = &text[start..];
    let len = text
        .iter()
        .position(|b| !b.is_ascii_hexdigit())
        .unwrap_or(text.len());
    &text[..len]
}

fn hex_value(digit: u8) -> u64 {
    match digit {
        b'0'..=b'9' => (digit - b'0') as u64,
        b'a'..=b'f' => (digit - b'a' + 10) as u64,
        b'A'..=b'F' => (digit - b'A' + 10) as u64,
        _ => 0,
    }
}

/**
 * 按日志格式的规则解析十六进制数值，结果为浮点
 *
 * - 没有数字：0
 * - 少于 9 位：精确
 * - 9 到 20 位：经浮点有损转换
 * - 超过 20 位：正无穷
 */
pub fn parse_hex_lossy(text: &[u8]) -> f64 {
    let digits = hex_digits(text);
    if digits.is_empty() {
        0.0
    } else if digits.len() < EXACT_HEX_DIGITS {
        digits.iter().fold(0u64, |acc, &d| acc * 16 + hex_value(d)) as f64
    } else if digits.len() <= LOSSY_HEX_DIGITS {
        digits
            .iter()
            .fold(0.0f64, |acc, &d| acc * 16.0 + hex_value(d) as f64)
    } else {
        f64::INFINITY
    }
}

/// 十六进制数值，超出范围时饱和到 `u64::MAX`
pub fn parse_hex_u64(text: &[u8]) -> u64 {
    let digits = hex_digits(text);
    if digits.len() < EXACT_HEX_DIGITS {
        digits.iter().fold(0u64, |acc, &d| acc * 16 + hex_value(d))
    } else {
        // `as` 转换对无穷大和越界值饱和
        parse_hex_lossy(digits) as u64
    }
}

/// 十进制浮点数，无法解析时为 0
pub fn parse_decimal(text: &[u8]) -> f64 {
    std::str::from_utf8(text)
        .ok()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// 归档路径中第三个未转义的 `/` 之后、`_` 之前的删除时间
fn archive_delete_time(path: &str) -> Option<u64> {
    let bytes = path.as_bytes();
    let mut slashes = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'/' => {
                slashes += 1;
                if slashes == 3 {
                    let rest = &bytes[i + 1..];
                    let end = rest.iter().position(|&b| b == b'_')?;
                    let digits = &rest[..end];
                    if digits.is_empty() || !digits.iter().all(u8::is_ascii_hexdigit) {
                        return None;
                    }
                    return Some(parse_hex_u64(digits));
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// 行终止符位置（不含），没有终止符时为缓冲区末尾
pub fn line_end(buf: &[u8], line_start: usize) -> usize {
    let start = line_start.min(buf.len());
    buf[start..]
        .iter()
        .position(|&b| b == LINE_TERMINATOR)
        .map_or(buf.len(), |i| start + i)
}

/// `pos` 处或之后的第一个行首；没有时为缓冲区末尾
pub fn next_line_start(buf: &[u8], pos: usize) -> usize {
    if pos == 0 {
        return 0;
    }
    let pos = pos.min(buf.len());
    if buf[pos - 1] == LINE_TERMINATOR {
        return pos;
    }
    let end = line_end(buf, pos);
    if end < buf.len() {
        end + 1
    } else {
        buf.len()
    }
}

/// `pos` 之前那一行的行首（`pos` 应为行首）
pub fn prev_line_start(buf: &[u8], pos: usize) -> usize {
    let pos = pos.min(buf.len());
    if pos <= 1 {
        return 0;
    }
    buf[..pos - 1]
        .iter()
        .rposition(|&b| b == LINE_TERMINATOR)
        .map_or(0, |i| i + 1)
}

/// 完整行数据的末尾：最后一个行终止符之后的位置
pub fn data_end(buf: &[u8]) -> usize {
    buf.iter()
        .rposition(|&b| b == LINE_TERMINATOR)
        .map_or(0, |i| i + 1)
}

/// 按写入方格式生成一行（含行终止符）
pub fn format_record_line(record: &Record) -> String {
    let host: String = record.host.chars().take(MAX_HOSTNAME_LENGTH).collect();
    let mut line = format!(
        "{:<date$x} {:<host_len$} {} {}|{}|{:x}|{:.2}|{:x}",
        record.timestamp,
        host,
        record.protocol.code() as char,
        record.local_name,
        record.remote_name.as_deref().unwrap_or(""),
        record.size,
        record.duration,
        record.job_id,
        date = LOG_DATE_LENGTH,
        host_len = MAX_HOSTNAME_LENGTH,
    );
    if record.unique_name.is_some() || record.archive_path.is_some() {
        line.push(SEPARATOR_CHAR as char);
        line.push_str(record.unique_name.as_deref().unwrap_or(""));
    }
    if let Some(archive) = &record.archive_path {
        line.push(SEPARATOR_CHAR as char);
        line.push_str(archive);
    }
    line.push(LINE_TERMINATOR as char);
    line
}
