//! 传输日志记录模型
//!
//! 定义输出日志的行布局常量、协议类型、归档状态以及解码后的记录结构。
//! 行布局是与日志写入进程共享的固定协议，必须逐字节保持一致：
//!
//! ```text
//! <时间戳 hex, 10 位><SP><主机名, 8 位><SP><协议><SP><本地文件名>|<远端文件名>|<大小 hex>|<耗时>|<作业 ID hex>[|<唯一名>[|<归档路径>]]\n
//! ```

use serde::{Deserialize, Serialize};

/// 时间戳字段宽度（十六进制字符，右侧空格填充）
pub const LOG_DATE_LENGTH: usize = 10;
/// 主机名字段宽度（截断/空格填充）
pub const MAX_HOSTNAME_LENGTH: usize = 8;
/// 字段分隔符
pub const SEPARATOR_CHAR: u8 = b'|';
/// 行终止符
pub const LINE_TERMINATOR: u8 = b'\n';

/// 主机名在行内的偏移
pub const HOST_OFFSET: usize = LOG_DATE_LENGTH + 1;
/// 协议代码在行内的偏移
pub const PROTOCOL_OFFSET: usize = HOST_OFFSET + MAX_HOSTNAME_LENGTH + 1;
/// 本地文件名在行内的偏移
pub const FILE_NAME_OFFSET: usize = PROTOCOL_OFFSET + 2;

/// 传输协议
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    Ftp,
    Loc,
    Smtp,
    Map,
    Wmo,
    Http,
    Scp,
    Sftp,
    Ftps,
    Https,
    Smtps,
    Unknown,
}

impl Protocol {
    pub const ALL: [Protocol; 11] = [
        Protocol::Ftp,
        Protocol::Loc,
        Protocol::Smtp,
        Protocol::Map,
        Protocol::Wmo,
        Protocol::Http,
        Protocol::Scp,
        Protocol::Sftp,
        Protocol::Ftps,
        Protocol::Https,
        Protocol::Smtps,
    ];

    /// 从日志中的协议代码字符解析
    pub fn from_code(code: u8) -> Self {
        match code {
            b'0' => Protocol::Ftp,
            b'1' => Protocol::Loc,
            b'2' => Protocol::Smtp,
            b'3' => Protocol::Map,
            b'4' => Protocol::Wmo,
            b'5' => Protocol::Http,
            b'6' => Protocol::Scp,
            b'7' => Protocol::Sftp,
            b'8' => Protocol::Ftps,
            b'9' => Protocol::Https,
            b'a' | b'A' => Protocol::Smtps,
            _ => Protocol::Unknown,
        }
    }

    /// 写入日志时使用的协议代码字符
    pub fn code(self) -> u8 {
        match self {
            Protocol::Ftp => b'0',
            Protocol::Loc => b'1',
            Protocol::Smtp => b'2',
            Protocol::Map => b'3',
            Protocol::Wmo => b'4',
            Protocol::Http => b'5',
            Protocol::Scp => b'6',
            Protocol::Sftp => b'7',
            Protocol::Ftps => b'8',
            Protocol::Https => b'9',
            Protocol::Smtps => b'a',
            Protocol::Unknown => b'?',
        }
    }

    /// 协议在显示掩码中的位
    pub fn mask_bit(self) -> u32 {
        match self {
            Protocol::Ftp => 1,
            Protocol::Loc => 2,
            Protocol::Http => 4,
            Protocol::Smtp => 8,
            Protocol::Scp => 16,
            Protocol::Wmo => 32,
            Protocol::Map => 64,
            Protocol::Ftps => 128,
            Protocol::Https => 256,
            Protocol::Smtps => 512,
            Protocol::Sftp => 1024,
            Protocol::Unknown => 0,
        }
    }

    /// 固定宽度的显示标签
    pub fn label(self) -> &'static str {
        match self {
            Protocol::Ftp => "FTP  ",
            Protocol::Loc => "FILE ",
            Protocol::Smtp => "SMTP ",
            Protocol::Map => "MAP  ",
            Protocol::Wmo => "WMO  ",
            Protocol::Http => "HTTP ",
            Protocol::Scp => "SCP  ",
            Protocol::Sftp => "SFTP ",
            Protocol::Ftps => "FTPS ",
            Protocol::Https => "HTTPS",
            Protocol::Smtps => "SMTPS",
            Protocol::Unknown => "?    ",
        }
    }
}

/// 协议显示掩码
///
/// 未知协议不受掩码限制，总是显示。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolMask(pub u32);

impl ProtocolMask {
    pub const ALL: ProtocolMask = ProtocolMask(2047);
    pub const NONE: ProtocolMask = ProtocolMask(0);

    pub fn only(protocols: &[Protocol]) -> Self {
        ProtocolMask(protocols.iter().fold(0, |acc, p| acc | p.mask_bit()))
    }

    pub fn with(self, protocol: Protocol) -> Self {
        ProtocolMask(self.0 | protocol.mask_bit())
    }

    pub fn without(self, protocol: Protocol) -> Self {
        ProtocolMask(self.0 & !protocol.mask_bit())
    }

    pub fn allows(self, protocol: Protocol) -> bool {
        protocol == Protocol::Unknown || self.0 & protocol.mask_bit() != 0
    }
}

impl Default for ProtocolMask {
    fn default() -> Self {
        ProtocolMask::ALL
    }
}

/// 归档状态
///
/// 消费方必须区分显示这四种状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveState {
    /// 没有归档字段
    NotArchived,
    /// 已归档，仍在保留期内
    Present,
    /// 已到删除时间附近，可能正在被删除
    PendingDeletion,
    /// 已超过保留期，归档已删除
    Deleted,
}

impl ArchiveState {
    /// 单字符标志（N/Y/?/D）
    pub fn flag(self) -> char {
        match self {
            ArchiveState::NotArchived => 'N',
            ArchiveState::Present => 'Y',
            ArchiveState::PendingDeletion => '?',
            ArchiveState::Deleted => 'D',
        }
    }

    pub fn is_archived(self) -> bool {
        self != ArchiveState::NotArchived
    }
}

/// 一条传输日志记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// 传输完成时间（Unix 秒）
    pub timestamp: u64,
    /// 目标主机别名（已去除填充空格）
    pub host: String,
    pub protocol: Protocol,
    pub local_name: String,
    pub remote_name: Option<String>,
    /// 文件大小（超宽数值已饱和）
    pub size: u64,
    /// 传输耗时（秒）
    pub duration: f64,
    pub job_id: u32,
    pub unique_name: Option<String>,
    pub archive_path: Option<String>,
    pub archive_state: ArchiveState,
}

impl Record {
    /// 根据显示开关选择文件名：远端名不存在时回退到本地名
    pub fn display_name(&self, remote: bool) -> &str {
        match (&self.remote_name, remote) {
            (Some(name), true) => name,
            _ => &self.local_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_offsets() {
        assert_eq!(HOST_OFFSET, 11);
        assert_eq!(PROTOCOL_OFFSET, 20);
        assert_eq!(FILE_NAME_OFFSET, 22);
    }

    #[test]
    fn test_protocol_codes_are_consistent() {
        for protocol in Protocol::ALL {
            assert_eq!(Protocol::from_code(protocol.code()), protocol);
            assert_ne!(protocol.mask_bit(), 0);
        }
        assert_eq!(Protocol::from_code(b'z'), Protocol::Unknown);
    }

    #[test]
    fn test_mask_allows_unknown() {
        let mask = ProtocolMask::only(&[Protocol::Ftp]);
        assert!(mask.allows(Protocol::Ftp));
        assert!(!mask.allows(Protocol::Smtp));
        assert!(mask.allows(Protocol::Unknown));
        assert!(ProtocolMask::NONE.allows(Protocol::Unknown));
        assert!(mask.with(Protocol::Smtp).allows(Protocol::Smtp));
        assert!(!ProtocolMask::ALL.without(Protocol::Sftp).allows(Protocol::Sftp));
    }

    #[test]
    fn test_archive_flags() {
        assert_eq!(ArchiveState::NotArchived.flag(), 'N');
        assert_eq!(ArchiveState::Present.flag(), 'Y');
        assert_eq!(ArchiveState::PendingDeletion.flag(), '?');
        assert_eq!(ArchiveState::Deleted.flag(), 'D');
        assert!(!ArchiveState::NotArchived.is_archived());
        assert!(ArchiveState::Deleted.is_archived());
    }
}
