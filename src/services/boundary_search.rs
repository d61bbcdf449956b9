//! 时间边界搜索
//!
//! 在一个分段的完整行范围内二分查找第一条时间戳不小于目标的记录。
//! 记录长度不固定，每次取中点后向前对齐到下一个行首。
//! 假定分段内时间戳单调不减；乱序时结果是尽力而为的。

use crate::services::record_parser::{next_line_start, prev_line_start, read_timestamp};

/**
 * 返回 `[0, end)` 中第一条时间戳 `>= target` 的行首
 *
 * # 参数
 * * `buf` - 分段内容
 * * `end` - 完整行数据的末尾（必须是行首或缓冲区末尾）
 * * `target` - 目标时间戳；`None` 时返回 `end`
 *
 * 目标不大于第一条记录时返回 0，大于最后一条记录时返回 `end`。
 */
pub fn find_boundary(buf: &[u8], end: usize, target: Option<u64>) -> usize {
    let Some(target) = target else {
        return end;
    };
    let end = end.min(buf.len());
    if end == 0 || read_timestamp(buf, 0) >= target {
        return 0;
    }
    let last = prev_line_start(buf, end);
    if read_timestamp(buf, last) < target {
        return end;
    }

    // 不变式：ts(lo) < target <= ts(hi)，lo < hi 均为行首
    let mut lo = 0;
    let mut hi = last;
    loop {
        let after_lo = next_line_start(buf, lo + 1);
        if after_lo >= hi {
            return hi;
        }
        let mut mid = next_line_start(buf, lo + (hi - lo) / 2);
        if mid <= lo || mid >= hi {
            mid = after_lo;
        }
        if read_timestamp(buf, mid) >= target {
            hi = mid;
        } else {
            lo = mid;
        }
    }
}

/**
 * 闭区间时间窗口对应的字节范围 `[start, end)`
 *
 * 结束边界取 `time_end + 1` 的位置，使时间戳等于 `time_end` 的记录包含在内。
 */
pub fn window_range(
    buf: &[u8],
    data_end: usize,
    time_start: Option<u64>,
    time_end: Option<u64>,
) -> (usize, usize) {
    let start = match time_start {
        Some(_) => find_boundary(buf, data_end, time_start),
        None => 0,
    };
    let end = find_boundary(buf, data_end, time_end.and_then(|t| t.checked_add(1)));
    (start, end.max(start))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn segment(timestamps: &[u64]) -> (Vec<u8>, Vec<usize>) {
        let mut buf = Vec::new();
        let mut starts = Vec::new();
        for (i, ts) in timestamps.iter().enumerate() {
            starts.push(buf.len());
            // 不同长度的行
            buf.extend_from_slice(format!("{:<10x} h {}\n", ts, "x".repeat(i % 5)).as_bytes());
        }
        (buf, starts)
    }

    #[rstest]
    #[case(None, 3)]
    #[case(Some(50), 0)]
    #[case(Some(100), 0)]
    #[case(Some(150), 1)]
    #[case(Some(200), 1)]
    #[case(Some(201), 2)]
    #[case(Some(300), 2)]
    #[case(Some(301), 3)]
    fn test_find_boundary(#[case] target: Option<u64>, #[case] expected_line: usize) {
        let (buf, starts) = segment(&[100, 200, 300]);
        let expected = starts.get(expected_line).copied().unwrap_or(buf.len());
        assert_eq!(find_boundary(&buf, buf.len(), target), expected);
    }

    #[test]
    fn test_duplicate_timestamps_return_first() {
        let (buf, starts) = segment(&[100, 200, 200, 200, 200, 300]);
        assert_eq!(find_boundary(&buf, buf.len(), Some(200)), starts[1]);
        assert_eq!(find_boundary(&buf, buf.len(), Some(201)), starts[5]);
    }

    #[test]
    fn test_empty_segment() {
        assert_eq!(find_boundary(b"", 0, Some(10)), 0);
        assert_eq!(find_boundary(b"", 0, None), 0);
    }

    #[test]
    fn test_window_range_is_inclusive() {
        let (buf, starts) = segment(&[100, 200, 300, 400]);
        let (start, end) = window_range(&buf, buf.len(), Some(150), Some(300));
        assert_eq!(start, starts[1]);
        assert_eq!(end, starts[3]);

        let (start, end) = window_range(&buf, buf.len(), None, None);
        assert_eq!((start, end), (0, buf.len()));

        let (start, end) = window_range(&buf, buf.len(), Some(500), Some(600));
        assert_eq!(start, end);
    }
}
