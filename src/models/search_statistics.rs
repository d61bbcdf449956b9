use serde::{Deserialize, Serialize};

use crate::models::record::Record;

/// 搜索结果汇总统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    /// 匹配记录数
    #[serde(rename = "matchedCount")]
    pub matched_count: usize,
    /// 文件大小合计（字节，浮点累加以容纳超宽数值）
    #[serde(rename = "totalSize")]
    pub total_size: f64,
    /// 传输耗时合计（秒）
    #[serde(rename = "totalDuration")]
    pub total_duration: f64,
    /// 第一条匹配记录的时间戳，设置后不再改变
    #[serde(rename = "earliestTimestamp")]
    pub earliest_timestamp: Option<u64>,
    /// 最近一条匹配记录的时间戳
    #[serde(rename = "latestTimestamp")]
    pub latest_timestamp: Option<u64>,
}

impl SummaryStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// 由一组记录直接计算
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a Record>) -> Self {
        let mut stats = Self::new();
        for record in records {
            stats.add(record);
        }
        stats
    }

    /// 折叠一条记录
    pub fn add(&mut self, record: &Record) {
        self.matched_count += 1;
        self.total_size += record.size as f64;
        self.total_duration += record.duration;
        if self.earliest_timestamp.is_none() {
            self.earliest_timestamp = Some(record.timestamp);
        }
        self.latest_timestamp = Some(record.timestamp);
    }

    /// 平均传输速率（字节/秒），没有耗时时为 0
    pub fn average_rate(&self) -> f64 {
        if self.total_duration > 0.0 {
            self.total_size / self.total_duration
        } else {
            0.0
        }
    }
}
