use crate::models::{record::Record, search_statistics::SummaryStats};

/// 把一个批次折叠进已有统计
///
/// 代价只与批次大小有关，与已累计的匹配数无关。
pub fn fold_batch(stats: &mut SummaryStats, batch: &[Record]) {
    for record in batch {
        stats.add(record);
    }
}

/// 计算一组记录的统计（用于选中项汇总）
pub fn summarize<'a>(records: impl IntoIterator<Item = &'a Record>) -> SummaryStats {
    SummaryStats::from_records(records)
}
