//! 谓词过滤提取器
//!
//! 在 `[pos, end)` 的完整行范围内逐行解码并应用组合谓词，
//! 每次调用最多产出一个批次。批次的记录和索引一起返回，由调用方整体提交，
//! 因此在批次之间取消时已提交的结果总是一致的。

use tracing::trace;

use crate::error::Result;
use crate::models::item_list::ItemList;
use crate::models::record::Record;
use crate::services::predicate::{CompiledPredicate, JobLookup};
use crate::services::record_parser::{decode_line, ArchiveClock};

/// 单个批次的上限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    /// 最多匹配记录数
    pub max_matches: usize,
    /// 最多扫描行数
    pub max_scanned: usize,
}

impl BatchLimits {
    pub fn new(max_matches: usize, max_scanned: usize) -> Self {
        Self {
            max_matches: max_matches.max(1),
            max_scanned: max_scanned.max(1),
        }
    }

    /// 在列表上限剩余量内收紧匹配数
    pub fn capped(self, remaining: Option<usize>) -> Self {
        match remaining {
            Some(remaining) => Self {
                max_matches: self.max_matches.min(remaining),
                ..self
            },
            None => self,
        }
    }
}

/// 一个批次的结果
#[derive(Debug, Clone, Default)]
pub struct ExtractedBatch {
    pub records: Vec<Record>,
    pub items: ItemList,
    /// 下一次扫描的起点
    pub next_pos: usize,
    pub scanned: usize,
}

impl ExtractedBatch {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/**
 * 提取器
 *
 * 持有编译后的谓词、作业关联和归档时钟；本身不保存扫描位置。
 */
pub struct Extractor<'a> {
    predicate: &'a CompiledPredicate,
    jobs: &'a dyn JobLookup,
    clock: ArchiveClock,
}

impl<'a> Extractor<'a> {
    pub fn new(predicate: &'a CompiledPredicate, jobs: &'a dyn JobLookup, clock: ArchiveClock) -> Self {
        Self {
            predicate,
            jobs,
            clock,
        }
    }

    /**
     * 从 `pos` 开始提取一个批次
     *
     * `end` 必须是行首（通常是完整行数据的末尾或时间边界）。
     * 达到匹配上限、扫描上限或 `end` 时停止。作业关联失败时整个批次作废。
     */
    pub fn extract(&self, buf: &[u8], pos: usize, end: usize, limits: BatchLimits) -> Result<ExtractedBatch> {
        let end = end.min(buf.len());
        let mut batch = ExtractedBatch {
            next_pos: pos,
            ..Default::default()
        };

        while batch.next_pos < end
            && batch.records.len() < limits.max_matches
            && batch.scanned < limits.max_scanned
        {
            let line = decode_line(buf, batch.next_pos, &self.clock);
            if line.next_line <= batch.next_pos {
                break;
            }
            batch.next_pos = line.next_line.min(end);
            batch.scanned += 1;

            if self.predicate.matches(&line.record, self.jobs)? {
                batch.items.push(
                    line.line_start,
                    line.job_id_offset,
                    line.record.archive_state.is_archived(),
                );
                batch.records.push(line.record);
            }
        }

        trace!(
            scanned = batch.scanned,
            matched = batch.records.len(),
            next_pos = batch.next_pos,
            "Extracted batch"
        );
        Ok(batch)
    }

    /// 提取整个范围，不分批
    pub fn extract_all(&self, buf: &[u8], pos: usize, end: usize) -> Result<ExtractedBatch> {
        self.extract(buf, pos, end, BatchLimits::new(usize::MAX, usize::MAX))
    }
}
