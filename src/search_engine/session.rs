//! Search session state
//!
//! A [`SearchHandle`] owns everything one search produces: the queue of
//! segments still to scan, the mapped segment being scanned, the per-segment
//! item lists, the running summary and the tail controller. Dropping the
//! handle discards all of it.

use chrono::{DateTime, Utc};
use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::infrastructure::config::EngineConfig;
use crate::models::criteria::SearchCriteria;
use crate::models::item_list::ItemList;
use crate::models::record::{Record, LINE_TERMINATOR};
use crate::models::search_statistics::SummaryStats;
use crate::models::segment::{FileIdentity, LogSegment};
use crate::services::boundary_search::window_range;
use crate::services::extractor::{BatchLimits, Extractor};
use crate::services::file_watcher::{StopReason, TailController, TailCursor, TailEvent, TailState};
use crate::services::predicate::{CompiledPredicate, JobLookup, NoJobs};
use crate::services::record_parser::{data_end, decode_record, unix_now, ArchiveClock};
use crate::services::search_statistics::fold_batch;
use crate::storage::join_cache::JoinCache;

/// 搜索生命周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchState {
    Running,
    Completed,
    /// 扫描结束前达到了列表上限
    Truncated,
    Cancelled,
    Failed,
}

/// 一步或一次跟踪轮询的结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub records: Vec<Record>,
    /// 本轮没有更多工作
    pub done: bool,
    /// 已达到列表上限
    pub truncated: bool,
    /// 最新分段已轮转，之前的结果全部丢弃
    pub rotated: bool,
    /// 记录所在的分段编号
    pub segment_index: Option<usize>,
}

impl BatchResult {
    fn finished(truncated: bool) -> Self {
        Self {
            done: true,
            truncated,
            ..Default::default()
        }
    }

    pub(crate) fn rotated() -> Self {
        Self {
            rotated: true,
            ..Default::default()
        }
    }
}

/// 单个分段的匹配结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentResult {
    pub segment: LogSegment,
    pub items: ItemList,
}

struct ActiveScan {
    slot: usize,
    map: Mmap,
    pos: usize,
    end: usize,
    data_end: usize,
}

pub(crate) enum FollowPoll {
    Batch(BatchResult),
    Rotated,
}

/**
 * 单次搜索的句柄
 *
 * 由 [`LogQueryEngine::begin_search`](crate::search_engine::LogQueryEngine::begin_search) 创建。
 * 新的搜索开始时旧句柄直接丢弃即可。
 */
pub struct SearchHandle {
    id: Uuid,
    started_at: DateTime<Utc>,
    criteria: SearchCriteria,
    predicate: CompiledPredicate,
    joins: Option<JoinCache>,
    limits: BatchLimits,
    list_limit: Option<usize>,
    archive_step: u64,
    /// 从旧到新
    pending: VecDeque<LogSegment>,
    /// 搜索开始时探测到的 0 号分段
    newest: NewestSegment,
    active: Option<ActiveScan>,
    /// 按扫描顺序，最旧的分段在前
    results: Vec<SegmentResult>,
    tail_origin: Option<TailCursor>,
    summary: SummaryStats,
    state: SearchState,
    cancel: CancellationToken,
    follow_requested: bool,
    tail: TailController,
}

/// 搜索开始时 0 号分段的探测结果
#[derive(Debug, Clone)]
pub(crate) enum NewestSegment {
    Present(LogSegment),
    /// 轮转后写入方尚未创建新的 0 号分段
    Missing(PathBuf),
}

impl SearchHandle {
    /// `segments` 按定位器的顺序（从新到旧）传入
    pub(crate) fn new(
        criteria: SearchCriteria,
        predicate: CompiledPredicate,
        joins: Option<JoinCache>,
        segments: Vec<LogSegment>,
        newest: NewestSegment,
        config: &EngineConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            criteria,
            predicate,
            joins,
            limits: BatchLimits::new(config.batch_size, config.scan_limit_per_step),
            list_limit: config.list_limit(),
            archive_step: config.archive_step_time_secs,
            pending: segments.into_iter().rev().collect(),
            newest,
            active: None,
            results: Vec::new(),
            tail_origin: None,
            summary: SummaryStats::default(),
            state: SearchState::Running,
            cancel,
            follow_requested: false,
            tail: TailController::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn criteria(&self) -> &SearchCriteria {
        &self.criteria
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    pub fn summary(&self) -> &SummaryStats {
        &self.summary
    }

    pub fn segment_results(&self) -> &[SegmentResult] {
        &self.results
    }

    /// 所有分段的匹配项总数
    pub fn item_count(&self) -> usize {
        self.results.iter().map(|r| r.items.len()).sum()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn follow_requested(&self) -> bool {
        self.follow_requested
    }

    pub fn is_following(&self) -> bool {
        self.tail.is_following()
    }

    pub fn tail_state(&self) -> &TailState {
        self.tail.state()
    }

    fn jobs(&self) -> &dyn JobLookup {
        match &self.joins {
            Some(cache) => cache as &dyn JobLookup,
            None => &NoJobs,
        }
    }

    fn clock(&self) -> ArchiveClock {
        ArchiveClock::system(self.archive_step)
    }

    fn remaining(&self) -> Option<usize> {
        self.list_limit
            .map(|limit| limit.saturating_sub(self.summary.matched_count))
    }

    /// 执行一个有界的搜索步骤
    pub(crate) fn step(&mut self) -> Result<BatchResult> {
        match self.state {
            SearchState::Running => {}
            SearchState::Truncated => return Ok(BatchResult::finished(true)),
            _ => return Ok(BatchResult::finished(false)),
        }
        if self.cancel.is_cancelled() {
            self.active = None;
            self.pending.clear();
            self.state = SearchState::Cancelled;
            info!(
                search_id = %self.id,
                matched = self.summary.matched_count,
                "Search cancelled"
            );
            return Ok(BatchResult::finished(false));
        }

        self.advance().map_err(|e| {
            self.active = None;
            self.pending.clear();
            self.results.clear();
            self.summary = SummaryStats::default();
            self.state = SearchState::Failed;
            error!(search_id = %self.id, error = %e, "Search failed");
            e
        })
    }

    fn advance(&mut self) -> Result<BatchResult> {
        loop {
            let Some(active) = &self.active else {
                match self.pending.pop_front() {
                    Some(segment) => self.open_segment(segment)?,
                    None => return Ok(self.complete()),
                }
                continue;
            };
            if active.pos >= active.end {
                self.finish_segment();
                continue;
            }

            let (slot, pos, end) = (active.slot, active.pos, active.end);
            let limits = self.limits.capped(self.remaining());
            let batch = Extractor::new(&self.predicate, self.jobs(), self.clock())
                .extract(&active.map, pos, end, limits)?;

            let segment_index = self.results[slot].segment.index;
            let mut items = batch.items;
            self.results[slot].items.append(&mut items);
            fold_batch(&mut self.summary, &batch.records);
            if let Some(active) = &mut self.active {
                active.pos = batch.next_pos;
            }
            debug!(
                search_id = %self.id,
                segment = segment_index,
                scanned = batch.scanned,
                matched = batch.records.len(),
                "Search step"
            );

            if self.remaining() == Some(0) {
                self.active = None;
                self.pending.clear();
                self.state = SearchState::Truncated;
                info!(
                    search_id = %self.id,
                    matched = self.summary.matched_count,
                    "List limit reached"
                );
                return Ok(BatchResult {
                    records: batch.records,
                    done: true,
                    truncated: true,
                    rotated: false,
                    segment_index: Some(segment_index),
                });
            }

            return Ok(BatchResult {
                records: batch.records,
                segment_index: Some(segment_index),
                ..Default::default()
            });
        }
    }

    fn open_segment(&mut self, segment: LogSegment) -> Result<()> {
        let io_err = |e: std::io::Error, what: &str| {
            AppError::segment_io(
                format!("Failed to {} `{}`: {}", what, segment.path.display(), e),
                Some(segment.path.clone()),
            )
        };

        let file = File::open(&segment.path).map_err(|e| io_err(e, "open"))?;
        let metadata = file.metadata().map_err(|e| io_err(e, "fstat"))?;
        if metadata.len() == 0 {
            debug!(segment = segment.index, "Segment emptied before scan");
            return Ok(());
        }
        // 只读映射；写入方只追加
        let map = unsafe { Mmap::map(&file) }.map_err(|e| io_err(e, "mmap"))?;

        let data_end = data_end(&map);
        let (start, end) = window_range(
            &map,
            data_end,
            self.criteria.time_start,
            self.criteria.time_end,
        );
        debug!(
            segment = segment.index,
            start, end, data_end, "Scanning segment"
        );

        let segment = LogSegment {
            identity: FileIdentity::from_metadata(&metadata),
            size: metadata.len(),
            ..segment
        };
        self.results.push(SegmentResult {
            segment,
            items: ItemList::new(),
        });
        self.active = Some(ActiveScan {
            slot: self.results.len() - 1,
            map,
            pos: start,
            end,
            data_end,
        });
        Ok(())
    }

    fn finish_segment(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        let segment = &self.results[active.slot].segment;
        if segment.is_newest() {
            self.tail_origin = Some(TailCursor {
                path: segment.path.clone(),
                identity: segment.identity,
                offset: active.data_end as u64,
                slot: active.slot,
            });
        }
    }

    fn complete(&mut self) -> BatchResult {
        self.state = SearchState::Completed;
        info!(
            search_id = %self.id,
            matched = self.summary.matched_count,
            total_size = self.summary.total_size,
            elapsed_ms = (Utc::now() - self.started_at).num_milliseconds(),
            "Search completed"
        );
        self.try_start_follow(unix_now());
        BatchResult::finished(false)
    }

    /// 请求持续模式；搜索已完成时立即开始跟踪
    pub(crate) fn enable_follow(&mut self, now: u64) {
        self.follow_requested = true;
        self.try_start_follow(now);
    }

    fn try_start_follow(&mut self, now: u64) {
        if !self.follow_requested
            || self.state != SearchState::Completed
            || self.tail.is_following()
            || matches!(self.tail.state(), TailState::Stopped(_))
        {
            return;
        }
        if self.criteria.window_closed_at(now) {
            debug!(search_id = %self.id, "Search window already closed, not following");
            return;
        }
        if self.tail_origin.is_none() {
            // 最新分段没有被扫描（为空或在窗口之外），从头跟踪
            let newest = match self.newest.clone() {
                NewestSegment::Present(newest) => newest,
                NewestSegment::Missing(path) => {
                    // 等待写入方创建新的 0 号分段，出现后按轮转重新搜索
                    self.tail.wait_for(path);
                    return;
                }
            };
            self.results.push(SegmentResult {
                segment: newest.clone(),
                items: ItemList::new(),
            });
            self.tail_origin = Some(TailCursor {
                path: newest.path,
                identity: newest.identity,
                offset: 0,
                slot: self.results.len() - 1,
            });
        }
        if let Some(origin) = &self.tail_origin {
            self.tail.start(origin.clone());
        }
    }

    pub(crate) fn poll_follow(&mut self, now: u64) -> Result<FollowPoll> {
        let event = self.tail.poll(&self.cancel, &self.criteria, now)?;
        match event {
            TailEvent::Rotated => Ok(FollowPoll::Rotated),
            TailEvent::Inactive | TailEvent::Unchanged | TailEvent::Stopped(_) => {
                Ok(FollowPoll::Batch(BatchResult::finished(false)))
            }
            TailEvent::Grew { base, bytes } => match self.extract_tail(base as usize, &bytes) {
                Ok(result) => Ok(FollowPoll::Batch(result)),
                Err(e) => {
                    self.tail.stop(StopReason::Failed(e.to_string()));
                    Err(e)
                }
            },
        }
    }

    fn extract_tail(&mut self, base: usize, bytes: &[u8]) -> Result<BatchResult> {
        let Some(slot) = self.tail.cursor().map(|c| c.slot) else {
            return Ok(BatchResult::finished(false));
        };
        let limits = BatchLimits::new(usize::MAX, usize::MAX).capped(self.remaining());
        let batch = Extractor::new(&self.predicate, self.jobs(), self.clock())
            .extract(bytes, 0, bytes.len(), limits)?;

        self.results[slot].items.extend_shifted(&batch.items, base);
        fold_batch(&mut self.summary, &batch.records);
        debug!(
            search_id = %self.id,
            base,
            bytes = bytes.len(),
            matched = batch.records.len(),
            "Extracted appended records"
        );

        let truncated = self.remaining() == Some(0);
        if truncated {
            self.state = SearchState::Truncated;
            self.tail.stop(StopReason::ListFull);
        }
        Ok(BatchResult {
            records: batch.records,
            done: true,
            truncated,
            rotated: false,
            segment_index: Some(self.results[slot].segment.index),
        })
    }

    /// 把全局匹配项编号换算为分段和行首偏移
    pub fn locate_item(&self, item: usize) -> Option<(&LogSegment, usize)> {
        let mut item = item;
        for result in &self.results {
            if item < result.items.len() {
                return result
                    .items
                    .line_offset(item)
                    .map(|offset| (&result.segment, offset));
            }
            item -= result.items.len();
        }
        None
    }

    /**
     * 重新读取并完整解码一条匹配记录
     *
     * 分段在搜索之后被轮转时返回 `NotFound`。
     */
    pub fn record_at(&self, item: usize) -> Result<Record> {
        let (segment, offset) = self
            .locate_item(item)
            .ok_or_else(|| AppError::not_found(format!("item {}", item)))?;

        let io_err = |e: std::io::Error| {
            AppError::segment_io(
                format!("Failed to read `{}`: {}", segment.path.display(), e),
                Some(segment.path.clone()),
            )
        };
        let mut file = File::open(&segment.path).map_err(io_err)?;
        let metadata = file.metadata().map_err(io_err)?;
        if FileIdentity::from_metadata(&metadata) != segment.identity {
            return Err(AppError::not_found(format!(
                "segment {} was rotated since the search",
                segment.index
            )));
        }
        file.seek(SeekFrom::Start(offset as u64)).map_err(io_err)?;
        let mut line = Vec::new();
        BufReader::new(file)
            .read_until(LINE_TERMINATOR, &mut line)
            .map_err(io_err)?;

        Ok(decode_record(&line, 0, &self.clock()))
    }
}

impl std::fmt::Debug for SearchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchHandle")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("pending", &self.pending.len())
            .field("items", &self.item_count())
            .field("summary", &self.summary)
            .field("tail", self.tail.state())
            .finish()
    }
}
