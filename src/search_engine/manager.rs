use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::infrastructure::config::EngineConfig;
use crate::models::criteria::SearchCriteria;
use crate::models::job::JobRecord;
use crate::models::record::Record;
use crate::models::search_statistics::SummaryStats;
use crate::search_engine::session::{BatchResult, FollowPoll, NewestSegment, SearchHandle};
use crate::services::predicate::CompiledPredicate;
use crate::services::record_parser::unix_now;
use crate::services::search_statistics::summarize;
use crate::services::segment_locator::SegmentLocator;
use crate::storage::job_tables::MetadataStore;
use crate::storage::join_cache::JoinCache;

/**
 * 传输日志查询引擎
 *
 * 持有配置、分段定位器和共享的元数据存储。每次搜索的状态都在
 * [`SearchHandle`] 中，引擎本身可以被多个搜索共享。
 */
#[derive(Debug)]
pub struct LogQueryEngine {
    config: EngineConfig,
    locator: SegmentLocator,
    metadata: Arc<MetadataStore>,
}

impl LogQueryEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate_all()?;
        let locator = SegmentLocator::from_config(&config);
        let metadata = Arc::new(MetadataStore::new(config.fifo_path()));
        info!(
            log_dir = %config.log_path().display(),
            fifo_dir = %config.fifo_path().display(),
            "Query engine ready"
        );
        Ok(Self {
            config,
            locator,
            metadata,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metadata(&self) -> &Arc<MetadataStore> {
        &self.metadata
    }

    /**
     * 开始一次搜索
     *
     * 验证并编译条件，需要作业关联时先映射元数据表，然后定位分段。
     * 不扫描任何记录；扫描由 [`Self::step`] 驱动。
     */
    pub fn begin_search(&self, criteria: SearchCriteria) -> Result<SearchHandle> {
        self.begin_with_token(criteria, CancellationToken::new())
    }

    fn begin_with_token(
        &self,
        criteria: SearchCriteria,
        cancel: CancellationToken,
    ) -> Result<SearchHandle> {
        criteria.validate()?;
        let predicate = CompiledPredicate::compile(&criteria)?;

        let joins = if predicate.needs_join() {
            self.metadata.refresh()?;
            Some(JoinCache::new(
                Arc::clone(&self.metadata),
                self.config.join_cache_capacity,
            ))
        } else {
            None
        };

        let segments = self.locator.locate(criteria.time_start, criteria.time_end)?;
        let newest = match self.locator.probe(0)? {
            Some(segment) => NewestSegment::Present(segment),
            None => NewestSegment::Missing(self.locator.segment_path(0)),
        };

        let handle = SearchHandle::new(
            criteria,
            predicate,
            joins,
            segments,
            newest,
            &self.config,
            cancel,
        );
        info!(
            search_id = %handle.id(),
            start = ?handle.criteria().time_start,
            end = ?handle.criteria().time_end,
            "Search started"
        );
        Ok(handle)
    }

    /// 执行一步；返回的批次为空且 `done` 为真时搜索结束
    pub fn step(&self, handle: &mut SearchHandle) -> Result<BatchResult> {
        handle.step()
    }

    /// 一直执行到结束，返回全部匹配记录
    pub fn run_to_completion(&self, handle: &mut SearchHandle) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        loop {
            let mut batch = handle.step()?;
            records.append(&mut batch.records);
            if batch.done {
                return Ok(records);
            }
        }
    }

    /// 请求取消；在下一步或下一次轮询时生效
    pub fn cancel(&self, handle: &SearchHandle) {
        debug!(search_id = %handle.id(), "Cancellation requested");
        handle.cancel_token().cancel();
    }

    /// 搜索完成后继续跟踪最新分段
    pub fn enable_follow(&self, handle: &mut SearchHandle) {
        handle.enable_follow(unix_now());
    }

    pub fn poll_follow(&self, handle: &mut SearchHandle) -> Result<BatchResult> {
        self.poll_follow_at(handle, unix_now())
    }

    /**
     * 以给定的当前时间轮询一次
     *
     * 检测到轮转时丢弃旧结果，用相同条件重新开始搜索，
     * 返回 `rotated = true`；调用方需要重新驱动 [`Self::step`]。
     */
    pub fn poll_follow_at(&self, handle: &mut SearchHandle, now: u64) -> Result<BatchResult> {
        match handle.poll_follow(now)? {
            FollowPoll::Batch(batch) => Ok(batch),
            FollowPoll::Rotated => {
                info!(search_id = %handle.id(), "Restarting search after rotation");
                let follow = handle.follow_requested();
                let mut restarted =
                    self.begin_with_token(handle.criteria().clone(), handle.cancel_token())?;
                if follow {
                    restarted.enable_follow(now);
                }
                *handle = restarted;
                Ok(BatchResult::rotated())
            }
        }
    }

    /// 按作业 ID 查找作业及其目录信息
    pub fn resolve_job(&self, job_id: u32) -> Result<JobRecord> {
        self.metadata.refresh()?;
        self.metadata
            .find_job(job_id)?
            .ok_or_else(|| AppError::not_found(format!("job #{:x}", job_id)))
    }

    pub fn summary(&self, handle: &SearchHandle) -> SummaryStats {
        handle.summary().clone()
    }

    pub fn record_at(&self, handle: &SearchHandle, item: usize) -> Result<Record> {
        handle.record_at(item)
    }

    /// 选中项的统计
    pub fn summary_of(&self, handle: &SearchHandle, items: &[usize]) -> Result<SummaryStats> {
        let records = items
            .iter()
            .map(|&item| handle.record_at(item))
            .collect::<Result<Vec<_>>>()?;
        Ok(summarize(&records))
    }
}
