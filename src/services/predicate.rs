//! 组合谓词
//!
//! 搜索条件被编译为一组过滤器的合取。过滤器按代价排序，
//! 需要作业元数据关联的过滤器总是排在最后，只有在廉价过滤器全部通过后才会执行。

use std::sync::Arc;

use crate::error::Result;
use crate::models::criteria::{NameField, SearchCriteria, SizeFilter};
use crate::models::job::JobRecord;
use crate::models::record::{ProtocolMask, Record};
use crate::services::pattern_matcher::{GlobPattern, GlobSet};

/**
 * 作业元数据关联接口
 *
 * 过滤器通过它把记录的作业 ID 解析为作业记录。
 * 返回 `Ok(None)` 表示表中没有该作业。
 */
pub trait JobLookup {
    fn lookup(&self, job_id: u32) -> Result<Option<Arc<JobRecord>>>;
}

/// 不提供任何作业的关联实现，用于不需要关联的搜索
#[derive(Debug, Clone, Copy, Default)]
pub struct NoJobs;

impl JobLookup for NoJobs {
    fn lookup(&self, _job_id: u32) -> Result<Option<Arc<JobRecord>>> {
        Ok(None)
    }
}

/// 编译后的收件方模式
#[derive(Debug, Clone)]
pub struct RecipientMatcher {
    host: GlobPattern,
    user: Option<GlobPattern>,
}

impl RecipientMatcher {
    fn matches(&self, record: &Record, jobs: &dyn JobLookup) -> Result<Option<bool>> {
        if !self.host.matches(&record.host) {
            return Ok(None);
        }
        let Some(user) = &self.user else {
            return Ok(Some(true));
        };
        let matched = jobs
            .lookup(record.job_id)?
            .is_some_and(|job| user.matches(job.user_match_target(user.as_str())));
        Ok(Some(matched))
    }
}

/// 单个过滤器
#[derive(Debug, Clone)]
pub enum Filter {
    Protocol(ProtocolMask),
    /// 闭区间时间窗口
    TimeWindow {
        start: Option<u64>,
        end: Option<u64>,
    },
    Name {
        glob: GlobPattern,
        field: NameField,
    },
    Size(SizeFilter),
    /// 第一个主机匹配的模式决定结果
    Recipient(Vec<RecipientMatcher>),
    Directory(GlobSet),
}

impl Filter {
    /// 相对代价，越小越先执行
    fn cost(&self) -> u8 {
        match self {
            Filter::Protocol(_) | Filter::TimeWindow { .. } => 0,
            Filter::Size(_) => 1,
            Filter::Name { .. } => 2,
            Filter::Recipient(matchers) if matchers.iter().all(|m| m.user.is_none()) => 3,
            Filter::Recipient(_) => 4,
            Filter::Directory(_) => 5,
        }
    }

    pub fn needs_join(&self) -> bool {
        self.cost() >= 4
    }

    pub fn matches(&self, record: &Record, jobs: &dyn JobLookup) -> Result<bool> {
        Ok(match self {
            Filter::Protocol(mask) => mask.allows(record.protocol),
            Filter::TimeWindow { start, end } => {
                start.map_or(true, |s| record.timestamp >= s)
                    && end.map_or(true, |e| record.timestamp <= e)
            }
            Filter::Name { glob, field } => {
                glob.matches(record.display_name(*field == NameField::Remote))
            }
            Filter::Size(size) => size.accepts(record.size as f64),
            Filter::Recipient(matchers) => {
                for matcher in matchers {
                    if let Some(result) = matcher.matches(record, jobs)? {
                        return Ok(result);
                    }
                }
                false
            }
            Filter::Directory(globs) => jobs
                .lookup(record.job_id)?
                .is_some_and(|job| globs.matches_any(&job.directory.dir_name)),
        })
    }
}

/// 编译后的组合谓词
#[derive(Debug, Clone, Default)]
pub struct CompiledPredicate {
    filters: Vec<Filter>,
}

impl CompiledPredicate {
    /// 由搜索条件编译；模式无效时返回验证错误
    pub fn compile(criteria: &SearchCriteria) -> Result<Self> {
        let mut filters = Vec::new();

        if criteria.protocol_mask != ProtocolMask::ALL {
            filters.push(Filter::Protocol(criteria.protocol_mask));
        }
        if criteria.time_start.is_some() || criteria.time_end.is_some() {
            filters.push(Filter::TimeWindow {
                start: criteria.time_start,
                end: criteria.time_end,
            });
        }
        if let Some(pattern) = &criteria.name_glob {
            filters.push(Filter::Name {
                glob: GlobPattern::new(pattern)?,
                field: criteria.name_field,
            });
        }
        if let Some(size) = criteria.size {
            filters.push(Filter::Size(size));
        }
        if !criteria.recipients.is_empty() {
            let matchers = criteria
                .recipients
                .iter()
                .map(|r| {
                    Ok(RecipientMatcher {
                        host: GlobPattern::new(&r.host)?,
                        user: r.user.as_deref().map(GlobPattern::new).transpose()?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            filters.push(Filter::Recipient(matchers));
        }
        if !criteria.directories.is_empty() {
            filters.push(Filter::Directory(GlobSet::new(&criteria.directories)?));
        }

        filters.sort_by_key(Filter::cost);
        Ok(Self { filters })
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn needs_join(&self) -> bool {
        self.filters.iter().any(Filter::needs_join)
    }

    /// 所有过滤器都通过时匹配；遇到第一个不通过的过滤器即停止
    pub fn matches(&self, record: &Record, jobs: &dyn JobLookup) -> Result<bool> {
        for filter in &self.filters {
            if !filter.matches(record, jobs)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
