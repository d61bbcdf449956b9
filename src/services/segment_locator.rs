//! 日志分段定位
//!
//! 分段文件名为 `<前缀><编号>`，编号 0 最新。按编号递增探测直到文件不存在，
//! 再根据修改时间和轮转周期筛选可能包含搜索时间窗口的分段。

use std::path::PathBuf;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::infrastructure::config::EngineConfig;
use crate::models::segment::LogSegment;

#[derive(Debug, Clone)]
pub struct SegmentLocator {
    log_dir: PathBuf,
    prefix: String,
    max_log_files: usize,
    switch_time: u64,
}

impl SegmentLocator {
    pub fn new(
        log_dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        max_log_files: usize,
        switch_time: u64,
    ) -> Self {
        Self {
            log_dir: log_dir.into(),
            prefix: prefix.into(),
            max_log_files,
            switch_time,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.log_path(),
            config.log_prefix.clone(),
            config.max_log_files,
            config.switch_file_time_secs,
        )
    }

    pub fn segment_path(&self, index: usize) -> PathBuf {
        self.log_dir.join(format!("{}{}", self.prefix, index))
    }

    /**
     * 探测一个分段
     *
     * 文件不存在时返回 `None`；其他 stat 失败是 I/O 错误。
     */
    pub fn probe(&self, index: usize) -> Result<Option<LogSegment>> {
        let path = self.segment_path(index);
        match std::fs::metadata(&path) {
            Ok(metadata) => Ok(Some(LogSegment::from_metadata(index, path, &metadata))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::segment_io(
                format!("Failed to stat `{}`: {}", path.display(), e),
                Some(path),
            )),
        }
    }

    /**
     * 定位可能包含时间窗口的分段，按从新到旧排列
     *
     * - 修改时间加一个轮转周期早于开始时间的分段及更旧的分段不包含
     * - 若某个分段的修改时间已晚于结束时间，比它更新的分段都不包含
     * - 空分段跳过
     */
    pub fn locate(&self, time_start: Option<u64>, time_end: Option<u64>) -> Result<Vec<LogSegment>> {
        let mut segments = Vec::new();

        for index in 0..self.max_log_files {
            let Some(segment) = self.probe(index)? else {
                break;
            };
            if let Some(start) = time_start {
                if segment.mtime.saturating_add(self.switch_time) < start {
                    break;
                }
            }
            if segment.is_empty() {
                debug!(index, "Skipping empty log segment");
                continue;
            }
            segments.push(segment);
        }

        if let Some(end) = time_end {
            if let Some(oldest_after_end) = segments.iter().rposition(|s| s.mtime > end) {
                segments.drain(..oldest_after_end);
            }
        }

        debug!(
            segments = ?segments.iter().map(|s| s.index).collect::<Vec<_>>(),
            "Located log segments"
        );
        Ok(segments)
    }
}
