//! 最新分段跟踪
//!
//! 持续模式下周期性检查最新分段：身份（设备号 + inode）变化、文件消失或被截断
//! 视为轮转；文件增长时只读取新增的完整行。

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{AppError, Result};
use crate::models::criteria::SearchCriteria;
use crate::models::segment::FileIdentity;
use crate::services::record_parser::data_end;

/// 跟踪位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailCursor {
    pub path: PathBuf,
    pub identity: FileIdentity,
    /// 已处理到的字节偏移（总是行首）
    pub offset: u64,
    /// 最新分段在结果列表中的位置
    pub slot: usize,
}

/// 跟踪停止的原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    Cancelled,
    /// 搜索窗口的结束时间已经过去
    WindowClosed,
    /// 匹配数已达列表上限
    ListFull,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TailState {
    #[default]
    Idle,
    Following(TailCursor),
    /// 最新分段尚不存在（轮转后写入方还未创建），等待它出现
    Waiting(PathBuf),
    Stopped(StopReason),
}

/// 一次轮询的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailEvent {
    /// 未处于跟踪状态
    Inactive,
    Unchanged,
    /// 新增的完整行，`base` 为其在文件中的起始偏移
    Grew { base: u64, bytes: Vec<u8> },
    /// 分段已轮转，需要重新搜索
    Rotated,
    Stopped(StopReason),
}

/**
 * 从偏移处读取新增内容
 *
 * 只返回到最后一个行终止符为止的完整行；不完整的末行留给下一次读取。
 */
pub fn read_from_offset(path: &Path, offset: u64, file_size: u64) -> std::io::Result<Vec<u8>> {
    if file_size <= offset {
        return Ok(Vec::new());
    }
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;

    let mut bytes = vec![0u8; (file_size - offset) as usize];
    file.read_exact(&mut bytes)?;
    bytes.truncate(data_end(&bytes));

    debug!(
        file = %path.display(),
        offset_start = offset,
        bytes_read = bytes.len(),
        "Read appended bytes"
    );
    Ok(bytes)
}

/// 跟踪控制器
#[derive(Debug, Clone, Default)]
pub struct TailController {
    state: TailState,
}

impl TailController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &TailState {
        &self.state
    }

    /// 跟踪是否仍在进行（包括等待最新分段出现）
    pub fn is_following(&self) -> bool {
        matches!(self.state, TailState::Following(_) | TailState::Waiting(_))
    }

    pub fn cursor(&self) -> Option<&TailCursor> {
        match &self.state {
            TailState::Following(cursor) => Some(cursor),
            _ => None,
        }
    }

    pub fn start(&mut self, cursor: TailCursor) {
        info!(
            path = %cursor.path.display(),
            offset = cursor.offset,
            "Following newest log segment"
        );
        self.state = TailState::Following(cursor);
    }

    /// 最新分段缺失时保持跟踪，直到它被创建
    pub fn wait_for(&mut self, path: PathBuf) {
        info!(path = %path.display(), "Waiting for newest log segment to appear");
        self.state = TailState::Waiting(path);
    }

    pub fn stop(&mut self, reason: StopReason) {
        if self.is_following() {
            info!(reason = ?reason, "Stopped following log segment");
        }
        self.state = TailState::Stopped(reason);
    }

    /// 回到空闲状态（轮转后重新搜索时使用）
    pub fn reset(&mut self) {
        self.state = TailState::Idle;
    }

    /**
     * 轮询一次
     *
     * stat 或读取失败时停止跟踪并返回 `FollowFailed`。
     * 等待状态下分段一旦出现即报告为轮转，由调用方重新搜索。
     */
    pub fn poll(
        &mut self,
        cancel: &CancellationToken,
        criteria: &SearchCriteria,
        now: u64,
    ) -> Result<TailEvent> {
        if !self.is_following() {
            return Ok(TailEvent::Inactive);
        }
        if cancel.is_cancelled() {
            self.stop(StopReason::Cancelled);
            return Ok(TailEvent::Stopped(StopReason::Cancelled));
        }
        if criteria.window_closed_at(now) {
            self.stop(StopReason::WindowClosed);
            return Ok(TailEvent::Stopped(StopReason::WindowClosed));
        }

        let cursor = match &self.state {
            TailState::Following(cursor) => cursor,
            TailState::Waiting(path) => return self.poll_waiting(path.clone()),
            _ => return Ok(TailEvent::Inactive),
        };

        let metadata = match std::fs::metadata(&cursor.path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %cursor.path.display(), "Newest log segment disappeared");
                return Ok(TailEvent::Rotated);
            }
            Err(e) => {
                let message = format!("stat `{}`: {}", cursor.path.display(), e);
                return Err(self.fail(message));
            }
        };

        if FileIdentity::from_metadata(&metadata) != cursor.identity {
            info!(path = %cursor.path.display(), "Log rotation detected");
            return Ok(TailEvent::Rotated);
        }
        let size = metadata.len();
        if size < cursor.offset {
            warn!(
                path = %cursor.path.display(),
                size,
                offset = cursor.offset,
                "Log segment truncated, treating as rotation"
            );
            return Ok(TailEvent::Rotated);
        }
        if size == cursor.offset {
            return Ok(TailEvent::Unchanged);
        }

        let base = cursor.offset;
        let bytes = match read_from_offset(&cursor.path, base, size) {
            Ok(bytes) => bytes,
            Err(e) => {
                let message = format!("read `{}`: {}", cursor.path.display(), e);
                return Err(self.fail(message));
            }
        };
        if bytes.is_empty() {
            return Ok(TailEvent::Unchanged);
        }
        if let TailState::Following(cursor) = &mut self.state {
            cursor.offset += bytes.len() as u64;
        }
        Ok(TailEvent::Grew { base, bytes })
    }

    fn poll_waiting(&mut self, path: PathBuf) -> Result<TailEvent> {
        match std::fs::metadata(&path) {
            Ok(_) => {
                info!(path = %path.display(), "Newest log segment reappeared");
                Ok(TailEvent::Rotated)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(TailEvent::Unchanged),
            Err(e) => Err(self.fail(format!("stat `{}`: {}", path.display(), e))),
        }
    }

    /// 停止跟踪并构造错误
    pub fn fail(&mut self, message: String) -> AppError {
        error!(error = %message, "Follow failed");
        self.stop(StopReason::Failed(message.clone()));
        AppError::FollowFailed(message)
    }
}
