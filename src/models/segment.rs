use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

/// 文件身份（设备号 + inode），用于检测日志轮转
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FileIdentity {
    pub dev: u64,
    pub ino: u64,
}

impl FileIdentity {
    #[cfg(unix)]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        }
    }

    /// 非 Unix 平台没有 inode，轮转只能通过截断检测
    #[cfg(not(unix))]
    pub fn from_metadata(_metadata: &Metadata) -> Self {
        Self::default()
    }
}

/**
 * 一个轮转日志分段
 *
 * `index` 为 0 的分段最新，只有它可能继续增长；编号越大越旧。
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSegment {
    pub index: usize,
    pub path: PathBuf,
    pub identity: FileIdentity,
    /// 探测时的文件大小（字节）
    pub size: u64,
    /// 修改时间（Unix 秒）
    pub mtime: u64,
}

impl LogSegment {
    pub fn from_metadata(index: usize, path: PathBuf, metadata: &Metadata) -> Self {
        Self {
            index,
            path,
            identity: FileIdentity::from_metadata(metadata),
            size: metadata.len(),
            mtime: modified_secs(metadata),
        }
    }

    pub fn is_newest(&self) -> bool {
        self.index == 0
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

/// 文件修改时间（Unix 秒），平台不支持时为 0
pub fn modified_secs(metadata: &Metadata) -> u64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
