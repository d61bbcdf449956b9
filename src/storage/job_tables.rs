//! 作业元数据表
//!
//! 三张由外部进程维护的只读表，全部以内存映射方式打开：
//!
//! | 文件 | 版本 | 条目大小 |
//! |------|------|----------|
//! | `job_id_data` | 4 | 1040 |
//! | `directory_names` | 1 | 1032 |
//! | `dir_options` | 1 | 1032 |
//!
//! 每个文件以 8 字节头开始：`i32` 条目数（小端）、3 个保留字节、版本字节。
//! 表在文件长度、身份或版本变化时重新映射。

use memmap2::Mmap;
use parking_lot::RwLock;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::models::job::{DirectoryRecord, JobRecord};
use crate::models::segment::FileIdentity;
use crate::storage::recipient::parse_recipient;

pub const JOB_ID_DATA_FILE: &str = "job_id_data";
pub const DIR_NAME_FILE: &str = "directory_names";
pub const DIR_OPTIONS_FILE: &str = "dir_options";

/// 表头大小
pub const TABLE_HEADER_SIZE: usize = 8;
/// 版本字节在表头中的位置
pub const VERSION_OFFSET: usize = 7;

pub const MAX_RECIPIENT_LENGTH: usize = 256;
pub const MAX_FILE_MASK_BUFFER: usize = 256;
pub const MAX_OPTION_LENGTH: usize = 256;
pub const MAX_PATH_LENGTH: usize = 1024;

/// 表的静态描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub file_name: &'static str,
    /// 错误信息中使用的简称
    pub label: &'static str,
    pub version: u8,
    pub entry_size: usize,
}

pub const JOB_TABLE: TableSpec = TableSpec {
    file_name: JOB_ID_DATA_FILE,
    label: "JID",
    version: 4,
    entry_size: 16 + MAX_RECIPIENT_LENGTH + MAX_FILE_MASK_BUFFER + 2 * MAX_OPTION_LENGTH,
};

pub const DIR_NAME_TABLE: TableSpec = TableSpec {
    file_name: DIR_NAME_FILE,
    label: "DNB",
    version: 1,
    entry_size: 8 + MAX_PATH_LENGTH,
};

pub const DIR_OPTIONS_TABLE: TableSpec = TableSpec {
    file_name: DIR_OPTIONS_FILE,
    label: "DIR_OPTIONS",
    version: 1,
    entry_size: 8 + MAX_PATH_LENGTH,
};

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    bytes
        .get(at..at + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .unwrap_or(0)
}

fn read_i32(bytes: &[u8], at: usize) -> i32 {
    read_u32(bytes, at) as i32
}

/// 以 NUL 结尾的字符串；没有 NUL 时返回 `None`
fn c_string(bytes: &[u8]) -> Option<String> {
    let end = bytes.iter().position(|&b| b == 0)?;
    Some(String::from_utf8_lossy(&bytes[..end]).into_owned())
}

/// 以 NUL 结尾的字符串，没有 NUL 时取整个缓冲区
fn c_string_lossy(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// NUL 分隔的列表，遇到空项结束
fn nul_list(bytes: &[u8], limit: Option<usize>) -> Vec<String> {
    let items = bytes
        .split(|&b| b == 0)
        .take_while(|s| !s.is_empty())
        .map(|s| String::from_utf8_lossy(s).into_owned());
    match limit {
        Some(n) => items.take(n).collect(),
        None => items.collect(),
    }
}

/// 换行分隔的列表，以 NUL 结束
fn line_list(bytes: &[u8], limit: usize) -> Vec<String> {
    c_string_lossy(bytes)
        .split('\n')
        .filter(|s| !s.is_empty())
        .take(limit)
        .map(str::to_string)
        .collect()
}

/// 读取表头中的版本字节
fn read_version(path: &Path) -> std::io::Result<Option<u8>> {
    let mut header = [0u8; TABLE_HEADER_SIZE];
    let mut file = File::open(path)?;
    match file.read_exact(&mut header) {
        Ok(()) => Ok(Some(header[VERSION_OFFSET])),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e),
    }
}

/// 检查映射内容的表头版本；映射短于表头（文件在 stat 之后被截短）时是 I/O 错误
fn check_version(map: &[u8], spec: TableSpec, path: &Path) -> Result<()> {
    let Some(&found) = map.get(VERSION_OFFSET) else {
        return Err(AppError::metadata_io(
            format!("{} database file shrank below its header", spec.label),
            Some(path.to_path_buf()),
        ));
    };
    if found != spec.version {
        return Err(AppError::VersionMismatch {
            table: spec.label,
            found,
            expected: spec.version,
        });
    }
    Ok(())
}

/**
 * 一张内存映射的元数据表
 */
#[derive(Debug)]
pub struct MappedTable {
    spec: TableSpec,
    path: PathBuf,
    map: Mmap,
    len: u64,
    identity: FileIdentity,
    count: usize,
}

impl MappedTable {
    /**
     * 打开并映射表文件，检查版本
     *
     * 文件缺失、为空或版本不符都是错误。
     */
    pub fn open(dir: &Path, spec: TableSpec) -> Result<Self> {
        let path = dir.join(spec.file_name);
        let io_err = |e: std::io::Error, what: &str| {
            AppError::metadata_io(
                format!("Failed to {} `{}`: {}", what, path.display(), e),
                Some(path.clone()),
            )
        };

        let file = File::open(&path).map_err(|e| io_err(e, "open"))?;
        let metadata = file.metadata().map_err(|e| io_err(e, "fstat"))?;
        if (metadata.len() as usize) < TABLE_HEADER_SIZE {
            return Err(AppError::metadata_io(
                format!("{} database file is empty", spec.label),
                Some(path.clone()),
            ));
        }

        // 只读映射；写入方只会整体替换或追加
        let map = unsafe { Mmap::map(&file) }.map_err(|e| io_err(e, "mmap"))?;

        check_version(&map, spec, &path)?;

        let declared = read_i32(&map, 0).max(0) as usize;
        let available = (map.len() - TABLE_HEADER_SIZE) / spec.entry_size;
        if declared > available {
            warn!(
                table = spec.label,
                declared, available, "Metadata table shorter than its header claims"
            );
        }

        Ok(Self {
            spec,
            len: metadata.len(),
            identity: FileIdentity::from_metadata(&metadata),
            count: declared.min(available),
            path,
            map,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn entry(&self, index: usize) -> Option<&[u8]> {
        if index >= self.count {
            return None;
        }
        let start = TABLE_HEADER_SIZE + index * self.spec.entry_size;
        self.map.get(start..start + self.spec.entry_size)
    }

    pub fn entries(&self) -> impl Iterator<Item = &[u8]> {
        (0..self.count).filter_map(move |i| self.entry(i))
    }

    /// 磁盘上的文件是否已与当前映射不同
    pub fn is_stale(&self) -> Result<bool> {
        let metadata = match std::fs::metadata(&self.path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
            Err(e) => {
                return Err(AppError::metadata_io(
                    format!("Failed to stat `{}`: {}", self.path.display(), e),
                    Some(self.path.clone()),
                ))
            }
        };
        if metadata.len() != self.len || FileIdentity::from_metadata(&metadata) != self.identity
        {
            return Ok(true);
        }
        let version = read_version(&self.path).map_err(|e| {
            AppError::metadata_io(
                format!("Failed to read `{}`: {}", self.path.display(), e),
                Some(self.path.clone()),
            )
        })?;
        Ok(version != Some(self.spec.version))
    }
}

/**
 * 三张表的一次映射快照
 */
#[derive(Debug)]
pub struct JobTables {
    jobs: MappedTable,
    dir_names: MappedTable,
    dir_options: Option<MappedTable>,
}

impl JobTables {
    /// 从 fifo 目录打开全部表；目录选项表缺失时不提供目录选项
    pub fn open(fifo_dir: &Path) -> Result<Self> {
        let jobs = MappedTable::open(fifo_dir, JOB_TABLE)?;
        let dir_names = MappedTable::open(fifo_dir, DIR_NAME_TABLE)?;
        let dir_options = match MappedTable::open(fifo_dir, DIR_OPTIONS_TABLE) {
            Ok(table) => Some(table),
            Err(AppError::MetadataIo { message, .. })
                if !fifo_dir.join(DIR_OPTIONS_FILE).exists() =>
            {
                debug!(message = %message, "Directory options table not present");
                None
            }
            Err(e) => return Err(e),
        };
        Ok(Self {
            jobs,
            dir_names,
            dir_options,
        })
    }

    pub fn is_stale(&self) -> Result<bool> {
        if self.jobs.is_stale()? || self.dir_names.is_stale()? {
            return Ok(true);
        }
        match &self.dir_options {
            Some(table) => table.is_stale(),
            None => Ok(false),
        }
    }

    pub fn job_count(&self) -> usize {
        self.jobs.count()
    }

    /**
     * 按作业 ID 线性查找
     *
     * 表未排序，同一目录可能有多个被取代的条目；返回第一个结构有效的匹配。
     */
    pub fn find_job(&self, job_id: u32) -> Option<JobRecord> {
        self.jobs
            .entries()
            .filter(|entry| read_u32(entry, 0) == job_id)
            .find_map(|entry| self.decode_job(entry))
    }

    fn decode_job(&self, entry: &[u8]) -> Option<JobRecord> {
        let dir_id_pos = read_i32(entry, 8);
        let directory_entry = usize::try_from(dir_id_pos)
            .ok()
            .and_then(|pos| self.dir_names.entry(pos))?;

        let recipient_start = 16;
        let masks_start = recipient_start + MAX_RECIPIENT_LENGTH;
        let loptions_start = masks_start + MAX_FILE_MASK_BUFFER;
        let soptions_start = loptions_start + MAX_OPTION_LENGTH;

        let recipient = c_string(entry.get(recipient_start..masks_start)?)?;
        let no_of_loptions = entry[13] as usize;
        let no_of_soptions = entry[14] as usize;
        let dir_id = read_u32(entry, 4);

        Some(JobRecord {
            job_id: read_u32(entry, 0),
            dir_id,
            dir_id_pos,
            priority: entry[12] as char,
            recipient_parts: parse_recipient(&recipient),
            recipient,
            file_masks: nul_list(&entry[masks_start..loptions_start], None),
            local_options: nul_list(&entry[loptions_start..soptions_start], Some(no_of_loptions)),
            remote_options: line_list(&entry[soptions_start..], no_of_soptions),
            directory: DirectoryRecord {
                dir_id: read_u32(directory_entry, 0),
                dir_name: c_string_lossy(&directory_entry[8..]),
                dir_options: self.directory_options(dir_id),
            },
        })
    }

    fn directory_options(&self, dir_id: u32) -> Vec<String> {
        let Some(table) = &self.dir_options else {
            return Vec::new();
        };
        table
            .entries()
            .find(|entry| read_u32(entry, 0) == dir_id)
            .map(|entry| line_list(&entry[8..], read_u32(entry, 4) as usize))
            .unwrap_or_default()
    }
}

/**
 * 元数据存储
 *
 * 延迟打开表，打开后在进程生命周期内保持映射，
 * 仅在 [`MetadataStore::refresh`] 发现文件变化时重新映射。
 */
#[derive(Debug)]
pub struct MetadataStore {
    fifo_dir: PathBuf,
    tables: RwLock<Option<JobTables>>,
    generation: AtomicU64,
}

impl MetadataStore {
    pub fn new(fifo_dir: impl Into<PathBuf>) -> Self {
        Self {
            fifo_dir: fifo_dir.into(),
            tables: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn fifo_dir(&self) -> &Path {
        &self.fifo_dir
    }

    /// 每次重新映射递增，缓存据此失效
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// 确保表已映射且与磁盘一致
    pub fn refresh(&self) -> Result<()> {
        let stale = match self.tables.read().as_ref() {
            Some(tables) => tables.is_stale()?,
            None => true,
        };
        if stale {
            self.reload()?;
        }
        Ok(())
    }

    fn reload(&self) -> Result<()> {
        let mut guard = self.tables.write();
        *guard = None;
        let tables = JobTables::open(&self.fifo_dir)?;
        info!(
            fifo_dir = %self.fifo_dir.display(),
            jobs = tables.job_count(),
            "Mapped job metadata tables"
        );
        *guard = Some(tables);
        self.generation.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// 查找作业；表尚未映射时先映射
    pub fn find_job(&self, job_id: u32) -> Result<Option<JobRecord>> {
        if self.tables.read().is_none() {
            self.reload()?;
        }
        Ok(self
            .tables
            .read()
            .as_ref()
            .and_then(|tables| tables.find_job(job_id)))
    }
}
