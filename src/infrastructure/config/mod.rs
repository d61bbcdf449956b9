//! 查询引擎配置
//!
//! 配置分层加载：
//! - 内置默认值
//! - 可选的 TOML 配置文件
//! - `TLOG__` 前缀的环境变量（嵌套字段用 `__` 分隔，例如 `TLOG__LOGGING__LEVEL`）

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use validator::Validate;

use crate::error::{AppError, Result};

/// 环境变量前缀
pub const ENV_PREFIX: &str = "TLOG";

/// 日志输出配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LoggingConfig {
    /// 未设置 `RUST_LOG` 时使用的过滤级别
    #[validate(length(min = 1, max = 100))]
    pub level: String,

    /// 以 JSON 格式输出
    pub json: bool,

    /// 滚动日志目录，不设置时只输出到标准错误
    pub directory: Option<PathBuf>,

    #[validate(length(min = 1, max = 100))]
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            directory: None,
            file_prefix: "transfer-log-query.log".to_string(),
        }
    }
}

/// 引擎配置根结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct EngineConfig {
    /// 工作目录，日志目录和 fifo 目录都位于其下
    pub work_dir: PathBuf,

    #[validate(length(min = 1, max = 255))]
    pub log_dir: String,

    /// 日志分段文件名前缀，后接分段编号
    #[validate(length(min = 1, max = 255))]
    pub log_prefix: String,

    #[validate(length(min = 1, max = 255))]
    pub fifo_dir: String,

    /// 最多回溯的分段数
    #[validate(range(min = 1, max = 10000))]
    pub max_log_files: usize,

    /// 分段轮转周期（秒）
    #[validate(range(min = 1))]
    pub switch_file_time_secs: u64,

    /// 每步最多返回的匹配记录数
    #[validate(range(min = 1, max = 1000000))]
    pub batch_size: usize,

    /// 每步最多扫描的行数
    #[validate(range(min = 1))]
    pub scan_limit_per_step: usize,

    /// 匹配总数上限，0 表示不限
    pub list_limit: usize,

    /// 归档保留步长（秒）
    pub archive_step_time_secs: u64,

    /// 持续跟踪的轮询间隔（毫秒）
    #[validate(range(min = 10, max = 3600000))]
    pub follow_interval_ms: u64,

    /// 每次搜索的作业关联缓存容量
    #[validate(range(min = 1))]
    pub join_cache_capacity: usize,

    #[validate(nested)]
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            log_dir: "log".to_string(),
            log_prefix: "OUTPUT_LOG.".to_string(),
            fifo_dir: "fifodir".to_string(),
            max_log_files: 7,
            switch_file_time_secs: 86400,
            batch_size: 1000,
            scan_limit_per_step: 10000,
            list_limit: 0,
            archive_step_time_secs: 240,
            follow_interval_ms: 1000,
            join_cache_capacity: 1024,
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// 以给定工作目录和默认值构造
    pub fn with_work_dir(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            ..Default::default()
        }
    }

    /**
     * 分层加载配置并验证
     *
     * # 参数
     * * `path` - 可选的 TOML 配置文件；文件不存在时忽略
     */
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = config::Config::try_from(&Self::default())
            .map_err(|e| AppError::Config(e.to_string()))?;

        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            );
        }
        builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"));

        let loaded: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| AppError::Config(e.to_string()))?;
        loaded.validate_all()?;
        Ok(loaded)
    }

    /// 运行全部验证规则
    pub fn validate_all(&self) -> Result<()> {
        self.validate()
            .map_err(|e| AppError::validation_error(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| AppError::Config(e.to_string()))
    }

    /// 日志分段所在目录
    pub fn log_path(&self) -> PathBuf {
        self.work_dir.join(&self.log_dir)
    }

    /// 元数据表所在目录
    pub fn fifo_path(&self) -> PathBuf {
        self.work_dir.join(&self.fifo_dir)
    }

    /// 列表上限；0 表示不限
    pub fn list_limit(&self) -> Option<usize> {
        (self.list_limit > 0).then_some(self.list_limit)
    }
}
