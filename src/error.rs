use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/**
 * 查询引擎错误类型 - 使用 miette 提供用户友好的错误诊断
 *
 * 只有 I/O 失败和元数据表版本不匹配会作为错误返回给调用方；
 * 缺失的分段、格式错误的记录以及列表上限都在引擎内部消化。
 */
#[derive(Error, Debug, Diagnostic)]
pub enum AppError {
    #[error("IO error: {0}")]
    #[diagnostic(code(tlog::io_error))]
    Io(#[from] std::io::Error),

    #[error("Log segment error: {message}")]
    #[diagnostic(
        code(tlog::segment_io),
        help("Check that the log directory is readable and the segment was not removed mid-search")
    )]
    SegmentIo {
        message: String,
        path: Option<PathBuf>,
    },

    #[error("Metadata table error: {message}")]
    #[diagnostic(
        code(tlog::metadata_io),
        help("The job metadata tables are maintained by the distribution daemon; make sure it has written them")
    )]
    MetadataIo {
        message: String,
        path: Option<PathBuf>,
    },

    #[error("Incorrect {table} version (data={found} current={expected})")]
    #[diagnostic(
        code(tlog::version_mismatch),
        help("The metadata writer and this viewer disagree on the table format")
    )]
    VersionMismatch {
        table: &'static str,
        found: u8,
        expected: u8,
    },

    #[error("Not found: {0}")]
    #[diagnostic(code(tlog::not_found))]
    NotFound(String),

    #[error("Validation error: {0}")]
    #[diagnostic(
        code(tlog::validation_error),
        help("Check that your input meets the required format and constraints")
    )]
    Validation(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(code(tlog::config_error))]
    Config(String),

    #[error("Follow error: {0}")]
    #[diagnostic(code(tlog::follow_failed))]
    FollowFailed(String),

    #[error("Internal error: {0}")]
    #[diagnostic(code(tlog::internal_error))]
    Internal(String),
}

impl AppError {
    /**
     * 为错误添加上下文信息
     */
    pub fn with_context(self, context: impl Into<String>) -> Self {
        let context = context.into();
        match self {
            AppError::SegmentIo { message, path } => AppError::SegmentIo {
                message: format!("{}: {}", context, message),
                path,
            },
            AppError::MetadataIo { message, path } => AppError::MetadataIo {
                message: format!("{}: {}", context, message),
                path,
            },
            AppError::FollowFailed(message) => {
                AppError::FollowFailed(format!("{}: {}", context, message))
            }
            other => other,
        }
    }

    /**
     * 创建日志分段 I/O 错误
     */
    pub fn segment_io(message: impl Into<String>, path: Option<PathBuf>) -> Self {
        AppError::SegmentIo {
            message: message.into(),
            path,
        }
    }

    /**
     * 创建元数据表 I/O 错误
     */
    pub fn metadata_io(message: impl Into<String>, path: Option<PathBuf>) -> Self {
        AppError::MetadataIo {
            message: message.into(),
            path,
        }
    }

    /**
     * 创建验证错误
     */
    pub fn validation_error(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    /**
     * 创建未找到错误
     */
    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    /// 该错误是否由元数据关联导致（搜索可以在不需要关联的谓词上继续）
    pub fn is_metadata_error(&self) -> bool {
        matches!(
            self,
            AppError::MetadataIo { .. } | AppError::VersionMismatch { .. }
        )
    }
}

/**
 * 统一结果类型
 */
pub type Result<T> = std::result::Result<T, AppError>;
