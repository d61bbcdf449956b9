/*!
 * 日志与追踪初始化
 *
 * 使用 tracing-subscriber 组合过滤器和输出层，可选按天滚动的文件输出。
 */
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{AppError, Result};
use crate::infrastructure::config::LoggingConfig;

/**
 * 安装全局 tracing 订阅者
 *
 * `RUST_LOG` 优先于配置中的级别。配置了日志目录时额外写入按天滚动的文件，
 * 返回的 `WorkerGuard` 必须在进程存活期间保持，否则缓冲的日志会丢失。
 * 全局订阅者已存在时不做任何事。
 */
pub fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| AppError::Config(format!("invalid log filter '{}': {}", config.level, e)))?;

    let (file_writer, guard) = match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(file_writer.map(|w| fmt::layer().json().with_ansi(false).with_writer(w)))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(file_writer.map(|w| fmt::layer().with_ansi(false).with_writer(w)))
            .try_init()
    };

    match installed {
        Ok(()) => {
            tracing::info!(level = %config.level, json = config.json, "Tracing initialized");
            Ok(guard)
        }
        // 已有全局订阅者（例如测试中重复初始化）
        Err(_) => Ok(None),
    }
}
