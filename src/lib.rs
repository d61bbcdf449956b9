//! 传输日志查询引擎
//!
//! 在按轮转编号排列的传输日志分段中按时间窗口、协议、文件名、大小、
//! 收件人和目录搜索记录，分步产出结果并维护汇总统计，
//! 搜索完成后可以持续跟踪最新分段。

pub mod error;
pub mod infrastructure;
pub mod models;
pub mod monitoring;
pub mod search_engine;
pub mod services;
pub mod storage;

pub use error::{AppError, Result};
pub use infrastructure::config::{EngineConfig, LoggingConfig};
pub use models::{Protocol, ProtocolMask, Record, SearchCriteria, SummaryStats};
pub use search_engine::{run_follow, BatchResult, LogQueryEngine, SearchHandle, SearchState};
