//! 搜索引擎
//!
//! - [`manager`]: 引擎入口，开始、推进、取消搜索以及持续跟踪
//! - [`session`]: 单次搜索的全部状态
//! - [`follow`]: 基于 tokio 定时器的持续模式循环

pub mod follow;
pub mod manager;
pub mod session;

pub use follow::run_follow;
pub use manager::LogQueryEngine;
pub use session::{BatchResult, SearchHandle, SearchState, SegmentResult};
