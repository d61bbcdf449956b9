//! 作业元数据存储层
//!
//! 只读访问外部维护的作业表、目录表和目录选项表。

pub mod job_tables;
pub mod join_cache;
pub mod recipient;

pub use job_tables::{JobTables, MappedTable, MetadataStore};
pub use join_cache::JoinCache;
pub use recipient::parse_recipient;
