pub mod criteria;
pub mod item_list;
pub mod job;
pub mod record;
pub mod search_statistics;
pub mod segment;

// 重新导出核心类型
pub use criteria::{NameField, RecipientFilter, SearchCriteria, SizeComparator, SizeFilter};
pub use item_list::ItemList;
pub use job::{DirectoryRecord, JobRecord, RecipientParts};
pub use record::{ArchiveState, Protocol, ProtocolMask, Record};
pub use search_statistics::SummaryStats;
pub use segment::{FileIdentity, LogSegment};
