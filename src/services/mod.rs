pub mod boundary_search;
pub mod extractor;
pub mod file_watcher;
pub mod pattern_matcher;
pub mod predicate;
pub mod record_parser;
pub mod search_statistics;
pub mod segment_locator;

pub use boundary_search::{find_boundary, window_range};
pub use extractor::{BatchLimits, ExtractedBatch, Extractor};
pub use file_watcher::{read_from_offset, StopReason, TailController, TailCursor, TailEvent, TailState};
pub use pattern_matcher::{GlobPattern, GlobSet};
pub use predicate::{CompiledPredicate, Filter, JobLookup, NoJobs};
pub use record_parser::{decode_record, format_record_line, scan_field, ArchiveClock, FieldCursor};
pub use segment_locator::SegmentLocator;
