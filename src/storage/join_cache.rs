use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::error::Result;
use crate::models::job::JobRecord;
use crate::services::predicate::JobLookup;
use crate::storage::job_tables::MetadataStore;

struct CacheState {
    generation: u64,
    entries: LruCache<u32, Option<Arc<JobRecord>>>,
}

/**
 * 带 LRU 缓存的作业关联
 *
 * 同一个作业 ID 在日志中反复出现，缓存避免每条记录都线性扫描作业表。
 * 元数据表重新映射后缓存整体失效。未找到的结果同样缓存。
 */
pub struct JoinCache {
    store: Arc<MetadataStore>,
    state: Mutex<CacheState>,
}

impl JoinCache {
    pub fn new(store: Arc<MetadataStore>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        let generation = store.generation();
        Self {
            store,
            state: Mutex::new(CacheState {
                generation,
                entries: LruCache::new(capacity),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }
}

impl JobLookup for JoinCache {
    fn lookup(&self, job_id: u32) -> Result<Option<Arc<JobRecord>>> {
        let mut state = self.state.lock();
        let generation = self.store.generation();
        if state.generation != generation {
            state.entries.clear();
            state.generation = generation;
        }
        if let Some(hit) = state.entries.get(&job_id) {
            return Ok(hit.clone());
        }

        let job = self.store.find_job(job_id)?.map(Arc::new);
        state.entries.put(job_id, job.clone());
        Ok(job)
    }
}

impl std::fmt::Debug for JoinCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinCache")
            .field("fifo_dir", &self.store.fifo_dir())
            .field("cached", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lookup_errors_are_not_cached() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MetadataStore::new(dir.path()));
        let cache = JoinCache::new(store, 4);

        assert!(cache.lookup(1).is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let dir = TempDir::new().unwrap();
        let cache = JoinCache::new(Arc::new(MetadataStore::new(dir.path())), 0);
        assert!(cache.is_empty());
        cache.clear();
    }
}
