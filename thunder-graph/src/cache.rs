use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use thunder_core::flow::FlowDefinition;

use crate::compile::{compile, CompileError, ExecutorLookup};
use crate::model::Graph;

type CacheKey = (String, u32);

/// A thread-safe compiled-graph cache keyed by `(flow_id, version)` with
/// LRU eviction.
///
/// Compilation for a given key is synchronized with a double-checked
/// load-before-compile, so concurrent requests for the same definition
/// compile it once. Failed compiles are never cached. Entries for old
/// versions stay resident until evicted; long-lived instances may still
/// reference them.
pub struct GraphCache {
    capacity: usize,
    entries: DashMap<CacheKey, (Arc<Graph>, AtomicU64)>,
    locks: DashMap<CacheKey, Arc<Mutex<()>>>,
    clock: AtomicU64,
}

impl GraphCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: DashMap::new(),
            locks: DashMap::new(),
            clock: AtomicU64::new(0),
        }
    }

    fn touch(&self, stamp: &AtomicU64) {
        stamp.store(self.clock.fetch_add(1, Ordering::Relaxed) + 1, Ordering::Relaxed);
    }

    pub fn get(&self, flow_id: &str, version: u32) -> Option<Arc<Graph>> {
        let key = (flow_id.to_string(), version);
        self.entries.get(&key).map(|entry| {
            let (graph, stamp) = entry.value();
            self.touch(stamp);
            graph.clone()
        })
    }

    /// Fetch the compiled graph for a definition, compiling and inserting it
    /// on a miss.
    pub fn get_or_compile(
        &self,
        definition: &FlowDefinition,
        executors: &dyn ExecutorLookup,
    ) -> Result<Arc<Graph>, CompileError> {
        if let Some(graph) = self.get(&definition.id, definition.active_version) {
            return Ok(graph);
        }

        let key = (definition.id.clone(), definition.active_version);
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        // A racing caller may have compiled while we waited on the key lock
        if let Some(graph) = self.get(&definition.id, definition.active_version) {
            return Ok(graph);
        }

        let graph = Arc::new(compile(definition, executors)?);
        let stamp = AtomicU64::new(self.clock.fetch_add(1, Ordering::Relaxed) + 1);
        self.entries.insert(key.clone(), (graph.clone(), stamp));
        self.evict_over_capacity(&key);
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evict least-recently-used entries until within capacity, never the
    /// entry just inserted.
    fn evict_over_capacity(&self, keep: &CacheKey) {
        while self.entries.len() > self.capacity {
            let oldest = self
                .entries
                .iter()
                .filter(|entry| entry.key() != keep)
                .min_by_key(|entry| entry.value().1.load(Ordering::Relaxed))
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                    self.locks.remove(&key);
                }
                None => break,
            }
        }
    }
}
