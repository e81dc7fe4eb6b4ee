use std::collections::HashMap;
use std::sync::Arc;

use thunder_core::executor::Executor;
use thunder_graph::ExecutorLookup;

/// Central registry of executors keyed by name.
///
/// Built once at startup and shared read-only; the graph compiler resolves
/// node executor references against it.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, executor: Arc<dyn Executor>) {
        self.executors.insert(executor.name().to_string(), executor);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Executor>> {
        self.executors.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.executors.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

impl ExecutorLookup for ExecutorRegistry {
    fn has_executor(&self, name: &str) -> bool {
        self.executors.contains_key(name)
    }
}
