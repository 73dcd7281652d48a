use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tickd_domain::{Worker, WorkerRegistry};
use tokio::sync::RwLock;

/// Name-to-worker lookup backed by a map, populated at startup.
pub struct InMemoryWorkerRegistry {
    workers: RwLock<HashMap<String, Arc<dyn Worker>>>,
}

impl InMemoryWorkerRegistry {
    pub fn new() -> Self {
        Self {
            workers: RwLock::new(HashMap::new()),
        }
    }

    /// A registry holding the built-in shell and http workers.
    pub fn with_builtin_workers() -> Self {
        let mut workers: HashMap<String, Arc<dyn Worker>> = HashMap::new();
        let shell: Arc<dyn Worker> = Arc::new(crate::workers::ShellWorker::new());
        let http: Arc<dyn Worker> = Arc::new(crate::workers::HttpWorker::new());
        workers.insert(shell.name().to_string(), shell);
        workers.insert(http.name().to_string(), http);
        Self {
            workers: RwLock::new(workers),
        }
    }
}

impl Default for InMemoryWorkerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkerRegistry for InMemoryWorkerRegistry {
    async fn register(&self, worker: Arc<dyn Worker>) {
        let mut workers = self.workers.write().await;
        workers.insert(worker.name().to_string(), worker);
    }

    async fn get(&self, name: &str) -> Option<Arc<dyn Worker>> {
        let workers = self.workers.read().await;
        workers.get(name).cloned()
    }

    async fn names(&self) -> Vec<String> {
        let workers = self.workers.read().await;
        workers.keys().cloned().collect()
    }
}
