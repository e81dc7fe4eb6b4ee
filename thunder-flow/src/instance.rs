use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use thunder_core::context::FlowContext;
use thunder_graph::Graph;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// One in-flight flow traversal: the mutable context, the compiled graph it
/// runs against, and the instance-level cancellation token.
///
/// Holding the graph by `Arc` keeps historic graph versions alive for
/// long-lived instances even after cache eviction.
pub struct FlowInstance {
    context: Mutex<FlowContext>,
    graph: Arc<Graph>,
    last_touched: StdMutex<Instant>,
    cancel: CancellationToken,
}

impl FlowInstance {
    fn new(context: FlowContext, graph: Arc<Graph>) -> Self {
        Self {
            context: Mutex::new(context),
            graph,
            last_touched: StdMutex::new(Instant::now()),
            cancel: CancellationToken::new(),
        }
    }

    /// Acquire the per-instance lock. One advance at a time per flow id.
    pub async fn lock(&self) -> MutexGuard<'_, FlowContext> {
        self.context.lock().await
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn touch(&self) {
        *self.last_touched.lock().unwrap() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_touched.lock().unwrap().elapsed()
    }
}

/// Concurrent map of live flow instances keyed by flow id.
pub struct InstanceStore {
    instances: DashMap<String, Arc<FlowInstance>>,
    ttl: Duration,
}

impl InstanceStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            instances: DashMap::new(),
            ttl,
        }
    }

    pub fn insert(&self, context: FlowContext, graph: Arc<Graph>) -> Arc<FlowInstance> {
        let flow_id = context.flow_id.clone();
        let instance = Arc::new(FlowInstance::new(context, graph));
        self.instances.insert(flow_id, instance.clone());
        instance
    }

    pub fn get(&self, flow_id: &str) -> Option<Arc<FlowInstance>> {
        self.instances.get(flow_id).map(|entry| entry.value().clone())
    }

    /// Remove an instance on terminal status or cancellation. A removed
    /// instance's running advance may still finish against its own `Arc`.
    pub fn remove(&self, flow_id: &str) -> Option<Arc<FlowInstance>> {
        self.instances.remove(flow_id).map(|(_, instance)| instance)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Cancel and drop every instance idle past the TTL. Returns how many
    /// were swept.
    pub fn sweep_idle(&self) -> usize {
        let mut swept = Vec::new();
        self.instances.retain(|flow_id, instance| {
            if instance.idle_for() >= self.ttl {
                instance.cancel_token().cancel();
                swept.push(flow_id.clone());
                false
            } else {
                true
            }
        });
        for flow_id in &swept {
            debug!(flow_id = %flow_id, "Swept idle flow instance");
        }
        swept.len()
    }
}

/// Run the idle-instance sweep on an interval until the token is cancelled.
pub fn spawn_sweeper(
    store: Arc<InstanceStore>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Instance sweeper shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    let swept = store.sweep_idle();
                    if swept > 0 {
                        info!(count = swept, "Swept idle flow instances");
                    }
                }
            }
        }
    })
}
