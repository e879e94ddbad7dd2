//! Background rollup scheduler
//!
//! Runs a rollup pass over every registered agent rollup on a fixed cadence.
//! Within a pass, deeper nodes go first (agents before their groups) so the
//! from-children phase of a parent sees everything its children just
//! produced, and each agent rollup runs at most once at a time. A pass does
//! not have to finish the world: anything it leaves behind is still queued
//! for the next pass.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::core::constants::{DEFAULT_ROLLUP_PASS_INTERVAL_SECS, DEFAULT_ROLLUP_WORKERS};
use crate::core::shutdown::ShutdownSignal;
use crate::data::aggregate::AggregateStore;
use crate::utils::retry::retry_transient;

/// One node in the agent-rollup tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRollup {
    pub id: String,
    pub parent_id: Option<String>,
    /// True for agents, false for aggregation groups
    pub leaf: bool,
}

impl AgentRollup {
    /// The full chain of nodes implied by one hierarchical agent id,
    /// leaf first
    pub fn chain(agent_id: &str) -> Vec<AgentRollup> {
        let ids = AggregateStore::agent_rollup_ids(agent_id);
        ids.iter()
            .enumerate()
            .map(|(i, id)| AgentRollup {
                id: id.clone(),
                parent_id: ids.get(i + 1).cloned(),
                leaf: i == 0,
            })
            .collect()
    }

    fn depth(&self) -> usize {
        self.id.matches("::").count()
    }
}

/// Source of the agent rollups each pass processes
pub trait AgentRollupRegistry: Send + Sync {
    fn agent_rollups(&self) -> Vec<AgentRollup>;
}

/// Fixed registry, for deployments whose hierarchy comes from configuration
pub struct StaticAgentRollups(pub Vec<AgentRollup>);

impl AgentRollupRegistry for StaticAgentRollups {
    fn agent_rollups(&self) -> Vec<AgentRollup> {
        self.0.clone()
    }
}

pub struct RollupService {
    store: Arc<AggregateStore>,
    registry: Arc<dyn AgentRollupRegistry>,
    pass_interval: Duration,
    workers: usize,
}

impl RollupService {
    pub fn new(store: Arc<AggregateStore>, registry: Arc<dyn AgentRollupRegistry>) -> Self {
        Self {
            store,
            registry,
            pass_interval: Duration::from_secs(DEFAULT_ROLLUP_PASS_INTERVAL_SECS),
            workers: DEFAULT_ROLLUP_WORKERS,
        }
    }

    pub fn with_pass_interval(mut self, pass_interval: Duration) -> Self {
        self.pass_interval = pass_interval;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Spawn the scheduling loop; it stops at the next opportunity once the
    /// shutdown signal triggers
    pub fn start(self, shutdown: ShutdownSignal) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.pass_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut shutdown_wait = shutdown.clone();
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_wait.triggered() => break,
                    _ = interval.tick() => {
                        self.run_pass(&shutdown).await;
                        if shutdown.is_triggered() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Rollup scheduler shutdown complete");
        })
    }

    /// One pass over every registered agent rollup, deepest level first.
    ///
    /// Each depth level is a barrier: all of its rollups finish before the
    /// next (shallower) level starts, so parents always see their children's
    /// fresh level-0 data.
    pub async fn run_pass(&self, shutdown: &ShutdownSignal) {
        let mut by_depth: BTreeMap<std::cmp::Reverse<usize>, Vec<AgentRollup>> = BTreeMap::new();
        for agent_rollup in self.registry.agent_rollups() {
            by_depth
                .entry(std::cmp::Reverse(agent_rollup.depth()))
                .or_default()
                .push(agent_rollup);
        }
        let semaphore = Arc::new(Semaphore::new(self.workers));
        for (_, level) in by_depth {
            if shutdown.is_triggered() {
                return;
            }
            let mut handles = Vec::with_capacity(level.len());
            for agent_rollup in level {
                let store = self.store.clone();
                let semaphore = semaphore.clone();
                let shutdown = shutdown.clone();
                handles.push(tokio::spawn(async move {
                    let _permit = semaphore.acquire().await.expect("semaphore never closed");
                    let result = retry_transient(&agent_rollup.id, || {
                        store.rollup(
                            &agent_rollup.id,
                            agent_rollup.parent_id.as_deref(),
                            agent_rollup.leaf,
                            &shutdown,
                        )
                    })
                    .await;
                    if let Err(e) = result {
                        tracing::error!(
                            agent_rollup_id = %agent_rollup.id,
                            error = %e,
                            "Rollup failed; queue entries remain for the next pass"
                        );
                    }
                }));
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::error!(error = %e, "Rollup task panicked");
                }
            }
        }
    }
}
