//! ---
//! kf_section: "04-configuration-orchestration"
//! kf_subsection: "module"
//! kf_type: "source"
//! kf_scope: "code"
//! kf_description: "Cluster engine: node set, master election, and pipeline driver."
//! kf_version: "v0.0.0-prealpha"
//! kf_owner: "tbd"
//! ---
use std::sync::Arc;

use futures::future;
use indexmap::IndexMap;
use kforge_logging::{kf_info, kf_warn, log_system_event, LogContext, SystemEventOutcome};
use kforge_node::Node;

use crate::error::{EngineError, Result};
use crate::pipeline::{flatten, ConsoleObserver, Pipeline, Step, StepObserver};
use crate::settings::ClusterSettings;
use crate::topology::{self, Member};

/// Drives the deploy and update pipelines over an ordered set of nodes.
///
/// The node set is insertion ordered and unique by address. The master is
/// the first node added with the control-plane role and is kept as an index
/// into that set.
pub struct Engine {
    pub(crate) settings: Arc<ClusterSettings>,
    pub(crate) nodes: IndexMap<String, Arc<dyn Node>>,
    pub(crate) master: Option<usize>,
    observer: Arc<dyn StepObserver>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("settings", &self.settings)
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("master", &self.master_node().map(|node| node.address()))
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine with no nodes; step notifications go to stdout.
    pub fn new(settings: ClusterSettings) -> Self {
        Self {
            settings: Arc::new(settings),
            nodes: IndexMap::new(),
            master: None,
            observer: Arc::new(ConsoleObserver),
        }
    }

    /// Replace the default console step notification.
    pub fn with_observer(mut self, observer: Arc<dyn StepObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Cluster-wide settings.
    pub fn settings(&self) -> &ClusterSettings {
        &self.settings
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Arc<dyn Node>> + '_ {
        self.nodes.values()
    }

    /// The elected master, if any node declares the control-plane role.
    pub fn master_node(&self) -> Option<&Arc<dyn Node>> {
        self.master
            .and_then(|index| self.nodes.get_index(index))
            .map(|(_, node)| node)
    }

    /// Register a node. Rejects a second node with the same address.
    pub fn add_node(&mut self, node: Arc<dyn Node>) -> Result<()> {
        let address = node.address().to_owned();
        if self.nodes.contains_key(&address) {
            return Err(EngineError::DuplicateNode { address });
        }
        let is_control_plane = node.is_control_plane();
        let (index, _) = self.nodes.insert_full(address, node);
        if self.master.is_none() && is_control_plane {
            self.master = Some(index);
        }
        Ok(())
    }

    /// Verify topology invariants. Runs before every pipeline.
    pub fn check(&self) -> Result<()> {
        let members: Vec<Member<'_>> = self
            .nodes
            .values()
            .map(|node| Member {
                address: node.address(),
                roles: node.roles(),
            })
            .collect();
        topology::check(&members, self.settings.ntp.as_ref())
    }

    /// Run the deploy pipeline. An empty selector runs every step.
    pub async fn install(&self, selector: &str) -> Result<()> {
        self.execute(Pipeline::Deploy, selector).await
    }

    /// Run the update pipeline. An empty selector runs every step.
    pub async fn update(&self, selector: &str) -> Result<()> {
        self.execute(Pipeline::Update, selector).await
    }

    async fn execute(&self, pipeline: Pipeline, selector: &str) -> Result<()> {
        self.check()?;
        let steps = pipeline.select(selector)?;
        let ctx = LogContext::new().with_pipeline(pipeline.name());
        kf_info!(
            context = ctx,
            "starting {} pipeline with {} node(s)",
            pipeline,
            self.nodes.len()
        );

        let outcome = self.run_steps(pipeline, &steps).await;
        self.disconnect_all().await;

        match &outcome {
            Ok(()) => log_system_event(
                Some(&ctx),
                "pipeline.finished",
                "pipeline completed",
                SystemEventOutcome::Success,
            ),
            Err(err) => log_system_event(
                Some(&ctx),
                "pipeline.finished",
                &err.to_string(),
                SystemEventOutcome::Fault,
            ),
        }
        outcome
    }

    async fn run_steps(&self, pipeline: Pipeline, steps: &[&'static Step]) -> Result<()> {
        for &step in steps {
            for entry in flatten(step) {
                self.observer.on_step(&entry.label, entry.step.name);
                let ctx = LogContext::new()
                    .with_pipeline(pipeline.name())
                    .with_step(&entry.label);
                let Some(action) = entry.step.action else {
                    continue;
                };
                if let Err(err) = self.run_action(action, &entry.label).await {
                    log_system_event(
                        Some(&ctx),
                        "step.finished",
                        &format!("{} failed: {}", entry.step.name, err),
                        SystemEventOutcome::Fault,
                    );
                    return Err(err);
                }
                log_system_event(
                    Some(&ctx),
                    "step.finished",
                    entry.step.name,
                    SystemEventOutcome::Success,
                );
            }
        }
        Ok(())
    }

    /// Release every session. Failures are logged and do not change the run's outcome.
    async fn disconnect_all(&self) {
        let results = future::join_all(self.nodes.values().map(|node| node.disconnect())).await;
        for (node, result) in self.nodes.values().zip(results) {
            if let Err(err) = result {
                kf_warn!(
                    context = LogContext::new().with_node(node.address()),
                    "disconnect failed: {}",
                    err
                );
            }
        }
    }

    pub(crate) fn require_master(&self) -> Result<Arc<dyn Node>> {
        self.master_node().cloned().ok_or(EngineError::NoMaster)
    }

    pub(crate) fn is_master(&self, node: &dyn Node) -> bool {
        self.master_node()
            .map(|master| master.address() == node.address())
            .unwrap_or(false)
    }

    pub(crate) fn select<P>(&self, predicate: P) -> Vec<Arc<dyn Node>>
    where
        P: Fn(&dyn Node) -> bool,
    {
        self.nodes
            .values()
            .filter(|node| predicate(node.as_ref()))
            .cloned()
            .collect()
    }
}
