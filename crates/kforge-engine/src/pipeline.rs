//! ---
//! kf_section: "04-configuration-orchestration"
//! kf_subsection: "module"
//! kf_type: "source"
//! kf_scope: "code"
//! kf_description: "Static step tables, step selection, and progress notification."
//! kf_version: "v0.0.0-prealpha"
//! kf_owner: "tbd"
//! ---
use std::fmt;

use crate::error::{EngineError, Result};

/// Engine operation bound to a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Open a session to every node.
    Connect,
    /// Mark nodes already in the live cluster as not new.
    CheckNew,
    /// Bootstrap new nodes and write the hosts mesh.
    Init,
    /// Time synchronisation.
    InstallChrony,
    /// Container runtime.
    InstallDocker,
    /// Preload base images.
    LoadDockerImage,
    /// Cluster tooling.
    InstallKubeadm,
    /// Package manager on the master.
    InstallHelm,
    /// API load balancer on etcd nodes.
    InstallHaproxy,
    /// VIP failover on etcd nodes.
    InstallKeepalived,
    /// Initialise the cluster on the master and join the rest.
    StartK8s,
    /// Network plugin.
    InstallCalico,
    /// NFS client utilities everywhere plus the provisioner on the master.
    MountStorage,
    /// Service mesh.
    InstallIstio,
    /// Application payload.
    InstallApp,
    /// NFS client utilities on new nodes.
    InstallNfsUtils,
    /// Join new nodes to an existing cluster.
    JoinNode,
}

/// A named, numbered pipeline step. Children only affect display numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    /// 1-based position among siblings.
    pub number: usize,
    /// Human-readable name.
    pub name: &'static str,
    /// Operation to run, if any.
    pub action: Option<Action>,
    /// Nested steps run after this one.
    pub children: &'static [Step],
}

impl Step {
    /// Leaf step bound to an action.
    pub const fn new(number: usize, name: &'static str, action: Action) -> Self {
        Self {
            number,
            name,
            action: Some(action),
            children: &[],
        }
    }

    /// Group step without its own action.
    pub const fn group(number: usize, name: &'static str, children: &'static [Step]) -> Self {
        Self {
            number,
            name,
            action: None,
            children,
        }
    }
}

/// Full installation of a new cluster.
pub static DEPLOY_STEPS: [Step; 14] = [
    Step::new(1, "connect", Action::Connect),
    Step::new(2, "init", Action::Init),
    Step::new(3, "install chrony", Action::InstallChrony),
    Step::new(4, "install docker", Action::InstallDocker),
    Step::new(5, "load docker image", Action::LoadDockerImage),
    Step::new(6, "install kubeadm", Action::InstallKubeadm),
    Step::new(7, "install helm", Action::InstallHelm),
    Step::new(8, "install haproxy", Action::InstallHaproxy),
    Step::new(9, "install keepalived", Action::InstallKeepalived),
    Step::new(10, "start k8s", Action::StartK8s),
    Step::new(11, "install calico", Action::InstallCalico),
    Step::new(12, "mount storage", Action::MountStorage),
    Step::new(13, "install istio", Action::InstallIstio),
    Step::new(14, "install app", Action::InstallApp),
];

/// Incremental extension of a running cluster with new nodes.
pub static UPDATE_STEPS: [Step; 9] = [
    Step::new(1, "connect", Action::Connect),
    Step::new(2, "check new", Action::CheckNew),
    Step::new(3, "init", Action::Init),
    Step::new(4, "install chrony", Action::InstallChrony),
    Step::new(5, "install docker", Action::InstallDocker),
    Step::new(6, "load docker image", Action::LoadDockerImage),
    Step::new(7, "install kubeadm", Action::InstallKubeadm),
    Step::new(8, "install nfs", Action::InstallNfsUtils),
    Step::new(9, "join node", Action::JoinNode),
];

/// Which step table to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipeline {
    /// [`DEPLOY_STEPS`].
    Deploy,
    /// [`UPDATE_STEPS`].
    Update,
}

impl Pipeline {
    /// Top-level steps of the pipeline.
    pub fn steps(&self) -> &'static [Step] {
        match self {
            Pipeline::Deploy => &DEPLOY_STEPS,
            Pipeline::Update => &UPDATE_STEPS,
        }
    }

    /// Lowercase pipeline name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Pipeline::Deploy => "deploy",
            Pipeline::Update => "update",
        }
    }

    /// Resolve a selector into top-level steps, in the given order.
    ///
    /// An empty selector selects every step.
    pub fn select(&self, selector: &str) -> Result<Vec<&'static Step>> {
        let steps = self.steps();
        if selector.trim().is_empty() {
            return Ok(steps.iter().collect());
        }
        parse_selector(selector)
            .into_iter()
            .map(|number| {
                number
                    .checked_sub(1)
                    .and_then(|index| steps.get(index))
                    .ok_or(EngineError::UnknownStep {
                        pipeline: self.name(),
                        number,
                    })
            })
            .collect()
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parse a comma-separated list of 1-based step numbers.
///
/// Step 1 is prepended unless the list already starts with it, and entries
/// that are not numbers are skipped.
pub fn parse_selector(selector: &str) -> Vec<usize> {
    let mut entries: Vec<&str> = selector.split(',').map(str::trim).collect();
    if entries.first() != Some(&"1") {
        entries.insert(0, "1");
    }
    entries
        .into_iter()
        .filter_map(|entry| entry.parse::<usize>().ok())
        .collect()
}

/// A step together with its dotted display label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledStep {
    /// Label such as `10` or `2.1`.
    pub label: String,
    /// The step itself.
    pub step: &'static Step,
}

/// Pre-order walk of `step` and its children, labelling each with its dotted path.
pub fn flatten(step: &'static Step) -> Vec<LabeledStep> {
    let mut out = Vec::new();
    walk(step, None, &mut out);
    out
}

fn walk(step: &'static Step, parent: Option<&str>, out: &mut Vec<LabeledStep>) {
    let label = match parent {
        Some(parent) => format!("{}.{}", parent, step.number),
        None => step.number.to_string(),
    };
    out.push(LabeledStep {
        label: label.clone(),
        step,
    });
    for child in step.children {
        walk(child, Some(&label), out);
    }
}

/// `<label>: <name>` lines for every step of a pipeline, nested steps included.
pub fn listing(pipeline: Pipeline) -> Vec<String> {
    pipeline
        .steps()
        .iter()
        .flat_map(flatten)
        .map(|entry| format!("{}: {}", entry.label, entry.step.name))
        .collect()
}

/// Notified before each step runs.
pub trait StepObserver: Send + Sync {
    /// Called with the step's dotted label and name.
    fn on_step(&self, label: &str, name: &str);
}

/// Default observer printing `<label>) <name>` to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleObserver;

impl StepObserver for ConsoleObserver {
    fn on_step(&self, label: &str, name: &str) {
        println!("{}) {}", label, name);
    }
}
