//! ---
//! kf_section: "04-configuration-orchestration"
//! kf_subsection: "module"
//! kf_type: "source"
//! kf_scope: "code"
//! kf_description: "Pipeline actions executed over the node set."
//! kf_version: "v0.0.0-prealpha"
//! kf_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::sync::Arc;

use kforge_logging::{kf_info, kf_warn, LogContext};
use kforge_node::Node;
use tokio::sync::Mutex;

use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::fanout::fan_out;
use crate::join::{
    join_invocation, parse_join_commands, JoinCommands, CONTROL_PLANE_TOKEN, UPLOAD_CERTS,
    WORKER_TOKEN,
};
use crate::pipeline::Action;

/// Working directory of the cluster init payload on every node.
pub const KUBEADM_DIR: &str = "resource/kubeadm";
/// Working directory of the network plugin payload.
pub const CALICO_DIR: &str = "resource/calico";
/// Lists the hostnames of live cluster members, one per line.
pub const LIST_NODE_NAMES: &str = "kubectl get nodes|awk '{print $1}'";

/// Keeps a blank value in its positional slot on the install script's command line.
fn positional(value: &str) -> String {
    if value.is_empty() {
        "\"\"".to_owned()
    } else {
        value.to_owned()
    }
}

async fn install(node: Arc<dyn Node>, name: &'static str, args: Vec<String>) -> Result<()> {
    node.install(name, &args).await.map_err(EngineError::from)
}

/// Run a command whose failure is logged and otherwise ignored.
async fn best_effort(node: &dyn Node, cwd: Option<&str>, command: String) {
    let ctx = LogContext::new().with_node(node.address());
    match node.run(cwd, &[command.clone()]).await {
        Ok(output) if !output.trim().is_empty() => kf_info!(context = ctx, "{}", output.trim_end()),
        Ok(_) => {}
        Err(err) => kf_warn!(context = ctx, "ignoring failure of `{}`: {}", command, err),
    }
}

async fn best_effort_install(node: &dyn Node, name: &str) {
    if let Err(err) = node.install(name, &[]).await {
        kf_warn!(
            context = LogContext::new().with_node(node.address()),
            "ignoring failed {} install: {}",
            name,
            err
        );
    }
}

impl Engine {
    pub(crate) async fn run_action(&self, action: Action, step: &str) -> Result<()> {
        match action {
            Action::Connect => self.connect(step).await,
            Action::CheckNew => self.check_new().await,
            Action::Init => self.init(step).await,
            Action::InstallChrony => self.install_chrony(step).await,
            Action::InstallDocker => {
                let args = vec![self.settings.registry.clone()];
                fan_out(step, self.new_nodes(), move |node| {
                    install(node, "docker", args.clone())
                })
                .await
            }
            Action::LoadDockerImage => {
                fan_out(step, self.new_nodes(), |node| {
                    install(node, "docker/images", Vec::new())
                })
                .await
            }
            Action::InstallKubeadm => {
                fan_out(step, self.new_nodes(), |node| {
                    install(node, "kubeadm", Vec::new())
                })
                .await
            }
            Action::InstallHelm => {
                best_effort_install(self.require_master()?.as_ref(), "helm").await;
                Ok(())
            }
            Action::InstallHaproxy => self.install_haproxy(step).await,
            Action::InstallKeepalived => self.install_keepalived(step).await,
            Action::StartK8s => self.start_k8s(step).await,
            Action::InstallCalico => self.install_calico(step).await,
            Action::MountStorage => self.mount_storage(step).await,
            Action::InstallIstio => {
                fan_out(step, self.all_nodes(), |node| {
                    install(node, "istio/images", Vec::new())
                })
                .await?;
                self.require_master()?.install("istio", &[]).await?;
                Ok(())
            }
            Action::InstallApp => {
                fan_out(step, self.all_nodes(), |node| {
                    install(node, "app/images", Vec::new())
                })
                .await?;
                best_effort_install(self.require_master()?.as_ref(), "app").await;
                Ok(())
            }
            Action::InstallNfsUtils => self.install_nfs_utils(step).await,
            Action::JoinNode => self.join(step).await,
        }
    }

    fn all_nodes(&self) -> Vec<Arc<dyn Node>> {
        self.select(|_| true)
    }

    fn new_nodes(&self) -> Vec<Arc<dyn Node>> {
        self.select(|node| node.is_new())
    }

    async fn connect(&self, step: &str) -> Result<()> {
        fan_out(step, self.all_nodes(), |node| async move {
            node.connect().await.map_err(EngineError::from)
        })
        .await
    }

    async fn check_new(&self) -> Result<()> {
        let master = self.require_master()?;
        let output = master.run(None, &[LIST_NODE_NAMES.to_owned()]).await?;
        let members: HashSet<&str> = output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        let mut existing = 0usize;
        for node in self.nodes.values() {
            if members.contains(node.hostname()) {
                node.set_new(false);
                existing += 1;
            }
        }
        kf_info!(
            context = LogContext::new().with_node(master.address()),
            "{} node(s) already in the cluster, {} new",
            existing,
            self.nodes.len() - existing
        );
        Ok(())
    }

    async fn init(&self, step: &str) -> Result<()> {
        let hosts: Arc<Vec<(String, String)>> = Arc::new(
            self.nodes
                .values()
                .map(|node| (node.address().to_owned(), node.hostname().to_owned()))
                .collect(),
        );
        fan_out(step, self.new_nodes(), move |node| {
            init_node(node, Arc::clone(&hosts))
        })
        .await
    }

    async fn install_chrony(&self, step: &str) -> Result<()> {
        let Some(ntp) = &self.settings.ntp else {
            kf_info!("no ntp server configured; skipping chrony");
            return Ok(());
        };
        let args = vec![
            positional(&ntp.server),
            positional(ntp.allow.as_deref().unwrap_or_default()),
            positional(&ntp.timezone),
        ];
        fan_out(step, self.new_nodes(), move |node| {
            install(node, "chrony", args.clone())
        })
        .await
    }

    async fn install_haproxy(&self, step: &str) -> Result<()> {
        let servers: Vec<String> = self
            .nodes
            .values()
            .filter(|node| node.is_control_plane())
            .map(|node| format!("'server {} {}:6443 check'", node.hostname(), node.address()))
            .collect();
        fan_out(step, self.select(|node| node.is_etcd()), move |node| {
            install(node, "haproxy", servers.clone())
        })
        .await
    }

    async fn install_keepalived(&self, step: &str) -> Result<()> {
        let master = self.require_master()?.address().to_owned();
        let vip = positional(&self.settings.vip);
        fan_out(step, self.select(|node| node.is_etcd()), move |node| {
            keepalived_node(node, vip.clone(), master.clone())
        })
        .await
    }

    async fn start_k8s(&self, step: &str) -> Result<()> {
        let master = self.require_master()?;
        let ctx = LogContext::new().with_node(master.address());
        let script = format!(
            "bash start.sh {} {} {}",
            self.settings.vip,
            master.hostname(),
            master.address()
        );
        let output = master.run(Some(KUBEADM_DIR), &[script]).await?;
        kf_info!(context = ctx, "{}", output.trim_end());

        let joins = parse_join_commands(&output).ok_or_else(|| EngineError::JoinCommandNotFound {
            address: master.address().to_owned(),
        })?;
        kf_info!(context = ctx, "control-plane join: {}", joins.control_plane);
        kf_info!(context = ctx, "worker join: {}", joins.worker);

        best_effort(master.as_ref(), Some(KUBEADM_DIR), "bash config.sh".to_owned()).await;
        best_effort(
            master.as_ref(),
            None,
            format!(
                "kubectl taint node {} node-role.kubernetes.io/master-",
                master.hostname()
            ),
        )
        .await;

        let joins = Arc::new(joins);
        let rest = self.select(|node| !self.is_master(node));
        fan_out(step, rest, move |node| join_after_init(node, Arc::clone(&joins))).await
    }

    async fn install_calico(&self, step: &str) -> Result<()> {
        fan_out(step, self.all_nodes(), |node| {
            install(node, "calico", Vec::new())
        })
        .await?;
        let master = self.require_master()?;
        let output = master
            .run(Some(CALICO_DIR), &["kubectl apply -f calico.yaml".to_owned()])
            .await?;
        kf_info!(
            context = LogContext::new().with_node(master.address()),
            "{}",
            output.trim_end()
        );
        Ok(())
    }

    async fn install_nfs_utils(&self, step: &str) -> Result<()> {
        fan_out(step, self.new_nodes(), |node| {
            install(node, "nfs/nfs-utils", Vec::new())
        })
        .await
    }

    async fn mount_storage(&self, step: &str) -> Result<()> {
        self.install_nfs_utils(step).await?;
        let Some(nfs) = &self.settings.nfs else {
            kf_info!("no nfs server configured; skipping provisioner");
            return Ok(());
        };
        let args = [
            positional(&nfs.server),
            positional(&nfs.path),
            positional(&self.settings.namespace),
        ];
        self.require_master()?.install("nfs", &args).await?;
        Ok(())
    }

    async fn join(&self, step: &str) -> Result<()> {
        let master = self.require_master()?;
        let control_plane = master
            .run(None, &[CONTROL_PLANE_TOKEN.to_owned()])
            .await?
            .trim()
            .to_owned();
        let worker = master
            .run(None, &[WORKER_TOKEN.to_owned()])
            .await?
            .trim()
            .to_owned();
        let tokens = Arc::new(JoinTokens {
            master,
            cri_socket: self.settings.cri_socket.clone(),
            worker,
            control_plane: Mutex::new(control_plane),
        });
        fan_out(step, self.new_nodes(), move |node| {
            join_new_node(node, Arc::clone(&tokens))
        })
        .await
    }
}

async fn init_node(node: Arc<dyn Node>, hosts: Arc<Vec<(String, String)>>) -> Result<()> {
    let args = [
        positional(&node.spec().encoded_password()),
        positional(node.hostname()),
    ];
    node.install("init", &args).await?;
    for (address, hostname) in hosts.iter().filter(|(address, _)| address != node.address()) {
        node.add_host(address, hostname).await?;
    }
    Ok(())
}

async fn keepalived_node(node: Arc<dyn Node>, vip: String, master: String) -> Result<()> {
    let is_master = node.address() == master;
    let state = if is_master { "MASTER" } else { "BACKUP" };
    let args = [vip, state.to_owned(), node.address().to_owned()];
    node.install("keepalived", &args).await?;
    if !is_master {
        node.stop_service("keepalived").await?;
    }
    Ok(())
}

async fn join_after_init(node: Arc<dyn Node>, joins: Arc<JoinCommands>) -> Result<()> {
    if node.is_control_plane() {
        node.run(None, &[joins.control_plane.clone()]).await?;
        best_effort(node.as_ref(), Some(KUBEADM_DIR), "bash config.sh".to_owned()).await;
        best_effort(
            node.as_ref(),
            None,
            format!(
                "kubectl taint node {} node-role.kubernetes.io/control-plane-",
                node.hostname()
            ),
        )
        .await;
    } else {
        node.run(None, &[joins.worker.clone()]).await?;
    }
    Ok(())
}

/// Join credentials shared by the update fan-out.
///
/// The control-plane command sits behind a lock so that concurrent failures
/// trigger a single certificate re-upload.
struct JoinTokens {
    master: Arc<dyn Node>,
    cri_socket: String,
    worker: String,
    control_plane: Mutex<String>,
}

impl JoinTokens {
    /// Re-upload certificates and print a fresh control-plane join, unless
    /// another node already replaced the command that failed.
    async fn refresh(&self, failed: &str) -> Result<String> {
        let mut current = self.control_plane.lock().await;
        if current.as_str() == failed {
            self.master.run(None, &[UPLOAD_CERTS.to_owned()]).await?;
            *current = self
                .master
                .run(None, &[CONTROL_PLANE_TOKEN.to_owned()])
                .await?
                .trim()
                .to_owned();
        }
        Ok(current.clone())
    }
}

async fn join_new_node(node: Arc<dyn Node>, tokens: Arc<JoinTokens>) -> Result<()> {
    for payload in ["docker/images", "istio/images", "app/images"] {
        node.install(payload, &[]).await?;
    }
    if !node.is_control_plane() {
        node.run(None, &[join_invocation(&tokens.worker, &tokens.cri_socket)])
            .await?;
        return Ok(());
    }

    let printed = tokens.control_plane.lock().await.clone();
    if let Err(err) = node
        .run(None, &[join_invocation(&printed, &tokens.cri_socket)])
        .await
    {
        kf_warn!(
            context = LogContext::new().with_node(node.address()),
            "control-plane join failed, refreshing certificate key: {}",
            err
        );
        let fresh = tokens.refresh(&printed).await?;
        node.run(None, &[join_invocation(&fresh, &tokens.cri_socket)])
            .await?;
    }
    Ok(())
}
