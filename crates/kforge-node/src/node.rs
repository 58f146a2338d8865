//! ---
//! kf_section: "02-remote-node"
//! kf_subsection: "module"
//! kf_type: "source"
//! kf_scope: "code"
//! kf_description: "Interface every managed node implements."
//! kf_version: "v0.0.0-prealpha"
//! kf_owner: "tbd"
//! ---
use std::fmt::Debug;

use async_trait::async_trait;
use kforge_common::role::{Role, RoleSet};
use kforge_logging::{kf_debug, kf_info, LogContext};

use crate::command::{self, ServiceAction};
use crate::error::Result;
use crate::facts::NodeFacts;
use crate::spec::NodeSpec;

/// A managed host as the engine sees it.
///
/// `RemoteNode` is the production implementation; tests substitute a
/// recording double. All methods take `&self` so a node can be shared across
/// fan-out tasks behind an `Arc`.
#[async_trait]
pub trait Node: Send + Sync + Debug {
    fn spec(&self) -> &NodeSpec;

    /// True until the node's hostname is found in the live member list.
    fn is_new(&self) -> bool;

    fn set_new(&self, is_new: bool);

    /// Facts discovered at connect time; `None` before a successful connect.
    fn facts(&self) -> Option<&NodeFacts>;

    async fn connect(&self) -> Result<()>;

    /// Release the session. Safe to call on a node that never connected.
    async fn disconnect(&self) -> Result<()>;

    /// Run `commands` as one remote invocation and return standard output.
    async fn run(&self, cwd: Option<&str>, commands: &[String]) -> Result<String>;

    /// Copy the named resource directory to the node and run its install script.
    async fn install(&self, name: &str, args: &[String]) -> Result<()>;

    async fn read_file(&self, path: &str) -> Result<Vec<u8>>;

    fn address(&self) -> &str {
        &self.spec().address
    }

    fn hostname(&self) -> &str {
        &self.spec().hostname
    }

    fn roles(&self) -> RoleSet {
        self.spec().roles
    }

    fn is_etcd(&self) -> bool {
        self.spec().has_role(Role::Etcd)
    }

    fn is_control_plane(&self) -> bool {
        self.spec().has_role(Role::ControlPlane)
    }

    fn is_worker(&self) -> bool {
        self.spec().has_role(Role::Worker)
    }

    async fn add_host(&self, address: &str, name: &str) -> Result<()> {
        self.run_logged(vec![command::add_host(address, name)]).await
    }

    async fn remove_host(&self, name: &str) -> Result<()> {
        self.run_logged(vec![command::remove_host(name)]).await
    }

    async fn replace_host(&self, address: &str, name: &str) -> Result<()> {
        self.run_logged(command::replace_host(address, name)).await
    }

    async fn start_service(&self, name: &str) -> Result<()> {
        self.run_logged(vec![command::systemctl(ServiceAction::Start, name)])
            .await
    }

    async fn stop_service(&self, name: &str) -> Result<()> {
        self.run_logged(vec![command::systemctl(ServiceAction::Stop, name)])
            .await
    }

    #[doc(hidden)]
    async fn run_logged(&self, commands: Vec<String>) -> Result<()> {
        let ctx = LogContext::new().with_node(self.address());
        kf_debug!(context = ctx, "running {}", commands.join(" && "));
        let output = self.run(None, &commands).await?;
        if !output.trim().is_empty() {
            kf_info!(context = ctx, "{}", output.trim_end());
        }
        Ok(())
    }
}
