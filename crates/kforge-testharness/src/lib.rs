//! ---
//! kf_section: "05-test-harness"
//! kf_subsection: "module"
//! kf_type: "source"
//! kf_scope: "code"
//! kf_description: "Recording node double and step observer shared by engine and CLI tests."
//! kf_version: "v0.0.0-prealpha"
//! kf_owner: "tbd"
//! ---
//! Test doubles for driving the engine without SSH.
//!
//! [`FakeNode`] records every call it receives and answers `run` from a
//! script of canned replies, so a test can assert on the exact commands a
//! pipeline would have sent to a cluster.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kforge_common::role::{Role, RoleSet};
use kforge_engine::StepObserver;
use kforge_node::{
    Arch, Credential, Node, NodeError, NodeFacts, NodeSpec, OsFamily, Result as NodeResult,
};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::debug;

/// One recorded interaction with a [`FakeNode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect,
    Disconnect,
    Run {
        cwd: Option<String>,
        command: String,
    },
    Install {
        name: String,
        args: Vec<String>,
    },
    ReadFile(String),
}

/// Canned answer for a scripted command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Output(String),
    Fail { status: i32, stderr: String },
}

impl Reply {
    pub fn output(out: impl Into<String>) -> Self {
        Reply::Output(out.into())
    }

    pub fn fail(stderr: impl Into<String>) -> Self {
        Reply::Fail {
            status: 1,
            stderr: stderr.into(),
        }
    }
}

#[derive(Debug)]
struct Script {
    needle: String,
    replies: VecDeque<Reply>,
}

/// In-memory node that records calls instead of opening a session.
#[derive(Debug)]
pub struct FakeNode {
    spec: NodeSpec,
    preset: NodeFacts,
    facts: OnceCell<NodeFacts>,
    is_new: AtomicBool,
    calls: Mutex<Vec<Call>>,
    scripts: Mutex<Vec<Script>>,
    failing_installs: Mutex<HashSet<String>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    connect_error: Mutex<Option<String>>,
    delay: Mutex<Option<Duration>>,
}

impl FakeNode {
    /// A password-authenticated node on ubuntu/x86_64 with home `/root`.
    pub fn new(address: &str, hostname: &str, roles: &[Role]) -> Self {
        let spec = NodeSpec {
            address: address.to_owned(),
            port: 22,
            hostname: hostname.to_owned(),
            roles: roles.iter().copied().collect::<RoleSet>(),
            credential: Credential::password("root", "secret"),
        };
        Self {
            spec,
            preset: NodeFacts {
                os: OsFamily::Ubuntu,
                arch: Arch::X86_64,
                home: "/root".to_owned(),
            },
            facts: OnceCell::new(),
            is_new: AtomicBool::new(true),
            calls: Mutex::new(Vec::new()),
            scripts: Mutex::new(Vec::new()),
            failing_installs: Mutex::new(HashSet::new()),
            files: Mutex::new(HashMap::new()),
            connect_error: Mutex::new(None),
            delay: Mutex::new(None),
        }
    }

    pub fn with_facts(mut self, os: OsFamily, arch: Arch) -> Self {
        self.preset.os = os;
        self.preset.arch = arch;
        self
    }

    /// Swap the default password login, e.g. for a key-authenticated node.
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.spec.credential = credential;
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Register replies for any command containing `needle`.
    ///
    /// Scripts are matched in registration order. Replies are consumed front
    /// to back and the last one repeats.
    pub fn script(&self, needle: &str, replies: impl IntoIterator<Item = Reply>) {
        self.scripts.lock().push(Script {
            needle: needle.to_owned(),
            replies: replies.into_iter().collect(),
        });
    }

    pub fn reply(&self, needle: &str, output: &str) {
        self.script(needle, [Reply::output(output)]);
    }

    pub fn fail_install(&self, name: &str) {
        self.failing_installs.lock().insert(name.to_owned());
    }

    pub fn fail_connect(&self, reason: &str) {
        *self.connect_error.lock() = Some(reason.to_owned());
    }

    pub fn put_file(&self, path: &str, contents: &[u8]) {
        self.files.lock().insert(path.to_owned(), contents.to_vec());
    }

    /// Sleep before answering each call, to force interleaving between tasks.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Commands passed to `run`, in order, without the working directory wrapper.
    pub fn commands(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::Run { command, .. } => Some(command.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn installs(&self) -> Vec<(String, Vec<String>)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::Install { name, args } => Some((name.clone(), args.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn installed(&self, name: &str) -> bool {
        self.installs().iter().any(|(installed, _)| installed == name)
    }

    pub fn ran(&self, needle: &str) -> bool {
        self.commands().iter().any(|command| command.contains(needle))
    }

    pub fn count(&self, wanted: &Call) -> usize {
        self.calls.lock().iter().filter(|call| *call == wanted).count()
    }

    fn record(&self, call: Call) {
        debug!(node = %self.spec.address, ?call, "fake node call");
        self.calls.lock().push(call);
    }

    async fn pause(&self) {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn scripted_reply(&self, command: &str) -> Option<Reply> {
        let mut scripts = self.scripts.lock();
        let script = scripts
            .iter_mut()
            .find(|script| command.contains(&script.needle) && !script.replies.is_empty())?;
        if script.replies.len() > 1 {
            script.replies.pop_front()
        } else {
            script.replies.front().cloned()
        }
    }
}

#[async_trait]
impl Node for FakeNode {
    fn spec(&self) -> &NodeSpec {
        &self.spec
    }

    fn is_new(&self) -> bool {
        self.is_new.load(Ordering::Acquire)
    }

    fn set_new(&self, is_new: bool) {
        self.is_new.store(is_new, Ordering::Release);
    }

    fn facts(&self) -> Option<&NodeFacts> {
        self.facts.get()
    }

    async fn connect(&self) -> NodeResult<()> {
        self.record(Call::Connect);
        self.pause().await;
        let failure = self.connect_error.lock().clone();
        if let Some(reason) = failure {
            return Err(NodeError::Connect {
                address: self.spec.address.clone(),
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, reason),
            });
        }
        let _ = self.facts.set(self.preset.clone());
        Ok(())
    }

    async fn disconnect(&self) -> NodeResult<()> {
        self.record(Call::Disconnect);
        Ok(())
    }

    async fn run(&self, cwd: Option<&str>, commands: &[String]) -> NodeResult<String> {
        let command = commands.join(" && ");
        self.record(Call::Run {
            cwd: cwd.map(str::to_owned),
            command: command.clone(),
        });
        self.pause().await;
        match self.scripted_reply(&command) {
            Some(Reply::Output(out)) => Ok(out),
            Some(Reply::Fail { status, stderr }) => Err(NodeError::RemoteCommand {
                address: self.spec.address.clone(),
                command,
                status,
                stderr,
            }),
            None => Ok(String::new()),
        }
    }

    async fn install(&self, name: &str, args: &[String]) -> NodeResult<()> {
        self.record(Call::Install {
            name: name.to_owned(),
            args: args.to_vec(),
        });
        self.pause().await;
        if self.failing_installs.lock().contains(name) {
            return Err(NodeError::RemoteCommand {
                address: self.spec.address.clone(),
                command: format!("bash install.sh {}", args.join(" ")),
                status: 1,
                stderr: format!("{} payload failed", name),
            });
        }
        Ok(())
    }

    async fn read_file(&self, path: &str) -> NodeResult<Vec<u8>> {
        self.record(Call::ReadFile(path.to_owned()));
        self.files
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| NodeError::ResourceMissing { path: path.into() })
    }
}

/// Captures step notifications instead of printing them.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    steps: Mutex<Vec<(String, String)>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `(label, name)` pairs in notification order.
    pub fn steps(&self) -> Vec<(String, String)> {
        self.steps.lock().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.steps.lock().iter().map(|(_, name)| name.clone()).collect()
    }
}

impl StepObserver for RecordingObserver {
    fn on_step(&self, label: &str, name: &str) {
        self.steps.lock().push((label.to_owned(), name.to_owned()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_replies_are_consumed_then_repeat() {
        let node = FakeNode::new("10.0.0.1", "m1", &[Role::ControlPlane]);
        node.script("token", [Reply::output("first"), Reply::output("second")]);
        let cmd = vec!["kubeadm token create".to_owned()];
        assert_eq!(node.run(None, &cmd).await.unwrap(), "first");
        assert_eq!(node.run(None, &cmd).await.unwrap(), "second");
        assert_eq!(node.run(None, &cmd).await.unwrap(), "second");
        assert_eq!(node.run(None, &["ls".to_owned()]).await.unwrap(), "");
    }

    #[tokio::test]
    async fn read_file_serves_stored_contents() {
        let node = FakeNode::new("10.0.0.3", "m1", &[Role::ControlPlane]);
        node.put_file("~/.kube/config", b"apiVersion: v1\n");
        assert_eq!(
            node.read_file("~/.kube/config").await.unwrap(),
            b"apiVersion: v1\n"
        );
        let err = node.read_file("kubeadm/join.txt").await.unwrap_err();
        assert!(matches!(err, NodeError::ResourceMissing { .. }));
        assert_eq!(node.count(&Call::ReadFile("~/.kube/config".to_owned())), 1);
    }

    #[tokio::test]
    async fn connect_presets_facts() {
        let node = FakeNode::new("10.0.0.2", "w1", &[Role::Worker])
            .with_facts(OsFamily::Centos, Arch::Aarch64);
        assert!(node.facts().is_none());
        node.connect().await.unwrap();
        assert_eq!(node.facts().map(|f| f.arch), Some(Arch::Aarch64));
        assert_eq!(node.count(&Call::Connect), 1);
    }
}
