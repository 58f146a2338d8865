//! ---
//! kf_section: "02-remote-node"
//! kf_subsection: "module"
//! kf_type: "source"
//! kf_scope: "code"
//! kf_description: "SSH/SFTP backed node implementation."
//! kf_version: "v0.0.0-prealpha"
//! kf_owner: "tbd"
//! ---
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use kforge_common::config::{HostKeyPolicy, SshConfig};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use ssh2::{CheckResult, KnownHostFileKind, Session, Sftp};
use tracing::{debug, info, warn};

use crate::command::{compose, install_script};
use crate::error::{NodeError, Result};
use crate::facts::{self, CommandRunner, NodeFacts};
use crate::node::Node;
use crate::resource::{remote_absolute, ResourceLayout};
use crate::spec::{NodeSpec, Secret};
use crate::transfer::{
    plan, BufferPool, ProgressEvent, TracingProgress, TransferEntry, TransferProgress,
};

const DIR_MODE: i32 = 0o755;
const IDLE_POLL: Duration = Duration::from_millis(5);

/// Host key handling for new sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub host_key_policy: HostKeyPolicy,
    pub known_hosts: PathBuf,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            host_key_policy: HostKeyPolicy::AcceptAny,
            known_hosts: default_known_hosts(),
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &SshConfig) -> Self {
        Self {
            host_key_policy: config.host_key_policy,
            known_hosts: config
                .known_hosts
                .clone()
                .unwrap_or_else(default_known_hosts),
        }
    }
}

fn default_known_hosts() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/root".to_owned());
    PathBuf::from(home).join(".ssh").join("known_hosts")
}

/// A node reached over SSH, with SFTP for file transfer.
pub struct RemoteNode {
    spec: NodeSpec,
    options: SessionOptions,
    layout: ResourceLayout,
    buffers: Arc<BufferPool>,
    progress: Arc<dyn TransferProgress>,
    session: RwLock<Option<Session>>,
    facts: OnceCell<NodeFacts>,
    is_new: AtomicBool,
}

impl fmt::Debug for RemoteNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteNode")
            .field("spec", &self.spec)
            .field("connected", &self.session.read().is_some())
            .field("facts", &self.facts.get())
            .field("is_new", &self.is_new.load(Ordering::Relaxed))
            .finish()
    }
}

impl RemoteNode {
    pub fn new(spec: NodeSpec) -> Self {
        Self {
            spec,
            options: SessionOptions::default(),
            layout: ResourceLayout::default(),
            buffers: BufferPool::new(),
            progress: Arc::new(TracingProgress),
            session: RwLock::new(None),
            facts: OnceCell::new(),
            is_new: AtomicBool::new(true),
        }
    }

    pub fn with_session_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_layout(mut self, layout: ResourceLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Share one chunk pool between every node of a run.
    pub fn with_buffers(mut self, buffers: Arc<BufferPool>) -> Self {
        self.buffers = buffers;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn TransferProgress>) -> Self {
        self.progress = progress;
        self
    }

    fn current_session(&self) -> Result<Session> {
        self.session
            .read()
            .clone()
            .ok_or_else(|| NodeError::NotConnected {
                address: self.spec.address.clone(),
            })
    }

    fn current_facts(&self) -> Result<&NodeFacts> {
        self.facts.get().ok_or_else(|| NodeError::NotConnected {
            address: self.spec.address.clone(),
        })
    }

    async fn blocking<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        tokio::task::spawn_blocking(work)
            .await
            .map_err(|err| NodeError::Task {
                address: self.spec.address.clone(),
                reason: err.to_string(),
            })?
    }

    async fn exec(&self, command: String) -> Result<String> {
        let session = self.current_session()?;
        let address = self.spec.address.clone();
        self.blocking(move || exec_blocking(&session, &address, &command))
            .await
    }
}

struct SessionRunner<'a> {
    node: &'a RemoteNode,
}

#[async_trait]
impl CommandRunner for SessionRunner<'_> {
    async fn output(&self, command: &str) -> Result<String> {
        self.node.exec(command.to_owned()).await
    }
}

#[async_trait]
impl Node for RemoteNode {
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

    async fn connect(&self) -> Result<()> {
        if self.session.read().is_some() && self.facts.get().is_some() {
            return Ok(());
        }
        let spec = self.spec.clone();
        let options = self.options.clone();
        let session = self.blocking(move || open_session(&spec, &options)).await?;
        *self.session.write() = Some(session);
        info!(node = %self.spec.address, user = %self.spec.credential.username, "session established");

        if self.facts.get().is_none() {
            match facts::discover(&SessionRunner { node: self }, &self.spec.address).await {
                Ok(discovered) => {
                    let _ = self.facts.set(discovered);
                }
                Err(err) => {
                    self.session.write().take();
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let Some(session) = self.session.write().take() else {
            return Ok(());
        };
        let address = self.spec.address.clone();
        self.blocking(move || {
            session
                .disconnect(None, "kforge run finished", None)
                .map_err(|err| NodeError::ssh(&address, err))
        })
        .await?;
        debug!(node = %self.spec.address, "session closed");
        Ok(())
    }

    async fn run(&self, cwd: Option<&str>, commands: &[String]) -> Result<String> {
        self.exec(compose(cwd, commands)).await
    }

    async fn install(&self, name: &str, args: &[String]) -> Result<()> {
        let facts = self.current_facts()?.clone();
        let resource = self.layout.resolve(name, facts.os)?;
        let dest_root = remote_absolute(&facts.home, &resource.remote);
        let entries = plan(&resource.local, &dest_root, facts.arch)?;
        debug!(node = %self.spec.address, resource = %name, entries = entries.len(), "uploading resource");

        let session = self.current_session()?;
        let buffers = Arc::clone(&self.buffers);
        let progress = Arc::clone(&self.progress);
        let address = self.spec.address.clone();
        let root = dest_root.clone();
        self.blocking(move || upload(&session, &root, entries, &buffers, progress.as_ref(), &address))
            .await?;

        let output = self.run(Some(&dest_root), &install_script(args)).await?;
        if !output.trim().is_empty() {
            info!(node = %self.spec.address, resource = %name, "{}", output.trim_end());
        }
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let remote = self
            .layout
            .remote_read_path(&self.current_facts()?.home, path);
        let session = self.current_session()?;
        self.blocking(move || {
            let sftp = session.sftp().map_err(|err| NodeError::sftp(&remote, err))?;
            let mut file = sftp
                .open(Path::new(&remote))
                .map_err(|err| NodeError::sftp(&remote, err))?;
            let mut contents = Vec::new();
            file.read_to_end(&mut contents)
                .map_err(|err| NodeError::transfer(&remote, err))?;
            Ok(contents)
        })
        .await
    }
}

fn open_session(spec: &NodeSpec, options: &SessionOptions) -> Result<Session> {
    let address = spec.address.as_str();
    let tcp = TcpStream::connect((address, spec.port)).map_err(|source| NodeError::Connect {
        address: address.to_owned(),
        source,
    })?;
    let mut session = Session::new().map_err(|err| NodeError::ssh(address, err))?;
    session.set_tcp_stream(tcp);
    session
        .handshake()
        .map_err(|err| NodeError::ssh(address, err))?;

    if options.host_key_policy == HostKeyPolicy::KnownHosts {
        verify_host_key(&session, spec, &options.known_hosts)?;
    }

    let username = spec.credential.username.as_str();
    let auth = match &spec.credential.secret {
        Secret::Password(password) => session.userauth_password(username, password),
        Secret::PrivateKey { path, passphrase } => {
            if !path.is_file() {
                return Err(NodeError::KeyFile {
                    path: path.clone(),
                    source: io::Error::new(io::ErrorKind::NotFound, "key file not found"),
                });
            }
            session.userauth_pubkey_file(username, None, path, passphrase.as_deref())
        }
    };
    auth.map_err(|err| NodeError::Authentication {
        address: address.to_owned(),
        username: username.to_owned(),
        reason: err.message().to_owned(),
    })?;
    if !session.authenticated() {
        return Err(NodeError::Authentication {
            address: address.to_owned(),
            username: username.to_owned(),
            reason: "server did not accept the credential".to_owned(),
        });
    }
    Ok(session)
}

fn verify_host_key(session: &Session, spec: &NodeSpec, known_hosts: &Path) -> Result<()> {
    let address = spec.address.as_str();
    let rejected = |reason: String| NodeError::HostKeyRejected {
        address: address.to_owned(),
        reason,
    };
    let mut hosts = session
        .known_hosts()
        .map_err(|err| NodeError::ssh(address, err))?;
    hosts
        .read_file(known_hosts, KnownHostFileKind::OpenSSH)
        .map_err(|err| rejected(format!("cannot read {}: {}", known_hosts.display(), err)))?;
    let (key, _) = session
        .host_key()
        .ok_or_else(|| rejected("server presented no host key".to_owned()))?;
    match hosts.check_port(address, spec.port, key) {
        CheckResult::Match => Ok(()),
        CheckResult::NotFound => Err(rejected(format!(
            "host is not listed in {}",
            known_hosts.display()
        ))),
        CheckResult::Mismatch => Err(rejected("host key does not match known_hosts".to_owned())),
        CheckResult::Failure => Err(rejected("known_hosts check failed".to_owned())),
    }
}

fn exec_blocking(session: &Session, address: &str, command: &str) -> Result<String> {
    let mut channel = session
        .channel_session()
        .map_err(|err| NodeError::ssh(address, err))?;
    channel
        .exec(command)
        .map_err(|err| NodeError::ssh(address, err))?;

    // A node runs one command at a time, so the session-wide mode switch is local to it.
    session.set_blocking(false);
    let drained = drain(channel.stream(0), channel.stderr(), || thread::sleep(IDLE_POLL));
    session.set_blocking(true);
    let (stdout, stderr) = drained.map_err(|err| NodeError::transfer(address, err))?;
    channel
        .wait_close()
        .map_err(|err| NodeError::ssh(address, err))?;
    let status = channel
        .exit_status()
        .map_err(|err| NodeError::ssh(address, err))?;

    let stderr = String::from_utf8_lossy(&stderr).into_owned();
    if !stderr.trim().is_empty() {
        debug!(node = %address, %command, stderr = %stderr.trim_end(), "remote stderr");
    }
    if status != 0 {
        return Err(NodeError::RemoteCommand {
            address: address.to_owned(),
            command: command.to_owned(),
            status,
            stderr,
        });
    }
    Ok(String::from_utf8_lossy(&stdout).into_owned())
}

/// Read both streams to EOF, alternating between them so a full stderr
/// window can never stall stdout. `idle` runs when neither made progress.
fn drain<O, E>(
    mut stdout: O,
    mut stderr: E,
    mut idle: impl FnMut(),
) -> io::Result<(Vec<u8>, Vec<u8>)>
where
    O: Read,
    E: Read,
{
    let mut out = Vec::new();
    let mut err = Vec::new();
    let mut chunk = [0u8; 8192];
    let (mut out_done, mut err_done) = (false, false);
    while !(out_done && err_done) {
        let mut progressed = false;
        if !out_done {
            match read_available(&mut stdout, &mut chunk, &mut out)? {
                Some(0) => out_done = true,
                Some(_) => progressed = true,
                None => {}
            }
        }
        if !err_done {
            match read_available(&mut stderr, &mut chunk, &mut err)? {
                Some(0) => err_done = true,
                Some(_) => progressed = true,
                None => {}
            }
        }
        if !progressed && !(out_done && err_done) {
            idle();
        }
    }
    Ok((out, err))
}

/// `None` when the stream has nothing to hand over yet.
fn read_available(
    reader: &mut impl Read,
    chunk: &mut [u8],
    sink: &mut Vec<u8>,
) -> io::Result<Option<usize>> {
    match reader.read(chunk) {
        Ok(read) => {
            sink.extend_from_slice(&chunk[..read]);
            Ok(Some(read))
        }
        Err(err)
            if matches!(
                err.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ) =>
        {
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

fn upload(
    session: &Session,
    root: &str,
    entries: Vec<TransferEntry>,
    buffers: &Arc<BufferPool>,
    progress: &dyn TransferProgress,
    address: &str,
) -> Result<()> {
    let sftp = session.sftp().map_err(|err| NodeError::sftp(root, err))?;
    if entries.is_empty() {
        warn!(node = %address, path = %root, "resource directory is empty");
        return mkdir_all(&sftp, root);
    }
    for entry in entries {
        match entry {
            TransferEntry::Dir(path) => mkdir_all(&sftp, &path)?,
            TransferEntry::File { source, dest, size } => {
                copy_file(&sftp, buffers, progress, address, &source, &dest, size)?
            }
        }
    }
    Ok(())
}

fn mkdir_all(sftp: &Sftp, path: &str) -> Result<()> {
    let mut current = String::new();
    for part in path.split('/') {
        if part.is_empty() {
            if current.is_empty() {
                current.push('/');
            }
            continue;
        }
        if !current.is_empty() && !current.ends_with('/') {
            current.push('/');
        }
        current.push_str(part);
        let dir = Path::new(&current);
        if sftp.stat(dir).is_ok() {
            continue;
        }
        if let Err(err) = sftp.mkdir(dir, DIR_MODE) {
            if sftp.stat(dir).is_err() {
                return Err(NodeError::sftp(current.as_str(), err));
            }
        }
    }
    Ok(())
}

fn copy_file(
    sftp: &Sftp,
    buffers: &Arc<BufferPool>,
    progress: &dyn TransferProgress,
    address: &str,
    source: &Path,
    dest: &str,
    size: u64,
) -> Result<()> {
    let mut local =
        File::open(source).map_err(|err| NodeError::transfer(source.display().to_string(), err))?;
    let mut remote = sftp
        .create(Path::new(dest))
        .map_err(|err| NodeError::sftp(dest, err))?;

    let mut buf = buffers.acquire();
    let mut sent = 0u64;
    loop {
        let read = local
            .read(&mut buf)
            .map_err(|err| NodeError::transfer(source.display().to_string(), err))?;
        if read == 0 {
            break;
        }
        remote
            .write_all(&buf[..read])
            .map_err(|err| NodeError::transfer(dest, err))?;
        sent += read as u64;
        progress.on_progress(ProgressEvent {
            node: address,
            path: dest,
            sent,
            total: size,
            done: false,
        });
    }
    progress.on_progress(ProgressEvent {
        node: address,
        path: dest,
        sent,
        total: size,
        done: true,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    use kforge_common::role::{Role, RoleSet};

    use super::*;
    use crate::spec::Credential;

    /// Hands out scripted chunks; `None` stands for "would block".
    struct Scripted {
        chunks: VecDeque<Option<&'static str>>,
        finished: Rc<Cell<bool>>,
    }

    impl Scripted {
        fn new(chunks: Vec<Option<&'static str>>, finished: Rc<Cell<bool>>) -> Self {
            Self {
                chunks: chunks.into(),
                finished,
            }
        }
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.pop_front() {
                Some(Some(chunk)) => {
                    buf[..chunk.len()].copy_from_slice(chunk.as_bytes());
                    Ok(chunk.len())
                }
                Some(None) => Err(io::ErrorKind::WouldBlock.into()),
                None => {
                    self.finished.set(true);
                    Ok(0)
                }
            }
        }
    }

    /// Stdout that stays blocked until the stderr side has been read to EOF.
    struct GatedStdout {
        stderr_done: Rc<Cell<bool>>,
        sent: bool,
    }

    impl Read for GatedStdout {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.stderr_done.get() {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            if self.sent {
                return Ok(0);
            }
            self.sent = true;
            buf[..3].copy_from_slice(b"ok\n");
            Ok(3)
        }
    }

    #[test]
    fn drain_reads_stderr_while_stdout_is_blocked() {
        let stderr_done = Rc::new(Cell::new(false));
        let stderr = Scripted::new(
            vec![Some("pulling "), None, Some("layer 1\n"), Some("layer 2\n")],
            Rc::clone(&stderr_done),
        );
        let stdout = GatedStdout {
            stderr_done: Rc::clone(&stderr_done),
            sent: false,
        };
        let mut idles = 0;
        let (out, err) = drain(stdout, stderr, || idles += 1).unwrap();
        assert_eq!(out, b"ok\n");
        assert_eq!(err, b"pulling layer 1\nlayer 2\n");
        assert!(idles >= 1);
    }

    #[test]
    fn drain_propagates_read_errors() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "channel closed"))
            }
        }
        let empty = Scripted::new(Vec::new(), Rc::new(Cell::new(false)));
        let err = drain(Broken, empty, || {}).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }

    fn unconnected() -> RemoteNode {
        let spec = NodeSpec::new(
            "127.0.0.1",
            "solo",
            RoleSet::new().with(Role::Worker),
            Credential::private_key("root", "/nonexistent/id_ed25519"),
        )
        .unwrap();
        RemoteNode::new(spec)
    }

    #[tokio::test]
    async fn operations_before_connect_report_not_connected() {
        let node = unconnected();
        assert!(node.facts().is_none());

        let err = node.read_file("~/.kube/config").await.unwrap_err();
        assert!(matches!(err, NodeError::NotConnected { .. }));
        let err = node.run(None, &["hostname".to_owned()]).await.unwrap_err();
        assert!(matches!(err, NodeError::NotConnected { .. }));
        let err = node.install("docker", &[]).await.unwrap_err();
        assert!(matches!(err, NodeError::NotConnected { .. }));

        node.disconnect().await.expect("disconnect without a session");
    }
}
