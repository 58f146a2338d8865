//! ---
//! kf_section: "02-remote-node"
//! kf_subsection: "module"
//! kf_type: "source"
//! kf_scope: "code"
//! kf_description: "Transfer planning, pooled chunk buffers, and progress reporting."
//! kf_version: "v0.0.0-prealpha"
//! kf_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, trace};
use walkdir::WalkDir;

use crate::error::{NodeError, Result};
use crate::facts::Arch;
use crate::resource::to_remote_suffix;

/// Size of every transfer chunk.
pub const CHUNK_SIZE: usize = 1 << 15;

/// Reusable chunk buffers shared by every node of a run.
#[derive(Debug, Default)]
pub struct BufferPool {
    free: Mutex<Vec<Box<[u8]>>>,
    allocated: AtomicUsize,
}

impl BufferPool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Take a buffer from the pool, allocating when none is idle.
    pub fn acquire(self: &Arc<Self>) -> PooledBuffer {
        let buf = self.free.lock().pop().unwrap_or_else(|| {
            self.allocated.fetch_add(1, Ordering::Relaxed);
            vec![0u8; CHUNK_SIZE].into_boxed_slice()
        });
        PooledBuffer {
            buf,
            pool: Arc::clone(self),
        }
    }

    /// Buffers currently waiting in the pool.
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    /// Buffers ever allocated by the pool.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }
}

/// A chunk buffer that goes back to its pool when dropped, on every path.
#[derive(Debug)]
pub struct PooledBuffer {
    buf: Box<[u8]>,
    pool: Arc<BufferPool>,
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        if !buf.is_empty() {
            self.pool.free.lock().push(buf);
        }
    }
}

/// One unit of a directory copy. Directories always precede their contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEntry {
    Dir(String),
    File {
        source: PathBuf,
        dest: String,
        size: u64,
    },
}

/// Plan the copy of `source` to `dest_root` for a node of architecture `arch`.
///
/// Directories named after the other architecture are skipped. A directory
/// named after `arch` is merged into its parent on the destination side.
pub fn plan(source: &Path, dest_root: &str, arch: Arch) -> Result<Vec<TransferEntry>> {
    let dest_root = dest_root.trim_end_matches('/');
    let mut entries = Vec::new();
    let mut dirs = HashSet::new();

    let walker = WalkDir::new(source)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || match Arch::from_name(&entry.file_name().to_string_lossy()) {
                    Some(found) => found == arch,
                    None => true,
                }
        });

    for entry in walker {
        let entry = entry.map_err(|err| {
            let path = err
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| source.display().to_string());
            let io_err = err
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "walk failed"));
            NodeError::transfer(path, io_err)
        })?;

        let is_dir = entry.file_type().is_dir();
        let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
        let components: Vec<_> = relative.components().collect();
        let last = components.len().saturating_sub(1);
        // Only directory components are elided; a file may carry an arch name.
        let elided: PathBuf = components
            .iter()
            .enumerate()
            .filter(|(index, component)| {
                component.as_os_str() != arch.as_str() || (!is_dir && *index == last)
            })
            .map(|(_, component)| component)
            .collect();
        let dest = if elided.as_os_str().is_empty() {
            dest_root.to_owned()
        } else {
            format!("{}/{}", dest_root, to_remote_suffix(&elided))
        };

        if is_dir {
            if dirs.insert(dest.clone()) {
                entries.push(TransferEntry::Dir(dest));
            }
        } else {
            let size = entry
                .metadata()
                .map(|meta| meta.len())
                .map_err(|err| {
                    let io_err = err.into_io_error().unwrap_or_else(|| {
                        std::io::Error::new(std::io::ErrorKind::Other, "metadata unavailable")
                    });
                    NodeError::transfer(entry.path().display().to_string(), io_err)
                })?;
            entries.push(TransferEntry::File {
                source: entry.path().to_path_buf(),
                dest,
                size,
            });
        }
    }
    Ok(entries)
}

/// Byte progress for one file of a transfer.
#[derive(Debug, Clone, Copy)]
pub struct ProgressEvent<'a> {
    pub node: &'a str,
    pub path: &'a str,
    pub sent: u64,
    pub total: u64,
    pub done: bool,
}

/// Receives progress while files are copied.
pub trait TransferProgress: Send + Sync + std::fmt::Debug {
    fn on_progress(&self, event: ProgressEvent<'_>);
}

/// Default sink: per-chunk trace events, one info event per finished file.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl TransferProgress for TracingProgress {
    fn on_progress(&self, event: ProgressEvent<'_>) {
        if event.done {
            info!(node = %event.node, path = %event.path, bytes = event.total, "file transferred");
        } else {
            trace!(node = %event.node, path = %event.path, sent = event.sent, total = event.total, "transfer progress");
        }
    }
}
