//! The process-wide [`Context`] (§3, design note "process-wide context").
//!
//! A single `Context` is built once during bootstrap and threaded explicitly
//! into every translator's `init` and into the frame pool used for every
//! wind. The only legitimate implicit global left is the `log` crate's
//! sink, matched to the reference codebase's own reliance on `log`'s global
//! logger rather than a passed-around logger handle.

use std::fs::File;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::frame::FramePool;
use crate::xlator::Translator;

/// Mount configuration resolved by the `mount/fuse` translator's `init`
/// (§4.1, §6), stashed here so [`crate::bootstrap::run_fuse_loop`] can read
/// it back without downcasting the graph root's `Arc<dyn Xlator>`.
#[derive(Debug, Clone)]
pub struct FuseMountConfig {
    pub mountpoint: String,
    pub entry_timeout: Duration,
    pub attr_timeout: Duration,
    pub nodev: bool,
    pub nosuid: bool,
    pub direct_io: bool,
}

/// A single `<volume>.<key>=<value>` override supplied via
/// `--xlator-option` on the command line, applied after file-level options
/// (§4.3).
#[derive(Debug, Clone)]
pub struct OptionOverride {
    pub volume: String,
    pub key: String,
    pub value: String,
}

/// Process-wide state: the graph root, the frame pool, command-line option
/// overrides, and the open pid/spec file handles.
pub struct Context {
    graph_root: Mutex<Option<Arc<Translator>>>,
    pub frame_pool: Arc<FramePool>,
    pub cmd_args: Vec<OptionOverride>,
    pub volume_name: Option<String>,
    pid_file: Mutex<Option<File>>,
    spec_file: Mutex<Option<File>>,
    fuse_mount_config: Mutex<Option<FuseMountConfig>>,
}

impl Context {
    pub fn new(cmd_args: Vec<OptionOverride>, volume_name: Option<String>) -> Arc<Self> {
        Arc::new(Context {
            graph_root: Mutex::new(None),
            frame_pool: FramePool::new(),
            cmd_args,
            volume_name,
            pid_file: Mutex::new(None),
            spec_file: Mutex::new(None),
            fuse_mount_config: Mutex::new(None),
        })
    }

    pub fn set_fuse_mount_config(&self, config: FuseMountConfig) {
        *self.fuse_mount_config.lock().unwrap() = Some(config);
    }

    pub fn fuse_mount_config(&self) -> Option<FuseMountConfig> {
        self.fuse_mount_config.lock().unwrap().clone()
    }

    pub fn set_graph_root(&self, root: Arc<Translator>) {
        *self.graph_root.lock().unwrap() = Some(root);
    }

    pub fn graph_root(&self) -> Option<Arc<Translator>> {
        self.graph_root.lock().unwrap().clone()
    }

    pub fn set_pid_file(&self, file: File) {
        *self.pid_file.lock().unwrap() = Some(file);
    }

    pub fn take_pid_file(&self) -> Option<File> {
        self.pid_file.lock().unwrap().take()
    }

    pub fn set_spec_file(&self, file: File) {
        *self.spec_file.lock().unwrap() = Some(file);
    }

    /// Overrides applicable to a single volume name, in file order.
    pub fn overrides_for(&self, volume: &str) -> Vec<(&str, &str)> {
        self.cmd_args
            .iter()
            .filter(|o| o.volume == volume)
            .map(|o| (o.key.as_str(), o.value.as_str()))
            .collect()
    }
}
