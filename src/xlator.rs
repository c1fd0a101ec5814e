//! The translator interface (§4.1): a capability set of file ops,
//! management ops, and a notify entry point, implemented by every node in
//! the graph.
//!
//! A translator's graph plumbing (name, type, options, parent/child links,
//! readiness) is generic and lives on [`Translator`]; the operations
//! themselves are a trait object (`dyn Xlator`) the node owns, chosen at
//! load time from the [`registry`] (design note "polymorphism across
//! translators"). Default method bodies implement "pass through to a
//! single child, or refuse" per §4.1.

pub mod registry;

use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use fuser::FileType as FileKind;

use crate::context::Context;
use crate::dict::Dict;
use crate::frame::{Frame, NotifyEvent};
use crate::types::errors::{ErrorKind, FuseResult, PosixError};
use crate::types::{
    FileAttribute, FileHandle, FuseDirEntryPlus, Inode, LockInfo, OpenFlags, RenameFlags,
    SetAttrRequest, StatFs,
};

fn not_permitted() -> PosixError {
    PosixError::new(libc::EPERM, "operation refused by this translator")
}

fn not_supported() -> PosixError {
    ErrorKind::FunctionNotImplemented.to_error("operation not implemented")
}

/// A directory entry as returned by `readdir`: name, kind, and the inode the
/// caller should associate with it (the KV leaf's salted inode, for
/// example).
pub type DirEntry = (OsString, FileKind, Inode);

/// A checksum pair: the directory-entry checksum and the file/record
/// checksum (§4.4 `checksum`, §8 scenario 6).
pub type Checksum = ([u8; 4096], [u8; 4096]);

/// Free/used/throughput counters for the `stats` management op.
#[derive(Debug, Clone, Default)]
pub struct XlatorStats {
    pub statfs: StatFs,
    pub read_bytes_total: u64,
    pub write_bytes_total: u64,
    /// Bytes/sec averaged over the whole process lifetime (§4.4 "rolling
    /// read/write throughput averaged since init").
    pub read_rate_since_init: f64,
    pub write_rate_since_init: f64,
    /// Bytes/sec averaged since the previous `stats` call (§4.4 "... and
    /// since last fetch"); equal to the since-init rate on the first call.
    pub read_rate_since_last_fetch: f64,
    pub write_rate_since_last_fetch: f64,
    pub num_files: u64,
    pub num_clients: u64,
}

/// The per-translator operation table. Every method has a default that
/// either forwards to the translator's sole child (for stacking
/// translators) or refuses with a fixed errno (for leaves); a translator
/// overrides only the operations it actually implements.
pub trait Xlator: Send + Sync {
    /// Distinguishes implementations in logs and panics; matches the
    /// `type` string resolved by the registry.
    fn type_name(&self) -> &'static str;

    /// Brings up private state (opens stores, binds sockets). Called by the
    /// loader in post-order; a failure aborts the graph build (§4.3).
    fn init(&self, _node: &Translator, _ctx: &Context) -> FuseResult<()> {
        Ok(())
    }

    /// Releases private state. Called in reverse init order on a failed
    /// build, or on clean shutdown.
    fn fini(&self, _node: &Translator) {}

    /// Upward graph event. The default forwards `ChildUp`/`ChildDown` to the
    /// node's own parent once `ready` is set, per §4.3; `ParentUp`/`ParentDown`
    /// have no default action.
    fn notify(&self, node: &Translator, event: NotifyEvent) -> FuseResult<()> {
        if matches!(event, NotifyEvent::ChildUp) && node.is_ready() {
            node.notify_parent(NotifyEvent::ChildUp);
        }
        Ok(())
    }

    // ---- file ops ----

    fn lookup(&self, node: &Translator, frame: &Arc<Frame>, parent: Inode, name: &OsStr) -> FuseResult<FileAttribute> {
        node.sole_child()?.lookup(frame, parent, name)
    }

    fn forget(&self, node: &Translator, inode: Inode, nlookup: u64) {
        if let Ok(child) = node.sole_child() {
            child.impl_.forget(&child, inode, nlookup);
        }
    }

    fn getattr(&self, node: &Translator, frame: &Arc<Frame>, inode: Inode) -> FuseResult<FileAttribute> {
        node.sole_child()?.getattr(frame, inode)
    }

    fn setattr(&self, node: &Translator, frame: &Arc<Frame>, inode: Inode, attrs: SetAttrRequest) -> FuseResult<FileAttribute> {
        node.sole_child()?.setattr(frame, inode, attrs)
    }

    fn opendir(&self, node: &Translator, frame: &Arc<Frame>, inode: Inode, flags: OpenFlags) -> FuseResult<FileHandle> {
        node.sole_child()?.opendir(frame, inode, flags)
    }

    fn readdir(&self, node: &Translator, frame: &Arc<Frame>, inode: Inode, fh: FileHandle, cursor: u64) -> FuseResult<Vec<DirEntry>> {
        node.sole_child()?.readdir(frame, inode, fh, cursor)
    }

    fn readdirplus(&self, node: &Translator, frame: &Arc<Frame>, inode: Inode, fh: FileHandle, cursor: u64) -> FuseResult<Vec<FuseDirEntryPlus>> {
        node.sole_child()?.readdirplus(frame, inode, fh, cursor)
    }

    fn releasedir(&self, node: &Translator, frame: &Arc<Frame>, inode: Inode, fh: FileHandle) -> FuseResult<()> {
        node.sole_child()?.releasedir(frame, inode, fh)
    }

    fn fsyncdir(&self, node: &Translator, frame: &Arc<Frame>, inode: Inode, fh: FileHandle, datasync: bool) -> FuseResult<()> {
        node.sole_child()?.fsyncdir(frame, inode, fh, datasync)
    }

    fn readlink(&self, node: &Translator, frame: &Arc<Frame>, inode: Inode) -> FuseResult<Vec<u8>> {
        node.sole_child()?.readlink(frame, inode)
    }

    fn mknod(&self, node: &Translator, frame: &Arc<Frame>, parent: Inode, name: &OsStr, mode: u32, rdev: u32) -> FuseResult<FileAttribute> {
        node.sole_child()?.mknod(frame, parent, name, mode, rdev)
    }

    fn mkdir(&self, node: &Translator, frame: &Arc<Frame>, parent: Inode, name: &OsStr, mode: u32) -> FuseResult<FileAttribute> {
        node.sole_child()?.mkdir(frame, parent, name, mode)
    }

    fn unlink(&self, node: &Translator, frame: &Arc<Frame>, parent: Inode, name: &OsStr) -> FuseResult<()> {
        node.sole_child()?.unlink(frame, parent, name)
    }

    /// Refused by default: most leaves (this crate's KV leaf included)
    /// decline rmdir entirely (§4.4, §9).
    fn rmdir(&self, _node: &Translator, _frame: &Arc<Frame>, _parent: Inode, _name: &OsStr) -> FuseResult<()> {
        Err(not_permitted())
    }

    fn symlink(&self, node: &Translator, frame: &Arc<Frame>, parent: Inode, name: &OsStr, target: &Path) -> FuseResult<FileAttribute> {
        node.sole_child()?.symlink(frame, parent, name, target)
    }

    fn rename(&self, node: &Translator, frame: &Arc<Frame>, old_parent: Inode, old_name: &OsStr, new_parent: Inode, new_name: &OsStr, flags: RenameFlags) -> FuseResult<()> {
        node.sole_child()?.rename(frame, old_parent, old_name, new_parent, new_name, flags)
    }

    /// Refused by default: hard links on regular files are out of scope
    /// (§1 Non-goals, §4.4).
    fn link(&self, _node: &Translator, _frame: &Arc<Frame>, _inode: Inode, _new_parent: Inode, _new_name: &OsStr) -> FuseResult<FileAttribute> {
        Err(not_permitted())
    }

    fn create(&self, node: &Translator, frame: &Arc<Frame>, parent: Inode, name: &OsStr, mode: u32, flags: OpenFlags) -> FuseResult<(FileHandle, FileAttribute)> {
        node.sole_child()?.create(frame, parent, name, mode, flags)
    }

    fn open(&self, node: &Translator, frame: &Arc<Frame>, inode: Inode, flags: OpenFlags) -> FuseResult<FileHandle> {
        node.sole_child()?.open(frame, inode, flags)
    }

    fn read(&self, node: &Translator, frame: &Arc<Frame>, inode: Inode, fh: FileHandle, offset: i64, size: u32) -> FuseResult<Vec<u8>> {
        node.sole_child()?.read(frame, inode, fh, offset, size)
    }

    /// Partial-write semantics (§9): the number of bytes actually written is
    /// always meaningful, even on error — the second element carries the
    /// errno of the first segment that failed, if any. This is kept as a
    /// two-field tuple rather than collapsed into a single `Result`.
    fn write(&self, node: &Translator, frame: &Arc<Frame>, inode: Inode, fh: FileHandle, offset: i64, segments: &[&[u8]]) -> (u32, Option<PosixError>) {
        match node.sole_child() {
            Ok(child) => child.write(frame, inode, fh, offset, segments),
            Err(e) => (0, Some(e)),
        }
    }

    fn statfs(&self, node: &Translator, frame: &Arc<Frame>, inode: Inode) -> FuseResult<StatFs> {
        node.sole_child()?.statfs(frame, inode)
    }

    fn flush(&self, node: &Translator, frame: &Arc<Frame>, inode: Inode, fh: FileHandle) -> FuseResult<()> {
        node.sole_child()?.flush(frame, inode, fh)
    }

    fn release(&self, node: &Translator, frame: &Arc<Frame>, inode: Inode, fh: FileHandle) -> FuseResult<()> {
        node.sole_child()?.release(frame, inode, fh)
    }

    fn fsync(&self, node: &Translator, frame: &Arc<Frame>, inode: Inode, fh: FileHandle, datasync: bool) -> FuseResult<()> {
        node.sole_child()?.fsync(frame, inode, fh, datasync)
    }

    /// Refused by default: this leaf has no allocate-without-write primitive
    /// distinct from `setattr`'s truncate path (§4.4 `ftruncate`).
    fn ftruncate(&self, _node: &Translator, _frame: &Arc<Frame>, _inode: Inode, _fh: FileHandle, _size: u64) -> FuseResult<FileAttribute> {
        Err(not_permitted())
    }

    fn setxattr(&self, node: &Translator, frame: &Arc<Frame>, inode: Inode, name: &OsStr, value: &[u8]) -> FuseResult<()> {
        node.sole_child()?.setxattr(frame, inode, name, value)
    }

    fn getxattr(&self, node: &Translator, frame: &Arc<Frame>, inode: Inode, name: &OsStr, size: u32) -> FuseResult<Vec<u8>> {
        node.sole_child()?.getxattr(frame, inode, name, size)
    }

    fn removexattr(&self, node: &Translator, frame: &Arc<Frame>, inode: Inode, name: &OsStr) -> FuseResult<()> {
        node.sole_child()?.removexattr(frame, inode, name)
    }

    fn access(&self, node: &Translator, frame: &Arc<Frame>, inode: Inode, mask: i32) -> FuseResult<()> {
        node.sole_child()?.access(frame, inode, mask)
    }

    /// Refused by default: byte-range locking is a stub (§1 Non-goals).
    fn lk(&self, _node: &Translator, _frame: &Arc<Frame>, _inode: Inode, _fh: FileHandle, _lock: LockInfo) -> FuseResult<LockInfo> {
        Err(not_supported())
    }

    /// Refused by default: no element-rename-without-path primitive is
    /// exposed by this leaf (§4.4 `rmelem`).
    fn rmelem(&self, _node: &Translator, _frame: &Arc<Frame>, _inode: Inode) -> FuseResult<()> {
        Err(not_permitted())
    }

    /// Bumps a translator-private generation counter; only meaningful to
    /// translators that cache. Refused by leaves that keep no such state.
    fn incver(&self, _node: &Translator, _frame: &Arc<Frame>, _inode: Inode) -> FuseResult<u64> {
        Err(not_supported())
    }

    // ---- management ops ----

    fn stats(&self, node: &Translator, frame: &Arc<Frame>) -> FuseResult<XlatorStats> {
        node.sole_child()?.stats(frame)
    }

    fn lock(&self, node: &Translator) -> FuseResult<()> {
        node.options.lock();
        Ok(())
    }

    fn unlock(&self, _node: &Translator) -> FuseResult<()> {
        Ok(())
    }

    /// Returns the directory-entry checksum and file/record checksum
    /// (§4.4, §8 scenario 6).
    fn checksum(&self, node: &Translator, frame: &Arc<Frame>, inode: Inode) -> FuseResult<Checksum> {
        node.sole_child()?.checksum(frame, inode)
    }

    /// Fetches a volume specification from a remote server. Only the
    /// spec-fetch client translator implements this meaningfully; every
    /// other translator refuses.
    fn getspec(&self, _node: &Translator, _frame: &Arc<Frame>, _key: &Dict) -> FuseResult<Vec<u8>> {
        Err(not_supported())
    }
}

/// A node in the translator DAG: graph plumbing (name, options,
/// parent/child links, readiness) plus the type-specific operation table.
pub struct Translator {
    pub name: String,
    pub type_name: String,
    pub options: Dict,
    parent: Mutex<Weak<Translator>>,
    children: Mutex<Vec<Arc<Translator>>>,
    ready: AtomicBool,
    pub impl_: Arc<dyn Xlator>,
}

impl Translator {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, options: Dict, impl_: Arc<dyn Xlator>) -> Arc<Self> {
        Arc::new(Translator {
            name: name.into(),
            type_name: type_name.into(),
            options,
            parent: Mutex::new(Weak::new()),
            children: Mutex::new(Vec::new()),
            ready: AtomicBool::new(false),
            impl_,
        })
    }

    pub fn add_child(self: &Arc<Self>, child: Arc<Translator>) {
        *child.parent.lock().unwrap() = Arc::downgrade(self);
        self.children.lock().unwrap().push(child);
    }

    pub fn children(&self) -> Vec<Arc<Translator>> {
        self.children.lock().unwrap().clone()
    }

    pub fn parent(&self) -> Option<Arc<Translator>> {
        self.parent.lock().unwrap().upgrade()
    }

    /// The single-child convenience accessor used by default passthrough
    /// method bodies; a translator with zero or more than one child that
    /// relies on the default must override the op instead.
    pub fn sole_child(&self) -> FuseResult<Arc<Translator>> {
        let children = self.children.lock().unwrap();
        match children.as_slice() {
            [only] => Ok(only.clone()),
            [] => Err(not_supported()),
            _ => Err(PosixError::new(libc::EINVAL, "ambiguous passthrough: translator has multiple children")),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn notify_parent(&self, event: NotifyEvent) {
        if let Some(parent) = self.parent() {
            if let Err(e) = parent.impl_.notify(&parent, event) {
                log::warn!("{}: notify({:?}) from child failed: {}", parent.name, event, e);
            }
        }
    }

    // ---- thin forwarders so call sites read `child.lookup(...)` rather
    // than `child.impl_.lookup(&child, ...)` ----

    pub fn lookup(self: &Arc<Self>, frame: &Arc<Frame>, parent: Inode, name: &OsStr) -> FuseResult<FileAttribute> {
        self.impl_.lookup(self, frame, parent, name)
    }
    pub fn forget(self: &Arc<Self>, inode: Inode, nlookup: u64) {
        self.impl_.forget(self, inode, nlookup)
    }
    pub fn getattr(self: &Arc<Self>, frame: &Arc<Frame>, inode: Inode) -> FuseResult<FileAttribute> {
        self.impl_.getattr(self, frame, inode)
    }
    pub fn setattr(self: &Arc<Self>, frame: &Arc<Frame>, inode: Inode, attrs: SetAttrRequest) -> FuseResult<FileAttribute> {
        self.impl_.setattr(self, frame, inode, attrs)
    }
    pub fn opendir(self: &Arc<Self>, frame: &Arc<Frame>, inode: Inode, flags: OpenFlags) -> FuseResult<FileHandle> {
        self.impl_.opendir(self, frame, inode, flags)
    }
    pub fn readdir(self: &Arc<Self>, frame: &Arc<Frame>, inode: Inode, fh: FileHandle, cursor: u64) -> FuseResult<Vec<DirEntry>> {
        self.impl_.readdir(self, frame, inode, fh, cursor)
    }
    pub fn readdirplus(self: &Arc<Self>, frame: &Arc<Frame>, inode: Inode, fh: FileHandle, cursor: u64) -> FuseResult<Vec<FuseDirEntryPlus>> {
        self.impl_.readdirplus(self, frame, inode, fh, cursor)
    }
    pub fn releasedir(self: &Arc<Self>, frame: &Arc<Frame>, inode: Inode, fh: FileHandle) -> FuseResult<()> {
        self.impl_.releasedir(self, frame, inode, fh)
    }
    pub fn fsyncdir(self: &Arc<Self>, frame: &Arc<Frame>, inode: Inode, fh: FileHandle, datasync: bool) -> FuseResult<()> {
        self.impl_.fsyncdir(self, frame, inode, fh, datasync)
    }
    pub fn readlink(self: &Arc<Self>, frame: &Arc<Frame>, inode: Inode) -> FuseResult<Vec<u8>> {
        self.impl_.readlink(self, frame, inode)
    }
    pub fn mknod(self: &Arc<Self>, frame: &Arc<Frame>, parent: Inode, name: &OsStr, mode: u32, rdev: u32) -> FuseResult<FileAttribute> {
        self.impl_.mknod(self, frame, parent, name, mode, rdev)
    }
    pub fn mkdir(self: &Arc<Self>, frame: &Arc<Frame>, parent: Inode, name: &OsStr, mode: u32) -> FuseResult<FileAttribute> {
        self.impl_.mkdir(self, frame, parent, name, mode)
    }
    pub fn unlink(self: &Arc<Self>, frame: &Arc<Frame>, parent: Inode, name: &OsStr) -> FuseResult<()> {
        self.impl_.unlink(self, frame, parent, name)
    }
    pub fn rmdir(self: &Arc<Self>, frame: &Arc<Frame>, parent: Inode, name: &OsStr) -> FuseResult<()> {
        self.impl_.rmdir(self, frame, parent, name)
    }
    pub fn symlink(self: &Arc<Self>, frame: &Arc<Frame>, parent: Inode, name: &OsStr, target: &Path) -> FuseResult<FileAttribute> {
        self.impl_.symlink(self, frame, parent, name, target)
    }
    #[allow(clippy::too_many_arguments)]
    pub fn rename(self: &Arc<Self>, frame: &Arc<Frame>, old_parent: Inode, old_name: &OsStr, new_parent: Inode, new_name: &OsStr, flags: RenameFlags) -> FuseResult<()> {
        self.impl_.rename(self, frame, old_parent, old_name, new_parent, new_name, flags)
    }
    pub fn link(self: &Arc<Self>, frame: &Arc<Frame>, inode: Inode, new_parent: Inode, new_name: &OsStr) -> FuseResult<FileAttribute> {
        self.impl_.link(self, frame, inode, new_parent, new_name)
    }
    pub fn create(self: &Arc<Self>, frame: &Arc<Frame>, parent: Inode, name: &OsStr, mode: u32, flags: OpenFlags) -> FuseResult<(FileHandle, FileAttribute)> {
        self.impl_.create(self, frame, parent, name, mode, flags)
    }
    pub fn open(self: &Arc<Self>, frame: &Arc<Frame>, inode: Inode, flags: OpenFlags) -> FuseResult<FileHandle> {
        self.impl_.open(self, frame, inode, flags)
    }
    pub fn read(self: &Arc<Self>, frame: &Arc<Frame>, inode: Inode, fh: FileHandle, offset: i64, size: u32) -> FuseResult<Vec<u8>> {
        self.impl_.read(self, frame, inode, fh, offset, size)
    }
    pub fn write(self: &Arc<Self>, frame: &Arc<Frame>, inode: Inode, fh: FileHandle, offset: i64, segments: &[&[u8]]) -> (u32, Option<PosixError>) {
        self.impl_.write(self, frame, inode, fh, offset, segments)
    }
    pub fn statfs(self: &Arc<Self>, frame: &Arc<Frame>, inode: Inode) -> FuseResult<StatFs> {
        self.impl_.statfs(self, frame, inode)
    }
    pub fn flush(self: &Arc<Self>, frame: &Arc<Frame>, inode: Inode, fh: FileHandle) -> FuseResult<()> {
        self.impl_.flush(self, frame, inode, fh)
    }
    pub fn release(self: &Arc<Self>, frame: &Arc<Frame>, inode: Inode, fh: FileHandle) -> FuseResult<()> {
        self.impl_.release(self, frame, inode, fh)
    }
    pub fn fsync(self: &Arc<Self>, frame: &Arc<Frame>, inode: Inode, fh: FileHandle, datasync: bool) -> FuseResult<()> {
        self.impl_.fsync(self, frame, inode, fh, datasync)
    }
    pub fn ftruncate(self: &Arc<Self>, frame: &Arc<Frame>, inode: Inode, fh: FileHandle, size: u64) -> FuseResult<FileAttribute> {
        self.impl_.ftruncate(self, frame, inode, fh, size)
    }
    pub fn setxattr(self: &Arc<Self>, frame: &Arc<Frame>, inode: Inode, name: &OsStr, value: &[u8]) -> FuseResult<()> {
        self.impl_.setxattr(self, frame, inode, name, value)
    }
    pub fn getxattr(self: &Arc<Self>, frame: &Arc<Frame>, inode: Inode, name: &OsStr, size: u32) -> FuseResult<Vec<u8>> {
        self.impl_.getxattr(self, frame, inode, name, size)
    }
    pub fn removexattr(self: &Arc<Self>, frame: &Arc<Frame>, inode: Inode, name: &OsStr) -> FuseResult<()> {
        self.impl_.removexattr(self, frame, inode, name)
    }
    pub fn access(self: &Arc<Self>, frame: &Arc<Frame>, inode: Inode, mask: i32) -> FuseResult<()> {
        self.impl_.access(self, frame, inode, mask)
    }
    pub fn lk(self: &Arc<Self>, frame: &Arc<Frame>, inode: Inode, fh: FileHandle, lock: LockInfo) -> FuseResult<LockInfo> {
        self.impl_.lk(self, frame, inode, fh, lock)
    }
    pub fn rmelem(self: &Arc<Self>, frame: &Arc<Frame>, inode: Inode) -> FuseResult<()> {
        self.impl_.rmelem(self, frame, inode)
    }
    pub fn incver(self: &Arc<Self>, frame: &Arc<Frame>, inode: Inode) -> FuseResult<u64> {
        self.impl_.incver(self, frame, inode)
    }
    pub fn stats(self: &Arc<Self>, frame: &Arc<Frame>) -> FuseResult<XlatorStats> {
        self.impl_.stats(self, frame)
    }
    pub fn checksum(self: &Arc<Self>, frame: &Arc<Frame>, inode: Inode) -> FuseResult<Checksum> {
        self.impl_.checksum(self, frame, inode)
    }
    pub fn getspec(self: &Arc<Self>, frame: &Arc<Frame>, key: &Dict) -> FuseResult<Vec<u8>> {
        self.impl_.getspec(self, frame, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xlator::registry::dummy_translator;

    #[test]
    fn default_passthrough_forwards_to_sole_child() {
        let leaf = dummy_translator("leaf");
        let top = dummy_translator("top");
        top.add_child(leaf.clone());
        assert!(top.parent().is_none());
        assert!(Arc::ptr_eq(&leaf.parent().unwrap(), &top));
        assert_eq!(top.children().len(), 1);
    }

    #[test]
    fn leaf_with_no_child_refuses_lookup_with_enosys() {
        let leaf = dummy_translator("leaf");
        let frame_pool = crate::frame::FramePool::new();
        let root = crate::frame::FrameRoot::new(0, 0, 0, 1);
        let frame = frame_pool.new_root(leaf.clone(), root);
        let err = leaf.lookup(&frame, Inode::from(1), OsStr::new("x")).unwrap_err();
        assert_eq!(i32::from(err.kind()), libc::ENOSYS);
    }

    #[test]
    fn rmdir_is_refused_by_default() {
        let leaf = dummy_translator("leaf");
        let frame_pool = crate::frame::FramePool::new();
        let root = crate::frame::FrameRoot::new(0, 0, 0, 1);
        let frame = frame_pool.new_root(leaf.clone(), root);
        let err = leaf.rmdir(&frame, Inode::from(1), OsStr::new("d")).unwrap_err();
        assert_eq!(i32::from(err.kind()), libc::EPERM);
    }
}
