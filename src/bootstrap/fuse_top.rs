//! The `mount/fuse` translator and its bridge into `fuser::Filesystem`
//! (§4.1 "graph root", §6 FUSE mount options).
//!
//! [`FuseTopTranslator`] is an ordinary graph node: it carries mount
//! configuration as options and forwards every file op to its sole child
//! via the trait's default passthrough bodies, same as any other stacking
//! translator. [`FuseBridge`] is the separate adaptor `main.rs` hands to
//! `fuser::mount2` — grounded on the reference codebase's own
//! `fuser_wrapper.rs`, which likewise keeps the kernel-facing `Filesystem`
//! impl as a thin wrapper around a translator-style API rather than folding
//! FUSE reply plumbing into the op trait itself.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fuser::{KernelConfig, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyDirectoryPlus, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, ReplyXattr, Request, TimeOrNow};
use libc::c_int;

use crate::context::{Context, FuseMountConfig};
use crate::dict::Dict;
use crate::frame::{call_sync, unwind, Frame, FramePool, FrameRoot, OpReply};
use crate::types::errors::{ErrorKind, FuseResult, PosixError};
use crate::types::{FileHandle, OpenFlags, RenameFlags, SetAttrRequest};
use crate::xlator::{Translator, Xlator};

/// Graph node for the FUSE mount. Carries mount configuration resolved at
/// `init` time from its options dict; has no file ops of its own, relying
/// entirely on [`Xlator`]'s default passthrough-to-sole-child bodies.
pub struct FuseTopTranslator {
    config: Mutex<MountConfig>,
}

#[derive(Clone, Default)]
struct MountConfig {
    mountpoint: String,
    entry_timeout: Duration,
    attr_timeout: Duration,
    nodev: bool,
    nosuid: bool,
    direct_io: bool,
}

impl FuseTopTranslator {
    pub fn new(_options: &Dict) -> Self {
        FuseTopTranslator {
            config: Mutex::new(MountConfig {
                entry_timeout: Duration::from_secs(1),
                attr_timeout: Duration::from_secs(1),
                ..Default::default()
            }),
        }
    }

    pub fn mount_config(&self) -> (String, bool, bool, bool) {
        let c = self.config.lock().unwrap();
        (c.mountpoint.clone(), c.nodev, c.nosuid, c.direct_io)
    }

    fn as_fuse_mount_config(&self) -> FuseMountConfig {
        let c = self.config.lock().unwrap();
        FuseMountConfig {
            mountpoint: c.mountpoint.clone(),
            entry_timeout: c.entry_timeout,
            attr_timeout: c.attr_timeout,
            nodev: c.nodev,
            nosuid: c.nosuid,
            direct_io: c.direct_io,
        }
    }
}

impl Xlator for FuseTopTranslator {
    fn type_name(&self) -> &'static str {
        "mount/fuse"
    }

    /// Resolves mount configuration from options and publishes it on `ctx`
    /// (§4.3 init contract): the graph loader only threads `&Context`
    /// through `init`, so this is how `run_fuse_loop` learns the mountpoint
    /// without downcasting the node's `Arc<dyn Xlator>`.
    fn init(&self, node: &Translator, ctx: &Context) -> FuseResult<()> {
        let mut config = self.config.lock().unwrap();
        config.mountpoint = node.options.get_str("mount-point").unwrap_or_default();
        if let Some(secs) = node.options.get_str("entry-timeout").and_then(|s| s.parse().ok()) {
            config.entry_timeout = Duration::from_secs_f64(secs);
        }
        if let Some(secs) = node.options.get_str("attribute-timeout").and_then(|s| s.parse().ok()) {
            config.attr_timeout = Duration::from_secs_f64(secs);
        }
        config.nodev = node.options.get_str("nodev").as_deref() == Some("on");
        config.nosuid = node.options.get_str("nosuid").as_deref() == Some("on");
        config.direct_io = node.options.get_str("direct-io").as_deref() != Some("off");
        if config.mountpoint.is_empty() {
            return Err(PosixError::new(libc::EINVAL, "mount/fuse volume has no mount-point option"));
        }
        drop(config);
        ctx.set_fuse_mount_config(self.as_fuse_mount_config());
        Ok(())
    }
}

fn random_generation() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

fn reply_error(e: PosixError) -> c_int {
    if e.raw_error() == 0 {
        i32::from(ErrorKind::InputOutputError)
    } else {
        e.raw_error()
    }
}

/// The kernel-facing adaptor: blocks on [`call_sync`] for every callback, so
/// from `fuser`'s point of view the filesystem always replies before the
/// call returns (§4.2 design note on bridging the wind/unwind world to a
/// synchronous caller).
pub struct FuseBridge {
    root: Arc<Translator>,
    pool: Arc<FramePool>,
    entry_timeout: Duration,
    attr_timeout: Duration,
}

impl FuseBridge {
    pub fn new(root: Arc<Translator>, pool: Arc<FramePool>, entry_timeout: Duration, attr_timeout: Duration) -> Self {
        FuseBridge {
            root,
            pool,
            entry_timeout,
            attr_timeout,
        }
    }

    fn dispatch<F>(&self, req: &Request, f: F) -> Result<OpReply, PosixError>
    where
        F: FnOnce(Arc<Translator>, Arc<Frame>) -> FuseResult<OpReply> + Send + 'static,
    {
        let root_ctx = FrameRoot::new(req.uid(), req.gid(), req.pid(), req.unique());
        let node = self.root.clone();
        call_sync(&self.pool, node.clone(), root_ctx, move |_pool, frame| {
            let result = f(node, frame.clone());
            unwind(frame, result);
        })
    }
}

impl fuser::Filesystem for FuseBridge {
    fn init(&mut self, _req: &Request, _config: &mut KernelConfig) -> Result<(), c_int> {
        Ok(())
    }

    fn lookup(&mut self, req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let name = name.to_os_string();
        match self.dispatch(req, move |node, frame| node.lookup(&frame, parent.into(), &name).map(OpReply::Attr)) {
            Ok(OpReply::Attr(attr)) => reply.entry(&self.entry_timeout, &attr.to_fuse(), random_generation()),
            Ok(_) => reply.error(libc::EIO),
            Err(e) => reply.error(reply_error(e)),
        }
    }

    fn forget(&mut self, _req: &Request, ino: u64, nlookup: u64) {
        self.root.forget(ino.into(), nlookup);
    }

    fn getattr(&mut self, req: &Request, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.dispatch(req, move |node, frame| node.getattr(&frame, ino.into()).map(OpReply::Attr)) {
            Ok(OpReply::Attr(attr)) => reply.attr(&self.attr_timeout, &attr.to_fuse()),
            Ok(_) => reply.error(libc::EIO),
            Err(e) => reply.error(reply_error(e)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        req: &Request,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        ctime: Option<std::time::SystemTime>,
        fh: Option<u64>,
        _crtime: Option<std::time::SystemTime>,
        _chgtime: Option<std::time::SystemTime>,
        _bkuptime: Option<std::time::SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let attrs = SetAttrRequest {
            mode,
            uid,
            gid,
            size,
            atime,
            mtime,
            ctime,
            file_handle: fh.map(FileHandle::from),
            ..Default::default()
        };
        match self.dispatch(req, move |node, frame| node.setattr(&frame, ino.into(), attrs).map(OpReply::Attr)) {
            Ok(OpReply::Attr(attr)) => reply.attr(&self.attr_timeout, &attr.to_fuse()),
            Ok(_) => reply.error(libc::EIO),
            Err(e) => reply.error(reply_error(e)),
        }
    }

    fn readlink(&mut self, req: &Request, ino: u64, reply: ReplyData) {
        match self.dispatch(req, move |node, frame| node.readlink(&frame, ino.into()).map(OpReply::Bytes)) {
            Ok(OpReply::Bytes(data)) => reply.data(&data),
            Ok(_) => reply.error(libc::EIO),
            Err(e) => reply.error(reply_error(e)),
        }
    }

    fn mknod(&mut self, req: &Request, parent: u64, name: &OsStr, mode: u32, _umask: u32, rdev: u32, reply: ReplyEntry) {
        let name = name.to_os_string();
        match self.dispatch(req, move |node, frame| node.mknod(&frame, parent.into(), &name, mode, rdev).map(OpReply::Attr)) {
            Ok(OpReply::Attr(attr)) => reply.entry(&self.entry_timeout, &attr.to_fuse(), random_generation()),
            Ok(_) => reply.error(libc::EIO),
            Err(e) => reply.error(reply_error(e)),
        }
    }

    fn mkdir(&mut self, req: &Request, parent: u64, name: &OsStr, mode: u32, _umask: u32, reply: ReplyEntry) {
        let name = name.to_os_string();
        match self.dispatch(req, move |node, frame| node.mkdir(&frame, parent.into(), &name, mode).map(OpReply::Attr)) {
            Ok(OpReply::Attr(attr)) => reply.entry(&self.entry_timeout, &attr.to_fuse(), random_generation()),
            Ok(_) => reply.error(libc::EIO),
            Err(e) => reply.error(reply_error(e)),
        }
    }

    fn unlink(&mut self, req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let name = name.to_os_string();
        match self.dispatch(req, move |node, frame| node.unlink(&frame, parent.into(), &name).map(|_| OpReply::Unit)) {
            Ok(_) => reply.ok(),
            Err(e) => reply.error(reply_error(e)),
        }
    }

    fn rmdir(&mut self, req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let name = name.to_os_string();
        match self.dispatch(req, move |node, frame| node.rmdir(&frame, parent.into(), &name).map(|_| OpReply::Unit)) {
            Ok(_) => reply.ok(),
            Err(e) => reply.error(reply_error(e)),
        }
    }

    fn symlink(&mut self, req: &Request, parent: u64, link_name: &OsStr, target: &Path, reply: ReplyEntry) {
        let link_name = link_name.to_os_string();
        let target = target.to_path_buf();
        match self.dispatch(req, move |node, frame| node.symlink(&frame, parent.into(), &link_name, &target).map(OpReply::Attr)) {
            Ok(OpReply::Attr(attr)) => reply.entry(&self.entry_timeout, &attr.to_fuse(), random_generation()),
            Ok(_) => reply.error(libc::EIO),
            Err(e) => reply.error(reply_error(e)),
        }
    }

    fn rename(&mut self, req: &Request, parent: u64, name: &OsStr, newparent: u64, newname: &OsStr, flags: u32, reply: ReplyEmpty) {
        let name = name.to_os_string();
        let newname = newname.to_os_string();
        let rename_flags = RenameFlags::from_bits_truncate(flags);
        match self.dispatch(req, move |node, frame| {
            node.rename(&frame, parent.into(), &name, newparent.into(), &newname, rename_flags).map(|_| OpReply::Unit)
        }) {
            Ok(_) => reply.ok(),
            Err(e) => reply.error(reply_error(e)),
        }
    }

    fn open(&mut self, req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        let open_flags = OpenFlags::from_bits_truncate(flags);
        match self.dispatch(req, move |node, frame| node.open(&frame, ino.into(), open_flags).map(OpReply::Fd)) {
            Ok(OpReply::Fd(fh)) => reply.opened(fh.into(), 0),
            Ok(_) => reply.error(libc::EIO),
            Err(e) => reply.error(reply_error(e)),
        }
    }

    fn create(&mut self, req: &Request, parent: u64, name: &OsStr, mode: u32, _umask: u32, flags: i32, reply: ReplyCreate) {
        let name = name.to_os_string();
        let open_flags = OpenFlags::from_bits_truncate(flags);
        match self.dispatch(req, move |node, frame| node.create(&frame, parent.into(), &name, mode, open_flags).map(|(fh, attr)| OpReply::Created(fh, attr))) {
            Ok(OpReply::Created(fh, attr)) => reply.created(&self.entry_timeout, &attr.to_fuse(), random_generation(), fh.into(), 0),
            Ok(_) => reply.error(libc::EIO),
            Err(e) => reply.error(reply_error(e)),
        }
    }

    fn read(&mut self, req: &Request, ino: u64, fh: u64, offset: i64, size: u32, _flags: i32, _lock_owner: Option<u64>, reply: ReplyData) {
        match self.dispatch(req, move |node, frame| node.read(&frame, ino.into(), fh.into(), offset, size).map(OpReply::Bytes)) {
            Ok(OpReply::Bytes(data)) => reply.data(&data),
            Ok(_) => reply.error(libc::EIO),
            Err(e) => reply.error(reply_error(e)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn write(&mut self, req: &Request, ino: u64, fh: u64, offset: i64, data: &[u8], _write_flags: u32, _flags: i32, _lock_owner: Option<u64>, reply: ReplyWrite) {
        let data = data.to_vec();
        let result = self.dispatch(req, move |node, frame| {
            let (written, err) = node.write(&frame, ino.into(), fh.into(), offset, &[&data]);
            match err {
                Some(e) if written == 0 => Err(e),
                _ => Ok(OpReply::Written(written)),
            }
        });
        match result {
            Ok(OpReply::Written(n)) => reply.written(n),
            Ok(_) => reply.error(libc::EIO),
            Err(e) => reply.error(reply_error(e)),
        }
    }

    fn flush(&mut self, req: &Request, ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        match self.dispatch(req, move |node, frame| node.flush(&frame, ino.into(), fh.into()).map(|_| OpReply::Unit)) {
            Ok(_) => reply.ok(),
            Err(e) => reply.error(reply_error(e)),
        }
    }

    fn release(&mut self, req: &Request, ino: u64, fh: u64, _flags: i32, _lock_owner: Option<u64>, _flush: bool, reply: ReplyEmpty) {
        match self.dispatch(req, move |node, frame| node.release(&frame, ino.into(), fh.into()).map(|_| OpReply::Unit)) {
            Ok(_) => reply.ok(),
            Err(e) => reply.error(reply_error(e)),
        }
    }

    fn fsync(&mut self, req: &Request, ino: u64, fh: u64, datasync: bool, reply: ReplyEmpty) {
        match self.dispatch(req, move |node, frame| node.fsync(&frame, ino.into(), fh.into(), datasync).map(|_| OpReply::Unit)) {
            Ok(_) => reply.ok(),
            Err(e) => reply.error(reply_error(e)),
        }
    }

    fn opendir(&mut self, req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        let open_flags = OpenFlags::from_bits_truncate(flags);
        match self.dispatch(req, move |node, frame| node.opendir(&frame, ino.into(), open_flags).map(OpReply::Fd)) {
            Ok(OpReply::Fd(fh)) => reply.opened(fh.into(), 0),
            Ok(_) => reply.error(libc::EIO),
            Err(e) => reply.error(reply_error(e)),
        }
    }

    fn readdir(&mut self, req: &Request, ino: u64, fh: u64, offset: i64, mut reply: ReplyDirectory) {
        match self.dispatch(req, move |node, frame| node.readdir(&frame, ino.into(), fh.into(), offset as u64).map(OpReply::Entries)) {
            Ok(OpReply::Entries(entries)) => {
                for (i, (name, kind, inode)) in entries.into_iter().enumerate() {
                    if reply.add(inode.into(), offset + i as i64 + 1, kind, &name) {
                        break;
                    }
                }
                reply.ok();
            }
            Ok(_) => reply.error(libc::EIO),
            Err(e) => reply.error(reply_error(e)),
        }
    }

    fn readdirplus(&mut self, req: &Request, ino: u64, fh: u64, offset: i64, mut reply: ReplyDirectoryPlus) {
        let result = self.dispatch(req, move |node, frame| {
            node.readdirplus(&frame, ino.into(), fh.into(), offset as u64).map(OpReply::DirPlus)
        });
        match result {
            Ok(OpReply::DirPlus(entries)) => {
                for (i, entry) in entries.into_iter().enumerate() {
                    if reply.add(entry.inode.into(), offset + i as i64 + 1, &entry.name, &self.entry_timeout, &entry.attr.to_fuse(), random_generation()) {
                        break;
                    }
                }
                reply.ok();
            }
            Ok(_) => reply.error(libc::EIO),
            Err(e) => reply.error(reply_error(e)),
        }
    }

    fn releasedir(&mut self, req: &Request, ino: u64, fh: u64, _flags: i32, reply: ReplyEmpty) {
        match self.dispatch(req, move |node, frame| node.releasedir(&frame, ino.into(), fh.into()).map(|_| OpReply::Unit)) {
            Ok(_) => reply.ok(),
            Err(e) => reply.error(reply_error(e)),
        }
    }

    fn fsyncdir(&mut self, req: &Request, ino: u64, fh: u64, datasync: bool, reply: ReplyEmpty) {
        match self.dispatch(req, move |node, frame| node.fsyncdir(&frame, ino.into(), fh.into(), datasync).map(|_| OpReply::Unit)) {
            Ok(_) => reply.ok(),
            Err(e) => reply.error(reply_error(e)),
        }
    }

    fn statfs(&mut self, req: &Request, ino: u64, reply: ReplyStatfs) {
        match self.dispatch(req, move |node, frame| node.statfs(&frame, ino.into()).map(OpReply::StatFs)) {
            Ok(OpReply::StatFs(s)) => reply.statfs(s.total_blocks, s.free_blocks, s.available_blocks, s.total_files, s.free_files, s.block_size, s.max_filename_length, s.fragment_size),
            Ok(_) => reply.error(libc::EIO),
            Err(e) => reply.error(reply_error(e)),
        }
    }

    fn setxattr(&mut self, req: &Request, ino: u64, name: &OsStr, value: &[u8], _flags: i32, _position: u32, reply: ReplyEmpty) {
        let name = name.to_os_string();
        let value = value.to_vec();
        match self.dispatch(req, move |node, frame| node.setxattr(&frame, ino.into(), &name, &value).map(|_| OpReply::Unit)) {
            Ok(_) => reply.ok(),
            Err(e) => reply.error(reply_error(e)),
        }
    }

    fn getxattr(&mut self, req: &Request, ino: u64, name: &OsStr, size: u32, reply: ReplyXattr) {
        let name = name.to_os_string();
        match self.dispatch(req, move |node, frame| node.getxattr(&frame, ino.into(), &name, size).map(OpReply::Bytes)) {
            Ok(OpReply::Bytes(data)) => {
                if size == 0 {
                    reply.size(data.len() as u32);
                } else if size >= data.len() as u32 {
                    reply.data(&data);
                } else {
                    reply.error(libc::ERANGE);
                }
            }
            Ok(_) => reply.error(libc::EIO),
            Err(e) => reply.error(reply_error(e)),
        }
    }

    fn removexattr(&mut self, req: &Request, ino: u64, name: &OsStr, reply: ReplyEmpty) {
        let name = name.to_os_string();
        match self.dispatch(req, move |node, frame| node.removexattr(&frame, ino.into(), &name).map(|_| OpReply::Unit)) {
            Ok(_) => reply.ok(),
            Err(e) => reply.error(reply_error(e)),
        }
    }

    fn access(&mut self, req: &Request, ino: u64, mask: i32, reply: ReplyEmpty) {
        match self.dispatch(req, move |node, frame| node.access(&frame, ino.into(), mask).map(|_| OpReply::Unit)) {
            Ok(_) => reply.ok(),
            Err(e) => reply.error(reply_error(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict::Dict;

    #[test]
    fn init_requires_a_mount_point_option() {
        let xl = FuseTopTranslator::new(&Dict::new());
        let node = Translator::new("top", "mount/fuse", Dict::new(), Arc::new(xl));
        let ctx = Context::new(vec![], None);
        assert!(node.impl_.init(&node, &ctx).is_err());
    }

    #[test]
    fn init_reads_mount_point_and_timeouts() {
        let options = Dict::new();
        options.set("mount-point", "/mnt/x");
        options.set("entry-timeout", "2.5");
        let xl = Arc::new(FuseTopTranslator::new(&options));
        let node = Translator::new("top", "mount/fuse", options, xl.clone());
        let ctx = Context::new(vec![], None);
        node.impl_.init(&node, &ctx).unwrap();
        let (mountpoint, _, _, _) = xl.mount_config();
        assert_eq!(mountpoint, "/mnt/x");
    }
}
