//! Request-scoped call frames and the wind/unwind continuation machinery
//! that propagates an operation down the translator graph and a correlated
//! reply back up (§4.2).
//!
//! A [`Frame`] is allocated on [`wind`] and consumed by exactly one
//! [`unwind`]; the unwind invokes the callback stashed on the frame at wind
//! time with the parent frame and the result. Because each frame's
//! lifetime is exactly "from wind to unwind", it is modeled as an `Arc`
//! rather than handed back to a free-list by hand: the frame pool's
//! `all_frames` list only holds weak references for diagnostics, so a
//! frame's memory still goes away the instant its last strong reference
//! (the unwind call, or an orphaned timeout) drops it.

use std::any::Any;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::types::errors::PosixError;
use crate::types::FileAttribute;
use crate::xlator::Translator;

/// Graph-wide events delivered to [`crate::xlator::Xlator::notify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyEvent {
    ChildUp,
    ChildDown,
    ParentUp,
    ParentDown,
}

/// The payload carried by a successful unwind. One variant per shape of
/// result a file or management op can produce; `OpReply::Unit` covers ops
/// whose success carries no data (unlink, rmdir, setxattr, ...).
#[derive(Debug)]
pub enum OpReply {
    Unit,
    Attr(FileAttribute),
    Bytes(Vec<u8>),
    Written(u32),
    Entries(Vec<(std::ffi::OsString, fuser::FileType, crate::types::Inode)>),
    DirPlus(Vec<crate::types::FuseDirEntryPlus>),
    StatFs(crate::types::StatFs),
    Checksum([u8; 4096], [u8; 4096]),
    Fd(crate::types::FileHandle),
    Created(crate::types::FileHandle, FileAttribute),
    Dict(crate::dict::Dict),
}

/// Per-request root shared by every frame in one wind chain.
pub struct FrameRoot {
    pub uid: u32,
    pub gid: u32,
    pub pid: u32,
    pub unique: u64,
    response_refs: AtomicUsize,
}

impl FrameRoot {
    pub fn new(uid: u32, gid: u32, pid: u32, unique: u64) -> Arc<Self> {
        Arc::new(FrameRoot {
            uid,
            gid,
            pid,
            unique,
            response_refs: AtomicUsize::new(0),
        })
    }
}

type UnwindCallback = Box<dyn FnOnce(&Arc<Frame>, u64, Result<OpReply, PosixError>) + Send>;

/// One call-frame: the translator it is executing on, its parent frame (if
/// any), a cookie distinguishing it among its parent's outstanding children,
/// and a translator-private `local` slot.
pub struct Frame {
    pub root: Arc<FrameRoot>,
    pub this: Arc<Translator>,
    pub parent: Option<Arc<Frame>>,
    pub cookie: u64,
    local: Mutex<Option<Box<dyn Any + Send>>>,
    callback: Mutex<Option<UnwindCallback>>,
    discarded: std::sync::atomic::AtomicBool,
}

impl Frame {
    pub fn set_local<T: Any + Send>(&self, value: T) {
        *self.local.lock().unwrap() = Some(Box::new(value));
    }

    pub fn take_local<T: Any + Send>(&self) -> Option<T> {
        self.local
            .lock()
            .unwrap()
            .take()
            .and_then(|b| b.downcast::<T>().ok())
            .map(|b| *b)
    }

    /// Synthesizes an unwind with a timeout error and marks the frame
    /// orphaned, so the real unwind (when it eventually arrives) finds no
    /// callback left to invoke and is silently discarded (§4.2, §5).
    pub fn cancel_with_timeout(self: &Arc<Self>, code: i32) {
        self.discarded.store(true, Ordering::SeqCst);
        let cb = self.callback.lock().unwrap().take();
        if let Some(cb) = cb {
            let parent = self
                .parent
                .clone()
                .expect("root frames are not cancellable");
            cb(&parent, self.cookie, Err(PosixError::new(code, "operation timed out")));
        }
    }
}

/// Allocates and tracks frames for one [`crate::bootstrap::Context`].
///
/// The pool mutex protects only the cookie counter and the `all_frames`
/// diagnostic list (§5): it must never be held while a translator handler
/// runs.
pub struct FramePool {
    next_cookie: AtomicU64,
    all_frames: Mutex<Vec<Weak<Frame>>>,
}

impl FramePool {
    pub fn new() -> Arc<Self> {
        Arc::new(FramePool {
            next_cookie: AtomicU64::new(1),
            all_frames: Mutex::new(Vec::new()),
        })
    }

    /// Creates a root frame with no parent, executing on `this`. Used at the
    /// top of a chain (a FUSE upcall, an inbound RPC, a spec-fetch getspec).
    pub fn new_root(&self, this: Arc<Translator>, root: Arc<FrameRoot>) -> Arc<Frame> {
        let frame = Arc::new(Frame {
            root,
            this,
            parent: None,
            cookie: 0,
            local: Mutex::new(None),
            callback: Mutex::new(None),
            discarded: std::sync::atomic::AtomicBool::new(false),
        });
        self.track(&frame);
        frame
    }

    /// Records `(parent_frame, callback, target_xl)`: allocates a child
    /// frame whose parent is `parent_frame` and whose callback fires on the
    /// matching [`unwind`]. The caller still must invoke the target
    /// translator's op with the returned frame; `wind` only does the
    /// bookkeeping half of §4.2's contract.
    pub fn wind(
        &self,
        parent_frame: &Arc<Frame>,
        target: Arc<Translator>,
        callback: UnwindCallback,
    ) -> Arc<Frame> {
        let cookie = self.next_cookie.fetch_add(1, Ordering::Relaxed);
        let frame = Arc::new(Frame {
            root: parent_frame.root.clone(),
            this: target,
            parent: Some(parent_frame.clone()),
            cookie,
            local: Mutex::new(None),
            callback: Mutex::new(Some(callback)),
            discarded: std::sync::atomic::AtomicBool::new(false),
        });
        self.track(&frame);
        frame
    }

    fn track(&self, frame: &Arc<Frame>) {
        let mut all = self.all_frames.lock().unwrap();
        all.retain(|w| w.strong_count() > 0);
        all.push(Arc::downgrade(frame));
    }

    /// Number of frames still reachable; used by tests asserting that a
    /// wind/unwind sequence returns the live-frame multiset to baseline.
    pub fn live_count(&self) -> usize {
        let all = self.all_frames.lock().unwrap();
        all.iter().filter(|w| w.strong_count() > 0).count()
    }
}

impl Default for FramePool {
    fn default() -> Self {
        Self {
            next_cookie: AtomicU64::new(1),
            all_frames: Mutex::new(Vec::new()),
        }
    }
}

/// Fires the callback stashed on `frame` at wind time with `frame`'s parent,
/// cookie, and `result`. A frame whose callback was already taken (by a
/// prior [`Frame::cancel_with_timeout`]) is an orphan: the late unwind is
/// logged at DEBUG and dropped, matching §4.2/§5's cancellation contract.
pub fn unwind(frame: Arc<Frame>, result: Result<OpReply, PosixError>) {
    let cb = frame.callback.lock().unwrap().take();
    match cb {
        Some(cb) => {
            let parent = frame
                .parent
                .clone()
                .expect("unwind called on a root frame with no parent callback");
            cb(&parent, frame.cookie, result);
        }
        None => {
            log::debug!(
                "discarding unwind for orphaned frame (cookie={})",
                frame.cookie
            );
        }
    }
}

/// Bridges the wind/unwind continuation world to a synchronous caller (the
/// FUSE top translator's `fuser::Filesystem` callbacks, which must return a
/// reply before returning control to the kernel channel). Winds `op` into
/// `target` and blocks the calling thread on a channel until the matching
/// unwind fires; `op` is expected to call the target translator's handler
/// with the frame it is handed and eventually call [`unwind`] on it (directly,
/// or via a worker thread's completion callback per §5).
pub fn call_sync<F>(pool: &FramePool, root_this: Arc<Translator>, root: Arc<FrameRoot>, op: F) -> Result<OpReply, PosixError>
where
    F: FnOnce(&FramePool, Arc<Frame>) + Send + 'static,
{
    let (tx, rx) = std::sync::mpsc::channel();
    let root_frame = pool.new_root(root_this.clone(), root.clone());
    let child = pool.wind(
        &root_frame,
        root_this,
        Box::new(move |_parent, _cookie, result| {
            let _ = tx.send(result);
        }),
    );
    op(pool, child);
    rx.recv().unwrap_or_else(|_| Err(PosixError::new(libc::EIO, "frame channel closed")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xlator::registry::dummy_translator;

    #[test]
    fn wind_unwind_returns_to_baseline_live_count() {
        let pool = FramePool::new();
        let top = dummy_translator("top");
        let root = FrameRoot::new(0, 0, 0, 1);
        let root_frame = pool.new_root(top.clone(), root);
        let baseline = pool.live_count();

        let child = pool.wind(
            &root_frame,
            top,
            Box::new(|_parent, _cookie, result| {
                assert!(result.is_ok());
            }),
        );
        assert_eq!(pool.live_count(), baseline + 1);
        unwind(child, Ok(OpReply::Unit));
    }

    #[test]
    fn orphaned_unwind_after_timeout_is_discarded() {
        let pool = FramePool::new();
        let top = dummy_translator("top");
        let root = FrameRoot::new(0, 0, 0, 1);
        let root_frame = pool.new_root(top.clone(), root);
        let fired = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let fired_cb = fired.clone();
        let child = pool.wind(
            &root_frame,
            top,
            Box::new(move |_parent, _cookie, result| {
                fired_cb.fetch_add(1, Ordering::SeqCst);
                assert!(result.is_err());
            }),
        );
        child.cancel_with_timeout(libc::ETIMEDOUT);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        // The real reply arrives later; it must be silently discarded, not
        // fire the callback a second time.
        unwind(child, Ok(OpReply::Unit));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
