//! The bctx table: a per-directory context caching a lazily-opened embedded
//! database handle, with hash-table/LRU residency driven by an explicit
//! reference count (§3, §4.4, invariant iv).
//!
//! `bctx_lookup` (a path that is itself a directory) and `bctx_parent` (the
//! parent directory of a file path) are kept as two distinct entry points
//! rather than collapsed into one, preserving the original's two access
//! patterns (§10.5, grounded on `bdb.c`).

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::types::errors::{posix_error_from_sled, FuseResult, PosixError};

use super::DB_FILENAME;

/// A per-directory context: its absolute host path and a lazily-opened
/// `sled` handle guarded by its own mutex.
pub struct Bctx {
    pub path: PathBuf,
    refcount: AtomicUsize,
    db: Mutex<Option<sled::Db>>,
}

impl Bctx {
    fn new(path: PathBuf) -> Arc<Self> {
        Arc::new(Bctx {
            path,
            refcount: AtomicUsize::new(0),
            db: Mutex::new(None),
        })
    }

    /// Opens (if not already open) and returns the embedded database for
    /// this directory. Open failures are recoverable: a later call retries
    /// (§4.4 "Failure semantics").
    pub fn db(&self) -> FuseResult<sled::Db> {
        let mut guard = self.db.lock().unwrap();
        if let Some(db) = guard.as_ref() {
            return Ok(db.clone());
        }
        let db = sled::open(self.path.join(DB_FILENAME)).map_err(posix_error_from_sled)?;
        *guard = Some(db.clone());
        Ok(db)
    }

    fn refcount(&self) -> usize {
        self.refcount.load(Ordering::SeqCst)
    }
}

impl Drop for Bctx {
    fn drop(&mut self) {
        if self.db.lock().unwrap().take().is_some() {
            log::debug!("closed bctx database handle for {}", self.path.display());
        }
    }
}

/// Maps directory path → [`Bctx`], with a bounded LRU of zero-refcount
/// entries. The table mutex serializes hash/LRU membership transitions
/// only; each bctx's own mutex guards its database handle (§5).
pub struct BctxTable {
    hash: Mutex<HashMap<PathBuf, Arc<Bctx>>>,
    lru: Mutex<VecDeque<Arc<Bctx>>>,
    lru_limit: usize,
}

impl BctxTable {
    pub fn new(lru_limit: usize) -> Self {
        BctxTable {
            hash: Mutex::new(HashMap::new()),
            lru: Mutex::new(VecDeque::new()),
            lru_limit,
        }
    }

    /// Looks up (creating if absent) the bctx for `path`, which must itself
    /// name a directory, and takes a reference on it.
    pub fn lookup(&self, path: &Path) -> Arc<Bctx> {
        let mut hash = self.hash.lock().unwrap();
        if let Some(bctx) = hash.get(path) {
            bctx.refcount.fetch_add(1, Ordering::SeqCst);
            return bctx.clone();
        }
        // Might be sitting zero-ref on the LRU from a prior release.
        let mut lru = self.lru.lock().unwrap();
        if let Some(pos) = lru.iter().position(|b| b.path == path) {
            let bctx = lru.remove(pos).unwrap();
            bctx.refcount.fetch_add(1, Ordering::SeqCst);
            hash.insert(path.to_path_buf(), bctx.clone());
            return bctx;
        }
        let bctx = Bctx::new(path.to_path_buf());
        bctx.refcount.fetch_add(1, Ordering::SeqCst);
        hash.insert(path.to_path_buf(), bctx.clone());
        bctx
    }

    /// Looks up the bctx of `child_path`'s parent directory. Fails if the
    /// path has no parent (i.e. is the export root itself).
    pub fn lookup_parent(&self, child_path: &Path) -> FuseResult<Arc<Bctx>> {
        let parent = child_path
            .parent()
            .ok_or_else(|| PosixError::new(libc::EINVAL, "path has no parent directory"))?;
        Ok(self.lookup(parent))
    }

    /// Releases a reference taken by [`BctxTable::lookup`]/[`BctxTable::lookup_parent`].
    /// A bctx reaching zero refs moves to the LRU; the LRU head is evicted
    /// (closing its database) once the table exceeds `lru_limit` entries.
    pub fn release(&self, bctx: Arc<Bctx>) {
        if bctx.refcount.fetch_sub(1, Ordering::SeqCst) != 1 {
            return;
        }
        let mut hash = self.hash.lock().unwrap();
        hash.remove(&bctx.path);
        let mut lru = self.lru.lock().unwrap();
        lru.push_back(bctx);
        while lru.len() > self.lru_limit {
            let evicted = lru.pop_front().unwrap();
            log::debug!("evicting bctx for {} from LRU", evicted.path.display());
            // Dropping the last strong reference runs Bctx::drop, which
            // closes the database handle before the node itself is freed.
        }
    }

    pub fn len_hash(&self) -> usize {
        self.hash.lock().unwrap().len()
    }

    pub fn len_lru(&self) -> usize {
        self.lru.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_and_release_moves_between_hash_and_lru() {
        let table = BctxTable::new(4);
        let dir = tempfile::tempdir().unwrap();
        let bctx = table.lookup(dir.path());
        assert_eq!(bctx.refcount(), 1);
        assert_eq!(table.len_hash(), 1);
        assert_eq!(table.len_lru(), 0);

        table.release(bctx);
        assert_eq!(table.len_hash(), 0);
        assert_eq!(table.len_lru(), 1);
    }

    #[test]
    fn lru_eviction_closes_database_before_removal() {
        let table = BctxTable::new(1);
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();

        let a = table.lookup(dir_a.path());
        a.db().unwrap();
        table.release(a);
        assert_eq!(table.len_lru(), 1);

        let b = table.lookup(dir_b.path());
        table.release(b);
        // lru_limit is 1: adding a second zero-ref entry evicts the first.
        assert_eq!(table.len_lru(), 1);
    }

    #[test]
    fn relookup_of_lru_resident_bctx_reuses_the_node() {
        let table = BctxTable::new(4);
        let dir = tempfile::tempdir().unwrap();
        let first = table.lookup(dir.path());
        table.release(first.clone());
        let second = table.lookup(dir.path());
        assert!(Arc::ptr_eq(&first, &second));
    }
}
