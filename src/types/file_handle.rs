//! The opaque handle a translator hands back from `open`/`opendir` and
//! receives again on every subsequent `read`/`write`/`release` for that
//! same object.
//!
//! Unlike [`crate::types::file_descriptor::FileDescriptor`], a `FileHandle`
//! is not necessarily a host file descriptor: the KV leaf (see [`crate::kv`])
//! packs a bctx table slot and, for directory handles, a readdir cursor
//! bookmark into the same u64.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle(u64);

impl From<u64> for FileHandle {
    fn from(value: u64) -> Self {
        FileHandle(value)
    }
}

impl From<FileHandle> for u64 {
    fn from(value: FileHandle) -> Self {
        value.0
    }
}
