use std::ops::Deref;
use super::errors::*;
use super::file_handle::FileHandle;

/// Represents the file descriptor of an open file on the host system
#[derive(Debug, Clone, Copy)]
pub struct FileDescriptor(i32);

impl From<FileDescriptor> for i32 {
    fn from(value: FileDescriptor) -> Self {
        value.0
    }
}

impl From<i32> for FileDescriptor {
    fn from(value: i32) -> Self {
        FileDescriptor(value)
    }
}

impl TryFrom<FileHandle> for FileDescriptor {
    type Error = PosixError;

    fn try_from(fh: FileHandle) -> FuseResult<Self> {
        Ok(Self(
            i32::try_from(u64::from(fh)).map_err(|_| PosixError::from(PosixError::INVALID_ARGUMENT))?,
        ))
    }
}

impl FileDescriptor {
    pub fn to_file_handle(self) -> FuseResult<FileHandle> {
        let fd: i32 = self.into();
        if fd < 0 {
            return Err(from_last_errno());
        }
        Ok(FileHandle::from(fd as u64))
    }
}

/// Closes the wrapped descriptor when dropped, unless [`take`](Self::take)
/// was called first. Used by the KV leaf's host-fs layer to guarantee a raw
/// fd returned by `libc::open` is never leaked on an early error return.
pub struct FileDescriptorGuard {
    fd: FileDescriptor,
    release_on_drop: bool,
}

impl FileDescriptorGuard {
    /// Create a new guard, that will be released on drop
    pub fn new(fd: FileDescriptor) -> Self {
        Self { fd, release_on_drop: true }
    }

    /// Prevent releasing the file descriptor on drop
    pub fn take(&mut self) -> FileDescriptor {
        self.release_on_drop = false;
        self.fd
    }

    pub fn take_to_file_handle(&mut self) -> FuseResult<FileHandle> {
        match self.fd.to_file_handle() {
            Ok(fd) => {
                self.release_on_drop = false;
                Ok(fd)
            }
            Err(e) => Err(e),
        }
    }
}

impl Deref for FileDescriptorGuard {
    type Target = FileDescriptor;

    fn deref(&self) -> &Self::Target {
        &self.fd
    }
}

impl Drop for FileDescriptorGuard {
    fn drop(&mut self) {
        if self.release_on_drop {
            let fd: i32 = self.fd.into();
            if unsafe { libc::close(fd) } != 0 {
                log::error!("Failed to release file descriptor: {}", from_last_errno());
            }
        }
    }
}
