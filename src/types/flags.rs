//! Flags used in filesystem operations.
//!
//! Trimmed to the flag sets the translator op surface actually carries;
//! see the reference codebase's `types/flags.rs` for the fuller FUSE-level
//! vocabulary this was drawn from.
use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Copy, Clone)]
    /// Flags used to check file accessibility.
    pub struct AccessMask: i32 {
        /// Check if the file exists.
        const EXISTS = libc::F_OK;
        /// Check if the file is readable.
        const CAN_READ = libc::R_OK;
        /// Check if the file is writable.
        const CAN_WRITE = libc::W_OK;
        /// Check if the file is executable.
        const CAN_EXEC = libc::X_OK;
        const _ = !0;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone)]
    /// Flags used when opening files.
    pub struct OpenFlags: i32 {
        /// Open for reading only.
        const READ_ONLY = libc::O_RDONLY;
        /// Open for writing only.
        const WRITE_ONLY = libc::O_WRONLY;
        /// Open for reading and writing.
        const READ_WRITE = libc::O_RDWR;
        /// Create file if it doesn't exist.
        const CREATE = libc::O_CREAT;
        /// Fail if file already exists.
        const CREATE_EXCLUSIVE = libc::O_EXCL;
        /// Truncate file to zero length.
        const TRUNCATE = libc::O_TRUNC;
        /// Set append mode.
        const APPEND_MODE = libc::O_APPEND;
        /// Fail if not a directory.
        const MUST_BE_DIRECTORY = libc::O_DIRECTORY;
        const _ = !0;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone)]
    /// Flags used in rename operations.
    pub struct RenameFlags: u32 {
        /// Atomically exchange the old and new pathnames. (Linux only)
        #[cfg(target_os = "linux")]
        const EXCHANGE = libc::RENAME_EXCHANGE;
        /// Don't overwrite the destination file if it exists. (Linux only)
        #[cfg(target_os = "linux")]
        const NOREPLACE = libc::RENAME_NOREPLACE;
        const _ = !0;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone)]
    pub struct FUSESetXAttrFlags: i32 {
        const ACL_KILL_SGID = 1 << 0;
        const _ = !0;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone)]
    // c_short in BSD, c_int in linux
    /// Flags representing different types of file locks.
    pub struct LockType: i32 {
        /// No lock held.
        const UNLOCKED = libc::F_UNLCK as i32;
        /// Shared or read lock.
        const READ_LOCK = libc::F_RDLCK as i32;
        /// Exclusive or write lock.
        const WRITE_LOCK = libc::F_WRLCK as i32;
        const _ = !0;
    }
}
