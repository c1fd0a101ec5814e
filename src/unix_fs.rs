//! Host filesystem primitives.
//!
//! Thin wrappers over the POSIX syscalls the KV leaf's `host` module drives
//! directly: directory and symlink management, extended attributes, and the
//! handful of regular-file operations the leaf falls back to host storage
//! for (as opposed to routing through the embedded key/value store). Each
//! function maps a `-1` return straight to a [`PosixError`] via `errno`.

use std::path::Path;
use std::time::{Duration, SystemTime};

use std::ffi::{CStr, CString, OsStr, OsString};
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::*;

use crate::types::*;
use libc::{c_char, c_void, timespec};

/// Converts a `std::fs::FileType` to the corresponding `FileKind`.
pub fn convert_filetype(f: fs::FileType) -> FileKind {
    match f {
        f if f.is_file() => FileKind::RegularFile,
        f if f.is_dir() => FileKind::Directory,
        f if f.is_symlink() => FileKind::Symlink,
        f if f.is_block_device() => FileKind::BlockDevice,
        f if f.is_char_device() => FileKind::CharDevice,
        f if f.is_fifo() => FileKind::NamedPipe,
        f if f.is_socket() => FileKind::Socket,
        _ => panic!("Unknown FileKind"), // not possible in theory
    }
}

/// Converts `std::fs::Metadata` to a `FileAttribute`.
///
/// For symlinks, use `fs::symlink_metadata` instead of regular `fs::metadata`.
pub fn convert_fileattribute(metadata: fs::Metadata) -> FileAttribute {
    FileAttribute {
        inode: Inode::from(metadata.ino()),
        size: metadata.size(),
        blocks: metadata.blocks(),
        atime: SystemTime::UNIX_EPOCH + Duration::new(metadata.atime() as u64, 0),
        mtime: SystemTime::UNIX_EPOCH + Duration::new(metadata.mtime() as u64, 0),
        ctime: SystemTime::UNIX_EPOCH + Duration::new(metadata.ctime() as u64, 0),
        crtime: SystemTime::UNIX_EPOCH + Duration::new(metadata.mtime() as u64, 0),
        kind: convert_filetype(metadata.file_type()),
        perm: (metadata.mode() & 0o777) as u16,
        nlink: metadata.nlink() as u32,
        uid: metadata.uid(),
        gid: metadata.gid(),
        rdev: metadata.rdev() as u32,
        blksize: metadata.blksize() as u32,
        flags: 0,
        ttl: None,
        generation: None,
    }
}

fn convert_stat_struct(statbuf: libc::stat) -> Option<FileAttribute> {
    let atime = SystemTime::UNIX_EPOCH + Duration::new(statbuf.st_atime as u64, 0);
    let mtime = SystemTime::UNIX_EPOCH + Duration::new(statbuf.st_mtime as u64, 0);
    let ctime = SystemTime::UNIX_EPOCH + Duration::new(statbuf.st_ctime as u64, 0);
    let perm = (statbuf.st_mode & (libc::S_IRWXU | libc::S_IRWXG | libc::S_IRWXO)) as u16;

    Some(FileAttribute {
        inode: Inode::from(statbuf.st_ino),
        size: statbuf.st_size as u64,
        blocks: statbuf.st_blocks as u64,
        atime,
        mtime,
        ctime,
        crtime: mtime,
        kind: stat_to_kind(statbuf)?,
        perm,
        nlink: statbuf.st_nlink as u32,
        uid: statbuf.st_uid,
        gid: statbuf.st_gid,
        rdev: statbuf.st_rdev as u32,
        blksize: statbuf.st_blksize as u32,
        flags: 0,
        ttl: None,
        generation: None,
    })
}

fn stat_to_kind(statbuf: libc::stat) -> Option<FileKind> {
    use libc::*;
    Some(match statbuf.st_mode & S_IFMT {
        S_IFREG => FileKind::RegularFile,
        S_IFDIR => FileKind::Directory,
        S_IFCHR => FileKind::CharDevice,
        S_IFBLK => FileKind::BlockDevice,
        S_IFIFO => FileKind::NamedPipe,
        S_IFLNK => FileKind::Symlink,
        S_IFSOCK => FileKind::Socket,
        _ => return None,
    })
}

fn system_time_to_timespec(time: SystemTime) -> Result<timespec, PosixError> {
    let duration = time.duration_since(std::time::UNIX_EPOCH).map_err(|_| {
        PosixError::new(
            ErrorKind::InvalidArgument,
            "System time could not be converted to TimeSpec",
        )
    })?;
    Ok(timespec {
        tv_sec: duration.as_secs() as i64,
        tv_nsec: duration.subsec_nanos() as i64,
    })
}

fn cstring_from_path(path: &Path) -> Result<CString, PosixError> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| {
        PosixError::new(
            ErrorKind::InvalidArgument,
            format!("{}: Cstring conversion failed", path.display()),
        )
    })
}

/// Equivalent to the FUSE `lookup` operation (via `lstat`: does not follow symlinks).
pub fn lookup(path: &Path) -> Result<FileAttribute, PosixError> {
    let c_path = cstring_from_path(path)?;
    let mut statbuf: libc::stat = unsafe { std::mem::zeroed() };
    let result = unsafe { libc::lstat(c_path.as_ptr(), &mut statbuf) };
    if result == -1 {
        return Err(PosixError::last_error(format!(
            "{}: lstat failed in lookup",
            path.display()
        )));
    }
    convert_stat_struct(statbuf).ok_or_else(|| {
        PosixError::new(
            ErrorKind::InvalidArgument,
            format!("{}: unsupported file type in lookup", path.display()),
        )
    })
}

/// Equivalent to the FUSE `getattr`/`fstat` operation.
pub fn getattr(fd: &FileDescriptor) -> Result<FileAttribute, PosixError> {
    let mut statbuf: libc::stat = unsafe { std::mem::zeroed() };
    let result = unsafe { libc::fstat((*fd).into(), &mut statbuf) };
    if result == -1 {
        return Err(PosixError::last_error(format!("{:?}: fstat failed", fd)));
    }
    convert_stat_struct(statbuf).ok_or_else(|| {
        PosixError::new(
            ErrorKind::InvalidArgument,
            format!("{:?}: unsupported file type in getattr", fd),
        )
    })
}

/// Equivalent to the FUSE `setattr` operation (chmod/chown/truncate/utimens).
pub fn setattr(path: &Path, attrs: SetAttrRequest) -> Result<FileAttribute, PosixError> {
    let c_path = cstring_from_path(path)?;

    if let Some(mode) = attrs.mode {
        let result = unsafe { libc::chmod(c_path.as_ptr(), mode) };
        if result == -1 {
            return Err(PosixError::last_error(format!(
                "{}: chmod failed in setattr",
                path.display()
            )));
        }
    }

    if attrs.uid.is_some() || attrs.gid.is_some() {
        let uid = attrs.uid.unwrap_or(0_u32.wrapping_sub(1));
        let gid = attrs.gid.unwrap_or(0_u32.wrapping_sub(1));
        let result = unsafe { libc::chown(c_path.as_ptr(), uid, gid) };
        if result == -1 {
            return Err(PosixError::last_error(format!(
                "{}: chown failed in setattr",
                path.display()
            )));
        }
    }

    if let Some(size) = attrs.size {
        let fd = unsafe { libc::open(c_path.as_ptr(), libc::O_WRONLY) };
        if fd == -1 {
            return Err(PosixError::last_error(format!(
                "{}: open failed in setattr",
                path.display()
            )));
        }
        let res = unsafe {
            libc::ftruncate(
                fd,
                i64::try_from(size).map_err(|_| {
                    PosixError::new(
                        ErrorKind::InvalidArgument,
                        format!("{}: ftruncate size out of bound", path.display()),
                    )
                })?,
            )
        };
        unsafe { libc::close(fd) };
        if res == -1 {
            return Err(PosixError::last_error(format!(
                "{}: ftruncate failed in setattr",
                path.display()
            )));
        }
    }

    if let (Some(atime), Some(mtime)) = (attrs.atime, attrs.mtime) {
        let times = match (atime, mtime) {
            (TimeOrNow::Now, TimeOrNow::Now) => {
                let now_spec = system_time_to_timespec(SystemTime::now())?;
                [now_spec, now_spec]
            }
            (TimeOrNow::SpecificTime(at), TimeOrNow::SpecificTime(mt)) => {
                [system_time_to_timespec(at)?, system_time_to_timespec(mt)?]
            }
            _ => {
                return Err(PosixError::new(
                    ErrorKind::InvalidArgument,
                    "Could not convert timespec to TimeOrNow in setattr",
                ))
            }
        };
        let result = unsafe {
            libc::utimensat(
                libc::AT_FDCWD,
                c_path.as_ptr(),
                &times[0],
                libc::AT_SYMLINK_NOFOLLOW,
            )
        };
        if result == -1 {
            return Err(PosixError::last_error(format!(
                "{}: utimensat failed in setattr",
                path.display()
            )));
        }
    }

    lookup(path)
}

/// Equivalent to the FUSE `readlink` operation.
pub fn readlink(path: &Path) -> Result<Vec<u8>, PosixError> {
    let c_path = cstring_from_path(path)?;
    let mut buf = vec![0u8; 1024];
    let ret =
        unsafe { libc::readlink(c_path.as_ptr(), buf.as_mut_ptr() as *mut c_char, buf.len()) };
    if ret == -1 {
        return Err(PosixError::last_error(format!(
            "{}: readlink",
            path.display()
        )));
    }
    buf.truncate(ret as usize);
    Ok(buf)
}

/// Equivalent to the FUSE `mknod` operation.
pub fn mknod(
    path: &Path,
    mode: u32,
    umask: u32,
    rdev: DeviceType,
) -> Result<FileAttribute, PosixError> {
    let c_path = cstring_from_path(path)?;
    let final_mode = mode & !umask;
    let ret = unsafe { libc::mknod(c_path.as_ptr(), final_mode, rdev.to_rdev() as libc::dev_t) };
    if ret == -1 {
        return Err(PosixError::last_error(format!(
            "{}: mknod failed",
            path.display()
        )));
    }
    lookup(path)
}

/// Equivalent to the FUSE `mkdir` operation.
pub fn mkdir(path: &Path, mode: u32, umask: u32) -> Result<FileAttribute, PosixError> {
    let c_path = cstring_from_path(path)?;
    let final_mode = mode & !umask;
    let ret = unsafe { libc::mkdir(c_path.as_ptr(), final_mode) };
    if ret == -1 {
        return Err(PosixError::last_error(format!(
            "{}: mkdir failed",
            path.display()
        )));
    }
    lookup(path)
}

/// Equivalent to the FUSE `unlink` operation.
pub fn unlink(path: &Path) -> Result<(), PosixError> {
    let c_path = cstring_from_path(path)?;
    let result = unsafe { libc::unlink(c_path.as_ptr()) };
    if result == -1 {
        return Err(PosixError::last_error(format!(
            "{}: unlink failed",
            path.display()
        )));
    }
    Ok(())
}

/// Equivalent to the FUSE `rmdir` operation; callers refuse non-empty
/// directories before reaching here (data model non-goal).
pub fn rmdir(path: &Path) -> Result<(), PosixError> {
    let c_path = cstring_from_path(path)?;
    let result = unsafe { libc::rmdir(c_path.as_ptr()) };
    if result == -1 {
        return Err(PosixError::last_error(format!(
            "{}: rmdir failed",
            path.display()
        )));
    }
    Ok(())
}

/// Equivalent to the FUSE `symlink` operation.
pub fn symlink(path: &Path, target: &Path) -> Result<FileAttribute, PosixError> {
    let c_path = cstring_from_path(path)?;
    let c_target = cstring_from_path(target)?;

    let result = unsafe { libc::symlink(c_target.as_ptr(), c_path.as_ptr()) };
    if result == -1 {
        return Err(PosixError::last_error(format!(
            "{}: symlink failed (target: {})",
            path.display(),
            target.display()
        )));
    }
    lookup(path)
}

/// Equivalent to the FUSE `rename` operation, using `renameat2` for its flags.
pub fn rename(oldpath: &Path, newpath: &Path, flags: RenameFlags) -> Result<(), PosixError> {
    let old_cstr = cstring_from_path(oldpath)?;
    let new_cstr = cstring_from_path(newpath)?;
    let result = unsafe {
        libc::renameat2(
            libc::AT_FDCWD,
            old_cstr.as_ptr(),
            libc::AT_FDCWD,
            new_cstr.as_ptr(),
            flags.bits() as libc::c_uint,
        )
    };
    if result == 0 {
        return Ok(());
    }
    Err(PosixError::last_error(format!(
        "{}: rename failed into {}",
        oldpath.display(),
        newpath.display()
    )))
}

/// Equivalent to the FUSE `open` operation.
pub fn open(path: &Path, flags: OpenFlags) -> Result<FileDescriptorGuard, PosixError> {
    let c_path = cstring_from_path(path)?;
    let fd = unsafe { libc::open(c_path.as_ptr(), flags.bits()) };
    if fd == -1 {
        return Err(PosixError::last_error(format!(
            "{}: open failed",
            path.display()
        )));
    }
    Ok(FileDescriptorGuard::new(fd.into()))
}

/// Equivalent to the FUSE `create` operation: opens exclusively, failing if
/// the file already exists.
pub fn create(
    path: &Path,
    mode: u32,
    umask: u32,
    flags: OpenFlags,
) -> Result<(FileDescriptorGuard, FileAttribute), PosixError> {
    let c_path = cstring_from_path(path)?;
    let final_mode = mode & !umask;
    let fd = unsafe {
        libc::open(
            c_path.as_ptr(),
            flags.bits() | libc::O_CREAT | libc::O_WRONLY | libc::O_EXCL,
            final_mode,
        )
    };
    if fd == -1 {
        return Err(PosixError::last_error(format!(
            "{}: create failed",
            path.display()
        )));
    }
    Ok((FileDescriptorGuard::new(fd.into()), lookup(path)?))
}

/// Equivalent to the FUSE `read` operation; reads at an absolute offset via `pread`.
pub fn read(fd: &FileDescriptor, offset: i64, size: u32) -> Result<Vec<u8>, PosixError> {
    let mut buffer = vec![0; size as usize];
    let bytes_read = unsafe {
        libc::pread(
            (*fd).into(),
            buffer.as_mut_ptr() as *mut c_void,
            size as usize,
            offset as libc::off_t,
        )
    };
    if bytes_read == -1 {
        return Err(PosixError::last_error(format!("{:?}: read failed", fd)));
    }
    buffer.truncate(bytes_read as usize);
    Ok(buffer)
}

/// Equivalent to the FUSE `write` operation; writes at an absolute offset via `pwrite`.
pub fn write(fd: &FileDescriptor, offset: i64, data: &[u8]) -> Result<u32, PosixError> {
    let bytes_written = unsafe {
        libc::pwrite(
            (*fd).into(),
            data.as_ptr() as *const c_void,
            data.len(),
            offset as libc::off_t,
        )
    };
    if bytes_written == -1 {
        return Err(PosixError::last_error(format!("{:?}: write failed", fd)));
    }
    Ok(bytes_written as u32)
}

/// Equivalent to the FUSE `flush` operation.
pub fn flush(fd: &FileDescriptor) -> Result<(), PosixError> {
    let result = unsafe { libc::fdatasync((*fd).into()) };
    if result == -1 {
        return Err(PosixError::last_error(format!("{:?}: flush failed", fd)));
    }
    Ok(())
}

/// Equivalent to the FUSE `fsync` operation.
pub fn fsync(fd: &FileDescriptor, datasync: bool) -> Result<(), PosixError> {
    let raw: i32 = (*fd).into();
    let result = unsafe {
        if datasync {
            libc::fdatasync(raw)
        } else {
            libc::fsync(raw)
        }
    };
    if result == -1 {
        return Err(PosixError::last_error(format!("{:?}: fsync failed", fd)));
    }
    Ok(())
}

/// Equivalent to the FUSE `readdir` operation.
pub fn readdir(path: &Path) -> Result<Vec<(OsString, FileKind)>, PosixError> {
    let c_path = cstring_from_path(path)?;
    let dir = unsafe { libc::opendir(c_path.as_ptr()) };
    if dir.is_null() {
        return Err(PosixError::last_error(format!(
            "{}: opendir failed",
            path.display()
        )));
    }

    let mut result = Vec::new();
    loop {
        unsafe { *libc::__errno_location() = 0 };
        let entry = unsafe { libc::readdir(dir) };
        if entry.is_null() {
            if unsafe { *libc::__errno_location() } != 0 {
                unsafe { libc::closedir(dir) };
                return Err(PosixError::last_error(format!(
                    "{}: readdir failed",
                    path.display()
                )));
            }
            break;
        }

        let entry = unsafe { &*entry };
        let name = unsafe { CStr::from_ptr(entry.d_name.as_ptr()) };
        let name = OsStr::from_bytes(name.to_bytes()).to_owned();

        if name == OsStr::new(".") || name == OsStr::new("..") {
            continue;
        }

        let full_path = path.join(&name);
        let c_full_path = cstring_from_path(&full_path)?;
        let mut statbuf: libc::stat = unsafe { std::mem::zeroed() };
        let stat_result = unsafe { libc::lstat(c_full_path.as_ptr(), &mut statbuf) };
        if stat_result == -1 {
            unsafe { libc::closedir(dir) };
            return Err(PosixError::last_error(format!(
                "{}: lstat failed",
                full_path.display()
            )));
        }

        if let Some(attr) = convert_stat_struct(statbuf) {
            result.push((name, attr.kind));
        }
    }

    unsafe { libc::closedir(dir) };
    Ok(result)
}

/// Equivalent to the FUSE `release`/`close` operation.
pub fn release(fd: FileDescriptor) -> Result<(), PosixError> {
    let result = unsafe { libc::close(fd.into()) };
    if result == -1 {
        return Err(PosixError::last_error(format!("{:?}: release failed", fd)));
    }
    Ok(())
}

/// Equivalent to the FUSE `statfs` operation.
pub fn statfs(path: &Path) -> Result<StatFs, PosixError> {
    let c_path = cstring_from_path(path)?;
    let mut stat: libc::statvfs64 = unsafe { std::mem::zeroed() };
    let result = unsafe { libc::statvfs64(c_path.as_ptr(), &mut stat) };
    if result != 0 {
        return Err(PosixError::last_error(format!(
            "{}: statfs failed",
            path.display()
        )));
    }
    Ok(StatFs {
        total_blocks: stat.f_blocks,
        free_blocks: stat.f_bfree,
        available_blocks: stat.f_bavail,
        total_files: stat.f_files,
        free_files: stat.f_ffree,
        block_size: stat.f_bsize as u32,
        max_filename_length: stat.f_namemax as u32,
        fragment_size: stat.f_frsize as u32,
    })
}

/// Equivalent to the FUSE `setxattr` operation.
pub fn setxattr(
    path: &Path,
    name: &OsStr,
    value: &[u8],
    flags: FUSESetXAttrFlags,
) -> Result<(), PosixError> {
    let c_path = cstring_from_path(path)?;
    let c_name = CString::new(name.as_bytes()).map_err(|_| {
        PosixError::new(
            ErrorKind::InvalidArgument,
            format!("{}: Cstring conversion failed in setxattr", name.to_string_lossy()),
        )
    })?;
    let ret = unsafe {
        libc::setxattr(
            c_path.as_ptr(),
            c_name.as_ptr(),
            value.as_ptr() as *const c_void,
            value.len(),
            flags.bits(),
        )
    };
    if ret == -1 {
        return Err(PosixError::last_error(format!(
            "{}: setxattr failed. Name: {}",
            path.display(),
            name.to_string_lossy()
        )));
    }
    Ok(())
}

/// Equivalent to the FUSE `getxattr` operation.
pub fn getxattr(path: &Path, name: &OsStr, size: u32) -> Result<Vec<u8>, PosixError> {
    let c_path = cstring_from_path(path)?;
    let c_name = CString::new(name.as_bytes()).map_err(|_| {
        PosixError::new(
            ErrorKind::InvalidArgument,
            format!("{}: Cstring conversion failed in getxattr", name.to_string_lossy()),
        )
    })?;

    let mut buf = vec![0u8; size as usize];
    let ret = unsafe {
        libc::getxattr(
            c_path.as_ptr(),
            c_name.as_ptr(),
            buf.as_mut_ptr() as *mut c_void,
            buf.len(),
        )
    };
    if ret == -1 {
        return Err(PosixError::last_error(format!(
            "{}: getxattr failed. Name: {}, Size: {}",
            path.display(),
            name.to_string_lossy(),
            size
        )));
    }
    buf.truncate(ret as usize);
    Ok(buf)
}

/// Equivalent to the FUSE `removexattr` operation.
pub fn removexattr(path: &Path, name: &OsStr) -> Result<(), PosixError> {
    let c_path = cstring_from_path(path)?;
    let c_name = CString::new(name.as_bytes()).map_err(|_| {
        PosixError::new(
            ErrorKind::InvalidArgument,
            format!("{}: CString conversion failed in removexattr", name.to_string_lossy()),
        )
    })?;
    let ret = unsafe { libc::removexattr(c_path.as_ptr(), c_name.as_ptr()) };
    if ret == -1 {
        return Err(PosixError::last_error(format!(
            "{}: removexattr failed. Name: {}",
            path.display(),
            name.to_string_lossy()
        )));
    }
    Ok(())
}

/// Equivalent to the FUSE `access` operation.
pub fn access(path: &Path, mask: AccessMask) -> Result<(), PosixError> {
    let c_path = cstring_from_path(path)?;
    let ret = unsafe { libc::access(c_path.as_ptr(), mask.bits()) };
    if ret == -1 {
        return Err(PosixError::last_error(format!(
            "{}: access failed. Mask {:?}",
            path.display(),
            mask
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::{NamedTempFile, TempDir};

    use super::*;
    use std::fs::{self, File};
    use std::path::{Path, PathBuf};

    #[test]
    fn test_convert_filetype() {
        let tmpfile = NamedTempFile::new().unwrap();
        let filetype = convert_filetype(fs::metadata(tmpfile.path()).unwrap().file_type());
        assert_eq!(filetype, FileKind::RegularFile);
    }

    #[test]
    fn test_convert_fileattribute() {
        let tmpfile = NamedTempFile::new().unwrap();
        fs::write(tmpfile.path(), "blah").unwrap();
        let metadata = fs::metadata(tmpfile.path()).unwrap();
        let attr = convert_fileattribute(metadata);
        assert!(attr.size > 0);
    }

    #[test]
    fn test_system_time_to_timespec() {
        let system_time = SystemTime::now();
        let timespec = system_time_to_timespec(system_time).unwrap();
        assert!(timespec.tv_sec > 0);
        assert!(timespec.tv_nsec >= 0);
    }

    #[test]
    fn test_cstring_from_path() {
        let path = PathBuf::from("test_cstring");
        let c_string = cstring_from_path(&path).unwrap();
        assert_eq!(c_string.to_str().unwrap(), path.to_str().unwrap());
    }

    #[test]
    fn test_get_attr() {
        let tmpfile = NamedTempFile::new().unwrap();
        fs::write(tmpfile.path(), "blah").unwrap();
        let attr1 = lookup(tmpfile.path()).unwrap();
        let fd = open(tmpfile.path(), OpenFlags::READ_ONLY).unwrap();
        let attr2 = getattr(&fd).unwrap();
        assert!(attr1.size > 0);
        assert_eq!(attr1, attr2);
    }

    #[test]
    fn test_readlink_and_symlink() {
        let tmpdir = TempDir::new().unwrap();
        let target_path = tmpdir.path().join("link_target");
        File::create_new(&target_path).unwrap();
        let symlink_path = tmpdir.path().join("symlink");
        let attr = symlink(&symlink_path, &target_path).unwrap();
        assert_eq!(attr.kind, FileKind::Symlink);

        let link_target = readlink(&symlink_path).unwrap();
        assert_eq!(Path::new(OsStr::from_bytes(&link_target)), target_path);
    }

    #[test]
    fn test_mkdir_and_rmdir() {
        let tmpdir = TempDir::new().unwrap();
        let dir_path = tmpdir.path().join("dir");
        mkdir(&dir_path, 0o755, 0).unwrap();
        assert!(dir_path.exists());
        rmdir(&dir_path).unwrap();
        assert!(!dir_path.exists());
    }

    #[test]
    fn test_unlink() {
        let tmpdir = TempDir::new().unwrap();
        let file_path = tmpdir.path().join("file");
        File::create(&file_path).unwrap();
        unlink(&file_path).unwrap();
        assert!(!file_path.exists());
    }

    #[test]
    fn test_rename() {
        let tmpdir = TempDir::new().unwrap();
        let src_path = tmpdir.path().join("src");
        File::create(&src_path).unwrap();
        let dest_path = tmpdir.path().join("dest");
        rename(&src_path, &dest_path, RenameFlags::empty()).unwrap();
        assert!(!src_path.exists());
        assert!(dest_path.exists());
    }

    #[test]
    fn test_read_write() {
        let tmpfile = NamedTempFile::new().unwrap();
        let fd = open(tmpfile.path(), OpenFlags::READ_WRITE).unwrap();

        let bytes_written = write(&fd, 0, b"Hello, world!").unwrap();
        assert_eq!(bytes_written, 13);

        let content = read(&fd, 0, 100).unwrap();
        assert_eq!(&String::from_utf8(content).unwrap(), "Hello, world!");

        let bytes_written = write(&fd, 7, b"Rustaceans!").unwrap();
        assert_eq!(bytes_written, 11);

        let content = read(&fd, 0, 100).unwrap();
        assert_eq!(&String::from_utf8(content).unwrap(), "Hello, Rustaceans!");
    }

    #[test]
    fn test_readdir() {
        let tmpdir = TempDir::new().unwrap();
        let file1 = tmpdir.path().join("file1");
        File::create(&file1).unwrap();

        let entries = readdir(tmpdir.path()).unwrap();
        assert!(entries.iter().any(|(name, _)| name == Path::new("file1")));
    }

    #[test]
    fn test_statfs() {
        let stat = statfs(Path::new("/tmp")).unwrap();
        assert!(stat.total_blocks > 0);
        assert!(stat.block_size > 0);
    }

    #[test]
    fn test_setxattr_getxattr_removexattr() {
        let tmpfile = NamedTempFile::new().unwrap();
        setxattr(
            tmpfile.path(),
            OsStr::new("user.test"),
            b"value",
            FUSESetXAttrFlags::empty(),
        )
        .unwrap();
        let value = getxattr(tmpfile.path(), OsStr::new("user.test"), 16).unwrap();
        assert_eq!(value, b"value");
        removexattr(tmpfile.path(), OsStr::new("user.test")).unwrap();
        assert!(getxattr(tmpfile.path(), OsStr::new("user.test"), 16).is_err());
    }
}
