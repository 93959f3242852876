//! POSIX 共享内存段封装
//!
//! 对 `shm_open` / `ftruncate` / `mmap` 的安全封装，供跨进程
//! 时间序列使用。段由 master 创建并在 drop 时 unlink；其它进程
//! 只 attach，不负责清理。

use std::ffi::CString;
use std::io;
use std::ptr;

use crate::error::DataError;

/// 命名共享内存段
///
/// drop 时自动 munmap；只有通过 [`ShmSegment::create`] 创建的段
/// 会在 drop 时 unlink（attach 的段不清理命名空间）。
pub struct ShmSegment {
    ptr: *mut u8,
    size: usize,
    name: String,
    owns_name: bool,
}

// SAFETY: the mapping is shared between processes by design; all
// concurrent access goes through atomics placed in the mapping by
// ShmTimeSeries, never through plain loads/stores.
unsafe impl Send for ShmSegment {}
unsafe impl Sync for ShmSegment {}

impl ShmSegment {
    /// 创建新段（已存在的同名段会先被移除）
    pub fn create(name: &str, size: usize) -> Result<Self, DataError> {
        let c_name = Self::validated_cstring(name)?;

        // SAFETY: c_name is a valid NUL-terminated string; shm_unlink
        // on a non-existing name just fails and is ignored; shm_open
        // with O_CREAT|O_EXCL|O_RDWR either returns a fresh fd or -1
        // (checked below).
        let fd = unsafe {
            libc::shm_unlink(c_name.as_ptr());
            libc::shm_open(c_name.as_ptr(), libc::O_CREAT | libc::O_RDWR | libc::O_EXCL, 0o600)
        };
        if fd < 0 {
            return Err(DataError::SegmentCreate(io::Error::last_os_error()));
        }

        // SAFETY: fd is the valid descriptor obtained above.
        let ret = unsafe { libc::ftruncate(fd, size as libc::off_t) };
        if ret < 0 {
            let err = io::Error::last_os_error();
            // SAFETY: fd is valid and not used again on this path.
            unsafe { libc::close(fd) };
            return Err(DataError::SegmentCreate(err));
        }

        let ptr = Self::map(fd, size)?;

        // SAFETY: ptr points to a freshly mapped writable region of
        // exactly `size` bytes with no other references yet.
        unsafe {
            ptr::write_bytes(ptr, 0, size);
        }

        Ok(Self {
            ptr,
            size,
            name: name.to_string(),
            owns_name: true,
        })
    }

    /// 附加到已存在的段
    pub fn attach(name: &str, size: usize) -> Result<Self, DataError> {
        let c_name = Self::validated_cstring(name)?;

        // SAFETY: c_name is a valid NUL-terminated string; shm_open
        // returns a valid fd or -1 (checked below).
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0) };
        if fd < 0 {
            return Err(DataError::SegmentOpen {
                name: name.to_string(),
                source: io::Error::last_os_error(),
            });
        }

        let ptr = Self::map(fd, size)?;

        Ok(Self {
            ptr,
            size,
            name: name.to_string(),
            owns_name: false,
        })
    }

    fn map(fd: libc::c_int, size: usize) -> Result<*mut u8, DataError> {
        // SAFETY: fd is a valid descriptor; MAP_SHARED + PROT_READ|
        // PROT_WRITE is the intended cross-process mapping; mmap
        // returns MAP_FAILED on error (checked below).
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        // SAFETY: the mapping (if any) keeps its own reference to the
        // segment; closing fd afterwards is always safe.
        unsafe { libc::close(fd) };

        if ptr == libc::MAP_FAILED {
            return Err(DataError::SegmentCreate(io::Error::last_os_error()));
        }
        Ok(ptr as *mut u8)
    }

    fn validated_cstring(name: &str) -> Result<CString, DataError> {
        if !name.starts_with('/') || name.len() < 2 || name[1..].contains('/') {
            return Err(DataError::InvalidName(format!(
                "segment name must be '/<name>' without further slashes: {name}"
            )));
        }
        if name.len() > 255 {
            return Err(DataError::InvalidName(format!("segment name too long: {name}")));
        }
        CString::new(name).map_err(|_| DataError::InvalidName(name.to_string()))
    }

    /// 映射区起始指针
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr
    }

    /// 映射区大小（字节）
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// 段名
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ShmSegment {
    fn drop(&mut self) {
        // SAFETY: self.ptr/self.size come from a successful mmap and
        // are unmapped exactly once here.
        unsafe {
            libc::munmap(self.ptr as *mut libc::c_void, self.size);
        }
        if self.owns_name
            && let Ok(c_name) = CString::new(self.name.as_str())
        {
            // SAFETY: unlink only touches the filesystem namespace;
            // attached processes keep their mappings alive.
            unsafe {
                libc::shm_unlink(c_name.as_ptr());
            }
        }
    }
}
