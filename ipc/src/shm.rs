//! Shared-memory window buffers.
//!
//! Buffers are named POSIX shared-memory objects; the server creates them
//! under keys of the form `sys.<ident>.<bufid>` and clients map the same
//! object by name. Unlinking the key makes future opens fail while existing
//! mappings stay valid, which is exactly the lifetime the resize handshake
//! needs: the render thread can keep compositing from a buffer whose key is
//! already gone.

use std::ffi::CString;
use std::io;
use std::ptr::NonNull;

use crate::error::IpcError;

/// A mapped shared-memory region.
pub struct SharedBuffer {
    key: String,
    ptr: NonNull<u8>,
    len: usize,
}

// The mapping is plain memory owned by this handle.
unsafe impl Send for SharedBuffer {}
unsafe impl Sync for SharedBuffer {}

impl SharedBuffer {
    /// Create (or replace) the object named `key` with `len` bytes, zeroed,
    /// and map it read-write.
    pub fn create(key: &str, len: usize) -> Result<Self, IpcError> {
        Self::map(key, len, libc::O_CREAT | libc::O_RDWR)
    }

    /// Map an existing object read-write. Fails if the key was never
    /// created or has been unlinked.
    pub fn open(key: &str, len: usize) -> Result<Self, IpcError> {
        Self::map(key, len, libc::O_RDWR)
    }

    fn map(key: &str, len: usize, oflag: libc::c_int) -> Result<Self, IpcError> {
        let name = shm_name(key)?;
        let len = len.max(1);

        let fd = unsafe { libc::shm_open(name.as_ptr(), oflag, 0o600 as libc::mode_t) };
        if fd < 0 {
            return Err(IpcError::Shm("open", io::Error::last_os_error()));
        }

        if oflag & libc::O_CREAT != 0 {
            let rc = unsafe { libc::ftruncate(fd, len as libc::off_t) };
            if rc != 0 {
                let err = io::Error::last_os_error();
                unsafe { libc::close(fd) };
                return Err(IpcError::Shm("truncate", err));
            }
        }

        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        unsafe { libc::close(fd) };
        if ptr == libc::MAP_FAILED {
            return Err(IpcError::Shm("map", io::Error::last_os_error()));
        }

        Ok(Self {
            key: key.to_owned(),
            ptr: NonNull::new(ptr as *mut u8).expect("mmap returned a non-null mapping"),
            len,
        })
    }

    /// Remove the name. Existing mappings survive; new opens fail.
    pub fn unlink(key: &str) -> Result<(), IpcError> {
        let name = shm_name(key)?;
        let rc = unsafe { libc::shm_unlink(name.as_ptr()) };
        if rc != 0 {
            return Err(IpcError::Shm("unlink", io::Error::last_os_error()));
        }
        Ok(())
    }

    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    #[inline]
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// The region as 32-bit pixels (the mapping is page-aligned, so the
    /// cast is always in-bounds and aligned).
    #[inline]
    pub fn pixels(&self) -> &[u32] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr() as *const u32, self.len / 4) }
    }

    #[inline]
    pub fn pixels_mut(&mut self) -> &mut [u32] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr() as *mut u32, self.len / 4) }
    }
}

impl Drop for SharedBuffer {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.len);
        }
    }
}

/// POSIX object name for a buffer key: a single leading slash, nothing else.
fn shm_name(key: &str) -> Result<CString, IpcError> {
    if key.is_empty() || key.contains('/') || key.contains('\0') {
        return Err(IpcError::Shm(
            "name",
            io::Error::new(io::ErrorKind::InvalidInput, "bad shm key"),
        ));
    }
    let mut name = String::with_capacity(key.len() + 1);
    name.push('/');
    name.push_str(key);
    Ok(CString::new(name).expect("nul bytes were rejected above"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key(tag: &str) -> String {
        format!("sys.mullion-shmtest-{}.{}", std::process::id(), tag)
    }

    #[test]
    fn create_write_open_read() {
        let key = test_key("rw");
        let mut a = SharedBuffer::create(&key, 4096).unwrap();
        a.pixels_mut()[0] = 0xFFAB_CDEF;
        a.bytes_mut()[4095] = 0x7F;

        let b = SharedBuffer::open(&key, 4096).unwrap();
        assert_eq!(b.pixels()[0], 0xFFAB_CDEF);
        assert_eq!(b.bytes()[4095], 0x7F);

        SharedBuffer::unlink(&key).unwrap();
    }

    #[test]
    fn create_zeroes_the_region() {
        let key = test_key("zero");
        let a = SharedBuffer::create(&key, 1024).unwrap();
        assert!(a.bytes().iter().all(|&b| b == 0));
        SharedBuffer::unlink(&key).unwrap();
    }

    #[test]
    fn unlinked_key_cannot_be_opened() {
        let key = test_key("gone");
        let a = SharedBuffer::create(&key, 64).unwrap();
        SharedBuffer::unlink(&key).unwrap();
        assert!(SharedBuffer::open(&key, 64).is_err());
        // The live mapping still reads.
        assert_eq!(a.bytes()[0], 0);
    }

    #[test]
    fn keys_with_slashes_are_rejected() {
        assert!(SharedBuffer::create("evil/key", 64).is_err());
    }
}
