//! Bounds-checked reads of host-process memory.
//!
//! Everything here copies out of the host into a buffer owned by the bridge
//! before the data goes anywhere near Lua. The one genuinely unsafe operation,
//! touching an arbitrary address, sits behind [`HostMemory`], whose only real
//! implementation ([`ProcessMemory`]) asks the kernel to do the copy so that an
//! unmapped address comes back as an error instead of a signal.

use crate::error::BridgeError;

/// Largest number of bytes (or UTF-16 units for wide strings) a single read copies.
pub const MAX_READ_LEN: usize = 8191;

/// Default byte length for `read_cstr` and `read_mem_str`.
pub const DEFAULT_CSTR_LEN: i64 = 2048;

/// Default UTF-16 unit count for `read_wstr`.
pub const DEFAULT_WSTR_LEN: i64 = 1024;

/// Source of host memory.
pub trait HostMemory: Send + Sync {
    /// Copy `dest.len()` bytes starting at `address` into `dest`.
    ///
    /// Must report an unreadable source as [`BridgeError::Fault`] and never
    /// fault the calling process.
    fn copy_into(&self, address: usize, dest: &mut [u8]) -> Result<(), BridgeError>;
}

impl<M: HostMemory + ?Sized> HostMemory for std::sync::Arc<M> {
    fn copy_into(&self, address: usize, dest: &mut [u8]) -> Result<(), BridgeError> {
        (**self).copy_into(address, dest)
    }
}

/// Guarded copy of `count` bytes from `address` into the front of `dest`.
///
/// Checks run in a fixed order: null source with a non-zero count, then the
/// destination capacity, and only then the copy itself.
pub fn guarded_copy<M: HostMemory + ?Sized>(
    memory: &M,
    dest: &mut [u8],
    address: usize,
    count: usize,
) -> Result<(), BridgeError> {
    if count > 0 && address == 0 {
        return Err(BridgeError::fault(address, count));
    }
    if dest.len() < count {
        return Err(BridgeError::bounds(
            count as i64,
            "exceeds destination buffer",
        ));
    }
    if count == 0 {
        return Ok(());
    }
    memory.copy_into(address, &mut dest[..count])
}

/// Clamp a script-supplied length to [`MAX_READ_LEN`]; negative lengths are rejected.
fn clamp_len(requested: i64) -> Result<usize, BridgeError> {
    if requested < 0 {
        return Err(BridgeError::bounds(requested, "must not be negative"));
    }
    Ok((requested as u64).min(MAX_READ_LEN as u64) as usize)
}

/// Fixed-width values that can be reinterpreted from native-endian bytes.
pub trait Primitive: Copy {
    const WIDTH: usize;
    fn from_ne_slice(bytes: &[u8]) -> Self;
}

macro_rules! impl_primitive {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Primitive for $ty {
                const WIDTH: usize = std::mem::size_of::<$ty>();

                fn from_ne_slice(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&bytes[..Self::WIDTH]);
                    <$ty>::from_ne_bytes(raw)
                }
            }
        )*
    };
}

impl_primitive!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

/// Typed and string reads on top of a [`HostMemory`].
#[derive(Debug, Clone, Default)]
pub struct MemoryReader<M> {
    memory: M,
}

impl<M: HostMemory> MemoryReader<M> {
    pub fn new(memory: M) -> Self {
        Self { memory }
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    /// Read one fixed-width value at `address`.
    pub fn read<T: Primitive>(&self, address: usize) -> Result<T, BridgeError> {
        let mut buf = [0u8; 8];
        guarded_copy(&self.memory, &mut buf, address, T::WIDTH)?;
        Ok(T::from_ne_slice(&buf))
    }

    /// Copy `length` bytes and cut at the first NUL.
    pub fn read_cstr(&self, address: usize, length: i64) -> Result<Vec<u8>, BridgeError> {
        let mut bytes = self.copy_clamped(address, length)?;
        if let Some(nul) = bytes.iter().position(|&b| b == 0) {
            bytes.truncate(nul);
        }
        Ok(bytes)
    }

    /// Read `length` UTF-16 units and convert them to UTF-8.
    ///
    /// The text ends at the first NUL unit; anything after it is ignored.
    pub fn read_wstr(&self, address: usize, length: i64) -> Result<String, BridgeError> {
        let units = clamp_len(length)?;
        let mut raw = vec![0u8; units * 2];
        guarded_copy(&self.memory, &mut raw, address, units * 2)?;

        let mut wide: Vec<u16> = raw
            .chunks_exact(2)
            .map(|pair| u16::from_ne_bytes([pair[0], pair[1]]))
            .collect();
        if let Some(nul) = wide.iter().position(|&u| u == 0) {
            wide.truncate(nul);
        }
        String::from_utf16(&wide).map_err(|err| BridgeError::Encoding(err.to_string()))
    }

    /// Copy exactly `length` bytes for the byte-sequence read.
    ///
    /// Unlike the string variants a zero length is an error here.
    pub fn read_mem(&self, address: usize, length: i64) -> Result<Vec<u8>, BridgeError> {
        if length <= 0 {
            return Err(BridgeError::bounds(length, "must be greater than 0"));
        }
        self.copy_clamped(address, length)
    }

    /// Copy exactly `length` bytes without NUL truncation.
    pub fn read_mem_str(&self, address: usize, length: i64) -> Result<Vec<u8>, BridgeError> {
        self.copy_clamped(address, length)
    }

    fn copy_clamped(&self, address: usize, length: i64) -> Result<Vec<u8>, BridgeError> {
        let len = clamp_len(length)?;
        let mut buf = [0u8; MAX_READ_LEN + 1];
        guarded_copy(&self.memory, &mut buf, address, len)?;
        Ok(buf[..len].to_vec())
    }
}

/// Reads from the current process through the kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessMemory;

#[cfg(any(target_os = "linux", target_os = "android"))]
impl HostMemory for ProcessMemory {
    fn copy_into(&self, address: usize, dest: &mut [u8]) -> Result<(), BridgeError> {
        use nix::errno::Errno;

        match linux::vm_read(address, dest) {
            Ok(()) => Ok(()),
            // Seccomp profiles commonly filter process_vm_readv.
            Err(Some(Errno::ENOSYS | Errno::EPERM)) => linux::proc_mem_read(address, dest),
            Err(_) => Err(BridgeError::fault(address, dest.len())),
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
mod linux {
    use crate::error::BridgeError;
    use nix::errno::Errno;
    use nix::sys::uio::{RemoteIoVec, process_vm_readv};
    use nix::unistd::Pid;
    use std::fs::File;
    use std::io::IoSliceMut;
    use std::os::unix::fs::FileExt;
    use std::sync::OnceLock;

    /// `Err(None)` means a short read.
    pub(super) fn vm_read(address: usize, dest: &mut [u8]) -> Result<(), Option<Errno>> {
        let len = dest.len();
        let remote = [RemoteIoVec { base: address, len }];
        let mut local = [IoSliceMut::new(dest)];
        match process_vm_readv(Pid::this(), &mut local, &remote) {
            Ok(n) if n == len => Ok(()),
            Ok(_) => Err(None),
            Err(errno) => Err(Some(errno)),
        }
    }

    pub(super) fn proc_mem_read(address: usize, dest: &mut [u8]) -> Result<(), BridgeError> {
        static PROC_MEM: OnceLock<Option<File>> = OnceLock::new();

        let fault = || BridgeError::fault(address, dest.len());
        let file = PROC_MEM
            .get_or_init(|| File::open("/proc/self/mem").ok())
            .as_ref()
            .ok_or_else(fault)?;
        file.read_exact_at(dest, address as u64)
            .map_err(|_| BridgeError::fault(address, dest.len()))
    }
}

#[cfg(windows)]
impl HostMemory for ProcessMemory {
    #[allow(unsafe_code)]
    fn copy_into(&self, address: usize, dest: &mut [u8]) -> Result<(), BridgeError> {
        use winapi::um::memoryapi::ReadProcessMemory;
        use winapi::um::processthreadsapi::GetCurrentProcess;

        let mut read = 0usize;
        // SAFETY: ReadProcessMemory validates the source range itself and
        // writes at most dest.len() bytes into a buffer we exclusively borrow.
        let ok = unsafe {
            ReadProcessMemory(
                GetCurrentProcess(),
                address as *const _,
                dest.as_mut_ptr().cast(),
                dest.len(),
                &mut read,
            )
        };
        if ok == 0 || read != dest.len() {
            return Err(BridgeError::fault(address, dest.len()));
        }
        Ok(())
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android", windows)))]
impl HostMemory for ProcessMemory {
    fn copy_into(&self, address: usize, dest: &mut [u8]) -> Result<(), BridgeError> {
        Err(BridgeError::fault(address, dest.len()))
    }
}
