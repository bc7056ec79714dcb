//! Executable memory for finished code.
//!
//! Pages are mapped read-write, filled, and then switched to read-execute
//! before any pointer escapes. They are unmapped when the [`Function`] is
//! dropped or released.
#![allow(unsafe_code)]

use core::marker::PhantomData;
use core::mem::{self, ManuallyDrop};
use core::ptr::NonNull;

use crate::error::AsmError;

/// Finished machine code mapped read-execute.
///
/// Obtained from [`crate::Assembler::finalize`]. The mapping lives as long
/// as this value; [`Entry`] handles borrow it so a function pointer cannot
/// outlive its code.
pub struct Function {
    ptr: NonNull<u8>,
    /// Bytes of code.
    len: usize,
    /// Bytes mapped (page rounded).
    mapped: usize,
}

// The mapping is never written after construction.
unsafe impl Send for Function {}
unsafe impl Sync for Function {}

impl core::fmt::Debug for Function {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Function")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .field("mapped", &self.mapped)
            .finish()
    }
}

impl Function {
    /// Copy `code` into fresh pages and make them executable.
    pub(crate) fn new(code: &[u8]) -> Result<Self, AsmError> {
        let page = sys::page_size();
        let mapped = code
            .len()
            .checked_add(page - 1)
            .map(|n| n & !(page - 1))
            .ok_or_else(|| AsmError::ExecutableMemory {
                detail: format!("{} bytes cannot be mapped", code.len()),
            })?;

        let ptr = sys::map_rw(mapped)?;
        // SAFETY: `ptr` is a fresh read-write mapping of `mapped >= code.len()`
        // bytes that nothing else references.
        unsafe { core::ptr::copy_nonoverlapping(code.as_ptr(), ptr.as_ptr(), code.len()) };
        if let Err(err) = sys::protect_rx(ptr, mapped) {
            let _ = sys::unmap(ptr, mapped);
            return Err(err);
        }

        tracing::debug!(bytes = code.len(), mapped, "mapped executable code");
        Ok(Self {
            ptr,
            len: code.len(),
            mapped,
        })
    }

    /// Number of code bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always `false`: empty code cannot be finalized.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Address of the first instruction.
    #[must_use]
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// The mapped code, read back from the executable pages.
    #[must_use]
    pub fn code(&self) -> &[u8] {
        // SAFETY: the pages are readable and hold `len` initialized bytes for
        // the lifetime of `self`.
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// View the code as a callable entry point of type `F`.
    ///
    /// `F` is an `extern "C" fn(..) -> ..` or `unsafe extern "C" fn(..) ->
    /// ..` with up to four arguments. The returned [`Entry`] borrows `self`
    /// and only exposes the code through [`Entry::call`], so it cannot be
    /// used once the function is released or dropped:
    ///
    /// ```compile_fail
    /// use rtasm::{Assembler, X86Mode};
    ///
    /// let mut asm = Assembler::new(X86Mode::Mode32);
    /// asm.ret()?;
    /// let f = asm.finalize()?;
    /// let entry = unsafe { f.entry::<extern "C" fn()>() }?;
    /// f.release()?;
    /// entry.call();
    /// # Ok::<(), rtasm::AsmError>(())
    /// ```
    ///
    /// # Errors
    ///
    /// [`AsmError::ContractViolation`] if `F` is not pointer-sized.
    ///
    /// # Safety
    ///
    /// The emitted code must follow the calling convention and signature of
    /// `F`, and must leave the stack and callee-saved registers as the
    /// convention requires.
    pub unsafe fn entry<F: Copy>(&self) -> Result<Entry<'_, F>, AsmError> {
        if mem::size_of::<F>() != mem::size_of::<*const u8>() {
            return Err(AsmError::contract(format!(
                "entry type is {} bytes, a code pointer is {}",
                mem::size_of::<F>(),
                mem::size_of::<*const u8>()
            )));
        }
        let raw = self.ptr.as_ptr() as *const u8;
        // SAFETY: sizes match; the caller vouches for the signature.
        let f = unsafe { mem::transmute_copy::<*const u8, F>(&raw) };
        Ok(Entry {
            f,
            _code: PhantomData,
        })
    }

    /// Unmap the code now and report failure instead of ignoring it.
    pub fn release(self) -> Result<(), AsmError> {
        let this = ManuallyDrop::new(self);
        tracing::debug!(bytes = this.len, "releasing executable code");
        sys::unmap(this.ptr, this.mapped)
    }
}

impl Drop for Function {
    fn drop(&mut self) {
        if let Err(err) = sys::unmap(self.ptr, self.mapped) {
            tracing::warn!(error = %err, "failed to unmap executable code");
        }
    }
}

/// A typed entry point borrowed from a [`Function`].
///
/// The function pointer never leaves the handle; calls go through
/// [`Entry::call`], which needs the borrow of the code to be alive.
#[derive(Clone, Copy)]
pub struct Entry<'a, F> {
    f: F,
    _code: PhantomData<&'a Function>,
}

macro_rules! entry_call {
    ($($arg:ident: $ty:ident),*) => {
        impl<R, $($ty),*> Entry<'_, extern "C" fn($($ty),*) -> R> {
            /// Call the emitted code.
            pub fn call(&self, $($arg: $ty),*) -> R {
                (self.f)($($arg),*)
            }
        }

        impl<R, $($ty),*> Entry<'_, unsafe extern "C" fn($($ty),*) -> R> {
            /// Call the emitted code.
            ///
            /// # Safety
            ///
            /// Whatever contract the emitted code places on its arguments.
            pub unsafe fn call(&self, $($arg: $ty),*) -> R {
                // SAFETY: forwarded to the caller.
                unsafe { (self.f)($($arg),*) }
            }
        }
    };
}

entry_call!();
entry_call!(a: A);
entry_call!(a: A, b: B);
entry_call!(a: A, b: B, c: C);
entry_call!(a: A, b: B, c: C, d: D);

impl<F> core::fmt::Debug for Entry<'_, F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Entry").finish_non_exhaustive()
    }
}

#[cfg(unix)]
mod sys {
    use core::ptr::NonNull;

    use crate::error::AsmError;

    fn os_error(call: &str) -> AsmError {
        AsmError::ExecutableMemory {
            detail: format!("{} failed: {}", call, std::io::Error::last_os_error()),
        }
    }

    pub fn page_size() -> usize {
        // SAFETY: sysconf has no preconditions.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            size as usize
        } else {
            4096
        }
    }

    pub fn map_rw(len: usize) -> Result<NonNull<u8>, AsmError> {
        // SAFETY: anonymous private mapping with a null hint.
        let ptr = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANON,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(os_error("mmap"));
        }
        NonNull::new(ptr.cast::<u8>()).ok_or_else(|| os_error("mmap"))
    }

    pub fn protect_rx(ptr: NonNull<u8>, len: usize) -> Result<(), AsmError> {
        // SAFETY: `ptr..ptr+len` is a mapping returned by `map_rw`.
        let rc = unsafe {
            libc::mprotect(
                ptr.as_ptr().cast(),
                len,
                libc::PROT_READ | libc::PROT_EXEC,
            )
        };
        if rc != 0 {
            return Err(os_error("mprotect"));
        }
        Ok(())
    }

    pub fn unmap(ptr: NonNull<u8>, len: usize) -> Result<(), AsmError> {
        // SAFETY: `ptr..ptr+len` is a mapping returned by `map_rw` and no
        // references into it survive.
        let rc = unsafe { libc::munmap(ptr.as_ptr().cast(), len) };
        if rc != 0 {
            return Err(os_error("munmap"));
        }
        Ok(())
    }
}

#[cfg(windows)]
mod sys {
    use core::ptr::NonNull;

    use windows_sys::Win32::System::Memory::{
        VirtualAlloc, VirtualFree, VirtualProtect, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE,
        PAGE_EXECUTE_READ, PAGE_PROTECTION_FLAGS, PAGE_READWRITE,
    };

    use crate::error::AsmError;

    fn os_error(call: &str) -> AsmError {
        AsmError::ExecutableMemory {
            detail: format!("{} failed: {}", call, std::io::Error::last_os_error()),
        }
    }

    pub fn page_size() -> usize {
        4096
    }

    pub fn map_rw(len: usize) -> Result<NonNull<u8>, AsmError> {
        // SAFETY: fresh reservation with a null hint.
        let ptr = unsafe {
            VirtualAlloc(
                core::ptr::null(),
                len,
                MEM_COMMIT | MEM_RESERVE,
                PAGE_READWRITE,
            )
        };
        NonNull::new(ptr.cast::<u8>()).ok_or_else(|| os_error("VirtualAlloc"))
    }

    pub fn protect_rx(ptr: NonNull<u8>, len: usize) -> Result<(), AsmError> {
        let mut old: PAGE_PROTECTION_FLAGS = 0;
        // SAFETY: `ptr..ptr+len` was committed by `map_rw`.
        let ok = unsafe { VirtualProtect(ptr.as_ptr().cast_const().cast(), len, PAGE_EXECUTE_READ, &mut old) };
        if ok == 0 {
            return Err(os_error("VirtualProtect"));
        }
        Ok(())
    }

    pub fn unmap(ptr: NonNull<u8>, _len: usize) -> Result<(), AsmError> {
        // SAFETY: `ptr` is the base of a reservation made by `map_rw`.
        let ok = unsafe { VirtualFree(ptr.as_ptr().cast(), 0, MEM_RELEASE) };
        if ok == 0 {
            return Err(os_error("VirtualFree"));
        }
        Ok(())
    }
}

#[cfg(not(any(unix, windows)))]
mod sys {
    use core::ptr::NonNull;

    use crate::error::AsmError;

    fn unsupported() -> AsmError {
        AsmError::ExecutableMemory {
            detail: "no executable memory support on this platform".into(),
        }
    }

    pub fn page_size() -> usize {
        4096
    }

    pub fn map_rw(_len: usize) -> Result<NonNull<u8>, AsmError> {
        Err(unsupported())
    }

    pub fn protect_rx(_ptr: NonNull<u8>, _len: usize) -> Result<(), AsmError> {
        Err(unsupported())
    }

    pub fn unmap(_ptr: NonNull<u8>, _len: usize) -> Result<(), AsmError> {
        Err(unsupported())
    }
}
