//! Decryption engine backed by a dynamically loaded AACS library.
//!
//! The library is bound at runtime through `libloading`; nothing is linked at
//! build time. Required entry points:
//!
//! - `aacs_open2(device, keyfile, &error_code)` (or `aacs_open(device, keyfile)`)
//! - `aacs_decrypt_unit(ctx, buf)`
//! - `aacs_close(ctx)`

use std::ffi::{c_char, c_int, c_void, CString};
use std::path::Path;
use std::ptr;

use libloading::Library;
use log::{debug, info, warn};

use crate::engine::{DecryptEngine, DecryptPlugin, ALIGNED_UNIT_SIZE};
use crate::error::{AacsErrorCode, DecryptError};

type AacsOpenFn = unsafe extern "C" fn(*const c_char, *const c_char) -> *mut c_void;
type AacsOpen2Fn = unsafe extern "C" fn(*const c_char, *const c_char, *mut c_int) -> *mut c_void;
type AacsDecryptUnitFn = unsafe extern "C" fn(*mut c_void, *mut u8) -> c_int;
type AacsCloseFn = unsafe extern "C" fn(*mut c_void);

/// Library names tried when no explicit list is configured.
pub const DEFAULT_LIBRARY_NAMES: &[&str] = &[
    "libaacs.so.0",
    "libaacs.so",
    "libaacs.0.dylib",
    "libaacs.dylib",
    "libaacs.dll",
];

/// Plugin that opens discs through a shared AACS library.
#[derive(Debug, Clone)]
pub struct LibraryPlugin {
    candidates: Vec<String>,
}

impl Default for LibraryPlugin {
    fn default() -> Self {
        Self::new(DEFAULT_LIBRARY_NAMES.iter().map(|s| s.to_string()).collect())
    }
}

impl LibraryPlugin {
    pub fn new(candidates: Vec<String>) -> Self {
        Self { candidates }
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    fn load_library(&self) -> Result<Library, DecryptError> {
        for name in &self.candidates {
            // SAFETY: loading a shared library runs its initializers; the
            // candidates name the AACS library chosen by the host.
            match unsafe { Library::new(name) } {
                Ok(lib) => {
                    info!("[Decrypt] Loaded {}", name);
                    return Ok(lib);
                }
                Err(e) => debug!("[Decrypt] Could not load {}: {}", name, e),
            }
        }
        Err(DecryptError::LibraryNotFound(self.candidates.join(", ")))
    }
}

fn path_to_cstring(path: &Path) -> Result<CString, DecryptError> {
    CString::new(path.to_string_lossy().as_bytes()).map_err(|_| DecryptError::OpenFailed {
        code: AacsErrorCode::CorruptDisc,
    })
}

impl DecryptPlugin for LibraryPlugin {
    fn name(&self) -> &str {
        "libaacs"
    }

    fn open(
        &self,
        device: &Path,
        keyfile: Option<&Path>,
    ) -> Result<Box<dyn DecryptEngine>, DecryptError> {
        let lib = self.load_library()?;

        // SAFETY: the function signatures match the AACS C API. Each Symbol is
        // dereferenced to copy the raw function pointer; `lib` is stored in the
        // engine so the pointers stay valid for its whole lifetime.
        let (open, open2, decrypt, close) = unsafe {
            let open2 = lib.get::<AacsOpen2Fn>(b"aacs_open2\0").ok().map(|s| *s);
            let open = lib.get::<AacsOpenFn>(b"aacs_open\0").ok().map(|s| *s);
            let decrypt = *lib
                .get::<AacsDecryptUnitFn>(b"aacs_decrypt_unit\0")
                .map_err(|_| DecryptError::MissingSymbol("aacs_decrypt_unit".into()))?;
            let close = *lib
                .get::<AacsCloseFn>(b"aacs_close\0")
                .map_err(|_| DecryptError::MissingSymbol("aacs_close".into()))?;
            (open, open2, decrypt, close)
        };

        let device = path_to_cstring(device)?;
        let keyfile = keyfile.map(path_to_cstring).transpose()?;
        let keyfile_ptr = keyfile.as_ref().map_or(ptr::null(), |k| k.as_ptr());

        let mut error_code: c_int = 0;
        // SAFETY: both strings outlive the call; a null context signals failure.
        let ctx = unsafe {
            match (open2, open) {
                (Some(open2), _) => open2(device.as_ptr(), keyfile_ptr, &mut error_code),
                (None, Some(open)) => open(device.as_ptr(), keyfile_ptr),
                (None, None) => return Err(DecryptError::MissingSymbol("aacs_open".into())),
            }
        };

        if ctx.is_null() {
            let code = AacsErrorCode::from(error_code);
            warn!("[Decrypt] aacs_open failed: {}", code);
            return Err(DecryptError::OpenFailed { code });
        }

        info!("[Decrypt] Opened AACS context for {:?}", device);
        Ok(Box::new(LibraryEngine {
            _lib: lib,
            ctx,
            decrypt,
            close,
        }))
    }
}

/// Opened AACS context.
struct LibraryEngine {
    _lib: Library,
    ctx: *mut c_void,
    decrypt: AacsDecryptUnitFn,
    close: AacsCloseFn,
}

// SAFETY: the context is only touched through `&mut self`, never shared.
unsafe impl Send for LibraryEngine {}

impl DecryptEngine for LibraryEngine {
    fn name(&self) -> &str {
        "libaacs"
    }

    fn decrypt_unit(&mut self, unit: &mut [u8]) -> bool {
        if unit.len() != ALIGNED_UNIT_SIZE || self.ctx.is_null() {
            return false;
        }
        // SAFETY: `unit` is a full aligned unit and `ctx` is a live context.
        unsafe { (self.decrypt)(self.ctx, unit.as_mut_ptr()) != 0 }
    }
}

impl Drop for LibraryEngine {
    fn drop(&mut self) {
        if !self.ctx.is_null() {
            // SAFETY: `ctx` came from aacs_open and is closed exactly once.
            unsafe { (self.close)(self.ctx) };
            self.ctx = ptr::null_mut();
            debug!("[Decrypt] Closed AACS context");
        }
    }
}
