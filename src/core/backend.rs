//! Purpose: Hand a library file (or bare name) to the platform loader.
//! Exports: `LibraryBackend`, `DylibBackend`, `SharedLibrary`.
//! Role: Narrow seam between resolution policy and the OS dynamic loader.
//! Invariants: A rejection is reported as `ErrorKind::LoadRejected`, never a panic.
//! Invariants: Loaded handles keep the library mapped for as long as any clone is alive.
use std::path::Path;
use std::sync::Arc;

use libloading::Library;

use crate::core::error::{Error, ErrorKind};

pub trait LibraryBackend: Send + Sync {
    type Handle: Clone + Send + Sync + 'static;

    /// Load a specific file by absolute path.
    fn load_path(&self, path: &Path) -> Result<Self::Handle, Error>;

    /// Load by logical name, deferring to the OS loader's own search rules.
    fn load_system(&self, base_name: &str) -> Result<Self::Handle, Error>;
}

pub type SharedLibrary = Arc<Library>;

#[derive(Clone, Copy, Debug, Default)]
pub struct DylibBackend;

impl LibraryBackend for DylibBackend {
    type Handle = SharedLibrary;

    fn load_path(&self, path: &Path) -> Result<Self::Handle, Error> {
        // SAFETY: running a library's initializers is the point of loading it; callers only
        // reach here for files resolved from trusted configuration or the packaged resources.
        let library = unsafe { Library::new(path) }.map_err(|err| {
            Error::new(ErrorKind::LoadRejected)
                .with_message("platform loader rejected library")
                .with_path(path)
                .with_source(err)
        })?;
        Ok(Arc::new(library))
    }

    fn load_system(&self, base_name: &str) -> Result<Self::Handle, Error> {
        let file_name = libloading::library_filename(base_name);
        // SAFETY: see `load_path`; the OS loader picks the file from its own search path.
        let library = unsafe { Library::new(&file_name) }.map_err(|err| {
            Error::new(ErrorKind::LoadRejected)
                .with_message(format!(
                    "platform loader could not find {}",
                    file_name.to_string_lossy()
                ))
                .with_source(err)
        })?;
        Ok(Arc::new(library))
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! Loader stand-in: accepts files that start with `FAKE_LIB_MAGIC`.
    use std::collections::HashSet;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::LibraryBackend;
    use crate::core::error::{Error, ErrorKind};

    pub(crate) const FAKE_LIB_MAGIC: &[u8] = b"\x7fFAKELIB";

    pub(crate) fn fake_library(tag: &str) -> Vec<u8> {
        let mut bytes = FAKE_LIB_MAGIC.to_vec();
        bytes.extend_from_slice(tag.as_bytes());
        bytes.extend(std::iter::repeat_n(0xAB, 4096));
        bytes
    }

    #[derive(Clone, Default)]
    pub(crate) struct FakeBackend {
        pub(crate) path_loads: Arc<AtomicUsize>,
        pub(crate) system_loads: Arc<AtomicUsize>,
        pub(crate) system_names: Arc<Mutex<HashSet<String>>>,
    }

    impl FakeBackend {
        pub(crate) fn with_system_library(self, name: &str) -> Self {
            if let Ok(mut names) = self.system_names.lock() {
                names.insert(name.to_string());
            }
            self
        }

        pub(crate) fn path_loads(&self) -> usize {
            self.path_loads.load(Ordering::SeqCst)
        }
    }

    impl LibraryBackend for FakeBackend {
        type Handle = Arc<PathBuf>;

        fn load_path(&self, path: &Path) -> Result<Self::Handle, Error> {
            self.path_loads.fetch_add(1, Ordering::SeqCst);
            let bytes = std::fs::read(path).map_err(|err| Error::io(err, path))?;
            if bytes.starts_with(FAKE_LIB_MAGIC) {
                Ok(Arc::new(path.to_path_buf()))
            } else {
                Err(Error::new(ErrorKind::LoadRejected)
                    .with_message("invalid library header")
                    .with_path(path))
            }
        }

        fn load_system(&self, base_name: &str) -> Result<Self::Handle, Error> {
            self.system_loads.fetch_add(1, Ordering::SeqCst);
            let known = self
                .system_names
                .lock()
                .map(|names| names.contains(base_name))
                .unwrap_or(false);
            if known {
                Ok(Arc::new(PathBuf::from(base_name)))
            } else {
                Err(Error::new(ErrorKind::LoadRejected)
                    .with_message(format!("no system library named {base_name}")))
            }
        }
    }
}
