//! Purpose: Define the stable public Rust API boundary for nativeload.
//! Exports: Resolver and its collaborators, plus the process-wide `initialize` entry points.
//! Role: Public, additive-only surface; hides internal engine modules.
//! Invariants: This module is the only public path to core types.
//! Invariants: The process-wide resolver is created at most once and never replaced.
//! Invariants: Artifacts of the process-wide resolver are released at normal process exit.
//! Notes: Statics are never dropped, so release runs from an `atexit` hook; `shutdown` does
//! the same earlier. Loaded libraries stay mapped either way.
use std::sync::{Once, OnceLock};

use tracing::warn;

pub use crate::core::backend::{DylibBackend, LibraryBackend, SharedLibrary};
pub use crate::core::cleanup::{CleanupReport, cleanup_stale_artifacts};
pub use crate::core::config::{Properties, lib_path_key, lib_tmpdir_key};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::extract::{ExtractedArtifact, LOCK_EXT, artifact_prefix};
pub use crate::core::platform::{HostPlatform, PlatformInfo, map_library_name, search_path_var};
pub use crate::core::resolver::{
    Candidate, CandidateKind, DEFAULT_NAMESPACE, LoadedFrom, ResolutionStatus, Resolver,
};
pub use crate::core::resource::{
    DirResources, EmbeddedResources, ResourceLocation, ResourceSource, locate, native_resource_dir,
};
pub use crate::core::version::{UNKNOWN_VERSION, VersionTag};

static GLOBAL: OnceLock<Resolver> = OnceLock::new();
static EXIT_HOOK: Once = Once::new();

/// Installs the process-wide resolver used by `initialize` and friends.
pub fn install(resolver: Resolver) -> Result<(), Error> {
    GLOBAL.set(resolver).map_err(|_| {
        Error::new(ErrorKind::Usage).with_message("process-wide resolver already installed")
    })?;
    register_exit_hook();
    Ok(())
}

/// The process-wide resolver; defaults to resources beside the executable and env config.
pub fn global() -> &'static Resolver {
    let resolver = GLOBAL.get_or_init(|| Resolver::new(DirResources::beside_executable()));
    register_exit_hook();
    resolver
}

pub fn initialize(base_name: &str) -> Result<bool, Error> {
    global().initialize(base_name)
}

pub fn is_native_mode(base_name: &str) -> Result<bool, Error> {
    global().is_native_mode(base_name)
}

/// Releases artifacts extracted by the process-wide resolver ahead of process exit.
pub fn shutdown() -> usize {
    GLOBAL
        .get()
        .map(|resolver| resolver.release_artifacts())
        .unwrap_or_default()
}

fn register_exit_hook() {
    EXIT_HOOK.call_once(|| {
        // SAFETY: `release_at_exit` is a plain function that never unwinds across the boundary.
        let status = unsafe { libc::atexit(release_at_exit) };
        if status != 0 {
            warn!("failed to register exit hook; call api::shutdown before exiting");
        }
    });
}

extern "C" fn release_at_exit() {
    shutdown();
}
