//! Purpose: Resolve a logical library name to a loaded native library, once per process.
//! Exports: `Resolver`, `ResolutionStatus`, `Candidate`, `CandidateKind`, `LoadedFrom`.
//! Role: Load Resolver; orders candidates, owns the resolution cache and extracted artifacts.
//! Invariants: One mutex guards the cache, the cleanup-once set, and artifact ownership.
//! Invariants: Search order is override path, packaged resource, system search path, OS loader.
//! Invariants: A cached outcome (loaded or failed) is returned without new work until `forget`.
//! Invariants: The stale-artifact scan runs at most once per name, before its first search.
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use tracing::{debug, info, warn};

use crate::core::backend::{DylibBackend, LibraryBackend};
use crate::core::cleanup::cleanup_stale_artifacts;
use crate::core::config::Properties;
use crate::core::error::{Error, ErrorKind};
use crate::core::extract::{ExtractedArtifact, Extraction, extract_and_load};
use crate::core::platform::{HostPlatform, PlatformInfo, map_library_name};
use crate::core::resource::{ResourceLocation, ResourceSource, locate};
use crate::core::version::VersionTag;

pub const DEFAULT_NAMESPACE: &str = "nativeload";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResolutionStatus {
    Unresolved,
    Loaded,
    Failed,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CandidateKind {
    Override,
    Packaged,
    SystemPath,
    Runtime,
}

impl CandidateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateKind::Override => "override",
            CandidateKind::Packaged => "packaged",
            CandidateKind::SystemPath => "system-path",
            CandidateKind::Runtime => "runtime",
        }
    }
}

impl fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One location tried during a resolution, kept for the failure report.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Candidate {
    pub kind: CandidateKind,
    pub location: String,
    pub reason: String,
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.kind, self.location, self.reason)
    }
}

/// The candidate that produced a loaded library.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LoadedFrom {
    pub kind: CandidateKind,
    pub location: String,
}

enum Outcome<H> {
    Loaded { handle: H, from: LoadedFrom },
    Failed(Error),
}

struct ResolutionState<H> {
    // Declared before `artifacts` so libraries are released before their files are unlinked.
    outcomes: HashMap<String, Outcome<H>>,
    cleaned: HashSet<String>,
    artifacts: Vec<ExtractedArtifact>,
}

impl<H> Default for ResolutionState<H> {
    fn default() -> Self {
        Self {
            outcomes: HashMap::new(),
            cleaned: HashSet::new(),
            artifacts: Vec::new(),
        }
    }
}

pub struct Resolver<B: LibraryBackend = DylibBackend> {
    resources: Arc<dyn ResourceSource>,
    backend: B,
    platform: Arc<dyn PlatformInfo>,
    properties: Properties,
    namespace: String,
    version: OnceLock<VersionTag>,
    state: Mutex<ResolutionState<B::Handle>>,
}

impl Resolver<DylibBackend> {
    /// Resolver backed by the real OS loader.
    pub fn new(resources: impl ResourceSource + 'static) -> Self {
        Self::with_backend(resources, DylibBackend)
    }
}

impl<B: LibraryBackend> Resolver<B> {
    pub fn with_backend(resources: impl ResourceSource + 'static, backend: B) -> Self {
        Self {
            resources: Arc::new(resources),
            backend,
            platform: Arc::new(HostPlatform),
            properties: Properties::from_env(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            version: OnceLock::new(),
            state: Mutex::new(ResolutionState::default()),
        }
    }

    pub fn with_platform(mut self, platform: impl PlatformInfo + 'static) -> Self {
        self.platform = Arc::new(platform);
        self
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Pins the version tag instead of reading it from packaged metadata.
    pub fn with_version(mut self, version: VersionTag) -> Self {
        self.version = OnceLock::from(version);
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn platform(&self) -> &dyn PlatformInfo {
        self.platform.as_ref()
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn resources(&self) -> &dyn ResourceSource {
        self.resources.as_ref()
    }

    pub fn version(&self) -> &VersionTag {
        self.version
            .get_or_init(|| VersionTag::from_resources(self.resources.as_ref(), &self.namespace))
    }

    pub fn locate(&self, base_name: &str) -> ResourceLocation {
        locate(&self.namespace, self.platform.as_ref(), base_name)
    }

    pub fn temp_dir(&self, base_name: &str) -> PathBuf {
        self.properties.tmp_dir(base_name)
    }

    /// Loads `base_name` if needed; `Ok(true)` once it is loaded.
    pub fn initialize(&self, base_name: &str) -> Result<bool, Error> {
        self.resolve(base_name)
    }

    /// Same effect as `initialize`, but a missing library reads as `false`.
    pub fn is_native_mode(&self, base_name: &str) -> Result<bool, Error> {
        match self.resolve(base_name) {
            Ok(loaded) => Ok(loaded),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Runs the search under the resolver lock, which is held while the loader runs the
    /// library's initializers. The lock is not reentrant: an initializer that calls back
    /// into the same resolver (or `api::initialize`) on the same thread deadlocks.
    pub fn resolve(&self, base_name: &str) -> Result<bool, Error> {
        validate_base_name(base_name)?;
        let mut state = self.lock_state()?;

        if state.cleaned.insert(base_name.to_string()) {
            let temp_dir = self.temp_dir(base_name);
            let report = cleanup_stale_artifacts(&temp_dir, self.version());
            if !report.removed.is_empty() {
                info!(
                    library = base_name,
                    removed = report.removed.len(),
                    "removed stale native libraries"
                );
            }
        }

        match state.outcomes.get(base_name) {
            Some(Outcome::Loaded { .. }) => return Ok(true),
            Some(Outcome::Failed(err)) => return Err(err.replay()),
            None => {}
        }

        match self.search(base_name, &mut state.artifacts) {
            Ok((handle, from)) => {
                info!(
                    library = base_name,
                    source = %from.kind,
                    location = %from.location,
                    "loaded native library"
                );
                state
                    .outcomes
                    .insert(base_name.to_string(), Outcome::Loaded { handle, from });
                Ok(true)
            }
            Err(err) => {
                warn!(library = base_name, error = %err, "native library not found");
                let returned = err.replay();
                state
                    .outcomes
                    .insert(base_name.to_string(), Outcome::Failed(err));
                Err(returned)
            }
        }
    }

    pub fn status(&self, base_name: &str) -> ResolutionStatus {
        let Ok(state) = self.lock_state() else {
            return ResolutionStatus::Unresolved;
        };
        match state.outcomes.get(base_name) {
            Some(Outcome::Loaded { .. }) => ResolutionStatus::Loaded,
            Some(Outcome::Failed(_)) => ResolutionStatus::Failed,
            None => ResolutionStatus::Unresolved,
        }
    }

    /// Handle of a loaded library, for symbol lookup.
    pub fn library(&self, base_name: &str) -> Option<B::Handle> {
        let state = self.lock_state().ok()?;
        match state.outcomes.get(base_name) {
            Some(Outcome::Loaded { handle, .. }) => Some(handle.clone()),
            _ => None,
        }
    }

    pub fn loaded_from(&self, base_name: &str) -> Option<LoadedFrom> {
        let state = self.lock_state().ok()?;
        match state.outcomes.get(base_name) {
            Some(Outcome::Loaded { from, .. }) => Some(from.clone()),
            _ => None,
        }
    }

    /// Drops a cached failure so the next call searches again. Loaded libraries stay loaded.
    pub fn forget(&self, base_name: &str) -> bool {
        let Ok(mut state) = self.lock_state() else {
            return false;
        };
        if matches!(state.outcomes.get(base_name), Some(Outcome::Failed(_))) {
            state.outcomes.remove(base_name);
            return true;
        }
        false
    }

    pub fn extracted_artifacts(&self) -> Vec<PathBuf> {
        self.lock_state()
            .map(|state| {
                state
                    .artifacts
                    .iter()
                    .map(|artifact| artifact.library_path().to_path_buf())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Unlinks every artifact this resolver extracted; returns how many were released.
    pub fn release_artifacts(&self) -> usize {
        let Ok(mut state) = self.lock_state() else {
            return 0;
        };
        let released = state.artifacts.len();
        state.artifacts.clear();
        if released > 0 {
            debug!(count = released, "released extracted artifacts");
        }
        released
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, ResolutionState<B::Handle>>, Error> {
        self.state.lock().map_err(|_| {
            Error::new(ErrorKind::Internal).with_message("resolver state lock poisoned")
        })
    }

    fn search(
        &self,
        base_name: &str,
        artifacts: &mut Vec<ExtractedArtifact>,
    ) -> Result<(B::Handle, LoadedFrom), Error> {
        let file_name = map_library_name(base_name);
        let mut tried = Vec::new();

        if let Some(dir) = self.properties.lib_path(base_name) {
            let path = dir.join(&file_name);
            match self.load_file(&path) {
                Ok(handle) => return Ok((handle, loaded(CandidateKind::Override, &path))),
                Err(reason) => tried.push(candidate(CandidateKind::Override, &path, reason)),
            }
        }

        let location = self.locate(base_name);
        let resource_path = location.path();
        let described = self.resources.describe(&resource_path);
        if self.resources.exists(&resource_path) {
            let target_dir = self.temp_dir(base_name);
            let attempt = extract_and_load(
                self.resources.as_ref(),
                &location.dir,
                &location.file_name,
                &target_dir,
                self.version(),
                &self.backend,
            );
            match attempt {
                Ok(Extraction::Loaded { artifact, handle }) => {
                    let from = LoadedFrom {
                        kind: CandidateKind::Packaged,
                        location: artifact.library_path().display().to_string(),
                    };
                    artifacts.push(artifact);
                    return Ok((handle, from));
                }
                Ok(Extraction::Rejected { reason }) | Err(reason) => tried.push(Candidate {
                    kind: CandidateKind::Packaged,
                    location: described,
                    reason: reason.to_string(),
                }),
            }
        } else {
            tried.push(Candidate {
                kind: CandidateKind::Packaged,
                location: described,
                reason: "not packaged".to_string(),
            });
        }

        for dir in self.properties.system_search_path() {
            let path = dir.join(&file_name);
            match self.load_file(&path) {
                Ok(handle) => return Ok((handle, loaded(CandidateKind::SystemPath, &path))),
                Err(reason) => tried.push(candidate(CandidateKind::SystemPath, &path, reason)),
            }
        }

        match self.backend.load_system(base_name) {
            Ok(handle) => {
                return Ok((
                    handle,
                    LoadedFrom {
                        kind: CandidateKind::Runtime,
                        location: base_name.to_string(),
                    },
                ));
            }
            Err(reason) => tried.push(Candidate {
                kind: CandidateKind::Runtime,
                location: base_name.to_string(),
                reason: reason.to_string(),
            }),
        }

        for entry in &tried {
            debug!(library = base_name, candidate = %entry, "candidate failed");
        }
        let listed: Vec<String> = tried.iter().map(ToString::to_string).collect();
        Err(Error::new(ErrorKind::NotFound)
            .with_message(format!(
                "no native library found for os.name={}, os.arch={}, paths=[{}]",
                self.platform.os_name(),
                self.platform.arch_name(),
                listed.join("; ")
            ))
            .with_candidates(listed))
    }

    fn load_file(&self, path: &Path) -> Result<B::Handle, String> {
        if !path.is_file() {
            return Err("missing".to_string());
        }
        self.backend.load_path(path).map_err(|err| err.to_string())
    }
}

fn loaded(kind: CandidateKind, path: &Path) -> LoadedFrom {
    LoadedFrom {
        kind,
        location: path.display().to_string(),
    }
}

fn candidate(kind: CandidateKind, path: &Path, reason: String) -> Candidate {
    Candidate {
        kind,
        location: path.display().to_string(),
        reason,
    }
}

fn validate_base_name(base_name: &str) -> Result<(), Error> {
    if base_name.is_empty() {
        return Err(Error::new(ErrorKind::Usage).with_message("library name is empty"));
    }
    if base_name.contains(['/', '\\']) || base_name == "." || base_name == ".." {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("library name must not be a path: {base_name}")));
    }
    Ok(())
}
