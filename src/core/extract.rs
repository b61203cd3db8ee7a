//! Purpose: Copy a packaged library to a unique, verified, loadable file on disk.
//! Exports: `ExtractedArtifact`, `Extraction`, `extract_and_load`, `artifact_prefix`, `LOCK_EXT`.
//! Role: Extraction Engine; the only writer of `library-{version}-{uuid}-{file}` artifacts.
//! Invariants: The lock marker is created before the library bytes are written.
//! Invariants: Dropping an `ExtractedArtifact` tries to remove the library on every exit path.
//! Invariants: A lock marker is removed only after its library is gone.
//! Invariants: Bytes that differ from the packaged resource are never handed to the loader.
//! Notes: Cross-process safety rests on random file names plus lock markers, not OS file locks.
//! Notes: A reader that lists the directory between marker and library creation can still race;
//! the cleaner only ever deletes files whose marker is absent, so the window is accepted.
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use getrandom::fill as fill_random;
use tracing::{debug, warn};

use crate::core::backend::LibraryBackend;
use crate::core::error::{Error, ErrorKind};
use crate::core::resource::ResourceSource;
use crate::core::version::VersionTag;

pub const LOCK_EXT: &str = ".lck";

const COMPARE_CHUNK: usize = 64 * 1024;

/// File-name prefix shared by every artifact of one release.
pub fn artifact_prefix(version: &VersionTag) -> String {
    format!("library-{version}-")
}

/// Extracted library plus its lock marker, removed when dropped.
#[derive(Debug)]
pub struct ExtractedArtifact {
    library: PathBuf,
    lock: PathBuf,
}

impl ExtractedArtifact {
    fn new(target_dir: &Path, file_name: &str) -> Self {
        Self {
            library: target_dir.join(file_name),
            lock: target_dir.join(format!("{file_name}{LOCK_EXT}")),
        }
    }

    pub fn library_path(&self) -> &Path {
        &self.library
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock
    }
}

impl Drop for ExtractedArtifact {
    fn drop(&mut self) {
        // The marker goes only once the library is gone; a surviving library keeps it.
        if !remove_artifact_file(&self.library) {
            return;
        }
        remove_artifact_file(&self.lock);
    }
}

/// `true` when `path` no longer exists afterwards.
fn remove_artifact_file(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed extracted artifact");
            true
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => true,
        Err(err) => {
            debug!(path = %path.display(), error = %err, "extracted artifact still in use");
            false
        }
    }
}

/// Result of one extract-then-load attempt.
pub enum Extraction<H> {
    Loaded {
        artifact: ExtractedArtifact,
        handle: H,
    },
    Rejected {
        reason: Error,
    },
}

/// Extracts `<resource_dir>/<file_name>` into `target_dir` and loads it.
///
/// Copy and integrity failures return `Err`; a loader refusal returns `Extraction::Rejected`
/// after the artifact has been released.
pub fn extract_and_load<B: LibraryBackend>(
    resources: &dyn ResourceSource,
    resource_dir: &str,
    file_name: &str,
    target_dir: &Path,
    version: &VersionTag,
    backend: &B,
) -> Result<Extraction<B::Handle>, Error> {
    let resource_path = format!("{resource_dir}/{file_name}");
    let extracted_name = format!("{}{}-{file_name}", artifact_prefix(version), random_uuid()?);
    let artifact = ExtractedArtifact::new(target_dir, &extracted_name);

    fs::create_dir_all(target_dir).map_err(|err| Error::io(err, target_dir))?;
    create_lock_marker(artifact.lock_path())?;
    copy_resource(resources, &resource_path, artifact.library_path())?;
    set_loadable_permissions(artifact.library_path())?;
    verify_contents(resources, &resource_path, artifact.library_path())?;

    debug!(
        resource = %resource_path,
        path = %artifact.library_path().display(),
        "extracted native library"
    );

    match backend.load_path(artifact.library_path()) {
        Ok(handle) => Ok(Extraction::Loaded { artifact, handle }),
        Err(reason) => {
            warn!(
                path = %artifact.library_path().display(),
                error = %reason,
                "extracted library was rejected by the loader"
            );
            Ok(Extraction::Rejected { reason })
        }
    }
}

fn create_lock_marker(path: &Path) -> Result<(), Error> {
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .map(drop)
        .map_err(|err| Error::io(err, path).with_message("failed to create lock marker"))
}

fn copy_resource(
    resources: &dyn ResourceSource,
    resource_path: &str,
    dest: &Path,
) -> Result<(), Error> {
    let mut reader = resources.open(resource_path).map_err(|err| {
        Error::io(err, resources.describe(resource_path))
            .with_message("failed to open packaged library")
    })?;
    let mut file = File::create(dest).map_err(|err| {
        Error::io(err, dest).with_message("failed to create extracted library")
    })?;
    io::copy(&mut reader, &mut file)
        .and_then(|_| file.sync_all())
        .map_err(|err| Error::io(err, dest).with_message("failed to write extracted library"))
}

#[cfg(unix)]
fn set_loadable_permissions(path: &Path) -> Result<(), Error> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .map_err(|err| Error::io(err, path).with_message("failed to mark library executable"))
}

#[cfg(not(unix))]
fn set_loadable_permissions(path: &Path) -> Result<(), Error> {
    let mut permissions = fs::metadata(path)
        .map_err(|err| Error::io(err, path))?
        .permissions();
    permissions.set_readonly(false);
    fs::set_permissions(path, permissions)
        .map_err(|err| Error::io(err, path).with_message("failed to mark library writable"))
}

fn verify_contents(
    resources: &dyn ResourceSource,
    resource_path: &str,
    extracted: &Path,
) -> Result<(), Error> {
    let packaged = resources.open(resource_path).map_err(|err| {
        Error::io(err, resources.describe(resource_path))
            .with_message("failed to reopen packaged library")
    })?;
    let written = File::open(extracted).map_err(|err| Error::io(err, extracted))?;

    let equal = contents_equal(packaged, written).map_err(|err| Error::io(err, extracted))?;
    if !equal {
        return Err(Error::new(ErrorKind::FileIntegrity)
            .with_message("extracted library does not match packaged resource")
            .with_path(extracted));
    }
    Ok(())
}

pub(crate) fn contents_equal(left: impl Read, right: impl Read) -> io::Result<bool> {
    let mut left = BufReader::with_capacity(COMPARE_CHUNK, left);
    let mut right = BufReader::with_capacity(COMPARE_CHUNK, right);
    let mut left_buf = vec![0u8; COMPARE_CHUNK];
    let mut right_buf = vec![0u8; COMPARE_CHUNK];

    loop {
        let left_len = read_full(&mut left, &mut left_buf)?;
        let right_len = read_full(&mut right, &mut right_buf)?;
        if left_len != right_len || left_buf[..left_len] != right_buf[..right_len] {
            return Ok(false);
        }
        if left_len == 0 {
            return Ok(true);
        }
    }
}

fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

/// Random RFC 4122 version 4 identifier in hyphenated form.
fn random_uuid() -> Result<String, Error> {
    let mut bytes = [0u8; 16];
    fill_random(&mut bytes).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message(format!("failed to generate random artifact name: {err}"))
    })?;
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    let hex: String = bytes.iter().map(|byte| format!("{byte:02x}")).collect();
    Ok(format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    ))
}
