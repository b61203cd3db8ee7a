// Public API tests driving `Resolver` with an in-memory package and a stand-in loader.
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use nativeload::api::{
    CandidateKind, EmbeddedResources, Error, ErrorKind, HostPlatform, LibraryBackend, Properties,
    ResolutionStatus, Resolver, VersionTag, map_library_name, native_resource_dir,
};

const NAMESPACE: &str = "org/romantics/jni";
const MAGIC: &[u8] = b"\x7fTESTLIB";

#[derive(Clone, Default)]
struct CountingBackend {
    loads: Arc<AtomicUsize>,
}

impl LibraryBackend for CountingBackend {
    type Handle = Arc<PathBuf>;

    fn load_path(&self, path: &Path) -> Result<Self::Handle, Error> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let bytes = std::fs::read(path)
            .map_err(|err| Error::new(ErrorKind::Io).with_path(path).with_source(err))?;
        if bytes.starts_with(MAGIC) {
            Ok(Arc::new(path.to_path_buf()))
        } else {
            Err(Error::new(ErrorKind::LoadRejected).with_path(path))
        }
    }

    fn load_system(&self, base_name: &str) -> Result<Self::Handle, Error> {
        Err(Error::new(ErrorKind::LoadRejected)
            .with_message(format!("no system library named {base_name}")))
    }
}

fn library_bytes() -> Vec<u8> {
    let mut bytes = MAGIC.to_vec();
    bytes.extend(std::iter::repeat_n(0x11, 32 * 1024));
    bytes
}

fn package(name: &str) -> EmbeddedResources {
    let dir = native_resource_dir(NAMESPACE, &HostPlatform);
    EmbeddedResources::new()
        .with(format!("{dir}/{}", map_library_name(name)), library_bytes())
        .with(format!("{NAMESPACE}/version.properties"), &b"version=1.0.0\n"[..])
}

fn resolver(backend: CountingBackend, properties: Properties) -> Resolver<CountingBackend> {
    Resolver::with_backend(package("math"), backend)
        .with_namespace(NAMESPACE)
        .with_properties(properties)
}

fn file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

#[test]
fn math_end_to_end_loads_once() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let backend = CountingBackend::default();
    let props = Properties::new().with("math.lib.tmpdir", tmp.path().display().to_string());
    let resolver = resolver(backend.clone(), props);

    assert_eq!(resolver.status("math"), ResolutionStatus::Unresolved);
    assert!(resolver.initialize("math").expect("initialize"));
    assert_eq!(resolver.version(), &VersionTag::new("1.0.0"));
    let count = file_count(tmp.path());
    assert_eq!(count, 2);

    let extracted = resolver.extracted_artifacts();
    assert_eq!(extracted.len(), 1);
    let name = extracted[0].file_name().and_then(|n| n.to_str()).expect("name");
    assert!(name.starts_with("library-1.0.0-"));
    assert!(name.ends_with(&map_library_name("math")));

    assert!(resolver.initialize("math").expect("second initialize"));
    assert!(resolver.is_native_mode("math").expect("native mode"));
    assert_eq!(file_count(tmp.path()), count);
    assert_eq!(backend.loads.load(Ordering::SeqCst), 1);
    assert_eq!(resolver.library("math").as_deref(), Some(&extracted[0]));
}

#[test]
fn override_beats_packaged_resource() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let libs = tempfile::tempdir().expect("libs");
    let override_file = libs.path().join(map_library_name("math"));
    std::fs::write(&override_file, library_bytes()).expect("write");
    let props = Properties::new()
        .with("math.lib.tmpdir", tmp.path().display().to_string())
        .with("math.lib.path", libs.path().display().to_string());
    let resolver = resolver(CountingBackend::default(), props);

    assert!(resolver.initialize("math").expect("initialize"));
    let from = resolver.loaded_from("math").expect("loaded");
    assert_eq!(from.kind, CandidateKind::Override);
    assert_eq!(from.location, override_file.display().to_string());
    assert_eq!(file_count(tmp.path()), 0);
}

#[test]
fn stale_artifacts_are_swept_unless_locked() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let file = map_library_name("math");
    let stale = tmp.path().join(format!("library-1.0.0-dead-{file}"));
    let locked = tmp.path().join(format!("library-1.0.0-live-{file}"));
    let lock = tmp.path().join(format!("library-1.0.0-live-{file}.lck"));
    for path in [&stale, &locked, &lock] {
        std::fs::write(path, b"old").expect("write");
    }
    let props = Properties::new().with("math.lib.tmpdir", tmp.path().display().to_string());
    let resolver = resolver(CountingBackend::default(), props);

    assert!(resolver.initialize("math").expect("initialize"));
    assert!(!stale.exists());
    assert!(locked.exists());
    assert!(lock.exists());
}

#[test]
fn concurrent_initialize_loads_exactly_once() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let backend = CountingBackend::default();
    let props = Properties::new().with("math.lib.tmpdir", tmp.path().display().to_string());
    let resolver = Arc::new(resolver(backend.clone(), props));

    let workers = 16;
    let results: Vec<Result<bool, Error>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| scope.spawn(|| resolver.initialize("math")))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("join"))
            .collect()
    });

    assert_eq!(results.len(), workers);
    for result in results {
        assert!(result.expect("initialize"));
    }
    assert_eq!(backend.loads.load(Ordering::SeqCst), 1);
    assert_eq!(file_count(tmp.path()), 2);

    assert_eq!(resolver.release_artifacts(), 1);
    assert_eq!(file_count(tmp.path()), 0);
}

#[test]
fn unknown_library_fails_with_diagnostics() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let props = Properties::new().with("zlibx.lib.tmpdir", tmp.path().display().to_string());
    let resolver = resolver(CountingBackend::default(), props);

    let err = resolver.initialize("zlibx").err().expect("not found");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.candidates().len(), 2);
    assert!(err.candidates()[0].contains("not packaged"));
    assert_eq!(resolver.status("zlibx"), ResolutionStatus::Failed);
    assert!(!resolver.is_native_mode("zlibx").expect("query"));
}
