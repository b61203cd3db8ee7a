//! Purpose: Address packaged native binaries and read them back out of their package.
//! Exports: `ResourceSource`, `DirResources`, `EmbeddedResources`, `ResourceLocation`, `locate`.
//! Role: Resource Locator plus the storage seam for "the distributed package".
//! Invariants: Resource paths are `/`-separated, relative, and never start with `/`.
//! Invariants: `open` may be called repeatedly and yields the same bytes each time.
//! Invariants: `locate` is pure for a given namespace, platform, and base name.
use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

use crate::core::platform::{PlatformInfo, map_library_name};

pub const NATIVE_SEGMENT: &str = "native";

/// A package of resources addressed by logical path.
pub trait ResourceSource: Send + Sync {
    fn exists(&self, path: &str) -> bool;

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + '_>>;

    /// Human-readable location for diagnostics.
    fn describe(&self, path: &str) -> String {
        path.to_string()
    }
}

/// Resource tree laid out as plain files under `root`.
#[derive(Clone, Debug)]
pub struct DirResources {
    root: PathBuf,
}

impl DirResources {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resources shipped next to the running executable.
    pub fn beside_executable() -> Self {
        let root = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_path(&self, path: &str) -> PathBuf {
        path.split('/')
            .filter(|part| !part.is_empty() && *part != "." && *part != "..")
            .fold(self.root.clone(), |acc, part| acc.join(part))
    }
}

impl ResourceSource for DirResources {
    fn exists(&self, path: &str) -> bool {
        self.file_path(path).is_file()
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + '_>> {
        let file = File::open(self.file_path(path))?;
        Ok(Box::new(file))
    }

    fn describe(&self, path: &str) -> String {
        self.file_path(path).display().to_string()
    }
}

/// In-memory resources, typically filled with `include_bytes!`.
#[derive(Clone, Debug, Default)]
pub struct EmbeddedResources {
    entries: HashMap<String, Cow<'static, [u8]>>,
}

impl EmbeddedResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, bytes: impl Into<Cow<'static, [u8]>>) {
        let path = path.into();
        self.entries
            .insert(path.trim_start_matches('/').to_string(), bytes.into());
    }

    pub fn with(mut self, path: impl Into<String>, bytes: impl Into<Cow<'static, [u8]>>) -> Self {
        self.insert(path, bytes);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ResourceSource for EmbeddedResources {
    fn exists(&self, path: &str) -> bool {
        self.entries.contains_key(path.trim_start_matches('/'))
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + '_>> {
        match self.entries.get(path.trim_start_matches('/')) {
            Some(bytes) => Ok(Box::new(Cursor::new(&bytes[..]))),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no embedded resource at {path}"),
            )),
        }
    }

    fn describe(&self, path: &str) -> String {
        format!("embedded:{path}")
    }
}

/// Where a library's packaged binary is expected to live.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResourceLocation {
    pub dir: String,
    pub file_name: String,
}

impl ResourceLocation {
    pub fn path(&self) -> String {
        format!("{}/{}", self.dir, self.file_name)
    }
}

/// Resource folder for the current platform: `<namespace>/native/<OS>/<Arch>`.
pub fn native_resource_dir(namespace: &str, platform: &dyn PlatformInfo) -> String {
    let namespace = namespace.trim_matches('/');
    if namespace.is_empty() {
        format!("{NATIVE_SEGMENT}/{}", platform.native_folder())
    } else {
        format!("{namespace}/{NATIVE_SEGMENT}/{}", platform.native_folder())
    }
}

pub fn locate(namespace: &str, platform: &dyn PlatformInfo, base_name: &str) -> ResourceLocation {
    ResourceLocation {
        dir: native_resource_dir(namespace, platform),
        file_name: map_library_name(base_name),
    }
}

#[cfg(test)]
mod tests {
    use super::{DirResources, EmbeddedResources, ResourceSource, locate, native_resource_dir};
    use crate::core::platform::{PlatformInfo, map_library_name};
    use std::io::Read;

    struct FixedPlatform;

    impl PlatformInfo for FixedPlatform {
        fn os_name(&self) -> String {
            "Linux".to_string()
        }

        fn arch_name(&self) -> String {
            "aarch64".to_string()
        }
    }

    #[test]
    fn resource_dir_includes_namespace_and_platform() {
        assert_eq!(
            native_resource_dir("org/acme/jni", &FixedPlatform),
            "org/acme/jni/native/Linux/aarch64"
        );
        assert_eq!(
            native_resource_dir("/org/acme/", &FixedPlatform),
            "org/acme/native/Linux/aarch64"
        );
        assert_eq!(native_resource_dir("", &FixedPlatform), "native/Linux/aarch64");
    }

    #[test]
    fn locate_uses_mangled_file_name() {
        let location = locate("acme", &FixedPlatform, "math");
        assert_eq!(location.file_name, map_library_name("math"));
        assert_eq!(
            location.path(),
            format!("acme/native/Linux/aarch64/{}", map_library_name("math"))
        );
    }

    #[test]
    fn dir_resources_reads_nested_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("acme").join("native");
        std::fs::create_dir_all(&nested).expect("mkdir");
        std::fs::write(nested.join("blob.bin"), b"payload").expect("write");

        let resources = DirResources::new(dir.path());
        assert!(resources.exists("acme/native/blob.bin"));
        assert!(!resources.exists("acme/native/missing.bin"));
        assert!(!resources.exists("acme/native"));

        let mut bytes = Vec::new();
        resources
            .open("acme/native/blob.bin")
            .expect("open")
            .read_to_end(&mut bytes)
            .expect("read");
        assert_eq!(bytes, b"payload");
    }

    #[test]
    fn dir_resources_ignores_parent_segments() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resources = DirResources::new(dir.path().join("root"));
        let root = dir.path().join("root").display().to_string();
        assert!(resources.describe("../etc/passwd").starts_with(&root));
    }

    #[test]
    fn embedded_resources_can_be_reopened() {
        let resources = EmbeddedResources::new().with("/acme/VERSION", &b"version=1.2"[..]);
        assert!(resources.exists("acme/VERSION"));

        for _ in 0..2 {
            let mut text = String::new();
            resources
                .open("acme/VERSION")
                .expect("open")
                .read_to_string(&mut text)
                .expect("read");
            assert_eq!(text, "version=1.2");
        }

        let err = resources.open("acme/missing").err().expect("missing");
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
