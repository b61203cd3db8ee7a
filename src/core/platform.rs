//! Purpose: Identify the running platform and apply its shared-library naming conventions.
//! Exports: `PlatformInfo`, `HostPlatform`, `map_library_name`, `search_path_var`.
//! Role: The only place that inspects the compile target; everything else asks this module.
//! Invariants: Names are canonical and stable (`Linux`, `Mac`, `Windows`, ...).
//! Invariants: `map_library_name` is pure and only depends on the host target.
use std::env::consts::{ARCH, DLL_PREFIX, DLL_SUFFIX, OS};

/// Canonical OS/architecture names used to build packaged resource paths.
pub trait PlatformInfo: Send + Sync {
    fn os_name(&self) -> String;
    fn arch_name(&self) -> String;

    /// `<os>/<arch>` folder under the `native` resource segment.
    fn native_folder(&self) -> String {
        format!("{}/{}", self.os_name(), self.arch_name())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct HostPlatform;

impl PlatformInfo for HostPlatform {
    fn os_name(&self) -> String {
        canonical_os(OS).to_string()
    }

    fn arch_name(&self) -> String {
        canonical_arch(ARCH).to_string()
    }
}

fn canonical_os(os: &str) -> &str {
    match os {
        "linux" if cfg!(target_env = "musl") => "Linux-Musl",
        "linux" => "Linux",
        "android" => "Linux-Android",
        "macos" => "Mac",
        "windows" => "Windows",
        "freebsd" => "FreeBSD",
        "openbsd" => "OpenBSD",
        "netbsd" => "NetBSD",
        "solaris" | "illumos" => "SunOS",
        "aix" => "AIX",
        other => other,
    }
}

fn canonical_arch(arch: &str) -> &str {
    match arch {
        "x86" => "x86",
        "x86_64" => "x86_64",
        "aarch64" => "aarch64",
        "arm" => "arm",
        "powerpc64" if cfg!(target_endian = "little") => "ppc64le",
        "powerpc64" => "ppc64",
        "powerpc" => "ppc",
        "riscv64" => "riscv64",
        "s390x" => "s390x",
        other => other,
    }
}

/// Platform file name for a logical library, e.g. `math` -> `libmath.so`.
pub fn map_library_name(base_name: &str) -> String {
    format!("{DLL_PREFIX}{base_name}{DLL_SUFFIX}")
}

/// Environment variable holding the host's dynamic-library search path.
pub fn search_path_var() -> &'static str {
    if cfg!(windows) {
        "PATH"
    } else if cfg!(target_os = "macos") {
        "DYLD_LIBRARY_PATH"
    } else {
        "LD_LIBRARY_PATH"
    }
}
