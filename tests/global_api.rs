// Process-wide entry points. Kept in its own test binary so the one-time install is not shared.
use nativeload::api::{
    self, EmbeddedResources, ErrorKind, Properties, Resolver, VersionTag, lib_tmpdir_key,
};

#[test]
fn installed_resolver_backs_process_wide_calls() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let name = "nativeload-global-missing";
    let props = Properties::new().with(lib_tmpdir_key(name), tmp.path().display().to_string());
    let resolver = Resolver::new(EmbeddedResources::new())
        .with_properties(props)
        .with_version(VersionTag::new("9.9"));
    api::install(resolver).expect("first install");

    let err = api::initialize(name).err().expect("missing");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(!api::is_native_mode(name).expect("native mode"));
    assert_eq!(api::global().version().as_str(), "9.9");

    let again = api::install(Resolver::new(EmbeddedResources::new()))
        .err()
        .expect("already installed");
    assert_eq!(again.kind(), ErrorKind::Usage);

    assert_eq!(api::shutdown(), 0);
}
