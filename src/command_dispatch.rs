//! Purpose: Hold top-level CLI command dispatch for `nativeload`.
//! Exports: `Settings`, `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Every command builds its resolver from the same `Settings`.
//! Invariants: `load` goes through the process-wide resolver; its artifacts are released at exit.

use super::*;

use nativeload::api::{
    self, CleanupReport, DirResources, Properties, Resolver, VersionTag, cleanup_stale_artifacts,
    lib_path_key, lib_tmpdir_key,
};
use serde::Serialize;

#[derive(Serialize)]
struct CleanOutput<'a> {
    library: &'a str,
    tmpdir: PathBuf,
    version: &'a str,
    #[serde(flatten)]
    report: CleanupReport,
}

pub(super) struct Settings {
    pub(super) resources: Option<PathBuf>,
    pub(super) namespace: String,
    pub(super) version_tag: Option<String>,
    pub(super) lib_path: Option<PathBuf>,
    pub(super) tmpdir: Option<PathBuf>,
}

impl Settings {
    fn resolver(&self, name: &str) -> Resolver {
        let resources = match &self.resources {
            Some(root) => DirResources::new(root),
            None => DirResources::beside_executable(),
        };

        let mut properties = Properties::from_env();
        if let Some(dir) = &self.lib_path {
            properties.set(lib_path_key(name), dir.display().to_string());
        }
        if let Some(dir) = &self.tmpdir {
            properties.set(lib_tmpdir_key(name), dir.display().to_string());
        }

        let resolver = Resolver::new(resources)
            .with_namespace(self.namespace.clone())
            .with_properties(properties);
        match &self.version_tag {
            Some(tag) => resolver.with_version(VersionTag::new(tag)),
            None => resolver,
        }
    }
}

pub(super) fn dispatch_command(command: Command, settings: Settings) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            clap_complete::aot::generate(shell, &mut cmd, "nativeload", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Locate { name } => {
            let resolver = settings.resolver(&name);
            let location = resolver.locate(&name);
            let resource_path = location.path();
            emit_json(json!({
                "library": &name,
                "os": resolver.platform().os_name(),
                "arch": resolver.platform().arch_name(),
                "resource_path": &resource_path,
                "resource": resolver.resources().describe(&resource_path),
                "file_name": location.file_name,
                "packaged": resolver.resources().exists(&resource_path),
                "version": resolver.version().as_str(),
                "tmpdir": resolver.temp_dir(&name).display().to_string(),
            }));
            Ok(RunOutcome::ok())
        }
        Command::Load { name } => {
            api::install(settings.resolver(&name))?;
            api::initialize(&name)?;
            let resolver = api::global();
            let from = resolver.loaded_from(&name).ok_or_else(|| {
                Error::new(ErrorKind::Internal)
                    .with_message("loaded library has no recorded source")
            })?;
            emit_json(json!({
                "library": &name,
                "loaded": true,
                "source": from.kind.as_str(),
                "location": from.location,
                "os": resolver.platform().os_name(),
                "arch": resolver.platform().arch_name(),
                "version": resolver.version().as_str(),
            }));
            Ok(RunOutcome::ok())
        }
        Command::Clean { name } => {
            let resolver = settings.resolver(&name);
            let tmpdir = resolver.temp_dir(&name);
            let report = cleanup_stale_artifacts(&tmpdir, resolver.version());
            let output = CleanOutput {
                library: &name,
                tmpdir,
                version: resolver.version().as_str(),
                report,
            };
            let value = serde_json::to_value(&output).map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("failed to encode cleanup report")
                    .with_source(err)
            })?;
            emit_json(value);
            Ok(RunOutcome::ok())
        }
    }
}
