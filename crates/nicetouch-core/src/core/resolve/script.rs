//! Script-driven NLE bridge.
//!
//! Runs a helper program (by default a Python script talking to the
//! editor's scripting API) once per request. Exit status 0 means the NLE
//! accepted the request.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::core::process::run_streaming;
use crate::core::settings::BridgeSettings;
use crate::core::CoreResult;

use super::bridge::{ExportRequest, ImportRequest, NleBridge};

/// Bridge backed by an external helper program
#[derive(Clone, Debug)]
pub struct ScriptBridge {
    program: String,
    base_args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl ScriptBridge {
    pub fn new(program: impl Into<String>, base_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            base_args,
            working_dir: None,
        }
    }

    /// Builds a bridge from settings; a relative working dir resolves against `project_root`.
    pub fn from_settings(settings: &BridgeSettings, project_root: &Path) -> Self {
        let working_dir = settings
            .working_dir
            .as_ref()
            .map(|dir| project_root.join(dir))
            .or_else(|| Some(project_root.to_path_buf()));
        Self {
            program: settings.program.clone(),
            base_args: settings.args.clone(),
            working_dir,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Full argument list for an export call
    pub fn export_args(&self, request: &ExportRequest) -> Vec<String> {
        let mut args = self.base_args.clone();
        args.push("export".into());
        args.push("--output".into());
        args.push(request.output_path.to_string_lossy().into_owned());
        if let Some(name) = &request.timeline_name {
            args.push("--timeline".into());
            args.push(name.clone());
        }
        args
    }

    /// Full argument list for an import call
    pub fn import_args(&self, request: &ImportRequest) -> Vec<String> {
        let mut args = self.base_args.clone();
        args.push("import".into());
        args.push("--input".into());
        args.push(request.input_path.to_string_lossy().into_owned());
        args.push("--timeline".into());
        args.push(request.timeline_name.clone());
        if request.import_source_clips {
            args.push("--import-source-clips".into());
        }
        if let Some(path) = &request.source_clips_path {
            args.push("--source-clips-path".into());
            args.push(path.to_string_lossy().into_owned());
        }
        for folder in &request.source_clips_folders {
            args.push("--source-clips-folder".into());
            args.push(folder.clone());
        }
        args
    }

    async fn run(&self, action: &str, args: Vec<String>) -> CoreResult<bool> {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&args);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        debug!(program = %self.program, ?args, "Running NLE bridge {}", action);
        let outcome = run_streaming(cmd, |line| info!(target: "nicetouch::bridge", "{}", line)).await?;

        for line in outcome.stderr.lines().filter(|l| !l.trim().is_empty()) {
            warn!(target: "nicetouch::bridge", "{}", line);
        }

        if outcome.success {
            info!("NLE bridge {} succeeded", action);
        } else {
            warn!(
                exit_code = ?outcome.exit_code,
                "NLE bridge {} failed: {}",
                action,
                outcome.stderr_tail().unwrap_or("no error output")
            );
        }
        Ok(outcome.success)
    }
}

#[async_trait]
impl NleBridge for ScriptBridge {
    fn name(&self) -> &str {
        "script"
    }

    async fn export_timeline(&self, request: &ExportRequest) -> CoreResult<bool> {
        self.run("export", self.export_args(request)).await
    }

    async fn import_timeline(&self, request: &ImportRequest) -> CoreResult<bool> {
        self.run("import", self.import_args(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CoreError;

    fn bridge() -> ScriptBridge {
        ScriptBridge::new("python3", vec!["resolve_bridge.py".into()])
    }

    #[test]
    fn test_export_args() {
        let request = ExportRequest::new("/p/ref/Cut.otio").with_timeline_name("Cut");
        assert_eq!(
            bridge().export_args(&request),
            vec!["resolve_bridge.py", "export", "--output", "/p/ref/Cut.otio", "--timeline", "Cut"]
        );

        let current = ExportRequest::new("/p/ref/timeline.otio");
        assert!(!bridge().export_args(&current).contains(&"--timeline".to_string()));
    }

    #[test]
    fn test_import_args() {
        let request = ImportRequest::new("/p/edit/Cut.otio", "Cut")
            .with_source_clips(true)
            .with_source_clips_path(Some(PathBuf::from("/media")))
            .with_source_clips_folders(vec!["A".into()]);
        assert_eq!(
            bridge().import_args(&request),
            vec![
                "resolve_bridge.py",
                "import",
                "--input",
                "/p/edit/Cut.otio",
                "--timeline",
                "Cut",
                "--import-source-clips",
                "--source-clips-path",
                "/media",
                "--source-clips-folder",
                "A",
            ]
        );
    }

    #[test]
    fn test_from_settings_resolves_working_dir() {
        let settings = BridgeSettings {
            working_dir: Some("scripts".into()),
            ..BridgeSettings::default()
        };
        let bridge = ScriptBridge::from_settings(&settings, Path::new("/project"));
        assert_eq!(bridge.working_dir, Some(PathBuf::from("/project/scripts")));
        assert_eq!(bridge.program, "python3");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_status_is_the_signal() {
        let ok = ScriptBridge::new("sh", vec!["-c".into(), "exit 0".into()]);
        assert!(ok.export_timeline(&ExportRequest::new("/tmp/x.otio")).await.unwrap());

        let failing = ScriptBridge::new("sh", vec!["-c".into(), "echo nope >&2; exit 1".into()]);
        let imported = failing
            .import_timeline(&ImportRequest::new("/tmp/x.otio", "x"))
            .await
            .unwrap();
        assert!(!imported);
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let bridge = ScriptBridge::new("no-such-bridge-program-xyz", Vec::new());
        let result = bridge.export_timeline(&ExportRequest::new("/tmp/x.otio")).await;
        assert!(matches!(result, Err(CoreError::BridgeError(_))));
    }
}
