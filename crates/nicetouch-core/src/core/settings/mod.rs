//! Pipeline Configuration
//!
//! Provides the persistent pipeline configuration with:
//! - Atomic file writes (temp file + rename)
//! - Schema defaults for every section
//! - Normalization of bad values instead of failure
//!
//! Storage location: `{project_root}/nicetouch.json`, falling back to
//! `{config_dir}/nicetouch/nicetouch.json`. The configuration is loaded once at
//! process start and handed to each component by reference.

use serde::{Deserialize, Serialize};
use std::fs;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::core::interchange::{
    AudioSynthesisOptions, MetadataWritePolicy, PatchOptions, RebuildOptions, RebuildStrategy,
    UnflattenRules,
};
use crate::core::interchange::metadata::RESOLVE_NAMESPACE;
use crate::core::{fs as core_fs, CoreError, CoreResult};

/// Config schema version for migration support
pub const CONFIG_VERSION: u32 = 1;

/// Config file name
pub const CONFIG_FILE: &str = "nicetouch.json";

/// Lock file name (advisory lock to prevent concurrent writers)
pub const CONFIG_LOCK_FILE: &str = "nicetouch.json.lock";

/// Environment variable overriding the project root
pub const PROJECT_ROOT_ENV: &str = "NICETOUCH_PROJECT_ROOT";

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Schema version for migrations
    #[serde(default = "default_version")]
    pub version: u32,

    /// Staging directories and project files
    #[serde(default)]
    pub paths: PathSettings,

    /// Export stage settings
    #[serde(default)]
    pub export: ExportSettings,

    /// Import stage settings
    #[serde(default)]
    pub import: ImportSettings,

    /// JSON -> OTIO rebuild settings
    #[serde(default)]
    pub rebuild: RebuildSettings,

    /// External NLE bridge process
    #[serde(default)]
    pub bridge: BridgeSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            paths: PathSettings::default(),
            export: ExportSettings::default(),
            import: ImportSettings::default(),
            rebuild: RebuildSettings::default(),
            bridge: BridgeSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl PipelineConfig {
    /// Normalizes and clamps settings so the pipeline always sees valid values.
    ///
    /// This is intentionally tolerant: it corrects bad values instead of failing,
    /// so a hand-edited config cannot wedge the pipeline.
    pub fn normalize(&mut self) {
        self.version = CONFIG_VERSION;

        normalize_rel_path(&mut self.paths.reference_dir, default_reference_dir);
        normalize_rel_path(&mut self.paths.edited_dir, default_edited_dir);
        normalize_rel_path(&mut self.paths.project_data_file, default_project_data_file);

        self.export.header_sniff_bytes = self.export.header_sniff_bytes.clamp(64, 65_536);
        if self.export.fallback_name.trim().is_empty() {
            self.export.fallback_name = default_fallback_name();
        }

        let mut extensions: Vec<String> = self
            .rebuild
            .audio
            .video_extensions
            .iter()
            .map(|ext| ext.trim().to_ascii_lowercase())
            .filter(|ext| !ext.is_empty() && ext != ".")
            .map(|ext| {
                if ext.starts_with('.') {
                    ext
                } else {
                    format!(".{ext}")
                }
            })
            .collect();
        extensions.sort();
        extensions.dedup();
        self.rebuild.audio.video_extensions = extensions;

        self.rebuild
            .namespace_prefixes
            .retain(|p| !p.trim().is_empty());

        if self.bridge.program.trim().is_empty() {
            self.bridge.program = default_bridge_program();
        }

        self.logging.level = normalize_enum(
            &self.logging.level,
            &["trace", "debug", "info", "warn", "error"],
            default_log_level(),
        );
    }

    /// Rebuild options for the from-scratch strategy
    pub fn rebuild_options(&self) -> RebuildOptions {
        RebuildOptions::default()
            .with_audio(self.rebuild.audio.clone())
            .with_unflatten(self.unflatten_rules())
    }

    /// Options for the patch strategy
    pub fn patch_options(&self) -> PatchOptions {
        PatchOptions {
            metadata_policy: self.rebuild.metadata_policy,
            unflatten: self.unflatten_rules(),
        }
    }

    fn unflatten_rules(&self) -> UnflattenRules {
        UnflattenRules {
            namespace_prefixes: self.rebuild.namespace_prefixes.clone(),
            ..UnflattenRules::default()
        }
    }
}

fn normalize_rel_path(value: &mut String, fallback: fn() -> String) {
    if value.trim().is_empty() {
        *value = fallback();
    }
}

fn normalize_enum(value: &str, allowed: &[&str], fallback: String) -> String {
    if allowed.iter().any(|v| v.eq_ignore_ascii_case(value)) {
        value.to_ascii_lowercase()
    } else {
        fallback
    }
}

// =============================================================================
// Sections
// =============================================================================

/// Staging layout, relative to the project root unless absolute
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PathSettings {
    #[serde(default = "default_reference_dir")]
    pub reference_dir: String,
    #[serde(default = "default_edited_dir")]
    pub edited_dir: String,
    #[serde(default = "default_project_data_file")]
    pub project_data_file: String,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            reference_dir: default_reference_dir(),
            edited_dir: default_edited_dir(),
            project_data_file: default_project_data_file(),
        }
    }
}

fn default_reference_dir() -> String {
    "data/timelineprocessing/timeline_ref".to_string()
}

fn default_edited_dir() -> String {
    "data/timelineprocessing/timeline_edited".to_string()
}

fn default_project_data_file() -> String {
    "data/projectdata.json".to_string()
}

impl PathSettings {
    pub fn reference_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.reference_dir)
    }

    pub fn edited_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.edited_dir)
    }

    pub fn project_data_file(&self, root: &Path) -> PathBuf {
        root.join(&self.project_data_file)
    }
}

/// Export stage settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportSettings {
    /// File stem used when no timeline name is given
    #[serde(default = "default_fallback_name")]
    pub fallback_name: String,
    /// How much of the exported file to inspect for an OTIO signature
    #[serde(default = "default_header_sniff_bytes")]
    pub header_sniff_bytes: usize,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            fallback_name: default_fallback_name(),
            header_sniff_bytes: default_header_sniff_bytes(),
        }
    }
}

fn default_fallback_name() -> String {
    "timeline".to_string()
}

fn default_header_sniff_bytes() -> usize {
    1000
}

/// Import stage settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImportSettings {
    #[serde(default)]
    pub strategy: RebuildStrategy,
    /// Ask the NLE to import source clips into the media pool
    #[serde(default = "default_false")]
    pub import_source_clips: bool,
    /// Repeat a failed import once with source clips enabled
    #[serde(default = "default_true")]
    pub fallback_to_source_clips: bool,
    #[serde(default)]
    pub source_clips_path: Option<String>,
    #[serde(default)]
    pub source_clips_folders: Vec<String>,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            strategy: RebuildStrategy::default(),
            import_source_clips: false,
            fallback_to_source_clips: true,
            source_clips_path: None,
            source_clips_folders: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

/// Rebuild settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RebuildSettings {
    #[serde(default)]
    pub audio: AudioSynthesisOptions,
    /// Metadata namespaces that split after the prefix when unflattening
    #[serde(default = "default_namespace_prefixes")]
    pub namespace_prefixes: Vec<String>,
    /// Patch strategy handling of bad metadata keys
    #[serde(default)]
    pub metadata_policy: MetadataWritePolicy,
}

impl Default for RebuildSettings {
    fn default() -> Self {
        Self {
            audio: AudioSynthesisOptions::default(),
            namespace_prefixes: default_namespace_prefixes(),
            metadata_policy: MetadataWritePolicy::default(),
        }
    }
}

fn default_namespace_prefixes() -> Vec<String> {
    vec![RESOLVE_NAMESPACE.to_string()]
}

/// External bridge process settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BridgeSettings {
    /// Program to run, e.g. a Python interpreter
    #[serde(default = "default_bridge_program")]
    pub program: String,
    /// Arguments placed before the bridge subcommand
    #[serde(default = "default_bridge_args")]
    pub args: Vec<String>,
    /// Working directory, relative to the project root unless absolute
    #[serde(default)]
    pub working_dir: Option<String>,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            program: default_bridge_program(),
            args: default_bridge_args(),
            working_dir: None,
        }
    }
}

fn default_bridge_program() -> String {
    "python3".to_string()
}

fn default_bridge_args() -> Vec<String> {
    vec!["resolve_bridge.py".to_string()]
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory for daily-rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

// =============================================================================
// Project Root
// =============================================================================

/// Picks the project root: explicit value, then the environment, then the working directory.
pub fn resolve_project_root(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| std::env::var_os(PROJECT_ROOT_ENV).map(PathBuf::from))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

// =============================================================================
// Config Manager
// =============================================================================

/// Config manager for loading and saving the pipeline configuration
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a config manager for an explicit config file
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// Use `{project_root}/nicetouch.json` if it exists, else the user config dir.
    pub fn discover(project_root: &Path) -> Self {
        let local = project_root.join(CONFIG_FILE);
        if local.exists() {
            return Self::new(local);
        }
        match dirs::config_dir() {
            Some(dir) => {
                let global = dir.join("nicetouch").join(CONFIG_FILE);
                if global.exists() {
                    Self::new(global)
                } else {
                    Self::new(local)
                }
            }
            None => Self::new(local),
        }
    }

    fn lock_path(&self) -> PathBuf {
        self.config_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(CONFIG_LOCK_FILE)
    }

    fn with_lock<T>(&self, exclusive: bool, op: impl FnOnce() -> CoreResult<T>) -> CoreResult<T> {
        // Ensure parent directory exists so the lock file can be created.
        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())
            .map_err(|e| CoreError::ConfigError(format!("Failed to open config lock file: {e}")))?;

        if exclusive {
            fs2::FileExt::lock_exclusive(&lock_file).map_err(|e| {
                CoreError::ConfigError(format!("Failed to lock config file (exclusive): {e}"))
            })?;
        } else {
            fs2::FileExt::lock_shared(&lock_file).map_err(|e| {
                CoreError::ConfigError(format!("Failed to lock config file (shared): {e}"))
            })?;
        }

        let result = op();

        if let Err(e) = fs2::FileExt::unlock(&lock_file) {
            warn!("Failed to unlock config lock file: {}", e);
        }

        result
    }

    /// Get the config file path
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the config, failing on unreadable or unparsable files.
    pub fn try_load(&self) -> CoreResult<PipelineConfig> {
        self.with_lock(false, || {
            if !self.config_path.exists() {
                info!("Config file not found, using defaults");
                return Ok(PipelineConfig::default());
            }

            let content = fs::read_to_string(&self.config_path)?;
            let mut config = serde_json::from_str::<PipelineConfig>(&content).map_err(|e| {
                CoreError::ConfigError(format!(
                    "Failed to parse {}: {e}",
                    self.config_path.display()
                ))
            })?;

            if config.version < CONFIG_VERSION {
                info!(
                    "Migrating config from version {} to {}",
                    config.version, CONFIG_VERSION
                );
            }

            config.normalize();
            Ok(config)
        })
    }

    /// Load the config, returning defaults if it cannot be read
    pub fn load(&self) -> PipelineConfig {
        match self.try_load() {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load config, using defaults: {}", e);
                PipelineConfig::default()
            }
        }
    }

    /// Save the config atomically and return the normalized copy that was written
    pub fn save(&self, config: &PipelineConfig) -> CoreResult<PipelineConfig> {
        self.with_lock(true, || {
            let mut normalized = config.clone();
            normalized.normalize();
            core_fs::atomic_write_json_pretty(&self.config_path, &normalized)?;
            info!("Config saved to {:?}", self.config_path);
            Ok(normalized)
        })
    }
}
