//! Configuration handling for dutstub
//!
//! Settings come from `.dutstub.toml` in the project directory, or from
//! `<user config dir>/dutstub/config.toml` when the project has none. A
//! missing file yields defaults; a malformed one is a configuration error.
//!
//! ```toml
//! [discovery]
//! max_depth = 50
//!
//! [render]
//! flat_hierarchy = true
//! class_suffix = "Handle"
//!
//! [simulator]
//! dumper = ["python3", "dump_hierarchy.py", "{top}"]
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::DutError;
use crate::types::RenderOptions;

/// Project configuration file name.
pub const CONFIG_FILE_NAME: &str = ".dutstub.toml";

/// dutstub configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Walker settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Depth bound below the root
    #[serde(default = "default_max_depth")]
    pub max_depth: i64,

    /// Keep compile-time constants
    #[serde(default)]
    pub include_constants: bool,
}

/// Renderer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default)]
    pub flat_hierarchy: bool,

    #[serde(default)]
    pub include_metadata: bool,

    #[serde(default = "default_true")]
    pub include_arrays: bool,

    #[serde(default = "default_true")]
    pub include_docstrings: bool,

    #[serde(default)]
    pub class_prefix: String,

    #[serde(default)]
    pub class_suffix: String,
}

/// Simulator collaborator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Simulator used when `--simulator` is not given
    #[serde(default)]
    pub preferred: Option<String>,

    /// Hierarchy dumper command; `{top}`, `{project}` and `{simulator}` are
    /// substituted before spawning
    #[serde(default)]
    pub dumper: Vec<String>,

    /// Dumper timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Artifact placement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output directory, relative to the project directory
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

fn default_max_depth() -> i64 {
    50
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            include_constants: false,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            flat_hierarchy: false,
            include_metadata: false,
            include_arrays: default_true(),
            include_docstrings: default_true(),
            class_prefix: String::new(),
            class_suffix: String::new(),
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            preferred: None,
            dumper: Vec::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

impl RenderConfig {
    /// Render options seeded from this section.
    pub fn to_options(&self) -> RenderOptions {
        RenderOptions {
            flat_hierarchy: self.flat_hierarchy,
            include_metadata: self.include_metadata,
            include_arrays: self.include_arrays,
            include_docstrings: self.include_docstrings,
            class_prefix: self.class_prefix.clone(),
            class_suffix: self.class_suffix.clone(),
            ..RenderOptions::default()
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, DutError> {
        let content = fs::read_to_string(path).map_err(|e| {
            DutError::configuration(format!(
                "failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            DutError::configuration(format!(
                "failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `<project>/.dutstub.toml`, falling back to the user config
    /// file, then to defaults.
    pub fn load_from_project(project_root: &Path) -> Result<Self, DutError> {
        let project_file = project_root.join(CONFIG_FILE_NAME);
        if project_file.is_file() {
            return Self::load(&project_file);
        }
        if let Some(user_file) = user_config_path() {
            if user_file.is_file() {
                return Self::load(&user_file);
            }
        }
        Ok(Config::default())
    }

    /// Resolve configuration: an explicit file wins and must exist.
    pub fn resolve(explicit: Option<&Path>, project_root: &Path) -> Result<Self, DutError> {
        match explicit {
            Some(path) => Self::load(path),
            None => Self::load_from_project(project_root),
        }
    }

    /// Reject values that can never drive a discovery.
    pub fn validate(&self) -> Result<(), DutError> {
        if self.discovery.max_depth <= 0 {
            return Err(DutError::configuration(format!(
                "discovery.max_depth must be positive, got {}",
                self.discovery.max_depth
            )));
        }
        if self.simulator.timeout_secs == 0 {
            return Err(DutError::configuration(
                "simulator.timeout_secs must be positive",
            ));
        }
        Ok(())
    }

    /// Output directory resolved against the project directory.
    pub fn output_dir(&self, project_root: &Path) -> PathBuf {
        if self.output.dir.is_absolute() {
            self.output.dir.clone()
        } else {
            project_root.join(&self.output.dir)
        }
    }
}

/// `<user config dir>/dutstub/config.toml`, when the platform has one.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("dutstub").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.discovery.max_depth, 50);
        assert!(!config.discovery.include_constants);
        assert!(config.render.include_arrays);
        assert!(config.render.include_docstrings);
        assert_eq!(config.simulator.timeout_secs, 30);
        assert_eq!(config.output.dir, PathBuf::from("."));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str("[render]\nflat_hierarchy = true\n").unwrap();
        assert!(config.render.flat_hierarchy);
        assert!(config.render.include_arrays);
        assert_eq!(config.discovery.max_depth, 50);
    }

    #[test]
    fn test_load_from_project() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join(CONFIG_FILE_NAME),
            "[discovery]\nmax_depth = 7\n\n[simulator]\ndumper = [\"dump\", \"{top}\"]\n",
        )
        .unwrap();
        let config = Config::load_from_project(temp.path()).unwrap();
        assert_eq!(config.discovery.max_depth, 7);
        assert_eq!(config.simulator.dumper, vec!["dump", "{top}"]);
    }

    #[test]
    fn test_malformed_file_is_configuration_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.toml");
        fs::write(&path, "[discovery\nmax_depth = ").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn test_non_positive_depth_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("zero.toml");
        fs::write(&path, "[discovery]\nmax_depth = 0\n").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("max_depth"));
    }

    #[test]
    fn test_explicit_missing_file_fails() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope.toml");
        assert!(Config::resolve(Some(&missing), temp.path()).is_err());
    }

    #[test]
    fn test_render_options_from_config() {
        let mut config = Config::default();
        config.render.class_prefix = "Dut".to_string();
        let options = config.render.to_options();
        assert_eq!(options.class_prefix, "Dut");
        assert!(!options.flat_hierarchy);
    }

    #[test]
    fn test_output_dir_relative_to_project() {
        let mut config = Config::default();
        config.output.dir = PathBuf::from("stubs");
        assert_eq!(
            config.output_dir(Path::new("/proj")),
            PathBuf::from("/proj/stubs")
        );
    }
}
