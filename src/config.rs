use serde::Deserialize;

use crate::domain::Language;
use crate::engine::executor::DEFAULT_MAX_WORKERS;
use crate::errors::{Result, ScanError};
use crate::extractors::BugKind;

fn default_call_depth() -> usize {
    5
}

fn default_max_symbolic_workers() -> usize {
    num_cpus::get()
}

fn default_max_neural_workers() -> usize {
    DEFAULT_MAX_WORKERS
}

fn default_out_dir() -> String {
    "dfbscan-out".to_string()
}

/// Validates `exclude` as a compilable regex at config-load time, so a typo surfaces
/// immediately instead of during file discovery.
fn validate_exclude(exclude: &Option<String>) -> Result<()> {
    let Some(pattern) = exclude else {
        return Ok(());
    };
    regex::Regex::new(pattern).map_err(|e| ScanError::config(format!("invalid `exclude` pattern {pattern:?}: {e}")))?;
    Ok(())
}

/// Scan settings, loadable from an optional `dfbscan.toml` at the project root and
/// overridable by CLI flags (CLI wins on every field it sets explicitly).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub language: Option<Language>,
    pub bug_type: Option<BugKind>,
    #[serde(default = "default_call_depth")]
    pub call_depth: usize,
    #[serde(default = "default_max_symbolic_workers")]
    pub max_symbolic_workers: usize,
    #[serde(default = "default_max_neural_workers")]
    pub max_neural_workers: usize,
    #[serde(default = "default_out_dir")]
    pub out_dir: String,
    pub model_name: Option<String>,
    pub temperature: Option<f32>,
    /// Regex matched against each discovered file's project-relative path; a match
    /// excludes the file from the scan.
    pub exclude: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            language: None,
            bug_type: None,
            call_depth: default_call_depth(),
            max_symbolic_workers: default_max_symbolic_workers(),
            max_neural_workers: default_max_neural_workers(),
            out_dir: default_out_dir(),
            model_name: None,
            temperature: None,
            exclude: None,
        }
    }
}

impl Config {
    /// Loads `dfbscan.toml` from `project_root` if it exists, otherwise returns the
    /// built-in defaults. A present-but-unparseable file is an error, not a silent
    /// fallback.
    pub fn load(project_root: &std::path::Path) -> Result<Config> {
        let path = project_root.join("dfbscan.toml");
        if !path.exists() {
            return Ok(Config::default());
        }
        let body = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&body).map_err(|e| ScanError::config(format!("{}: {}", path.display(), e)))?;
        validate_exclude(&config.exclude)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.call_depth, default_call_depth());
    }

    #[test]
    fn parses_partial_overrides() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dfbscan.toml"), "call_depth = 8\nout_dir = \"reports\"\n").unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.call_depth, 8);
        assert_eq!(config.out_dir, "reports");
        assert_eq!(config.max_symbolic_workers, default_max_symbolic_workers());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dfbscan.toml"), "not valid toml {{{").unwrap();
        assert!(Config::load(dir.path()).is_err());
    }

    #[test]
    fn invalid_exclude_pattern_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dfbscan.toml"), "exclude = \"(unclosed\"\n").unwrap();
        assert!(Config::load(dir.path()).is_err());
    }

    #[test]
    fn valid_exclude_pattern_loads() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dfbscan.toml"), "exclude = \"_test\\\\.go$\"\n").unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.exclude.as_deref(), Some("_test\\.go$"));
    }
}
