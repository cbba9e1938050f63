//! Optional TOML configuration for `generate`.
//!
//! ```toml
//! [merge]
//! missing_marker = "??"
//! source_timeout_ms = 10000
//! jobs = 4
//!
//! [output]
//! format = "xml"
//! pattern = "out/invoice_{CustomerId}"
//! ```
//!
//! Command-line flags override file values, which override defaults.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use autoreport_merge::MergeOptions;
use autoreport_report::OutputFormat;

pub const CONFIG_ENV: &str = "AUTOREPORT_CONFIG";
pub const CONFIG_FILE: &str = "autoreport.toml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub merge: MergeSection,
    pub output: OutputSection,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MergeSection {
    #[serde(flatten)]
    pub options: MergeOptions,
    pub jobs: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    pub format: Option<OutputFormat>,
    pub pattern: Option<String>,
}

/// Picks the configuration file: the explicit path, then `env`, then
/// `autoreport.toml` in the workbook directory if it exists.
pub fn locate_config(
    explicit: Option<&Path>,
    env: Option<OsString>,
    workbook: &Path,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(value) = env
        && !value.is_empty()
    {
        return Some(PathBuf::from(value));
    }
    let beside = workbook.join(CONFIG_FILE);
    beside.is_file().then_some(beside)
}

pub fn parse_config(text: &str) -> Result<FileConfig> {
    Ok(toml::from_str(text)?)
}

pub fn load_config(path: &Path) -> Result<FileConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    let config =
        parse_config(&text).with_context(|| format!("parse config {}", path.display()))?;
    debug!(path = %path.display(), "configuration loaded");
    Ok(config)
}

/// Loads the located configuration, or defaults when there is none.
pub fn resolve_config(explicit: Option<&Path>, workbook: &Path) -> Result<FileConfig> {
    match locate_config(explicit, std::env::var_os(CONFIG_ENV), workbook) {
        Some(path) => load_config(&path),
        None => Ok(FileConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_tables() {
        let config = parse_config(
            r#"
            [merge]
            missing_marker = "??"
            source_timeout_ms = 500
            jobs = 3

            [output]
            format = "json"
            pattern = "out/{index}"
            "#,
        )
        .unwrap();
        assert_eq!(config.merge.options.missing_marker, "??");
        assert_eq!(config.merge.options.source_timeout_ms, 500);
        assert_eq!(config.merge.jobs, Some(3));
        assert_eq!(config.output.format, Some(OutputFormat::Json));
        assert_eq!(config.output.pattern.as_deref(), Some("out/{index}"));
    }

    #[test]
    fn missing_tables_use_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config, FileConfig::default());
        assert_eq!(
            config.merge.options.source_timeout_ms,
            autoreport_merge::DEFAULT_SOURCE_TIMEOUT_MS
        );
    }

    #[test]
    fn rejects_unknown_format() {
        assert!(parse_config("[output]\nformat = \"pdf\"").is_err());
    }

    #[test]
    fn lookup_order() {
        let dir = tempfile::tempdir().unwrap();
        let explicit = Path::new("/tmp/explicit.toml");

        assert_eq!(
            locate_config(Some(explicit), Some("env.toml".into()), dir.path()),
            Some(explicit.to_path_buf())
        );
        assert_eq!(
            locate_config(None, Some("env.toml".into()), dir.path()),
            Some(PathBuf::from("env.toml"))
        );
        assert_eq!(locate_config(None, None, dir.path()), None);

        fs::write(dir.path().join(CONFIG_FILE), "").unwrap();
        assert_eq!(
            locate_config(None, None, dir.path()),
            Some(dir.path().join(CONFIG_FILE))
        );
    }
}
