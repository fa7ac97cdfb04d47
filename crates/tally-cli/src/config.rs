use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tally_core::{ProjectRoster, DEFAULT_UOM};
use tally_storage::StoreOptions;

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TallyConfig {
    pub database: Option<PathBuf>,
    pub log_level: Option<String>,
    pub catalog: CatalogConfig,
    pub reconcile: ReconcileConfig,
    /// Project id to the user ids allowed to take count tasks.
    pub members: BTreeMap<String, Vec<String>>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub default_uom: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            default_uom: DEFAULT_UOM.to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub keep_variance_reasons: bool,
}

impl TallyConfig {
    pub fn store_options(&self) -> StoreOptions {
        let default_uom = self.catalog.default_uom.trim();
        StoreOptions {
            default_uom: if default_uom.is_empty() {
                DEFAULT_UOM.to_string()
            } else {
                default_uom.to_string()
            },
            keep_variance_reasons: self.reconcile.keep_variance_reasons,
        }
    }

    pub fn roster(&self) -> ProjectRoster {
        self.members
            .iter()
            .map(|(project_id, users)| (project_id.clone(), users.clone()))
            .collect()
    }

    /// `--database` wins over the configured path, which wins over the
    /// per-user data directory.
    pub fn database_path(&self, explicit: Option<&Path>) -> PathBuf {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| self.database.clone())
            .unwrap_or_else(default_database_path)
    }
}

pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(path) = env::var("TALLY_CONFIG_PATH") {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tally/config.toml")
}

fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tally/inventory.db")
}

/// Reads the TOML config; a missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<TallyConfig> {
    if !path.exists() {
        return Ok(TallyConfig::default());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tally_core::MemberDirectory;
    use tempfile::NamedTempFile;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = load_config(&dir.path().join("absent.toml")).expect("load");
        assert_eq!(config.database, None);
        assert_eq!(config.store_options(), StoreOptions::default());
        assert!(config.members.is_empty());
    }

    #[test]
    fn parses_every_section() {
        let mut file = NamedTempFile::new().expect("temp config");
        write!(
            file,
            r#"
database = "/tmp/tally.db"
log_level = "debug"

[catalog]
default_uom = "EA"

[reconcile]
keep_variance_reasons = true

[members]
"proj-1" = ["ana", "luis"]
"#
        )
        .expect("write config");

        let config = load_config(file.path()).expect("load");
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(
            config.database_path(None),
            PathBuf::from("/tmp/tally.db")
        );
        assert_eq!(
            config.database_path(Some(Path::new("override.db"))),
            PathBuf::from("override.db")
        );

        let options = config.store_options();
        assert_eq!(options.default_uom, "EA");
        assert!(options.keep_variance_reasons);

        let roster = config.roster();
        assert!(roster.is_member("proj-1", "luis"));
        assert!(!roster.is_member("proj-2", "luis"));
    }

    #[test]
    fn blank_unit_falls_back_to_default() {
        let config: TallyConfig = toml::from_str("[catalog]\ndefault_uom = \" \"\n").expect("parse");
        assert_eq!(config.store_options().default_uom, DEFAULT_UOM);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = NamedTempFile::new().expect("temp config");
        write!(file, "database = [").expect("write config");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn explicit_config_path_wins() {
        assert_eq!(
            config_path(Some(Path::new("/etc/tally.toml"))),
            PathBuf::from("/etc/tally.toml")
        );
    }
}
