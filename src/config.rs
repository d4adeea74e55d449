//! CLI configuration: flags, then environment, then TOML files, then defaults.

use crate::cli::OutputMode;
use crate::errors::DbError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_DATA_FILE: &str = "books.ndjson";
pub const DEFAULT_COLLECTION: &str = crate::books::COLLECTION;
pub const CONFIG_FILE_NAME: &str = "shelfdb.toml";

/// Fully resolved settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppConfig {
    pub data_file: PathBuf,
    pub collection: String,
    pub log_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_retention: Option<usize>,
    /// Persist `dev6` timing lines to `dev6.log`.
    pub dev_log: bool,
    pub slow_query_ms: Option<u64>,
    pub audit: bool,
    pub output: OutputMode,
}

/// One layer of settings; every field optional. Also the TOML file shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    pub data_file: Option<PathBuf>,
    pub collection: Option<String>,
    pub log_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_retention: Option<usize>,
    pub dev_log: Option<bool>,
    pub slow_query_ms: Option<u64>,
    pub audit: Option<bool>,
    pub output: Option<OutputMode>,
}

impl ConfigLayer {
    /// Fill fields still unset from `lower`.
    fn or(self, lower: Self) -> Self {
        Self {
            data_file: self.data_file.or(lower.data_file),
            collection: self.collection.or(lower.collection),
            log_dir: self.log_dir.or(lower.log_dir),
            log_level: self.log_level.or(lower.log_level),
            log_retention: self.log_retention.or(lower.log_retention),
            dev_log: self.dev_log.or(lower.dev_log),
            slow_query_ms: self.slow_query_ms.or(lower.slow_query_ms),
            audit: self.audit.or(lower.audit),
            output: self.output.or(lower.output),
        }
    }

    /// # Errors
    /// `Io` when unreadable, `Toml` when malformed.
    pub fn from_file(path: &Path) -> Result<Self, DbError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Read the `SHELFDB_*` variables through `env`.
    ///
    /// # Errors
    /// `Config` for an unknown `SHELFDB_OUTPUT` or a non-numeric count.
    pub fn from_env(env: &impl Fn(&str) -> Option<String>) -> Result<Self, DbError> {
        let output = match env("SHELFDB_OUTPUT") {
            Some(s) => Some(s.parse::<OutputMode>()?),
            None => None,
        };
        Ok(Self {
            data_file: env("SHELFDB_DATA").map(PathBuf::from),
            collection: env("SHELFDB_COLLECTION"),
            log_dir: env("SHELFDB_LOG_DIR").map(PathBuf::from),
            log_level: env("SHELFDB_LOG_LEVEL"),
            log_retention: number_var(env, "SHELFDB_LOG_RETENTION")?,
            dev_log: env("SHELFDB_DEV6").map(|s| flag_value(&s)),
            slow_query_ms: number_var(env, "SHELFDB_SLOW_QUERY_MS")?,
            audit: env("SHELFDB_AUDIT").map(|s| flag_value(&s)),
            output,
        })
    }
}

fn flag_value(s: &str) -> bool {
    matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn number_var<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>, DbError> {
    env(name)
        .map(|s| s.trim().parse::<T>().map_err(|_| DbError::Config(format!("{name} must be a number, got {s}"))))
        .transpose()
}

/// Candidate TOML files, highest precedence first.
pub fn config_paths(explicit: Option<&Path>, env: &impl Fn(&str) -> Option<String>) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(p) = explicit {
        paths.push(p.to_path_buf());
    }
    if let Some(p) = env("SHELFDB_CONFIG") {
        paths.push(PathBuf::from(p));
    }
    if let Ok(cur) = std::env::current_dir() {
        paths.push(cur.join(CONFIG_FILE_NAME));
    }
    if let Some(home) = env("HOME").or_else(|| env("USERPROFILE")) {
        paths.push(PathBuf::from(home).join(".config").join(CONFIG_FILE_NAME));
    }
    paths
}

impl AppConfig {
    /// Resolve against the process environment.
    ///
    /// # Errors
    /// See [`AppConfig::resolve`].
    pub fn load(config_file: Option<&Path>, flags: ConfigLayer) -> Result<Self, DbError> {
        Self::resolve(config_file, flags, &|k: &str| std::env::var(k).ok())
    }

    /// Merge `flags` over the environment over every existing config file.
    /// An explicit `config_file` must exist.
    ///
    /// # Errors
    /// Missing explicit config file, malformed TOML, or a bad `SHELFDB_OUTPUT`.
    pub fn resolve(
        config_file: Option<&Path>,
        flags: ConfigLayer,
        env: &impl Fn(&str) -> Option<String>,
    ) -> Result<Self, DbError> {
        if let Some(p) = config_file
            && !p.exists()
        {
            return Err(DbError::Io(format!("config file not found: {}", p.display())));
        }
        let mut merged = flags.or(ConfigLayer::from_env(env)?);
        for path in config_paths(config_file, env) {
            if path.exists() {
                log::debug!("config: reading {}", path.display());
                merged = merged.or(ConfigLayer::from_file(&path)?);
            }
        }
        Ok(Self {
            data_file: merged.data_file.unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_FILE)),
            collection: merged.collection.unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
            log_dir: merged.log_dir,
            log_level: merged.log_level,
            log_retention: merged.log_retention,
            dev_log: merged.dev_log.unwrap_or(false),
            slow_query_ms: merged.slow_query_ms,
            audit: merged.audit.unwrap_or(true),
            output: merged.output.unwrap_or_default(),
        })
    }

    #[must_use]
    pub fn index_metadata_file(&self) -> PathBuf {
        crate::index_metadata_path(&self.data_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = AppConfig::resolve(None, ConfigLayer::default(), &env_of(&[])).unwrap();
        assert_eq!(cfg.data_file, PathBuf::from("books.ndjson"));
        assert_eq!(cfg.collection, "books");
        assert_eq!(cfg.output, OutputMode::Human);
    }

    #[test]
    fn flags_beat_env_beat_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("cfg.toml");
        std::fs::write(&file, "data_file = \"file.ndjson\"\ncollection = \"from_file\"\nlog_level = \"debug\"\n").unwrap();
        let env = env_of(&[("SHELFDB_COLLECTION", "from_env"), ("SHELFDB_OUTPUT", "json")]);
        let flags = ConfigLayer { data_file: Some("flag.ndjson".into()), ..ConfigLayer::default() };
        let cfg = AppConfig::resolve(Some(&file), flags, &env).unwrap();
        assert_eq!(cfg.data_file, PathBuf::from("flag.ndjson"));
        assert_eq!(cfg.collection, "from_env");
        assert_eq!(cfg.log_level.as_deref(), Some("debug"));
        assert_eq!(cfg.output, OutputMode::Json);
    }

    #[test]
    fn explicit_file_beats_home_file() {
        let dir = tempfile::tempdir().unwrap();
        let home_cfg = dir.path().join(".config");
        std::fs::create_dir_all(&home_cfg).unwrap();
        std::fs::write(home_cfg.join(CONFIG_FILE_NAME), "collection = \"home\"\noutput = \"plain\"\n").unwrap();
        let explicit = dir.path().join("explicit.toml");
        std::fs::write(&explicit, "collection = \"explicit\"\n").unwrap();
        let home = dir.path().to_string_lossy().to_string();
        let env = env_of(&[("HOME", home.as_str())]);
        let cfg = AppConfig::resolve(Some(&explicit), ConfigLayer::default(), &env).unwrap();
        assert_eq!(cfg.collection, "explicit");
        assert_eq!(cfg.output, OutputMode::Plain);
    }

    #[test]
    fn bad_inputs_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(AppConfig::resolve(Some(&missing), ConfigLayer::default(), &env_of(&[])).is_err());

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "colection = \"typo\"\n").unwrap();
        assert!(matches!(
            AppConfig::resolve(Some(&bad), ConfigLayer::default(), &env_of(&[])),
            Err(DbError::Toml(_))
        ));

        let env = env_of(&[("SHELFDB_OUTPUT", "yaml")]);
        assert!(matches!(AppConfig::resolve(None, ConfigLayer::default(), &env), Err(DbError::Config(_))));
        for var in ["SHELFDB_SLOW_QUERY_MS", "SHELFDB_LOG_RETENTION"] {
            let env = env_of(&[(var, "soon")]);
            let err = AppConfig::resolve(None, ConfigLayer::default(), &env).unwrap_err();
            assert!(matches!(&err, DbError::Config(m) if m.contains(var)), "{err}");
        }
    }

    #[test]
    fn logging_and_telemetry_settings() {
        let cfg = AppConfig::resolve(None, ConfigLayer::default(), &env_of(&[])).unwrap();
        assert!(!cfg.dev_log);
        assert!(cfg.audit);
        assert_eq!(cfg.slow_query_ms, None);

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("cfg.toml");
        std::fs::write(&file, "log_retention = 3\naudit = false\nslow_query_ms = 50\n").unwrap();
        let env = env_of(&[("SHELFDB_DEV6", "yes"), ("SHELFDB_SLOW_QUERY_MS", "10")]);
        let cfg = AppConfig::resolve(Some(&file), ConfigLayer::default(), &env).unwrap();
        assert!(cfg.dev_log);
        assert!(!cfg.audit);
        assert_eq!(cfg.log_retention, Some(3));
        assert_eq!(cfg.slow_query_ms, Some(10));
    }

    #[test]
    fn sidecar_follows_data_file() {
        let flags = ConfigLayer { data_file: Some("shelf/books.ndjson".into()), ..ConfigLayer::default() };
        let cfg = AppConfig::resolve(None, flags, &env_of(&[])).unwrap();
        assert_eq!(cfg.index_metadata_file(), PathBuf::from("shelf/books.ndjson.indexes.json"));
    }
}
