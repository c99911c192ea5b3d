//! Runtime configuration.
//!
//! Values come from environment variables, with CLI flags layered on top in
//! `main`:
//! - `TIMETURN_PORT` - HTTP port (default: 3000)
//! - `TIMETURN_DB` - SQLite path (default: platform data dir)
//! - `TIMETURN_PROVIDER` - default LLM provider (`gemini`, `openai`, `anthropic`)
//! - `TIMETURN_HISTORY_LIMIT` - prior messages sent with each turn (default: 20)
//! - `TIMETURN_DEBOUNCE_MS` - state write debounce (default: 500)
//! - `TIMETURN_CHARACTER` - the assistant character's name
//! - `TIMETURN_RULES` - detection rules JSON (default: `<config dir>/timeturn/rules.json`)

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use dirs::config_dir;

use crate::dialogue::{DetectionRules, RulesConfig};
use crate::llm::ProviderKind;
use crate::writer::DEFAULT_DEBOUNCE;

const APP_NAME: &str = "timeturn";
const RULES_FILE: &str = "rules.json";

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_HISTORY_LIMIT: usize = 20;
pub const DEFAULT_CHARACTER: &str = "ときお";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// `None` uses [`crate::db::default_path`].
    pub db_path: Option<PathBuf>,
    pub provider: ProviderKind,
    pub history_limit: usize,
    pub debounce: Duration,
    pub character: String,
    /// `None` uses `<config dir>/timeturn/rules.json` when it exists.
    pub rules_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            db_path: None,
            provider: ProviderKind::default(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            debounce: DEFAULT_DEBOUNCE,
            character: DEFAULT_CHARACTER.to_string(),
            rules_path: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        let provider = match var("TIMETURN_PROVIDER") {
            Some(name) => ProviderKind::from_str(&name).unwrap_or_else(|| {
                tracing::warn!(%name, "unknown TIMETURN_PROVIDER, using default");
                defaults.provider
            }),
            None => defaults.provider,
        };

        Self {
            port: parse_var("TIMETURN_PORT").unwrap_or(defaults.port),
            db_path: var("TIMETURN_DB").map(PathBuf::from),
            provider,
            history_limit: parse_var("TIMETURN_HISTORY_LIMIT").unwrap_or(defaults.history_limit),
            debounce: parse_var("TIMETURN_DEBOUNCE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.debounce),
            character: var("TIMETURN_CHARACTER").unwrap_or(defaults.character),
            rules_path: var("TIMETURN_RULES").map(PathBuf::from),
        }
    }

    /// Compile the detection rules. The built-ins are used when no rules file
    /// exists, or when the file cannot be read, parsed, or compiled.
    pub fn load_rules(&self) -> DetectionRules {
        let path = match &self.rules_path {
            Some(path) => path.clone(),
            None => match default_rules_path() {
                Some(path) if path.exists() => path,
                _ => return DetectionRules::default(),
            },
        };
        load_rules_from(&path).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %format!("{:#}", e), "using built-in detection rules");
            DetectionRules::default()
        })
    }
}

pub fn load_rules_from(path: &Path) -> Result<DetectionRules> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read rules file {}", path.display()))?;
    let config: RulesConfig = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse rules file {}", path.display()))?;
    let rules = config.compile()?;
    tracing::info!("Loaded detection rules from {}", path.display());
    Ok(rules)
}

fn default_rules_path() -> Option<PathBuf> {
    let mut path = config_dir()?;
    path.push(APP_NAME);
    path.push(RULES_FILE);
    Some(path)
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(%name, %raw, "ignoring unparsable value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn rules_file_overrides_tables() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "affirmative": ["^やる$"] }}"#).unwrap();

        let config = Config {
            rules_path: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let rules = config.load_rules();
        assert!(rules.is_affirmative("やる"));
        assert!(!rules.is_affirmative("お願いします"));
    }

    #[test]
    fn invalid_rules_file_reports_the_table() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "motivation": ["(oops"] }}"#).unwrap();

        let err = load_rules_from(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("motivation"));
    }

    #[test]
    fn invalid_rules_file_falls_back_to_built_ins() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "affirmative": ["(oops"] }}"#).unwrap();

        let config = Config {
            rules_path: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let rules = config.load_rules();
        assert!(rules.is_affirmative("お願いします"));
    }

    #[test]
    fn missing_explicit_rules_file_falls_back_to_built_ins() {
        let config = Config {
            rules_path: Some(PathBuf::from("/nonexistent/timeturn/rules.json")),
            ..Default::default()
        };
        assert!(config.load_rules().is_affirmative("お願いします"));
    }

    #[test]
    fn malformed_json_falls_back_to_built_ins() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let config = Config {
            rules_path: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        assert!(config.load_rules().is_affirmative("お願いします"));
    }
}
