//! Process configuration, read once from the environment at startup.

use anyhow::Context;
use std::path::PathBuf;

use crate::registry::SubjectRegistry;

pub const ENV_LOG: &str = "RESULTSD_LOG";
pub const ENV_WORKSPACE: &str = "RESULTSD_WORKSPACE";
pub const ENV_SUBJECTS: &str = "RESULTSD_SUBJECTS";

pub const DEFAULT_LOG_FILTER: &str = "resultsd=info";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub log_filter: String,
    /// Workspace opened before the first request, if any.
    pub workspace: Option<PathBuf>,
    /// TOML subject registry replacing the built-in one.
    pub subjects_file: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());
        Self {
            log_filter: get(ENV_LOG).unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            workspace: get(ENV_WORKSPACE).map(PathBuf::from),
            subjects_file: get(ENV_SUBJECTS).map(PathBuf::from),
        }
    }

    /// The registry for this process: the override file when configured,
    /// the built-in table otherwise.
    pub fn load_registry(&self) -> anyhow::Result<SubjectRegistry> {
        let Some(path) = &self.subjects_file else {
            return Ok(SubjectRegistry::builtin());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
        SubjectRegistry::from_toml_str(&text)
            .with_context(|| format!("invalid subject registry {}", path.to_string_lossy()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = Config::from_lookup(lookup(&[]));
        assert_eq!(cfg.log_filter, DEFAULT_LOG_FILTER);
        assert_eq!(cfg.workspace, None);
        assert_eq!(cfg.subjects_file, None);
        assert_eq!(cfg.load_registry().unwrap().default_class(), "Grade 1");
    }

    #[test]
    fn reads_values_and_ignores_blanks() {
        let cfg = Config::from_lookup(lookup(&[
            (ENV_LOG, "resultsd=debug"),
            (ENV_WORKSPACE, "/tmp/ws"),
            (ENV_SUBJECTS, "  "),
        ]));
        assert_eq!(cfg.log_filter, "resultsd=debug");
        assert_eq!(cfg.workspace, Some(PathBuf::from("/tmp/ws")));
        assert_eq!(cfg.subjects_file, None);
    }

    #[test]
    fn missing_registry_file_is_an_error() {
        let cfg = Config::from_lookup(lookup(&[(ENV_SUBJECTS, "/nonexistent/subjects.toml")]));
        assert!(cfg.load_registry().is_err());
    }
}
