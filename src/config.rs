use std::path::PathBuf;

pub const ENV_LOG_LEVEL: &str = "ATTENDANCED_LOG";
pub const ENV_LOG_DIR: &str = "ATTENDANCED_LOG_DIR";
pub const ENV_WORKSPACE: &str = "ATTENDANCED_WORKSPACE";

const DEFAULT_LOG_LEVEL: &str = "info";

/// Start-up settings read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
    pub workspace: Option<PathBuf>,
}

impl DaemonConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            log_level: non_empty(ENV_LOG_LEVEL).unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            log_dir: non_empty(ENV_LOG_DIR).map(PathBuf::from),
            workspace: non_empty(ENV_WORKSPACE).map(PathBuf::from),
        }
    }
}
