use std::{
    env, fs,
    path::{Path, PathBuf},
};

use crate::{domain::ChatId, errors::Error, Result};

const CONFIG_FILE: &str = "config.json";
const MAPPINGS_FILE: &str = "mappings.json";
const THREADS_FILE: &str = "threads.json";
const SEEN_FILE: &str = "seen_users.json";

/// Documents written by earlier YAML-based deployments. They are not read.
const LEGACY_FILES: [&str; 4] = [
    "config.yaml",
    "mappings.yaml",
    "threads.yaml",
    "seen_users.yaml",
];

/// Process-level configuration read from the environment.
///
/// Policy settings (admins, banned patterns, default curator) are not here:
/// they live in the persisted policy document and change at runtime.
#[derive(Clone, Debug)]
pub struct Config {
    pub telegram_bot_token: String,
    pub data_dir: PathBuf,

    /// Ids merged into the persisted admin list at startup.
    pub bootstrap_admins: Vec<ChatId>,
    pub startup_notice: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN")
            .and_then(non_empty)
            .or_else(|| env_str("BOT_TOKEN").and_then(non_empty))
            .ok_or_else(|| {
                Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
            })?;

        let data_dir = env_path("RELAY_DATA_DIR").unwrap_or_else(|| PathBuf::from("data"));
        fs::create_dir_all(&data_dir)?;

        let bootstrap_admins = parse_csv_i64(env_str("RELAY_ADMINS"))
            .into_iter()
            .map(ChatId)
            .collect();
        let startup_notice = env_bool("RELAY_STARTUP_NOTICE").unwrap_or(true);

        Ok(Self {
            telegram_bot_token,
            data_dir,
            bootstrap_admins,
            startup_notice,
        })
    }

    /// Configuration rooted at `data_dir` with no token, for tools and tests.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            telegram_bot_token: String::new(),
            data_dir: data_dir.into(),
            bootstrap_admins: Vec::new(),
            startup_notice: false,
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE)
    }

    pub fn mappings_file(&self) -> PathBuf {
        self.data_dir.join(MAPPINGS_FILE)
    }

    pub fn threads_file(&self) -> PathBuf {
        self.data_dir.join(THREADS_FILE)
    }

    pub fn seen_file(&self) -> PathBuf {
        self.data_dir.join(SEEN_FILE)
    }

    /// Legacy YAML documents present in the data directory.
    pub fn legacy_documents(&self) -> Vec<PathBuf> {
        LEGACY_FILES
            .iter()
            .map(|f| self.data_dir.join(f))
            .filter(|p| p.is_file())
            .collect()
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() || env::var_os(key).is_some() {
            continue;
        }

        let mut val = v.trim().to_string();
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
