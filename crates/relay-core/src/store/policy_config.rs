use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{domain::ChatId, errors::Error, Result};

use super::JsonDocument;

/// `@username` mentions.
pub const USERNAME_PATTERN: &str = r"@[A-Za-z0-9_]{3,32}";
/// Phone-like digit runs.
pub const PHONE_PATTERN: &str = r"\+?\d[\d\s\-]{7,}\b";

const DEFAULT_TICKET_PREFIX: &str = "S";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branding {
    #[serde(default = "default_ticket_prefix")]
    pub student_tag_prefix: String,
}

impl Default for Branding {
    fn default() -> Self {
        Self {
            student_tag_prefix: default_ticket_prefix(),
        }
    }
}

fn default_ticket_prefix() -> String {
    DEFAULT_TICKET_PREFIX.to_string()
}

/// The persisted policy document (`config.json`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub admins: Vec<i64>,
    #[serde(default)]
    pub banned_regex: Vec<String>,
    #[serde(default)]
    pub default_curator: Option<i64>,
    #[serde(default)]
    pub branding: Branding,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            admins: Vec::new(),
            banned_regex: vec![USERNAME_PATTERN.to_string(), PHONE_PATTERN.to_string()],
            default_curator: None,
            branding: Branding::default(),
        }
    }
}

impl PolicyConfig {
    pub fn is_admin(&self, id: ChatId) -> bool {
        self.admins.contains(&id.0)
    }

    pub fn admin_ids(&self) -> Vec<ChatId> {
        self.admins.iter().copied().map(ChatId).collect()
    }

    pub fn default_handler(&self) -> Option<ChatId> {
        self.default_curator.map(ChatId)
    }

    pub fn ticket_prefix(&self) -> &str {
        &self.branding.student_tag_prefix
    }
}

/// Admins, banned patterns, default curator and ticket branding.
pub struct ConfigStore {
    doc: JsonDocument<PolicyConfig>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            doc: JsonDocument::new(path),
        }
    }

    pub async fn load(&self) -> Result<PolicyConfig> {
        self.doc.read().await
    }

    pub async fn save(&self, cfg: &PolicyConfig) -> Result<()> {
        self.doc.replace(cfg).await
    }

    pub async fn is_admin(&self, id: ChatId) -> Result<bool> {
        Ok(self.load().await?.is_admin(id))
    }

    /// Append a pattern; returns its index.
    pub async fn add_pattern(&self, pattern: &str) -> Result<usize> {
        self.doc
            .update(|cfg| {
                cfg.banned_regex.push(pattern.to_string());
                cfg.banned_regex.len() - 1
            })
            .await
    }

    /// Remove the pattern at `index`; returns it.
    pub async fn remove_pattern(&self, index: usize) -> Result<String> {
        self.doc
            .try_update(|cfg| {
                let len = cfg.banned_regex.len();
                if index >= len {
                    return Err(Error::IndexOutOfRange { index, len });
                }
                Ok(cfg.banned_regex.remove(index))
            })
            .await
    }

    pub async fn set_default_handler(&self, id: ChatId) -> Result<()> {
        self.doc
            .update(|cfg| cfg.default_curator = Some(id.0))
            .await
    }

    /// Returns `true` if the id was not an admin yet.
    pub async fn add_admin(&self, id: ChatId) -> Result<bool> {
        self.doc
            .update(|cfg| {
                if cfg.admins.contains(&id.0) {
                    return false;
                }
                cfg.admins.push(id.0);
                true
            })
            .await
    }

    /// Returns `true` if the id was an admin.
    pub async fn remove_admin(&self, id: ChatId) -> Result<bool> {
        self.doc
            .update(|cfg| {
                let before = cfg.admins.len();
                cfg.admins.retain(|a| *a != id.0);
                cfg.admins.len() != before
            })
            .await
    }
}
