use std::{collections::BTreeMap, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::{domain::ChatId, Result};

use super::JsonDocument;

/// Public profile of a Telegram user at first contact.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeenProfile {
    pub id: ChatId,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl SeenProfile {
    pub fn full_name(&self) -> Option<String> {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let name = name.trim();
        (!name.is_empty()).then(|| name.to_string())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct SeenUser {
    id: i64,
    username: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    ts: i64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct SeenDoc {
    #[serde(default)]
    users: BTreeMap<String, SeenUser>,
}

/// Write-once first-contact ledger.
pub struct SeenRegistry {
    doc: JsonDocument<SeenDoc>,
}

impl SeenRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            doc: JsonDocument::new(path),
        }
    }

    /// Record `profile` unless already known. Returns `true` on first sight.
    pub async fn mark_seen(&self, profile: &SeenProfile) -> Result<bool> {
        self.doc
            .update(|doc| {
                let key = profile.id.0.to_string();
                if doc.users.contains_key(&key) {
                    return false;
                }
                doc.users.insert(
                    key,
                    SeenUser {
                        id: profile.id.0,
                        username: profile.username.clone(),
                        first_name: profile.first_name.clone(),
                        last_name: profile.last_name.clone(),
                        ts: chrono::Utc::now().timestamp(),
                    },
                );
                true
            })
            .await
    }

    pub async fn len(&self) -> Result<usize> {
        Ok(self.doc.read().await?.users.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: i64) -> SeenProfile {
        SeenProfile {
            id: ChatId(id),
            username: Some("neo".to_string()),
            first_name: Some("Thomas".to_string()),
            last_name: None,
        }
    }

    #[tokio::test]
    async fn first_sight_only_once() {
        let dir = tempfile::tempdir().unwrap();
        let r = SeenRegistry::new(dir.path().join("seen_users.json"));

        assert!(r.mark_seen(&profile(1)).await.unwrap());
        assert!(!r.mark_seen(&profile(1)).await.unwrap());
        assert!(r.mark_seen(&profile(2)).await.unwrap());
        assert_eq!(r.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn record_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seen_users.json");
        let r = SeenRegistry::new(&path);

        r.mark_seen(&profile(1)).await.unwrap();
        let mut renamed = profile(1);
        renamed.username = Some("trinity".to_string());
        r.mark_seen(&renamed).await.unwrap();

        let v: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["users"]["1"]["username"], "neo");
        assert_eq!(v["users"]["1"]["id"], 1);
        assert!(v["users"]["1"]["last_name"].is_null());
    }

    #[test]
    fn full_name_joins_present_parts() {
        let mut p = profile(1);
        assert_eq!(p.full_name().as_deref(), Some("Thomas"));
        p.last_name = Some("Anderson".to_string());
        assert_eq!(p.full_name().as_deref(), Some("Thomas Anderson"));
        p.first_name = None;
        p.last_name = None;
        assert_eq!(p.full_name(), None);
    }
}
