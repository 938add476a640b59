//! Client-side cache of previously seen entity identifiers.
//!
//! The store is injected at the session boundary rather than reached for
//! ambiently: the app loads the cache once at startup and saves it once at
//! shutdown, so pickers come up populated even before the backend answers.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::api::ConversationInfo;

/// The identifier triple that must be fully bound before a chat request is
/// valid.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SelectedTriple {
    pub user_id: String,
    pub dog_id: String,
    pub conversation_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct SessionCache {
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub dogs: Vec<String>,
    #[serde(default)]
    pub conversations: Vec<CachedConversation>,
    #[serde(default)]
    pub last_selected: Option<SelectedTriple>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CachedConversation {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub last_message_time: i64,
}

impl From<&ConversationInfo> for CachedConversation {
    fn from(info: &ConversationInfo) -> Self {
        Self {
            id: info.id.clone(),
            title: info.title.clone(),
            last_message_time: info.last_message_time,
        }
    }
}

impl SessionCache {
    /// Merge freshly fetched identifiers, keeping cached ones the backend no
    /// longer reports so an offline backend doesn't wipe the pickers.
    pub fn merge_users(&mut self, fetched: &[String]) {
        merge_ids(&mut self.users, fetched);
    }

    pub fn merge_dogs(&mut self, fetched: &[String]) {
        merge_ids(&mut self.dogs, fetched);
    }

    pub fn merge_conversations(&mut self, fetched: &[ConversationInfo]) {
        for info in fetched {
            if let Some(existing) = self.conversations.iter_mut().find(|c| c.id == info.id) {
                existing.title = info.title.clone();
                existing.last_message_time = info.last_message_time;
            } else {
                self.conversations.push(info.into());
            }
        }
        self.conversations
            .sort_by(|a, b| b.last_message_time.cmp(&a.last_message_time));
    }
}

fn merge_ids(cached: &mut Vec<String>, fetched: &[String]) {
    for id in fetched {
        if !cached.contains(id) {
            cached.push(id.clone());
        }
    }
}

/// Key-value persistence capability for the session cache.
pub trait SessionStore {
    fn load(&self) -> Result<SessionCache>;
    fn save(&self, cache: &SessionCache) -> Result<()>;
}

/// JSON file in the platform config directory.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl SessionStore for JsonFileStore {
    fn load(&self) -> Result<SessionCache> {
        if !self.path.exists() {
            return Ok(SessionCache::default());
        }
        let content = fs::read_to_string(&self.path)?;
        let cache: SessionCache = serde_json::from_str(&content)?;
        Ok(cache)
    }

    fn save(&self, cache: &SessionCache) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(cache)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn conv(id: &str, time: i64) -> ConversationInfo {
        ConversationInfo {
            id: id.to_string(),
            title: format!("chat {}", id),
            last_message_time: time,
        }
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested/session.json"));

        let mut cache = SessionCache::default();
        cache.merge_users(&["user_001".to_string(), "user_002".to_string()]);
        cache.merge_dogs(&["dog_001".to_string()]);
        cache.merge_conversations(&[conv("conv_a", 5)]);
        cache.last_selected = Some(SelectedTriple {
            user_id: "user_001".to_string(),
            dog_id: "dog_001".to_string(),
            conversation_id: "conv_a".to_string(),
        });
        store.save(&cache).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.users, vec!["user_001", "user_002"]);
        assert_eq!(loaded.dogs, vec!["dog_001"]);
        assert_eq!(loaded.conversations.len(), 1);
        assert_eq!(loaded.last_selected, cache.last_selected);
    }

    #[test]
    fn test_missing_file_loads_empty_cache() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("absent.json"));
        let cache = store.load().unwrap();
        assert!(cache.users.is_empty());
        assert!(cache.last_selected.is_none());
    }

    #[test]
    fn test_merge_keeps_stale_entries_and_dedupes() {
        let mut cache = SessionCache::default();
        cache.merge_users(&["user_001".to_string()]);
        cache.merge_users(&["user_002".to_string()]);
        // A later fetch that no longer includes user_001 must not drop it.
        cache.merge_users(&["user_002".to_string(), "user_003".to_string()]);
        assert_eq!(cache.users, vec!["user_001", "user_002", "user_003"]);
    }

    #[test]
    fn test_merge_conversations_updates_and_sorts() {
        let mut cache = SessionCache::default();
        cache.merge_conversations(&[conv("a", 1), conv("b", 2)]);
        cache.merge_conversations(&[conv("a", 9)]);
        assert_eq!(cache.conversations.len(), 2);
        assert_eq!(cache.conversations[0].id, "a");
        assert_eq!(cache.conversations[0].last_message_time, 9);
    }
}
