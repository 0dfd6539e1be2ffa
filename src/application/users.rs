//! Author resolution from `users.json` metadata and inline record fields.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::domain::{AppError, AuthorRef, Result, User};

/// Label used when nothing identifies an author.
pub const UNKNOWN_AUTHOR: &str = "???";

#[derive(Debug, Deserialize)]
struct RawUser {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    real_name: Option<String>,
    #[serde(default)]
    profile: Option<RawUserProfile>,
}

#[derive(Debug, Deserialize, Default)]
struct RawUserProfile {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    real_name: Option<String>,
}

/// User metadata keyed by Slack user id.
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    users: HashMap<String, User>,
}

impl UserDirectory {
    /// Load the export's `users.json`.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or is not a list of users.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| AppError::io(format!("Failed to read users file: {}", path.display()), e))?;
        let directory = Self::from_json(&content)?;
        if directory.is_empty() {
            tracing::warn!(path = %path.display(), "Users file lists no users");
        }
        tracing::info!(path = %path.display(), users = directory.len(), "Users loaded");
        Ok(directory)
    }

    /// Build a directory from the contents of a users file.
    ///
    /// # Errors
    /// Returns error if the content is not a JSON list of user objects.
    pub fn from_json(content: &str) -> Result<Self> {
        let raw: Vec<RawUser> = serde_json::from_str(content).map_err(AppError::json_parse)?;
        Ok(Self::from_users(raw.into_iter().filter_map(to_user)))
    }

    fn from_users(users: impl IntoIterator<Item = User>) -> Self {
        let mut map = HashMap::new();
        for user in users {
            if map.contains_key(&user.id) {
                tracing::warn!(user = %user.id, "Duplicate user id in users file, keeping the first");
                continue;
            }
            map.insert(user.id.clone(), user);
        }
        Self { users: map }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Best label for a known user id.
    #[must_use]
    pub fn lookup(&self, id: &str) -> Option<&str> {
        self.users
            .get(id)
            .and_then(|u| u.searchlist.first())
            .map(String::as_str)
    }

    /// Display label for a message author. Never fails.
    #[must_use]
    pub fn label(&self, author: &AuthorRef) -> String {
        if let Some(label) = author.user_id.as_deref().and_then(|id| self.lookup(id)) {
            return label.to_string();
        }
        if let Some(label) = author.inline.first() {
            return label.clone();
        }
        tracing::warn!("Message has no identifiable author, using {UNKNOWN_AUTHOR}");
        UNKNOWN_AUTHOR.to_string()
    }
}

fn to_user(raw: RawUser) -> Option<User> {
    let Some(id) = raw.id.filter(|id| !id.is_empty()) else {
        tracing::warn!(name = ?raw.name, "Skipping user without id");
        return None;
    };
    let profile = raw.profile.unwrap_or_default();

    let searchlist = [
        profile.display_name,
        raw.real_name,
        profile.real_name,
        raw.name,
        Some(id.clone()),
    ]
    .into_iter()
    .flatten()
    .filter(|s| !s.trim().is_empty())
    .collect();

    Some(User { id, searchlist })
}
