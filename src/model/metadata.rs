use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{generate_id, Id};

/// Fields shared by every entity in the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub meta_id: Id,
    #[serde(default)]
    pub name: String,
    #[serde(default = "Utc::now")]
    pub creation: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
}

impl Metadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            meta_id: generate_id(),
            name: name.into(),
            creation: Utc::now(),
            description: String::new(),
        }
    }

    /// Same name and description under a fresh identity and creation time
    pub fn renewed(&self) -> Self {
        Self {
            meta_id: generate_id(),
            name: self.name.clone(),
            creation: Utc::now(),
            description: self.description.clone(),
        }
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self::new("")
    }
}

// Creation time is bookkeeping, not content.
impl PartialEq for Metadata {
    fn eq(&self, other: &Self) -> bool {
        self.meta_id == other.meta_id
            && self.name == other.name
            && self.description == other.description
    }
}
