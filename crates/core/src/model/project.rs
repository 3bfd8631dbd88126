use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::new_api_key;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub api_key: String,
    pub created_at: DateTime<Utc>,
}

impl Project {
    /// A project named after its id, as created on first submission.
    pub fn provisioned(id: impl Into<String>, api_key: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            api_key: api_key.into(),
            created_at: Utc::now(),
        }
    }

    pub fn with_generated_key(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            api_key: new_api_key(),
            created_at: Utc::now(),
        }
    }

    pub fn accepts(&self, secret: &str) -> bool {
        self.api_key == secret
    }
}
