use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Metadata;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub repository_url: Option<String>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateApplicationInput {
    pub name: String,
    pub description: Option<String>,
    pub repository_url: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}
