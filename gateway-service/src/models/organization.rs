use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Tenant organization. Owned by the admin who created it.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub description: Option<String>,
    pub website: Option<String>,
    pub admin_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Organization {
    pub fn new(
        name: String,
        email: String,
        description: Option<String>,
        website: Option<String>,
        admin_id: Uuid,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            email,
            description,
            website,
            admin_id,
            created_at: now,
            updated_at: now,
        }
    }
}
