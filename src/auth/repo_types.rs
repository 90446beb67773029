use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Default profile image assigned when no custom photo is supplied.
pub const DEFAULT_PROFILE_IMAGE_URL: &str =
    "https://res.cloudinary.com/dpehq6hqg/image/upload/v1748965541/rmxfq5klt633rfqqtwke_msqbse.jpg";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,                // unique
    pub password_hash: String,        // Argon2 hash, never leaves the service
    pub profile_image_url: String,
    pub role: Role,
    pub position: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Fields needed to insert a user; ids and timestamps come from the store.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub profile_image_url: String,
    pub role: Role,
    pub position: Option<String>,
}
