use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

/// Upper bound for `JWT_TTL_DAYS`, roughly ten years.
const MAX_TTL_DAYS: i64 = 3650;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_days: i64,
}

/// Credentials and upload settings for the remote image host.
#[derive(Debug, Clone, Deserialize)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub folder: String,
    pub upload_preset: Option<String>,
    pub api_base: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub client_url: Option<String>,
    pub uploads_dir: PathBuf,
    pub admin_invite_token: Option<String>,
    pub jwt: JwtConfig,
    pub cloudinary: CloudinaryConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = required("DATABASE_URL")?;

        let jwt = JwtConfig {
            secret: required("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "workdesk".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "workdesk-users".into()),
            ttl_days: match std::env::var("JWT_TTL_DAYS") {
                Ok(v) => parse_ttl_days(&v)?,
                Err(_) => 30,
            },
        };

        let cloudinary = CloudinaryConfig {
            cloud_name: required("CLOUDINARY_CLOUD_NAME")?,
            api_key: required("CLOUDINARY_API_KEY")?,
            api_secret: required("CLOUDINARY_API_SECRET")?,
            folder: std::env::var("CLOUDINARY_FOLDER")
                .unwrap_or_else(|_| "project-management".into()),
            upload_preset: Some(
                std::env::var("CLOUDINARY_UPLOAD_PRESET")
                    .unwrap_or_else(|_| "project-management-preset".into()),
            )
            .filter(|v| !v.trim().is_empty()),
            api_base: std::env::var("CLOUDINARY_API_BASE")
                .unwrap_or_else(|_| "https://api.cloudinary.com/v1_1".into()),
            timeout_secs: std::env::var("CLOUDINARY_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30),
        };

        let port = match std::env::var("PORT") {
            Ok(v) => v.parse::<u16>().context("PORT must be a valid port number")?,
            Err(_) => 5000,
        };

        Ok(Self {
            database_url,
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            client_url: optional("CLIENT_URL"),
            uploads_dir: std::env::var("UPLOADS_DIR")
                .unwrap_or_else(|_| "uploads".into())
                .into(),
            admin_invite_token: optional("ADMIN_INVITE_TOKEN"),
            jwt,
            cloudinary,
        })
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    let value = std::env::var(key).with_context(|| format!("{key} must be set"))?;
    anyhow::ensure!(!value.trim().is_empty(), "{key} must not be empty");
    Ok(value)
}

/// Unset and blank are the same thing; surrounding whitespace is dropped.
fn optional(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn parse_ttl_days(raw: &str) -> anyhow::Result<i64> {
    let days = raw
        .trim()
        .parse::<i64>()
        .context("JWT_TTL_DAYS must be a whole number of days")?;
    anyhow::ensure!(
        (1..=MAX_TTL_DAYS).contains(&days),
        "JWT_TTL_DAYS must be between 1 and {MAX_TTL_DAYS}"
    );
    Ok(days)
}
