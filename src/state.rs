use std::sync::Arc;

use crate::auth::{
    jwt::{JwtKeys, TokenIssuer},
    password::{Argon2Hasher, PasswordHasher},
    repo::{PgUserStore, UserStore},
    services::AuthService,
};
use crate::config::AppConfig;
use crate::storage::{Cloudinary, ImageHost};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub auth: AuthService,
    pub tokens: Arc<dyn TokenIssuer>,
    pub images: Arc<dyn ImageHost>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let db = crate::db::connect(&config.database_url).await?;
        crate::db::migrate(&db).await;

        let images = Arc::new(Cloudinary::new(config.cloudinary.clone())?) as Arc<dyn ImageHost>;
        let tokens = Arc::new(JwtKeys::new(&config.jwt)) as Arc<dyn TokenIssuer>;

        Ok(Self::from_parts(
            Arc::new(config),
            Arc::new(PgUserStore::new(db)),
            Arc::new(Argon2Hasher),
            tokens,
            images,
        ))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        hasher: Arc<dyn PasswordHasher>,
        tokens: Arc<dyn TokenIssuer>,
        images: Arc<dyn ImageHost>,
    ) -> Self {
        let auth = AuthService::new(
            users,
            hasher,
            tokens.clone(),
            images.clone(),
            config.admin_invite_token.clone(),
        );
        Self {
            config,
            auth,
            tokens,
            images,
        }
    }
}
