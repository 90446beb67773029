use std::{sync::Arc, time::Duration};

use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, PublicUser, RegisterRequest, UpdateProfileRequest},
        jwt::TokenIssuer,
        password::PasswordHasher,
        repo::{StoreError, UserStore},
        repo_types::{NewUser, Role, User, DEFAULT_PROFILE_IMAGE_URL},
    },
    error::AppError,
    storage::{HostedImage, ImageHost},
};

const LOGIN_TIMING_FLOOR: Duration = Duration::from_millis(500);

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// `Some(trimmed)` unless the value is missing or blank.
fn supplied(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn check_image_url(url: &str) -> Result<(), AppError> {
    match url::Url::parse(url) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => Ok(()),
        _ => Err(AppError::validation("profileImageUrl must be a valid http(s) URL")),
    }
}

/// Fixed-length digests compared without early exit.
fn secrets_match(given: &str, expected: &str) -> bool {
    let (a, b) = (Sha256::digest(given.as_bytes()), Sha256::digest(expected.as_bytes()));
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateEmail => AppError::DuplicateUser,
            StoreError::Database(e) => AppError::Internal(e.into()),
        }
    }
}

/// Registration, login and profile management over swappable collaborators.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    hasher: Arc<dyn PasswordHasher>,
    tokens: Arc<dyn TokenIssuer>,
    images: Arc<dyn ImageHost>,
    admin_invite_token: Option<String>,
    login_floor: Duration,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        hasher: Arc<dyn PasswordHasher>,
        tokens: Arc<dyn TokenIssuer>,
        images: Arc<dyn ImageHost>,
        admin_invite_token: Option<String>,
    ) -> Self {
        Self {
            users,
            hasher,
            tokens,
            images,
            admin_invite_token: supplied(admin_invite_token),
            login_floor: LOGIN_TIMING_FLOOR,
        }
    }

    /// Overrides the minimum time a login attempt takes.
    pub fn with_login_floor(mut self, floor: Duration) -> Self {
        self.login_floor = floor;
        self
    }

    fn role_for_invite(&self, invite: Option<&str>) -> Role {
        match (invite.map(str::trim).filter(|t| !t.is_empty()), &self.admin_invite_token) {
            (Some(given), Some(expected)) if secrets_match(given, expected) => Role::Admin,
            _ => Role::User,
        }
    }

    fn respond(&self, user: User) -> Result<AuthResponse, AppError> {
        let token = self.tokens.issue(user.id)?;
        Ok(AuthResponse {
            user: user.into(),
            token,
        })
    }

    async fn load(&self, user_id: Uuid) -> Result<User, AppError> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(AppError::user_not_found)
    }

    /// Best-effort removal of the asset behind `url`; the placeholder and
    /// URLs without a derivable id are left alone.
    async fn discard_image(&self, url: &str) {
        if url == DEFAULT_PROFILE_IMAGE_URL {
            return;
        }
        let Some(public_id) = self.images.id_from_url(url) else {
            debug!(%url, "no public id derivable, skipping delete");
            return;
        };
        match self.images.delete(&public_id).await {
            Ok(()) => info!(%public_id, "previous profile image deleted"),
            Err(e) => warn!(error = %e, %public_id, "failed to delete previous profile image"),
        }
    }

    /// Best-effort removal of a fresh upload that never reached a profile.
    async fn discard_upload(&self, public_id: &str) {
        if let Err(e) = self.images.delete(public_id).await {
            warn!(error = %e, %public_id, "failed to delete orphaned upload");
        }
    }

    #[instrument(skip(self, req), fields(email = %req.email.trim()))]
    pub async fn register(&self, req: RegisterRequest) -> Result<AuthResponse, AppError> {
        let email = normalize_email(&req.email);
        let name = req.name.trim().to_owned();
        if name.is_empty() || email.is_empty() || req.password.is_empty() {
            return Err(AppError::validation("Please provide name, email and password"));
        }
        if !is_valid_email(&email) {
            return Err(AppError::validation("Invalid email"));
        }

        let profile_image_url = match supplied(req.profile_image_url) {
            Some(url) => {
                check_image_url(&url)?;
                url
            }
            None => DEFAULT_PROFILE_IMAGE_URL.to_owned(),
        };

        if self.users.find_by_email(&email).await?.is_some() {
            warn!(%email, "email already registered");
            return Err(AppError::DuplicateUser);
        }

        let role = self.role_for_invite(req.admin_invite_token.as_deref());
        let password_hash = self.hasher.hash(&req.password).await?;

        let user = self
            .users
            .create(NewUser {
                name,
                email,
                password_hash,
                profile_image_url,
                role,
                position: supplied(req.position),
            })
            .await?;

        info!(user_id = %user.id, role = ?user.role, "user registered");
        self.respond(user)
    }

    #[instrument(skip(self, req), fields(email = %req.email.trim()))]
    pub async fn login(&self, req: LoginRequest) -> Result<AuthResponse, AppError> {
        let email = normalize_email(&req.email);
        let deadline = Instant::now() + self.login_floor;

        let outcome = async {
            let Some(user) = self.users.find_by_email(&email).await? else {
                warn!("login unknown email");
                return Err(AppError::InvalidCredentials);
            };
            if !self.hasher.verify(&req.password, &user.password_hash).await? {
                warn!(user_id = %user.id, "login invalid password");
                return Err(AppError::InvalidCredentials);
            }
            Ok::<_, AppError>(user)
        }
        .await;
        // known and unknown emails take the same minimum time
        tokio::time::sleep_until(deadline).await;
        let user = outcome?;

        info!(user_id = %user.id, "user logged in");
        self.respond(user)
    }

    #[instrument(skip(self))]
    pub async fn profile(&self, user_id: Uuid) -> Result<PublicUser, AppError> {
        Ok(self.load(user_id).await?.into())
    }

    #[instrument(skip(self, req))]
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        req: UpdateProfileRequest,
    ) -> Result<AuthResponse, AppError> {
        let mut user = self.load(user_id).await?;

        let email = supplied(req.email).map(|e| normalize_email(&e));
        if let Some(email) = &email {
            if !is_valid_email(email) {
                return Err(AppError::validation("Invalid email"));
            }
        }
        let profile_image_url = supplied(req.profile_image_url);
        if let Some(url) = &profile_image_url {
            check_image_url(url)?;
        }
        if let Some(email) = email.as_deref().filter(|e| *e != user.email) {
            if self.users.find_by_email(email).await?.is_some() {
                return Err(AppError::DuplicateUser);
            }
        }
        // passwords are taken verbatim, only emptiness means "unchanged"
        let password_hash = match req.password.filter(|p| !p.is_empty()) {
            Some(password) => Some(self.hasher.hash(&password).await?),
            None => None,
        };

        let mut replaced_image = None;
        if let Some(url) = profile_image_url {
            if url != user.profile_image_url {
                replaced_image = Some(std::mem::replace(&mut user.profile_image_url, url));
            }
        }
        if let Some(name) = supplied(req.name) {
            user.name = name;
        }
        if let Some(email) = email {
            user.email = email;
        }
        if let Some(position) = supplied(req.position) {
            user.position = Some(position);
        }
        if let Some(hash) = password_hash {
            user.password_hash = hash;
        }

        let user = self.users.save(&user).await?;
        if let Some(previous) = replaced_image {
            self.discard_image(&previous).await;
        }
        info!(user_id = %user.id, "profile updated");
        self.respond(user)
    }

    /// Stores an already uploaded image as the caller's profile photo.
    #[instrument(skip(self, image))]
    pub async fn replace_photo(
        &self,
        user_id: Uuid,
        image: Option<HostedImage>,
    ) -> Result<AuthResponse, AppError> {
        let Some(mut user) = self.users.find_by_id(user_id).await? else {
            if let Some(orphan) = image {
                self.discard_upload(&orphan.public_id).await;
            }
            return Err(AppError::user_not_found());
        };
        let image = image.ok_or(AppError::NoImageProvided)?;

        let previous = std::mem::replace(&mut user.profile_image_url, image.url.clone());
        let user = match self.users.save(&user).await {
            Ok(user) => user,
            Err(e) => {
                self.discard_upload(&image.public_id).await;
                return Err(e.into());
            }
        };
        self.discard_image(&previous).await;

        info!(user_id = %user.id, public_id = %image.public_id, "profile photo replaced");
        self.respond(user)
    }
}
