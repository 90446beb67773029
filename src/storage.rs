use std::{collections::BTreeMap, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use regex::Regex;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::{config::CloudinaryConfig, images::intake::UploadedImage};

/// Quality transformation applied to every stored image.
const QUALITY_TRANSFORMATION: &str = "q_auto:good";

/// A durable object on the remote image host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedImage {
    pub url: String,
    pub public_id: String,
}

#[async_trait]
pub trait ImageHost: Send + Sync {
    /// Stores the image. Must not touch any user state.
    async fn upload(&self, image: UploadedImage) -> anyhow::Result<HostedImage>;
    /// Removes a previously uploaded asset. Callers decide whether a failure matters.
    async fn delete(&self, public_id: &str) -> anyhow::Result<()>;
    /// Recovers the public id from a URL this host returned, `None` for anything else.
    fn id_from_url(&self, url: &str) -> Option<String>;
}

#[derive(Clone)]
pub struct Cloudinary {
    http: reqwest::Client,
    cfg: CloudinaryConfig,
    public_id_re: Regex,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorMessage,
}

#[derive(Debug, Deserialize)]
struct ErrorMessage {
    message: String,
}

impl Cloudinary {
    pub fn new(cfg: CloudinaryConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("build image host http client")?;
        let public_id_re = public_id_pattern(&cfg.folder)?;
        Ok(Self {
            http,
            cfg,
            public_id_re,
        })
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "{}/{}/image/{}",
            self.cfg.api_base.trim_end_matches('/'),
            self.cfg.cloud_name,
            action
        )
    }

    /// Params common to every signed call, signature included.
    fn signed_params(&self, mut params: BTreeMap<&'static str, String>) -> BTreeMap<&'static str, String> {
        params.insert("timestamp", OffsetDateTime::now_utc().unix_timestamp().to_string());
        let signature = sign(&params, &self.cfg.api_secret);
        params.insert("api_key", self.cfg.api_key.clone());
        params.insert("signature", signature);
        params.insert("signature_algorithm", "sha256".into());
        params
    }
}

#[async_trait]
impl ImageHost for Cloudinary {
    async fn upload(&self, image: UploadedImage) -> anyhow::Result<HostedImage> {
        let mut params = BTreeMap::new();
        params.insert("folder", self.cfg.folder.clone());
        params.insert("transformation", QUALITY_TRANSFORMATION.to_string());
        if let Some(preset) = &self.cfg.upload_preset {
            params.insert("upload_preset", preset.clone());
        }

        let size = image.bytes.len();
        let file = Part::stream_with_length(image.bytes, size as u64)
            .file_name(image.file_name)
            .mime_str(&image.content_type)
            .context("image content type")?;
        let form = self
            .signed_params(params)
            .into_iter()
            .fold(Form::new(), |form, (k, v)| form.text(k, v))
            .part("file", file);

        let res = self
            .http
            .post(self.endpoint("upload"))
            .multipart(form)
            .send()
            .await
            .context("image host upload request")?;

        if !res.status().is_success() {
            let status = res.status();
            let message = res
                .json::<ErrorResponse>()
                .await
                .map(|e| e.error.message)
                .unwrap_or_else(|_| "unreadable error body".into());
            anyhow::bail!("image host rejected upload ({status}): {message}");
        }

        let body: UploadResponse = res.json().await.context("decode upload response")?;
        info!(public_id = %body.public_id, size, "image uploaded");
        Ok(HostedImage {
            url: body.secure_url,
            public_id: body.public_id,
        })
    }

    async fn delete(&self, public_id: &str) -> anyhow::Result<()> {
        let mut params = BTreeMap::new();
        params.insert("public_id", public_id.to_string());

        let res = self
            .http
            .post(self.endpoint("destroy"))
            .form(&self.signed_params(params))
            .send()
            .await
            .context("image host destroy request")?
            .error_for_status()
            .context("image host destroy status")?;

        let body: DestroyResponse = res.json().await.context("decode destroy response")?;
        anyhow::ensure!(
            body.result == "ok",
            "image host could not delete {public_id}: {}",
            body.result
        );
        debug!(%public_id, "image deleted");
        Ok(())
    }

    fn id_from_url(&self, url: &str) -> Option<String> {
        public_id_from_url(&self.public_id_re, &self.cfg.folder, url)
    }
}

/// SHA-256 over `k=v&k=v...` (keys sorted) with the API secret appended, hex encoded.
fn sign(params: &BTreeMap<&'static str, String>, secret: &str) -> String {
    let to_sign = params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Delivery URLs look like `https://res.cloudinary.com/<cloud>/image/upload/[<transforms>/][v<n>/]<folder>/<name>.<ext>`.
fn public_id_pattern(folder: &str) -> anyhow::Result<Regex> {
    Regex::new(&format!(
        r"(?i)^https?://[^/\s]+/(?:[^\s]*/)?upload/(?:[^\s]*/)?{}/([^/\s.]+)\.(?:jpe?g|png|webp)$",
        regex::escape(folder)
    ))
    .context("compile public id pattern")
}

fn public_id_from_url(re: &Regex, folder: &str, url: &str) -> Option<String> {
    let caps = re.captures(url.trim())?;
    Some(format!("{}/{}", folder, caps.get(1)?.as_str()))
}
