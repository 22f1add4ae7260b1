//! Image host client (Cloudinary unsigned uploads).
//!
//! A question image is posted as multipart form data together with the upload
//! preset; the host answers with a durable `secure_url`. Size is checked before
//! anything is sent.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{header::USER_AGENT, multipart};
use serde::Deserialize;
use tracing::{error, info, instrument};

use crate::util::trunc_for_log;

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

const DEFAULT_BASE_URL: &str = "https://api.cloudinary.com";

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
  #[error("image uploads are not configured")]
  NotConfigured,
  #[error("image is {size} bytes; the limit is 5 MB")]
  TooLarge { size: usize },
  #[error("image is empty")]
  Empty,
  #[error("image data is not valid base64: {0}")]
  InvalidEncoding(String),
  #[error("image upload failed: {0}")]
  Transport(String),
  #[error("image host returned HTTP {status}: {message}")]
  Rejected { status: u16, message: String },
  #[error("image host response had no URL")]
  MissingUrl,
}

/// An image ready to be uploaded.
#[derive(Clone, Debug)]
pub struct ImageUpload {
  pub bytes: Vec<u8>,
  pub filename: String,
  pub mime: String,
}

impl ImageUpload {
  pub fn new(bytes: Vec<u8>, filename: String, mime: String) -> Result<Self, UploadError> {
    if bytes.is_empty() {
      return Err(UploadError::Empty);
    }
    if bytes.len() > MAX_IMAGE_BYTES {
      return Err(UploadError::TooLarge { size: bytes.len() });
    }
    Ok(Self { bytes, filename, mime })
  }

  /// Decode a base64 payload; a `data:<mime>;base64,` prefix is accepted.
  pub fn from_base64(data: &str, filename: Option<&str>, mime: &str) -> Result<Self, UploadError> {
    let payload = match data.split_once(";base64,") {
      Some((prefix, rest)) if prefix.starts_with("data:") => rest,
      _ => data,
    };
    let bytes = STANDARD
      .decode(payload.trim())
      .map_err(|e| UploadError::InvalidEncoding(e.to_string()))?;
    Self::new(bytes, filename.unwrap_or("image").to_string(), mime.to_string())
  }
}

#[derive(Clone)]
pub struct ImageHost {
  client: reqwest::Client,
  base_url: String,
  cloud_name: String,
  upload_preset: String,
}

#[derive(Deserialize)]
struct UploadResponse {
  #[serde(default)]
  secure_url: Option<String>,
}

impl ImageHost {
  /// Construct the client if CLOUDINARY_CLOUD_NAME and CLOUDINARY_UPLOAD_PRESET are set.
  pub fn from_env() -> Option<Self> {
    let cloud_name = std::env::var("CLOUDINARY_CLOUD_NAME").ok()?;
    let upload_preset = std::env::var("CLOUDINARY_UPLOAD_PRESET").ok()?;
    let base_url = std::env::var("CLOUDINARY_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
    Self::new(&base_url, &cloud_name, &upload_preset).ok()
  }

  pub fn new(base_url: &str, cloud_name: &str, upload_preset: &str) -> Result<Self, UploadError> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .map_err(|e| UploadError::Transport(e.to_string()))?;
    Ok(Self {
      client,
      base_url: base_url.trim_end_matches('/').to_string(),
      cloud_name: cloud_name.to_string(),
      upload_preset: upload_preset.to_string(),
    })
  }

  pub fn cloud_name(&self) -> &str {
    &self.cloud_name
  }

  /// Upload and return the durable URL.
  #[instrument(level = "info", skip(self, image), fields(size = image.bytes.len(), mime = %image.mime))]
  pub async fn upload(&self, image: ImageUpload) -> Result<String, UploadError> {
    if image.bytes.len() > MAX_IMAGE_BYTES {
      return Err(UploadError::TooLarge { size: image.bytes.len() });
    }

    let url = format!("{}/v1_1/{}/image/upload", self.base_url, self.cloud_name);
    let file = multipart::Part::bytes(image.bytes)
      .file_name(image.filename)
      .mime_str(&image.mime)
      .map_err(|e| UploadError::Transport(e.to_string()))?;
    let form = multipart::Form::new()
      .part("file", file)
      .text("upload_preset", self.upload_preset.clone());

    let start = std::time::Instant::now();
    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, "nihongo-quiz-backend/0.1")
      .multipart(form)
      .send()
      .await
      .map_err(|e| UploadError::Transport(e.to_string()))?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      error!(target: "admin", %status, elapsed = ?start.elapsed(), "Image host rejected upload");
      return Err(UploadError::Rejected { status: status.as_u16(), message: trunc_for_log(&body, 200) });
    }

    let body: UploadResponse = res.json().await.map_err(|e| UploadError::Transport(e.to_string()))?;
    let secure_url = body.secure_url.filter(|u| !u.is_empty()).ok_or(UploadError::MissingUrl)?;
    info!(target: "admin", elapsed = ?start.elapsed(), "Image uploaded");
    Ok(secure_url)
  }
}
