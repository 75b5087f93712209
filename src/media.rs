//! Recipe images.
//!
//! Clients send images as base64 data URIs (`data:image/png;base64,...`).
//! They are written below the media root under a random name, the relative
//! path is what the database stores, and responses carry `media_url + path`.

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine};
use uuid::Uuid;

use crate::{
    constants::{IMAGE_DIRECTORY, IMAGE_EXTENSIONS},
    error::ApiError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub extension: &'static str,
    pub bytes: Vec<u8>,
}

/// Decodes a `data:<mime>;base64,<payload>` string.
pub fn decode_data_uri(value: &str) -> Result<DecodedImage, String> {
    let value = value.trim();
    let (header, payload) = value
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
        .ok_or_else(|| String::from("Expected a base64 encoded data URI"))?;

    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| String::from("Expected a base64 encoded data URI"))?;

    let extension = IMAGE_EXTENSIONS
        .iter()
        .find_map(|(known, extension)| (known.eq_ignore_ascii_case(mime)).then_some(*extension))
        .ok_or_else(|| format!("Unsupported image type: {mime}"))?;

    let bytes = STANDARD
        .decode(payload)
        .map_err(|_| String::from("Image is not valid base64"))?;

    if bytes.is_empty() {
        return Err(String::from("The submitted image is empty"));
    }

    Ok(DecodedImage { extension, bytes })
}

#[derive(Debug, Clone)]
pub struct Media {
    root: PathBuf,
    url: String,
}

impl Media {
    pub fn new(root: PathBuf, url: &str) -> Self {
        let url = if url.ends_with('/') {
            url.to_owned()
        } else {
            format!("{url}/")
        };

        Self { root, url }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.url, path.trim_start_matches('/'))
    }

    /// Writes the image and returns the path relative to the media root.
    pub async fn save(&self, image: &DecodedImage) -> Result<String, ApiError> {
        let relative = format!("{IMAGE_DIRECTORY}/{}.{}", Uuid::new_v4(), image.extension);
        let target = self.root.join(&relative);

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ApiError::Internal(format!("Could not create media directory: {e}")))?;
        }

        tokio::fs::write(&target, &image.bytes)
            .await
            .map_err(|e| ApiError::Internal(format!("Could not store image: {e}")))?;

        log::debug!("> Stored image {relative}");
        Ok(relative)
    }

    /// Best effort; a missing file is not an error.
    pub async fn remove(&self, path: &str) {
        if path.is_empty() || path.contains("..") {
            return;
        }

        if let Err(e) = tokio::fs::remove_file(self.root.join(path)).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("> Failed to remove image {path}: {e}");
            }
        }
    }
}
