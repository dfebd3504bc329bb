//! Profile image storage.
//!
//! Images live in one bucket under `profiles/{student_id}.{ext}`. Uploads
//! overwrite, and the returned URL is the object's public address.

use std::path::Path;

use serde_json::json;

use super::{ensure_success, Gateway};
use crate::errors::AppError;

/// Folder inside the bucket holding profile images.
pub const PROFILE_FOLDER: &str = "profiles";

/// An image file to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Read an image from disk, keeping its file name.
    pub async fn from_path(path: &Path) -> Result<Self, AppError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AppError::Upload(format!("Cannot read {}: {}", path.display(), e)))?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self { file_name, bytes })
    }

    /// Text after the last dot; the whole name when there is none.
    pub fn extension(&self) -> &str {
        self.file_name
            .rsplit('.')
            .next()
            .unwrap_or(&self.file_name)
    }

    pub fn content_type(&self) -> &'static str {
        match self.extension().to_ascii_lowercase().as_str() {
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "webp" => "image/webp",
            "svg" => "image/svg+xml",
            "heic" => "image/heic",
            "bmp" => "image/bmp",
            _ => "application/octet-stream",
        }
    }
}

/// Storage path for a student's profile image.
pub fn profile_image_path(student_id: &str, file: &ImageFile) -> String {
    format!("{}/{}.{}", PROFILE_FOLDER, student_id, file.extension())
}

impl Gateway {
    /// Upload (or replace) a student's profile image and return its public URL.
    pub async fn upload_profile_image(
        &self,
        file: &ImageFile,
        student_id: &str,
    ) -> Result<String, AppError> {
        if student_id.trim().is_empty() {
            return Err(AppError::Upload("Missing student id".to_string()));
        }

        let path = profile_image_path(student_id, file);
        tracing::debug!("upload {} ({} bytes) to {}", path, file.bytes.len(), self.bucket);

        let response = self
            .client
            .post(self.object_url(&path))
            .header("x-upsert", "true")
            .header("cache-control", "max-age=3600")
            .header(reqwest::header::CONTENT_TYPE, file.content_type())
            .body(file.bytes.clone())
            .send()
            .await
            .map_err(|e| AppError::Upload(e.to_string()))?;

        ensure_success(response).await.map_err(|msg| {
            tracing::warn!("Upload of {} failed: {}", path, msg);
            AppError::Upload(msg)
        })?;

        Ok(self.public_url(&path))
    }

    /// Remove an object from the profile bucket by path.
    pub async fn delete_profile_image(&self, path: &str) -> Result<(), AppError> {
        if path.trim().is_empty() {
            return Err(AppError::Delete("Missing object path".to_string()));
        }
        tracing::debug!("remove {} from {}", path, self.bucket);

        let response = self
            .client
            .delete(format!("{}/storage/v1/object/{}", self.base_url, self.bucket))
            .json(&json!({ "prefixes": [path] }))
            .send()
            .await
            .map_err(|e| AppError::Delete(e.to_string()))?;

        ensure_success(response).await.map_err(|msg| {
            tracing::warn!("Removal of {} failed: {}", path, msg);
            AppError::Delete(msg)
        })?;
        Ok(())
    }

    /// Publicly resolvable URL of an object in the profile bucket.
    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, path
        )
    }

    /// Recover the object path from a URL produced by [`Gateway::public_url`].
    pub fn profile_image_path_from_url(&self, url: &str) -> Option<String> {
        let prefix = format!("{}/storage/v1/object/public/{}/", self.base_url, self.bucket);
        url.strip_prefix(&prefix)
            .map(|rest| rest.split(['?', '#']).next().unwrap_or(rest))
            .filter(|path| !path.is_empty())
            .map(str::to_string)
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, path)
    }
}
