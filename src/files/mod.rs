//! File store for proof images
//!
//! Images are content-addressed: the stored name is the SHA-256 of the bytes
//! plus an extension, so re-uploading the same photo is a no-op.

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::types::{FavorrError, Result};

/// URL prefix under which stored files are served
pub const UPLOADS_PREFIX: &str = "/uploads/";

/// Accepted image type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageType {
    Png,
    Jpeg,
}

impl ImageType {
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type.split(';').next().unwrap_or("").trim();
        match mime.to_ascii_lowercase().as_str() {
            "image/png" => Some(ImageType::Png),
            "image/jpeg" | "image/jpg" => Some(ImageType::Jpeg),
            _ => None,
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "png" => Some(ImageType::Png),
            "jpg" => Some(ImageType::Jpeg),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageType::Png => "png",
            ImageType::Jpeg => "jpg",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ImageType::Png => "image/png",
            ImageType::Jpeg => "image/jpeg",
        }
    }

    /// Whether `data` starts with this format's magic bytes
    fn matches(&self, data: &[u8]) -> bool {
        match self {
            ImageType::Png => data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]),
            ImageType::Jpeg => data.starts_with(&[0xFF, 0xD8, 0xFF]),
        }
    }
}

/// A stored file read back for serving
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub image_type: ImageType,
    pub data: Bytes,
}

/// File-store collaborator
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Store an image and return its reference (`/uploads/<name>`)
    async fn put(&self, content_type: &str, data: Bytes) -> Result<String>;

    /// Read a stored file by name; `None` for unknown or malformed names
    async fn get(&self, name: &str) -> Result<Option<StoredFile>>;
}

/// Content-addressed store on local disk
pub struct LocalFileStore {
    dir: PathBuf,
    max_bytes: usize,
}

impl LocalFileStore {
    pub fn new(dir: PathBuf, max_bytes: usize) -> Self {
        Self { dir, max_bytes }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Create the upload directory if needed
    pub async fn init(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        info!("Uploads stored in {}", self.dir.display());
        Ok(())
    }
}

/// Split `<64 hex>.<ext>`; anything else is not a name this store produced
fn parse_name(name: &str) -> Option<ImageType> {
    let (hash, ext) = name.split_once('.')?;
    if hash.len() != 64 || !hash.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')) {
        return None;
    }
    ImageType::from_extension(ext)
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn put(&self, content_type: &str, data: Bytes) -> Result<String> {
        let image_type = ImageType::from_content_type(content_type).ok_or_else(|| {
            FavorrError::Validation(format!(
                "Unsupported content type '{}', expected image/png or image/jpeg",
                content_type
            ))
        })?;
        if data.is_empty() {
            return Err(FavorrError::Validation("Empty upload".into()));
        }
        if data.len() > self.max_bytes {
            return Err(FavorrError::Validation(format!(
                "Upload exceeds {} bytes",
                self.max_bytes
            )));
        }
        if !image_type.matches(&data) {
            return Err(FavorrError::Validation(format!(
                "Body is not a {} image",
                image_type.extension()
            )));
        }

        let name = format!(
            "{}.{}",
            hex::encode(Sha256::digest(&data)),
            image_type.extension()
        );
        let path = self.dir.join(&name);
        if tokio::fs::try_exists(&path).await? {
            debug!("Upload {} already stored", name);
        } else {
            tokio::fs::write(&path, &data).await?;
            info!("Stored upload {} ({} bytes)", name, data.len());
        }

        Ok(format!("{}{}", UPLOADS_PREFIX, name))
    }

    async fn get(&self, name: &str) -> Result<Option<StoredFile>> {
        let image_type = match parse_name(name) {
            Some(t) => t,
            None => return Ok(None),
        };

        match tokio::fs::read(self.dir.join(name)).await {
            Ok(data) => Ok(Some(StoredFile {
                image_type,
                data: Bytes::from(data),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
