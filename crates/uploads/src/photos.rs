//! Profile photo storage service.
//!
//! [`UploadsService`] is bound to a single, already existing upload directory. It validates
//! each upload (size, sniffed media type, owner id), writes it under a name derived from
//! the owner and timestamp, and returns a [`PhotoMetadata`] record the caller persists on
//! the user row. Files are never overwritten.

use crate::{UploadError, ALLOWED_PHOTO_TYPES, MAX_PHOTO_BYTES};
use bloodbank_types::NonEmptyText;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Metadata for a stored profile photo
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct PhotoMetadata {
    /// File name inside the upload directory
    pub file_name: NonEmptyText,

    /// Sniffed media type (one of the accepted image types)
    pub media_type: NonEmptyText,

    /// Size of the file in bytes
    pub size_bytes: u64,

    /// Hexadecimal SHA-256 digest of the content
    pub sha256: String,

    /// UTC timestamp used in the file name
    pub stored_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct UploadsService {
    /// Canonicalised upload directory
    upload_dir: PathBuf,
}

impl UploadsService {
    /// Creates a service for an existing upload directory.
    ///
    /// # Errors
    ///
    /// Returns `UploadError::InvalidUploadDirectory` if the path does not exist, is not a
    /// directory, or cannot be canonicalised.
    pub fn new(upload_dir: &Path) -> Result<Self, UploadError> {
        if !upload_dir.is_dir() {
            return Err(UploadError::InvalidUploadDirectory(format!(
                "Directory does not exist: {}",
                upload_dir.display()
            )));
        }

        let upload_dir = upload_dir.canonicalize().map_err(|e| {
            UploadError::InvalidUploadDirectory(format!(
                "Cannot canonicalize path {}: {}",
                upload_dir.display(),
                e
            ))
        })?;

        Ok(Self { upload_dir })
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Validates and stores a profile photo for `owner_id`.
    ///
    /// The file is written as `<owner_id>_<YYYYMMDDHHMMSS>.<ext>`, where the extension
    /// follows the sniffed media type.
    ///
    /// # Errors
    ///
    /// Returns `UploadError` if:
    /// - the upload is empty or larger than [`MAX_PHOTO_BYTES`]
    /// - the content is not a JPEG, PNG or WEBP image
    /// - `owner_id` contains characters other than ASCII letters, digits, `-` and `_`
    /// - a file with the computed name already exists
    /// - the file cannot be written (I/O)
    pub fn store_profile_photo(
        &self,
        owner_id: &str,
        bytes: &[u8],
        now: DateTime<Utc>,
    ) -> Result<PhotoMetadata, UploadError> {
        if bytes.is_empty() {
            return Err(UploadError::Empty);
        }
        if bytes.len() > MAX_PHOTO_BYTES {
            return Err(UploadError::TooLarge {
                size: bytes.len(),
                max: MAX_PHOTO_BYTES,
            });
        }

        let owner = validate_owner(owner_id)?;
        let (media_type, extension) = sniff_photo_type(bytes)?;

        let file_name = format!("{}_{}.{}", owner, now.format("%Y%m%d%H%M%S"), extension);
        let storage_path = self.upload_dir.join(&file_name);
        if storage_path.exists() {
            return Err(UploadError::FileAlreadyExists(file_name));
        }

        fs::write(&storage_path, bytes).map_err(|e| {
            UploadError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to write file to {}: {}", storage_path.display(), e),
            ))
        })?;

        let digest = Sha256::digest(bytes);
        tracing::info!(file = %file_name, size = bytes.len(), "stored profile photo");

        Ok(PhotoMetadata {
            file_name: NonEmptyText::new(&file_name)
                .map_err(|_| UploadError::InvalidPath(file_name.clone()))?,
            media_type: NonEmptyText::new(media_type)
                .map_err(|_| UploadError::UnsupportedType(media_type.to_string()))?,
            size_bytes: bytes.len() as u64,
            sha256: hex::encode(digest),
            stored_at: now,
        })
    }

    /// Reads a previously stored photo by file name.
    pub fn read(&self, file_name: &str) -> Result<Vec<u8>, UploadError> {
        let path = self.resolve(file_name)?;
        if !path.is_file() {
            return Err(UploadError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("File not found: {}", file_name),
            )));
        }
        Ok(fs::read(&path)?)
    }

    /// Removes a stored photo. Removing a file that is already gone is not an error.
    pub fn remove(&self, file_name: &str) -> Result<(), UploadError> {
        let path = self.resolve(file_name)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(UploadError::Io(e)),
        }
    }

    fn resolve(&self, file_name: &str) -> Result<PathBuf, UploadError> {
        let is_plain_name = !file_name.is_empty()
            && file_name != "."
            && file_name != ".."
            && !file_name.contains(['/', '\\'])
            && !file_name.contains('\0');
        if !is_plain_name {
            return Err(UploadError::InvalidPath(file_name.to_string()));
        }
        Ok(self.upload_dir.join(file_name))
    }
}

fn validate_owner(owner_id: &str) -> Result<&str, UploadError> {
    let owner = owner_id.trim();
    let valid = !owner.is_empty()
        && owner
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(owner)
    } else {
        Err(UploadError::InvalidOwner(owner_id.to_string()))
    }
}

fn sniff_photo_type(bytes: &[u8]) -> Result<(&'static str, &'static str), UploadError> {
    let detected = infer::get(bytes).map(|kind| kind.mime_type());
    match detected {
        Some(mime) => ALLOWED_PHOTO_TYPES
            .iter()
            .find(|(allowed, _)| *allowed == mime)
            .copied()
            .ok_or_else(|| UploadError::UnsupportedType(mime.to_string())),
        None => Err(UploadError::UnsupportedType("unknown".to_string())),
    }
}
