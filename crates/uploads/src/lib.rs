//! Blood Bank Uploads
//!
//! Local storage for user profile photos.
//!
//! ## Storage Layout
//!
//! Photos live flat in one upload directory, named after their owner and the upload time:
//!
//! ```text
//! <upload_dir>/
//! ├── 550e8400-e29b-41d4-a716-446655440000_20240501093000.jpg
//! └── 7c9e6679-7425-40de-944b-e07fc1f90ae7_20240502141500.webp
//! ```
//!
//! The content type is sniffed from the bytes, never taken from the client. Only JPEG, PNG
//! and WEBP images up to [`MAX_PHOTO_BYTES`] are accepted.
//!
//! ## Example Usage
//!
//! ```no_run
//! use bloodbank_uploads::UploadsService;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let service = UploadsService::new(Path::new("uploads"))?;
//! let bytes = std::fs::read("photo.jpg")?;
//! let stored = service.store_profile_photo("550e8400-e29b-41d4-a716-446655440000", &bytes, chrono::Utc::now())?;
//! println!("saved as {}", stored.file_name);
//! # Ok(())
//! # }
//! ```

mod photos;

pub use photos::{PhotoMetadata, UploadsService};

/// Largest accepted profile photo (2 MiB).
pub const MAX_PHOTO_BYTES: usize = 2 * 1024 * 1024;

/// Media types accepted for profile photos, with the extension used on disk.
pub const ALLOWED_PHOTO_TYPES: [(&str, &str); 3] = [
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/webp", "webp"),
];

/// Errors that can occur while storing or reading uploads
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// Upload directory does not exist or is not a directory
    #[error("Invalid upload directory: {0}")]
    InvalidUploadDirectory(String),

    /// Upload carried no bytes
    #[error("Uploaded file is empty")]
    Empty,

    /// Upload exceeds [`MAX_PHOTO_BYTES`]
    #[error("File is too large ({size} bytes, maximum {max} bytes)")]
    TooLarge { size: usize, max: usize },

    /// Sniffed content type is not an accepted image type
    #[error("Unsupported file type: {0}. Only JPEG, PNG and WEBP images are allowed")]
    UnsupportedType(String),

    /// Owner id cannot be used as a filename prefix
    #[error("Invalid owner id: {0}")]
    InvalidOwner(String),

    /// Requested file name would escape the upload directory
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A photo with the same name already exists
    #[error("File {0} already exists")]
    FileAlreadyExists(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    /// True when the upload itself was unacceptable, as opposed to a server-side failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            UploadError::Empty | UploadError::TooLarge { .. } | UploadError::UnsupportedType(_)
        )
    }
}
