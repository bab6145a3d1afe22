#[derive(Debug, thiserror::Error)]
pub enum BloodBankError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Every problem found in a submitted form, in field order.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("account is inactive")]
    AccountInactive,
    #[error("insufficient permissions")]
    Forbidden,
    #[error("an account with this email already exists")]
    DuplicateEmail,
    #[error("failed to hash password")]
    PasswordHash,
    #[error("store error: {0}")]
    Store(#[from] bloodbank_store::StoreError),
    #[error("upload error: {0}")]
    Upload(#[from] bloodbank_uploads::UploadError),
    #[error("invalid text: {0}")]
    Text(#[from] bloodbank_types::TextError),
}

pub type BloodBankResult<T> = std::result::Result<T, BloodBankError>;
