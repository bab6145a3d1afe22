//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. Request handlers never read process-wide environment variables;
//! the binaries read them once, feed the raw values through the `*_from_env_value` helpers
//! below, and share the resulting `CoreConfig` behind an `Arc`.

use crate::constants::{
    DEFAULT_PAGE_SIZE, DEFAULT_SESSION_TTL_MINUTES, DEFAULT_STORE_TIMEOUT_SECS,
    MAX_PAGE_SIZE, PASSWORD_HASH_ITERATIONS,
};
use crate::{BloodBankError, BloodBankResult};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    upload_dir: PathBuf,
    page_size: NonZeroUsize,
    session_ttl: chrono::Duration,
    store_timeout: Duration,
    password_iterations: u32,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// The upload directory must already exist; it is not created on demand.
    pub fn new(
        upload_dir: PathBuf,
        page_size: NonZeroUsize,
        session_ttl: chrono::Duration,
        store_timeout: Duration,
    ) -> BloodBankResult<Self> {
        if !upload_dir.is_dir() {
            return Err(BloodBankError::InvalidInput(format!(
                "upload directory does not exist: {}",
                upload_dir.display()
            )));
        }
        if session_ttl <= chrono::Duration::zero() {
            return Err(BloodBankError::InvalidInput(
                "session ttl must be positive".into(),
            ));
        }

        Ok(Self {
            upload_dir,
            page_size,
            session_ttl,
            store_timeout,
            password_iterations: PASSWORD_HASH_ITERATIONS,
        })
    }

    /// Lowers the password hashing cost. Intended for tests only.
    pub fn with_password_iterations(mut self, iterations: u32) -> Self {
        self.password_iterations = iterations.max(1);
        self
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn page_size(&self) -> NonZeroUsize {
        self.page_size
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        self.session_ttl
    }

    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }

    pub fn password_iterations(&self) -> u32 {
        self.password_iterations
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse the default page size from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns [`DEFAULT_PAGE_SIZE`].
pub fn page_size_from_env_value(value: Option<String>) -> BloodBankResult<NonZeroUsize> {
    let Some(raw) = trimmed(value) else {
        return NonZeroUsize::new(DEFAULT_PAGE_SIZE)
            .ok_or_else(|| BloodBankError::InvalidInput("default page size is zero".into()));
    };
    let parsed: usize = raw
        .parse()
        .map_err(|_| BloodBankError::InvalidInput(format!("invalid page size: {raw}")))?;
    if parsed > MAX_PAGE_SIZE {
        return Err(BloodBankError::InvalidInput(format!(
            "page size {parsed} exceeds maximum of {MAX_PAGE_SIZE}"
        )));
    }
    NonZeroUsize::new(parsed)
        .ok_or_else(|| BloodBankError::InvalidInput("page size must be at least 1".into()))
}

/// Parse the session lifetime (in minutes) from an optional string value.
pub fn session_ttl_from_env_value(value: Option<String>) -> BloodBankResult<chrono::Duration> {
    let minutes = match trimmed(value) {
        Some(raw) => raw
            .parse::<i64>()
            .map_err(|_| BloodBankError::InvalidInput(format!("invalid session ttl: {raw}")))?,
        None => DEFAULT_SESSION_TTL_MINUTES,
    };
    if minutes <= 0 {
        return Err(BloodBankError::InvalidInput(
            "session ttl must be positive".into(),
        ));
    }
    Ok(chrono::Duration::minutes(minutes))
}

/// Parse the remote store timeout (in seconds) from an optional string value.
pub fn store_timeout_from_env_value(value: Option<String>) -> BloodBankResult<Duration> {
    let secs = match trimmed(value) {
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|_| BloodBankError::InvalidInput(format!("invalid store timeout: {raw}")))?,
        None => DEFAULT_STORE_TIMEOUT_SECS,
    };
    if secs == 0 {
        return Err(BloodBankError::InvalidInput(
            "store timeout must be at least one second".into(),
        ));
    }
    Ok(Duration::from_secs(secs))
}

/// Require a non-empty value, naming the variable in the error.
pub fn required_env_value(name: &str, value: Option<String>) -> BloodBankResult<String> {
    trimmed(value).ok_or_else(|| BloodBankError::InvalidInput(format!("{name} must be set")))
}
