//! User account operations against the `users` and `user_roles` tables.

use crate::config::CoreConfig;
use crate::constants::{USER_ROLE_TABLE, USER_TABLE};
use crate::error::{BloodBankError, BloodBankResult};
use crate::records::{UserRecord, UserRoleRecord};
use crate::users::{
    hash_password, status_change_message, verify_password, NewUserForm, Role, StaffRole,
};
use bloodbank_store::{fetch_rows, Query, RecordStore};
use bloodbank_types::{EmailAddress, UserId};
use bloodbank_uploads::{PhotoMetadata, UploadsService};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;

/// Identity established by a successful login.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub staff_role: Option<StaffRole>,
}

/// Service for account management and credential checks.
#[derive(Clone)]
pub struct UserService {
    cfg: Arc<CoreConfig>,
    store: Arc<dyn RecordStore>,
}

impl UserService {
    pub fn new(cfg: Arc<CoreConfig>, store: Arc<dyn RecordStore>) -> Self {
        Self { cfg, store }
    }

    async fn user_by_email(&self, email: &EmailAddress) -> BloodBankResult<Option<UserRecord>> {
        let query = Query::table(USER_TABLE).eq("email", email.as_str()).limit(1);
        Ok(fetch_rows::<UserRecord>(self.store.as_ref(), &query)
            .await?
            .into_iter()
            .next())
    }

    async fn user_by_id(&self, user_id: &UserId) -> BloodBankResult<UserRecord> {
        let query = Query::table(USER_TABLE).eq("user_id", user_id).limit(1);
        fetch_rows::<UserRecord>(self.store.as_ref(), &query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| BloodBankError::NotFound(format!("user {user_id}")))
    }

    /// Checks an email/password pair.
    ///
    /// Unknown emails and wrong passwords both yield [`BloodBankError::InvalidCredentials`],
    /// so callers cannot tell which was wrong.
    ///
    /// # Errors
    ///
    /// - [`BloodBankError::InvalidCredentials`] for a bad email or password
    /// - [`BloodBankError::AccountInactive`] for a deactivated account
    /// - [`BloodBankError::Forbidden`] for an unknown `role_id`
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> BloodBankResult<AuthenticatedUser> {
        let email = EmailAddress::parse(email).map_err(|_| BloodBankError::InvalidCredentials)?;
        let user = self
            .user_by_email(&email)
            .await?
            .ok_or(BloodBankError::InvalidCredentials)?;

        let hash = user.password_hash.as_deref().unwrap_or_default();
        if !verify_password(password, hash) {
            tracing::info!(user_id = %user.user_id, "login rejected");
            return Err(BloodBankError::InvalidCredentials);
        }
        if user.is_active == Some(false) {
            return Err(BloodBankError::AccountInactive);
        }
        let role = user
            .role_id
            .and_then(Role::from_id)
            .ok_or(BloodBankError::Forbidden)?;

        let staff_role = if role == Role::Staff {
            let query = Query::table(USER_ROLE_TABLE).eq("user_id", &user.user_id).limit(1);
            fetch_rows::<UserRoleRecord>(self.store.as_ref(), &query)
                .await?
                .into_iter()
                .next()
                .and_then(|r| r.user_staff_roles)
                .and_then(|r| r.parse().ok())
        } else {
            None
        };

        let touch = Query::table(USER_TABLE).eq("user_id", &user.user_id);
        if let Err(e) = self
            .store
            .update(&touch, json!({ "last_login_at": now.to_rfc3339() }))
            .await
        {
            tracing::warn!(user_id = %user.user_id, "failed to record last login: {}", e);
        }

        let display_name = [user.first_name.as_deref(), user.surname.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        Ok(AuthenticatedUser {
            user_id: user.user_id,
            email: email.as_str().to_string(),
            display_name,
            role,
            staff_role,
        })
    }

    /// Creates an account and, for staff, its sub-role assignment.
    ///
    /// A failed sub-role insert is logged but does not undo the account.
    ///
    /// # Errors
    ///
    /// - [`BloodBankError::Validation`] listing every invalid field
    /// - [`BloodBankError::DuplicateEmail`] when the email is already registered
    pub async fn create_user(&self, form: NewUserForm) -> BloodBankResult<UserId> {
        let user = form.validate()?;
        if self.user_by_email(&user.email).await?.is_some() {
            return Err(BloodBankError::DuplicateEmail);
        }
        let password_hash = hash_password(&user.password, self.cfg.password_iterations())?;

        let row = json!({
            "user_id": user.user_id.to_string(),
            "first_name": user.first_name.as_str(),
            "surname": user.surname.as_str(),
            "middle_name": user.middle_name.as_ref().map(|m| m.as_str()).unwrap_or_default(),
            "suffix": user.suffix.as_ref().map(|s| s.as_str()).unwrap_or_default(),
            "email": user.email.as_str(),
            "password_hash": password_hash,
            "role_id": user.role.id(),
            "is_active": true,
        });
        let created = self.store.insert(USER_TABLE, row).await?;
        if created.is_empty() {
            return Err(BloodBankError::InvalidInput("failed to create user".into()));
        }

        if let Some(staff_role) = user.staff_role {
            let role_row = json!({
                "user_id": user.user_id.to_string(),
                "user_staff_roles": staff_role.as_str(),
            });
            if let Err(e) = self.store.insert(USER_ROLE_TABLE, role_row).await {
                tracing::warn!(user_id = %user.user_id, "user created but sub-role failed to save: {}", e);
            }
        }

        tracing::info!(user_id = %user.user_id, role = %user.role, "user created");
        Ok(user.user_id)
    }

    /// Activates or deactivates an account and returns the confirmation message.
    pub async fn update_user_status(&self, user_id: &str, is_active: bool) -> BloodBankResult<String> {
        let user_id = UserId::parse(user_id)?;
        let query = Query::table(USER_TABLE).eq("user_id", &user_id);
        let updated = self
            .store
            .update(&query, json!({ "is_active": is_active }))
            .await?;
        if updated.is_empty() {
            return Err(BloodBankError::NotFound(format!("user {user_id}")));
        }
        Ok(status_change_message(is_active))
    }

    /// Stores a new profile photo and points the user at it.
    ///
    /// The previous photo file is removed once the new one is recorded. If recording fails
    /// the new file is removed instead.
    pub async fn update_user_image(
        &self,
        user_id: &str,
        bytes: &[u8],
        now: DateTime<Utc>,
    ) -> BloodBankResult<PhotoMetadata> {
        let user_id = UserId::parse(user_id)?;
        let user = self.user_by_id(&user_id).await?;
        let uploads = UploadsService::new(self.cfg.upload_dir())?;
        let stored = uploads.store_profile_photo(&user_id.to_string(), bytes, now)?;

        let query = Query::table(USER_TABLE).eq("user_id", &user_id);
        let patch = json!({ "user_image": stored.file_name.as_str() });
        if let Err(e) = self.store.update(&query, patch).await {
            if let Err(cleanup) = uploads.remove(stored.file_name.as_str()) {
                tracing::warn!("failed to remove orphaned photo {}: {}", stored.file_name, cleanup);
            }
            return Err(e.into());
        }

        if let Some(old) = user
            .user_image
            .as_deref()
            .filter(|old| *old != stored.file_name.as_str())
        {
            if let Err(e) = uploads.remove(old) {
                tracing::warn!(user_id = %user_id, "failed to remove previous photo {}: {}", old, e);
            }
        }
        Ok(stored)
    }
}
