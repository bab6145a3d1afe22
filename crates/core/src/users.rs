//! User accounts: roles, account creation input and password hashing.
//!
//! New password hashes are stored as `pbkdf2-sha256$<iterations>$<salt b64>$<hash b64>`.
//! Accounts created by the older staff portal carry bcrypt (`$2y$`/`$2b$`/`$2a$`) hashes, which
//! still verify.

use crate::validation::FieldErrors;
use crate::{BloodBankError, BloodBankResult};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use bloodbank_types::{EmailAddress, NonEmptyText, UserId};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use std::fmt;
use std::str::FromStr;

const HASH_SCHEME: &str = "pbkdf2-sha256";
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;
const BCRYPT_PREFIXES: [&str; 3] = ["$2y$", "$2b$", "$2a$"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    Hospital,
    Staff,
}

impl Role {
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            1 => Some(Role::Admin),
            2 => Some(Role::Hospital),
            3 => Some(Role::Staff),
            _ => None,
        }
    }

    pub fn id(&self) -> u32 {
        match self {
            Role::Admin => 1,
            Role::Hospital => 2,
            Role::Staff => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Hospital => "hospital",
            Role::Staff => "staff",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaffRole {
    Interviewer,
    Reviewer,
    Physician,
    Phlebotomist,
}

impl StaffRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            StaffRole::Interviewer => "interviewer",
            StaffRole::Reviewer => "reviewer",
            StaffRole::Physician => "physician",
            StaffRole::Phlebotomist => "phlebotomist",
        }
    }
}

impl FromStr for StaffRole {
    type Err = BloodBankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "interviewer" => Ok(StaffRole::Interviewer),
            "reviewer" => Ok(StaffRole::Reviewer),
            "physician" => Ok(StaffRole::Physician),
            "phlebotomist" => Ok(StaffRole::Phlebotomist),
            other => Err(BloodBankError::InvalidInput(format!(
                "unknown staff role: {other}"
            ))),
        }
    }
}

/// Raw create-user input as submitted by an administrator.
#[derive(Debug, Clone, Default)]
pub struct NewUserForm {
    pub first_name: Option<String>,
    pub surname: Option<String>,
    pub middle_name: Option<String>,
    pub suffix: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role_id: Option<u32>,
    pub subrole: Option<String>,
}

/// Validated account ready to be written.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub user_id: UserId,
    pub first_name: NonEmptyText,
    pub surname: NonEmptyText,
    pub middle_name: Option<NonEmptyText>,
    pub suffix: Option<NonEmptyText>,
    pub email: EmailAddress,
    pub password: String,
    pub role: Role,
    pub staff_role: Option<StaffRole>,
}

impl NewUserForm {
    /// Checks every field and assigns a fresh user id.
    ///
    /// Staff accounts (role 3) must name a sub-role.
    pub fn validate(self) -> BloodBankResult<NewUser> {
        let mut errors = FieldErrors::new();
        let first_name = errors.require("first_name", self.first_name.as_deref());
        let surname = errors.require("surname", self.surname.as_deref());
        let email = errors
            .require("email", self.email.as_deref())
            .and_then(|raw| match EmailAddress::parse(raw) {
                Ok(email) => Some(email),
                Err(e) => {
                    errors.push(e.to_string());
                    None
                }
            });
        let password = match self.password.as_deref() {
            Some(p) if !p.is_empty() => Some(p.to_string()),
            _ => {
                errors.push("password is required");
                None
            }
        };
        let role = match self.role_id {
            None | Some(0) => {
                errors.push("role_id is required");
                None
            }
            Some(id) => {
                let role = Role::from_id(id);
                if role.is_none() {
                    errors.push(format!("unknown role_id: {id}"));
                }
                role
            }
        };
        let staff_role = match (role, self.subrole.as_deref().map(str::trim)) {
            (Some(Role::Staff), None | Some("")) => {
                errors.push("Staff subrole is required");
                None
            }
            (Some(Role::Staff), Some(raw)) => match raw.parse::<StaffRole>() {
                Ok(r) => Some(r),
                Err(e) => {
                    errors.push(e.to_string());
                    None
                }
            },
            _ => None,
        };
        errors.finish()?;

        match (first_name, surname, email, password, role) {
            (Some(first_name), Some(surname), Some(email), Some(password), Some(role)) => {
                Ok(NewUser {
                    user_id: UserId::new(),
                    first_name: NonEmptyText::new(first_name)?,
                    surname: NonEmptyText::new(surname)?,
                    middle_name: NonEmptyText::from_optional(self.middle_name.as_deref()),
                    suffix: NonEmptyText::from_optional(self.suffix.as_deref()),
                    email,
                    password,
                    role,
                    staff_role,
                })
            }
            _ => Err(BloodBankError::InvalidInput("incomplete user form".into())),
        }
    }
}

/// Hashes `password` with a fresh random salt.
pub fn hash_password(password: &str, iterations: u32) -> BloodBankResult<String> {
    if password.is_empty() {
        return Err(BloodBankError::InvalidInput("password cannot be empty".into()));
    }
    let iterations = iterations.max(1);
    let mut salt = [0u8; SALT_LEN];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|_| BloodBankError::PasswordHash)?;
    let key = derive_key(password, &salt, iterations);
    Ok(format!(
        "{HASH_SCHEME}${iterations}${}${}",
        B64.encode(salt),
        B64.encode(key)
    ))
}

/// False for wrong passwords and for hashes in any other format.
pub fn verify_password(password: &str, stored: &str) -> bool {
    if BCRYPT_PREFIXES.iter().any(|p| stored.starts_with(p)) {
        return bcrypt::verify(password, stored).unwrap_or_else(|e| {
            tracing::warn!("unreadable bcrypt hash: {}", e);
            false
        });
    }
    let mut parts = stored.split('$');
    let (Some(scheme), Some(iterations), Some(salt), Some(hash), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };
    if scheme != HASH_SCHEME {
        return false;
    }
    let (Ok(iterations), Ok(salt), Ok(expected)) =
        (iterations.parse::<u32>(), B64.decode(salt), B64.decode(hash))
    else {
        return false;
    };
    if iterations == 0 || expected.len() != KEY_LEN {
        return false;
    }
    let actual = derive_key(password, &salt, iterations);
    // Compare without short-circuiting on the first differing byte.
    actual
        .iter()
        .zip(expected.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

fn derive_key(password: &str, salt: &[u8], iterations: u32) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key);
    key
}

/// Confirmation text for an activation change.
pub fn status_change_message(is_active: bool) -> String {
    format!(
        "User has been {} successfully",
        if is_active { "activated" } else { "deactivated" }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> NewUserForm {
        NewUserForm {
            first_name: Some("Ana".into()),
            surname: Some("Lopez".into()),
            email: Some("Ana@Example.org".into()),
            password: Some("s3cret!".into()),
            role_id: Some(3),
            subrole: Some("Physician".into()),
            ..Default::default()
        }
    }

    #[test]
    fn valid_staff_form_produces_user() {
        let user = form().validate().unwrap();
        assert_eq!(user.role, Role::Staff);
        assert_eq!(user.staff_role, Some(StaffRole::Physician));
        assert_eq!(user.email.as_str(), "ana@example.org");
        assert_eq!(user.user_id.to_string().len(), 36);
    }

    #[test]
    fn staff_requires_subrole_but_admin_does_not() {
        let missing = NewUserForm { subrole: None, ..form() }.validate().unwrap_err();
        assert!(missing.to_string().contains("Staff subrole is required"));

        let admin = NewUserForm { role_id: Some(1), subrole: None, ..form() }
            .validate()
            .unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert_eq!(admin.staff_role, None);
    }

    #[test]
    fn reports_all_missing_fields() {
        let err = NewUserForm::default().validate().unwrap_err();
        match err {
            BloodBankError::Validation(messages) => assert_eq!(messages.len(), 5),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn password_round_trip_and_rejection() {
        let hash = hash_password("correct horse", 10).unwrap();
        assert!(hash.starts_with("pbkdf2-sha256$10$"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert_ne!(hash, hash_password("correct horse", 10).unwrap());
    }

    #[test]
    fn legacy_bcrypt_hashes_verify() {
        // crypt_blowfish reference vector with the `$2y$` prefix the older portal writes.
        let legacy = "$2y$05$CCCCCCCCCCCCCCCCCCCCC.E5YPO9kmyuRGyh0XouQYb4YMJKvyOeW";
        assert!(verify_password("U*U", legacy));
        assert!(!verify_password("U*V", legacy));

        let hashed = bcrypt::hash("secret", 4).unwrap();
        let legacy_style = hashed.replacen("$2b$", "$2y$", 1);
        assert!(verify_password("secret", &hashed));
        assert!(verify_password("secret", &legacy_style));
        assert!(!verify_password("Secret", &legacy_style));
    }

    #[test]
    fn malformed_hashes_never_verify() {
        assert!(!verify_password("pw", "$2y$10$abcdefghijklmnopqrstuv"));
        assert!(!verify_password("pw", "pbkdf2-sha256$0$AAAA$AAAA"));
        assert!(!verify_password("pw", "md5$abc"));
        assert!(!verify_password("pw", ""));
    }

    #[test]
    fn status_messages() {
        assert_eq!(status_change_message(true), "User has been activated successfully");
        assert_eq!(status_change_message(false), "User has been deactivated successfully");
    }
}
