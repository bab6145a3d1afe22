//! Mapping from service errors to HTTP responses.

use api_shared::dto::ApiMessage;
use api_shared::AuthError;
use axum::http::StatusCode;
use axum::response::Json;
use bloodbank_core::BloodBankError;

pub type ApiRejection = (StatusCode, Json<ApiMessage>);
pub type ApiResult<T> = Result<Json<T>, ApiRejection>;

fn reply(status: StatusCode, message: impl Into<String>) -> ApiRejection {
    (status, Json(ApiMessage::failure(message)))
}

/// Logs `e` under `context` and converts it to a `{success: false}` response.
pub fn reject(context: &str, e: BloodBankError) -> ApiRejection {
    match e {
        BloodBankError::Validation(errors) => {
            tracing::info!("{} rejected: {:?}", context, errors);
            (StatusCode::BAD_REQUEST, Json(ApiMessage::invalid_form(errors)))
        }
        BloodBankError::InvalidInput(message) => {
            tracing::info!("{} rejected: {}", context, message);
            reply(StatusCode::BAD_REQUEST, message)
        }
        BloodBankError::Text(e) => reply(StatusCode::BAD_REQUEST, e.to_string()),
        BloodBankError::NotFound(what) => reply(StatusCode::NOT_FOUND, format!("Not found: {what}")),
        BloodBankError::InvalidCredentials => {
            reply(StatusCode::UNAUTHORIZED, "Invalid email or password")
        }
        BloodBankError::AccountInactive => reply(
            StatusCode::FORBIDDEN,
            "Your account is inactive. Please contact an administrator",
        ),
        BloodBankError::Forbidden => reply(StatusCode::FORBIDDEN, "Insufficient permissions"),
        BloodBankError::DuplicateEmail => reply(
            StatusCode::CONFLICT,
            "An account with this email already exists",
        ),
        BloodBankError::Upload(e) if e.is_client_error() => {
            reply(StatusCode::BAD_REQUEST, e.to_string())
        }
        e => {
            tracing::error!("{} error: {:?}", context, e);
            reply(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

pub fn reject_auth(e: AuthError) -> ApiRejection {
    match e {
        AuthError::MissingToken | AuthError::InvalidSession => {
            reply(StatusCode::UNAUTHORIZED, "Please log in to continue")
        }
        AuthError::AdminRequired => reply(StatusCode::FORBIDDEN, "Administrator access required"),
        AuthError::TokenGeneration => {
            tracing::error!("Session error: {:?}", e);
            reply(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}
