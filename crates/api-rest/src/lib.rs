//! # API REST
//!
//! REST API for the blood bank donor workflow.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - Bearer-token sessions and the administrator check
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, request tracing)
//!
//! Uses `api-shared` for wire types and sessions and `bloodbank-core` for everything else.

#![warn(rust_2018_idioms)]

pub mod error;
pub mod handlers;

use api_shared::dto;
use api_shared::SessionStore;
use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::header::AUTHORIZATION,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use bloodbank_core::{
    CoreConfig, DonorService, HospitalRequestService, InventoryService, RecordStore, UserService,
};
use chrono::Utc;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

/// Base64 inflates a 2 MiB photo to about 2.7 MiB of JSON.
const PHOTO_BODY_LIMIT: usize = 4 * 1024 * 1024;

/// Application state shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<CoreConfig>,
    pub donors: DonorService,
    pub inventory: InventoryService,
    pub requests: HospitalRequestService,
    pub users: UserService,
    pub sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn new(cfg: Arc<CoreConfig>, store: Arc<dyn RecordStore>) -> Self {
        Self {
            donors: DonorService::new(cfg.clone(), store.clone()),
            inventory: InventoryService::new(store.clone()),
            requests: HospitalRequestService::new(store.clone()),
            users: UserService::new(cfg.clone(), store),
            sessions: Arc::new(SessionStore::new(cfg.session_ttl())),
            cfg,
        }
    }
}

/// Bearer token of the current request, kept so `/logout` can revoke it.
#[derive(Debug, Clone)]
pub struct SessionToken(pub String);

/// Resolves the bearer token and attaches the caller's [`api_shared::AuthContext`].
async fn require_session(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let token = match api_shared::auth::bearer_token(header) {
        Ok(token) => token.to_string(),
        Err(e) => return error::reject_auth(e).into_response(),
    };
    let ctx = match state.sessions.resolve(&token, Utc::now()).await {
        Ok(ctx) => ctx,
        Err(e) => return error::reject_auth(e).into_response(),
    };
    req.extensions_mut().insert(ctx);
    req.extensions_mut().insert(SessionToken(token));
    next.run(req).await
}

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::login,
        handlers::logout,
        handlers::list_donor_stages,
        handlers::donor_stage,
        handlers::donor_deferral,
        handlers::pending_donations,
        handlers::medical_review_summary,
        handlers::update_medical_approval,
        handlers::duplicate_check,
        handlers::inventory,
        handlers::hospital_requests,
        handlers::create_user,
        handlers::update_user_status,
        handlers::upload_profile_photo,
    ),
    components(schemas(
        dto::HealthRes,
        dto::ApiMessage,
        dto::PageMeta,
        dto::LoginReq,
        dto::LoginRes,
        dto::SessionUser,
        dto::DonorStageDto,
        dto::DonorStagePageRes,
        dto::DonorStageRes,
        dto::PendingDonationDto,
        dto::PendingDonationsRes,
        dto::MedicalReviewCountsDto,
        dto::MedicalReviewRowDto,
        dto::MedicalReviewSummaryRes,
        dto::MedicalApprovalReq,
        dto::DeferralRes,
        dto::DuplicateCheckReq,
        dto::DuplicateDonorDto,
        dto::DuplicateCheckRes,
        dto::InventoryUnitDto,
        dto::BloodTypeCount,
        dto::InventoryRes,
        dto::HospitalRequestDto,
        dto::HospitalRequestsRes,
        dto::CreateUserReq,
        dto::CreateUserRes,
        dto::UpdateUserStatusReq,
        dto::PhotoUploadReq,
        dto::PhotoUploadRes,
    )),
    modifiers(&BearerAuth)
)]
pub struct ApiDoc;

/// Builds the full router: public routes, session-protected routes, Swagger UI, CORS and
/// per-request tracing.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/logout", post(handlers::logout))
        .route("/donors/stages", get(handlers::list_donor_stages))
        .route("/donors/duplicate-check", post(handlers::duplicate_check))
        .route("/donors/:id/stage", get(handlers::donor_stage))
        .route("/donors/:id/deferral", get(handlers::donor_deferral))
        .route("/donations/pending", get(handlers::pending_donations))
        .route(
            "/medical-history/summary",
            get(handlers::medical_review_summary),
        )
        .route(
            "/medical-history/:donor_id/approval",
            post(handlers::update_medical_approval),
        )
        .route("/inventory", get(handlers::inventory))
        .route("/hospital-requests", get(handlers::hospital_requests))
        .route("/users", post(handlers::create_user))
        .route("/users/status", post(handlers::update_user_status))
        .route(
            "/users/me/photo",
            post(handlers::upload_profile_photo).layer(DefaultBodyLimit::max(PHOTO_BODY_LIMIT)),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/login", post(handlers::login))
        .merge(protected)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request as HttpRequest, StatusCode};
    use bloodbank_core::constants::{
        DONOR_TABLE, ELIGIBILITY_TABLE, MEDICAL_HISTORY_TABLE, SCREENING_TABLE, USER_TABLE,
    };
    use bloodbank_core::users::hash_password;
    use bloodbank_core::InMemoryStore;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::num::NonZeroUsize;
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const ADMIN_ID: &str = "6f0a6c1e-3b7c-4a52-9d0e-2f5c8e1b7a01";
    const STAFF_ID: &str = "b1d2c3e4-5f60-4718-8a9b-0c1d2e3f4a5b";

    async fn app(temp: &TempDir) -> (Router, Arc<InMemoryStore>) {
        let cfg = CoreConfig::new(
            temp.path().to_path_buf(),
            NonZeroUsize::new(2).unwrap(),
            chrono::Duration::minutes(30),
            Duration::from_secs(5),
        )
        .unwrap()
        .with_password_iterations(10);
        let store = Arc::new(InMemoryStore::new());
        let hash = hash_password("secret-pass", 10).unwrap();
        store
            .seed(
                USER_TABLE,
                vec![
                    json!({"user_id": ADMIN_ID, "email": "admin@example.org", "password_hash": hash,
                           "first_name": "Ada", "surname": "Admin", "role_id": 1, "is_active": true}),
                    json!({"user_id": STAFF_ID, "email": "staff@example.org", "password_hash": hash,
                           "first_name": "Sam", "surname": "Staff", "role_id": 3, "is_active": true}),
                ],
            )
            .await;
        let state = AppState::new(Arc::new(cfg), store.clone());
        (build_router(state), store)
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = HttpRequest::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn login(app: &Router, email: &str) -> String {
        let (status, body) = send(
            app,
            Method::POST,
            "/login",
            None,
            Some(json!({"email": email, "password": "secret-pass"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_is_public() {
        let temp = TempDir::new().unwrap();
        let (app, _) = app(&temp).await;
        let (status, body) = send(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn protected_routes_need_a_session() {
        let temp = TempDir::new().unwrap();
        let (app, _) = app(&temp).await;
        let (status, body) = send(&app, Method::GET, "/donors/stages", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);

        let (status, _) = send(&app, Method::GET, "/inventory", Some("made-up"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorised() {
        let temp = TempDir::new().unwrap();
        let (app, _) = app(&temp).await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/login",
            None,
            Some(json!({"email": "staff@example.org", "password": "nope"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid email or password");
    }

    #[tokio::test]
    async fn logout_revokes_the_token() {
        let temp = TempDir::new().unwrap();
        let (app, _) = app(&temp).await;
        let token = login(&app, "staff@example.org").await;

        let (status, _) = send(&app, Method::GET, "/inventory", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = send(&app, Method::POST, "/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        let (status, _) = send(&app, Method::GET, "/inventory", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn stage_listing_is_paginated() {
        let temp = TempDir::new().unwrap();
        let (app, store) = app(&temp).await;
        store
            .seed(
                DONOR_TABLE,
                vec![
                    json!({"donor_id": 1, "surname": "A", "first_name": "One", "submitted_at": "2024-01-01T00:00:00Z"}),
                    json!({"donor_id": 2, "surname": "B", "first_name": "Two", "submitted_at": "2024-01-02T00:00:00Z"}),
                    json!({"donor_id": 3, "surname": "C", "first_name": "Three", "submitted_at": "2024-01-03T00:00:00Z"}),
                ],
            )
            .await;
        store
            .seed(
                SCREENING_TABLE,
                vec![json!({"screening_id": 10, "donor_form_id": 2, "blood_type": "O+"})],
            )
            .await;
        let token = login(&app, "staff@example.org").await;

        let (status, body) =
            send(&app, Method::GET, "/donors/stages?page=2", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pagination"]["total_records"], 3);
        assert_eq!(body["pagination"]["total_pages"], 2);
        assert_eq!(body["donors"].as_array().unwrap().len(), 1);
        assert_eq!(body["donors"][0]["donor_id"], "3");

        let (_, body) = send(
            &app,
            Method::GET,
            "/donors/stages?status=incoming&per_page=10",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(body["pagination"]["total_records"], 3);

        let (status, body) = send(&app, Method::GET, "/donors/2/stage", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["donor"]["current_stage"], "Interviewer");
        assert_eq!(body["donor"]["blood_type"], "O+");

        let (status, _) = send(&app, Method::GET, "/donors/99/stage", Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn medical_approval_flows_into_the_summary() {
        let temp = TempDir::new().unwrap();
        let (app, store) = app(&temp).await;
        store
            .seed(
                DONOR_TABLE,
                vec![json!({"donor_id": 5, "surname": "Cruz", "first_name": "Lia"})],
            )
            .await;
        store
            .seed(MEDICAL_HISTORY_TABLE, vec![json!({"donor_id": 5})])
            .await;
        let token = login(&app, "staff@example.org").await;

        let (status, _) = send(
            &app,
            Method::POST,
            "/medical-history/5/approval",
            Some(&token),
            Some(json!({"medical_approval": "maybe"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            Method::POST,
            "/medical-history/5/approval",
            Some(&token),
            Some(json!({"medical_approval": "Approved"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(
            &app,
            Method::GET,
            "/medical-history/summary?status=approved",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(body["counts"]["approved"], 1);
        assert_eq!(body["counts"]["incoming"], 0);
        assert_eq!(body["rows"][0]["donor_id"], "5");
    }

    #[tokio::test]
    async fn duplicate_check_validates_and_reports() {
        let temp = TempDir::new().unwrap();
        let (app, store) = app(&temp).await;
        store
            .seed(
                DONOR_TABLE,
                vec![json!({"donor_id": 8, "surname": "Lim", "first_name": "Jo", "birthdate": "1991-02-03"})],
            )
            .await;
        store
            .seed(
                ELIGIBILITY_TABLE,
                vec![json!({"donor_id": 8, "status": "eligible", "created_at": "2024-01-01T00:00:00Z"})],
            )
            .await;
        let token = login(&app, "staff@example.org").await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/donors/duplicate-check",
            Some(&token),
            Some(json!({"surname": "Lim", "birthdate": "03/02/1991"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"].as_array().unwrap().len(), 2);

        let (status, body) = send(
            &app,
            Method::POST,
            "/donors/duplicate-check",
            Some(&token),
            Some(json!({"surname": "Lim", "first_name": "Jo", "birthdate": "1991-02-03"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["duplicate_found"], true);
        assert_eq!(body["donor"]["status_message"], "Ready to donate");
        assert_eq!(body["donor"]["can_donate_today"], true);
    }

    #[tokio::test]
    async fn only_admins_manage_users() {
        let temp = TempDir::new().unwrap();
        let (app, store) = app(&temp).await;
        let staff = login(&app, "staff@example.org").await;
        let admin = login(&app, "admin@example.org").await;
        let form = json!({"first_name": "Nia", "surname": "Ong", "email": "nia@example.org",
                          "password": "long-enough", "role_id": 2});

        let (status, _) =
            send(&app, Method::POST, "/users", Some(&staff), Some(form.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(&app, Method::POST, "/users", Some(&admin), Some(form)).await;
        assert_eq!(status, StatusCode::CREATED);
        let new_id = body["user_id"].as_str().unwrap().to_string();
        assert_eq!(store.rows(USER_TABLE).await.len(), 3);

        let (status, body) = send(
            &app,
            Method::POST,
            "/users",
            Some(&admin),
            Some(json!({"role_id": 3})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["errors"].as_array().unwrap().len() > 1);

        let (status, body) = send(
            &app,
            Method::POST,
            "/users/status",
            Some(&admin),
            Some(json!({"user_id": new_id, "is_active": false})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "User has been deactivated successfully");

        let (status, _) = send(
            &app,
            Method::POST,
            "/users/status",
            Some(&admin),
            Some(json!({"user_id": "12345", "is_active": true})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn deactivated_user_loses_live_sessions() {
        let temp = TempDir::new().unwrap();
        let (app, _) = app(&temp).await;
        let staff = login(&app, "staff@example.org").await;
        let admin = login(&app, "admin@example.org").await;

        let (status, _) = send(&app, Method::GET, "/donors/stages", Some(&staff), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &app,
            Method::POST,
            "/users/status",
            Some(&admin),
            Some(json!({"user_id": STAFF_ID, "is_active": false})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app, Method::GET, "/donors/stages", Some(&staff), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send(&app, Method::GET, "/inventory", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn photo_upload_checks_the_content() {
        use base64::Engine as _;

        let temp = TempDir::new().unwrap();
        let (app, store) = app(&temp).await;
        let token = login(&app, "staff@example.org").await;

        let text = base64::engine::general_purpose::STANDARD.encode(b"just some text");
        let (status, _) = send(
            &app,
            Method::POST,
            "/users/me/photo",
            Some(&token),
            Some(json!({"image_base64": text})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let png: [u8; 16] = [
            0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48,
            0x44, 0x52,
        ];
        let encoded = base64::engine::general_purpose::STANDARD.encode(png);
        let (status, body) = send(
            &app,
            Method::POST,
            "/users/me/photo",
            Some(&token),
            Some(json!({"image_base64": encoded})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["media_type"], "image/png");
        let file_name = body["file_name"].as_str().unwrap();
        assert!(temp.path().join(file_name).is_file());

        let users = store.rows(USER_TABLE).await;
        let staff = users.iter().find(|u| u["user_id"] == STAFF_ID).unwrap();
        assert_eq!(staff["user_image"], file_name);
    }

    #[tokio::test]
    async fn openapi_document_lists_every_route() {
        let doc = ApiDoc::openapi();
        assert_eq!(doc.paths.paths.len(), 15);
        assert!(doc.paths.paths.contains_key("/donors/{id}/stage"));
    }
}
