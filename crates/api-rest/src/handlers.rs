//! HTTP handlers. Each one validates its inputs, calls a core service and maps the result
//! onto the shared JSON bodies.

use crate::error::{reject, reject_auth, ApiResult};
use crate::{AppState, SessionToken};
use api_shared::dto::{
    ApiMessage, CreateUserReq, CreateUserRes, DeferralRes, DonorStagePageRes, DonorStageDto,
    DonorStageRes, DuplicateCheckReq, DuplicateCheckRes, HealthRes, HospitalRequestDto,
    HospitalRequestsRes, InventoryRes, LoginReq, LoginRes, MedicalApprovalReq,
    MedicalReviewCountsDto, MedicalReviewRowDto, MedicalReviewSummaryRes, PageMeta,
    PendingDonationsRes, PhotoUploadReq, PhotoUploadRes, SessionUser, UpdateUserStatusReq,
};
use api_shared::{AuthContext, HealthService};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use bloodbank_core::eligibility::DuplicateQuery;
use bloodbank_core::StageQueueParams;
use chrono::Utc;
use serde::Deserialize;
use utoipa::IntoParams;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StageListQuery {
    /// all, incoming, active, today, pending, completed, deferred, or a stage name
    pub status: Option<String>,
    /// Donor id or part of a name
    pub search: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReviewQuery {
    /// incoming, approved or declined
    pub status: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RequestStatusQuery {
    /// Request status, matched case-insensitively
    pub status: Option<String>,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// Used for monitoring and load balancer health checks. Does not require a session.
#[axum::debug_handler]
pub async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginReq,
    responses(
        (status = 200, description = "Session opened", body = LoginRes),
        (status = 401, description = "Invalid email or password", body = ApiMessage),
        (status = 403, description = "Inactive account", body = ApiMessage)
    )
)]
/// Log in with email and password
///
/// # Returns
/// * `Ok(Json<LoginRes>)` - Bearer token, its expiry and the logged-in user
///
/// # Errors
/// Returns `401 Unauthorized` for an unknown email or wrong password, and
/// `403 Forbidden` for a deactivated account.
#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginReq>,
) -> ApiResult<LoginRes> {
    let now = Utc::now();
    let user = state
        .users
        .authenticate(&req.email, &req.password, now)
        .await
        .map_err(|e| reject("Login", e))?;
    let session_user = SessionUser::from(&user);
    let issued = state
        .sessions
        .issue(user, now)
        .await
        .map_err(reject_auth)?;
    tracing::info!(user_id = %session_user.user_id, role = %session_user.role, "user logged in");
    Ok(Json(LoginRes {
        success: true,
        token: issued.token,
        expires_at: issued.expires_at.to_rfc3339(),
        user: session_user,
    }))
}

#[utoipa::path(
    post,
    path = "/logout",
    responses(
        (status = 200, description = "Session closed", body = ApiMessage),
        (status = 401, description = "No live session", body = ApiMessage)
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn logout(
    State(state): State<AppState>,
    Extension(token): Extension<SessionToken>,
) -> ApiResult<ApiMessage> {
    state.sessions.revoke(&token.0).await;
    Ok(Json(ApiMessage::ok("Logged out successfully")))
}

#[utoipa::path(
    get,
    path = "/donors/stages",
    params(StageListQuery),
    responses(
        (status = 200, description = "One page of the donor work queue", body = DonorStagePageRes),
        (status = 401, description = "No live session", body = ApiMessage)
    ),
    security(("bearer" = []))
)]
/// List donors with their reconciled stage and status
///
/// Duplicate registrations of the same person are folded together. Rows are oldest first.
/// An unknown `status` lists everything; a `page` past the end returns the last page.
#[axum::debug_handler]
pub async fn list_donor_stages(
    State(state): State<AppState>,
    Query(query): Query<StageListQuery>,
) -> ApiResult<DonorStagePageRes> {
    let params = StageQueueParams {
        status: query.status,
        search: query.search,
        page: query.page,
        per_page: query.per_page,
    };
    let page = state
        .donors
        .stage_queue(params, Utc::now())
        .await
        .map_err(|e| reject("List donor stages", e))?;
    Ok(Json(DonorStagePageRes::from(&page)))
}

#[utoipa::path(
    get,
    path = "/donors/{id}/stage",
    params(("id" = String, Path, description = "Donor id")),
    responses(
        (status = 200, description = "Stage of one donor record", body = DonorStageRes),
        (status = 400, description = "Malformed donor id", body = ApiMessage),
        (status = 404, description = "Unknown donor", body = ApiMessage)
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn donor_stage(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<DonorStageRes> {
    let view = state
        .donors
        .stage_for(&id)
        .await
        .map_err(|e| reject("Donor stage", e))?;
    Ok(Json(DonorStageRes {
        success: true,
        donor: DonorStageDto::from(&view),
    }))
}

#[utoipa::path(
    get,
    path = "/donors/{id}/deferral",
    params(("id" = String, Path, description = "Donor id")),
    responses(
        (status = 200, description = "Deferral state from the latest physical examination", body = DeferralRes),
        (status = 400, description = "Malformed donor id", body = ApiMessage)
    ),
    security(("bearer" = []))
)]
/// Check whether a donor is deferred or refused
///
/// A donor with no physical examination is reported as not deferred.
#[axum::debug_handler]
pub async fn donor_deferral(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<DeferralRes> {
    let status = state
        .donors
        .check_deferral(&id)
        .await
        .map_err(|e| reject("Deferral check", e))?;
    Ok(Json(DeferralRes::from(&status)))
}

#[utoipa::path(
    get,
    path = "/donations/pending",
    params(PageQuery),
    responses(
        (status = 200, description = "Pending donations with their pipeline label", body = PendingDonationsRes)
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn pending_donations(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<PendingDonationsRes> {
    let page = state
        .donors
        .pending_donations(query.page, query.per_page)
        .await
        .map_err(|e| reject("Pending donations", e))?;
    Ok(Json(PendingDonationsRes::from(&page)))
}

#[utoipa::path(
    get,
    path = "/medical-history/summary",
    params(ReviewQuery),
    responses(
        (status = 200, description = "Reviewer counts and one page of rows", body = MedicalReviewSummaryRes)
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn medical_review_summary(
    State(state): State<AppState>,
    Query(query): Query<ReviewQuery>,
) -> ApiResult<MedicalReviewSummaryRes> {
    let summary = state
        .donors
        .medical_review_summary(query.status.as_deref(), query.page, query.per_page)
        .await
        .map_err(|e| reject("Medical review summary", e))?;
    Ok(Json(MedicalReviewSummaryRes {
        success: true,
        counts: MedicalReviewCountsDto::from(&summary.counts),
        rows: summary.rows.items.iter().map(MedicalReviewRowDto::from).collect(),
        pagination: PageMeta::from(&summary.rows),
    }))
}

#[utoipa::path(
    post,
    path = "/medical-history/{donor_id}/approval",
    params(("donor_id" = String, Path, description = "Donor id")),
    request_body = MedicalApprovalReq,
    responses(
        (status = 200, description = "Decision recorded", body = ApiMessage),
        (status = 400, description = "Unknown decision or malformed id", body = ApiMessage),
        (status = 404, description = "Donor has no medical history", body = ApiMessage)
    ),
    security(("bearer" = []))
)]
/// Record the reviewer's decision on a donor's medical history
#[axum::debug_handler]
pub async fn update_medical_approval(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(donor_id): Path<String>,
    Json(req): Json<MedicalApprovalReq>,
) -> ApiResult<ApiMessage> {
    state
        .donors
        .update_medical_approval(&donor_id, &req.medical_approval, Utc::now())
        .await
        .map_err(|e| reject("Update medical approval", e))?;
    tracing::info!(donor_id = %donor_id, reviewer = %ctx.user_id, "medical approval recorded");
    Ok(Json(ApiMessage::ok("Medical approval updated successfully")))
}

#[utoipa::path(
    post,
    path = "/donors/duplicate-check",
    request_body = DuplicateCheckReq,
    responses(
        (status = 200, description = "Earlier registration with donation history, if any", body = DuplicateCheckRes),
        (status = 400, description = "Missing or malformed fields", body = ApiMessage)
    ),
    security(("bearer" = []))
)]
/// Look for an earlier registration of the same person
///
/// Matches on surname, first name, middle name and birthdate (`YYYY-MM-DD`). Only donors
/// with an eligibility record count as duplicates.
#[axum::debug_handler]
pub async fn duplicate_check(
    State(state): State<AppState>,
    Json(req): Json<DuplicateCheckReq>,
) -> ApiResult<DuplicateCheckRes> {
    let query = DuplicateQuery::from_form(
        req.surname.as_deref(),
        req.first_name.as_deref(),
        req.middle_name.as_deref(),
        req.birthdate.as_deref(),
    )
    .map_err(|e| reject("Duplicate check", e))?;
    let found = state
        .donors
        .check_duplicate(&query, Utc::now())
        .await
        .map_err(|e| reject("Duplicate check", e))?;
    Ok(Json(DuplicateCheckRes::from(found.as_ref())))
}

#[utoipa::path(
    get,
    path = "/inventory",
    responses(
        (status = 200, description = "Blood unit counts and listings", body = InventoryRes)
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn inventory(State(state): State<AppState>) -> ApiResult<InventoryRes> {
    let snapshot = state
        .inventory
        .snapshot(Utc::now())
        .await
        .map_err(|e| reject("Inventory", e))?;
    Ok(Json(InventoryRes::from(&snapshot)))
}

#[utoipa::path(
    get,
    path = "/hospital-requests",
    params(RequestStatusQuery),
    responses(
        (status = 200, description = "Requests, most urgent first", body = HospitalRequestsRes)
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn hospital_requests(
    State(state): State<AppState>,
    Query(query): Query<RequestStatusQuery>,
) -> ApiResult<HospitalRequestsRes> {
    let requests = state
        .requests
        .list(query.status.as_deref(), Utc::now())
        .await
        .map_err(|e| reject("Hospital requests", e))?;
    Ok(Json(HospitalRequestsRes {
        success: true,
        requests: requests.iter().map(HospitalRequestDto::from).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/users",
    request_body = CreateUserReq,
    responses(
        (status = 201, description = "User created", body = CreateUserRes),
        (status = 400, description = "Invalid form", body = ApiMessage),
        (status = 403, description = "Caller is not an administrator", body = ApiMessage),
        (status = 409, description = "Email already registered", body = ApiMessage)
    ),
    security(("bearer" = []))
)]
/// Create a user account (administrators only)
///
/// # Errors
/// Returns `400 Bad Request` with every field problem listed in `errors`.
#[axum::debug_handler]
pub async fn create_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<CreateUserReq>,
) -> Result<(StatusCode, Json<CreateUserRes>), crate::error::ApiRejection> {
    ctx.require_admin().map_err(reject_auth)?;
    let user_id = state
        .users
        .create_user(req.into())
        .await
        .map_err(|e| reject("Create user", e))?;
    Ok((
        StatusCode::CREATED,
        Json(CreateUserRes {
            success: true,
            message: "User created successfully".into(),
            user_id: user_id.to_string(),
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/users/status",
    request_body = UpdateUserStatusReq,
    responses(
        (status = 200, description = "Status changed", body = ApiMessage),
        (status = 400, description = "Malformed user id", body = ApiMessage),
        (status = 403, description = "Caller is not an administrator", body = ApiMessage),
        (status = 404, description = "Unknown user", body = ApiMessage)
    ),
    security(("bearer" = []))
)]
/// Activate or deactivate a user account (administrators only)
#[axum::debug_handler]
pub async fn update_user_status(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<UpdateUserStatusReq>,
) -> ApiResult<ApiMessage> {
    ctx.require_admin().map_err(reject_auth)?;
    let message = state
        .users
        .update_user_status(&req.user_id, req.is_active)
        .await
        .map_err(|e| reject("Update user status", e))?;
    if !req.is_active {
        let ended = state.sessions.revoke_user(&req.user_id).await;
        tracing::info!(user_id = %req.user_id, sessions = ended, "user deactivated");
    }
    Ok(Json(ApiMessage::ok(message)))
}

#[utoipa::path(
    post,
    path = "/users/me/photo",
    request_body = PhotoUploadReq,
    responses(
        (status = 200, description = "Photo stored", body = PhotoUploadRes),
        (status = 400, description = "Not a JPEG, PNG or WEBP image, or over 2 MiB", body = ApiMessage)
    ),
    security(("bearer" = []))
)]
/// Replace the logged-in user's profile photo
#[axum::debug_handler]
pub async fn upload_profile_photo(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<PhotoUploadReq>,
) -> ApiResult<PhotoUploadRes> {
    let bytes = B64.decode(req.image_base64.trim()).map_err(|e| {
        tracing::info!("Photo upload rejected: {}", e);
        (
            StatusCode::BAD_REQUEST,
            Json(ApiMessage::failure("Image must be base64 encoded")),
        )
    })?;
    let stored = state
        .users
        .update_user_image(&ctx.user_id, &bytes, Utc::now())
        .await
        .map_err(|e| reject("Photo upload", e))?;
    Ok(Json(PhotoUploadRes {
        success: true,
        file_name: stored.file_name.to_string(),
        media_type: stored.media_type.to_string(),
        size_bytes: stored.size_bytes,
        sha256: stored.sha256,
    }))
}
