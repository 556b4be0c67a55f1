//! Aura Impact Server
//!
//! HTTP surface for the verification core, evidence uploads, the mission
//! catalog, profiles and the leaderboard.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{ApiError, VerifyError};
use crate::evidence::{EvidenceError, EvidenceStore, LocalEvidenceStore, StoredEvidence};
use crate::judge::{judge_from_config, AuthenticityJudge};
use crate::models::{
    LeaderboardEntry, LedgerEntry, Mission, NewMission, NewProfile, Profile, ProfileUpdate,
    RewardUpdate, POINTS_PER_LEVEL,
};
use crate::orchestrator::{ImpactVerifier, VerifierSettings, VerifyImpactRequest, VerifyImpactResponse};
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::store::{PgStorage, SqliteStore, Stores};

const DEFAULT_LEADERBOARD_LIMIT: usize = 10;
const MAX_LEADERBOARD_LIMIT: usize = 100;
const DEFAULT_PROOFS_LIMIT: usize = 50;
const MAX_PROOFS_LIMIT: usize = 200;

/// Header naming the caller for owner-only profile edits
pub const USER_HEADER: &str = "x-aura-user";

pub struct AppState {
    pub verifier: ImpactVerifier,
    pub stores: Stores,
    pub evidence: Arc<dyn EvidenceStore>,
    pub reconciler: Reconciler,
    pub config: Config,
    pub started_at: std::time::Instant,
}

impl AppState {
    pub fn new(
        config: Config,
        stores: Stores,
        judge: Arc<dyn AuthenticityJudge>,
        evidence: Arc<dyn EvidenceStore>,
    ) -> Self {
        let verifier = ImpactVerifier::new(
            stores.clone(),
            judge,
            VerifierSettings::from(&config.verification),
        );
        let reconciler = Reconciler::new(stores.ledger.clone(), verifier.accountant().clone());
        Self {
            verifier,
            stores,
            evidence,
            reconciler,
            config,
            started_at: std::time::Instant::now(),
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config.evidence.max_upload_bytes;
    Router::new()
        .route("/health", get(health_handler))
        .route("/config", get(config_handler))
        .route("/verify-impact", post(verify_impact_handler))
        .route(
            "/evidence",
            post(upload_evidence_handler).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/evidence/:key", get(serve_evidence_handler))
        .route("/missions", get(list_missions_handler).post(create_mission_handler))
        .route("/missions/:id", get(get_mission_handler))
        .route("/missions/:id/reward", put(update_reward_handler))
        .route("/profiles", post(create_profile_handler))
        .route(
            "/profiles/:id",
            get(get_profile_handler).patch(update_profile_handler),
        )
        .route("/profiles/:id/proofs", get(profile_proofs_handler))
        .route("/proofs/:id", get(get_proof_handler))
        .route("/leaderboard", get(leaderboard_handler))
        .route("/admin/reconcile", post(reconcile_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// HEALTH / CONFIG
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub uptime_secs: u64,
    pub version: String,
    pub judge: String,
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        healthy: true,
        uptime_secs: state.started_at.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        judge: state.verifier.judge_name().to_string(),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicConfig {
    pub judge: String,
    pub once_per_mission: bool,
    pub judge_timeout_secs: u64,
    pub max_upload_bytes: usize,
    pub points_per_level: i64,
}

async fn config_handler(State(state): State<Arc<AppState>>) -> Json<PublicConfig> {
    Json(PublicConfig {
        judge: state.config.judge.kind.clone(),
        once_per_mission: state.config.verification.once_per_mission,
        judge_timeout_secs: state.config.verification.judge_timeout_secs,
        max_upload_bytes: state.config.evidence.max_upload_bytes,
        points_per_level: POINTS_PER_LEVEL,
    })
}

// ============================================================================
// POST /verify-impact
// ============================================================================

async fn verify_impact_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<VerifyImpactRequest>, JsonRejection>,
) -> (StatusCode, Json<VerifyImpactResponse>) {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            let err = VerifyError::InvalidRequest(rejection.body_text());
            return (err.status_code(), Json(VerifyImpactResponse::from(&err)));
        }
    };

    // Detached so a dropped connection cannot stop between ledger write and credit
    let task_state = state.clone();
    let handle = tokio::spawn(async move { task_state.verifier.verify(&request).await });

    match handle.await {
        Ok(Ok(outcome)) => (StatusCode::OK, Json(VerifyImpactResponse::from(&outcome))),
        Ok(Err(err)) => (err.status_code(), Json(VerifyImpactResponse::from(&err))),
        Err(e) => {
            error!("Verification task failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(VerifyImpactResponse::Error {
                    error_kind: "Internal".to_string(),
                    message: "Verification task failed".to_string(),
                    retryable: true,
                    ledger_entry_id: None,
                }),
            )
        }
    }
}

// ============================================================================
// EVIDENCE
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub filename: Option<String>,
}

async fn upload_evidence_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Result<(StatusCode, Json<StoredEvidence>), (StatusCode, Json<VerifyImpactResponse>)> {
    let filename = query.filename.unwrap_or_else(|| "evidence".to_string());

    match state.evidence.upload(&body, &filename).await {
        Ok(stored) => Ok((StatusCode::CREATED, Json(stored))),
        Err(e) => {
            match &e {
                EvidenceError::Io(_) => error!("Evidence upload failed: {}", e),
                _ => warn!("Evidence upload refused: {}", e),
            }
            let err = VerifyError::EvidenceUploadFailed(e.to_string());
            Err((err.status_code(), Json(VerifyImpactResponse::from(&err))))
        }
    }
}

async fn serve_evidence_handler(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let valid_key = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if !valid_key {
        return Err(ApiError::NotFound(format!("Evidence {}", key)));
    }

    let path: PathBuf = state.config.evidence.directory.join(&key);
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(([(header::CONTENT_TYPE, content_type_for(&key))], bytes).into_response()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ApiError::NotFound(format!("Evidence {}", key)))
        }
        Err(e) => Err(ApiError::Internal(format!("reading {}: {}", path.display(), e))),
    }
}

fn content_type_for(key: &str) -> &'static str {
    let ext = key.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        _ => "application/octet-stream",
    }
}

// ============================================================================
// MISSIONS
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct MissionsQuery {
    pub host: Option<String>,
}

async fn list_missions_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MissionsQuery>,
) -> Result<Json<Vec<Mission>>, ApiError> {
    let missions = state
        .stores
        .missions
        .list_missions(query.host.as_deref())
        .await?;
    Ok(Json(missions))
}

async fn create_mission_handler(
    State(state): State<Arc<AppState>>,
    Json(mission): Json<NewMission>,
) -> Result<(StatusCode, Json<Mission>), ApiError> {
    mission.validate().map_err(ApiError::BadRequest)?;

    match state.stores.missions.create_mission(mission).await? {
        Some(created) => {
            info!("Mission {} created: {} ({} AP)", created.id, created.title, created.reward_ap);
            Ok((StatusCode::CREATED, Json(created)))
        }
        None => Err(ApiError::Conflict("Mission id already exists".to_string())),
    }
}

async fn get_mission_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Mission>, ApiError> {
    state
        .stores
        .missions
        .get_mission(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Mission {}", id)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardChange {
    #[serde(alias = "reward_ap")]
    pub reward_ap: i64,
}

async fn update_reward_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(change): Json<RewardChange>,
) -> Result<Json<Mission>, ApiError> {
    if change.reward_ap <= 0 {
        return Err(ApiError::BadRequest(format!(
            "Mission reward must be positive (got {})",
            change.reward_ap
        )));
    }

    match state
        .stores
        .missions
        .update_mission_reward(&id, change.reward_ap)
        .await?
    {
        RewardUpdate::Updated(mission) => {
            info!("Mission {} reward set to {} AP", mission.id, mission.reward_ap);
            Ok(Json(mission))
        }
        RewardUpdate::Locked => Err(ApiError::Conflict(
            "Reward is locked once a proof has been verified".to_string(),
        )),
        RewardUpdate::NotFound => Err(ApiError::NotFound(format!("Mission {}", id))),
    }
}

// ============================================================================
// PROFILES
// ============================================================================

async fn create_profile_handler(
    State(state): State<Arc<AppState>>,
    Json(profile): Json<NewProfile>,
) -> Result<(StatusCode, Json<Profile>), ApiError> {
    if profile.id.trim().is_empty() || profile.username.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Profile id and username are required".to_string(),
        ));
    }

    match state.stores.profiles.create_profile(profile).await? {
        Some(created) => {
            info!("Profile {} created ({})", created.id, created.username);
            Ok((StatusCode::CREATED, Json(created)))
        }
        None => Err(ApiError::Conflict("Profile already exists".to_string())),
    }
}

async fn get_profile_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Profile>, ApiError> {
    state
        .stores
        .profiles
        .get_profile(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Profile {}", id)))
}

async fn update_profile_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<Profile>, ApiError> {
    let caller = headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if caller != id {
        return Err(ApiError::Forbidden(
            "Profiles can only be edited by their owner".to_string(),
        ));
    }
    if update.is_empty() {
        return Err(ApiError::BadRequest("Nothing to update".to_string()));
    }
    if matches!(&update.username, Some(name) if name.trim().is_empty()) {
        return Err(ApiError::BadRequest("Username cannot be empty".to_string()));
    }

    state
        .stores
        .profiles
        .update_profile(&id, update)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Profile {}", id)))
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

async fn profile_proofs_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<LedgerEntry>>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PROOFS_LIMIT)
        .clamp(1, MAX_PROOFS_LIMIT);
    let entries = state.stores.ledger.entries_for_user(&id, limit).await?;
    Ok(Json(entries))
}

async fn get_proof_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<LedgerEntry>, ApiError> {
    state
        .stores
        .ledger
        .get_entry(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Proof {}", id)))
}

async fn leaderboard_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<LeaderboardEntry>>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LEADERBOARD_LIMIT)
        .clamp(1, MAX_LEADERBOARD_LIMIT);
    let board = state.stores.profiles.leaderboard(limit).await?;
    Ok(Json(board))
}

// ============================================================================
// POST /admin/reconcile
// ============================================================================

async fn reconcile_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReconcileReport>, ApiError> {
    let report = state
        .reconciler
        .run_once(state.config.reconcile.batch_size)
        .await?;
    Ok(Json(report))
}

/// Open the configured backend, seed the catalog, start reconciliation
/// and serve until the listener fails
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let stores = match config.database.database_url() {
        Some(url) => {
            let storage = Arc::new(PgStorage::new(&url).await?);
            info!("PostgreSQL storage initialized");
            Stores::from_backend(storage)
        }
        None => {
            let storage = Arc::new(SqliteStore::new(&config.database.sqlite_path)?);
            Stores::from_backend(storage)
        }
    };
    stores.seed_missions(&config.missions).await?;

    let judge: Arc<dyn AuthenticityJudge> = Arc::from(judge_from_config(&config.judge)?);
    info!("Authenticity judge: {}", judge.name());

    let evidence = Arc::new(
        LocalEvidenceStore::new(&config.evidence)
            .await
            .context("creating evidence directory")?,
    );

    let interval = Duration::from_secs(config.reconcile.interval_secs.max(1));
    let batch_size = config.reconcile.batch_size;
    let state = Arc::new(AppState::new(config, stores, judge, evidence));

    tokio::spawn(state.reconciler.clone().run_every(interval, batch_size));
    info!(
        "Background reconciliation started (every {} seconds)",
        interval.as_secs()
    );

    run_server(state).await
}

/// Run the server
pub async fn run_server(state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let app = create_router(state);

    info!("Starting Aura Impact server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
