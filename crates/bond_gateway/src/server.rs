use crate::types::{AdminRequest, AdminResponse, ErrorBody, PairQuery, UpdateAffectionRequest};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bond_core::{AuditSink, BondError, HistoryRecord, RandomSource, RelationshipStore, Sentiment};
use bond_memory::{
    AdminAction, AdminOutcome, AdministrativeOverride, AffectionUpdateService, RelationshipStats, StatsQuery,
    UpdateResult, DEFAULT_HISTORY_LIMIT,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Shared state for the gateway handlers.
#[derive(Clone)]
pub struct AppState {
    updates: Arc<AffectionUpdateService>,
    admin: Arc<AdministrativeOverride>,
    stats: Arc<StatsQuery>,
    /// `/dev/relationship` answers 403 unless set.
    admin_enabled: bool,
}

impl AppState {
    pub fn new(
        store: Arc<dyn RelationshipStore>,
        audit: Option<Arc<dyn AuditSink>>,
        random: Arc<dyn RandomSource>,
        record_message_content: bool,
        admin_enabled: bool,
    ) -> Self {
        let mut updates = AffectionUpdateService::new(store.clone())
            .with_random(random)
            .record_message_content(record_message_content);
        if let Some(audit) = audit {
            updates = updates.with_audit(audit);
        }
        Self {
            updates: Arc::new(updates),
            admin: Arc::new(AdministrativeOverride::new(store.clone())),
            stats: Arc::new(StatsQuery::new(store)),
            admin_enabled,
        }
    }
}

/// The relationship HTTP server.
///
/// - `GET /health`: health check
/// - `POST /relationship/update-affection`: apply one classified turn
/// - `GET /relationship/stats`: current stats for a pair
/// - `GET /relationship/history`: audit trail, newest first
/// - `POST /dev/relationship`: administrative overrides (opt-in)
pub struct GatewayServer {
    state: AppState,
    host: String,
    port: u16,
}

impl GatewayServer {
    pub fn new(state: AppState, host: &str, port: u16) -> Self {
        Self {
            state,
            host: host.to_string(),
            port,
        }
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Start the server. This spawns a background task and returns the join handle.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        let app = self.router();
        let addr = format!("{}:{}", self.host, self.port);
        if self.state.admin_enabled {
            tracing::warn!("Administrative overrides are enabled on /dev/relationship");
        }

        tokio::spawn(async move {
            let listener = match tokio::net::TcpListener::bind(&addr).await {
                Ok(l) => l,
                Err(e) => {
                    tracing::error!("Gateway failed to bind {}: {}", addr, e);
                    return;
                }
            };
            tracing::info!("Gateway listening on {}", addr);
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("Gateway server error: {}", e);
            }
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/relationship/update-affection", post(update_affection))
        .route("/relationship/stats", get(get_stats))
        .route("/relationship/history", get(get_history))
        .route("/dev/relationship", post(dev_relationship))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    Bond(BondError),
    Forbidden,
}

impl From<BondError> for ApiError {
    fn from(e: BondError) -> Self {
        ApiError::Bond(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Bond(BondError::Validation { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Bond(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            ApiError::Bond(e) => ErrorBody {
                error: e.to_string(),
                field: e.field().map(str::to_string),
                retryable: e.is_retryable().then_some(true),
            },
            ApiError::Forbidden => ErrorBody {
                error: "administrative overrides are disabled".to_string(),
                field: None,
                retryable: None,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {:?}", self);
        }
        (status, Json(self.body())).into_response()
    }
}

// ============================================================================
// Route handlers
// ============================================================================

async fn health() -> &'static str {
    "ok"
}

/// POST /relationship/update-affection
async fn update_affection(
    State(state): State<AppState>,
    Json(req): Json<UpdateAffectionRequest>,
) -> Result<Json<UpdateResult>, ApiError> {
    let key = req.key()?;
    let sentiment: Sentiment = req.sentiment.parse()?;
    let result = state
        .updates
        .update(&key, sentiment, req.message_content.as_deref())
        .await?;
    Ok(Json(result))
}

/// GET /relationship/stats?subjectId=&counterpartId=
async fn get_stats(
    State(state): State<AppState>,
    Query(query): Query<PairQuery>,
) -> Result<Json<RelationshipStats>, ApiError> {
    let key = query.key()?;
    Ok(Json(state.stats.get(&key).await?))
}

/// GET /relationship/history?subjectId=&counterpartId=&limit=
async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<PairQuery>,
) -> Result<Json<Vec<HistoryRecord>>, ApiError> {
    let key = query.key()?;
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Ok(Json(state.updates.history(&key, limit).await?))
}

/// POST /dev/relationship
async fn dev_relationship(
    State(state): State<AppState>,
    Json(req): Json<AdminRequest>,
) -> Result<Json<AdminResponse>, ApiError> {
    if !state.admin_enabled {
        return Err(ApiError::Forbidden);
    }
    let key = req.key()?;
    let action = AdminAction::from_request(&req.action, &req.params)?;
    tracing::info!("Dev override {} for {}", action.name(), key);
    let relationship: AdminOutcome = state.admin.apply(&key, action).await?;
    Ok(Json(AdminResponse {
        success: true,
        relationship,
    }))
}
