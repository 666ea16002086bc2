use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::{Mutex, RwLock};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::db::{
    create_pool_with_url, get_head_to_head, get_matches_for_team, get_team_by_id,
    get_teams_by_league, init_database_with_pool, SqliteKeyValueStore, SqliteMatchStore,
    SqliteRoster,
};
use crate::error::ImportError;
use crate::models::{
    ApiResponse, CommitSummary, HeadToHead, ImportRecord, ImportSession, Match, Team, TeamMatch,
    TeamRecord, TeamSide,
};
use crate::services::stats::{head_to_head, team_record};
use crate::services::TeamMatcher;
use crate::settings::Settings;
use crate::utils::points_percentage;

type SharedSession = Arc<Mutex<ImportSession>>;

/// Sessions untouched for this long are dropped on the next upload.
const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

pub struct SessionSlot {
    session: SharedSession,
    last_used: Instant,
}

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub sessions: Arc<RwLock<HashMap<String, SessionSlot>>>,
}

impl AppState {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn session(&self, id: &str) -> Result<SharedSession, ApiError> {
        let mut sessions = self.sessions.write().await;
        let slot = sessions
            .get_mut(id)
            .ok_or_else(|| failure(StatusCode::NOT_FOUND, format!("Import session {} not found", id)))?;
        slot.last_used = Instant::now();
        Ok(slot.session.clone())
    }

    async fn insert_session(&self, session: ImportSession) {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let evicted = evict_idle_sessions(&mut sessions, now);
        if evicted > 0 {
            tracing::info!("Dropped {} idle import session(s)", evicted);
        }
        sessions.insert(
            session.id.clone(),
            SessionSlot {
                session: Arc::new(Mutex::new(session)),
                last_used: now,
            },
        );
    }

    async fn remove_session(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    async fn settings(&self) -> Settings {
        Settings::load(&SqliteKeyValueStore::new(self.pool.clone())).await
    }
}

fn evict_idle_sessions(sessions: &mut HashMap<String, SessionSlot>, now: Instant) -> usize {
    let before = sessions.len();
    sessions.retain(|_, slot| now.saturating_duration_since(slot.last_used) < SESSION_IDLE_TIMEOUT);
    before - sessions.len()
}

pub async fn serve(database_url: &str, port: u16) -> anyhow::Result<()> {
    let pool = create_pool_with_url(database_url).await?;
    init_database_with_pool(&pool).await?;

    let app = create_router(AppState::new(pool));

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    tracing::info!("WinMix API server listening on port {}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/teams/league/{league}", get(get_teams_by_league_handler))
        .route("/teams/match", post(match_team_handler))
        .route("/teams/{id}/stats", get(get_team_stats_handler))
        .route("/h2h", get(head_to_head_handler))
        .route("/imports", post(create_import_handler))
        .route("/imports/{id}", get(get_import_handler).delete(delete_import_handler))
        .route("/imports/{id}/corrections", post(correction_handler))
        .route("/imports/{id}/skip", post(skip_handler))
        .route("/imports/{id}/commit", post(commit_handler))
        .route("/imports/{id}/errors.csv", get(export_errors_handler))
        .route("/settings", get(get_settings_handler).put(put_settings_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

type ApiError = (StatusCode, Json<ApiResponse<()>>);
type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn failure(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ApiResponse::error(message.into())))
}

fn internal(context: &str, e: impl std::fmt::Display) -> ApiError {
    tracing::error!("{}: {}", context, e);
    failure(StatusCode::INTERNAL_SERVER_ERROR, context)
}

fn import_failure(e: ImportError) -> ApiError {
    let status = match e {
        ImportError::RecordNotFound(_) => StatusCode::NOT_FOUND,
        ImportError::RecordClosed(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    failure(status, e.to_string())
}

// Health check endpoint
async fn health_check() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::success("WinMix API is running"))
}

// GET /teams/league/{league}
async fn get_teams_by_league_handler(
    State(state): State<AppState>,
    Path(league): Path<String>,
) -> ApiResult<Vec<Team>> {
    match get_teams_by_league(&state.pool, &league).await {
        Ok(teams) => Ok(Json(ApiResponse::success(teams))),
        Err(e) => Err(internal("Failed to fetch teams by league", e)),
    }
}

// POST /teams/match - Resolve a free-typed team name
#[derive(Deserialize)]
struct MatchTeamRequest {
    name: String,
    league: Option<String>,
    threshold: Option<f64>,
}

async fn match_team_handler(
    State(state): State<AppState>,
    Json(request): Json<MatchTeamRequest>,
) -> ApiResult<TeamMatch> {
    let settings = state.settings().await;
    let league = settings.league_or_default(request.league);
    let threshold = request.threshold.unwrap_or(settings.match_threshold);

    let teams = get_teams_by_league(&state.pool, &league)
        .await
        .map_err(|e| internal("Failed to fetch roster", e))?;
    let matcher = TeamMatcher::new(teams.into_iter().map(|t| t.name), threshold);

    Ok(Json(ApiResponse::success(matcher.match_team(&request.name))))
}

// GET /teams/{id}/stats
#[derive(Serialize)]
struct TeamStatsResponse {
    team: Team,
    record: TeamRecord,
    points_percentage: f64,
    recent_matches: Vec<Match>,
}

async fn get_team_stats_handler(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
) -> ApiResult<TeamStatsResponse> {
    let team = match get_team_by_id(&state.pool, &team_id).await {
        Ok(Some(team)) => team,
        Ok(None) => return Err(failure(StatusCode::NOT_FOUND, format!("Team {} not found", team_id))),
        Err(e) => return Err(internal("Failed to fetch team", e)),
    };

    let matches = get_matches_for_team(&state.pool, &team_id)
        .await
        .map_err(|e| internal("Failed to fetch team matches", e))?;
    let record = team_record(&team_id, &matches);

    Ok(Json(ApiResponse::success(TeamStatsResponse {
        points_percentage: points_percentage(record.wins, record.draws, record.losses),
        record,
        recent_matches: matches.into_iter().take(10).collect(),
        team,
    })))
}

// GET /h2h?team_a=..&team_b=..
#[derive(Deserialize)]
struct HeadToHeadQuery {
    team_a: String,
    team_b: String,
}

async fn head_to_head_handler(
    State(state): State<AppState>,
    Query(params): Query<HeadToHeadQuery>,
) -> ApiResult<HeadToHead> {
    match get_head_to_head(&state.pool, &params.team_a, &params.team_b).await {
        Ok(matches) => Ok(Json(ApiResponse::success(head_to_head(
            &params.team_a,
            &params.team_b,
            &matches,
        )))),
        Err(e) => Err(internal("Failed to fetch head-to-head", e)),
    }
}

// ── Import sessions ─────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ImportSessionView {
    #[serde(flatten)]
    session: ImportSession,
    summary: String,
    valid_count: usize,
    error_count: usize,
    skipped_count: usize,
}

impl From<&ImportSession> for ImportSessionView {
    fn from(session: &ImportSession) -> Self {
        Self {
            summary: session.summary(),
            valid_count: session.valid_count(),
            error_count: session.error_count(),
            skipped_count: session.skipped_count(),
            session: session.clone(),
        }
    }
}

#[derive(Deserialize)]
struct CreateImportRequest {
    csv: String,
    league_id: Option<String>,
    upload_date: Option<NaiveDate>,
    threshold: Option<f64>,
}

// POST /imports - Parse an uploaded CSV into a reviewable session
async fn create_import_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateImportRequest>,
) -> ApiResult<ImportSessionView> {
    let settings = state.settings().await;
    let league = settings.league_or_default(request.league_id);
    let threshold = request.threshold.unwrap_or(settings.import_threshold);
    let date = request
        .upload_date
        .unwrap_or_else(|| chrono::Utc::now().date_naive());

    let roster = SqliteRoster::new(state.pool.clone());
    let session = ImportSession::start(&request.csv, &league, date, &roster, threshold)
        .await
        .map_err(|e| internal("Failed to load roster", e))?;

    let view = ImportSessionView::from(&session);
    state.insert_session(session).await;

    Ok(Json(ApiResponse::success(view)))
}

// GET /imports/{id}
async fn get_import_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ImportSessionView> {
    let session = state.session(&id).await?;
    let session = session.lock().await;
    Ok(Json(ApiResponse::success(ImportSessionView::from(&*session))))
}

#[derive(Deserialize)]
struct CorrectionRequest {
    index: usize,
    side: TeamSide,
    team: String,
}

// POST /imports/{id}/corrections - Replace one side's team name
async fn correction_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<CorrectionRequest>,
) -> ApiResult<ImportRecord> {
    let session = state.session(&id).await?;
    let mut session = session.lock().await;
    let record = session
        .apply_correction(request.index, request.side, &request.team)
        .map_err(import_failure)?;
    Ok(Json(ApiResponse::success(record.clone())))
}

#[derive(Deserialize)]
struct SkipRequest {
    index: usize,
}

// POST /imports/{id}/skip
async fn skip_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SkipRequest>,
) -> ApiResult<ImportSessionView> {
    let session = state.session(&id).await?;
    let mut session = session.lock().await;
    session.skip(request.index).map_err(import_failure)?;
    Ok(Json(ApiResponse::success(ImportSessionView::from(&*session))))
}

#[derive(Serialize)]
struct CommitResponse {
    #[serde(flatten)]
    summary: CommitSummary,
    message: String,
    /// Set when nothing was left pending and the session was discarded.
    closed: bool,
    session: ImportSessionView,
}

// POST /imports/{id}/commit - Store every clean pending row
async fn commit_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<CommitResponse> {
    let shared = state.session(&id).await?;
    let mut session = shared.lock().await;

    let store = SqliteMatchStore::new(state.pool.clone());
    let roster = SqliteRoster::new(state.pool.clone());
    let summary = session.commit(&store, &roster).await;

    let closed = session.is_finished();
    if closed {
        state.remove_session(&id).await;
        tracing::info!("Import session {} finished and discarded", id);
    }

    Ok(Json(ApiResponse::success(CommitResponse {
        message: summary.message(),
        summary,
        closed,
        session: ImportSessionView::from(&*session),
    })))
}

// GET /imports/{id}/errors.csv
async fn export_errors_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.session(&id).await?;
    let csv = session.lock().await.export_errors().map_err(import_failure)?;

    let disposition = format!("attachment; filename=\"import-errors-{}.csv\"", id);
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    ))
}

// DELETE /imports/{id}
async fn delete_import_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<String> {
    if state.remove_session(&id).await {
        Ok(Json(ApiResponse::success(format!("Import session {} discarded", id))))
    } else {
        Err(failure(StatusCode::NOT_FOUND, format!("Import session {} not found", id)))
    }
}

// ── Settings ────────────────────────────────────────────────────────────────

async fn get_settings_handler(State(state): State<AppState>) -> ApiResult<Settings> {
    Ok(Json(ApiResponse::success(state.settings().await)))
}

async fn put_settings_handler(
    State(state): State<AppState>,
    Json(settings): Json<Settings>,
) -> ApiResult<Settings> {
    let store = SqliteKeyValueStore::new(state.pool.clone());
    settings
        .save(&store)
        .await
        .map_err(|e| internal("Failed to save settings", e))?;
    Ok(Json(ApiResponse::success(Settings::load(&store).await)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::db::{insert_team, memory_pool};
    use crate::models::TeamRef;

    async fn app() -> Router {
        let pool = memory_pool().await;
        for (id, name) in [("w1", "Real Madrid"), ("w2", "Barcelona"), ("w3", "Valencia")] {
            let now = chrono::Utc::now();
            let team = Team {
                id: id.to_string(),
                name: name.to_string(),
                league: "winmix".to_string(),
                created_at: now,
                updated_at: now,
            };
            insert_team(&pool, &team).await.unwrap();
        }
        create_router(AppState::new(pool))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    fn json_body(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    const CSV: &str = "match_time,home_team,away_team,half_time_home_goals,half_time_away_goals,full_time_home_goals,full_time_away_goals\n\
                       20:45,Real Madrid,Valenzia,1,0,2,1\n\
                       18:00,Barcelona,Real Madrid,0,0,1,1";

    #[tokio::test]
    async fn test_health() {
        let app = app().await;
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["success"], true);
    }

    #[tokio::test]
    async fn test_match_team_endpoint() {
        let app = app().await;
        let (status, body) = send(&app, "POST", "/teams/match", Some(json!({"name": "Valenzia", "threshold": 0.6}))).await;
        assert_eq!(status, StatusCode::OK);
        let data = &json_body(&body)["data"];
        assert!(data["exact_match"].is_null());
        assert_eq!(data["suggestions"][0]["name"], "Valencia");
        assert_eq!(data["suggestions"][0]["reason"], "close_match");
    }

    #[tokio::test]
    async fn test_import_review_and_commit_flow() {
        let app = app().await;
        let (status, body) = send(
            &app,
            "POST",
            "/imports",
            Some(json!({"csv": CSV, "league_id": "winmix", "upload_date": "2024-04-20"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let data = json_body(&body)["data"].clone();
        assert_eq!(data["valid_count"], 1);
        assert_eq!(data["error_count"], 1);
        let id = data["id"].as_str().unwrap().to_string();

        let (status, body) = send(&app, "GET", &format!("/imports/{}/errors.csv", id), None).await;
        assert_eq!(status, StatusCode::OK);
        let csv = String::from_utf8(body).unwrap();
        assert!(csv.contains("Away team not found: Valenzia"));
        assert!(csv.contains("Valencia ("));

        let (status, body) = send(
            &app,
            "POST",
            &format!("/imports/{}/corrections", id),
            Some(json!({"index": 0, "side": "away", "team": "Valencia"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["data"]["has_error"], false);

        let (status, body) = send(&app, "POST", &format!("/imports/{}/commit", id), None).await;
        assert_eq!(status, StatusCode::OK);
        let data = &json_body(&body)["data"];
        assert_eq!(data["success_count"], 2);
        assert_eq!(data["error_count"], 0);
        assert_eq!(data["closed"], true);

        let (status, _) = send(&app, "GET", &format!("/imports/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&app, "GET", "/h2h?team_a=w1&team_b=w2", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["data"]["played"], 1);
    }

    #[tokio::test]
    async fn test_session_with_open_rows_survives_commit_until_deleted() {
        let app = app().await;
        let (_, body) = send(&app, "POST", "/imports", Some(json!({"csv": CSV}))).await;
        let id = json_body(&body)["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = send(&app, "POST", &format!("/imports/{}/commit", id), None).await;
        assert_eq!(status, StatusCode::OK);
        let data = &json_body(&body)["data"];
        assert_eq!(data["success_count"], 1);
        assert_eq!(data["closed"], false);

        let (status, body) = send(&app, "GET", &format!("/imports/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["data"]["error_count"], 1);

        let (status, _) = send(&app, "DELETE", &format!("/imports/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, "GET", &format!("/imports/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, "DELETE", &format!("/imports/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_idle_sessions_are_evicted() {
        let roster = vec![TeamRef {
            id: "w1".to_string(),
            name: "Real Madrid".to_string(),
        }];
        let date = NaiveDate::from_ymd_opt(2024, 4, 20).unwrap();
        let start = Instant::now();

        let mut sessions = HashMap::new();
        for (id, last_used) in [("stale", start), ("fresh", start + SESSION_IDLE_TIMEOUT)] {
            let session = ImportSession::parse(CSV, "winmix", date, roster.clone(), 0.6);
            sessions.insert(
                id.to_string(),
                SessionSlot {
                    session: Arc::new(Mutex::new(session)),
                    last_used,
                },
            );
        }

        let evicted = evict_idle_sessions(&mut sessions, start + SESSION_IDLE_TIMEOUT + Duration::from_secs(1));
        assert_eq!(evicted, 1);
        assert!(sessions.contains_key("fresh"));
        assert!(!sessions.contains_key("stale"));
    }

    #[tokio::test]
    async fn test_correction_on_missing_row() {
        let app = app().await;
        let (_, body) = send(&app, "POST", "/imports", Some(json!({"csv": CSV}))).await;
        let id = json_body(&body)["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            "POST",
            &format!("/imports/{}/corrections", id),
            Some(json!({"index": 9, "side": "home", "team": "Valencia"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json_body(&body)["success"], false);
    }

    #[tokio::test]
    async fn test_settings_roundtrip() {
        let app = app().await;
        let (status, body) = send(
            &app,
            "PUT",
            "/settings",
            Some(json!({"default_league": "winmix", "import_threshold": 1.5, "favorite_teams": ["Barcelona", "barcelona"]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let data = &json_body(&body)["data"];
        assert_eq!(data["import_threshold"], 1.0);
        assert_eq!(data["match_threshold"], 0.7);
        assert_eq!(data["favorite_teams"], json!(["Barcelona"]));
    }
}
