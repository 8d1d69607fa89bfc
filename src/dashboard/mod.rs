use axum::{
    extract::{Path, Query as QueryParams, State},
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::cache::{Query, ReadThrough};
use crate::db::Database;
use crate::harvest::{run_detached, HarvestRequest, Harvester};
use crate::leagues::{parse_date, DataType, League, Slot};

#[derive(Clone)]
pub struct AppState {
    pub cache: ReadThrough,
    pub harvester: Arc<Harvester>,
    /// Request run by `/api/harvest`; same one the timer uses
    pub harvest_request: HarvestRequest,
    /// Structured mirror, when enabled
    pub mirror: Option<Database>,
}

type ApiError = (StatusCode, String);

/// Build the Axum router for the stats API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/leagues", get(leagues_handler))
        .route("/api/harvest", get(harvest_handler).post(harvest_handler))
        .route("/api/mirror", get(mirror_handler))
        .route("/api/mirror/:league/:data_type", get(mirror_entry_handler))
        .route("/api/all/:data_type", get(all_leagues_handler))
        .route("/api/:league/teams", get(teams_handler))
        .route("/api/:league/standings", get(standings_handler))
        .route("/api/:league/scoreboard", get(scoreboard_handler))
        .route("/api/:league/schedule", get(schedule_handler))
        .route("/api/:league/news", get(news_handler))
        .route("/api/:league/summaries", get(summaries_handler))
        .route("/api/:league/summary/:event_id", get(summary_handler))
        .route("/api/:league/team/:team_id", get(team_handler))
        .route("/api/:league/player/:player_id", get(player_handler))
        .route("/api/:league/history/:data_type", get(history_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

fn league(id: &str) -> Result<League, ApiError> {
    id.parse()
        .map_err(|e: crate::error::HarvestError| (StatusCode::NOT_FOUND, e.to_string()))
}

async fn index_handler() -> impl IntoResponse {
    Html(INDEX_HTML)
}

/// GET /api/leagues
async fn leagues_handler() -> impl IntoResponse {
    let leagues: Vec<_> = League::ALL
        .iter()
        .map(|l| json!({ "id": l.id(), "name": l.display_name(), "sport": l.sport() }))
        .collect();
    Json(leagues)
}

/// GET|POST /api/harvest
///
/// Runs on its own task, so a client hanging up does not cut the harvest short.
async fn harvest_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let report = run_detached(state.harvester.clone(), state.harvest_request.clone())
        .await
        .map_err(|e| {
            error!("On-demand harvest panicked: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;
    Ok(Json(json!({
        "ok": true,
        "files_saved": report.saved,
        "failures": report.failures(),
    })))
}

/// GET /api/mirror
async fn mirror_handler(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let Some(db) = &state.mirror else {
        return Err((StatusCode::NOT_FOUND, "SQLite mirror is disabled".to_string()));
    };
    db.list_harvests()
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// GET /api/mirror/:league/:data_type
async fn mirror_entry_handler(
    State(state): State<Arc<AppState>>,
    Path((id, data_type)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let league = league(&id)?;
    let Some(db) = &state.mirror else {
        return Err((StatusCode::NOT_FOUND, "SQLite mirror is disabled".to_string()));
    };
    let internal = |e: String| (StatusCode::INTERNAL_SERVER_ERROR, e);
    let (harvested_at, data_json) = db
        .get_harvest(league.id(), &data_type)
        .map_err(|e| internal(e.to_string()))?
        .ok_or((StatusCode::NOT_FOUND, format!("no mirrored {league}/{data_type}")))?;
    let data: serde_json::Value =
        serde_json::from_str(&data_json).map_err(|e| internal(e.to_string()))?;
    Ok(Json(json!({
        "league": league,
        "data_type": data_type,
        "harvested_at": harvested_at,
        "data": data,
    })))
}

/// GET /api/all/:data_type
///
/// Harvested data only, keyed by league id.
async fn all_leagues_handler(
    State(state): State<Arc<AppState>>,
    Path(data_type): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let slot = match data_type
        .parse::<DataType>()
        .map_err(|e| (StatusCode::NOT_FOUND, e.to_string()))?
    {
        DataType::Teams => Slot::Teams,
        DataType::Standings => Slot::Standings,
        DataType::Scoreboard => Slot::Scoreboard,
        DataType::Schedule => Slot::Schedule,
        DataType::GameSummary => Slot::SummaryIndex,
        DataType::News => Slot::News,
    };
    Ok(Json(state.cache.all_leagues(&slot)))
}

/// GET /api/:league/teams
async fn teams_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let league = league(&id)?;
    Ok(Json(state.cache.teams(league).await))
}

/// GET /api/:league/standings
async fn standings_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let league = league(&id)?;
    Ok(Json(state.cache.get(league, &Query::Standings).await))
}

#[derive(Debug, Deserialize)]
struct ScoreboardParams {
    date: Option<String>,
}

/// GET /api/:league/scoreboard?date=YYYYMMDD
async fn scoreboard_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    QueryParams(params): QueryParams<ScoreboardParams>,
) -> Result<impl IntoResponse, ApiError> {
    let league = league(&id)?;
    let date = params
        .date
        .as_deref()
        .map(parse_date)
        .transpose()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    Ok(Json(state.cache.get(league, &Query::Scoreboard(date)).await))
}

/// GET /api/:league/schedule
async fn schedule_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let league = league(&id)?;
    Ok(Json(state.cache.get(league, &Query::Schedule).await))
}

/// GET /api/:league/news
async fn news_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let league = league(&id)?;
    Ok(Json(state.cache.news(league).await))
}

/// GET /api/:league/summaries
async fn summaries_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let league = league(&id)?;
    Ok(Json(state.cache.summary_ids(league).await))
}

/// GET /api/:league/summary/:event_id
async fn summary_handler(
    State(state): State<Arc<AppState>>,
    Path((id, event_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let league = league(&id)?;
    Ok(Json(state.cache.get(league, &Query::Summary(event_id)).await))
}

#[derive(Debug, Deserialize)]
struct SeasonParams {
    season: Option<i32>,
}

/// GET /api/:league/team/:team_id?season=
async fn team_handler(
    State(state): State<Arc<AppState>>,
    Path((id, team_id)): Path<(String, String)>,
    QueryParams(params): QueryParams<SeasonParams>,
) -> Result<impl IntoResponse, ApiError> {
    let league = league(&id)?;
    state
        .cache
        .team_profile(league, &team_id, params.season)
        .await
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, format!("team {team_id} not found")))
}

/// GET /api/:league/player/:player_id?season=
async fn player_handler(
    State(state): State<Arc<AppState>>,
    Path((id, player_id)): Path<(String, String)>,
    QueryParams(params): QueryParams<SeasonParams>,
) -> Result<impl IntoResponse, ApiError> {
    let league = league(&id)?;
    state
        .cache
        .player_profile(league, &player_id, params.season)
        .await
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, format!("player {player_id} not found")))
}

/// GET /api/:league/history/:data_type
///
/// Archive file names, oldest first.
async fn history_handler(
    State(state): State<Arc<AppState>>,
    Path((id, data_type)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let league = league(&id)?;
    let slot = match data_type
        .parse::<DataType>()
        .map_err(|e| (StatusCode::NOT_FOUND, e.to_string()))?
    {
        DataType::Teams => Slot::Teams,
        DataType::Standings => Slot::Standings,
        DataType::Scoreboard => Slot::Scoreboard,
        DataType::Schedule => Slot::Schedule,
        other => {
            return Err((
                StatusCode::NOT_FOUND,
                format!("{other} keeps no history"),
            ))
        }
    };
    let archives = state
        .harvester
        .store()
        .list_archives(league, &slot)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let names: Vec<String> = archives
        .iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
        .collect();
    Ok(Json(names))
}

/// Embedded landing page (HTML + CSS + JS)
const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Stats Harvester</title>
<style>
  :root {
    --bg: #0f1117;
    --card: #1a1d27;
    --border: #2a2d3a;
    --accent: #6c63ff;
    --text: #e0e0e0;
    --muted: #8888aa;
  }
  * { box-sizing: border-box; margin: 0; padding: 0; }
  body { background: var(--bg); color: var(--text); font-family: 'Segoe UI', system-ui, sans-serif; }
  header { display: flex; align-items: center; gap: 1rem; padding: 1rem 2rem; border-bottom: 1px solid var(--border); }
  header h1 { font-size: 1.4rem; font-weight: 700; }
  main { padding: 1.5rem 2rem; display: grid; gap: 1.5rem; }
  .grid { display: grid; grid-template-columns: repeat(auto-fill, minmax(220px, 1fr)); gap: 1rem; }
  .card { background: var(--card); border: 1px solid var(--border); border-radius: 10px; padding: 1.2rem; }
  .card h2 { font-size: 1.1rem; margin-bottom: .6rem; }
  .card a { display: block; color: var(--accent); font-size: .88rem; text-decoration: none; padding: .15rem 0; }
  .card a:hover { text-decoration: underline; }
  .muted { color: var(--muted); font-size: .8rem; }
  button { background: none; border: 1px solid var(--border); color: var(--muted); padding: .3rem .8rem; border-radius: 6px; cursor: pointer; font-size: .8rem; }
  button:hover { border-color: var(--accent); color: var(--accent); }
</style>
</head>
<body>
<header>
  <h1>Stats Harvester</h1>
  <button onclick="harvest()">Harvest now</button>
  <span class="muted" id="harvest-status"></span>
</header>
<main>
  <div class="grid" id="leagues"><div class="muted">Loading…</div></div>
</main>
<script>
const ENDPOINTS = ['teams', 'standings', 'scoreboard', 'schedule', 'news', 'summaries'];

async function loadLeagues() {
  const r = await fetch('/api/leagues');
  if (!r.ok) return;
  const leagues = await r.json();
  document.getElementById('leagues').innerHTML = leagues.map(l => `
    <div class="card">
      <h2>${l.name}</h2>
      <div class="muted">${l.sport}</div>
      ${ENDPOINTS.map(e => `<a href="/api/${l.id}/${e}">${e}</a>`).join('')}
    </div>`).join('');
}

async function harvest() {
  const el = document.getElementById('harvest-status');
  el.textContent = 'Harvesting…';
  const r = await fetch('/api/harvest', { method: 'POST' });
  const body = await r.json().catch(() => ({}));
  el.textContent = r.ok
    ? `${body.files_saved} saved, ${body.failures.length} failed`
    : 'Harvest failed';
}

loadLeagues();
</script>
</body>
</html>
"#;
