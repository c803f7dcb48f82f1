use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{HeaderValue, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use super::http_layers::{attach_request_id, log_requests};
use super::identity::Identity;
use super::state::*;
use super::websocket::ws_handler;
use crate::deadline::Deadline;
use crate::error::{CoreError, CoreResult};
use crate::metrics::metrics_handler;
use crate::model::{ListeningContext, NewInteraction, RecommendationResponse, UserProfile};
use crate::push::RefreshReason;
use crate::recs::RecommendationRequest;

#[derive(Serialize)]
struct ServerStats {
    uptime: String,
    version: String,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> Json<ServerStats> {
    Json(ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn health() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

async fn get_me(
    identity: Identity,
    State(store): State<GuardedStore>,
    State(config): State<crate::config::AppConfig>,
) -> CoreResult<Json<UserProfile>> {
    let deadline = Deadline::after(config.request_deadline);
    let profile = store.find_or_create_profile(deadline, &identity.0).await?;
    Ok(Json(profile))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdatePreferencesBody {
    preferred_genres: Vec<String>,
    #[serde(default)]
    disliked_genres: Option<Vec<String>>,
}

const MAX_GENRES: usize = 10;
const MAX_GENRE_LEN: usize = 100;

fn validate_genres(genres: &[String], field: &str) -> CoreResult<()> {
    if genres.len() > MAX_GENRES {
        return Err(CoreError::Validation(format!(
            "{field} holds more than {MAX_GENRES} entries"
        )));
    }
    if genres
        .iter()
        .any(|g| g.trim().is_empty() || g.len() > MAX_GENRE_LEN)
    {
        return Err(CoreError::Validation(format!(
            "{field} entries must be non-empty and at most {MAX_GENRE_LEN} characters"
        )));
    }
    Ok(())
}

async fn put_preferences(
    identity: Identity,
    State(store): State<GuardedStore>,
    State(config): State<crate::config::AppConfig>,
    Json(body): Json<UpdatePreferencesBody>,
) -> CoreResult<Json<UserProfile>> {
    if body.preferred_genres.is_empty() {
        return Err(CoreError::Validation(
            "preferredGenres must hold at least one entry".into(),
        ));
    }
    validate_genres(&body.preferred_genres, "preferredGenres")?;
    if let Some(disliked) = &body.disliked_genres {
        validate_genres(disliked, "dislikedGenres")?;
    }

    let deadline = Deadline::after(config.request_deadline);
    let profile = store
        .update_preferences(
            deadline,
            &identity.0,
            &body.preferred_genres,
            body.disliked_genres.as_deref(),
        )
        .await?;
    Ok(Json(profile))
}

#[derive(Debug, Deserialize)]
struct RecommendationQuery {
    mood: Option<String>,
    activity: Option<String>,
    #[serde(rename = "timeBucket")]
    time_bucket: Option<String>,
    limit: Option<usize>,
}

fn parse_context(query: &RecommendationQuery) -> CoreResult<Option<ListeningContext>> {
    let mut context = ListeningContext::default();
    if let Some(mood) = &query.mood {
        context.mood = Some(mood.parse().map_err(CoreError::Validation)?);
    }
    if let Some(activity) = &query.activity {
        context.activity = Some(activity.parse().map_err(CoreError::Validation)?);
    }
    if let Some(bucket) = &query.time_bucket {
        context.time_bucket = Some(bucket.parse().map_err(CoreError::Validation)?);
    }
    Ok((!context.is_empty()).then_some(context))
}

async fn get_recommendations(
    identity: Identity,
    State(pipeline): State<GuardedPipeline>,
    State(config): State<crate::config::AppConfig>,
    Query(query): Query<RecommendationQuery>,
) -> CoreResult<Json<RecommendationResponse>> {
    let context = parse_context(&query)?;
    let deadline = Deadline::after(config.request_deadline);
    let response = pipeline
        .get_recommendations(
            deadline,
            &identity.0,
            RecommendationRequest {
                context,
                limit: query.limit,
            },
        )
        .await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InteractionBody {
    track_id: String,
    event_type: crate::model::EventKind,
    #[serde(default)]
    event_value: Option<i64>,
    #[serde(default)]
    context: Option<ListeningContext>,
    #[serde(default)]
    client_ts: Option<i64>,
}

async fn post_interaction(
    identity: Identity,
    State(pipeline): State<GuardedPipeline>,
    State(push): State<GuardedPushEngine>,
    State(config): State<crate::config::AppConfig>,
    Json(body): Json<InteractionBody>,
) -> CoreResult<impl IntoResponse> {
    if body.track_id.trim().is_empty() {
        return Err(CoreError::Validation("trackId must not be empty".into()));
    }

    let deadline = Deadline::after(config.request_deadline);
    let outcome = pipeline
        .record_interaction(
            deadline,
            NewInteraction {
                external_user_id: identity.0.clone(),
                track_id: body.track_id,
                event_type: body.event_type,
                event_value: body.event_value,
                context: body.context,
                client_ts: body.client_ts,
            },
        )
        .await?;

    if outcome.refresh_triggered {
        // Detached: the interaction response never waits on the fan-out.
        let push = push.clone();
        let user = identity.0.clone();
        tokio::spawn(async move {
            push.trigger_refresh(&user, RefreshReason::SkipDetected).await;
        });
    }

    Ok(Json(json!({
        "success": true,
        "interaction": outcome.interaction,
        "refreshTriggered": outcome.refresh_triggered,
    })))
}

async fn handler_404() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": { "kind": "not_found", "message": "route not found" } })),
    )
}

/// Assemble the application router. Exposed for the e2e tests, which
/// mount it on a random port with in-memory backends.
pub fn make_app(state: ServerState) -> Router {
    let mut app = Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/me", get(get_me))
        .route("/me/preferences", put(put_preferences))
        .route("/recommendations", get(get_recommendations))
        .route("/recommendations/ws", get(ws_handler))
        .route("/interactions", post(post_interaction))
        .fallback(handler_404)
        .layer(middleware::from_fn(log_requests))
        .layer(middleware::from_fn(attach_request_id));

    if let Some(origin) = &state.config.cors_origin {
        match origin.parse::<HeaderValue>() {
            Ok(origin) => {
                app = app.layer(
                    CorsLayer::new()
                        .allow_origin(origin)
                        .allow_methods(Any)
                        .allow_headers(Any),
                );
            }
            Err(err) => warn!(origin, error = %err, "ignoring unparseable CORS origin"),
        }
    }

    app.with_state(state)
}

/// Router for the dedicated metrics listener.
pub fn make_metrics_app() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

/// Bind and serve the API until `shutdown` resolves.
pub async fn run_server(
    state: ServerState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API server listening on {}", addr);
    axum::serve(listener, make_app(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_formats_days_and_time() {
        assert_eq!(format_uptime(Duration::from_secs(0)), "0d 00:00:00");
        assert_eq!(
            format_uptime(Duration::from_secs(86_400 + 3 * 3600 + 4 * 60 + 5)),
            "1d 03:04:05"
        );
    }

    #[test]
    fn context_parsing_rejects_unknown_values() {
        let query = RecommendationQuery {
            mood: Some("GRUMPY".into()),
            activity: None,
            time_bucket: None,
            limit: None,
        };
        assert!(matches!(
            parse_context(&query),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn absent_context_parses_to_none() {
        let query = RecommendationQuery {
            mood: None,
            activity: None,
            time_bucket: None,
            limit: Some(5),
        };
        assert!(parse_context(&query).unwrap().is_none());
    }

    #[test]
    fn genre_validation_enforces_bounds() {
        let many: Vec<String> = (0..11).map(|i| format!("g{i}")).collect();
        assert!(validate_genres(&many, "preferredGenres").is_err());
        assert!(validate_genres(&["Pop".to_string()], "preferredGenres").is_ok());
        assert!(validate_genres(&[" ".to_string()], "preferredGenres").is_err());
    }
}
