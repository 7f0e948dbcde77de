use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{DefaultBodyLimit, Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{Json, Response},
    routing::{delete, get, post},
    Router,
};
use log::info;
use serde_json::{Map, Value};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::auth::{self, JwtKeys};
use crate::credentials::Refresher;
use crate::error::{AppError, AppJson};
use crate::library::{Comment, NewComment, Track};
use crate::spotify::{self, SpotifyClient};
use crate::store::TrackStore;
use crate::tracks::{self, FieldQuery, OneOrMany};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TrackStore>,
    pub refresher: Arc<Refresher>,
    pub spotify: Arc<SpotifyClient>,
    pub keys: JwtKeys,
}

pub fn create_router(state: AppState, body_limit: usize) -> Router {
    let public = Router::new()
        .route("/generate_token", get(spotify::generate_token))
        .route("/login", post(auth::login))
        .route("/search/:search", get(spotify::search));

    let protected = Router::new()
        .route("/tracks/search", get(search_tracks))
        .route("/tracks", get(get_tracks).post(create_tracks))
        .route("/tracks/:id", get(get_track_by_id).put(update_track).delete(delete_track))
        .route("/tracks/:id/comments", get(get_comments).post(create_comment))
        .route("/tracks/:id/comments/:comment_id", delete(delete_comment))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_bearer));

    Router::new()
        .nest("/api", public.merge(protected))
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(log_request))
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;
    info!(
        "{} {} -> {} ({} ms)",
        method,
        path,
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    response
}

async fn not_found() -> AppError {
    AppError::NotFound("the requested resource was not found on this server".to_string())
}

// GET /tracks/search - Search stored tracks by artist, name or release date
async fn search_tracks(
    State(state): State<AppState>,
    Query(query): Query<FieldQuery>,
) -> Result<Json<Vec<Track>>, AppError> {
    Ok(Json(tracks::find_by_field(state.store.as_ref(), &query).await?))
}

// GET /tracks - List every stored track
async fn get_tracks(State(state): State<AppState>) -> Result<Json<Vec<Track>>, AppError> {
    Ok(Json(tracks::find_all(state.store.as_ref()).await?))
}

// GET /tracks/:id - Get a specific track by ID
async fn get_track_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Track>, AppError> {
    Ok(Json(tracks::find_by_id(state.store.as_ref(), &id).await?))
}

// POST /tracks - Insert one track or a batch of tracks
async fn create_tracks(
    State(state): State<AppState>,
    AppJson(payload): AppJson<OneOrMany<Track>>,
) -> Result<(StatusCode, Json<Vec<Track>>), AppError> {
    let inserted = tracks::insert_tracks(state.store.as_ref(), payload.into()).await?;
    Ok((StatusCode::CREATED, Json(inserted)))
}

// PUT /tracks/:id - Replace the given fields of a track
async fn update_track(
    State(state): State<AppState>,
    Path(id): Path<String>,
    AppJson(patch): AppJson<Map<String, Value>>,
) -> Result<Json<Track>, AppError> {
    Ok(Json(tracks::update(state.store.as_ref(), &id, &patch).await?))
}

// DELETE /tracks/:id - Delete a track together with its comments
async fn delete_track(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Track>, AppError> {
    Ok(Json(tracks::delete(state.store.as_ref(), &id).await?))
}

// POST /tracks/:id/comments - Append a comment to a track
async fn create_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    AppJson(comment): AppJson<NewComment>,
) -> Result<(StatusCode, Json<Comment>), AppError> {
    let comment = tracks::append_comment(state.store.as_ref(), &id, comment).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

// GET /tracks/:id/comments - List the comments of a track
async fn get_comments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Comment>>, AppError> {
    Ok(Json(tracks::list_comments(state.store.as_ref(), &id).await?))
}

// DELETE /tracks/:id/comments/:comment_id - Remove a comment, returning the rest
async fn delete_comment(
    State(state): State<AppState>,
    Path((id, comment_id)): Path<(String, String)>,
) -> Result<Json<Vec<Comment>>, AppError> {
    Ok(Json(tracks::remove_comment(state.store.as_ref(), &id, &comment_id).await?))
}
