//! Route configuration.

use crate::handlers;
use crate::state::AppState;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/api/health", get(handlers::health))
        // Cached audio
        .route("/api/songs/{id}/stream", get(handlers::stream_song))
        .route("/api/songs/{id}/download", get(handlers::download_song))
        .route("/api/cache", get(handlers::list_cache))
        .route("/api/cache/stats", get(handlers::cache_stats))
        // Catalog pass-through
        .route("/api/search", get(handlers::search))
        .route("/api/songs/{id}", get(handlers::song_detail))
        .route("/api/songs/{id}/lyrics", get(handlers::song_lyrics))
        .route("/api/playlists/{id}", get(handlers::playlist_detail))
        .route("/api/playlists/{id}/tracks", get(handlers::playlist_tracks));

    api_routes
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
