use axum::Router;
use axum::routing::{delete, get, post};
use tower_http::cors::CorsLayer;

use crate::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/events", get(handlers::events::stream_events))
        .route("/submission", post(handlers::solution::submit_solution))
        .route(
            "/rooms",
            get(handlers::room::list_rooms).post(handlers::room::create_room),
        )
        .route("/rooms/{room_id}", delete(handlers::room::delete_room))
        .route(
            "/rooms/{room_id}/leaderboard",
            get(handlers::room::get_leaderboard),
        )
        .route(
            "/rooms/{room_id}/players/{player_id}",
            delete(handlers::room::leave_room),
        )
        .route("/players", post(handlers::players::create_player))
        .route("/players/login", post(handlers::players::login))
        .route("/questions", get(handlers::questions::list_questions))
        .route(
            "/isolate/test/{room_id}",
            get(handlers::compilation::isolate_test),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
