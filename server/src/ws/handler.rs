use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::Response,
};

use crate::auth::middleware::CurrentUser;
use crate::state::AppState;
use crate::ws::actor;

/// GET /ws
/// WebSocket upgrade endpoint. Requires a valid session cookie; the
/// `CurrentUser` extractor rejects the handshake with 401 otherwise.
/// On success, runs an actor for the connection.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    user: CurrentUser,
    ws: WebSocketUpgrade,
) -> Response {
    tracing::debug!(user_id = user.user_id, username = %user.username, "WebSocket upgrade accepted");

    let user_id = user.user_id;
    ws.on_failed_upgrade(move |e| {
        tracing::warn!(user_id, error = %e, "WebSocket upgrade failed");
    })
    .on_upgrade(move |socket| actor::run_connection(socket, state, user_id))
}
