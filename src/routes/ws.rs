use axum::{
    extract::ws::WebSocketUpgrade,
    extract::{Query, State},
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::{auth::authenticate_ws_token, AppState};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// `GET /ws?token=<bearer>`. Authentication happens before the upgrade
/// completes so a rejected connection still gets a single `auth_failure`
/// frame instead of a bare close.
pub async fn upgrade(State(state): State<Arc<AppState>>, Query(query): Query<WsQuery>, ws: WebSocketUpgrade) -> Response {
    let auth = match authenticate_ws_token(query.token.as_deref(), &state.config.jwt_secret) {
        Ok(claims) => match state.deps.users.find_by_id(claims.sub).await {
            Ok(Some(user)) => Ok((user.id, user.username)),
            Ok(None) => Err("user not found".to_string()),
            Err(e) => Err(e.to_string()),
        },
        Err(message) => Err(message),
    };

    let hub = Arc::clone(&state.hub);
    ws.on_upgrade(move |socket| async move { hub.accept(socket, auth).await })
}
