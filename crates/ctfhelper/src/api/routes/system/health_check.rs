use axum::{extract::State, http::StatusCode, response::ErrorResponse};
use log::{debug, error};
use std::sync::Arc;

use crate::{domain::Error, infra::chat::ChatError, startup::AppState};

pub async fn health(State(state): State<Arc<AppState>>) -> Result<StatusCode, ErrorResponse> {
    // Ping the database
    state.engine.ctfs().ping().await.map_err(|e| {
        error!("{}", e);
        Error::DbError(e)
    })?;

    // The gateway connection lives in a background task
    for (thread_name, thread) in state.background_threads.iter() {
        if thread.is_finished() {
            error!("{} has stopped, the bot needs a restart", thread_name);
            return Err(Error::Chat(ChatError::Unavailable).into());
        }
    }

    debug!("service, gateway, and db are up");
    Ok(StatusCode::OK)
}
