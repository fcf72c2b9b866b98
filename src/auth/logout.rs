use std::sync::Arc;

use axum::{debug_handler, extract::{Query, State}, response::Redirect};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{config::Config, session, AppResult, AppState};

#[derive(Deserialize)]
pub struct LogoutQuery {
    pub return_url: Option<String>,
}

/// Only same-site paths; anything else sends the browser home.
pub(super) fn local_path(return_url: Option<String>) -> String {
    return_url
        .filter(|url| url.starts_with('/') && !url.starts_with("//"))
        .unwrap_or_else(|| "/".to_owned())
}

#[debug_handler(state = AppState)]
pub async fn logout(
    Query(LogoutQuery { return_url }): Query<LogoutQuery>,
    State(config): State<Arc<Config>>,
    session: Session,
) -> AppResult<Redirect> {
    if let Some(user) = session::current_user(&session, &config.user_field).await? {
        tracing::info!(subject = %user.id, "signed out");
    }
    session.flush().await?;
    Ok(Redirect::to(&local_path(return_url)))
}
