use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{debug_handler, extract::State, Form, Json};
use serde_json::{json, Value};
use tower_sessions::Session;

use crate::{code::CodeFormat, config::Config, ids::SubjectId, store::RoomStore, AppResult, AppState};

use super::{caller, settle, Refusal};

/// Drops `subject` from the room. Returns whether anything was removed.
pub async fn leave_room(
    store: &RoomStore,
    format: CodeFormat,
    ttl: Duration,
    subject: &SubjectId,
    raw_code: Option<&str>,
) -> AppResult<bool> {
    let Some(code) = settle("leave", raw_code.and_then(|raw| format.parse(raw.trim())).ok_or(Refusal::InvalidCode)) else {
        return Ok(false);
    };

    let removed = store.remove_participant(&code, subject, ttl).await?;
    if removed {
        tracing::info!(%code, %subject, "left room");
    }
    Ok(removed)
}

/// Always answers `{}`; leaving is fire-and-forget for the caller.
#[debug_handler(state = AppState)]
pub(crate) async fn leave(
    State(store): State<RoomStore>,
    State(config): State<Arc<Config>>,
    session: Session,
    Form(fields): Form<HashMap<String, String>>,
) -> AppResult<Json<Value>> {
    if let Some(subject) = settle("leave", caller(&session, &config).await?) {
        leave_room(
            &store,
            config.code_format,
            config.room_ttl,
            &subject,
            fields.get(&config.code_field).map(String::as_str),
        )
        .await?;
    }

    Ok(Json(json!({})))
}
