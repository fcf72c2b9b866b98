use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{debug_handler, extract::State, Form, Json};
use serde_json::Value;
use tower_sessions::Session;

use crate::{
    code::{CodeFormat, RoomCode},
    config::Config,
    store::{Participants, RoomStore},
    AppResult, AppState,
};

use super::{caller, code_body, respond, settle, Outcome, Refusal};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub code: RoomCode,
    pub participants: Participants,
    /// Someone joined since the previous fetch.
    pub changed: bool,
}

/// Reads the participant map, moving the fetch watermark only when it is behind.
pub async fn fetch_room(
    store: &RoomStore,
    format: CodeFormat,
    ttl: Duration,
    raw_code: Option<&str>,
) -> AppResult<Outcome<Fetched>> {
    let Some(code) = raw_code.and_then(|raw| format.parse(raw.trim())) else {
        return Ok(Err(Refusal::InvalidCode));
    };
    let Some(record) = store.get(&code).await? else {
        return Ok(Err(Refusal::RoomNotFound));
    };

    let changed = record.has_new_joiners();
    if changed {
        store.mark_fetched(&code, ttl).await?;
    }

    Ok(Ok(Fetched {
        code,
        participants: record.participants,
        changed,
    }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn fetch(
    State(store): State<RoomStore>,
    State(config): State<Arc<Config>>,
    session: Session,
    Form(fields): Form<HashMap<String, String>>,
) -> AppResult<Json<Value>> {
    let outcome = match caller(&session, &config).await? {
        Ok(_) => {
            fetch_room(
                &store,
                config.code_format,
                config.room_ttl,
                fields.get(&config.code_field).map(String::as_str),
            )
            .await?
        }
        Err(refusal) => Err(refusal),
    };

    let fetched = settle("fetch", outcome);
    let mut body = code_body(&config, fetched.as_ref().map(|fetched| &fetched.code));
    match fetched {
        Some(Fetched { participants, changed, .. }) => {
            body.insert("participants".to_owned(), serde_json::to_value(participants)?);
            body.insert("changed".to_owned(), Value::Bool(changed));
        }
        None => {
            body.insert("participants".to_owned(), Value::Null);
        }
    }
    Ok(respond(body))
}
