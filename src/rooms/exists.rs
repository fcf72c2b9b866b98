use std::{collections::HashMap, sync::Arc};

use axum::{debug_handler, extract::{Query, State}, Form, Json};
use serde_json::Value;
use tower_sessions::Session;

use crate::{code::{CodeFormat, RoomCode}, config::Config, store::RoomStore, AppResult, AppState};

use super::{caller, code_body, respond, settle, Outcome, Refusal};

/// Resolves a code, or a link ending in one, to a live room.
pub async fn check_room(
    store: &RoomStore,
    format: CodeFormat,
    raw: Option<&str>,
) -> AppResult<Outcome<RoomCode>> {
    let Some(code) = raw.and_then(|raw| format.normalize(raw)) else {
        return Ok(Err(Refusal::InvalidCode));
    };
    if !store.exists(&code).await? {
        return Ok(Err(Refusal::RoomNotFound));
    }
    Ok(Ok(code))
}

async fn respond_exists(
    store: &RoomStore,
    config: &Config,
    session: &Session,
    fields: HashMap<String, String>,
) -> AppResult<Json<Value>> {
    let outcome = match caller(session, config).await? {
        Ok(_) => check_room(store, config.code_format, fields.get(&config.code_field).map(String::as_str)).await?,
        Err(refusal) => Err(refusal),
    };

    let code = settle("exists", outcome);
    Ok(respond(code_body(config, code.as_ref())))
}

#[debug_handler(state = AppState)]
pub(crate) async fn exists_query(
    State(store): State<RoomStore>,
    State(config): State<Arc<Config>>,
    session: Session,
    Query(fields): Query<HashMap<String, String>>,
) -> AppResult<Json<Value>> {
    respond_exists(&store, &config, &session, fields).await
}

#[debug_handler(state = AppState)]
pub(crate) async fn exists_form(
    State(store): State<RoomStore>,
    State(config): State<Arc<Config>>,
    session: Session,
    Form(fields): Form<HashMap<String, String>>,
) -> AppResult<Json<Value>> {
    respond_exists(&store, &config, &session, fields).await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn links_and_bare_codes_resolve_alike() {
        let store = RoomStore::connect("sqlite::memory:").await.unwrap();
        let format = CodeFormat::Pattern;
        let code = format.parse("ab1-cd23-ef4").unwrap();
        store.create(&code, Duration::from_secs(60)).await.unwrap();

        for raw in ["ab1-cd23-ef4", "http://host/ab1-cd23-ef4", " ab1-cd23-ef4 "] {
            assert_eq!(check_room(&store, format, Some(raw)).await.unwrap(), Ok(code.clone()));
        }
    }

    #[tokio::test]
    async fn malformed_and_missing_are_distinguished_internally() {
        let store = RoomStore::connect("sqlite::memory:").await.unwrap();
        let format = CodeFormat::Pattern;
        assert_eq!(check_room(&store, format, None).await.unwrap(), Err(Refusal::InvalidCode));
        assert_eq!(check_room(&store, format, Some("nope")).await.unwrap(), Err(Refusal::InvalidCode));
        assert_eq!(
            check_room(&store, format, Some("zzz-zzzz-zzz")).await.unwrap(),
            Err(Refusal::RoomNotFound)
        );
    }
}
