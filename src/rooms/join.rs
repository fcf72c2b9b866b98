use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{debug_handler, extract::State, Form, Json};
use serde_json::Value;
use tower_sessions::Session;

use crate::{
    code::{CodeFormat, RoomCode},
    config::Config,
    ids::{PeerAddress, SubjectId},
    store::{Participants, RoomStore},
    AppResult, AppState,
};

use super::{caller, code_body, respond, settle, Outcome, Refusal};

/// Maps `subject` to `peer` in the room and returns everyone now in it.
pub async fn join_room(
    store: &RoomStore,
    format: CodeFormat,
    ttl: Duration,
    subject: &SubjectId,
    raw_code: Option<&str>,
    raw_peer: Option<&str>,
) -> AppResult<Outcome<(RoomCode, Participants)>> {
    let Some(code) = raw_code.and_then(|raw| format.parse(raw.trim())) else {
        return Ok(Err(Refusal::InvalidCode));
    };
    let Some(peer) = raw_peer.map(str::trim).filter(|peer| !peer.is_empty()).map(PeerAddress::new) else {
        return Ok(Err(Refusal::MissingPeer));
    };

    if store.get(&code).await?.is_none() {
        return Ok(Err(Refusal::RoomNotFound));
    }
    if !store.upsert_participant(&code, subject, &peer, ttl).await? {
        return Ok(Err(Refusal::RoomNotFound));
    }
    let Some(record) = store.get(&code).await? else {
        return Ok(Err(Refusal::RoomNotFound));
    };

    tracing::info!(%code, %subject, %peer, participants = record.participants.len(), "joined room");
    Ok(Ok((code, record.participants)))
}

#[debug_handler(state = AppState)]
pub(crate) async fn join(
    State(store): State<RoomStore>,
    State(config): State<Arc<Config>>,
    session: Session,
    Form(fields): Form<HashMap<String, String>>,
) -> AppResult<Json<Value>> {
    let outcome = match caller(&session, &config).await? {
        Ok(subject) => {
            join_room(
                &store,
                config.code_format,
                config.room_ttl,
                &subject,
                fields.get(&config.code_field).map(String::as_str),
                fields.get(&config.peer_field).map(String::as_str),
            )
            .await?
        }
        Err(refusal) => Err(refusal),
    };

    let joined = settle("join", outcome);
    let mut body = code_body(&config, joined.as_ref().map(|(code, _)| code));
    body.insert(
        "participants".to_owned(),
        joined.map_or(Ok(Value::Null), |(_, participants)| serde_json::to_value(participants))?,
    );
    Ok(respond(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn rejoining_replaces_the_address() {
        let store = RoomStore::connect("sqlite::memory:").await.unwrap();
        let format = CodeFormat::Pattern;
        let code = format.parse("ab1-cd23-ef4").unwrap();
        let alice = SubjectId::new("google", 1);
        store.create(&code, TTL).await.unwrap();

        join_room(&store, format, TTL, &alice, Some("ab1-cd23-ef4"), Some("peer-a")).await.unwrap().unwrap();
        let (_, participants) = join_room(&store, format, TTL, &alice, Some("ab1-cd23-ef4"), Some("peer-a2"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(participants.len(), 1);
        assert_eq!(participants[&alice], PeerAddress::new("peer-a2"));
    }

    #[tokio::test]
    async fn refuses_bad_input_before_touching_the_store() {
        let store = RoomStore::connect("sqlite::memory:").await.unwrap();
        let format = CodeFormat::Pattern;
        let alice = SubjectId::new("google", 1);

        let outcome = join_room(&store, format, TTL, &alice, Some("AB1-CD23-EF4"), Some("p")).await.unwrap();
        assert_eq!(outcome, Err(Refusal::InvalidCode));

        let outcome = join_room(&store, format, TTL, &alice, Some("ab1-cd23-ef4"), Some("  ")).await.unwrap();
        assert_eq!(outcome, Err(Refusal::MissingPeer));

        let outcome = join_room(&store, format, TTL, &alice, Some("ab1-cd23-ef4"), Some("p")).await.unwrap();
        assert_eq!(outcome, Err(Refusal::RoomNotFound));
    }
}
