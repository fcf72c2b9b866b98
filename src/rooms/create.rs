use std::{sync::Arc, time::Duration};

use axum::{debug_handler, extract::State, Json};
use serde_json::Value;
use tower_sessions::Session;

use crate::{code::RoomCode, config::Config, store::RoomStore, AppResult, AppState};

use super::{caller, code_body, respond, settle, Outcome, Refusal};

/// Issues a fresh code, retrying only when a candidate is already taken.
pub async fn create_room(
    store: &RoomStore,
    mut generate: impl FnMut() -> RoomCode,
    attempts: u32,
    ttl: Duration,
) -> AppResult<Outcome<RoomCode>> {
    for attempt in 1..=attempts {
        let code = generate();
        if store.exists(&code).await? {
            tracing::debug!(attempt, "room code collision");
            continue;
        }
        if store.create(&code, ttl).await? {
            tracing::info!(%code, "room created");
            return Ok(Ok(code));
        }
        tracing::debug!(attempt, "room code claimed concurrently");
    }

    Ok(Err(Refusal::CreateExhausted(attempts)))
}

#[debug_handler(state = AppState)]
pub(crate) async fn create(
    State(store): State<RoomStore>,
    State(config): State<Arc<Config>>,
    session: Session,
) -> AppResult<Json<Value>> {
    let outcome = match caller(&session, &config).await? {
        Ok(_) => {
            create_room(
                &store,
                || config.code_format.generate(),
                config.create_attempts,
                config.room_ttl,
            )
            .await?
        }
        Err(refusal) => Err(refusal),
    };

    let code = settle("create", outcome);
    Ok(respond(code_body(&config, code.as_ref())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::CodeFormat;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn issues_a_verifiable_code() {
        let store = RoomStore::connect("sqlite::memory:").await.unwrap();
        let format = CodeFormat::Pattern;
        let code = create_room(&store, || format.generate(), 3, TTL).await.unwrap().unwrap();
        assert!(format.verify(code.as_str()));
        assert!(store.exists(&code).await.unwrap());
    }

    #[tokio::test]
    async fn retries_past_collisions() {
        let store = RoomStore::connect("sqlite::memory:").await.unwrap();
        let taken = CodeFormat::Pattern.parse("aaa-aaaa-aaa").unwrap();
        let free = CodeFormat::Pattern.parse("bbb-bbbb-bbb").unwrap();
        store.create(&taken, TTL).await.unwrap();

        let mut candidates = vec![free.clone(), taken.clone(), taken.clone()];
        let code = create_room(&store, || candidates.pop().unwrap(), 3, TTL).await.unwrap();
        assert_eq!(code, Ok(free));
    }

    #[tokio::test]
    async fn gives_up_after_the_attempt_budget() {
        let store = RoomStore::connect("sqlite::memory:").await.unwrap();
        let taken = CodeFormat::Pattern.parse("aaa-aaaa-aaa").unwrap();
        store.create(&taken, TTL).await.unwrap();

        let mut generated = 0;
        let outcome = create_room(
            &store,
            || {
                generated += 1;
                taken.clone()
            },
            4,
            TTL,
        )
        .await
        .unwrap();
        assert_eq!(outcome, Err(Refusal::CreateExhausted(4)));
        assert_eq!(generated, 4);
    }
}
