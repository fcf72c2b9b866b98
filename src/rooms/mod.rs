//! Rendezvous request handlers.
//!
//! Every expected failure (no session, malformed code, missing room, no free
//! code) is answered with the code field set to `null` in a 200 response, so a
//! caller can't tell an unauthenticated request from a missing room. Only store
//! and session failures become a 500.

mod create;
mod exists;
mod fetch;
mod join;
mod leave;

use axum::{routing::{get, post}, Json, Router};
use serde_json::{Map, Value};
use tower_sessions::Session;

use crate::{code::RoomCode, config::Config, ids::SubjectId, session, AppResult, AppState};

pub use create::create_room;
pub use exists::check_room;
pub use fetch::{fetch_room, Fetched};
pub use join::join_room;
pub use leave::leave_room;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create", get(create::create))
        .route("/exist", get(exists::exists_query).post(exists::exists_form))
        .route("/join", post(join::join))
        .route("/leave", post(leave::leave))
        .route("/fetch", post(fetch::fetch))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Refusal {
    #[error("caller is not signed in")]
    Unauthenticated,
    #[error("room code is malformed")]
    InvalidCode,
    #[error("peer address is missing")]
    MissingPeer,
    #[error("room does not exist or has expired")]
    RoomNotFound,
    #[error("no free room code after {0} attempts")]
    CreateExhausted(u32),
}

pub type Outcome<T> = Result<T, Refusal>;

pub(crate) async fn caller(session: &Session, config: &Config) -> AppResult<Outcome<SubjectId>> {
    Ok(session::current_user(session, &config.user_field)
        .await?
        .map(|user| user.id)
        .ok_or(Refusal::Unauthenticated))
}

/// Logs a refusal and turns it into the null sentinel.
pub(crate) fn settle<T>(operation: &str, outcome: Outcome<T>) -> Option<T> {
    outcome
        .inspect_err(|refusal| tracing::debug!(operation, %refusal, "refused"))
        .ok()
}

pub(crate) fn code_body(config: &Config, code: Option<&RoomCode>) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert(
        config.code_field.clone(),
        code.map_or(Value::Null, |code| Value::String(code.to_string())),
    );
    body
}

pub(crate) fn respond(body: Map<String, Value>) -> Json<Value> {
    Json(Value::Object(body))
}
