use axum::{debug_handler, extract::State, routing::get, Json, Router};
use rand::seq::IndexedRandom;
use std::sync::Arc;
use tower_sessions::Session;

use crate::{config::Config, session::{self, SessionUser}, AppResult, AppState};

mod clients;
mod login;
mod lockin;
mod logout;

pub use clients::{ClientProvider, Clients};
pub use login::login;
pub use lockin::lockin;
pub use logout::logout;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login/{provider}", get(login))
        .route("/lockin/{provider}", get(lockin))
        .route("/logout", get(logout))
        .route("/me", get(me))
}

/// The signed-in user, or `null`. Clients use it to find themselves in a participant map.
#[debug_handler(state = AppState)]
pub async fn me(
    State(config): State<Arc<Config>>,
    session: Session,
) -> AppResult<Json<Option<SessionUser>>> {
    Ok(Json(session::current_user(&session, &config.user_field).await?))
}

/// Display name for accounts whose provider reports none.
pub(crate) fn fallback_name() -> String {
    let adjectives = [
        "Quick", "Lazy", "Mysterious", "Jolly", "Brave", "Silent", "Witty", "Fierce",
        "Clever", "Gentle", "Wild", "Calm", "Bold", "Shy", "Proud", "Happy", "Sad",
        "Eager", "Fancy", "Rusty", "Golden", "Silver", "Bright", "Dark", "Lucky",
        ];

    let nouns = [
        "Fox", "Bear", "Eagle", "Wolf", "Dragon", "Tiger", "Lion", "Owl", "Rabbit",
        "Falcon", "Hawk", "Shark", "Panda", "Kitten", "Puppy", "Phoenix", "Griffin",
        "Unicorn", "Turtle", "Dolphin", "Whale", "Elephant", "Giraffe", "Zebra",
    ];

    let mut rng = rand::rng();
    match (adjectives.choose(&mut rng), nouns.choose(&mut rng)) {
        (Some(adjective), Some(noun)) => format!("{adjective} {noun}"),
        _ => "Nameless User".to_owned(),
    }
}
