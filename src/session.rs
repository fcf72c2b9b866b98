use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::{AppResult, ids::SubjectId};

pub const CSRF_STATE: &str = "csrf_state";
pub const PKCE_VERIFIER: &str = "pkce_verifier";
pub const RETURN_URL: &str = "return_url";

/// What the identity provider vouched for at login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: SubjectId,
    pub name: String,
    pub email: String,
    pub image: String,
}

pub async fn current_user(session: &Session, field: &str) -> AppResult<Option<SessionUser>> {
    Ok(session.get::<SessionUser>(field).await?)
}

pub async fn sign_in(session: &Session, field: &str, user: SessionUser) -> AppResult<()> {
    // fresh id so a pre-login cookie can't be replayed
    session.cycle_id().await?;
    session.insert(field, user).await?;
    Ok(())
}
