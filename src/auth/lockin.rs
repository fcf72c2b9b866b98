use std::sync::Arc;

use axum::{debug_handler, extract::{Path, Query, State}, response::{IntoResponse, Redirect}};
use oauth2::{AuthorizationCode, CsrfToken, PkceCodeVerifier, TokenResponse};
use reqwest::header::USER_AGENT;
use serde::Deserialize;
use tower_sessions::Session;

use crate::{config::Config, session::{self, CSRF_STATE, PKCE_VERIFIER, RETURN_URL}, AppResult, AppState};

use super::{clients::ClientProvider, Clients};

#[derive(Deserialize)]
pub struct LockinQuery {
    pub state: Option<String>,
    pub code: Option<String>,
}

#[debug_handler(state = AppState)]
pub async fn lockin(
    Path(provider): Path<ClientProvider>,
    Query(LockinQuery { state, code }): Query<LockinQuery>,
    State(clients): State<Clients>,
    State(config): State<Arc<Config>>,
    session: Session,
) -> AppResult<impl IntoResponse> {
    let state = CsrfToken::new(state.ok_or("OAuth: without state")?);
    let code = AuthorizationCode::new(code.ok_or("OAuth: without code")?);

    let Some(stored_state) = session.remove::<String>(CSRF_STATE).await? else {
        return Err("no csrf_state")?;
    };

    if state.secret().as_str() != stored_state.as_str() {
        return Err("csrf tokens don't match")?;
    }

    let Some(pkce_verifier) = session.remove::<String>(PKCE_VERIFIER).await? else {
        return Err("no pkce_verifier")?;
    };

    let client = clients.get_client(provider)?;
    let http_client = reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    let token_result = client
        .exchange_code(code)
        .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier))
        .request_async(&http_client)
        .await?;

    let access_token = token_result.access_token().secret();
    let info: serde_json::Value = http_client.get(provider.user_info_url())
        .bearer_auth(access_token)
        .header(USER_AGENT, env!("CARGO_PKG_NAME"))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let user = provider.session_user(&info)?;
    let return_url = session.remove::<String>(RETURN_URL).await?;

    tracing::info!(subject = %user.id, "signed in");
    session::sign_in(&session, &config.user_field, user).await?;

    Ok(Redirect::to(&super::logout::local_path(return_url)))
}
