pub mod auth;
pub mod chat;
pub mod client;
pub mod code;
pub mod config;
pub mod ids;
pub mod mesh;
pub mod rooms;
pub mod session;
pub mod store;

use std::sync::Arc;

use axum::{
    Router,
    extract::FromRef,
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::Value;
use time::OffsetDateTime;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, cookie::SameSite};

use config::Config;
use store::RoomStore;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub store: RoomStore,
    pub clients: auth::Clients,
    pub config: Arc<Config>,
}

pub fn app(state: AppState) -> Router {
    let sessions = session_layer(&state.config);
    let cors = cors_layer(&state.config);

    Router::new()
        .merge(auth::router())
        .nest("/api/room", rooms::router())
        .with_state(state)
        .layer(sessions)
        .layer(cors)
}

pub fn session_layer(config: &Config) -> SessionManagerLayer<MemoryStore> {
    let inactivity = i64::try_from(config.session_inactivity.as_secs()).unwrap_or(i64::MAX);
    SessionManagerLayer::new(MemoryStore::default())
        .with_name(config.cookie_name.clone())
        .with_secure(config.public_url.starts_with("https://"))
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::seconds(inactivity)))
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.cors_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
}

pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

pub trait GetField {
    fn get_str_field(&self, field: &str) -> AppResult<String>;
    fn get_obj_field(&self, field: &str) -> AppResult<&Value>;
    /// Provider ids arrive as strings from some providers and as numbers from others.
    fn get_id_field(&self, field: &str) -> AppResult<String>;
}

impl GetField for serde_json::Value {
    fn get_str_field(&self, field: &str) -> AppResult<String> {
        Ok(
            self.get(field)
            .ok_or(format!("expected {field} in {self}"))?
            .as_str()
            .ok_or(format!("expected {field} in {self} to be string"))?
            .to_owned()
        )
    }

    fn get_obj_field(&self, field: &str) -> AppResult<&Value> {
        self.get(field)
        .ok_or(format!("expected {field} in {self}").into())
    }

    fn get_id_field(&self, field: &str) -> AppResult<String> {
        match self.get(field) {
            Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
            Some(Value::Number(id)) => Ok(id.to_string()),
            _ => Err(format!("expected {field} in {self} to be a string or number id").into()),
        }
    }
}


pub type AppResult<T> = Result<T, AppError>;
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("{}", self.0),
        )
            .into_response()
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        Self(anyhow::Error::msg(err))
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        Self(anyhow::Error::msg(err.to_owned()))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self(err)
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(serde_json::Error);
apperr_impl!(sqlx::Error);
apperr_impl!(tower_sessions::session::Error);
apperr_impl!(reqwest::Error);
apperr_impl!(std::io::Error);
apperr_impl!(oauth2::url::ParseError);

impl<E: core::error::Error + Send + Sync + 'static, R: oauth2::ErrorResponse + Send + Sync + 'static> From<oauth2::RequestTokenError<E, R>> for AppError {
    fn from(err: oauth2::RequestTokenError<E, R>) -> Self {
        Self(anyhow::Error::from(err))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn id_fields_accept_strings_and_numbers() {
        let google = json!({ "id": "10769150350006150715113082367" });
        let github = json!({ "id": 98765 });
        assert_eq!(google.get_id_field("id").unwrap(), "10769150350006150715113082367");
        assert_eq!(github.get_id_field("id").unwrap(), "98765");
        assert!(json!({ "id": "" }).get_id_field("id").is_err());
        assert!(json!({}).get_id_field("id").is_err());
    }

    #[test]
    fn clock_is_in_milliseconds() {
        let now = now_millis();
        // 2020-01-01 .. 2100-01-01
        assert!(now > 1_577_836_800_000 && now < 4_102_444_800_000);
    }
}
