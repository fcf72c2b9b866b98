//! Client side of the rendezvous API.

use reqwest::header::COOKIE;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{
    code::RoomCode,
    ids::PeerAddress,
    mesh::MeshError,
    rooms::Fetched,
    session::SessionUser,
    store::Participants,
};

/// What the mesh needs from the rendezvous service.
#[allow(async_fn_in_trait)]
pub trait Rendezvous {
    /// Registers `peer` as our address in the room. `None` when the room is gone.
    async fn join(&mut self, code: &RoomCode, peer: &PeerAddress) -> Result<Option<Participants>, MeshError>;

    async fn leave(&mut self, code: &RoomCode) -> Result<(), MeshError>;
}

#[derive(Debug, Deserialize)]
struct FetchedBody {
    participants: Option<Participants>,
    #[serde(default)]
    changed: bool,
}

/// Talks to a rendezvous server over HTTP with an existing session cookie.
#[derive(Debug, Clone)]
pub struct HttpRendezvous {
    http: reqwest::Client,
    base: String,
    cookie: Option<String>,
    code_field: String,
    peer_field: String,
}

impl HttpRendezvous {
    /// `base` is the server root, e.g. `http://localhost:8080`.
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.into().trim_end_matches('/').to_owned(),
            cookie: None,
            code_field: "code".to_owned(),
            peer_field: "peer".to_owned(),
        }
    }

    /// Session cookie as sent in a `Cookie` header, `name=value`.
    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }

    pub fn with_fields(mut self, code_field: impl Into<String>, peer_field: impl Into<String>) -> Self {
        self.code_field = code_field.into();
        self.peer_field = peer_field.into();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.authorize(self.http.get(self.url(path)))
    }

    fn post(&self, path: &str, form: &[(&str, &str)]) -> reqwest::RequestBuilder {
        self.authorize(self.http.post(self.url(path)).form(form))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.cookie {
            Some(cookie) => request.header(COOKIE, cookie),
            None => request,
        }
    }

    async fn body(request: reqwest::RequestBuilder) -> Result<Map<String, Value>, MeshError> {
        Ok(request.send().await?.error_for_status()?.json().await?)
    }

    fn code_of(&self, body: &Map<String, Value>) -> Result<Option<RoomCode>, MeshError> {
        match body.get(&self.code_field) {
            None | Some(Value::Null) => Ok(None),
            Some(code) => Ok(Some(serde_json::from_value(code.clone())?)),
        }
    }

    /// Signed-in user behind the cookie, if any.
    pub async fn me(&self) -> Result<Option<SessionUser>, MeshError> {
        Ok(self.get("/me").send().await?.error_for_status()?.json().await?)
    }

    pub async fn create(&self) -> Result<Option<RoomCode>, MeshError> {
        let body = Self::body(self.get("/api/room/create")).await?;
        self.code_of(&body)
    }

    /// Accepts a bare code or a URL ending in one.
    pub async fn exists(&self, code_or_url: &str) -> Result<Option<RoomCode>, MeshError> {
        let body = Self::body(self.post("/api/room/exist", &[(self.code_field.as_str(), code_or_url)])).await?;
        self.code_of(&body)
    }

    pub async fn fetch(&self, code: &RoomCode) -> Result<Option<Fetched>, MeshError> {
        let body = Self::body(self.post("/api/room/fetch", &[(self.code_field.as_str(), code.as_str())])).await?;
        let Some(code) = self.code_of(&body)? else {
            return Ok(None);
        };
        let fetched: FetchedBody = serde_json::from_value(Value::Object(body))?;
        Ok(Some(Fetched {
            code,
            participants: fetched.participants.unwrap_or_default(),
            changed: fetched.changed,
        }))
    }
}

impl Rendezvous for HttpRendezvous {
    async fn join(&mut self, code: &RoomCode, peer: &PeerAddress) -> Result<Option<Participants>, MeshError> {
        let form = [(self.code_field.as_str(), code.as_str()), (self.peer_field.as_str(), peer.as_str())];
        let body = Self::body(self.post("/api/room/join", &form)).await?;
        if self.code_of(&body)?.is_none() {
            return Ok(None);
        }
        match body.get("participants") {
            None | Some(Value::Null) => Ok(Some(Participants::new())),
            Some(participants) => Ok(Some(serde_json::from_value(participants.clone())?)),
        }
    }

    async fn leave(&mut self, code: &RoomCode) -> Result<(), MeshError> {
        Self::body(self.post("/api/room/leave", &[(self.code_field.as_str(), code.as_str())])).await?;
        Ok(())
    }
}
