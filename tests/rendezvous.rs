use std::{collections::HashMap, sync::Arc};

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    routing::post,
    Form, Router,
};
use roomlink::{
    auth,
    client::{HttpRendezvous, Rendezvous},
    config::Config,
    ids::{PeerAddress, SubjectId},
    rooms,
    session::{self, SessionUser},
    store::RoomStore,
    AppResult, AppState,
};
use serde_json::{json, Value};
use tower::ServiceExt;

async fn test_login(
    State(config): State<Arc<Config>>,
    session: tower_sessions::Session,
    Form(fields): Form<HashMap<String, String>>,
) -> AppResult<()> {
    let id = fields.get("id").cloned().unwrap_or_default();
    let user = SessionUser {
        id: SubjectId::new("google", &id),
        name: format!("user {id}"),
        email: format!("{id}@example.com"),
        image: String::new(),
    };
    session::sign_in(&session, &config.user_field, user).await
}

async fn state() -> AppState {
    AppState {
        store: RoomStore::connect("sqlite::memory:").await.unwrap(),
        clients: auth::Clients::default(),
        config: Arc::new(Config::default()),
    }
}

fn router(state: AppState) -> Router {
    let sessions = roomlink::session_layer(&state.config);
    Router::new()
        .merge(auth::router())
        .nest("/api/room", rooms::router())
        .route("/test/login", post(test_login))
        .with_state(state)
        .layer(sessions)
}

fn form(uri: &str, cookie: Option<&str>, body: &str) -> Request<Body> {
    let mut request = Request::post(uri).header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        request = request.header(header::COOKIE, cookie);
    }
    request.body(Body::from(body.to_owned())).unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut request = Request::get(uri);
    if let Some(cookie) = cookie {
        request = request.header(header::COOKIE, cookie);
    }
    request.body(Body::empty()).unwrap()
}

async fn call(app: &Router, request: Request<Body>) -> Value {
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn login(app: &Router, id: &str) -> String {
    let response = app
        .clone()
        .oneshot(form("/test/login", None, &format!("id={id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    set_cookie.split(';').next().unwrap().to_owned()
}

#[tokio::test]
async fn anonymous_callers_get_null_codes() {
    let app = router(state().await);

    assert_eq!(call(&app, get("/api/room/create", None)).await, json!({ "code": null }));
    assert_eq!(
        call(&app, get("/api/room/exist?code=ab1-cd23-ef4", None)).await,
        json!({ "code": null })
    );
    assert_eq!(
        call(&app, form("/api/room/join", None, "code=ab1-cd23-ef4&peer=p")).await,
        json!({ "code": null, "participants": null })
    );
    assert_eq!(call(&app, form("/api/room/leave", None, "code=ab1-cd23-ef4")).await, json!({}));
}

#[tokio::test]
async fn malformed_and_unknown_codes_look_the_same() {
    let app = router(state().await);
    let alice = login(&app, "1").await;

    let malformed = call(&app, form("/api/room/exist", Some(&alice), "code=NOT-A-CODE")).await;
    let unknown = call(&app, form("/api/room/exist", Some(&alice), "code=zzz-zzzz-zzz")).await;
    assert_eq!(malformed, json!({ "code": null }));
    assert_eq!(malformed, unknown);
}

#[tokio::test]
async fn two_people_meet_and_one_leaves() {
    let app = router(state().await);
    let alice = login(&app, "1").await;
    let bob = login(&app, "2").await;

    let created = call(&app, get("/api/room/create", Some(&alice))).await;
    let code = created["code"].as_str().unwrap().to_owned();
    assert_eq!(code.len(), 12);

    let exists = call(
        &app,
        form("/api/room/exist", Some(&bob), &format!("code=http%3A%2F%2Fhost%2F{code}")),
    )
    .await;
    assert_eq!(exists["code"], code.as_str());

    call(&app, form("/api/room/join", Some(&alice), &format!("code={code}&peer=peer-a"))).await;
    let joined = call(&app, form("/api/room/join", Some(&bob), &format!("code={code}&peer=peer-b"))).await;
    assert_eq!(joined["code"], code.as_str());
    assert_eq!(joined["participants"], json!({ "google:1": "peer-a", "google:2": "peer-b" }));

    // leaving twice is the same as leaving once
    for _ in 0..2 {
        let left = call(&app, form("/api/room/leave", Some(&alice), &format!("code={code}"))).await;
        assert_eq!(left, json!({}));
    }

    let fetched = call(&app, form("/api/room/fetch", Some(&bob), &format!("code={code}"))).await;
    assert_eq!(fetched["participants"], json!({ "google:2": "peer-b" }));
    assert_eq!(fetched["changed"], true);

    let again = call(&app, form("/api/room/fetch", Some(&bob), &format!("code={code}"))).await;
    assert_eq!(again["changed"], false);
}

#[tokio::test]
async fn http_client_drives_a_live_server() {
    let app = router(state().await);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    let response = reqwest::Client::new()
        .post(format!("{base}/test/login"))
        .form(&[("id", "7")])
        .send()
        .await
        .unwrap();
    let cookie = response.headers()[reqwest::header::SET_COOKIE]
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_owned();

    let mut client = HttpRendezvous::new(&base).with_cookie(cookie);
    let me = client.me().await.unwrap().unwrap();
    assert_eq!(me.id, SubjectId::new("google", 7));

    let code = client.create().await.unwrap().unwrap();
    assert_eq!(client.exists(&format!("{base}/{code}")).await.unwrap(), Some(code.clone()));

    let participants = client.join(&code, &PeerAddress::new("peer-7")).await.unwrap().unwrap();
    assert_eq!(participants.get(&me.id), Some(&PeerAddress::new("peer-7")));

    let fetched = client.fetch(&code).await.unwrap().unwrap();
    assert!(fetched.changed);
    assert_eq!(fetched.participants, participants);

    client.leave(&code).await.unwrap();
    client.leave(&code).await.unwrap();
    assert!(client.fetch(&code).await.unwrap().unwrap().participants.is_empty());

    let anonymous = HttpRendezvous::new(&base);
    assert_eq!(anonymous.create().await.unwrap(), None);
}
