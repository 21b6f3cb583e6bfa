//! Shared harness for the integration tests: a real server on a random
//! port backed by a temporary data directory and the bundled static assets.

#![allow(dead_code)]

use futures_util::StreamExt;
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::StatusCode;
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

use booklib_server::books::catalog::CatalogClient;
use booklib_server::state::{AppState, Keepalive, SessionSettings};
use booklib_server::ws::broadcast::{self, DEFAULT_BROADCAST_CAPACITY};
use booklib_server::ws::ConnectionRegistry;

pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub const PASSWORD: &str = "correct horse battery";

/// The assets shipped with the server, so tests see what users get.
pub const STATIC_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/static");

pub struct TestServer {
    pub base_url: String,
    pub addr: SocketAddr,
    pub state: AppState,
}

/// Start the server with a catalog client pointing at an unused port.
pub async fn start_test_server() -> TestServer {
    let catalog = CatalogClient::new("http://127.0.0.1:9/volumes", Duration::from_secs(2));
    start_test_server_with_catalog(catalog).await
}

pub async fn start_test_server_with_catalog(catalog: CatalogClient) -> TestServer {
    start_test_server_with(catalog, None).await
}

/// Start the server with keepalive pings enabled.
pub async fn start_test_server_with_keepalive(keepalive: Keepalive) -> TestServer {
    let catalog = CatalogClient::new("http://127.0.0.1:9/volumes", Duration::from_secs(2));
    start_test_server_with(catalog, Some(keepalive)).await
}

/// Start the server on a random port and return its address and shared state.
pub async fn start_test_server_with(
    catalog: CatalogClient,
    keepalive: Option<Keepalive>,
) -> TestServer {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = booklib_server::db::init_db(&data_dir).expect("Failed to init DB");

    let connections = ConnectionRegistry::new();
    let (notifier, events) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
    broadcast::spawn_delivery_loop(events, connections.clone());

    let state = AppState {
        db,
        connections,
        notifier,
        catalog,
        sessions: SessionSettings::default(),
        keepalive,
        static_dir: STATIC_DIR.to_string(),
    };

    let app = booklib_server::routes::build_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
        let _keep = tmp_dir;
    });

    TestServer {
        base_url: format!("http://{}", addr),
        addr,
        state,
    }
}

/// HTTP client that does not follow redirects.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

pub async fn register(client: &reqwest::Client, base_url: &str, username: &str) -> StatusCode {
    client
        .post(format!("{}/register", base_url))
        .json(&json!({ "username": username, "password": PASSWORD }))
        .send()
        .await
        .unwrap()
        .status()
}

/// Log in and return the `session=<token>` pair to send back as a Cookie header.
pub async fn login(client: &reqwest::Client, base_url: &str, username: &str) -> String {
    let resp = client
        .post(format!("{}/login", base_url))
        .json(&json!({ "username": username, "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK, "login should succeed");
    session_pair(&resp)
}

/// Register and log in; costs two rate-limited requests.
pub async fn signup(client: &reqwest::Client, base_url: &str, username: &str) -> String {
    assert_eq!(register(client, base_url, username).await, StatusCode::CREATED);
    login(client, base_url, username).await
}

pub fn session_pair(resp: &reqwest::Response) -> String {
    let set_cookie = resp
        .headers()
        .get(SET_COOKIE)
        .expect("Set-Cookie header")
        .to_str()
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

pub fn dune() -> serde_json::Value {
    json!({
        "title": "Dune",
        "author": "Herbert",
        "published_date": "1965-06-01",
        "isbn": "9780441013593",
        "categories": "sci-fi",
        "rating": 5
    })
}

pub async fn create_book(
    client: &reqwest::Client,
    base_url: &str,
    cookie: &str,
    body: &serde_json::Value,
) -> serde_json::Value {
    let resp = client
        .post(format!("{}/api/books", base_url))
        .header(COOKIE, cookie)
        .json(body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    resp.json().await.unwrap()
}

/// Open a WebSocket carrying the session cookie and wait until it is registered.
pub async fn connect_ws(server: &TestServer, cookie: &str) -> WsStream {
    let before = server.state.connections.len();
    let mut request = format!("ws://{}/ws", server.addr)
        .into_client_request()
        .unwrap();
    request
        .headers_mut()
        .insert(COOKIE, cookie.parse().unwrap());
    let (ws, _) = tokio_tungstenite::connect_async(request)
        .await
        .expect("WebSocket connect should succeed");
    wait_for_clients(server, before + 1).await;
    ws
}

/// Poll until the registry holds exactly `expected` clients.
pub async fn wait_for_clients(server: &TestServer, expected: usize) {
    for _ in 0..100 {
        if server.state.connections.len() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!(
        "expected {} registered clients, found {}",
        expected,
        server.state.connections.len()
    );
}

/// Next text frame as JSON, or None if nothing arrives within `wait`.
pub async fn next_event(ws: &mut WsStream, wait: Duration) -> Option<serde_json::Value> {
    loop {
        match tokio::time::timeout(wait, ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                return Some(serde_json::from_str(text.as_str()).unwrap());
            }
            Ok(Some(Ok(Message::Ping(_)))) | Ok(Some(Ok(Message::Pong(_)))) => continue,
            _ => return None,
        }
    }
}
