use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tunnelhub_common::{
    config::{TunnelHubConfig, SERVER_CONFIG},
    db::{setup_pool, DbPool},
};
use tunnelhub_core::{build_webapp, db::User};

struct TestClient {
    client: Client,
    base_url: String,
}

impl TestClient {
    async fn get(&self, path: &str, token: Option<&str>) -> reqwest::Response {
        let mut request = self.client.get(format!("{}{path}", self.base_url));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.unwrap()
    }

    async fn post(&self, path: &str, token: Option<&str>, body: &Value) -> reqwest::Response {
        let mut request = self.client.post(format!("{}{path}", self.base_url));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.json(body).send().await.unwrap()
    }
}

async fn make_test_client() -> (TestClient, DbPool) {
    // tests share one process-wide config
    let _ = SERVER_CONFIG.set(TunnelHubConfig::default());
    let pool = setup_pool().await;
    User::init_admin_user(&pool, "pass123").await.unwrap();

    let webapp = build_webapp(pool.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, webapp.into_make_service())
            .await
            .unwrap();
    });

    (
        TestClient {
            client: Client::new(),
            base_url: format!("http://{addr}/api/v1"),
        },
        pool,
    )
}

async fn login(client: &TestClient, username: &str, password: &str) -> String {
    let response = client
        .post(
            "/auth",
            None,
            &json!({ "username": username, "password": password }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    body["access_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_check() {
    let (client, _) = make_test_client().await;
    let response = client.get("/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "alive");
}

#[tokio::test]
async fn test_authentication() {
    let (client, _) = make_test_client().await;

    let response = client
        .post(
            "/auth",
            None,
            &json!({ "username": "admin", "password": "-wrong-" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let token = login(&client, "admin", "pass123").await;
    let response = client.get("/me", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let me: Value = response.json().await.unwrap();
    assert_eq!(me["username"], "admin");
    assert_eq!(me["role"], "admin");

    let response = client.get("/me", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_registration_and_refresh() {
    let (client, _) = make_test_client().await;

    let response = client
        .post(
            "/auth/register",
            None,
            &json!({ "username": "scott", "password": "hunter2" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let tokens: Value = response.json().await.unwrap();
    let refresh_token = tokens["refresh_token"].as_str().unwrap();

    // duplicate username is refused
    let response = client
        .post(
            "/auth/register",
            None,
            &json!({ "username": "scott", "password": "hunter2" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .post(
            "/auth/refresh",
            None,
            &json!({ "refresh_token": refresh_token }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let refreshed: Value = response.json().await.unwrap();
    assert!(refreshed["access_token"].is_string());
}

#[tokio::test]
async fn test_connection_flow_over_http() {
    let (client, _) = make_test_client().await;
    let admin_token = login(&client, "admin", "pass123").await;

    // admin provisions a relay
    let response = client
        .post(
            "/server",
            Some(&admin_token),
            &json!({
                "name": "frankfurt-1",
                "host": "fra1.relay.example.com",
                "port": 443,
                "protocol": "ssh_ssl",
                "country": "Germany",
                "country_code": "DE",
                "max_users": 10,
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let server: Value = response.json().await.unwrap();
    let server_id = server["id"].as_i64().unwrap();

    // plain users cannot provision relays
    client
        .post(
            "/auth/register",
            None,
            &json!({ "username": "scott", "password": "hunter2" }),
        )
        .await;
    let user_token = login(&client, "scott", "hunter2").await;
    let response = client
        .post(
            "/server",
            Some(&user_token),
            &json!({ "name": "x", "host": "x", "port": 1, "protocol": "ssh_ssl" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // the selector offers the relay
    let response = client.get("/server/best", Some(&user_token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let best: Value = response.json().await.unwrap();
    assert_eq!(best["id"].as_i64().unwrap(), server_id);

    // connect, then report usage on disconnect
    let response = client
        .post(
            "/connection",
            Some(&user_token),
            &json!({ "server_id": server_id, "protocol": "ssh_ssl" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let connection: Value = response.json().await.unwrap();
    let connection_id = connection["id"].as_i64().unwrap();
    assert_eq!(connection["status"], "connected");

    let response = client
        .post(
            &format!("/connection/{connection_id}/disconnect"),
            Some(&user_token),
            &json!({ "uploaded": 1048576, "downloaded": 2097152 }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let finalized: Value = response.json().await.unwrap();
    assert_eq!(finalized["status"], "disconnected");
    assert_eq!(finalized["uploaded"].as_i64().unwrap(), 1048576);

    // usage shows up in the daily breakdown
    let response = client.get("/usage/daily", Some(&user_token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let rows: Value = response.json().await.unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 1);
    assert_eq!(rows[0]["uploaded"].as_i64().unwrap(), 1048576);

    let response = client.get("/usage/quota", Some(&user_token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let quota: Value = response.json().await.unwrap();
    assert_eq!(quota["has_limit"], false);
    assert_eq!(quota["used_mb"].as_f64().unwrap(), 3.0);
}

#[tokio::test]
async fn test_admin_force_disconnect_endpoint() {
    let (client, pool) = make_test_client().await;
    let admin_token = login(&client, "admin", "pass123").await;

    client
        .post(
            "/server",
            Some(&admin_token),
            &json!({ "name": "relay", "host": "relay.example.com", "port": 443, "protocol": "ssh_ssl" }),
        )
        .await;
    client
        .post(
            "/auth/register",
            None,
            &json!({ "username": "scott", "password": "hunter2" }),
        )
        .await;
    // allow two parallel devices
    let mut user = User::find_by_username(&pool, "scott").await.unwrap().unwrap();
    user.max_devices = 2;
    user.save(&pool).await.unwrap();

    let user_token = login(&client, "scott", "hunter2").await;
    for _ in 0..2 {
        let response = client
            .post(
                "/connection",
                Some(&user_token),
                &json!({ "protocol": "ssh_ssl" }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = client.get("/connection/live", Some(&admin_token)).await;
    let live: Value = response.json().await.unwrap();
    assert_eq!(live.as_array().unwrap().len(), 2);

    let response = client
        .post("/user/scott/disconnect", Some(&admin_token), &json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["disconnected"].as_i64().unwrap(), 2);

    let response = client.get("/connection/live", Some(&admin_token)).await;
    let live: Value = response.json().await.unwrap();
    assert!(live.as_array().unwrap().is_empty());
}
