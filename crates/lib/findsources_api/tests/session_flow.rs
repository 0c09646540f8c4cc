//! Integration tests: drive the producer, admin and consumer routers with
//! an in-memory store, a canned identity provider and a manual clock.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use chrono::Duration;
use findsources_api::config::ApiConfig;
use findsources_api::{AppState, SearchState, admin_router, consumer_router, producer_router};
use findsources_core::auth::one_time::OneTimeTokenCache;
use findsources_core::clock::{Clock, ManualClock};
use findsources_core::identity::{
    AuthorizationRequest, ExternalIdentity, IdentityError, IdentityProvider,
};
use findsources_core::models::auth::UserFlagsUpdate;
use findsources_core::store::memory::MemoryStore;
use findsources_core::store::{CredentialStore, Stores};
use serde_json::{Value, json};
use tower::ServiceExt;

const STATE: &str = "state-123";

struct FakeProvider {
    identities: HashMap<&'static str, ExternalIdentity>,
    discovery_down: bool,
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn get_redirect_uri(&self) -> Result<AuthorizationRequest, IdentityError> {
        if self.discovery_down {
            return Err(IdentityError::Provider("discovery document unavailable".into()));
        }
        Ok(AuthorizationRequest {
            uri: format!("https://idp.test/authorize?state={STATE}"),
            state: STATE.into(),
        })
    }

    async fn exchange_code_for_identity(&self, code: &str) -> Result<ExternalIdentity, IdentityError> {
        self.identities
            .get(code)
            .cloned()
            .ok_or_else(|| IdentityError::Provider("invalid_grant".into()))
    }
}

struct Harness {
    producer: Router,
    admin: Router,
    state: AppState,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
}

fn config() -> ApiConfig {
    let vars: HashMap<String, String> = [
        ("JWT_SECRET_KEY", "integration-secret"),
        ("AUTH_TOKEN_EXPIRE_MINUTES", "1"),
        ("ACCESS_TOKEN_EXPIRE_MINUTES", "15"),
        ("LOCAL_DEPLOYMENT", "true"),
        ("FRONTEND_URL", "http://frontend.test/"),
        ("HOME_URL", "http://admin.test/Home"),
        ("EXTERNAL_ID_KEY", "pepper"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    ApiConfig::from_map(&vars).unwrap()
}

fn harness() -> Harness {
    harness_with(false)
}

fn harness_with(discovery_down: bool) -> Harness {
    let identity = |sub: &str, verified: bool| ExternalIdentity {
        username: "Ada".into(),
        external_id: sub.into(),
        email_verified: verified,
    };
    let provider = FakeProvider {
        identities: HashMap::from([
            ("good", identity("google-sub-1", true)),
            ("unverified", identity("google-sub-2", false)),
        ]),
        discovery_down,
    };

    let clock = Arc::new(ManualClock::default());
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let store = Arc::new(MemoryStore::new());
    let stores = Stores {
        users: store.clone(),
        references: store.clone(),
    };
    let state = AppState::new(
        config(),
        stores,
        Arc::new(provider),
        Arc::new(OneTimeTokenCache::with_clock(dyn_clock.clone())),
        dyn_clock,
    );
    Harness {
        producer: producer_router(state.clone()),
        admin: admin_router(state.clone()),
        state,
        store,
        clock,
    }
}

async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.unwrap()
}

async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> axum::http::request::Builder {
    Request::builder().method("GET").uri(uri)
}

fn location(response: &Response<Body>) -> url::Url {
    let raw = response.headers()[header::LOCATION].to_str().unwrap();
    url::Url::parse(raw).unwrap()
}

fn query_param(url: &url::Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// `name=value` of the first `Set-Cookie` for `name`.
fn set_cookie(response: &Response<Body>, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .find(|pair| pair.starts_with(&format!("{name}=")))
        .map(str::to_string)
}

impl Harness {
    async fn callback(&self, code: &str) -> Response<Body> {
        let request = get(&format!("/login-callback?code={code}&state={STATE}"))
            .header(header::COOKIE, format!("oauth_state={STATE}"))
            .body(Body::empty())
            .unwrap();
        send(&self.producer, request).await
    }

    async fn one_time_token(&self, code: &str) -> String {
        let response = self.callback(code).await;
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        query_param(&location(&response), "authToken").expect("authToken in redirect")
    }

    async fn exchange(&self, token: &str) -> Response<Body> {
        let request = get("/login/")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        send(&self.producer, request).await
    }

    /// Full login, returning the `access_token=...` cookie pair.
    async fn sign_in(&self) -> String {
        let token = self.one_time_token("good").await;
        let response = self.exchange(&token).await;
        assert_eq!(response.status(), StatusCode::OK);
        set_cookie(&response, "access_token").expect("access cookie")
    }

    async fn with_cookie(&self, method: &str, uri: &str, cookie: &str, body: Body) -> Response<Body> {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::COOKIE, cookie)
            .body(body)
            .unwrap();
        send(&self.producer, request).await
    }
}

#[tokio::test]
async fn login_redirect_sets_state_cookie() {
    let h = harness();
    let response = send(&h.producer, get("/login-redirect").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response).host_str(), Some("idp.test"));
    assert_eq!(set_cookie(&response, "oauth_state"), Some(format!("oauth_state={STATE}")));
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn unreachable_provider_redirects_with_error() {
    let h = harness_with(true);
    let response = send(&h.producer, get("/login-redirect").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let url = location(&response);
    assert_eq!(url.host_str(), Some("frontend.test"));
    assert_eq!(query_param(&url, "loginError").as_deref(), Some("true"));
    assert!(set_cookie(&response, "oauth_state").is_none());
}

#[tokio::test]
async fn unverified_email_redirects_with_error_and_creates_no_user() {
    let h = harness();
    let response = h.callback("unverified").await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let url = location(&response);
    assert_eq!(query_param(&url, "loginError").as_deref(), Some("true"));
    assert_eq!(query_param(&url, "authToken"), None);
    assert_eq!(h.store.user_count().await, 0);
}

#[tokio::test]
async fn mismatched_state_is_rejected() {
    let h = harness();
    let request = get(&format!("/login-callback?code=good&state={STATE}"))
        .header(header::COOKIE, "oauth_state=something-else")
        .body(Body::empty())
        .unwrap();
    let response = send(&h.producer, request).await;
    assert_eq!(query_param(&location(&response), "loginError").as_deref(), Some("true"));
    assert_eq!(h.store.user_count().await, 0);
}

#[tokio::test]
async fn repeat_callback_resolves_to_the_same_user() {
    let h = harness();
    let first = h.one_time_token("good").await;
    let second = h.one_time_token("good").await;
    assert_ne!(first, second);
    assert_eq!(h.store.user_count().await, 1);

    let a = json_body(h.exchange(&first).await).await;
    let b = json_body(h.exchange(&second).await).await;
    assert_eq!(a["username"], "Ada");
    assert_eq!(a["created_at"], b["created_at"]);
}

#[tokio::test]
async fn one_time_token_is_single_use() {
    let h = harness();
    let token = h.one_time_token("good").await;
    assert_eq!(h.exchange(&token).await.status(), StatusCode::OK);

    let replay = h.exchange(&token).await;
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookie(&replay, "access_token").is_none());
}

#[tokio::test]
async fn stale_one_time_token_sets_no_cookie() {
    let h = harness();
    let token = h.one_time_token("good").await;
    h.clock.advance(Duration::minutes(2));

    let response = h.exchange(&token).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    let body = json_body(response).await;
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn session_status_follows_the_cookie() {
    let h = harness();
    let anonymous = send(&h.producer, get("/user-session-status/").body(Body::empty()).unwrap()).await;
    assert_eq!(json_body(anonymous).await, json!({ "userLoggedIn": false }));

    let cookie = h.sign_in().await;
    let status = h.with_cookie("GET", "/user-session-status/", &cookie, Body::empty()).await;
    let body = json_body(status).await;
    assert_eq!(body["userLoggedIn"], true);
    assert_eq!(body["username"], "Ada");

    h.clock.advance(Duration::minutes(16));
    let expired = h.with_cookie("GET", "/user-session-status/", &cookie, Body::empty()).await;
    assert_eq!(json_body(expired).await["userLoggedIn"], false);
}

#[tokio::test]
async fn deleted_user_with_valid_cookie_is_unauthorized() {
    let h = harness();
    let cookie = h.sign_in().await;
    assert_eq!(
        h.with_cookie("GET", "/get-account/", &cookie, Body::empty()).await.status(),
        StatusCode::OK
    );

    let users = h.state.stores.users.list_users(Default::default()).await.unwrap();
    h.store.delete_user(&users[0].internal_id).await.unwrap();

    let response = h.with_cookie("GET", "/get-account/", &cookie, Body::empty()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn protected_routes_need_a_cookie() {
    let h = harness();
    let response = send(&h.producer, get("/get-account/").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

fn reference_json() -> Value {
    json!({
        "title": "The fall of Constantinople",
        "category": "history",
        "description": "An account of the final siege of the Byzantine capital in 1453.",
        "books": [{
            "name": "Byzantium: The Decline",
            "author": "John Julius Norwich",
            "book_sections": [{ "starting_page": 400, "ending_page": 412 }]
        }]
    })
}

#[tokio::test]
async fn only_authors_insert_references() {
    let h = harness();
    let cookie = h.sign_in().await;
    let body = || Body::from(reference_json().to_string());

    let denied = h.with_cookie("PUT", "/insert-reference/", &cookie, body()).await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let users = h.store.list_users(Default::default()).await.unwrap();
    let promote = UserFlagsUpdate {
        is_author: Some(true),
        requested_join: None,
    };
    h.store.update_user_flags(&users[0].internal_id, promote).await.unwrap();

    let inserted = h.with_cookie("PUT", "/insert-reference/", &cookie, body()).await;
    assert_eq!(inserted.status(), StatusCode::OK);
    let inserted = json_body(inserted).await;
    assert_eq!(inserted["rating"], json!({ "positive": 0, "negative": 0 }));
    let reference_id = inserted["reference_id"].as_str().unwrap().to_string();

    let listed = json_body(h.with_cookie("GET", "/get-references/", &cookie, Body::empty()).await).await;
    assert_eq!(listed["references"].as_array().unwrap().len(), 1);

    let deleted = h
        .with_cookie(
            "DELETE",
            "/delete-reference/",
            &cookie,
            Body::from(json!({ "reference_id": reference_id }).to_string()),
        )
        .await;
    assert_eq!(json_body(deleted).await, json!({ "deleted": true }));
}

#[tokio::test]
async fn invalid_reference_is_a_validation_error() {
    let h = harness();
    let cookie = h.sign_in().await;
    let users = h.store.list_users(Default::default()).await.unwrap();
    let promote = UserFlagsUpdate {
        is_author: Some(true),
        requested_join: None,
    };
    h.store.update_user_flags(&users[0].internal_id, promote).await.unwrap();

    let mut reference = reference_json();
    reference["title"] = json!("War");
    let response = h
        .with_cookie("POST", "/insert-reference/", &cookie, Body::from(reference.to_string()))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn join_and_delete_account() {
    let h = harness();
    let cookie = h.sign_in().await;

    let joined = h.with_cookie("PUT", "/join/", &cookie, Body::empty()).await;
    assert_eq!(json_body(joined).await, json!({ "requested": true }));
    let account = json_body(h.with_cookie("GET", "/get-account/", &cookie, Body::empty()).await).await;
    assert_eq!(account["requested_join"], true);

    let deleted = h.with_cookie("DELETE", "/delete-account/", &cookie, Body::empty()).await;
    let cleared = set_cookie(&deleted, "access_token").expect("cleared cookie");
    assert_eq!(cleared, "access_token=");
    assert_eq!(json_body(deleted).await, json!({ "deleted": true }));
    assert_eq!(h.store.user_count().await, 0);
}

#[tokio::test]
async fn categories_are_public() {
    let h = harness();
    let response = send(&h.producer, get("/get-categories/").body(Body::empty()).unwrap()).await;
    let body = json_body(response).await;
    let categories = body["categories"].as_array().unwrap();
    assert_eq!(categories.len(), 13);
    assert!(categories.contains(&json!("computer_science")));
}

#[tokio::test]
async fn admin_login_sets_cookie_and_redirects_home() {
    let h = harness();
    h.state.operators.seed_operator("admin", "s3cret!").await.unwrap();

    let login = |password: &str| {
        Request::builder()
            .method("POST")
            .uri("/login")
            .body(Body::from(json!({ "username": "admin", "password": password }).to_string()))
            .unwrap()
    };

    let rejected = send(&h.admin, login("wrong-password")).await;
    assert_eq!(rejected.status(), StatusCode::UNAUTHORIZED);

    let response = send(&h.admin, login("s3cret!")).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[header::LOCATION], "http://admin.test/Home");
    let cookie = set_cookie(&response, "access_token").expect("access cookie");

    let users = Request::builder()
        .method("POST")
        .uri("/users")
        .header(header::COOKIE, &cookie)
        .body(Body::from(r#"{"requested_join":null,"is_author":1}"#))
        .unwrap();
    let users = send(&h.admin, users).await;
    assert_eq!(users.status(), StatusCode::OK);
    assert_eq!(json_body(users).await, json!({ "users": [] }));

    let anonymous = Request::builder()
        .method("POST")
        .uri("/users")
        .body(Body::from("{}"))
        .unwrap();
    assert_eq!(send(&h.admin, anonymous).await.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_search_body_is_bad_request() {
    let state = SearchState::new(config(), reqwest::Client::new());
    let router = consumer_router(state);
    let request = Request::builder()
        .method("POST")
        .uri("/search/")
        .body(Body::from("{\"query\": "))
        .unwrap();
    let response = send(&router, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "validation_error");
}
