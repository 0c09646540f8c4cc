//! # findsources_api
//!
//! HTTP API library for Find Sources: routers for the producer API, the
//! admin console and the consumer search proxy.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use findsources_core::auth::jwt::TokenCodec;
use findsources_core::auth::one_time::OneTimeTokenCache;
use findsources_core::auth::operator::OperatorSessions;
use findsources_core::auth::session::{SessionIssuer, SessionSettings};
use findsources_core::clock::Clock;
use findsources_core::identity::IdentityProvider;
use findsources_core::search::SearchClient;
use findsources_core::store::Stores;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use crate::config::ApiConfig;
use crate::handlers::{admin, consumer, producer};
use crate::middleware::request_id::with_observability;

/// Origin of the frontend dev server, allowed by CORS on local deployments.
pub const LOCAL_FRONTEND_ORIGIN: &str = "http://localhost:3000";

/// Route paths.
pub mod routes {
    // Producer
    pub const LOGIN_REDIRECT: &str = "/login-redirect";
    pub const LOGIN_CALLBACK: &str = "/login-callback";
    pub const LOGIN: &str = "/login/";
    pub const LOGOUT: &str = "/logout/";
    pub const USER_SESSION_STATUS: &str = "/user-session-status/";
    pub const GET_CATEGORIES: &str = "/get-categories/";
    pub const INSERT_REFERENCE: &str = "/insert-reference/";
    pub const GET_REFERENCES: &str = "/get-references/";
    pub const DELETE_REFERENCE: &str = "/delete-reference/";
    pub const JOIN: &str = "/join/";
    pub const GET_ACCOUNT: &str = "/get-account/";
    pub const DELETE_ACCOUNT: &str = "/delete-account/";

    // Admin
    pub const ADMIN_LOGIN: &str = "/login";
    pub const ADMIN_LOGOUT: &str = "/logout";
    pub const ADMIN_USERS: &str = "/users";
    pub const ADMIN_USER: &str = "/user";
    pub const ADMIN_REFERENCES: &str = "/references";
    pub const ADMIN_REFERENCE: &str = "/reference";

    // Consumer
    pub const SEARCH: &str = "/search/";
}

/// Shared state of the producer and admin services.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub stores: Stores,
    pub sessions: Arc<SessionIssuer>,
    pub operators: Arc<OperatorSessions>,
}

impl AppState {
    /// Wire the session issuers from configuration and injected
    /// collaborators.
    pub fn new(
        config: ApiConfig,
        stores: Stores,
        provider: Arc<dyn IdentityProvider>,
        one_time: Arc<OneTimeTokenCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let codec = TokenCodec::new(config.jwt_secret.as_bytes(), config.algorithm).with_clock(clock);
        let access_token_ttl = config.access_token_ttl();
        let sessions = SessionIssuer::new(
            stores.users.clone(),
            provider,
            one_time,
            codec.clone(),
            SessionSettings {
                access_token_ttl,
                one_time_token_ttl: config.one_time_token_ttl(),
                external_id_key: config.external_id_key.clone(),
            },
        );
        let operators = OperatorSessions::new(stores.users.clone(), codec, access_token_ttl);
        Self {
            config: Arc::new(config),
            stores,
            sessions: Arc::new(sessions),
            operators: Arc::new(operators),
        }
    }

    /// Cookies carry `Secure` everywhere except local deployments.
    pub fn secure_cookies(&self) -> bool {
        !self.config.local_deployment
    }
}

/// State of the consumer (search proxy) service.
#[derive(Clone)]
pub struct SearchState {
    pub config: Arc<ApiConfig>,
    pub search: SearchClient,
}

impl SearchState {
    pub fn new(config: ApiConfig, http: reqwest::Client) -> Self {
        let search = SearchClient::new(http, &config.elasticsearch_host, &config.elasticsearch_index);
        Self {
            config: Arc::new(config),
            search,
        }
    }
}

fn with_cors(router: Router, config: &ApiConfig) -> Router {
    if !config.local_deployment {
        return router;
    }
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::exact(HeaderValue::from_static(LOCAL_FRONTEND_ORIGIN)))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request());
    router.layer(cors)
}

/// Builds the producer router: login flow, account and reference routes.
pub fn producer_router(state: AppState) -> Router {
    // Public routes (no auth required)
    let public = Router::new()
        .route(routes::LOGIN_REDIRECT, get(producer::login_redirect))
        .route(routes::LOGIN_CALLBACK, get(producer::login_callback))
        .route(routes::LOGIN, get(producer::login).post(producer::login))
        .route(routes::LOGOUT, get(producer::logout).post(producer::logout))
        .route(routes::USER_SESSION_STATUS, get(producer::user_session_status))
        .route(routes::GET_CATEGORIES, get(producer::get_categories));

    // Protected routes (require a signed-in user)
    let protected = Router::new()
        .route(
            routes::INSERT_REFERENCE,
            post(producer::insert_reference).put(producer::insert_reference),
        )
        .route(
            routes::GET_REFERENCES,
            get(producer::get_references).post(producer::get_references),
        )
        .route(
            routes::DELETE_REFERENCE,
            post(producer::delete_reference).delete(producer::delete_reference),
        )
        .route(routes::JOIN, post(producer::join).put(producer::join))
        .route(routes::GET_ACCOUNT, get(producer::get_account))
        .route(
            routes::DELETE_ACCOUNT,
            post(producer::delete_account).delete(producer::delete_account),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_user,
        ));

    let config = state.config.clone();
    let router = Router::new().merge(public).merge(protected).with_state(state);
    with_observability(with_cors(router, &config))
}

/// Builds the admin console router.
pub fn admin_router(state: AppState) -> Router {
    let public = Router::new()
        .route(routes::ADMIN_LOGIN, post(admin::login))
        .route(routes::USER_SESSION_STATUS, get(admin::user_session_status));

    let protected = Router::new()
        .route(routes::ADMIN_LOGOUT, get(admin::logout))
        .route(routes::ADMIN_USERS, post(admin::list_users))
        .route(routes::ADMIN_USER, post(admin::update_user))
        .route(routes::ADMIN_REFERENCES, post(admin::list_references))
        .route(routes::ADMIN_REFERENCE, post(admin::update_reference_link))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_operator,
        ));

    let config = state.config.clone();
    let router = Router::new().merge(public).merge(protected).with_state(state);
    with_observability(with_cors(router, &config))
}

/// Builds the consumer (search proxy) router.
pub fn consumer_router(state: SearchState) -> Router {
    let config = state.config.clone();
    let router = Router::new()
        .route(routes::SEARCH, post(consumer::search))
        .with_state(state);
    with_observability(with_cors(router, &config))
}
