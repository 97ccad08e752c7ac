//! # parley: accounts, authorization and chat rooms
//!
//! `parley` is an HTTP service for user accounts with role/permission/group authorization and
//! real-time chat rooms. API clients authenticate with bearer tokens; browsers use a session
//! cookie and reach the chat over a WebSocket.
//!
//! ## Architecture
//!
//! The service is built on [Axum](https://github.com/tokio-rs/axum) and stores everything in
//! PostgreSQL through the repositories in [`db`].
//!
//! - The **API layer** ([`api`]) holds the REST handlers and their models.
//! - The **auth layer** ([`auth`]) resolves the caller from a bearer token or a session cookie and
//!   provides the guards handlers declare as extractors: role guards, permission requirements
//!   and anonymous-only pages.
//! - The **chat layer** ([`chat`]) relays room messages to sockets through an in-process
//!   broadcast hub. Messages posted over REST reach the same sockets.
//!
//! At startup the database is migrated and seeded with create/read/update/delete permissions
//! and groups for every table, plus the configured admin account, which joins every seeded group.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use parley::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = parley::config::Args::parse();
//!     let config = Config::load(&args)?;
//!     parley::telemetry::init_telemetry()?;
//!
//!     Application::new(config)
//!         .await?
//!         .serve(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await
//! }
//! ```

pub mod api;
pub mod auth;
pub mod chat;
pub mod config;
pub mod db;
pub mod errors;
mod openapi;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub mod test_utils;

use crate::{
    api::models::users::{Role, UserStatus},
    auth::{middleware::session_required_middleware, password},
    chat::ChatHub,
    config::{AdminConfig, CorsOrigin},
    db::{
        handlers::{Groups, Permissions, Repository, Users},
        models::{
            groups::GroupDBResponse,
            permissions::format_permission_name,
            users::UserCreateDBRequest,
        },
    },
    openapi::ApiDoc,
    types::{CrudMethod, tables},
};
use axum::{
    Json, Router,
    http::{self, HeaderName, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{delete, get, patch, post},
};
use bon::Builder;
use regex::RegexSet;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use config::Config;
pub use types::UserId;

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .db(pool)
///     .config(config)
///     .exempt_paths(Arc::new(exempt_paths))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    #[builder(default)]
    pub hub: ChatHub,
    /// Compiled `auth.exempt_paths`
    pub exempt_paths: Arc<RegexSet>,
}

impl AppState {
    /// State with the hub sized and the exempt paths compiled from `config`
    pub fn from_config(db: PgPool, config: Config) -> anyhow::Result<Self> {
        let exempt_paths = Arc::new(config.auth.exempt_path_set()?);
        let hub = ChatHub::with_capacity(config.chat.channel_capacity);
        Ok(Self::builder()
            .db(db)
            .config(config)
            .hub(hub)
            .exempt_paths(exempt_paths)
            .build())
    }
}

/// Get the parley database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Create the CRUD permissions and groups for every seeded table, and attach each group to the
/// permission of the same name.
///
/// Idempotent. Returns every seeded CRUD group, whether created now or earlier.
#[instrument(skip_all)]
pub async fn seed_authorization(db: &PgPool) -> anyhow::Result<Vec<GroupDBResponse>> {
    let mut tx = db.begin().await?;
    let mut seeded = Vec::new();

    for table in tables::SEEDED {
        Permissions::new(&mut tx).generate_crud_objects(table).await?;
        Groups::new(&mut tx).generate_crud_objects(table).await?;

        let names: Vec<String> = CrudMethod::ALL
            .iter()
            .map(|method| format_permission_name(*method, table))
            .collect();
        let permissions = Permissions::new(&mut tx).get_by_names(&names).await?;
        let groups = Groups::new(&mut tx).get_by_names(&names).await?;

        for group in groups {
            let ids: Vec<_> = permissions.iter().filter(|p| p.name == group.name).map(|p| p.id).collect();
            Groups::new(&mut tx).extend_permissions(group.id, &ids).await?;
            seeded.push(group);
        }
    }

    tx.commit().await?;
    debug!("Seeded {} CRUD groups", seeded.len());
    Ok(seeded)
}

/// Create the initial admin user if it doesn't exist.
///
/// Idempotent: an existing account keeps its role and profile, and only has its password
/// replaced when one is configured.
#[instrument(skip_all, fields(username = %admin.username))]
pub async fn create_initial_admin_user(admin: &AdminConfig, db: &PgPool) -> anyhow::Result<UserId> {
    let password_hash = match &admin.password {
        Some(password) => Some(password::hash_password(password.clone()).await?),
        None => None,
    };

    let mut tx = db.begin().await?;
    let mut users = Users::new(&mut tx);

    if let Some(existing) = users.get_by_username(&admin.username).await? {
        if let Some(hash) = &password_hash {
            users.set_password(existing.id, hash).await?;
        }
        tx.commit().await?;
        return Ok(existing.id);
    }

    let created = users
        .create(&UserCreateDBRequest {
            username: admin.username.clone(),
            first_name: "Admin".to_string(),
            last_name: "User".to_string(),
            email: admin.email.clone(),
            address: None,
            age: None,
            password_hash,
            role: Role::Admin,
            status: UserStatus::Active,
        })
        .await?;
    tx.commit().await?;

    info!("Created initial admin user {}", created.username);
    Ok(created.id)
}

/// Seed authorization data and the admin account, then enrol the admin in every CRUD group.
#[instrument(skip_all)]
pub async fn seed_database(config: &Config, db: &PgPool) -> anyhow::Result<()> {
    let groups = seed_authorization(db).await?;
    let admin_id = create_initial_admin_user(&config.auth.admin, db).await?;

    let mut conn = db.acquire().await?;
    let ids: Vec<_> = groups.iter().map(|g| g.id).collect();
    for id in ids {
        Groups::new(&mut conn).add_user(id, admin_id).await?;
    }

    Ok(())
}

/// Connect to the configured database and run migrations
async fn setup_database(config: &Config) -> anyhow::Result<PgPool> {
    let settings = &config.database.pool;
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(settings.acquire_timeout)
        .connect(&config.database_url())
        .await?;

    migrator().run(&pool).await?;
    Ok(pool)
}

/// `"*"` in a CORS list means any value. With credentials allowed the request's own value is
/// mirrored instead, since browsers reject a literal wildcard there.
fn is_wildcard(values: &[String]) -> bool {
    values.iter().any(|v| v == "*")
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors = &config.cors;
    let credentials = cors.allow_credentials;

    let origin = if cors.allowed_origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard)) {
        if credentials { AllowOrigin::mirror_request() } else { AllowOrigin::any() }
    } else {
        let mut origins = Vec::new();
        for origin in &cors.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                origins.push(url.origin().ascii_serialization().parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let headers = if is_wildcard(&cors.allowed_headers) {
        if credentials { AllowHeaders::mirror_request() } else { AllowHeaders::any() }
    } else {
        let names = cors
            .allowed_headers
            .iter()
            .map(|h| h.parse::<HeaderName>())
            .collect::<Result<Vec<_>, _>>()?;
        AllowHeaders::list(names)
    };

    let methods = if is_wildcard(&cors.allowed_methods) {
        if credentials { AllowMethods::mirror_request() } else { AllowMethods::any() }
    } else {
        let methods = cors
            .allowed_methods
            .iter()
            .map(|m| Method::from_bytes(m.to_uppercase().as_bytes()))
            .collect::<Result<Vec<_>, _>>()?;
        AllowMethods::list(methods)
    };

    let mut layer = CorsLayer::new()
        .allow_origin(origin)
        .allow_headers(headers)
        .allow_methods(methods)
        .allow_credentials(credentials)
        .expose_headers(vec![http::header::LOCATION]);

    if let Some(max_age) = cors.max_age {
        layer = layer.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(layer)
}

/// Build the application router.
///
/// Layers, outermost first: request tracing, CORS, then the session requirement for web pages.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    use api::handlers::{auth, chat, default, groups, permissions, users, web_chat};

    let auth_routes = Router::new()
        .route("/token", post(auth::login_for_access_token))
        .route("/token/refresh", post(auth::refresh_access_token))
        .route("/session", get(auth::session_login_form).post(auth::session_login))
        .route("/session/register", get(auth::register_form).post(auth::register))
        .route("/logout", post(auth::logout));

    let user_routes = Router::new()
        .route("/", get(users::list_users).post(users::create_user))
        .route("/permissions", get(users::get_own_permissions))
        .route("/groups", get(users::get_own_groups))
        .route(
            "/{id}",
            get(users::get_user)
                .put(users::replace_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
        .route("/{id}/permissions", get(users::get_user_permissions))
        .route("/{id}/groups", get(users::get_user_groups))
        .route("/{id}/permissions/add", post(users::add_user_permissions));

    let authorization_routes = Router::new()
        .route(
            "/permissions",
            get(permissions::list_permissions).post(permissions::create_permission),
        )
        .route(
            "/permissions/{id}",
            delete(permissions::delete_permission)
                .put(permissions::replace_permission)
                .patch(permissions::update_permission),
        )
        .route("/groups", get(groups::list_groups).post(groups::create_group))
        .route(
            "/groups/{id}",
            delete(groups::delete_group)
                .put(groups::replace_group)
                .patch(groups::update_group),
        )
        .route("/groups/{id}/users/add", patch(groups::add_group_users))
        .route("/groups/{id}/users/remove", patch(groups::remove_group_users))
        .route("/groups/{id}/permissions/add", patch(groups::add_group_permissions))
        .route("/groups/{id}/permissions/remove", patch(groups::remove_group_permissions));

    let chat_routes = Router::new()
        .route("/rooms", get(chat::list_rooms).post(chat::create_room))
        .route("/rooms/{room_id}", delete(chat::delete_room))
        .route("/rooms/{room_id}/members/add", patch(chat::add_members))
        .route("/rooms/{room_id}/members/remove", patch(chat::remove_members))
        .route(
            "/rooms/{room_id}/messages",
            get(chat::list_messages).post(chat::post_message),
        )
        .route(
            "/rooms/{room_id}/messages/{message_id}",
            get(chat::get_message).delete(chat::delete_message),
        );

    let web_routes = Router::new()
        .route("/chat", get(web_chat::chat_page))
        .route("/chat/", get(web_chat::chat_page))
        .route("/chat/filter/rooms", get(web_chat::filter_rooms))
        .route("/chat/ws", get(web_chat::chat_socket));

    let router = Router::new()
        .route("/", get(default::secret_key))
        .route("/healthcheck", get(default::healthcheck))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .nest("/auth", auth_routes)
        .nest("/users", user_routes)
        .nest("/authorizations", authorization_routes)
        .nest("/chat", chat_routes)
        .nest(&state.config.auth.web_prefix, web_routes)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .layer(from_fn_with_state(state.clone(), session_required_middleware))
        .with_state(state.clone());

    let router = router.layer(create_cors_layer(&state.config)?).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Main application struct that owns the router and its state.
///
/// 1. [`Application::new`] connects, migrates and seeds the database, then builds the router.
/// 2. [`Application::serve`] binds the configured address and serves until shutdown.
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        Self::new_with_pool(config, None).await
    }

    /// Create the application on an existing pool (already migrated), or connect when `None`
    pub async fn new_with_pool(config: Config, pool: Option<PgPool>) -> anyhow::Result<Self> {
        debug!("Starting parley with configuration: {:#?}", config);

        let pool = match pool {
            Some(pool) => pool,
            None => setup_database(&config).await?,
        };
        seed_database(&config, &pool).await?;

        let app_state = AppState::from_config(pool, config.clone())?;
        let router = build_router(app_state)?;

        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        test_utils::test_server(self.router)
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Parley listening on http://{}, health check at {}",
            bind_addr,
            self.config.health_check_endpoint()
        );

        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;
        info!("Server stopped");
        Ok(())
    }
}
