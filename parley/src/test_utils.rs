//! Shared fixtures for unit and handler tests.

use axum::{Router, http::HeaderName, http::header};
use axum_test::TestServer;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    AppState, Application,
    api::models::users::{Role, UserStatus},
    auth::{password, session, tokens},
    config::Config,
    db::{
        handlers::{ChatRooms, Groups, Repository, Users},
        models::{
            chat::{ChatRoomCreateDBRequest, ChatRoomDBResponse},
            users::{UserCreateDBRequest, UserDBResponse},
        },
    },
};

/// Password of every user made by [`create_test_user`]
pub const TEST_PASSWORD: &str = "test-password-123";

pub fn create_test_config() -> Config {
    let mut config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        secret_key: Some("test-secret-key-for-testing-only".to_string()),
        ..Default::default()
    };
    config.database.pool.max_connections = 2;
    config.database.pool.min_connections = 1;
    config
}

/// Test server over a real HTTP transport, needed for WebSocket upgrades
pub fn test_server(router: Router) -> TestServer {
    TestServer::builder()
        .http_transport()
        .build(router)
        .expect("Failed to create test server")
}

/// State over `pool` without seeding anything
pub fn create_test_state(pool: PgPool) -> AppState {
    AppState::from_config(pool, create_test_config()).expect("Failed to build test state")
}

/// Full application over `pool`, seeded like a real startup
pub async fn create_test_app(pool: PgPool) -> TestServer {
    Application::new_with_pool(create_test_config(), Some(pool))
        .await
        .expect("Failed to create application")
        .into_test_server()
}

/// Application around an existing state, for tests that inspect the hub
pub fn create_test_app_with_state(state: AppState) -> TestServer {
    let router = crate::build_router(state).expect("Failed to build router");
    test_server(router)
}

pub async fn create_test_user(pool: &PgPool, role: Role) -> UserDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let username = format!("testuser_{}", Uuid::new_v4().simple());

    Users::new(&mut conn)
        .create(&UserCreateDBRequest {
            username,
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            email: None,
            address: None,
            age: None,
            password_hash: Some(password::hash_string(TEST_PASSWORD).expect("Failed to hash password")),
            role,
            status: UserStatus::Active,
        })
        .await
        .expect("Failed to create test user")
}

/// Admin user enrolled in every seeded CRUD group
pub async fn create_test_admin_user(pool: &PgPool) -> UserDBResponse {
    let user = create_test_user(pool, Role::Admin).await;
    let groups = crate::seed_authorization(pool).await.expect("Failed to seed authorization");

    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    for group in groups {
        Groups::new(&mut conn)
            .add_user(group.id, user.id)
            .await
            .expect("Failed to add admin to group");
    }
    user
}

/// Enrol `user` in the seeded group called `name`
pub async fn add_to_group(pool: &PgPool, user: &UserDBResponse, name: &str) {
    crate::seed_authorization(pool).await.expect("Failed to seed authorization");

    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let mut groups = Groups::new(&mut conn);
    let group = groups
        .get_by_name(name)
        .await
        .expect("Failed to look up group")
        .unwrap_or_else(|| panic!("No group named {name}"));
    groups.add_user(group.id, user.id).await.expect("Failed to add user to group");
}

/// `Authorization: Bearer ...` for `user`, issuing a token when none is stored
pub async fn bearer_header(pool: &PgPool, config: &Config, user: &UserDBResponse) -> (HeaderName, String) {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let token = tokens::get_or_create(&mut conn, config, user)
        .await
        .expect("Failed to issue bearer token");
    (header::AUTHORIZATION, format!("Bearer {}", token.access_token))
}

/// `Cookie` header value carrying a session for `user`
pub fn session_cookie(config: &Config, user: &UserDBResponse) -> String {
    let token = session::create_session_token(user.id, &user.username, config).expect("Failed to sign session");
    format!("{}={}", config.auth.session.cookie_name, token)
}

pub async fn create_test_room(pool: &PgPool, owner: &UserDBResponse, name: &str) -> ChatRoomDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    ChatRooms::new(&mut conn)
        .create(&ChatRoomCreateDBRequest {
            name: name.to_string(),
            owner_id: owner.id,
        })
        .await
        .expect("Failed to create test room")
}
