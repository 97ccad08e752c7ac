//! OpenAPI documentation, served as JSON at `/api-docs/openapi.json` and rendered at `/docs`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::api;

/// Bearer tokens for API clients, the session cookie for the web chat.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "BearerAuth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "Token from `POST /auth/token`:\n\n```\nAuthorization: Bearer YOUR_TOKEN\n```",
                        ))
                        .build(),
                ),
            );
            components.security_schemes.insert(
                "CookieAuth".to_string(),
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                    "session",
                    "Session cookie set by `POST /auth/session`",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(title = "Parley", description = "User accounts, authorization and chat rooms"),
    modifiers(&SecurityAddon),
    paths(
        api::handlers::default::secret_key,
        api::handlers::default::healthcheck,
        api::handlers::auth::login_for_access_token,
        api::handlers::auth::refresh_access_token,
        api::handlers::auth::session_login_form,
        api::handlers::auth::session_login,
        api::handlers::auth::register_form,
        api::handlers::auth::register,
        api::handlers::auth::logout,
        api::handlers::users::list_users,
        api::handlers::users::create_user,
        api::handlers::users::get_user,
        api::handlers::users::replace_user,
        api::handlers::users::update_user,
        api::handlers::users::delete_user,
        api::handlers::users::get_own_permissions,
        api::handlers::users::get_own_groups,
        api::handlers::users::get_user_permissions,
        api::handlers::users::get_user_groups,
        api::handlers::users::add_user_permissions,
        api::handlers::permissions::list_permissions,
        api::handlers::permissions::create_permission,
        api::handlers::permissions::replace_permission,
        api::handlers::permissions::update_permission,
        api::handlers::permissions::delete_permission,
        api::handlers::groups::list_groups,
        api::handlers::groups::create_group,
        api::handlers::groups::replace_group,
        api::handlers::groups::update_group,
        api::handlers::groups::delete_group,
        api::handlers::groups::add_group_users,
        api::handlers::groups::remove_group_users,
        api::handlers::groups::add_group_permissions,
        api::handlers::groups::remove_group_permissions,
        api::handlers::chat::list_rooms,
        api::handlers::chat::create_room,
        api::handlers::chat::delete_room,
        api::handlers::chat::add_members,
        api::handlers::chat::remove_members,
        api::handlers::chat::list_messages,
        api::handlers::chat::post_message,
        api::handlers::chat::get_message,
        api::handlers::chat::delete_message,
        api::handlers::web_chat::chat_page,
        api::handlers::web_chat::filter_rooms,
    ),
    components(schemas(
        api::handlers::default::SecretResponse,
        api::handlers::default::HealthResponse,
        api::models::auth::TokenRequest,
        api::models::auth::TokenResponse,
        api::models::auth::CsrfResponse,
        api::models::users::UserCreate,
        api::models::users::UserReplace,
        api::models::users::UserUpdate,
        api::models::users::UserResponse,
        api::models::users::UserList,
        api::models::users::Role,
        api::models::users::UserStatus,
        api::models::permissions::PermissionCreate,
        api::models::permissions::PermissionUpdate,
        api::models::permissions::PermissionResponse,
        api::models::permissions::PermissionList,
        api::models::groups::GroupResponse,
        api::models::chat::ChatRoomCreate,
        api::models::chat::ChatRoomResponse,
        api::models::chat::ChatMessageCreate,
        api::models::chat::ChatMessageResponse,
        api::models::chat::ChatPageResponse,
    )),
    tags(
        (name = "default", description = "Service helpers"),
        (name = "auth", description = "Bearer tokens and browser sessions"),
        (name = "users", description = "User accounts"),
        (name = "authorizations", description = "Permission and group registries. Admins only."),
        (name = "chat", description = "Chat rooms, members and messages"),
        (name = "web", description = "Session-only chat pages. The chat socket lives at `/web/chat/ws`."),
    )
)]
pub struct ApiDoc;
