//! Permission resolution and role guards.
//!
//! A user is authorized for an action when they hold the required permissions directly, or
//! when they belong to one of the listed groups and that group holds them. Role guards are
//! simpler extractors that only look at the user's role and status.

use std::marker::PhantomData;

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
};
use sqlx::PgConnection;
use tracing::{debug, instrument};

use crate::{
    AppState,
    api::models::users::CurrentUser,
    auth::current_user::try_session_auth,
    db::{
        errors::DbError,
        handlers::{Groups, Users},
        models::groups::GroupDBResponse,
    },
    errors::{Error, Result},
};

pub const INSUFFICIENT_RIGHTS: &str = "You do not have sufficient rights to this resource.";
pub const ROLE_NOT_ALLOWED: &str = "Your role does not allow you to do this action";

/// Whether `held` satisfies `required`. Nothing required is never satisfied.
pub fn has_permissions<H: AsRef<str>, R: AsRef<str>>(held: &[H], required: &[R], any_match: bool) -> bool {
    if required.is_empty() {
        return false;
    }
    let holds = |name: &R| held.iter().any(|h| h.as_ref() == name.as_ref());
    if any_match {
        required.iter().any(holds)
    } else {
        required.iter().all(holds)
    }
}

/// Check membership of `required` groups, returning the user's groups among them.
pub fn belongs_to_groups<R: AsRef<str>>(
    user_groups: &[GroupDBResponse],
    required: &[R],
    any_match: bool,
) -> (bool, Vec<GroupDBResponse>) {
    let matched: Vec<GroupDBResponse> = user_groups
        .iter()
        .filter(|g| required.iter().any(|r| r.as_ref() == g.name))
        .cloned()
        .collect();
    let names: Vec<&str> = matched.iter().map(|g| g.name.as_str()).collect();

    (has_permissions(&names, required, any_match), matched)
}

/// Authorize `user` against `permissions`, falling back to `groups` when given.
#[instrument(skip(conn, user), fields(user_id = user.id), err)]
pub async fn permission_required(
    conn: &mut PgConnection,
    user: &CurrentUser,
    permissions: &[&str],
    groups: Option<&[&str]>,
    any_match: bool,
) -> Result<()> {
    let held: Vec<String> = Users::new(conn)
        .get_permissions(user.id)
        .await?
        .into_iter()
        .map(|p| p.name)
        .collect();
    if has_permissions(&held, permissions, any_match) {
        return Ok(());
    }

    let Some(groups) = groups else {
        return Err(Error::forbidden(INSUFFICIENT_RIGHTS));
    };

    let names: Vec<String> = groups.iter().map(|g| g.to_string()).collect();
    let known = Groups::new(conn).get_by_names(&names).await?;
    let user_groups = Users::new(conn).get_groups(user.id).await?;
    let user_groups: Vec<GroupDBResponse> = user_groups
        .into_iter()
        .filter(|g| known.iter().any(|k| k.id == g.id))
        .collect();

    let (member, matched) = belongs_to_groups(&user_groups, &names, any_match);
    if !member {
        debug!("User {} is not in the required groups", user.id);
        return Err(Error::forbidden(INSUFFICIENT_RIGHTS));
    }
    if permissions.is_empty() {
        return Ok(());
    }

    for group in &matched {
        let group_perms: Vec<String> = Groups::new(conn)
            .get_permissions(group.id)
            .await?
            .into_iter()
            .map(|p| p.name)
            .collect();
        if has_permissions(&group_perms, permissions, any_match) {
            return Ok(());
        }
    }
    Err(Error::forbidden(INSUFFICIENT_RIGHTS))
}

/// The permissions and groups an endpoint requires.
pub trait PermissionPolicy: Send + Sync {
    const PERMISSIONS: &'static [&'static str];
    const GROUPS: Option<&'static [&'static str]> = None;
    const ANY_MATCH: bool = false;
}

pub mod policy {
    use super::PermissionPolicy;

    pub struct UpdateUsers;
    pub struct DeleteUsers;

    impl PermissionPolicy for UpdateUsers {
        const PERMISSIONS: &'static [&'static str] = &["update_users"];
        const GROUPS: Option<&'static [&'static str]> = Some(&["update_users"]);
    }

    impl PermissionPolicy for DeleteUsers {
        const PERMISSIONS: &'static [&'static str] = &["delete_users"];
        const GROUPS: Option<&'static [&'static str]> = Some(&["delete_users"]);
    }
}

/// Extractor that authenticates the user and enforces `P`.
pub struct RequiresPermission<P: PermissionPolicy>(pub CurrentUser, PhantomData<P>);

impl<P: PermissionPolicy> RequiresPermission<P> {
    pub fn into_user(self) -> CurrentUser {
        self.0
    }
}

impl<P: PermissionPolicy> FromRequestParts<AppState> for RequiresPermission<P> {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        let mut conn = state.db.acquire().await.map_err(DbError::from)?;
        permission_required(&mut conn, &user, P::PERMISSIONS, P::GROUPS, P::ANY_MATCH).await?;
        Ok(RequiresPermission(user, PhantomData))
    }
}

macro_rules! role_guard {
    ($(#[$doc:meta])* $name:ident, $allowed:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name(pub CurrentUser);

        impl FromRequestParts<AppState> for $name {
            type Rejection = Error;

            async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
                let user = CurrentUser::from_request_parts(parts, state).await?;
                let allowed: fn(&CurrentUser) -> bool = $allowed;
                if allowed(&user) {
                    Ok($name(user))
                } else {
                    Err(Error::forbidden(ROLE_NOT_ALLOWED))
                }
            }
        }
    };
}

role_guard!(
    /// Admins only
    AdminAccess,
    |user| user.is_admin()
);
role_guard!(
    /// Admins and staff
    StaffAccess,
    |user| user.is_staff()
);
role_guard!(
    /// Any role with an active account
    ActiveAccess,
    |user| user.is_active()
);

/// Only anonymous visitors. A logged-in session is redirected to the post-login page.
#[derive(Debug, Clone, Copy)]
pub struct AnonymousAccess;

impl FromRequestParts<AppState> for AnonymousAccess {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        match try_session_auth(parts, state).await {
            Some(Ok(_)) => Err(Error::Redirect {
                location: state.config.auth.session.redirect_success.clone(),
                status: StatusCode::TEMPORARY_REDIRECT,
            }),
            Some(Err(e)) => Err(e),
            None => Ok(AnonymousAccess),
        }
    }
}
