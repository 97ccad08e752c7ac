//! Authentication request/response models.

use axum::{
    Json,
    http::{StatusCode, header},
    response::{AppendHeaders, IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

/// Form body of `POST /auth/token`
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    #[schema(example = "bearer")]
    pub token_type: String,
}

/// Returned by the session form pages in place of a rendered form
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CsrfResponse {
    pub csrf_token: String,
}

/// Form body of `POST /auth/session`. The CSRF field name is configurable, so any extra
/// fields are kept for lookup.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SessionLoginForm {
    pub username: String,
    pub password: String,
    #[serde(flatten)]
    #[schema(value_type = HashMap<String, String>)]
    pub extra: HashMap<String, String>,
}

/// Form body of `POST /auth/session/register`
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RegisterForm {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub password: String,
    #[serde(flatten)]
    #[schema(value_type = HashMap<String, String>)]
    pub extra: HashMap<String, String>,
}

impl RegisterForm {
    /// Empty form inputs are submitted as empty strings
    pub fn email(&self) -> Option<String> {
        self.email.as_deref().map(str::trim).filter(|e| !e.is_empty()).map(str::to_string)
    }
}

/// Value of the form field named `key`, or an empty string
pub fn form_field<'f>(extra: &'f HashMap<String, String>, key: &str) -> &'f str {
    extra.get(key).map(String::as_str).unwrap_or_default()
}

/// A session form page: the CSRF token in the body, its signed copy in a cookie
#[derive(Debug)]
pub struct CsrfFormResponse {
    pub body: CsrfResponse,
    pub cookie: String,
}

impl IntoResponse for CsrfFormResponse {
    fn into_response(self) -> Response {
        ([(header::SET_COOKIE, self.cookie)], Json(self.body)).into_response()
    }
}

/// A redirect that sets (or clears) cookies on the way
#[derive(Debug)]
pub struct CookieRedirect {
    pub location: String,
    pub cookies: Vec<String>,
}

impl IntoResponse for CookieRedirect {
    fn into_response(self) -> Response {
        (
            StatusCode::FOUND,
            AppendHeaders(self.cookies.into_iter().map(|cookie| (header::SET_COOKIE, cookie))),
            [(header::LOCATION, self.location)],
        )
            .into_response()
    }
}
