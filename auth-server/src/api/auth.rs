// auth-server/src/api/auth.rs
use actix_web::cookie::time::Duration as CookieDuration;
use actix_web::cookie::{Cookie, SameSite};
use actix_web::http::{header, StatusCode};
use actix_web::{get, post, web, HttpRequest, HttpResponse, Responder, ResponseError};
use common::models::session::{ErrorResponse, NonceRequest, VerifyRequest};
use common::Config;
use serde_json::json;

use crate::auth::{AuthError, AuthService};

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            AuthError::NonceNotFound => StatusCode::NOT_FOUND,
            AuthError::NonceExpired
            | AuthError::DomainMismatch { .. }
            | AuthError::AddressMismatch
            | AuthError::BadSignature
            | AuthError::NoSession => StatusCode::UNAUTHORIZED,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.code().to_string(),
            message: self.public_message(),
        })
    }
}

/// Malformed JSON bodies surface as `invalid_payload`
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(16 * 1024)
        .error_handler(|err, _req| AuthError::InvalidPayload(err.to_string()).into())
}

/// Host the client addressed. Forwarded headers are client-controlled and
/// ignored; deployments behind a proxy set `auth.login_domain`.
fn request_host(req: &HttpRequest) -> String {
    req.headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| req.uri().authority().map(|a| a.as_str()))
        .unwrap_or_default()
        .to_string()
}

fn session_cookie(config: &Config, token: String, max_age_seconds: i64) -> Cookie<'static> {
    Cookie::build(config.cookie.name.clone(), token)
        .path("/")
        .secure(config.cookie.secure)
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::seconds(max_age_seconds))
        .finish()
}

fn session_token(req: &HttpRequest, config: &Config) -> Option<String> {
    req.cookie(&config.cookie.name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

#[get("/")]
pub async fn api_index() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "name": "Wallet Auth API",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// Issue a challenge for the wallet to sign
#[post("/auth/nonce")]
pub async fn issue_nonce(
    req: HttpRequest,
    body: web::Json<NonceRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AuthError> {
    let challenge = auth.issue_nonce(&body.address, &request_host(&req)).await?;
    Ok(HttpResponse::Ok().json(challenge))
}

// Check the signed challenge and start a session
#[post("/auth/verify")]
pub async fn verify(
    req: HttpRequest,
    body: web::Json<VerifyRequest>,
    auth: web::Data<AuthService>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AuthError> {
    let session = auth.verify(&body, &request_host(&req)).await?;

    let cookie = session_cookie(&config, session.token.clone(), auth.session_ttl_seconds());
    Ok(HttpResponse::Ok().cookie(cookie).json(session.response()))
}

// Describe the session carried by the cookie
#[get("/auth/session")]
pub async fn get_session(
    req: HttpRequest,
    auth: web::Data<AuthService>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AuthError> {
    let token = session_token(&req, &config).ok_or(AuthError::NoSession)?;
    let info = auth.inspect_session(&token).await?;
    Ok(HttpResponse::Ok().json(info))
}

// Forget the session and clear the cookie
#[post("/auth/logout")]
pub async fn logout(
    req: HttpRequest,
    auth: web::Data<AuthService>,
    config: web::Data<Config>,
) -> HttpResponse {
    if let Some(token) = session_token(&req, &config) {
        if let Err(e) = auth.logout(&token).await {
            // The cookie is cleared regardless
            tracing::error!("Error revoking session on logout: {}", e);
        }
    }

    HttpResponse::Ok()
        .cookie(session_cookie(&config, String::new(), 0))
        .json(json!({
            "status": "success",
            "message": "Logged out"
        }))
}
