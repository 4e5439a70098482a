use actix_web::dev::Payload;
use actix_web::http::header;
use actix_web::{web, FromRequest, HttpRequest, HttpResponse};
use log::{error, info};
use std::future::{ready, Ready};

use crate::errors::AppError;
use crate::models::user::{Credentials, NewUser, RegisteredUser, TokenResponse};
use crate::services::UserService;
use crate::utils::jwt::JwtKeys;

const REGISTERED_MESSAGE: &str = "User created successfully. You can now login to get your tokens.";

/// Caller identity taken from a valid `Authorization: Bearer` token.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub username: String,
}

impl FromRequest for CurrentUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(current_user(req))
    }
}

fn current_user(req: &HttpRequest) -> Result<CurrentUser, AppError> {
    let keys = req.app_data::<web::Data<JwtKeys>>().ok_or_else(|| {
        error!("JWT keys are not registered as app data");
        AppError::InternalServerError("JWT keys missing".to_string())
    })?;

    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|auth| auth.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            AppError::Unauthorized("Authentication credentials were not provided".to_string())
        })?;

    let claims = keys
        .validate_token(token)
        .map_err(|err| AppError::Unauthorized(format!("Invalid token: {}", err)))?;
    Ok(CurrentUser { username: claims.sub })
}

pub async fn register(
    service: web::Data<UserService>,
    new_user: web::Json<NewUser>,
) -> Result<HttpResponse, AppError> {
    let user = service.register(new_user.into_inner()).await?;
    Ok(HttpResponse::Created().json(RegisteredUser {
        user,
        message: REGISTERED_MESSAGE.to_string(),
    }))
}

pub async fn issue_token(
    service: web::Data<UserService>,
    keys: web::Data<JwtKeys>,
    credentials: web::Json<Credentials>,
) -> Result<HttpResponse, AppError> {
    let user = service.authenticate(&credentials).await?;
    let (access, expires_in) = keys.generate_token(&user.username).map_err(|err| {
        error!("Token generation failed for {}: {}", user.username, err);
        AppError::InternalServerError("Token generation error".to_string())
    })?;

    info!("Issued token for {}", user.username);
    Ok(HttpResponse::Ok().json(TokenResponse {
        access,
        token_type: "Bearer",
        expires_in,
    }))
}
