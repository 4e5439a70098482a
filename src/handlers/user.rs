use actix_web::{web, HttpResponse};

use super::auth::CurrentUser;
use crate::errors::AppError;
use crate::models::user::ProfileUpdate;
use crate::services::UserService;

pub async fn get_profile(
    service: web::Data<UserService>,
    user: CurrentUser,
) -> Result<HttpResponse, AppError> {
    let account = service.profile(&user.username).await?;
    Ok(HttpResponse::Ok().json(account))
}

pub async fn update_profile(
    service: web::Data<UserService>,
    user: CurrentUser,
    changes: web::Json<ProfileUpdate>,
) -> Result<HttpResponse, AppError> {
    let account = service.update_profile(&user.username, changes.into_inner()).await?;
    Ok(HttpResponse::Ok().json(account))
}
