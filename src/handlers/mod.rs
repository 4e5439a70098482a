pub mod auth;
pub mod employee;
pub mod user;

use actix_web::{error, web, HttpRequest};
use log::debug;

use crate::errors::AppError;

fn json_error(err: error::JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    debug!("Rejected request body: {}", err);
    AppError::validation(format!("Invalid request body: {}", err)).into()
}

fn query_error(err: error::QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    debug!("Rejected query string: {}", err);
    AppError::validation(format!("Invalid query parameters: {}", err)).into()
}

fn path_error(err: error::PathError, _req: &HttpRequest) -> actix_web::Error {
    AppError::validation(format!("Invalid path: {}", err)).into()
}

/// Registers every route together with the extractor error handlers.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .app_data(web::QueryConfig::default().error_handler(query_error))
        .app_data(web::PathConfig::default().error_handler(path_error))
        .service(
            web::scope("/employees")
                .service(
                    web::resource("")
                        .route(web::post().to(employee::create_employee))
                        .route(web::get().to(employee::list_employees)),
                )
                .service(web::resource("/search").route(web::get().to(employee::search_employees)))
                .service(
                    web::resource("/avg-salary").route(web::get().to(employee::average_salary)),
                )
                .service(
                    web::resource("/{employee_id}")
                        .route(web::get().to(employee::get_employee))
                        .route(web::put().to(employee::replace_employee))
                        .route(web::patch().to(employee::update_employee))
                        .route(web::delete().to(employee::delete_employee)),
                ),
        )
        .service(
            web::scope("/auth")
                .service(web::resource("/register").route(web::post().to(auth::register)))
                .service(web::resource("/token").route(web::post().to(auth::issue_token)))
                .service(
                    web::resource("/profile")
                        .route(web::get().to(user::get_profile))
                        .route(web::put().to(user::update_profile))
                        .route(web::patch().to(user::update_profile)),
                ),
        );
}
