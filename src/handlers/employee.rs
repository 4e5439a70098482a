use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::errors::AppError;
use crate::models::employee::{EmployeeUpdate, NewEmployee};
use crate::services::employee::{ListParams, SearchParams};
use crate::services::EmployeeService;

pub async fn create_employee(
    service: web::Data<EmployeeService>,
    new_employee: web::Json<NewEmployee>,
) -> Result<HttpResponse, AppError> {
    let employee = service.create(new_employee.into_inner()).await?;
    Ok(HttpResponse::Created().json(employee))
}

pub async fn get_employee(
    service: web::Data<EmployeeService>,
    employee_id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let employee = service.get_by_id(&employee_id).await?;
    Ok(HttpResponse::Ok().json(employee))
}

/// PUT: every field must be supplied.
pub async fn replace_employee(
    service: web::Data<EmployeeService>,
    employee_id: web::Path<String>,
    employee: web::Json<NewEmployee>,
) -> Result<HttpResponse, AppError> {
    let changes = EmployeeUpdate::from(employee.into_inner());
    let updated = service.update(&employee_id, changes).await?;
    Ok(HttpResponse::Ok().json(updated))
}

/// PATCH: only the supplied fields change.
pub async fn update_employee(
    service: web::Data<EmployeeService>,
    employee_id: web::Path<String>,
    changes: web::Json<EmployeeUpdate>,
) -> Result<HttpResponse, AppError> {
    let updated = service.update(&employee_id, changes.into_inner()).await?;
    Ok(HttpResponse::Ok().json(updated))
}

pub async fn delete_employee(
    service: web::Data<EmployeeService>,
    employee_id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    service.delete(&employee_id).await?;
    Ok(HttpResponse::Ok().json(json!({
        "message": format!("Employee {} deleted successfully", employee_id)
    })))
}

pub async fn list_employees(
    service: web::Data<EmployeeService>,
    params: web::Query<ListParams>,
) -> Result<HttpResponse, AppError> {
    let page = service.list(&params).await?;
    Ok(HttpResponse::Ok().json(page))
}

pub async fn search_employees(
    service: web::Data<EmployeeService>,
    params: web::Query<SearchParams>,
) -> Result<HttpResponse, AppError> {
    let employees = service.search(params.skill.as_deref()).await?;
    Ok(HttpResponse::Ok().json(employees))
}

pub async fn average_salary(service: web::Data<EmployeeService>) -> Result<HttpResponse, AppError> {
    let rows = service.aggregate_avg_salary().await?;
    Ok(HttpResponse::Ok().json(rows))
}
