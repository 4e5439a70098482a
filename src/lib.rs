pub mod admin;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod query;
pub mod schema;
pub mod services;
pub mod store;
pub mod utils;
