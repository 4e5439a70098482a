pub mod employee;
pub mod user;

pub use employee::EmployeeService;
pub use user::UserService;
