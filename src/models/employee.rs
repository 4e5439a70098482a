use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Department {
    Engineering,
    HR,
    Marketing,
    Finance,
    Operations,
    Sales,
}

impl Department {
    pub const ALL: [Department; 6] = [
        Department::Engineering,
        Department::HR,
        Department::Marketing,
        Department::Finance,
        Department::Operations,
        Department::Sales,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Department::Engineering => "Engineering",
            Department::HR => "HR",
            Department::Marketing => "Marketing",
            Department::Finance => "Finance",
            Department::Operations => "Operations",
            Department::Sales => "Sales",
        }
    }
}

/// Stored employee record.
///
/// `department` and `joining_date` stay as strings so that documents
/// accepted under `warn` enforcement can still be read back.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Employee {
    pub employee_id: String,
    pub name: String,
    pub department: String,
    pub salary: i64,
    pub joining_date: String,
    #[serde(default)]
    pub skills: Vec<String>,
}

/// Full record as supplied on create or `PUT`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NewEmployee {
    pub employee_id: String,
    pub name: String,
    pub department: String,
    pub salary: i64,
    pub joining_date: String,
    #[serde(default)]
    pub skills: Vec<String>,
}

/// Partial update; only supplied fields are merged.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct EmployeeUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salary: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub joining_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skills: Option<Vec<String>>,
}

impl From<NewEmployee> for EmployeeUpdate {
    fn from(full: NewEmployee) -> Self {
        Self {
            employee_id: Some(full.employee_id),
            name: Some(full.name),
            department: Some(full.department),
            salary: Some(full.salary),
            joining_date: Some(full.joining_date),
            skills: Some(full.skills),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DepartmentSalary {
    pub department: String,
    pub avg_salary: i64,
}
