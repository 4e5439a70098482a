use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Public view of a user; never carries the password hash.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserAccount {
    pub id: Uuid,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
}

/// Shape of a document in the `users` collection.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UserDocument {
    #[serde(flatten)]
    pub account: UserAccount,
    pub password_hash: String,
}

#[derive(Deserialize, Validate, Debug)]
pub struct NewUser {
    pub username: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct ProfileUpdate {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct RegisteredUser {
    pub user: UserAccount,
    pub message: String,
}

#[derive(Serialize, Debug)]
pub struct TokenResponse {
    pub access: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}
