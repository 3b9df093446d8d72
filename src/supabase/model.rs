use serde::{Deserialize, Serialize};

use crate::model::UserId;

#[derive(Serialize, Debug)]
pub struct Credentials<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AuthUser {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
}

/// Response of `POST auth/v1/token?grant_type=password`.
#[derive(Deserialize, Debug, Clone)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    pub user: AuthUser,
}

/// `auth/v1/signup` returns a session when confirmation is disabled and a bare
/// user otherwise.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum SignUpResponse {
    Session(TokenResponse),
    User(AuthUser),
}

/// GoTrue reports failures under several keys depending on the endpoint.
#[derive(Deserialize, Debug, Default)]
pub struct ErrorBody {
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorBody {
    pub fn into_message(self) -> Option<String> {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
    }
}
