use reqwest::{Method, StatusCode};
use thiserror::Error;
use tracing::{info, instrument, warn};

use super::model::{AuthUser, Credentials, ErrorBody, SignUpResponse, TokenResponse};
use super::SupabaseClient;
use crate::model::UserId;
use crate::session::SessionHandle;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// Message reported by the auth service, shown to the user as-is.
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },
    #[error("{0}")]
    InvalidUrl(String),
}

/// Outcome of a sign-up request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    /// Account created and signed in straight away.
    SignedIn(UserId),
    /// Account created; the user has to confirm their email first.
    ConfirmationSent(UserId),
}

/// Email/password accounts against the hosted auth service. Successful sign-in
/// stores the access token on the shared client and publishes the user on the
/// session.
#[derive(Debug, Clone)]
pub struct SupabaseAuth {
    client: SupabaseClient,
    session: SessionHandle,
}

impl SupabaseAuth {
    pub fn new(client: SupabaseClient, session: SessionHandle) -> Self {
        Self { client, session }
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn build_sign_in(&self, email: &str, password: &str) -> Result<reqwest::Request, AuthError> {
        let mut url = self
            .client
            .endpoint("auth/v1/token")
            .map_err(AuthError::InvalidUrl)?;
        url.query_pairs_mut().append_pair("grant_type", "password");
        Ok(self
            .client
            .request(Method::POST, url)
            .json(&Credentials { email, password })
            .build()?)
    }

    pub fn build_sign_up(&self, email: &str, password: &str) -> Result<reqwest::Request, AuthError> {
        let url = self
            .client
            .endpoint("auth/v1/signup")
            .map_err(AuthError::InvalidUrl)?;
        Ok(self
            .client
            .request(Method::POST, url)
            .json(&Credentials { email, password })
            .build()?)
    }

    #[instrument(skip_all)]
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthUser, AuthError> {
        let request = self.build_sign_in(email, password)?;
        let res = self.client.http.execute(request).await?;
        let token: TokenResponse = parse_response(res).await?;
        self.client.set_access_token(Some(token.access_token));
        self.session.set_user(Some(token.user.id));
        info!(user_id = %token.user.id, "signed in");
        Ok(token.user)
    }

    #[instrument(skip_all)]
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, AuthError> {
        let request = self.build_sign_up(email, password)?;
        let res = self.client.http.execute(request).await?;
        match parse_response::<SignUpResponse>(res).await? {
            SignUpResponse::Session(token) => {
                self.client.set_access_token(Some(token.access_token));
                self.session.set_user(Some(token.user.id));
                info!(user_id = %token.user.id, "signed up and signed in");
                Ok(SignUpOutcome::SignedIn(token.user.id))
            }
            SignUpResponse::User(user) => {
                info!(user_id = %user.id, "signed up; confirmation pending");
                Ok(SignUpOutcome::ConfirmationSent(user.id))
            }
        }
    }

    /// Revoke the token server-side when possible; local state is cleared regardless.
    #[instrument(skip_all)]
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let result = match self.client.access_token() {
            Some(_) => self.revoke().await,
            None => Ok(()),
        };
        self.client.set_access_token(None);
        self.session.sign_out();
        if let Err(err) = &result {
            warn!(?err, "sign-out request failed; cleared local session");
        }
        result
    }

    async fn revoke(&self) -> Result<(), AuthError> {
        let url = self
            .client
            .endpoint("auth/v1/logout")
            .map_err(AuthError::InvalidUrl)?;
        let res = self
            .client
            .request(Method::POST, url)
            .send()
            .await?;
        if res.status().is_success() {
            return Ok(());
        }
        Err(rejected(res).await)
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    res: reqwest::Response,
) -> Result<T, AuthError> {
    if !res.status().is_success() {
        return Err(rejected(res).await);
    }
    Ok(res.json::<T>().await?)
}

async fn rejected(res: reqwest::Response) -> AuthError {
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(ErrorBody::into_message)
        .unwrap_or_else(|| format!("authentication failed ({})", status));
    AuthError::Rejected { status, message }
}
