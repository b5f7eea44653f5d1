//! HTTP client for the Skydeck auth API.
//!
//! The client owns bearer injection: requests to auth endpoints (sign-in,
//! sign-up, refresh, password reset) never carry an `Authorization` header,
//! which keeps the refresh call itself from recursing through the 401 path.

use crate::{AuthError, AuthResult};
use reqwest::{header, Client, ClientBuilder, Method};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Auth API endpoint paths.
pub mod endpoints {
    pub const SIGNIN: &str = "/auth/signin";
    pub const SIGNUP: &str = "/auth/signup";
    pub const REFRESH: &str = "/auth/refresh";
    pub const LOGOUT: &str = "/auth/logout";
    pub const ME: &str = "/auth/me";
    pub const PASSWORD_RESET: &str = "/auth/password-reset";
    pub const PASSWORD_RESET_CONFIRM: &str = "/auth/password-reset/confirm";
    pub const PASSWORD_CHANGE: &str = "/auth/password-change";
}

/// Sign-in credentials.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Sign-up request body.
#[derive(Debug, Clone, Serialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Token pair issued by sign-in, sign-up, and refresh.
///
/// A refresh response may omit `refresh_token`, in which case the stored
/// refresh token stays in effect. `expires_in` (seconds) feeds the
/// expiry-based refresh schedule when present.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Profile of the authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Serialize)]
struct PasswordResetRequest<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct PasswordResetConfirmRequest<'a> {
    token: &'a str,
    new_password: &'a str,
}

#[derive(Debug, Serialize)]
struct PasswordChangeRequest<'a> {
    current_password: &'a str,
    new_password: &'a str,
}

/// Skydeck API client.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new client with default configuration.
    pub fn new(base_url: impl Into<String>) -> AuthResult<Self> {
        Self::builder().base_url(base_url).build()
    }

    /// Create a new client builder.
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// True if the path is an auth endpoint that must never carry a bearer
    /// credential.
    pub fn is_auth_exempt(path: &str) -> bool {
        let path = path.split('?').next().unwrap_or(path);
        matches!(
            path,
            endpoints::SIGNIN
                | endpoints::SIGNUP
                | endpoints::REFRESH
                | endpoints::PASSWORD_RESET
                | endpoints::PASSWORD_RESET_CONFIRM
        )
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Build a request, attaching `Authorization: Bearer <token>` unless the
    /// target is an auth-exempt endpoint.
    fn request(
        &self,
        method: Method,
        path: &str,
        access_token: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let mut request = self.http.request(method, self.endpoint(path));

        if let Some(token) = access_token {
            if !Self::is_auth_exempt(path) {
                request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
            }
        }

        request
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> AuthResult<T> {
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            Ok(response.json().await?)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(AuthError::from_response(status.as_u16(), &body))
        }
    }

    async fn execute_no_content(&self, request: reqwest::RequestBuilder) -> AuthResult<()> {
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(AuthError::from_response(status.as_u16(), &body))
        }
    }

    /// Issue an arbitrary JSON request through the authorizer.
    pub async fn send_json<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        access_token: Option<&str>,
    ) -> AuthResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self.request(method, path, access_token);
        if let Some(body) = body {
            request = request.json(body);
        }
        self.execute(request).await
    }

    /// `POST /auth/signin`
    pub async fn sign_in(&self, credentials: &Credentials) -> AuthResult<TokenGrant> {
        let request = self
            .request(Method::POST, endpoints::SIGNIN, None)
            .json(credentials);
        self.execute(request).await
    }

    /// `POST /auth/signup`
    pub async fn sign_up(&self, signup: &SignupRequest) -> AuthResult<TokenGrant> {
        let request = self
            .request(Method::POST, endpoints::SIGNUP, None)
            .json(signup);
        self.execute(request).await
    }

    /// `POST /auth/refresh`
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenGrant> {
        tracing::debug!("Exchanging refresh token");

        let request = self
            .request(Method::POST, endpoints::REFRESH, None)
            .json(&RefreshRequest { refresh_token });
        self.execute(request).await
    }

    /// `POST /auth/logout`
    pub async fn sign_out(&self, access_token: &str) -> AuthResult<()> {
        let request = self.request(Method::POST, endpoints::LOGOUT, Some(access_token));
        self.execute_no_content(request).await
    }

    /// `GET /auth/me`
    pub async fn me(&self, access_token: &str) -> AuthResult<User> {
        let request = self.request(Method::GET, endpoints::ME, Some(access_token));
        self.execute(request).await
    }

    /// `POST /auth/password-reset`
    pub async fn request_password_reset(&self, email: &str) -> AuthResult<()> {
        let request = self
            .request(Method::POST, endpoints::PASSWORD_RESET, None)
            .json(&PasswordResetRequest { email });
        self.execute_no_content(request).await
    }

    /// `POST /auth/password-reset/confirm`
    pub async fn confirm_password_reset(
        &self,
        token: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        let request = self
            .request(Method::POST, endpoints::PASSWORD_RESET_CONFIRM, None)
            .json(&PasswordResetConfirmRequest {
                token,
                new_password,
            });
        self.execute_no_content(request).await
    }

    /// `POST /auth/password-change` (requires authentication)
    pub async fn change_password(
        &self,
        access_token: &str,
        current_password: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        let request = self
            .request(Method::POST, endpoints::PASSWORD_CHANGE, Some(access_token))
            .json(&PasswordChangeRequest {
                current_password,
                new_password,
            });
        self.execute_no_content(request).await
    }
}

/// Builder for ApiClient.
#[derive(Default)]
pub struct ApiClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
}

impl ApiClientBuilder {
    /// Set the base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the request timeout. Applies to every call, including `/auth/refresh`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the user agent.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Build the client.
    pub fn build(self) -> AuthResult<ApiClient> {
        let base_url = self
            .base_url
            .ok_or_else(|| AuthError::Config("base_url is required".into()))?;

        let base_url = base_url.trim_end_matches('/').to_string();

        let client = ClientBuilder::new()
            .timeout(self.timeout.unwrap_or(Duration::from_secs(30)))
            .user_agent(
                self.user_agent
                    .unwrap_or_else(|| "skydeck-client/0.1.0".to_string()),
            )
            .build()?;

        Ok(ApiClient {
            http: client,
            base_url,
        })
    }
}
