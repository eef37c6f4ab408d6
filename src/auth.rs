use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::AUTHORIZATION;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, field, span, Instrument, Level, Span};
use url::Url;

use crate::error::{Error, ErrorKind};
use crate::sync::record;

/// Username and password sent to the login endpoint
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// A value for the `Authorization` header
#[derive(Clone)]
pub struct Token {
    value: String,
    expires_at: Option<Instant>,
}

impl Token {
    /// Use the header value as given by the server, e.g. `Bearer eyJ..`
    pub fn new(value: impl Into<String>) -> Self {
        Token {
            value: value.into(),
            expires_at: None,
        }
    }

    /// Build a bearer token from a raw credential
    pub fn bearer(credential: &str) -> Self {
        Token::new(format!("Bearer {credential}"))
    }

    /// Stop sending the token once `ttl` elapses
    pub fn expires_in(self, ttl: Duration) -> Self {
        Token {
            expires_at: Instant::now().checked_add(ttl),
            ..self
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Authentication state shared between the login flow and the collection
/// clients
///
/// Clones share the same token, so logging out through one handle
/// invalidates the token for every client holding a clone.
#[derive(Clone, Default, Debug)]
pub struct AuthContext {
    token: Arc<RwLock<Option<Token>>>,
}

impl AuthContext {
    /// An unauthenticated context
    pub fn new() -> Self {
        AuthContext::default()
    }

    pub fn with_token(token: Token) -> Self {
        AuthContext {
            token: Arc::new(RwLock::new(Some(token))),
        }
    }

    pub async fn set(&self, token: Token) {
        *self.token.write().await = Some(token);
    }

    /// Forget the token
    pub async fn invalidate(&self) {
        *self.token.write().await = None;
    }

    pub async fn is_authenticated(&self) -> bool {
        self.token
            .read()
            .await
            .as_ref()
            .is_some_and(|t| !t.is_expired())
    }

    /// The header value to send, if there is a valid token
    pub(crate) async fn header(&self) -> Option<String> {
        self.token
            .read()
            .await
            .as_ref()
            .filter(|t| !t.is_expired())
            .map(|t| t.value.clone())
    }

    /// Authenticate against a login endpoint
    ///
    /// The credentials are posted as JSON and the token is read from the
    /// `Authorization` header of the response. On failure the current token,
    /// if any, is left untouched.
    pub async fn login(
        &self,
        http: &reqwest::Client,
        url: Url,
        credentials: &Credentials,
    ) -> Result<(), Error> {
        let span = span!(
            Level::INFO,
            "login",
            url = %url,
            username = %credentials.username,
            return = field::Empty,
            error = field::Empty
        );
        async {
            let res = self.authenticate(http, url, credentials).await;
            record(&Span::current(), &res);
            res
        }
        .instrument(span)
        .await
    }

    async fn authenticate(
        &self,
        http: &reqwest::Client,
        url: Url,
        credentials: &Credentials,
    ) -> Result<(), Error> {
        let res = http.post(url).json(credentials).send().await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            let reason = if body.is_empty() {
                "check your username and password".to_string()
            } else {
                body
            };
            return Err(Error::status(status, LoginError::Rejected(reason)));
        }

        let token = res
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map(Token::new)
            .ok_or(Error::new(ErrorKind::Unauthenticated, LoginError::MissingToken))?;

        debug!("login succeeded");
        self.set(token).await;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
enum LoginError {
    #[error("login failed: {0}")]
    Rejected(String),
    #[error("the response has no Authorization header")]
    MissingToken,
}
