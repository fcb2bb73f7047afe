//! Login exchange with the authentication server.
//!
//! The battle server opens every connection with a `challstr`. The client
//! posts the challstr together with its credentials to the login endpoint and
//! receives a signed assertion, which it then hands back to the battle server
//! with `/trn`.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ShowdownError};

/// Account name and password.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Read `{"username": ..., "password": ...}` from a JSON file.
    ///
    /// # Errors
    ///
    /// [`ShowdownError::Io`] if the file cannot be read,
    /// [`ShowdownError::Serialization`] if it is not valid credentials JSON.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// The two tokens of a `challstr` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challstr {
    pub key_id: String,
    pub challenge: String,
}

impl Challstr {
    /// Build from the content fields of a `challstr` message.
    pub fn from_content(content: &[String]) -> Option<Self> {
        match content {
            [key_id, challenge, ..] => Some(Self {
                key_id: key_id.clone(),
                challenge: challenge.clone(),
            }),
            _ => None,
        }
    }

    /// The value posted as `challstr`: both tokens joined with `|`.
    pub fn joined(&self) -> String {
        format!("{}|{}", self.key_id, self.challenge)
    }
}

/// Form fields of a login request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginRequest {
    pub act: &'static str,
    pub name: String,
    pub pass: String,
    pub challstr: String,
}

impl LoginRequest {
    pub fn new(credentials: &Credentials, challstr: &Challstr) -> Self {
        Self {
            act: "login",
            name: credentials.username.clone(),
            pass: credentials.password.clone(),
            challstr: challstr.joined(),
        }
    }
}

/// Performs the external login exchange and returns the assertion token.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// # Errors
    ///
    /// Returns [`ShowdownError::Auth`] when the server rejects the login.
    async fn authenticate(&self, request: &LoginRequest) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    actionsuccess: bool,
    #[serde(default)]
    assertion: Option<String>,
}

/// Extract the assertion from a login response.
///
/// The body carries a one-character prefix before its JSON object.
///
/// # Errors
///
/// [`ShowdownError::Auth`] for a non-success status, an unreadable body,
/// `actionsuccess: false`, a missing assertion, or an assertion that is
/// really an error message (starts with `;;`).
pub fn parse_login_response(status_ok: bool, body: &str) -> Result<String> {
    if !status_ok {
        return Err(ShowdownError::Auth(format!("login endpoint refused: {body}")));
    }
    let json = body.get(1..).unwrap_or_default();
    let response: LoginResponse = serde_json::from_str(json)
        .map_err(|e| ShowdownError::Auth(format!("unreadable login response: {e}")))?;
    if !response.actionsuccess {
        return Err(ShowdownError::Auth(format!("login rejected: {body}")));
    }
    match response.assertion {
        Some(assertion) if assertion.starts_with(";;") => Err(ShowdownError::Auth(
            assertion.trim_start_matches(';').to_owned(),
        )),
        Some(assertion) if !assertion.is_empty() => Ok(assertion),
        _ => Err(ShowdownError::Auth("login response has no assertion".into())),
    }
}

/// [`Authenticator`] that posts the login form over HTTPS.
#[cfg(feature = "http-login")]
#[derive(Debug, Clone)]
pub struct HttpAuthenticator {
    http: reqwest::Client,
    login_url: String,
}

#[cfg(feature = "http-login")]
impl HttpAuthenticator {
    pub fn new(login_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            login_url: login_url.into(),
        }
    }
}

#[cfg(feature = "http-login")]
#[async_trait]
impl Authenticator for HttpAuthenticator {
    async fn authenticate(&self, request: &LoginRequest) -> Result<String> {
        tracing::debug!(url = %self.login_url, name = %request.name, "posting login request");
        let response = self
            .http
            .post(&self.login_url)
            .form(request)
            .send()
            .await
            .map_err(|e| ShowdownError::Auth(format!("login request failed: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ShowdownError::Auth(format!("login response unreadable: {e}")))?;
        parse_login_response(status.is_success(), &body)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn successful_response_yields_assertion() {
        let assertion =
            parse_login_response(true, r#"]{"actionsuccess": true,"assertion":"assertion"}"#)
                .unwrap();
        assert_eq!(assertion, "assertion");
    }

    #[test]
    fn bad_status_is_auth_error() {
        let err = parse_login_response(false, "").unwrap_err();
        assert!(matches!(err, ShowdownError::Auth(_)));
    }

    #[test]
    fn failure_flag_is_auth_error() {
        let err =
            parse_login_response(true, r#"]{"actionsuccess": false,"assertion":"assertion"}"#)
                .unwrap_err();
        assert!(matches!(err, ShowdownError::Auth(_)));
    }

    #[test]
    fn error_assertion_is_auth_error() {
        let err = parse_login_response(
            true,
            r#"]{"actionsuccess": true,"assertion":";;Your username is unregistered"}"#,
        )
        .unwrap_err();
        match err {
            ShowdownError::Auth(reason) => assert_eq!(reason, "Your username is unregistered"),
            other => panic!("expected Auth, got {other:?}"),
        }
    }

    #[test]
    fn garbage_body_is_auth_error() {
        assert!(matches!(
            parse_login_response(true, "<html>"),
            Err(ShowdownError::Auth(_))
        ));
        assert!(matches!(
            parse_login_response(true, ""),
            Err(ShowdownError::Auth(_))
        ));
    }

    #[test]
    fn login_request_joins_challstr_tokens() {
        let challstr =
            Challstr::from_content(&["1".to_string(), "1".to_string()]).unwrap();
        let request = LoginRequest::new(&Credentials::new("uname", "pass"), &challstr);
        assert_eq!(request.act, "login");
        assert_eq!(request.name, "uname");
        assert_eq!(request.pass, "pass");
        assert_eq!(request.challstr, "1|1");
    }

    #[test]
    fn challstr_needs_two_tokens() {
        assert!(Challstr::from_content(&["4".to_string()]).is_none());
    }

    #[test]
    fn credentials_debug_hides_password() {
        let rendered = format!("{:?}", Credentials::new("uname", "hunter2"));
        assert!(rendered.contains("uname"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn credentials_load_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("login.json");
        std::fs::write(&path, r#"{"username": "uname", "password": "pass"}"#).unwrap();
        let credentials = Credentials::from_json_file(&path).unwrap();
        assert_eq!(credentials.username, "uname");
        assert_eq!(credentials.password, "pass");
    }
}
