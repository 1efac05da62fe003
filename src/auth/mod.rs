use axum::http::HeaderMap;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};


/// Username and password from an HTTP Basic `Authorization` header.
#[derive(Clone, PartialEq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Extract Basic credentials from the HTTP Authorization header
///
/// Expected format: "Authorization: Basic base64(username:password)"
pub fn extract_basic_credentials(headers: &HeaderMap) -> Result<BasicCredentials, CredentialsError> {
    let auth_header = headers
        .get("authorization")
        .ok_or(CredentialsError::Missing)?
        .to_str()
        .map_err(|_| CredentialsError::InvalidFormat)?;

    parse_basic_credentials(auth_header)
}

/// Parse the value of a Basic Authorization header
fn parse_basic_credentials(header_value: &str) -> Result<BasicCredentials, CredentialsError> {
    let parts: Vec<&str> = header_value.trim().splitn(2, ' ').collect();

    if parts.len() != 2 || !parts[0].eq_ignore_ascii_case("basic") {
        return Err(CredentialsError::InvalidFormat);
    }

    let decoded = BASE64
        .decode(parts[1].trim())
        .map_err(|_| CredentialsError::InvalidFormat)?;
    let decoded = String::from_utf8(decoded).map_err(|_| CredentialsError::InvalidFormat)?;

    // Password may itself contain ':'
    let (username, password) = decoded
        .split_once(':')
        .ok_or(CredentialsError::InvalidFormat)?;

    if username.is_empty() || password.is_empty() {
        return Err(CredentialsError::Empty);
    }

    Ok(BasicCredentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

/// Credential extraction errors
#[derive(Debug, PartialEq, Clone)]
pub enum CredentialsError {
    /// Authorization header not present
    Missing,
    /// Not "Basic <base64>" or the decoded value has no ':'
    InvalidFormat,
    /// Username or password is empty
    Empty,
}

impl std::fmt::Display for CredentialsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialsError::Missing => write!(f, "Admin credentials not provided"),
            CredentialsError::InvalidFormat => write!(f, "Invalid authorization header format"),
            CredentialsError::Empty => write!(f, "Username or password is empty"),
        }
    }
}

impl std::error::Error for CredentialsError {}
