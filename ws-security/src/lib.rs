//! WS-Security UsernameToken for ONVIF
//!
//! Both directions of the OASIS UsernameToken Profile 1.1 (PasswordDigest):
//!
//! - [`TokenGenerator`] builds `<wsse:Security>` headers for outbound
//!   requests to a physical NVR. The `Created` timestamp is shifted by an
//!   explicit clock offset so a request can be retried against a device
//!   whose clock disagrees with ours.
//! - [`authenticate`] parses and validates the header of an inbound request
//!   to an emulated camera.
//!
//! ```rust,ignore
//! use ws_security::{Credentials, TokenGenerator};
//!
//! let creds = Credentials::new("admin", "secret");
//! let header = TokenGenerator::new(&creds).header(chrono::Duration::zero());
//! ```

mod digest;
mod error;
mod parse;

pub use error::WsSecurityError;
pub use parse::{parse_username_token, UsernameToken};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;

/// Tolerated skew for tokens created "in the future"
const FUTURE_SKEW_SECS: i64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

/// Produces fresh UsernameTokens for one set of credentials.
pub struct TokenGenerator<'a> {
    credentials: &'a Credentials,
}

impl<'a> TokenGenerator<'a> {
    pub fn new(credentials: &'a Credentials) -> Self {
        Self { credentials }
    }

    /// Build a token whose `Created` is `now + clock_offset`.
    pub fn token(&self, clock_offset: Duration) -> UsernameToken {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);
        self.token_at(Utc::now() + clock_offset, &nonce)
    }

    /// Deterministic variant of [`Self::token`].
    pub fn token_at(&self, created: DateTime<Utc>, nonce: &[u8]) -> UsernameToken {
        let created = created.format("%Y-%m-%dT%H:%M:%SZ").to_string();
        UsernameToken {
            username: self.credentials.username.clone(),
            password_digest: digest::digest_raw(nonce, &created, &self.credentials.password),
            nonce: BASE64.encode(nonce),
            created,
        }
    }

    /// `<wsse:Security>` element ready to drop into a SOAP header
    pub fn header(&self, clock_offset: Duration) -> String {
        security_header(&self.token(clock_offset))
    }
}

/// Render a token as a `<wsse:Security>` element.
pub fn security_header(token: &UsernameToken) -> String {
    use quick_xml::escape::escape;
    format!(
        r#"<wsse:Security xmlns:wsse="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd" xmlns:wsu="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd">
      <wsse:UsernameToken>
        <wsse:Username>{}</wsse:Username>
        <wsse:Password Type="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest">{}</wsse:Password>
        <wsse:Nonce EncodingType="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary">{}</wsse:Nonce>
        <wsu:Created>{}</wsu:Created>
      </wsse:UsernameToken>
    </wsse:Security>"#,
        escape(&token.username),
        token.password_digest,
        token.nonce,
        token.created
    )
}

/// Validate a parsed token against the expected credentials.
pub fn validate_token(
    token: &UsernameToken,
    credentials: &Credentials,
    max_age_secs: u64,
) -> Result<(), WsSecurityError> {
    if token.username != credentials.username {
        return Err(WsSecurityError::InvalidCredentials);
    }

    let created = DateTime::parse_from_rfc3339(&token.created)
        .map_err(|_| WsSecurityError::InvalidTimestamp)?
        .with_timezone(&Utc);
    let age = Utc::now().signed_duration_since(created).num_seconds();

    if age < -FUTURE_SKEW_SECS {
        return Err(WsSecurityError::FromFuture { skew_secs: -age });
    }
    let age_secs = age.max(0) as u64;
    if age_secs > max_age_secs {
        return Err(WsSecurityError::Expired {
            age_secs,
            max_secs: max_age_secs,
        });
    }

    let expected = digest::compute_digest(&token.nonce, &token.created, &credentials.password)?;
    if !digest::verify_digest(&token.password_digest, &expected) {
        return Err(WsSecurityError::InvalidCredentials);
    }
    Ok(())
}

/// Parse and validate the Security header of `xml` in one step.
pub fn authenticate(
    xml: &str,
    credentials: &Credentials,
    max_age_secs: u64,
) -> Result<(), WsSecurityError> {
    let token = parse_username_token(xml)?;
    validate_token(&token, credentials, max_age_secs)
}
