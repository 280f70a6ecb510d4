//! Session cookie carrier
//!
//! Builds `Set-Cookie` values for issued sessions and reads the session token
//! back out of `Cookie` headers, both through the `cookie` crate. `HttpOnly`
//! and `Secure` follow the flags the session was created with; `SameSite` and
//! `Domain` come from configuration.
//!
//! # Usage
//!
//! ```ignore
//! let header = cookie::build_set_cookie(&settings, &issued);
//! // session=abc...; HttpOnly; SameSite=None; Secure; Path=/; Max-Age=86400; Expires=Tue, 15 Nov 1994 08:12:31 GMT
//!
//! let token = cookie::read_cookie(request.headers(), &settings.name);
//! ```

use std::fmt;

use axum::http::{header, HeaderMap};
use cookie::time::{Duration as CookieDuration, OffsetDateTime};
use cookie::{Cookie, CookieBuilder};

use crate::error::ConfigError;
use crate::session::{IssuedSession, SessionFlags};

/// `SameSite` cookie attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSite {
    Strict,
    Lax,
    /// Required when the frontend is on another site; must be paired with `Secure`
    #[default]
    None,
}

impl SameSite {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Some(Self::Strict),
            "lax" => Some(Self::Lax),
            "none" => Some(Self::None),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }
}

impl From<SameSite> for cookie::SameSite {
    fn from(same_site: SameSite) -> Self {
        match same_site {
            SameSite::Strict => cookie::SameSite::Strict,
            SameSite::Lax => cookie::SameSite::Lax,
            SameSite::None => cookie::SameSite::None,
        }
    }
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the session cookie is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieSettings {
    /// Cookie name
    pub name: String,
    /// Optional `Domain` attribute
    pub domain: Option<String>,
    /// Only send over HTTPS
    pub secure: bool,
    pub same_site: SameSite,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            name: "_portcullis_session".to_string(),
            domain: None,
            secure: true,
            same_site: SameSite::None,
        }
    }
}

impl CookieSettings {
    /// Flags to record on sessions issued under these settings
    pub fn session_flags(&self) -> SessionFlags {
        SessionFlags {
            http_only: true,
            secure: self.secure,
        }
    }

    /// Reject settings a browser would refuse or that would weaken the cookie
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() || !self.name.bytes().all(is_token_byte) {
            return Err(ConfigError::invalid(
                "SESSION_COOKIE_NAME",
                format!("{:?} is not a valid cookie name", self.name),
            ));
        }
        if let Some(domain) = &self.domain {
            if domain.is_empty() || domain.contains(|c: char| c == ';' || c == ',' || c.is_whitespace()) {
                return Err(ConfigError::invalid(
                    "SESSION_COOKIE_DOMAIN",
                    format!("{:?} is not a valid cookie domain", domain),
                ));
            }
        }
        if self.same_site == SameSite::None && !self.secure {
            return Err(ConfigError::InsecureCookie);
        }
        Ok(())
    }
}

// RFC 6265 cookie-name: any CHAR except CTLs or separators
fn is_token_byte(b: u8) -> bool {
    b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b)
}

/// `Set-Cookie` value persisting an issued session
pub fn build_set_cookie(settings: &CookieSettings, issued: &IssuedSession) -> String {
    let session = &issued.session;
    let max_age = (session.expires_at - session.created_at).num_seconds().max(0);

    let mut builder = session_cookie(settings, issued.token.as_str().to_string(), session.flags)
        .max_age(CookieDuration::seconds(max_age));
    if let Ok(expires) = OffsetDateTime::from_unix_timestamp(session.expires_at.timestamp()) {
        builder = builder.expires(expires);
    }
    builder.build().to_string()
}

/// `Set-Cookie` value that removes the session cookie
pub fn build_clear_cookie(settings: &CookieSettings) -> String {
    let mut cookie = session_cookie(settings, String::new(), settings.session_flags()).build();
    cookie.make_removal();
    cookie.to_string()
}

fn session_cookie(settings: &CookieSettings, value: String, flags: SessionFlags) -> CookieBuilder<'static> {
    let mut builder = Cookie::build((settings.name.clone(), value))
        .path("/")
        .http_only(flags.http_only)
        .secure(flags.secure)
        .same_site(settings.same_site.into());
    if let Some(domain) = &settings.domain {
        builder = builder.domain(domain.clone());
    }
    builder
}

/// Read a cookie value from every `Cookie` header of a request.
///
/// Empty values and unparseable pairs are treated as absent.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| Cookie::split_parse(value))
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name && !cookie.value().is_empty())
        .map(|cookie| cookie.value().trim_matches('"').to_string())
}
