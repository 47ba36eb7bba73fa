//! Proof-token and session cookies.

use crate::config::Config;
use axum::http::HeaderMap;
use axum::http::header::COOKIE;

/// Attributes of one cookie, fixed at startup.
#[derive(Debug, Clone)]
pub struct CookieSettings {
    name: String,
    domain: Option<String>,
    secure: bool,
    http_only: bool,
    same_site: Option<&'static str>,
    max_age_seconds: i64,
}

impl CookieSettings {
    /// The cookie carrying the proof token.
    pub fn proof_token(config: &Config) -> Self {
        Self {
            name: config.cookie.name.clone(),
            domain: config.cookie.domain.clone(),
            secure: config.cookie.secure,
            http_only: config.cookie.http_only,
            same_site: config.cookie.same_site.as_deref().and_then(same_site),
            max_age_seconds: config.cookie_max_age().num_seconds(),
        }
    }

    /// The cookie carrying the login-attempt session id.
    pub fn session(config: &Config) -> Self {
        Self {
            name: config.session.name.clone(),
            domain: config.cookie.domain.clone(),
            secure: config.cookie.secure,
            http_only: true,
            // must survive the top-level redirect back from the provider
            same_site: Some("Lax"),
            max_age_seconds: i64::try_from(config.session.max_age_seconds).unwrap_or(i64::MAX),
        }
    }

    /// `Set-Cookie` value storing `value`.
    pub fn set(&self, value: &str) -> String {
        self.render(value, self.max_age_seconds)
    }

    /// `Set-Cookie` value that removes the cookie.
    pub fn clear(&self) -> String {
        self.render("", 0)
    }

    fn render(&self, value: &str, max_age: i64) -> String {
        let mut cookie = format!("{}={}; Path=/; Max-Age={}", self.name, value, max_age);
        if let Some(domain) = &self.domain {
            cookie.push_str("; Domain=");
            cookie.push_str(domain);
        }
        if self.http_only {
            cookie.push_str("; HttpOnly");
        }
        if self.secure {
            cookie.push_str("; Secure");
        }
        if let Some(same_site) = self.same_site {
            cookie.push_str("; SameSite=");
            cookie.push_str(same_site);
        }
        cookie
    }

    /// The non-empty value of this cookie in the request, if any.
    pub fn read(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|header| cookie_from_header(header, &self.name))
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }
}

fn same_site(value: &str) -> Option<&'static str> {
    match value.to_ascii_lowercase().as_str() {
        "strict" => Some("Strict"),
        "lax" => Some("Lax"),
        "none" => Some("None"),
        _ => None,
    }
}

fn cookie_from_header<'a>(cookie_header: &'a str, cookie_name: &str) -> Option<&'a str> {
    cookie_header.split(';').map(str::trim).find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        if name.trim() == cookie_name {
            Some(value.trim())
        } else {
            None
        }
    })
}
