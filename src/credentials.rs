use std::fmt;

use crate::error::{Error, Result};

/// Account credentials plus the host discovery starts from.
///
/// When no explicit host is given it is taken from the domain part of the
/// username, so `alice@example.com` discovers against `example.com`.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
    host: String,
}

impl Credentials {
    /// Build credentials, deriving the host from `username` when `host` is
    /// `None` or empty. A non-empty host is kept verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DomainParse`] when a host has to be derived and the
    /// username carries no usable domain.
    ///
    /// # Example
    /// ```
    /// use carddav_pull::Credentials;
    ///
    /// let creds = Credentials::new("alice@example.com", "secret", None).unwrap();
    /// assert_eq!(creds.host(), "example.com");
    ///
    /// let creds = Credentials::new("alice", "secret", Some("dav.example.org")).unwrap();
    /// assert_eq!(creds.host(), "dav.example.org");
    /// ```
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        host: Option<&str>,
    ) -> Result<Self> {
        let username = username.into();
        let host = match host.filter(|h| !h.is_empty()) {
            Some(explicit) => explicit.to_string(),
            None => domain_from_username(&username).ok_or_else(|| Error::DomainParse {
                username: username.clone(),
            })?,
        };

        Ok(Self {
            username,
            password: password.into(),
            host,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .finish()
    }
}

/// Extract the domain of an email-style address.
///
/// Accepts a bare `local@domain` or the `Display Name <local@domain>` form.
pub fn domain_from_username(username: &str) -> Option<String> {
    let mut address = username.trim();
    if let Some(open) = address.rfind('<') {
        let rest = &address[open + 1..];
        address = rest.strip_suffix('>').unwrap_or(rest).trim();
    }

    let (local, domain) = address.rsplit_once('@')?;
    let domain = domain.trim();
    if local.trim().is_empty()
        || domain.is_empty()
        || domain.starts_with('.')
        || domain.ends_with('.')
        || domain.chars().any(|c| c.is_whitespace() || matches!(c, '@' | '<' | '>' | '/'))
    {
        return None;
    }
    Some(domain.to_string())
}
