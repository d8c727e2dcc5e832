use std::fmt;

use url::Url;

use crate::discovery::bootstrap::Protocol;
use crate::error::{Error, Result};

/// WebDAV Depth
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Depth {
    Zero,
    One,
    Infinity,
}
impl Depth {
    pub fn as_str(self) -> &'static str {
        match self {
            Depth::Zero => "0",
            Depth::One => "1",
            Depth::Infinity => "infinity",
        }
    }
}

/// `(host, port)` pair identifying one pooled connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Authority {
    pub host: String,
    pub port: u16,
}

impl Authority {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Authority and protocol of an absolute `http(s)` URL, with the scheme's
    /// default port filled in.
    pub fn from_url(url: &Url) -> Result<(Protocol, Self)> {
        let protocol = Protocol::from_scheme(url.scheme()).ok_or_else(|| Error::Transport {
            message: format!("unsupported URL scheme in {url}"),
            source: None,
        })?;
        let host = url.host_str().ok_or_else(|| Error::Transport {
            message: format!("URL has no host: {url}"),
            source: None,
        })?;
        let port = url
            .port_or_known_default()
            .unwrap_or(protocol.default_port());
        Ok((protocol, Self::new(host, port)))
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') && !self.host.starts_with('[') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
