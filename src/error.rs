//! Error types shared by discovery, transport and retrieval.

use hyper::StatusCode;
use thiserror::Error;

/// Boxed error used for transport and parse sources.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by the CardDAV puller.
///
/// Every variant is fatal for the operation that produced it; nothing is
/// retried automatically.
#[derive(Debug, Error)]
pub enum Error {
    /// No host was given and none could be derived from the username.
    #[error("could not derive a host from username {username:?}")]
    DomainParse { username: String },

    /// A discovery stage could not produce its result.
    #[error("discovery failed: {0}")]
    Discovery(String),

    /// A DNS query failed for a reason other than "no such record".
    #[error("DNS lookup for {name} failed")]
    Dns {
        name: String,
        #[source]
        source: BoxError,
    },

    /// Connection, TLS, request or timeout failure.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The server answered with a non-success status.
    #[error("{method} {url} failed with {status}")]
    Status {
        method: String,
        url: String,
        status: StatusCode,
    },

    /// Malformed XML or undecodable contact text.
    #[error("parse error: {message}")]
    Parse {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// A URL could not be parsed or joined.
    #[error("invalid URL {url:?}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

impl Error {
    pub(crate) fn transport(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Error::Transport {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub(crate) fn dns(name: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Error::Dns {
            name: name.into(),
            source: source.into(),
        }
    }

    pub(crate) fn parse(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Error::Parse {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub(crate) fn url(url: impl Into<String>, source: url::ParseError) -> Self {
        Error::Url {
            url: url.into(),
            source,
        }
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::parse("XML parsing error", err)
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
