//! Observability hook.
//!
//! Discovery and protocol code never log directly; they hand [`PullEvent`]s to an
//! [`EventSink`]. The default [`TracingSink`] forwards them to `tracing`.

use hyper::StatusCode;
use url::Url;

use crate::discovery::bootstrap::DiscoveryMethod;

/// Something noteworthy happened while discovering or pulling.
#[derive(Debug, Clone)]
pub enum PullEvent {
    FqdnDetermined {
        host: String,
        port: u16,
        method: DiscoveryMethod,
    },
    /// A DNS query failed; discovery continues as if nothing was found.
    DnsLookupFailed {
        name: String,
        record_type: &'static str,
        error: String,
    },
    ContextPathDetermined {
        path: String,
    },
    /// A context path advertised over DNS did not answer a `Depth: 0` `PROPFIND`.
    ContextPathRejected {
        url: Url,
        error: String,
    },
    PrincipalDetermined {
        url: Url,
    },
    HomeSetDetermined {
        url: Url,
    },
    /// The platform certificate store could not be loaded; the bundled
    /// WebPKI roots are used instead.
    NativeRootsUnavailable {
        error: String,
    },
    ConnectionOpened {
        host: String,
        port: u16,
    },
    /// A pooled connection was dropped so the next request opens a new one.
    ConnectionDiscarded {
        host: String,
        port: u16,
        reason: String,
    },
    ConnectionClosed {
        host: String,
        port: u16,
        error: String,
    },
    RequestSent {
        method: String,
        url: Url,
    },
    ResponseReceived {
        method: String,
        url: Url,
        status: StatusCode,
        bytes: usize,
    },
    CardsListed {
        count: usize,
    },
    /// The decoder rejected the address data at `index` in the multiget response.
    CardDecodeFailed {
        index: usize,
        error: String,
    },
}

/// Receiver for [`PullEvent`]s.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &PullEvent);
}

/// Default sink: emits each event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: &PullEvent) {
        match event {
            PullEvent::FqdnDetermined { host, port, method } => {
                tracing::info!(%host, port, method = ?method, "determined server location");
            }
            PullEvent::DnsLookupFailed {
                name,
                record_type,
                error,
            } => {
                tracing::debug!(%name, record_type, %error, "DNS lookup failed");
            }
            PullEvent::ContextPathDetermined { path } => {
                tracing::info!(%path, "determined initial context path");
            }
            PullEvent::ContextPathRejected { url, error } => {
                tracing::debug!(%url, %error, "advertised context path rejected");
            }
            PullEvent::PrincipalDetermined { url } => {
                tracing::info!(%url, "determined principal URL");
            }
            PullEvent::HomeSetDetermined { url } => {
                tracing::info!(%url, "determined addressbook home set");
            }
            PullEvent::NativeRootsUnavailable { error } => {
                tracing::debug!(%error, "native roots unavailable, falling back to webpki roots");
            }
            PullEvent::ConnectionOpened { host, port } => {
                tracing::debug!(%host, port, "opened persistent connection");
            }
            PullEvent::ConnectionDiscarded { host, port, reason } => {
                tracing::debug!(%host, port, %reason, "discarded pooled connection");
            }
            PullEvent::ConnectionClosed { host, port, error } => {
                tracing::debug!(%host, port, %error, "connection closed with error");
            }
            PullEvent::RequestSent { method, url } => {
                tracing::debug!(%method, %url, "sending request");
            }
            PullEvent::ResponseReceived {
                method,
                url,
                status,
                bytes,
            } => {
                tracing::debug!(%method, %url, %status, bytes, "received response");
            }
            PullEvent::CardsListed { count } => {
                tracing::debug!(count, "listed address objects");
            }
            PullEvent::CardDecodeFailed { index, error } => {
                tracing::warn!(index, %error, "skipping undecodable address data");
            }
        }
    }
}

impl<F> EventSink for F
where
    F: Fn(&PullEvent) + Send + Sync,
{
    fn record(&self, event: &PullEvent) {
        (self)(event)
    }
}
