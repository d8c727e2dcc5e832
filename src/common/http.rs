use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;

use crate::common::events::{EventSink, PullEvent};

/// Connector used by the connection pool: plain TCP for `http`, rustls for `https`.
pub type DavConnector = HttpsConnector<HttpConnector>;

/// Build the TLS connector. Certificates are always verified; native roots are
/// preferred with a fallback to the bundled WebPKI store.
pub fn build_connector(events: &dyn EventSink) -> DavConnector {
    let https_builder = HttpsConnectorBuilder::new()
        .with_native_roots()
        .unwrap_or_else(|err| {
            events.record(&PullEvent::NativeRootsUnavailable {
                error: err.to_string(),
            });
            HttpsConnectorBuilder::new().with_webpki_roots()
        });

    https_builder.https_or_http().enable_http1().build()
}
