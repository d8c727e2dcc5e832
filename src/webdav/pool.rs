//! One persistent HTTP/1.1 connection per `(host, port)`.

use std::collections::HashMap;
use std::future::poll_fn;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::Uri;
use hyper::client::conn::http1::{self, SendRequest};
use tokio::task::JoinHandle;
use tower::Service;

use crate::common::events::{EventSink, PullEvent};
use crate::common::http::{DavConnector, build_connector};
use crate::discovery::bootstrap::Protocol;
use crate::error::{Error, Result};
use crate::webdav::types::Authority;

struct PooledConnection {
    sender: SendRequest<Full<Bytes>>,
    driver: JoinHandle<()>,
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Lazily opened, reused connections keyed by [`Authority`].
///
/// Connections live as long as the pool. Dropping the pool closes them.
pub struct ConnectionPool {
    connector: DavConnector,
    connections: HashMap<Authority, PooledConnection>,
    events: Arc<dyn EventSink>,
}

impl ConnectionPool {
    pub fn new(events: Arc<dyn EventSink>) -> Self {
        Self {
            connector: build_connector(events.as_ref()),
            connections: HashMap::new(),
            events,
        }
    }

    /// Number of authorities with an open connection.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Get a ready connection to `authority`, opening one on first use.
    ///
    /// A cached connection that the server closed, or that cannot take another
    /// request, is replaced by a fresh one. Nothing has been sent on it at that
    /// point, so replacing it never repeats a request.
    pub async fn acquire(
        &mut self,
        protocol: Protocol,
        authority: &Authority,
    ) -> Result<&mut SendRequest<Full<Bytes>>> {
        let stale = match self.connections.get_mut(authority) {
            None => None,
            Some(conn) if conn.sender.is_closed() => Some("closed by server".to_string()),
            Some(conn) => conn.sender.ready().await.err().map(|err| err.to_string()),
        };

        match stale {
            Some(reason) => {
                self.discard(authority, reason);
                self.open(protocol, authority).await?;
            }
            None if !self.connections.contains_key(authority) => {
                self.open(protocol, authority).await?;
            }
            None => {}
        }

        self.connections
            .get_mut(authority)
            .map(|conn| &mut conn.sender)
            .ok_or_else(|| Error::Transport {
                message: format!("no connection for {authority}"),
                source: None,
            })
    }

    /// Drop the connection to `authority`, if any. The next
    /// [`acquire`](Self::acquire) opens a new one.
    pub fn discard(&mut self, authority: &Authority, reason: impl Into<String>) {
        if self.connections.remove(authority).is_some() {
            self.events.record(&PullEvent::ConnectionDiscarded {
                host: authority.host.clone(),
                port: authority.port,
                reason: reason.into(),
            });
        }
    }

    async fn open(&mut self, protocol: Protocol, authority: &Authority) -> Result<()> {
        let mut conn = self.connect(protocol, authority).await?;
        conn.sender
            .ready()
            .await
            .map_err(|err| Error::transport(format!("connection to {authority} failed"), err))?;
        self.connections.insert(authority.clone(), conn);
        Ok(())
    }

    async fn connect(&self, protocol: Protocol, authority: &Authority) -> Result<PooledConnection> {
        let uri: Uri = format!("{}://{}", protocol.scheme(), authority)
            .parse()
            .map_err(|err| Error::transport(format!("invalid authority {authority}"), err))?;

        let mut connector = self.connector.clone();
        poll_fn(|cx| connector.poll_ready(cx))
            .await
            .map_err(|err| Error::Transport {
                message: format!("connector not ready for {authority}"),
                source: Some(err),
            })?;
        let stream = connector.call(uri).await.map_err(|err| Error::Transport {
            message: format!("failed to connect to {authority}"),
            source: Some(err),
        })?;

        let (sender, conn) = http1::handshake(stream)
            .await
            .map_err(|err| Error::transport(format!("HTTP handshake with {authority} failed"), err))?;
        let events = self.events.clone();
        let (host, port) = (authority.host.clone(), authority.port);
        let driver = tokio::spawn(async move {
            if let Err(err) = conn.await {
                events.record(&PullEvent::ConnectionClosed {
                    host,
                    port,
                    error: err.to_string(),
                });
            }
        });

        self.events.record(&PullEvent::ConnectionOpened {
            host: authority.host.clone(),
            port: authority.port,
        });

        Ok(PooledConnection { sender, driver })
    }
}
