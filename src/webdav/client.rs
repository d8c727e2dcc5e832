use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{HeaderMap, Method, Request, Response, StatusCode, header};
use tokio::time::{Duration, timeout};
use url::{Position, Url};

use crate::common::compression::{add_accept_encoding, decompress_body, detect_encodings};
use crate::common::events::{EventSink, PullEvent};
use crate::common::options::PullOptions;
use crate::credentials::Credentials;
use crate::error::{Error, Result};
use crate::webdav::multistatus::Multistatus;
use crate::webdav::pool::ConnectionPool;
use crate::webdav::types::{Authority, Depth};

const XML_CONTENT_TYPE: &str = r#"text/xml; charset="UTF-8""#;

/// WebDAV protocol client over pooled keep-alive connections.
///
/// Every request carries Basic credentials and `Connection: keep-alive`.
/// Requests are issued one at a time; the client needs `&mut self` because it
/// owns the connection pool.
pub struct WebDavClient {
    pool: ConnectionPool,
    auth_header: header::HeaderValue,
    timeout: Duration,
    max_redirects: usize,
    events: Arc<dyn EventSink>,
}

impl WebDavClient {
    pub fn new(
        credentials: &Credentials,
        options: &PullOptions,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let token = format!("{}:{}", credentials.username(), credentials.password());
        let mut auth_header = header::HeaderValue::from_str(&format!("Basic {}", B64.encode(token)))
            .map_err(|err| Error::transport("credentials cannot be sent as a header", err))?;
        auth_header.set_sensitive(true);

        Ok(Self {
            pool: ConnectionPool::new(events.clone()),
            auth_header,
            timeout: options.timeout,
            max_redirects: options.max_redirects,
            events,
        })
    }

    /// Number of currently pooled connections.
    pub fn open_connections(&self) -> usize {
        self.pool.len()
    }

    /// Generic send: follows redirects and returns the final, decompressed
    /// response without judging its status.
    pub async fn send(
        &mut self,
        method: Method,
        url: &Url,
        headers: HeaderMap,
        body: Option<Bytes>,
    ) -> Result<Response<Bytes>> {
        let (_, response) = self.execute(method, url, headers, body).await?;
        Ok(response)
    }

    /// Send a `GET` request and return the aggregated body.
    pub async fn get(&mut self, url: &Url) -> Result<Response<Bytes>> {
        self.send(Method::GET, url, HeaderMap::new(), None).await
    }

    /// Send a WebDAV `PROPFIND` and parse the multistatus answer.
    pub async fn propfind(&mut self, url: &Url, depth: Depth, xml_body: &str) -> Result<Multistatus> {
        self.xml_request(b"PROPFIND", url, depth, xml_body).await
    }

    /// Send a WebDAV `REPORT` and parse the multistatus answer.
    pub async fn report(&mut self, url: &Url, depth: Depth, xml_body: &str) -> Result<Multistatus> {
        self.xml_request(b"REPORT", url, depth, xml_body).await
    }

    async fn xml_request(
        &mut self,
        method: &'static [u8],
        url: &Url,
        depth: Depth,
        xml_body: &str,
    ) -> Result<Multistatus> {
        let method =
            Method::from_bytes(method).map_err(|err| Error::transport("invalid method", err))?;
        let mut h = HeaderMap::new();
        h.insert("Depth", header::HeaderValue::from_static(depth.as_str()));
        h.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static(XML_CONTENT_TYPE),
        );

        let (final_url, resp) = self
            .execute(method.clone(), url, h, Some(Bytes::from(xml_body.to_owned())))
            .await?;
        if !resp.status().is_success() {
            return Err(Error::Status {
                method: method.to_string(),
                url: final_url.to_string(),
                status: resp.status(),
            });
        }
        Multistatus::parse(final_url, resp.body())
    }

    async fn execute(
        &mut self,
        method: Method,
        url: &Url,
        headers: HeaderMap,
        body: Option<Bytes>,
    ) -> Result<(Url, Response<Bytes>)> {
        let mut current = url.clone();
        let mut hops = 0;

        loop {
            let resp = self
                .send_once(method.clone(), &current, headers.clone(), body.clone())
                .await?;

            let Some(location) = redirect_location(&resp) else {
                break Ok((current, resp));
            };
            if hops >= self.max_redirects {
                break Err(Error::Transport {
                    message: format!("too many redirects, last hop was {current}"),
                    source: None,
                });
            }
            hops += 1;
            current = current
                .join(&location)
                .map_err(|err| Error::url(location.clone(), err))?;
        }
    }

    async fn send_once(
        &mut self,
        method: Method,
        url: &Url,
        mut headers: HeaderMap,
        body: Option<Bytes>,
    ) -> Result<Response<Bytes>> {
        let (protocol, authority) = Authority::from_url(url)?;
        add_accept_encoding(&mut headers);

        let mut req_builder = Request::builder()
            .method(method.clone())
            .uri(&url[Position::BeforePath..Position::AfterQuery])
            .header(header::HOST, &url[Position::BeforeHost..Position::AfterPort])
            .header(header::AUTHORIZATION, self.auth_header.clone())
            .header(header::CONNECTION, "keep-alive");

        if body.is_some() && !headers.contains_key(header::CONTENT_TYPE) {
            req_builder = req_builder.header(
                header::CONTENT_TYPE,
                header::HeaderValue::from_static(XML_CONTENT_TYPE),
            );
        }
        for (k, v) in headers.iter() {
            req_builder = req_builder.header(k, v);
        }

        let req = req_builder
            .body(Full::new(body.unwrap_or_default()))
            .map_err(|err| Error::transport(format!("invalid request for {url}"), err))?;

        self.events.record(&PullEvent::RequestSent {
            method: method.to_string(),
            url: url.clone(),
        });

        let pool = &mut self.pool;
        let target = &authority;
        let exchange = async move {
            let sender = pool.acquire(protocol, target).await?;
            let resp = sender
                .send_request(req)
                .await
                .map_err(|err| Error::transport(format!("request to {target} failed"), err))?;

            let encodings = detect_encodings(resp.headers());
            let (mut parts, body) = resp.into_parts();
            let decompressed = decompress_body(body, &encodings).await?;
            if !encodings.is_empty() {
                parts.headers.remove(header::CONTENT_ENCODING);
                parts.headers.insert(header::CONTENT_LENGTH, decompressed.len().into());
            }
            Ok::<_, Error>(Response::from_parts(parts, decompressed))
        };

        let outcome = timeout(self.timeout, exchange).await;
        let resp = match outcome {
            Ok(result) => result?,
            Err(_) => {
                // the abandoned exchange may still own the connection
                self.pool.discard(&authority, "request timed out");
                return Err(Error::Transport {
                    message: format!("{method} {url} timed out"),
                    source: None,
                });
            }
        };

        self.events.record(&PullEvent::ResponseReceived {
            method: method.to_string(),
            url: url.clone(),
            status: resp.status(),
            bytes: resp.body().len(),
        });
        Ok(resp)
    }
}

fn redirect_location(resp: &Response<Bytes>) -> Option<String> {
    if !matches!(
        resp.status(),
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    ) {
        return None;
    }
    resp.headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
