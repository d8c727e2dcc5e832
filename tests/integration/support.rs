use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_compression::tokio::bufread::GzipEncoder;
use bytes::Bytes;
use carddav_pull::{
    CardDavPuller, Credentials, EventSink, PullEvent, PullOptions, ServiceRecord, ServiceResolver,
};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const USERNAME: &str = "alice@example.com";
pub const PASSWORD: &str = "secret";

/// A request as seen by the mock server.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn depth(&self) -> Option<&str> {
        self.header("depth")
    }

    /// Hrefs embedded in a multiget body.
    pub fn hrefs(&self) -> Vec<String> {
        self.body
            .split("<D:href>")
            .skip(1)
            .filter_map(|chunk| chunk.split_once("</D:href>"))
            .map(|(href, _)| href.replace("&amp;", "&"))
            .collect()
    }
}

pub struct MockResponse {
    status: StatusCode,
    headers: Vec<(&'static str, String)>,
    body: Vec<u8>,
    gzip: bool,
    delay: Option<Duration>,
}

impl MockResponse {
    pub fn status(status: u16) -> Self {
        Self {
            status: StatusCode::from_u16(status).expect("valid status"),
            headers: Vec::new(),
            body: Vec::new(),
            gzip: false,
            delay: None,
        }
    }

    pub fn multistatus(xml: String) -> Self {
        let mut resp = Self::status(207);
        resp.headers
            .push(("content-type", "application/xml; charset=utf-8".to_string()));
        resp.body = xml.into_bytes();
        resp
    }

    pub fn redirect(status: u16, location: &str) -> Self {
        let mut resp = Self::status(status);
        resp.headers.push(("location", location.to_string()));
        resp
    }

    pub fn gzipped(mut self) -> Self {
        self.gzip = true;
        self
    }

    /// Hold the response back for `delay`.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn closing(mut self) -> Self {
        self.headers.push(("connection", "close".to_string()));
        self
    }
}

type Handler = dyn Fn(&RecordedRequest) -> MockResponse + Send + Sync;

struct ServerState {
    handler: Box<Handler>,
    requests: Mutex<Vec<RecordedRequest>>,
    connections: AtomicUsize,
}

/// HTTP/1.1 server on an ephemeral localhost port.
pub struct MockServer {
    pub addr: SocketAddr,
    state: Arc<ServerState>,
    task: JoinHandle<()>,
}

impl MockServer {
    pub async fn start<F>(handler: F) -> Result<Self>
    where
        F: Fn(&RecordedRequest) -> MockResponse + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(ServerState {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
            connections: AtomicUsize::new(0),
        });

        let accept_state = state.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accept_state.connections.fetch_add(1, Ordering::SeqCst);
                let conn_state = accept_state.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| handle(req, conn_state.clone()));
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Ok(Self { addr, state, task })
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    /// `(method, path)` of every request so far.
    pub fn request_lines(&self) -> Vec<(String, String)> {
        self.requests()
            .into_iter()
            .map(|r| (r.method, r.path))
            .collect()
    }

    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handle(
    req: Request<Incoming>,
    state: Arc<ServerState>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().to_string();
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_default();
    let headers = req
        .headers()
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_ascii_lowercase(),
                v.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    let body = req
        .into_body()
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .unwrap_or_default();

    let recorded = RecordedRequest {
        method,
        path,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    };
    let mock = (state.handler)(&recorded);
    state.requests.lock().unwrap().push(recorded);

    if let Some(delay) = mock.delay {
        tokio::time::sleep(delay).await;
    }

    let mut body = mock.body;
    let mut builder = Response::builder().status(mock.status);
    for (name, value) in &mock.headers {
        builder = builder.header(*name, value);
    }
    if mock.gzip {
        let mut encoded = Vec::new();
        GzipEncoder::new(body.as_slice())
            .read_to_end(&mut encoded)
            .await
            .expect("gzip in memory");
        body = encoded;
        builder = builder.header("content-encoding", "gzip");
    }
    Ok(builder.body(Full::new(Bytes::from(body))).expect("valid response"))
}

/// DNS answers served from memory.
#[derive(Default, Clone)]
pub struct StaticResolver {
    srv: HashMap<String, Vec<ServiceRecord>>,
    txt: HashMap<String, Vec<String>>,
}

impl StaticResolver {
    /// `_carddav._tcp.example.com` pointing at the mock server.
    pub fn pointing_at(server: &MockServer) -> Self {
        Self::insecure_srv(server.port())
    }

    /// `_carddav._tcp.example.com` pointing at `127.0.0.1:port`.
    pub fn insecure_srv(port: u16) -> Self {
        let mut resolver = Self::default();
        resolver.srv.insert(
            "_carddav._tcp.example.com".to_string(),
            vec![ServiceRecord {
                target: "127.0.0.1".to_string(),
                port,
                priority: 0,
                weight: 0,
            }],
        );
        resolver
    }

    pub fn with_txt_path(mut self, path: &str) -> Self {
        self.txt.insert(
            "_carddav._tcp.example.com".to_string(),
            vec![format!("txtvers=1; path={path}")],
        );
        self
    }
}

impl ServiceResolver for StaticResolver {
    async fn lookup_srv(&self, name: &str) -> carddav_pull::Result<Vec<ServiceRecord>> {
        Ok(self.srv.get(name).cloned().unwrap_or_default())
    }

    async fn lookup_txt(&self, name: &str) -> carddav_pull::Result<Vec<String>> {
        Ok(self.txt.get(name).cloned().unwrap_or_default())
    }
}

/// Collects every event for later inspection.
#[derive(Default, Clone)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<PullEvent>>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<PullEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn record(&self, event: &PullEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

pub fn insecure_options() -> PullOptions {
    PullOptions::default().allow_insecure_connections(true)
}

pub fn puller(resolver: StaticResolver, options: PullOptions) -> CardDavPuller<StaticResolver> {
    let creds = Credentials::new(USERNAME, PASSWORD, None).expect("host derivable");
    CardDavPuller::with_parts(creds, options, resolver, carddav_pull::BasicVCardDecoder)
        .expect("puller builds")
}

pub fn principal_xml(href: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<d:multistatus xmlns:d="DAV:">
  <d:response>
    <d:href>/.well-known/carddav/</d:href>
    <d:propstat>
      <d:prop>
        <d:current-user-principal><d:href>{href}</d:href></d:current-user-principal>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>"#
    )
}

pub fn home_set_xml(href: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<d:multistatus xmlns:d="DAV:" xmlns:card="urn:ietf:params:xml:ns:carddav">
  <d:response>
    <d:href>/principals/alice/</d:href>
    <d:propstat>
      <d:prop>
        <card:addressbook-home-set><d:href>{href}</d:href></card:addressbook-home-set>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>"#
    )
}

pub fn empty_prop_xml() -> String {
    r#"<d:multistatus xmlns:d="DAV:">
  <d:response>
    <d:href>/</d:href>
    <d:propstat><d:prop/><d:status>HTTP/1.1 404 Not Found</d:status></d:propstat>
  </d:response>
</d:multistatus>"#
        .to_string()
}

pub fn listing_xml(collection: &str, cards: &[&str]) -> String {
    let mut xml = format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<d:multistatus xmlns:d="DAV:" xmlns:card="urn:ietf:params:xml:ns:carddav">
  <d:response>
    <d:href>{collection}</d:href>
    <d:propstat>
      <d:prop><d:resourcetype><d:collection/><card:addressbook/></d:resourcetype></d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>"#
    );
    for card in cards {
        xml.push_str(&format!(
            r#"
  <d:response>
    <d:href>{collection}{card}</d:href>
    <d:propstat>
      <d:prop><d:resourcetype/></d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>"#
        ));
    }
    xml.push_str("\n</d:multistatus>");
    xml
}

/// Multiget answer with one card per requested href; `FN` is the file stem.
pub fn multiget_xml(hrefs: &[String]) -> String {
    let entries: Vec<(String, String)> = hrefs
        .iter()
        .map(|href| {
            let stem = href
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .trim_end_matches(".vcf")
                .to_string();
            (
                href.clone(),
                format!("BEGIN:VCARD\r\nVERSION:3.0\r\nFN:{stem}\r\nEND:VCARD\r\n"),
            )
        })
        .collect();
    multiget_xml_with(&entries)
}

/// Multiget answer with explicit `(href, address-data)` pairs.
pub fn multiget_xml_with(entries: &[(String, String)]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="utf-8"?>
<d:multistatus xmlns:d="DAV:" xmlns:card="urn:ietf:params:xml:ns:carddav">"#,
    );
    for (href, data) in entries {
        let href = href.replace('&', "&amp;");
        xml.push_str(&format!(
            r#"
  <d:response>
    <d:href>{href}</d:href>
    <d:propstat>
      <d:prop><card:address-data><![CDATA[{data}]]></card:address-data></d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>"#
        ));
    }
    xml.push_str("\n</d:multistatus>");
    xml
}

pub const COLLECTION: &str = "/addressbooks/alice/card/";

/// A well-behaved server: well-known path -> principal -> home set -> two cards.
pub fn standard_routes(req: &RecordedRequest) -> MockResponse {
    match (req.method.as_str(), req.path.as_str()) {
        ("PROPFIND", "/.well-known/carddav/") => {
            MockResponse::multistatus(principal_xml("/principals/alice/"))
        }
        ("PROPFIND", "/principals/alice/") => {
            MockResponse::multistatus(home_set_xml("/addressbooks/alice/"))
        }
        ("PROPFIND", COLLECTION) => {
            MockResponse::multistatus(listing_xml(COLLECTION, &["bob.vcf", "carol.vcf"]))
        }
        ("REPORT", COLLECTION) => MockResponse::multistatus(multiget_xml(&req.hrefs())),
        _ => MockResponse::status(404),
    }
}
