//! Four-stage bootstrap from credentials to the addressbook home set.
//!
//! ```text
//! Start -> FqdnDetermined -> ContextPathDetermined -> PrincipalDetermined -> HomeSetDetermined
//! ```
//!
//! Each call to [`Bootstrap::advance`] performs exactly one transition and
//! returns a new immutable [`DiscoveryState`]; earlier fields are never
//! recomputed.

use std::fmt;

use url::Url;

use crate::common::events::{EventSink, PullEvent};
use crate::common::options::{ContextPathCheck, PullOptions};
use crate::credentials::Credentials;
use crate::discovery::dns::{
    DiscoverableService, ServiceResolver, context_path_from_txt, sort_service_records,
};
use crate::error::{Error, Result};
use crate::webdav::client::WebDavClient;
use crate::webdav::types::{Authority, Depth};
use crate::webdav::xml::{
    build_home_set_propfind_body, build_principal_propfind_body, build_probe_propfind_body,
};

/// Context path used whenever DNS does not advertise one (RFC 6764 section 5).
pub const WELL_KNOWN_PATH: &str = "/.well-known/carddav/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn scheme(self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Protocol::Http => 80,
            Protocol::Https => 443,
        }
    }

    pub fn from_scheme(scheme: &str) -> Option<Self> {
        if scheme.eq_ignore_ascii_case("https") {
            Some(Protocol::Https)
        } else if scheme.eq_ignore_ascii_case("http") {
            Some(Protocol::Http)
        } else {
            None
        }
    }
}

/// How the server location was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMethod {
    /// No SRV record: `https://<credentials host>:443`.
    Heuristic,
    Srv,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerLocation {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    pub discovery_method: DiscoveryMethod,
}

impl ServerLocation {
    /// Fallback when DNS advertises nothing.
    pub fn heuristic(host: &str) -> Self {
        Self {
            protocol: Protocol::Https,
            host: host.to_string(),
            port: 443,
            discovery_method: DiscoveryMethod::Heuristic,
        }
    }

    /// `<protocol>://<host>:<port>` joined with `path`.
    pub fn url_with_path(&self, path: &str) -> Result<Url> {
        let authority = Authority::new(self.host.as_str(), self.port);
        let origin = format!("{}://{}/", self.protocol.scheme(), authority);
        let base = Url::parse(&origin).map_err(|err| Error::url(origin.clone(), err))?;
        base.join(path).map_err(|err| Error::url(path, err))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BootstrapStage {
    Start,
    FqdnDetermined,
    ContextPathDetermined,
    PrincipalDetermined,
    HomeSetDetermined,
}

impl fmt::Display for BootstrapStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BootstrapStage::Start => "start",
            BootstrapStage::FqdnDetermined => "server location",
            BootstrapStage::ContextPathDetermined => "context path",
            BootstrapStage::PrincipalDetermined => "principal URL",
            BootstrapStage::HomeSetDetermined => "addressbook home set",
        };
        f.write_str(name)
    }
}

/// Snapshot of what discovery has established so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryState {
    location: Option<ServerLocation>,
    initial_context_path: Option<String>,
    principal_url: Option<Url>,
    addressbook_home_set_url: Option<Url>,
}

impl DiscoveryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> BootstrapStage {
        if self.addressbook_home_set_url.is_some() {
            BootstrapStage::HomeSetDetermined
        } else if self.principal_url.is_some() {
            BootstrapStage::PrincipalDetermined
        } else if self.initial_context_path.is_some() {
            BootstrapStage::ContextPathDetermined
        } else if self.location.is_some() {
            BootstrapStage::FqdnDetermined
        } else {
            BootstrapStage::Start
        }
    }

    pub fn location(&self) -> Option<&ServerLocation> {
        self.location.as_ref()
    }

    pub fn initial_context_path(&self) -> Option<&str> {
        self.initial_context_path.as_deref()
    }

    pub fn principal_url(&self) -> Option<&Url> {
        self.principal_url.as_ref()
    }

    /// The resolved base URL for addressbook operations, once discovery is complete.
    pub fn addressbook_home_set_url(&self) -> Option<&Url> {
        self.addressbook_home_set_url.as_ref()
    }

    fn with_location(&self, location: ServerLocation) -> Self {
        Self {
            location: Some(location),
            ..self.clone()
        }
    }

    fn with_context_path(&self, path: String) -> Self {
        Self {
            initial_context_path: Some(path),
            ..self.clone()
        }
    }

    fn with_principal_url(&self, url: Url) -> Self {
        Self {
            principal_url: Some(url),
            ..self.clone()
        }
    }

    fn with_home_set_url(&self, url: Url) -> Self {
        Self {
            addressbook_home_set_url: Some(url),
            ..self.clone()
        }
    }
}

/// Probe SRV records for the CardDAV services of `host`.
///
/// The first service with a usable record wins and its best-ordered record is
/// used. A target of `.` (service explicitly unavailable) is not usable. A
/// failed lookup is reported to `events` and counts as no record. Falls back to
/// [`ServerLocation::heuristic`]; never fails.
pub async fn determine_server_location<R: ServiceResolver>(
    resolver: &R,
    host: &str,
    allow_insecure: bool,
    events: &dyn EventSink,
) -> ServerLocation {
    for service in DiscoverableService::probe_order(allow_insecure) {
        let name = service.service_name(host);
        let lookup = resolver.lookup_srv(&name).await;
        let mut records = found_or_reported(lookup, &name, "SRV", events);
        records.retain(|r| !r.target.is_empty() && r.target != ".");
        sort_service_records(&mut records);

        if let Some(best) = records.into_iter().next() {
            return ServerLocation {
                protocol: service.protocol(),
                host: best.target.trim_end_matches('.').to_string(),
                port: best.port,
                discovery_method: DiscoveryMethod::Srv,
            };
        }
    }
    ServerLocation::heuristic(host)
}

fn found_or_reported<T>(
    lookup: Result<Vec<T>>,
    name: &str,
    record_type: &'static str,
    events: &dyn EventSink,
) -> Vec<T> {
    lookup.unwrap_or_else(|err| {
        events.record(&PullEvent::DnsLookupFailed {
            name: name.to_string(),
            record_type,
            error: err.to_string(),
        });
        Vec::new()
    })
}

/// Drives one [`DiscoveryState`] transition at a time.
pub struct Bootstrap<'a, R> {
    pub resolver: &'a R,
    pub client: &'a mut WebDavClient,
    pub credentials: &'a Credentials,
    pub options: &'a PullOptions,
    pub events: &'a dyn EventSink,
}

impl<R: ServiceResolver> Bootstrap<'_, R> {
    /// Run the remaining stages until the home set is known.
    ///
    /// `state` is replaced after every successful stage, so on error it holds
    /// everything established before the failing stage.
    pub async fn run(&mut self, state: &mut DiscoveryState) -> Result<Url> {
        loop {
            if let Some(home) = state.addressbook_home_set_url() {
                return Ok(home.clone());
            }
            *state = self.advance(state).await?;
        }
    }

    /// Perform the single transition out of `state.stage()`.
    pub async fn advance(&mut self, state: &DiscoveryState) -> Result<DiscoveryState> {
        match (
            &state.location,
            &state.initial_context_path,
            &state.principal_url,
            &state.addressbook_home_set_url,
        ) {
            (None, _, _, _) => {
                let location = determine_server_location(
                    self.resolver,
                    self.credentials.host(),
                    self.options.allow_insecure,
                    self.events,
                )
                .await;
                self.events.record(&PullEvent::FqdnDetermined {
                    host: location.host.clone(),
                    port: location.port,
                    method: location.discovery_method,
                });
                Ok(state.with_location(location))
            }
            (Some(location), None, _, _) => {
                let path = self.determine_context_path(location).await?;
                self.events
                    .record(&PullEvent::ContextPathDetermined { path: path.clone() });
                Ok(state.with_context_path(path))
            }
            (Some(location), Some(path), None, _) => {
                let principal = self.determine_principal_url(location, path).await?;
                self.events.record(&PullEvent::PrincipalDetermined {
                    url: principal.clone(),
                });
                Ok(state.with_principal_url(principal))
            }
            (Some(_), Some(_), Some(principal), None) => {
                let home = self.determine_home_set_url(principal).await?;
                self.events
                    .record(&PullEvent::HomeSetDetermined { url: home.clone() });
                Ok(state.with_home_set_url(home))
            }
            (Some(_), Some(_), Some(_), Some(_)) => Ok(state.clone()),
        }
    }

    async fn determine_context_path(&mut self, location: &ServerLocation) -> Result<String> {
        if location.discovery_method != DiscoveryMethod::Srv {
            return Ok(WELL_KNOWN_PATH.to_string());
        }

        let name = DiscoverableService::for_protocol(location.protocol)
            .service_name(self.credentials.host());
        let records =
            found_or_reported(self.resolver.lookup_txt(&name).await, &name, "TXT", self.events);
        let Some(path) = context_path_from_txt(&records) else {
            return Ok(WELL_KNOWN_PATH.to_string());
        };

        if self.context_path_exists(location, &path).await {
            Ok(path)
        } else {
            Ok(WELL_KNOWN_PATH.to_string())
        }
    }

    async fn context_path_exists(&mut self, location: &ServerLocation, path: &str) -> bool {
        match self.options.path_check {
            ContextPathCheck::Assume => true,
            ContextPathCheck::Probe => {
                let Ok(url) = location.url_with_path(path) else {
                    return false;
                };
                match self
                    .client
                    .propfind(&url, Depth::Zero, &build_probe_propfind_body())
                    .await
                {
                    Ok(_) => true,
                    Err(err) => {
                        self.events.record(&PullEvent::ContextPathRejected {
                            url,
                            error: err.to_string(),
                        });
                        false
                    }
                }
            }
        }
    }

    async fn determine_principal_url(
        &mut self,
        location: &ServerLocation,
        context_path: &str,
    ) -> Result<Url> {
        let url = location.url_with_path(context_path)?;
        let doc = self
            .client
            .propfind(&url, Depth::One, &build_principal_propfind_body())
            .await?;

        let href = doc
            .current_user_principal()
            .or_else(|| doc.principal_url())
            .ok_or_else(|| Error::Discovery("could not determine principal URL".to_string()))?;
        doc.resolve(href)
    }

    async fn determine_home_set_url(&mut self, principal: &Url) -> Result<Url> {
        let doc = self
            .client
            .propfind(principal, Depth::Zero, &build_home_set_propfind_body())
            .await?;

        let href = doc.addressbook_home_set().ok_or_else(|| {
            Error::Discovery("could not determine addressbook home set URL".to_string())
        })?;
        doc.resolve(href)
    }
}
