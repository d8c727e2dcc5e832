//! DNS-based service discovery (RFC 6764).

use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::ProtoErrorKind;
use hickory_resolver::{ResolveError, ResolveErrorKind, TokioResolver};

use crate::discovery::bootstrap::Protocol;
use crate::error::{Error, Result};

/// CardDAV service labels, in the order they are probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoverableService {
    CardDavs,
    CardDav,
}

impl DiscoverableService {
    pub fn label(self) -> &'static str {
        match self {
            DiscoverableService::CardDavs => "_carddavs._tcp",
            DiscoverableService::CardDav => "_carddav._tcp",
        }
    }

    pub fn protocol(self) -> Protocol {
        match self {
            DiscoverableService::CardDavs => Protocol::Https,
            DiscoverableService::CardDav => Protocol::Http,
        }
    }

    /// The service matching a protocol chosen by SRV discovery.
    pub fn for_protocol(protocol: Protocol) -> Self {
        match protocol {
            Protocol::Https => DiscoverableService::CardDavs,
            Protocol::Http => DiscoverableService::CardDav,
        }
    }

    /// Fully qualified name to query, e.g. `_carddavs._tcp.example.com`.
    pub fn service_name(self, host: &str) -> String {
        format!("{}.{}", self.label(), host.trim_end_matches('.'))
    }

    /// Services to probe. Plain `_carddav` is only tried when insecure
    /// connections are allowed.
    pub fn probe_order(allow_insecure: bool) -> &'static [DiscoverableService] {
        if allow_insecure {
            &[DiscoverableService::CardDavs, DiscoverableService::CardDav]
        } else {
            &[DiscoverableService::CardDavs]
        }
    }
}

/// One SRV answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    pub target: String,
    pub port: u16,
    pub priority: u16,
    pub weight: u16,
}

/// Order SRV records by ascending priority, then ascending weight.
///
/// This is a deterministic tie-break rather than the weighted random selection
/// of RFC 2782; equal records keep their relative order.
pub fn sort_service_records(records: &mut [ServiceRecord]) {
    records.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.weight.cmp(&b.weight)));
}

/// Extract the `path` key from TXT record strings of the form `k=v; k2=v2`.
///
/// All records are merged into one key space, so a later `path` overrides an
/// earlier one. Empty values are ignored.
pub fn context_path_from_txt<S: AsRef<str>>(records: &[S]) -> Option<String> {
    records
        .iter()
        .flat_map(|record| record.as_ref().split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .filter_map(|(key, value)| {
            let value = value.trim();
            (key.trim() == "path" && !value.is_empty()).then(|| value.to_string())
        })
        .last()
}

/// Source of SRV and TXT answers.
///
/// `Ok` with an empty list means "not found". An `Err` is a failed lookup;
/// discovery reports it through the event sink and treats it as not found.
#[allow(async_fn_in_trait)]
pub trait ServiceResolver {
    async fn lookup_srv(&self, name: &str) -> Result<Vec<ServiceRecord>>;

    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>>;
}

/// [`ServiceResolver`] backed by hickory-dns.
#[derive(Debug, Clone)]
pub struct HickoryServiceResolver {
    resolver: TokioResolver,
}

impl HickoryServiceResolver {
    /// Use the system DNS configuration, falling back to hickory's defaults
    /// when it cannot be read.
    pub fn new() -> Self {
        let builder = match TokioResolver::builder_tokio() {
            Ok(builder) => builder,
            Err(err) => {
                // no event sink exists yet at construction time
                tracing::warn!(error = %err, "failed to read system DNS config, using defaults");
                TokioResolver::builder_with_config(
                    ResolverConfig::default(),
                    TokioConnectionProvider::default(),
                )
            }
        };

        Self {
            resolver: builder.build(),
        }
    }

    pub fn from_resolver(resolver: TokioResolver) -> Self {
        Self { resolver }
    }
}

impl Default for HickoryServiceResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceResolver for HickoryServiceResolver {
    async fn lookup_srv(&self, name: &str) -> Result<Vec<ServiceRecord>> {
        match self.resolver.srv_lookup(name).await {
            Ok(lookup) => Ok(lookup
                .iter()
                .map(|srv| ServiceRecord {
                    target: srv.target().to_utf8().trim_end_matches('.').to_string(),
                    port: srv.port(),
                    priority: srv.priority(),
                    weight: srv.weight(),
                })
                .collect()),
            Err(err) if is_no_records_error(&err) => Ok(Vec::new()),
            Err(err) => Err(Error::dns(name, err)),
        }
    }

    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>> {
        match self.resolver.txt_lookup(name).await {
            Ok(lookup) => Ok(lookup
                .iter()
                .map(|txt| {
                    txt.txt_data()
                        .iter()
                        .map(|chunk| String::from_utf8_lossy(chunk))
                        .collect::<String>()
                })
                .collect()),
            Err(err) if is_no_records_error(&err) => Ok(Vec::new()),
            Err(err) => Err(Error::dns(name, err)),
        }
    }
}

/// NXDOMAIN and empty answers both surface as `NoRecordsFound` inside the
/// proto error.
fn is_no_records_error(error: &ResolveError) -> bool {
    match error.kind() {
        ResolveErrorKind::Proto(proto) => {
            matches!(proto.kind(), ProtoErrorKind::NoRecordsFound { .. })
        }
        _ => false,
    }
}
