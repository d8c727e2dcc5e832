use tokio::time::Duration;

/// How a context path advertised in a DNS TXT record is validated before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextPathCheck {
    /// Accept the advertised path as-is.
    #[default]
    Assume,
    /// Issue a `Depth: 0` `PROPFIND` against the path and only accept it on success.
    Probe,
}

/// What to do with address data the vCard decoder rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeFailurePolicy {
    /// Drop the record, report it through the event sink and keep going.
    #[default]
    Skip,
    /// Abort the whole pull with [`crate::Error::Parse`].
    Fail,
}

/// Tunables for discovery and retrieval.
///
/// ```
/// use carddav_pull::{ContextPathCheck, PullOptions};
/// use std::time::Duration;
///
/// let opts = PullOptions::default()
///     .allow_insecure_connections(true)
///     .request_timeout(Duration::from_secs(5))
///     .context_path_check(ContextPathCheck::Probe);
/// assert!(opts.allow_insecure);
/// assert_eq!(opts.collection_suffix.as_deref(), Some("card/"));
/// ```
#[derive(Debug, Clone)]
pub struct PullOptions {
    /// Also probe `_carddav._tcp` (plain HTTP) after `_carddavs._tcp`.
    pub allow_insecure: bool,
    pub timeout: Duration,
    /// Sub-path appended to the addressbook home set to reach the collection.
    /// Some servers (iCloud) nest the actual collection one level below the home set.
    pub collection_suffix: Option<String>,
    pub path_check: ContextPathCheck,
    pub decode_policy: DecodeFailurePolicy,
    pub max_redirects: usize,
}

impl Default for PullOptions {
    fn default() -> Self {
        Self {
            allow_insecure: false,
            timeout: Duration::from_secs(20),
            collection_suffix: Some("card/".to_string()),
            path_check: ContextPathCheck::Assume,
            decode_policy: DecodeFailurePolicy::Skip,
            max_redirects: 5,
        }
    }
}

impl PullOptions {
    pub fn allow_insecure_connections(mut self, allow: bool) -> Self {
        self.allow_insecure = allow;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the collection sub-path; `None` pulls from the home set itself.
    pub fn collection_suffix(mut self, suffix: Option<&str>) -> Self {
        self.collection_suffix = suffix.map(str::to_string);
        self
    }

    pub fn context_path_check(mut self, check: ContextPathCheck) -> Self {
        self.path_check = check;
        self
    }

    pub fn decode_failure_policy(mut self, policy: DecodeFailurePolicy) -> Self {
        self.decode_policy = policy;
        self
    }

    pub fn max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }
}
