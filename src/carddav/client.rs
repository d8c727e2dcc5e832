use std::sync::Arc;

use url::Url;

use crate::carddav::types::{CardReference, map_address_data, map_card_references};
use crate::carddav::vcard::{BasicVCardDecoder, VCardDecoder};
use crate::common::events::{EventSink, PullEvent, TracingSink};
use crate::common::options::{DecodeFailurePolicy, PullOptions};
use crate::credentials::Credentials;
use crate::discovery::bootstrap::{Bootstrap, BootstrapStage, DiscoveryState};
use crate::discovery::dns::{HickoryServiceResolver, ServiceResolver};
use crate::error::{Error, Result};
use crate::webdav::client::WebDavClient;
use crate::webdav::types::Depth;
use crate::webdav::xml::{build_addressbook_multiget_body, build_listing_propfind_body};

/// Pulls every contact of one account.
///
/// The first operation that needs the addressbook home set runs discovery;
/// its result is kept for the lifetime of the puller, and so is a discovery
/// failure: stages are never re-run.
///
/// All requests go through one [`WebDavClient`], which keeps a single
/// persistent connection per `(host, port)`.
///
/// # Example
/// ```no_run
/// use carddav_pull::{CardDavPuller, Credentials, PullOptions};
///
/// # async fn demo() -> carddav_pull::Result<()> {
/// let creds = Credentials::new("alice@example.com", "secret", None)?;
/// let mut puller = CardDavPuller::with_options(creds, PullOptions::default())?;
/// for card in puller.pull_all().await? {
///     println!("{}", card.formatted_name().unwrap_or("(no name)"));
/// }
/// # Ok(())
/// # }
/// ```
pub struct CardDavPuller<R = HickoryServiceResolver, D = BasicVCardDecoder> {
    credentials: Credentials,
    options: PullOptions,
    resolver: R,
    decoder: D,
    client: WebDavClient,
    events: Arc<dyn EventSink>,
    state: DiscoveryState,
    halted: Option<(BootstrapStage, String)>,
}

impl CardDavPuller {
    /// Puller with default options, system DNS and the basic vCard decoder.
    pub fn new(credentials: Credentials) -> Result<Self> {
        Self::with_options(credentials, PullOptions::default())
    }

    pub fn with_options(credentials: Credentials, options: PullOptions) -> Result<Self> {
        Self::with_parts(
            credentials,
            options,
            HickoryServiceResolver::new(),
            BasicVCardDecoder,
        )
    }
}

impl<R, D> CardDavPuller<R, D>
where
    R: ServiceResolver,
    D: VCardDecoder,
{
    /// Puller with a custom DNS resolver and vCard decoder.
    pub fn with_parts(
        credentials: Credentials,
        options: PullOptions,
        resolver: R,
        decoder: D,
    ) -> Result<Self> {
        let events: Arc<dyn EventSink> = Arc::new(TracingSink);
        let client = WebDavClient::new(&credentials, &options, events.clone())?;
        Ok(Self {
            credentials,
            options,
            resolver,
            decoder,
            client,
            events,
            state: DiscoveryState::new(),
            halted: None,
        })
    }

    /// Replace the default [`TracingSink`].
    ///
    /// Connections opened so far are closed.
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Result<Self> {
        self.client = WebDavClient::new(&self.credentials, &self.options, events.clone())?;
        self.events = events;
        Ok(self)
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn options(&self) -> &PullOptions {
        &self.options
    }

    /// What discovery has established so far.
    pub fn discovery_state(&self) -> &DiscoveryState {
        &self.state
    }

    /// Number of connections currently held open.
    pub fn open_connections(&self) -> usize {
        self.client.open_connections()
    }

    /// Addressbook home set URL, running the remaining discovery stages on
    /// first use.
    ///
    /// # Errors
    ///
    /// The error of the failing stage. Later calls return
    /// [`Error::Discovery`] without touching the network.
    pub async fn base_url(&mut self) -> Result<Url> {
        if let Some(home) = self.state.addressbook_home_set_url() {
            return Ok(home.clone());
        }
        if let Some((stage, message)) = &self.halted {
            return Err(Error::Discovery(format!(
                "discovery stopped after {stage}: {message}"
            )));
        }

        let mut bootstrap = Bootstrap {
            resolver: &self.resolver,
            client: &mut self.client,
            credentials: &self.credentials,
            options: &self.options,
            events: self.events.as_ref(),
        };
        match bootstrap.run(&mut self.state).await {
            Ok(home) => Ok(home),
            Err(err) => {
                self.halted = Some((self.state.stage(), err.to_string()));
                Err(err)
            }
        }
    }

    /// The collection contacts are listed from: the home set joined with the
    /// configured collection suffix.
    pub async fn addressbook_url(&mut self) -> Result<Url> {
        let base = self.base_url().await?;
        match self.options.collection_suffix.as_deref() {
            Some(suffix) if !suffix.is_empty() => {
                base.join(suffix).map_err(|err| Error::url(suffix, err))
            }
            _ => Ok(base),
        }
    }

    /// `PROPFIND` (`Depth: 1`) the collection and return the href of every
    /// member that is not the collection itself.
    pub async fn list_card_refs(&mut self, collection: &Url) -> Result<Vec<CardReference>> {
        let doc = self
            .client
            .propfind(collection, Depth::One, &build_listing_propfind_body())
            .await?;
        let refs = map_card_references(&doc.responses);
        self.events
            .record(&PullEvent::CardsListed { count: refs.len() });
        Ok(refs)
    }

    /// Fetch and decode `refs` with a single `addressbook-multiget` `REPORT`.
    ///
    /// The request is sent even when `refs` is empty. Records come back in
    /// server response order; only the first record of each address-data
    /// text is kept.
    pub async fn retrieve_cards(
        &mut self,
        collection: &Url,
        refs: &[CardReference],
    ) -> Result<Vec<D::Record>> {
        let body = build_addressbook_multiget_body(refs);
        let doc = self.client.report(collection, Depth::One, &body).await?;

        let mut cards = Vec::new();
        for (index, text) in map_address_data(&doc.responses) {
            let decoded = self.decoder.decode(text).and_then(|records| {
                records.into_iter().next().ok_or_else(|| Error::Parse {
                    message: "address data contains no vCard".to_string(),
                    source: None,
                })
            });

            match decoded {
                Ok(card) => cards.push(card),
                Err(err) => match self.options.decode_policy {
                    DecodeFailurePolicy::Skip => {
                        self.events.record(&PullEvent::CardDecodeFailed {
                            index,
                            error: err.to_string(),
                        });
                    }
                    DecodeFailurePolicy::Fail => {
                        return Err(Error::parse(
                            format!("could not decode address data of response {index}"),
                            err,
                        ));
                    }
                },
            }
        }
        Ok(cards)
    }

    /// Discover, list and retrieve every contact of the account.
    pub async fn pull_all(&mut self) -> Result<Vec<D::Record>> {
        let collection = self.addressbook_url().await?;
        let refs = self.list_card_refs(&collection).await?;
        self.retrieve_cards(&collection, &refs).await
    }
}
