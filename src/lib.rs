//! CardDAV contact puller for Rust.
//!
//! Given an account (username, password and an optional host), this crate
//! finds the account's CardDAV server, walks the discovery chain down to the
//! addressbook home set and downloads every contact in one batched request.
//! It is built on hyper 1.x, rustls, hickory-dns and tokio.
//!
//! # Features
//!
//! - RFC 6764 service discovery through `_carddavs._tcp` / `_carddav._tcp`
//!   SRV records and TXT `path=` hints, with a well-known fallback
//! - Principal and addressbook home set resolution (`current-user-principal`,
//!   legacy `principal-URL`, `addressbook-home-set`)
//! - One persistent HTTP/1.1 connection per `(host, port)`
//! - A single `addressbook-multiget` round trip for all contacts
//! - Automatic response decompression (br/zstd/gzip)
//! - Pluggable DNS resolver, vCard decoder and event sink
//!
//! # Examples
//!
//! ## Pulling everything
//!
//! ```no_run
//! use carddav_pull::pull_all;
//!
//! #[tokio::main]
//! async fn main() -> carddav_pull::Result<()> {
//!     let cards = pull_all("alice@example.com", "secret", None).await?;
//!     for card in &cards {
//!         println!("{}", card.formatted_name().unwrap_or("(unnamed)"));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Step by step
//!
//! Discovery runs once per [`CardDavPuller`]; listing and retrieval can be
//! driven separately.
//!
//! ```no_run
//! use carddav_pull::{CardDavPuller, Credentials, PullOptions};
//!
//! # async fn demo() -> carddav_pull::Result<()> {
//! let creds = Credentials::new("alice@example.com", "secret", Some("dav.example.com"))?;
//! let mut puller = CardDavPuller::with_options(
//!     creds,
//!     PullOptions::default().collection_suffix(None),
//! )?;
//!
//! let home = puller.base_url().await?;
//! println!("addressbook home set: {home}");
//!
//! let collection = puller.addressbook_url().await?;
//! let refs = puller.list_card_refs(&collection).await?;
//! let cards = puller.retrieve_cards(&collection, &refs).await?;
//! println!("{} of {} cards decoded", cards.len(), refs.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Observing progress
//!
//! Discovery milestones and protocol traffic are reported as [`PullEvent`]s.
//! The default sink forwards them to `tracing`; any closure can be used
//! instead.
//!
//! ```no_run
//! use std::sync::Arc;
//! use carddav_pull::{CardDavPuller, Credentials, PullEvent};
//!
//! # async fn demo() -> carddav_pull::Result<()> {
//! let creds = Credentials::new("alice@example.com", "secret", None)?;
//! let mut puller = CardDavPuller::new(creds)?.with_event_sink(Arc::new(|event: &PullEvent| {
//!     eprintln!("{event:?}");
//! }))?;
//! puller.pull_all().await?;
//! # Ok(())
//! # }
//! ```
pub mod carddav;
pub mod common;
pub mod credentials;
pub mod discovery;
pub mod error;
pub mod webdav;

pub use carddav::{
    BasicVCardDecoder, CardDavPuller, CardReference, VCard, VCardDecoder, VCardProperty,
};
pub use common::{
    ContentEncoding, ContextPathCheck, DecodeFailurePolicy, EventSink, PullEvent, PullOptions,
    TracingSink,
};
pub use credentials::Credentials;
pub use discovery::{
    BootstrapStage, DiscoveryMethod, DiscoveryState, HickoryServiceResolver, Protocol,
    ServerLocation, ServiceRecord, ServiceResolver,
};
pub use error::{Error, Result};
pub use webdav::{Depth, Multistatus, WebDavClient};

/// Pull every contact of an account with default options.
///
/// `host` overrides the domain taken from `username`.
pub async fn pull_all(username: &str, password: &str, host: Option<&str>) -> Result<Vec<VCard>> {
    let credentials = Credentials::new(username, password, host)?;
    CardDavPuller::new(credentials)?.pull_all().await
}
