pub mod client;
pub mod types;
pub mod vcard;

pub use client::CardDavPuller;
pub use types::{CardReference, map_address_data, map_card_references};
pub use vcard::{BasicVCardDecoder, VCard, VCardDecoder, VCardProperty};
