use crate::webdav::multistatus::DavResponse;

/// Href of one contact resource inside the addressbook collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CardReference {
    pub href: String,
}

impl CardReference {
    pub fn new(href: impl Into<String>) -> Self {
        Self { href: href.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.href
    }
}

impl AsRef<str> for CardReference {
    fn as_ref(&self) -> &str {
        &self.href
    }
}

/// Turn a listing multistatus into card references.
///
/// The collection's own entry (resource type `addressbook`) and entries
/// without an href are skipped; order follows the response.
pub fn map_card_references(responses: &[DavResponse]) -> Vec<CardReference> {
    responses
        .iter()
        .filter(|r| !r.is_addressbook && !r.href.is_empty())
        .map(|r| CardReference::new(r.href.clone()))
        .collect()
}

/// Address-data texts of a multiget response with their response index.
///
/// Entries with missing or whitespace-only address data are dropped.
pub fn map_address_data(responses: &[DavResponse]) -> Vec<(usize, &str)> {
    responses
        .iter()
        .enumerate()
        .filter_map(|(idx, r)| r.address_data.as_deref().map(|data| (idx, data)))
        .filter(|(_, data)| !data.trim().is_empty())
        .collect()
}
