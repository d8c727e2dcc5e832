//! Namespace-agnostic parsing of `207 Multi-Status` bodies.
//!
//! Element names are matched on their local part only, so `D:href`, `d:href`
//! and a default-namespaced `href` are the same element. Properties are only
//! recognised at their expected position below `response/propstat/prop`.

use std::io::{BufRead, Cursor};

use quick_xml::Reader;
use quick_xml::escape::{resolve_predefined_entity, unescape};
use quick_xml::events::{BytesRef, Event};
use url::Url;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementName {
    Multistatus,
    Response,
    Propstat,
    Prop,
    Href,
    Resourcetype,
    Addressbook,
    AddressData,
    AddressbookHomeSet,
    CurrentUserPrincipal,
    PrincipalUrl,
    Other,
}

pub fn element_from_bytes(raw: &[u8]) -> ElementName {
    let local = match raw.iter().position(|b| *b == b':') {
        Some(idx) => &raw[idx + 1..],
        None => raw,
    };

    if local.eq_ignore_ascii_case(b"multistatus") {
        ElementName::Multistatus
    } else if local.eq_ignore_ascii_case(b"response") {
        ElementName::Response
    } else if local.eq_ignore_ascii_case(b"propstat") {
        ElementName::Propstat
    } else if local.eq_ignore_ascii_case(b"prop") {
        ElementName::Prop
    } else if local.eq_ignore_ascii_case(b"href") {
        ElementName::Href
    } else if local.eq_ignore_ascii_case(b"resourcetype") {
        ElementName::Resourcetype
    } else if local.eq_ignore_ascii_case(b"addressbook") {
        ElementName::Addressbook
    } else if local.eq_ignore_ascii_case(b"address-data") {
        ElementName::AddressData
    } else if local.eq_ignore_ascii_case(b"addressbook-home-set") {
        ElementName::AddressbookHomeSet
    } else if local.eq_ignore_ascii_case(b"current-user-principal") {
        ElementName::CurrentUserPrincipal
    } else if local.eq_ignore_ascii_case(b"principal-url") {
        ElementName::PrincipalUrl
    } else {
        ElementName::Other
    }
}

fn path_ends_with<T: PartialEq>(stack: &[T], needle: &[T]) -> bool {
    stack.len() >= needle.len() && stack[stack.len() - needle.len()..] == needle[..]
}

/// One `<response>` entry of a multistatus body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DavResponse {
    pub href: String,
    /// `resourcetype` contains `addressbook`: the entry is the collection itself.
    pub is_addressbook: bool,
    /// Raw `address-data` text, untrimmed. The first non-blank one wins when a
    /// response has several.
    pub address_data: Option<String>,
    pub current_user_principal: Vec<String>,
    pub principal_url: Vec<String>,
    pub addressbook_home_set: Vec<String>,
}

/// Parsed multistatus document together with the URL that produced it.
///
/// Relative hrefs found in the document resolve against [`Multistatus::url`].
#[derive(Debug, Clone)]
pub struct Multistatus {
    pub url: Url,
    pub responses: Vec<DavResponse>,
}

impl Multistatus {
    pub fn parse(url: Url, body: &[u8]) -> Result<Self> {
        Ok(Self {
            url,
            responses: parse_multistatus_bytes(body)?,
        })
    }

    /// First `current-user-principal` href in document order.
    pub fn current_user_principal(&self) -> Option<&str> {
        self.first_href(|r| &r.current_user_principal)
    }

    /// First legacy `principal-URL` href in document order.
    pub fn principal_url(&self) -> Option<&str> {
        self.first_href(|r| &r.principal_url)
    }

    pub fn addressbook_home_set(&self) -> Option<&str> {
        self.first_href(|r| &r.addressbook_home_set)
    }

    /// Resolve an href from this document against the request URL.
    pub fn resolve(&self, href: &str) -> Result<Url> {
        self.url.join(href).map_err(|err| Error::url(href, err))
    }

    fn first_href<F>(&self, field: F) -> Option<&str>
    where
        F: Fn(&DavResponse) -> &Vec<String>,
    {
        self.responses
            .iter()
            .flat_map(|r| field(r).iter())
            .map(String::as_str)
            .find(|href| !href.is_empty())
    }
}

struct MultistatusParser {
    stack: Vec<ElementName>,
    current: DavResponse,
    text: String,
    items: Vec<DavResponse>,
}

impl MultistatusParser {
    fn new() -> Self {
        Self {
            stack: Vec::with_capacity(16),
            current: DavResponse::default(),
            text: String::new(),
            items: Vec::new(),
        }
    }

    fn path_ends_with(&self, needle: &[ElementName]) -> bool {
        path_ends_with(&self.stack, needle)
    }

    fn prop_href_ends_with(&self, property: ElementName) -> bool {
        self.path_ends_with(&[
            ElementName::Response,
            ElementName::Propstat,
            ElementName::Prop,
            property,
            ElementName::Href,
        ])
    }

    fn on_start(&mut self, raw: &[u8]) {
        let element = element_from_bytes(raw);
        self.stack.push(element);
        self.text.clear();

        match element {
            ElementName::Response => {
                self.current = DavResponse::default();
            }
            ElementName::Addressbook => {
                if self.path_ends_with(&[
                    ElementName::Response,
                    ElementName::Propstat,
                    ElementName::Prop,
                    ElementName::Resourcetype,
                    ElementName::Addressbook,
                ]) {
                    self.current.is_addressbook = true;
                }
            }
            _ => {}
        }
    }

    fn on_text(&mut self, text: &str) {
        self.text.push_str(text);
    }

    fn on_end(&mut self) {
        let text = std::mem::take(&mut self.text);

        // address-data is multi-line and may arrive in chunks; keep the exact payload.
        // A response can carry several propstats (e.g. 200 and 404); a blank
        // address-data never replaces one that holds a card.
        if self.path_ends_with(&[
            ElementName::Response,
            ElementName::Propstat,
            ElementName::Prop,
            ElementName::AddressData,
        ]) {
            let has_card = self
                .current
                .address_data
                .as_deref()
                .is_some_and(|existing| !existing.trim().is_empty());
            if !has_card {
                self.current.address_data = Some(text);
            }
        } else {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                if self.path_ends_with(&[ElementName::Response, ElementName::Href]) {
                    self.current.href = trimmed.to_string();
                } else if self.prop_href_ends_with(ElementName::CurrentUserPrincipal) {
                    self.current.current_user_principal.push(trimmed.to_string());
                } else if self.prop_href_ends_with(ElementName::PrincipalUrl) {
                    self.current.principal_url.push(trimmed.to_string());
                } else if self.prop_href_ends_with(ElementName::AddressbookHomeSet) {
                    self.current.addressbook_home_set.push(trimmed.to_string());
                }
            }
        }

        // Mismatched end tags are ignored; the reader already rejects malformed XML.
        if self.stack.pop() == Some(ElementName::Response) {
            self.items.push(std::mem::take(&mut self.current));
        }
    }
}

fn parse_multistatus_with<R: BufRead>(reader: R) -> Result<Vec<DavResponse>> {
    let mut xml = Reader::from_reader(reader);
    xml.config_mut().trim_text(false);

    let mut buf = Vec::with_capacity(8 * 1024);
    let mut parser = MultistatusParser::new();

    loop {
        match xml.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => parser.on_start(e.name().as_ref()),
            Ok(Event::Empty(e)) => {
                parser.on_start(e.name().as_ref());
                parser.on_end();
            }
            Ok(Event::Text(e)) => {
                let text = decode_text(e.as_ref())?;
                parser.on_text(&text);
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                parser.on_text(&text);
            }
            Ok(Event::GeneralRef(e)) => {
                let text = resolve_reference(&e)?;
                parser.on_text(&text);
            }
            Ok(Event::End(_)) => parser.on_end(),
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::parse("malformed XML response", e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(parser.items)
}

/// Parse an aggregated `207 Multi-Status` body into its response entries, in
/// document order.
pub fn parse_multistatus_bytes(body: &[u8]) -> Result<Vec<DavResponse>> {
    parse_multistatus_with(Cursor::new(body))
}

pub fn decode_text(raw: &[u8]) -> Result<String> {
    match std::str::from_utf8(raw) {
        Ok(s) => Ok(unescape(s)
            .map_err(|err| Error::parse("XML decode error", err))?
            .into_owned()),
        Err(_) => Ok(String::from_utf8_lossy(raw).into_owned()),
    }
}

fn resolve_reference(reference: &BytesRef<'_>) -> Result<String> {
    if let Some(ch) = reference
        .resolve_char_ref()
        .map_err(|err| Error::parse("invalid character reference", err))?
    {
        return Ok(ch.to_string());
    }

    let name = reference
        .decode()
        .map_err(|err| Error::parse("invalid entity reference", err))?;
    Ok(match resolve_predefined_entity(&name) {
        Some(resolved) => resolved.to_string(),
        None => format!("&{name};"),
    })
}
