//! Decoding of retrieved address data.
//!
//! Retrieval hands every `address-data` text to a [`VCardDecoder`] and keeps
//! the first record it returns. [`BasicVCardDecoder`] is a structural
//! decoder: it splits cards, unfolds lines and separates property names,
//! parameters and values without interpreting them.

use std::fmt;

use crate::error::{Error, Result};

/// Turns raw vCard text into records.
pub trait VCardDecoder {
    type Record;

    /// Decode every card found in `text`, in order.
    fn decode(&self, text: &str) -> Result<Vec<Self::Record>>;
}

/// One content line, e.g. `TEL;TYPE=cell:+1 555 0100`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VCardProperty {
    pub group: Option<String>,
    /// Upper-cased property name.
    pub name: String,
    /// Raw parameters in order, names upper-cased, values untouched.
    pub params: Vec<(String, String)>,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VCard {
    pub properties: Vec<VCardProperty>,
}

impl VCard {
    /// First property called `name` (case-insensitive).
    pub fn property(&self, name: &str) -> Option<&VCardProperty> {
        self.properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Value of the first property called `name`.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.property(name).map(|p| p.value.as_str())
    }

    pub fn version(&self) -> Option<&str> {
        self.value("VERSION")
    }

    /// Formatted name (`FN`).
    pub fn formatted_name(&self) -> Option<&str> {
        self.value("FN")
    }
}

impl fmt::Display for VCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "BEGIN:VCARD")?;
        for p in &self.properties {
            if let Some(group) = &p.group {
                write!(f, "{group}.")?;
            }
            write!(f, "{}", p.name)?;
            for (k, v) in &p.params {
                write!(f, ";{k}={v}")?;
            }
            writeln!(f, ":{}", p.value)?;
        }
        writeln!(f, "END:VCARD")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BasicVCardDecoder;

impl VCardDecoder for BasicVCardDecoder {
    type Record = VCard;

    fn decode(&self, text: &str) -> Result<Vec<VCard>> {
        let mut cards = Vec::new();
        let mut current: Option<VCard> = None;

        for (lineno, line) in unfold(text).into_iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let property = parse_content_line(&line).ok_or_else(|| Error::Parse {
                message: format!("malformed vCard line {}: {line:?}", lineno + 1),
                source: None,
            })?;

            match (property.name.as_str(), current.as_mut()) {
                ("BEGIN", None) if property.value.eq_ignore_ascii_case("VCARD") => {
                    current = Some(VCard::default());
                }
                ("END", Some(_)) if property.value.eq_ignore_ascii_case("VCARD") => {
                    cards.extend(current.take());
                }
                // Nested components (e.g. AGENT) are not supported.
                ("BEGIN" | "END", _) => {
                    return Err(Error::Parse {
                        message: format!("unexpected {}:{} in vCard", property.name, property.value),
                        source: None,
                    });
                }
                (_, Some(card)) => card.properties.push(property),
                (_, None) => {
                    return Err(Error::Parse {
                        message: format!("property {} outside of BEGIN:VCARD", property.name),
                        source: None,
                    });
                }
            }
        }

        if current.is_some() {
            return Err(Error::Parse {
                message: "vCard is missing END:VCARD".to_string(),
                source: None,
            });
        }
        Ok(cards)
    }
}

/// Join folded lines (RFC 6350 section 3.2): a line break followed by a space
/// or tab continues the previous line.
fn unfold(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in text.split('\n') {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        match (raw.strip_prefix([' ', '\t']), lines.last_mut()) {
            (Some(continuation), Some(previous)) => previous.push_str(continuation),
            _ => lines.push(raw.to_string()),
        }
    }
    lines
}

fn parse_content_line(line: &str) -> Option<VCardProperty> {
    let (head, value) = split_unquoted(line, ':')?;
    let mut parts = split_params(head).into_iter();
    let qualified = parts.next()?.trim();
    let (group, name) = match qualified.rsplit_once('.') {
        Some((group, name)) => (Some(group.to_string()), name),
        None => (None, qualified),
    };
    if name.is_empty() {
        return None;
    }

    let params = parts
        .map(|param| match param.split_once('=') {
            Some((k, v)) => (k.trim().to_ascii_uppercase(), v.to_string()),
            None => ("TYPE".to_string(), param.to_string()),
        })
        .collect();

    Some(VCardProperty {
        group,
        name: name.to_ascii_uppercase(),
        params,
        value: value.to_string(),
    })
}

/// Split at the first `sep` outside double quotes.
fn split_unquoted(line: &str, sep: char) -> Option<(&str, &str)> {
    let mut quoted = false;
    for (idx, ch) in line.char_indices() {
        match ch {
            '"' => quoted = !quoted,
            c if c == sep && !quoted => return Some((&line[..idx], &line[idx + 1..])),
            _ => {}
        }
    }
    None
}

fn split_params(head: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut rest = head;
    while let Some((part, tail)) = split_unquoted(rest, ';') {
        out.push(part);
        rest = tail;
    }
    out.push(rest);
    out
}
