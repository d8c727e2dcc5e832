//! Request bodies for discovery, listing and retrieval.

pub const DAV_NS: &str = "DAV:";
pub const CARDDAV_NS: &str = "urn:ietf:params:xml:ns:carddav";

pub fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

/// `PROPFIND` body asking for the principal (`current-user-principal`, falling
/// back to the legacy `principal-URL`).
pub fn build_principal_propfind_body() -> String {
    format!(
        r#"<D:propfind xmlns:D="{DAV_NS}"><D:prop><D:current-user-principal/><D:principal-URL/></D:prop></D:propfind>"#
    )
}

/// `PROPFIND` body asking a principal for its `addressbook-home-set`.
pub fn build_home_set_propfind_body() -> String {
    format!(
        r#"<D:propfind xmlns:D="{DAV_NS}" xmlns:C="{CARDDAV_NS}"><D:prop><C:addressbook-home-set/></D:prop></D:propfind>"#
    )
}

/// `PROPFIND` body listing the members of an addressbook collection.
pub fn build_listing_propfind_body() -> String {
    format!(
        r#"<D:propfind xmlns:D="{DAV_NS}" xmlns:C="{CARDDAV_NS}"><D:prop><D:resourcetype/><C:address-data/></D:prop></D:propfind>"#
    )
}

/// Minimal `PROPFIND` body used to check that a path exists.
pub fn build_probe_propfind_body() -> String {
    format!(r#"<D:propfind xmlns:D="{DAV_NS}"><D:prop><D:resourcetype/></D:prop></D:propfind>"#)
}

/// `addressbook-multiget` REPORT body with one `href` per entry.
///
/// Always produces a body, even without hrefs, so retrieval stays a single
/// round trip. Empty hrefs are skipped.
pub fn build_addressbook_multiget_body<I, S>(hrefs: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut body = format!(
        r#"<C:addressbook-multiget xmlns:D="{DAV_NS}" xmlns:C="{CARDDAV_NS}"><D:prop><C:address-data/></D:prop>"#
    );
    for href in hrefs {
        let href = href.as_ref();
        if href.is_empty() {
            continue;
        }
        body.push_str("<D:href>");
        body.push_str(&escape_xml(href));
        body.push_str("</D:href>");
    }
    body.push_str("</C:addressbook-multiget>");
    body
}
