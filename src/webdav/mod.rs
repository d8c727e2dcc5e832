pub mod client;
pub mod multistatus;
pub mod pool;
pub mod types;
pub mod xml;

pub use client::WebDavClient;
pub use multistatus::{DavResponse, Multistatus, parse_multistatus_bytes};
pub use pool::ConnectionPool;
pub use types::{Authority, Depth};
pub use xml::{build_addressbook_multiget_body, escape_xml};
