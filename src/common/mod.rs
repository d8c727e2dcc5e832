pub mod compression;
pub mod events;
pub mod http;
pub mod options;

pub use compression::{ContentEncoding, add_accept_encoding, decompress_body, detect_encodings};
pub use events::{EventSink, PullEvent, TracingSink};
pub use http::{DavConnector, build_connector};
pub use options::{ContextPathCheck, DecodeFailurePolicy, PullOptions};
