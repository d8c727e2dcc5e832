pub mod bootstrap;
pub mod dns;

pub use bootstrap::{
    Bootstrap, BootstrapStage, DiscoveryMethod, DiscoveryState, Protocol, ServerLocation,
    WELL_KNOWN_PATH, determine_server_location,
};
pub use dns::{
    DiscoverableService, HickoryServiceResolver, ServiceRecord, ServiceResolver, context_path_from_txt,
    sort_service_records,
};
