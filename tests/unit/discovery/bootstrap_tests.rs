use std::sync::{Arc, Mutex};

use carddav_pull::discovery::{Bootstrap, WELL_KNOWN_PATH};
use carddav_pull::{
    BootstrapStage, Credentials, DiscoveryMethod, DiscoveryState, PullEvent, PullOptions,
    ServerLocation, TracingSink, WebDavClient,
};

use super::{StaticResolver, record};

fn client(creds: &Credentials, opts: &PullOptions) -> WebDavClient {
    WebDavClient::new(creds, opts, Arc::new(TracingSink)).expect("client builds")
}

#[test]
fn fresh_state_is_at_start() {
    let state = DiscoveryState::new();
    assert_eq!(state.stage(), BootstrapStage::Start);
    assert!(state.location().is_none());
    assert!(state.initial_context_path().is_none());
    assert!(state.principal_url().is_none());
    assert!(state.addressbook_home_set_url().is_none());
}

#[test]
fn stages_are_ordered() {
    assert!(BootstrapStage::Start < BootstrapStage::FqdnDetermined);
    assert!(BootstrapStage::FqdnDetermined < BootstrapStage::ContextPathDetermined);
    assert!(BootstrapStage::ContextPathDetermined < BootstrapStage::PrincipalDetermined);
    assert!(BootstrapStage::PrincipalDetermined < BootstrapStage::HomeSetDetermined);
    assert_eq!(BootstrapStage::HomeSetDetermined.to_string(), "addressbook home set");
}

#[tokio::test]
async fn heuristic_location_uses_well_known_path_without_txt_lookup() {
    let creds = Credentials::new("alice@example.com", "secret", None).unwrap();
    let opts = PullOptions::default();
    let resolver = StaticResolver::default();
    let mut webdav = client(&creds, &opts);
    let events = Mutex::new(Vec::new());
    let sink = |event: &PullEvent| events.lock().unwrap().push(event.clone());

    let mut bootstrap = Bootstrap {
        resolver: &resolver,
        client: &mut webdav,
        credentials: &creds,
        options: &opts,
        events: &sink,
    };

    let start = DiscoveryState::new();
    let located = bootstrap.advance(&start).await.expect("stage 1 never fails");
    assert_eq!(located.stage(), BootstrapStage::FqdnDetermined);
    assert_eq!(located.location(), Some(&ServerLocation::heuristic("example.com")));
    // the input snapshot is untouched
    assert_eq!(start.stage(), BootstrapStage::Start);

    let with_path = bootstrap.advance(&located).await.expect("stage 2");
    assert_eq!(with_path.stage(), BootstrapStage::ContextPathDetermined);
    assert_eq!(with_path.initial_context_path(), Some(WELL_KNOWN_PATH));
    assert_eq!(with_path.location(), located.location());

    assert!(
        resolver.queries.borrow().iter().all(|q| q.starts_with("SRV ")),
        "no TXT lookup for heuristic locations"
    );
    assert_eq!(webdav.open_connections(), 0);

    let events = events.lock().unwrap();
    assert!(matches!(
        events[0],
        PullEvent::FqdnDetermined {
            method: DiscoveryMethod::Heuristic,
            port: 443,
            ..
        }
    ));
    assert!(matches!(
        &events[1],
        PullEvent::ContextPathDetermined { path } if path == WELL_KNOWN_PATH
    ));
}

#[tokio::test]
async fn srv_location_takes_context_path_from_txt() {
    let creds = Credentials::new("alice@example.com", "secret", None).unwrap();
    let opts = PullOptions::default();
    let resolver = StaticResolver::default()
        .with_srv(
            "_carddavs._tcp.example.com",
            vec![record("dav.example.com", 8443, 0, 0)],
        )
        .with_txt("_carddavs._tcp.example.com", &["path=/remote/dav/"]);
    let mut webdav = client(&creds, &opts);

    let mut bootstrap = Bootstrap {
        resolver: &resolver,
        client: &mut webdav,
        credentials: &creds,
        options: &opts,
        events: &TracingSink,
    };

    let located = bootstrap.advance(&DiscoveryState::new()).await.unwrap();
    let location = located.location().expect("location set");
    assert_eq!(location.host, "dav.example.com");
    assert_eq!(location.port, 8443);
    assert_eq!(location.discovery_method, DiscoveryMethod::Srv);

    let with_path = bootstrap.advance(&located).await.unwrap();
    assert_eq!(with_path.initial_context_path(), Some("/remote/dav/"));
    assert!(
        resolver
            .queries
            .borrow()
            .contains(&"TXT _carddavs._tcp.example.com".to_string())
    );
}

#[tokio::test]
async fn srv_location_without_txt_path_uses_well_known_path() {
    let creds = Credentials::new("alice@example.com", "secret", None).unwrap();
    let opts = PullOptions::default();
    let resolver = StaticResolver::default()
        .with_srv(
            "_carddavs._tcp.example.com",
            vec![record("dav.example.com", 443, 0, 0)],
        )
        .with_txt("_carddavs._tcp.example.com", &["txtvers=1"]);
    let mut webdav = client(&creds, &opts);

    let mut bootstrap = Bootstrap {
        resolver: &resolver,
        client: &mut webdav,
        credentials: &creds,
        options: &opts,
        events: &TracingSink,
    };

    let located = bootstrap.advance(&DiscoveryState::new()).await.unwrap();
    let with_path = bootstrap.advance(&located).await.unwrap();
    assert_eq!(with_path.initial_context_path(), Some(WELL_KNOWN_PATH));
}
