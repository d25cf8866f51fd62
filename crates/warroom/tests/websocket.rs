//! A client joining a server over a real WebSocket.

use std::sync::Arc;
use std::time::Duration;

use warroom::prelude::*;
use warroom_transport::WebSocketTransport;

#[tokio::test]
async fn test_websocket_client_is_approved_and_resynced() {
    let catalog = Catalog::new().unwrap();
    let ruleset = Arc::new(Ruleset::standard());
    let mut state = GameState::new(
        Arc::clone(&catalog.entities),
        Arc::clone(&ruleset),
        ScenarioConfig::default(),
    )
    .unwrap();
    state.add_faction(Default::default()).unwrap();

    let transport = WebSocketTransport::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", transport.local_addr());
    let mut server = Server::new(transport, ServerConfig::default(), catalog.clone(), state);
    server.start_game().unwrap();

    let conn = warroom_transport::connect(&url).await.unwrap();
    let mut client = Client::connect(conn, ClientConfig::default(), catalog, ruleset).unwrap();

    let mut events = Vec::new();
    for _ in 0..200 {
        server.tick().unwrap();
        events.extend(client.poll().unwrap());
        if events.contains(&ClientEvent::ResyncComplete) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(events[0], ClientEvent::Approved(PlayerSlot(0)));
    assert!(events.contains(&ClientEvent::GameStarted));
    assert!(events.contains(&ClientEvent::ResyncComplete));
    assert_eq!(
        client.content_hash(),
        Some(server.state().registry().content_hash(PlayerSlot(0)).unwrap())
    );
}
