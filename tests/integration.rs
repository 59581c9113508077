//! Integration tests for tv-volume-relay.
//!
//! A fake television (a local WebSocket server with a scripted reply
//! policy) stands in for the real device. The one test that needs an
//! actual LG television is marked `#[ignore]`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tempfile::tempdir;
use tokio_tungstenite::tungstenite::Message;
use tv_volume_relay::{
    EndpointSnapshot, KeyDisposition, KeyStore, MacAddress, MockHostVolume, MockNeighbors,
    RelayConfig, RelayEvent, TvClient, TvError, VolumeKey, VolumeRelay,
};

const TV_MAC: &str = "AA:BB:CC:DD:EE:FF";
const GRANTED_KEY: &str = "secret-key-123";

/// How a fake television answers the frames it receives.
#[derive(Clone)]
enum Script {
    /// Acknowledge registration, then stay silent.
    AckRegister,
    /// Acknowledge registration and answer a status request with this
    /// payload.
    StatusPayload(serde_json::Value),
    /// Send these frames, in order, once a register frame arrives.
    CannedFrames(Vec<String>),
    /// Close the connection as soon as a register frame arrives.
    CloseOnRegister,
}

/// A local WebSocket server that records every text frame it receives and
/// replies per its [`Script`]. Accepts any number of sessions, since the
/// client opens one per command.
struct FakeTv {
    port: u16,
    frames: Arc<Mutex<Vec<String>>>,
}

impl FakeTv {
    async fn spawn(script: Script) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let frames = Arc::new(Mutex::new(Vec::new()));

        let seen = Arc::clone(&frames);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let script = script.clone();
                let seen = Arc::clone(&seen);
                tokio::spawn(async move {
                    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                    while let Some(Ok(message)) = ws.next().await {
                        let Message::Text(text) = message else {
                            continue;
                        };
                        let is_register = text.contains("\"register\"");
                        seen.lock().unwrap().push(text.clone());

                        match &script {
                            Script::AckRegister => {
                                if is_register {
                                    let _ = ws
                                        .send(Message::Text(registered_frame(GRANTED_KEY)))
                                        .await;
                                }
                            }
                            Script::StatusPayload(payload) => {
                                if is_register {
                                    let _ = ws
                                        .send(Message::Text(registered_frame(GRANTED_KEY)))
                                        .await;
                                } else if text.contains("getStatus") {
                                    let reply = json!({
                                        "type": "response",
                                        "id": "req_0",
                                        "payload": payload,
                                    })
                                    .to_string();
                                    let _ = ws.send(Message::Text(reply)).await;
                                }
                            }
                            Script::CannedFrames(canned) => {
                                if is_register {
                                    for frame in canned {
                                        let _ = ws.send(Message::Text(frame.clone())).await;
                                    }
                                }
                            }
                            Script::CloseOnRegister => {
                                if is_register {
                                    let _ = ws.close(None).await;
                                    break;
                                }
                            }
                        }
                    }
                });
            }
        });

        Self { port, frames }
    }

    /// Configuration pointing the relay at this fake television.
    fn config(&self) -> RelayConfig {
        RelayConfig {
            address: "127.0.0.1".into(),
            mac_address: TV_MAC.into(),
            port: self.port,
            secure: false,
            ..RelayConfig::default()
        }
    }

    fn frames(&self) -> Vec<String> {
        self.frames.lock().unwrap().clone()
    }

    /// Polls until at least `count` frames have arrived, up to one second.
    async fn wait_for_frames(&self, count: usize) -> Vec<String> {
        for _ in 0..50 {
            let frames = self.frames();
            if frames.len() >= count {
                return frames;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.frames()
    }
}

fn registered_frame(key: &str) -> String {
    json!({
        "type": "registered",
        "id": "register_0",
        "payload": { "client-key": key },
    })
    .to_string()
}

fn prompt_frame() -> String {
    json!({
        "type": "response",
        "id": "register_0",
        "payload": { "pairingType": "PROMPT", "returnValue": true },
    })
    .to_string()
}

fn matching_resolver() -> MockNeighbors {
    MockNeighbors::answering(MacAddress::parse(TV_MAC).unwrap())
}

/// A client whose key store already holds a credential.
fn paired_client(tv: &FakeTv, dir: &tempfile::TempDir) -> TvClient {
    let key_path = dir.path().join("client_key.txt");
    std::fs::write(&key_path, "earlier-key\n").unwrap();
    TvClient::with_resolver(tv.config(), KeyStore::at(key_path), matching_resolver())
}

#[tokio::test]
async fn test_volume_up_sends_register_then_request() {
    let tv = FakeTv::spawn(Script::AckRegister).await;
    let dir = tempdir().unwrap();
    let client = paired_client(&tv, &dir);

    client.volume_up().await.unwrap();

    let frames = tv.wait_for_frames(2).await;
    assert_eq!(frames.len(), 2);
    // Registration first, carrying the stored credential
    assert!(frames[0].contains("\"type\":\"register\""));
    assert!(frames[0].contains("\"client-key\":\"earlier-key\""));
    // Then the command
    assert!(frames[1].contains("\"type\":\"request\""));
    assert!(frames[1].contains("ssap://audio/volumeUp"));
}

#[tokio::test]
async fn test_unpaired_command_fails_before_touching_the_network() {
    let tv = FakeTv::spawn(Script::AckRegister).await;
    let dir = tempdir().unwrap();
    let resolver = matching_resolver();
    let client = TvClient::with_resolver(
        tv.config(),
        KeyStore::at(dir.path().join("client_key.txt")),
        resolver.clone(),
    );

    let result = client.volume_up().await;

    assert!(matches!(result, Err(TvError::NotPaired)));
    assert_eq!(resolver.lookups(), 0);
    assert!(tv.frames().is_empty());
}

#[tokio::test]
async fn test_binding_mismatch_blocks_the_command() {
    let tv = FakeTv::spawn(Script::AckRegister).await;
    let dir = tempdir().unwrap();
    let key_path = dir.path().join("client_key.txt");
    std::fs::write(&key_path, "earlier-key\n").unwrap();

    // The neighbor table answers with some other device's MAC.
    let client = TvClient::with_resolver(
        tv.config(),
        KeyStore::at(key_path),
        MockNeighbors::answering(MacAddress::parse("11:22:33:44:55:66").unwrap()),
    );

    let result = client.volume_up().await;

    assert!(matches!(result, Err(TvError::BindingMismatch { .. })));
    assert!(tv.frames().is_empty());
}

#[tokio::test]
async fn test_binding_mismatch_blocks_pairing_too() {
    // An impostor device never even gets to show a pairing prompt.
    let tv = FakeTv::spawn(Script::CannedFrames(vec![registered_frame(GRANTED_KEY)])).await;
    let dir = tempdir().unwrap();
    let client = TvClient::with_resolver(
        tv.config(),
        KeyStore::at(dir.path().join("client_key.txt")),
        MockNeighbors::answering(MacAddress::parse("11:22:33:44:55:66").unwrap()),
    );

    let result = client.pair().await;

    assert!(matches!(result, Err(TvError::BindingMismatch { .. })));
    assert!(!client.is_paired());
    assert!(tv.frames().is_empty());
}

#[tokio::test]
async fn test_pairing_stores_the_granted_key() {
    let tv = FakeTv::spawn(Script::CannedFrames(vec![
        prompt_frame(),
        registered_frame(GRANTED_KEY),
    ]))
    .await;
    let dir = tempdir().unwrap();
    let key_path = dir.path().join("client_key.txt");
    let client = TvClient::with_resolver(
        tv.config(),
        KeyStore::at(key_path.clone()),
        matching_resolver(),
    );

    client.pair().await.unwrap();

    assert!(client.is_paired());
    let stored = std::fs::read_to_string(&key_path).unwrap();
    assert_eq!(stored.trim(), GRANTED_KEY);

    // The initiating register frame must not claim a credential.
    let frames = tv.wait_for_frames(1).await;
    assert!(frames[0].contains("\"type\":\"register\""));
    assert!(!frames[0].contains("client-key"));
}

#[tokio::test]
async fn test_pairing_gives_up_after_the_frame_budget() {
    // Six keyless frames: more than the client is willing to scan.
    let tv = FakeTv::spawn(Script::CannedFrames(vec![prompt_frame(); 6])).await;
    let dir = tempdir().unwrap();
    let key_path = dir.path().join("client_key.txt");
    let client = TvClient::with_resolver(
        tv.config(),
        KeyStore::at(key_path.clone()),
        matching_resolver(),
    );

    let result = client.pair().await;

    assert!(matches!(result, Err(TvError::PairingNoKey { frames: 5 })));
    assert!(!client.is_paired());
    assert!(!key_path.exists());
}

#[tokio::test]
async fn test_pairing_surfaces_transport_failure_as_itself() {
    // The television drops the connection mid-pairing. That is a
    // connectivity problem, not a declined prompt.
    let tv = FakeTv::spawn(Script::CloseOnRegister).await;
    let dir = tempdir().unwrap();
    let key_path = dir.path().join("client_key.txt");
    let client = TvClient::with_resolver(
        tv.config(),
        KeyStore::at(key_path.clone()),
        matching_resolver(),
    );

    let result = client.pair().await;

    assert!(matches!(result, Err(TvError::ConnectionClosed)));
    assert!(!client.is_paired());
    assert!(!key_path.exists());
}

#[tokio::test]
async fn test_toggle_mute_inverts_the_reported_state() {
    let tv = FakeTv::spawn(Script::StatusPayload(json!({
        "returnValue": true,
        "muted": true,
    })))
    .await;
    let dir = tempdir().unwrap();
    let client = paired_client(&tv, &dir);

    client.toggle_mute().await.unwrap();

    let frames = tv.wait_for_frames(3).await;
    assert_eq!(frames.len(), 3);
    assert!(frames[1].contains("ssap://audio/getStatus"));
    assert!(frames[2].contains("ssap://audio/setMute"));
    assert!(frames[2].contains("\"mute\":false"));
}

#[tokio::test]
async fn test_toggle_mute_defaults_to_mute_when_status_is_unreadable() {
    let tv = FakeTv::spawn(Script::StatusPayload(json!({ "returnValue": true }))).await;
    let dir = tempdir().unwrap();
    let client = paired_client(&tv, &dir);

    client.toggle_mute().await.unwrap();

    let frames = tv.wait_for_frames(3).await;
    assert!(frames[2].contains("ssap://audio/setMute"));
    assert!(frames[2].contains("\"mute\":true"));
}

#[tokio::test]
async fn test_relay_routes_keys_end_to_end() {
    let tv = FakeTv::spawn(Script::AckRegister).await;
    let dir = tempdir().unwrap();
    let key_path = dir.path().join("client_key.txt");
    std::fs::write(&key_path, "earlier-key\n").unwrap();

    let host = MockHostVolume::new(0.3);
    let events = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&events);

    let relay = VolumeRelay::builder()
        .config(tv.config())
        .host_volume(host.clone())
        .key_store(KeyStore::at(key_path))
        .resolver(matching_resolver())
        .on_event(move |event| seen.lock().unwrap().push(event))
        .start()
        .await
        .unwrap();

    // The television becomes the default endpoint with spatial audio up.
    relay.endpoint_changed(Some(EndpointSnapshot::new(
        "LG TV SSCR2 (NVIDIA High Definition Audio)",
        true,
    )));
    assert!(relay.routing());
    assert_eq!(host.set_calls(), vec![1.0]);

    // A volume key is claimed, pins the level, and reaches the television.
    assert_eq!(relay.key_pressed(VolumeKey::Up), KeyDisposition::Claimed);
    assert_eq!(host.set_calls(), vec![1.0, 1.0]);

    let frames = tv.wait_for_frames(2).await;
    assert!(frames[1].contains("ssap://audio/volumeUp"));

    // The endpoint moves away; the saved level comes back.
    relay.endpoint_changed(None);
    assert!(!relay.routing());
    assert_eq!(host.set_calls(), vec![1.0, 1.0, 0.3]);

    let events = events.lock().unwrap();
    assert!(events
        .iter()
        .any(|event| matches!(event, RelayEvent::RoutingActivated { .. })));
    assert!(events
        .iter()
        .any(|event| matches!(event, RelayEvent::RoutingDeactivated { .. })));
}

#[tokio::test]
async fn test_relay_passes_keys_through_when_not_routing() {
    let tv = FakeTv::spawn(Script::AckRegister).await;
    let dir = tempdir().unwrap();
    let relay = VolumeRelay::builder()
        .config(tv.config())
        .host_volume(MockHostVolume::new(0.3))
        .key_store(KeyStore::at(dir.path().join("client_key.txt")))
        .resolver(matching_resolver())
        .start()
        .await
        .unwrap();

    // Not paired, no endpoint reported: the key belongs to the host.
    assert_eq!(
        relay.key_pressed(VolumeKey::Up),
        KeyDisposition::PassThrough
    );
    assert!(tv.frames().is_empty());
}

#[tokio::test]
async fn test_pairing_success_nudges_the_television_to_a_safe_volume() {
    let tv = FakeTv::spawn(Script::CannedFrames(vec![registered_frame(GRANTED_KEY)])).await;
    let dir = tempdir().unwrap();
    let relay = VolumeRelay::builder()
        .config(tv.config())
        .host_volume(MockHostVolume::new(0.3))
        .key_store(KeyStore::at(dir.path().join("client_key.txt")))
        .resolver(matching_resolver())
        .start()
        .await
        .unwrap();

    relay.pair().await.unwrap();
    assert!(relay.is_paired());

    // The pairing exchange, then a second session spending the fresh
    // credential on the baseline volume.
    let frames = tv.wait_for_frames(3).await;
    assert_eq!(frames.len(), 3);
    assert!(frames[1].contains(GRANTED_KEY));
    assert!(frames[2].contains("ssap://audio/setVolume"));
    assert!(frames[2].contains("\"volume\":10"));
}

#[tokio::test]
async fn test_unpair_nudges_the_television_to_a_safe_volume() {
    let tv = FakeTv::spawn(Script::AckRegister).await;
    let dir = tempdir().unwrap();
    let key_path = dir.path().join("client_key.txt");
    std::fs::write(&key_path, "earlier-key\n").unwrap();

    let relay = VolumeRelay::builder()
        .config(tv.config())
        .host_volume(MockHostVolume::new(0.3))
        .key_store(KeyStore::at(key_path))
        .resolver(matching_resolver())
        .start()
        .await
        .unwrap();

    relay.unpair().await.unwrap();
    assert!(!relay.is_paired());

    // The nudge rides one last authenticated session before the key goes.
    let frames = tv.wait_for_frames(2).await;
    assert_eq!(frames.len(), 2);
    assert!(frames[0].contains("\"client-key\":\"earlier-key\""));
    assert!(frames[1].contains("ssap://audio/setVolume"));
    assert!(frames[1].contains("\"volume\":10"));
}

/// This test requires a real LG television on the local network and should
/// be run manually: approve the pairing prompt when it appears.
#[tokio::test]
#[ignore = "requires an LG television on the network"]
async fn test_real_television() {
    let address = std::env::var("TV_ADDRESS").expect("set TV_ADDRESS");
    let mac = std::env::var("TV_MAC").expect("set TV_MAC");
    let dir = tempdir().unwrap();

    let client = TvClient::new(
        RelayConfig {
            address,
            mac_address: mac,
            ..RelayConfig::default()
        },
        KeyStore::at(dir.path().join("client_key.txt")),
    );

    client
        .pair()
        .await
        .expect("pairing failed; was the prompt approved?");
    client.volume_up().await.expect("volume step failed");
}
