//! Wire frames for the television's remote-control protocol.
//!
//! The television speaks JSON text frames over a WebSocket. Two frame kinds
//! matter here: `register`, which authenticates (or initiates pairing when no
//! credential is included), and `request`, which invokes one action URI with
//! an optional payload. Responses are free-form; the only fields this client
//! ever reads back are the pairing credential and the mute flag.

use serde_json::{json, Value};

/// Increments the television volume by one step.
pub(crate) const URI_VOLUME_UP: &str = "ssap://audio/volumeUp";

/// Decrements the television volume by one step.
pub(crate) const URI_VOLUME_DOWN: &str = "ssap://audio/volumeDown";

/// Sets the absolute television volume. Payload: `{"volume": <0-100>}`.
pub(crate) const URI_SET_VOLUME: &str = "ssap://audio/setVolume";

/// Sets the television mute state. Payload: `{"mute": <bool>}`.
pub(crate) const URI_SET_MUTE: &str = "ssap://audio/setMute";

/// Queries the current audio status; the reply carries a `muted` flag.
pub(crate) const URI_GET_STATUS: &str = "ssap://audio/getStatus";

/// Message id used for register frames. The television echoes it back; this
/// client never correlates, so a fixed id is enough.
const REGISTER_ID: &str = "register_0";

/// Message id used for request frames.
const REQUEST_ID: &str = "req_0";

/// Builds a `register` frame.
///
/// With a credential the television re-admits the client silently; without
/// one it shows its pairing prompt and the eventual `registered` response
/// carries a fresh `client-key`.
pub(crate) fn register_message(client_key: Option<&str>) -> String {
    let mut payload = json!({
        "forcePairing": false,
        "pairingType": "PROMPT",
        "manifest": {
            "manifestVersion": 1,
            "appVersion": "1.0",
            "appId": "com.tv-volume-relay",
            "vendorId": "tv-volume-relay",
            "localizedAppNames": { "": "TV Volume Relay" },
            "localizedVendorNames": { "": "TV Volume Relay" },
            "permissions": ["CONTROL_AUDIO"]
        }
    });
    if let Some(key) = client_key {
        payload["client-key"] = json!(key);
    }
    json!({
        "type": "register",
        "id": REGISTER_ID,
        "payload": payload,
    })
    .to_string()
}

/// Builds a `request` frame for the given action URI.
pub(crate) fn request_message(uri: &str, payload: Option<Value>) -> String {
    let mut message = json!({
        "type": "request",
        "id": REQUEST_ID,
        "uri": uri,
    });
    if let Some(payload) = payload {
        message["payload"] = payload;
    }
    message.to_string()
}

/// Pulls a pairing credential out of a response frame, if present.
///
/// Televisions put it at `payload.client-key`; the root is checked too so a
/// terser firmware still pairs.
pub(crate) fn extract_client_key(frame: &str) -> Option<String> {
    let value: Value = serde_json::from_str(frame).ok()?;
    value["payload"]["client-key"]
        .as_str()
        .or_else(|| value["client-key"].as_str())
        .map(str::to_string)
}

/// Pulls the mute flag out of an audio status frame, if present.
pub(crate) fn extract_muted_flag(frame: &str) -> Option<bool> {
    let value: Value = serde_json::from_str(frame).ok()?;
    value["payload"]["muted"]
        .as_bool()
        .or_else(|| value["muted"].as_bool())
}
