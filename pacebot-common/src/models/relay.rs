// File: pacebot-common/src/models/relay.rs
//
// Wire protocol spoken between the relay hub and its clients. Frames are
// JSON text messages shaped `{ "event": ..., "payload": ..., "source": ... }`.
// Events are ephemeral: the hub never persists or replays them.

use serde::{Deserialize, Serialize};

use crate::models::channel::ChannelConfig;

/// Payload for `joinChannel` / `leaveChannel` pushes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelTarget {
    pub channel_name: String,
}

/// Payload for `configUpdate`: the full new config, not a diff, so
/// repeated delivery converges instead of drifting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdatePayload {
    pub channel_name: String,
    pub config: ChannelConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamAlertPayload {
    pub user_name: String,
    pub title: String,
    #[serde(default)]
    pub game_name: Option<String>,
    pub stream_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceRoomPayload {
    pub race_room_url: String,
    /// Scheduled start, epoch milliseconds.
    pub start_timestamp: i64,
}

/// Every event the hub brokers. A closed set: adding a variant is a
/// compile-time-checked change for every handler match in the front-ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum RelayEvent {
    JoinChannel(ChannelTarget),
    LeaveChannel(ChannelTarget),
    ConfigUpdate(ConfigUpdatePayload),
    StreamAlert(StreamAlertPayload),
    WeeklyRaceRoomCreated(RaceRoomPayload),
}

impl RelayEvent {
    /// The wire name of this event, for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            RelayEvent::JoinChannel(_) => "joinChannel",
            RelayEvent::LeaveChannel(_) => "leaveChannel",
            RelayEvent::ConfigUpdate(_) => "configUpdate",
            RelayEvent::StreamAlert(_) => "streamAlert",
            RelayEvent::WeeklyRaceRoomCreated(_) => "weeklyRaceRoomCreated",
        }
    }
}

/// One frame on the hub wire: the event plus the producing client's id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayEnvelope {
    #[serde(flatten)]
    pub event: RelayEvent,
    pub source: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_event_wire_format() {
        let envelope = RelayEnvelope {
            event: RelayEvent::JoinChannel(ChannelTarget {
                channel_name: "zeldaruns".into(),
            }),
            source: "api-test".into(),
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["event"], "joinChannel");
        assert_eq!(json["payload"]["channelName"], "zeldaruns");
        assert_eq!(json["source"], "api-test");
    }

    #[test]
    fn race_room_round_trip() {
        let envelope = RelayEnvelope {
            event: RelayEvent::WeeklyRaceRoomCreated(RaceRoomPayload {
                race_room_url: "https://racetime.gg/alttp/eager-room-1234".into(),
                start_timestamp: 1_754_200_000_000,
            }),
            source: "race-watcher".into(),
        };
        let json = serde_json::to_string(&envelope).unwrap();
        let back: RelayEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, envelope);
    }

    #[test]
    fn unknown_event_name_is_rejected() {
        let frame = r#"{"event":"selfDestruct","payload":{},"source":"x"}"#;
        assert!(serde_json::from_str::<RelayEnvelope>(frame).is_err());
    }

    #[test]
    fn missing_payload_is_rejected() {
        let frame = r#"{"event":"joinChannel","source":"x"}"#;
        assert!(serde_json::from_str::<RelayEnvelope>(frame).is_err());
    }
}
