/**
 * MQTT PUSH FEED - fleet snapshots published on the event bus
 *
 * ROLE:
 * Subscribes to the snapshot topic and turns every publish into a
 * `FeedEvent` for `robofleet_core::sync::spawn_feed`. Each payload is a
 * complete robot array, decoded whole or rejected whole.
 *
 * RECONNECT:
 * Broker errors are forwarded as `SourceUnavailable`, then the event loop
 * retries after a short pause. The topic is re-subscribed on every ConnAck.
 */

use crate::config::MqttConf;
use crate::health::HealthTracker;
use robofleet_core::{decode_snapshot, FeedEvent, FleetError};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{self, JoinHandle};
use tracing::{debug, info, warn};

const FEED_CAPACITY: usize = 16;

/// Maps one incoming publish to a feed event; other topics are ignored.
pub fn decode_publish(topic: &str, expected_topic: &str, payload: &[u8]) -> Option<FeedEvent> {
    (topic == expected_topic).then(|| decode_snapshot(payload))
}

pub fn spawn_mqtt_feed(conf: &MqttConf, health: HealthTracker) -> (mpsc::Receiver<FeedEvent>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(FEED_CAPACITY);
    let conf = conf.clone();

    let handle = task::spawn(async move {
        let client_id = format!("robofleet-monitor-{}", uuid::Uuid::new_v4().simple());
        let mut opts = MqttOptions::new(client_id, &conf.host, conf.port);
        opts.set_keep_alive(Duration::from_secs(15));
        opts.set_max_packet_size(4 * 1024 * 1024, 4 * 1024 * 1024);

        let (client, mut eventloop) = AsyncClient::new(opts, 10);
        info!(broker = %format!("{}:{}", conf.host, conf.port), topic = %conf.topic, "mqtt feed starting");

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    health.mark_transport_connected();
                    if let Err(e) = client.try_subscribe(&conf.topic, QoS::AtLeastOnce) {
                        warn!(error = ?e, topic = %conf.topic, "mqtt subscribe failed");
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(p))) => {
                    let Some(event) = decode_publish(&p.topic, &conf.topic, &p.payload) else {
                        debug!(topic = %p.topic, "ignoring publish on unrelated topic");
                        continue;
                    };
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    health.increment_reconnects();
                    let event = Err(FleetError::unavailable(format!("mqtt broker: {e}")));
                    if tx.send(event).await.is_err() {
                        break;
                    }
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }

        health.mark_transport_stopped();
        info!("mqtt feed stopped");
    });

    (rx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOPIC: &str = "robofleet/robots/snapshot@v1";

    #[test]
    fn test_decode_publish_on_topic() {
        let payload = br#"[{"Robot ID": "r1", "Online/Offline": true, "Battery Percentage": 40,
            "CPU Usage": 3, "RAM Consumption": 128, "Last Updated": "2024-06-01 10:00:00",
            "Location Coordinates": [1.0, 2.0]}]"#;
        let snapshot = decode_publish(TOPIC, TOPIC, payload).unwrap().unwrap();
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn test_decode_publish_rejects_non_array() {
        let event = decode_publish(TOPIC, TOPIC, br#"{"robots": []}"#).unwrap();
        assert!(event.unwrap_err().is_malformed());
    }

    #[test]
    fn test_other_topics_ignored() {
        assert!(decode_publish("robofleet/other", TOPIC, b"[]").is_none());
    }
}
