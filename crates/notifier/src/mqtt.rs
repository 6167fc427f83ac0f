//! MQTT Publisher

use alarm_model::ChangeNotification;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, QoS};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::{Notifier, NotifyError};

/// Outgoing requests buffered while the broker is unreachable
const REQUEST_CAPACITY: usize = 64;

/// MQTT publisher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    /// MQTT broker host
    pub broker_url: String,
    /// MQTT port
    pub broker_port: u16,
    /// Client identifier presented to the broker
    pub client_id: String,
    /// Prefix prepended to every event topic
    pub topic_prefix: String,
    /// Keep-alive interval (seconds)
    pub keep_alive_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_url: "localhost".to_string(),
            broker_port: 1883,
            client_id: "alarm-api".to_string(),
            topic_prefix: "telemetry".to_string(),
            keep_alive_secs: 30,
        }
    }
}

/// Publishes alarm change events to an MQTT broker
pub struct MqttNotifier {
    config: MqttConfig,
    client: Option<AsyncClient>,
}

impl MqttNotifier {
    /// Create a notifier; call [`MqttNotifier::connect`] before publishing
    pub fn new(config: MqttConfig) -> Self {
        Self {
            config,
            client: None,
        }
    }

    /// Connect to MQTT broker
    pub async fn connect(&mut self) -> Result<(), NotifyError> {
        let mut options = MqttOptions::new(
            self.config.client_id.clone(),
            &self.config.broker_url,
            self.config.broker_port,
        );
        options.set_keep_alive(Duration::from_secs(self.config.keep_alive_secs));

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

        // Spawn event loop handler
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(incoming)) => {
                        debug!("MQTT incoming: {:?}", incoming);
                    }
                    Err(e) => {
                        error!("MQTT error: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                    _ => {}
                }
            }
        });

        self.client = Some(client);
        info!("Connected to MQTT broker: {}", self.config.broker_url);
        Ok(())
    }

    /// Full broker topic for an event topic such as `alarm.creation`
    pub fn broker_topic(&self, topic: &str) -> String {
        if self.config.topic_prefix.is_empty() {
            topic.to_string()
        } else {
            format!("{}/{}", self.config.topic_prefix, topic)
        }
    }
}

#[async_trait]
impl Notifier for MqttNotifier {
    async fn publish(&self, topic: &str, payload: &ChangeNotification) -> Result<(), NotifyError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| NotifyError::Connection("Not connected".to_string()))?;

        let body =
            serde_json::to_vec(payload).map_err(|e| NotifyError::Serialization(e.to_string()))?;

        // Never wait on a full request queue
        client
            .try_publish(self.broker_topic(topic), QoS::AtLeastOnce, false, body)
            .map_err(|e| NotifyError::Publish(e.to_string()))?;

        debug!(topic, event_id = %payload.event_id, "Published alarm change");
        Ok(())
    }
}
