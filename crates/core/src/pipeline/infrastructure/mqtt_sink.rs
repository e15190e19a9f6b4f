use std::fmt::Display;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use rumqttc::{Client, Connection, Event, MqttOptions, QoS};

use crate::pipeline::frame_sink::{DetectionEvent, FrameSink, SinkError};
use crate::shared::frame::Frame;

/// Connection settings for [`MqttSink`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub topic: String,
    pub client_id: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            topic: "camwatch/detections".into(),
            client_id: "camwatch".into(),
        }
    }
}

/// Publishes each frame's [`DetectionEvent`] as one JSON message (QoS 1).
///
/// The broker connection is driven on a background thread; publishing only
/// queues the message, so a slow broker does not stall the capture loop
/// until the request queue fills.
pub struct MqttSink {
    name: String,
    topic: String,
    client: Client,
    status: ConnectionStatus,
    connection_handle: Option<JoinHandle<()>>,
}

/// Last error seen by the connection thread, shared with the sink so a
/// failed publish can report why the broker went away.
#[derive(Clone, Default)]
struct ConnectionStatus {
    last_error: Arc<Mutex<Option<String>>>,
}

impl ConnectionStatus {
    fn record(&self, error: impl Display) {
        if let Ok(mut last) = self.last_error.lock() {
            *last = Some(error.to_string());
        }
    }

    fn explain(&self, error: impl Display) -> String {
        let last = self.last_error.lock().ok().and_then(|l| l.clone());
        match last {
            Some(cause) => format!("{error} (connection lost: {cause})"),
            None => error.to_string(),
        }
    }
}

impl MqttSink {
    pub fn connect(config: &MqttConfig) -> Self {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(30));
        let (client, connection) = Client::new(options, 10);
        let status = ConnectionStatus::default();
        log::info!(
            "Publishing detections to mqtt://{}:{}/{}",
            config.host,
            config.port,
            config.topic
        );
        Self {
            name: format!("mqtt://{}:{}", config.host, config.port),
            topic: config.topic.clone(),
            client,
            connection_handle: Some(drive_connection(connection, status.clone())),
            status,
        }
    }
}

fn drive_connection(mut connection: Connection, status: ConnectionStatus) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for event in connection.iter() {
            match event {
                Ok(Event::Incoming(_)) | Ok(Event::Outgoing(_)) => {}
                Err(e) => {
                    log::warn!("MQTT connection error: {e}");
                    status.record(e);
                    break;
                }
            }
        }
    })
}

fn payload(sink: &str, event: &DetectionEvent) -> Result<Vec<u8>, SinkError> {
    serde_json::to_vec(event).map_err(|source| SinkError::Encode {
        sink: sink.to_string(),
        source,
    })
}

impl FrameSink for MqttSink {
    fn emit(&mut self, _annotated: &Frame, event: &DetectionEvent) -> Result<(), SinkError> {
        let body = payload(&self.name, event)?;
        self.client
            .publish(self.topic.as_str(), QoS::AtLeastOnce, false, body)
            .map_err(|e| SinkError::other(self.name.clone(), self.status.explain(e)))
    }

    fn close(&mut self) -> Result<(), SinkError> {
        let result = self
            .client
            .disconnect()
            .map_err(|e| SinkError::other(self.name.clone(), self.status.explain(e)));
        if let Some(handle) = self.connection_handle.take() {
            let _ = handle.join();
        }
        result
    }
}
