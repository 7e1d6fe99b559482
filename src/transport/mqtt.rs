use anyhow::{anyhow, Result};
use rumqttc::{Client, Connection, Event, MqttOptions, Packet, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::config::MqttSettings;
use crate::transport::tls::{parse_mqtt_endpoint, MqttEndpoint, TlsConfig, TlsMaterials, Verification};

const KEEP_ALIVE: Duration = Duration::from_secs(60);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_secs(1);
const REQUEST_CAPACITY: usize = 10;

/// Everything needed to (re)connect and subscribe.
#[derive(Clone, Debug)]
pub struct BusSettings {
    pub endpoint: MqttEndpoint,
    pub tls: TlsConfig,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topics: Vec<String>,
}

impl BusSettings {
    pub fn from_config(mqtt: &MqttSettings, topics: Vec<String>) -> Result<Self> {
        let endpoint = parse_mqtt_endpoint(&mqtt.broker, mqtt.port, mqtt.use_tls)?;
        let materials = TlsMaterials::load(
            mqtt.ca_path.as_deref(),
            mqtt.client_cert_path.as_deref(),
            mqtt.client_key_path.as_deref(),
        )?;
        let verification = if mqtt.tls_insecure {
            Verification::Insecure
        } else {
            Verification::Verify
        };
        if topics.is_empty() {
            return Err(anyhow!("no MQTT topics to subscribe to"));
        }
        Ok(Self {
            endpoint,
            tls: TlsConfig {
                verification,
                materials,
            },
            client_id: mqtt.client_id.clone(),
            username: mqtt.username.clone(),
            password: mqtt.password.clone(),
            topics,
        })
    }
}

/// A received publish.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl BusMessage {
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

fn connect(settings: &BusSettings) -> Result<(Client, Connection)> {
    let mut options = MqttOptions::new(
        settings.client_id.clone(),
        settings.endpoint.host.clone(),
        settings.endpoint.port,
    );
    options.set_keep_alive(KEEP_ALIVE);
    options.set_clean_session(true);
    if let Some(user) = settings.username.as_deref() {
        options.set_credentials(user, settings.password.as_deref().unwrap_or_default());
    }
    options.set_transport(settings.tls.build_transport(&settings.endpoint)?);

    let (client, connection) = Client::new(options, REQUEST_CAPACITY);
    for topic in &settings.topics {
        client.subscribe(topic.as_str(), QoS::AtMostOnce)?;
    }
    log::info!(
        "Connecting to MQTT broker {}:{} (TLS: {}, verification: {}, auth: {})",
        settings.endpoint.host,
        settings.endpoint.port,
        settings.endpoint.use_tls,
        settings.tls.verification,
        settings.username.is_some()
    );
    Ok((client, connection))
}

/// Subscribe to the configured topics and hand every publish to `on_message`
/// until `shutdown` is set.
///
/// Connection errors are logged and retried after a fixed delay. Only
/// configuration errors (bad TLS material) are returned.
pub fn run_subscriber<F>(settings: &BusSettings, shutdown: &AtomicBool, mut on_message: F) -> Result<()>
where
    F: FnMut(BusMessage),
{
    while !shutdown.load(Ordering::SeqCst) {
        let (client, mut connection) = connect(settings)?;

        while !shutdown.load(Ordering::SeqCst) {
            match connection.recv_timeout(POLL_INTERVAL) {
                Ok(Ok(Event::Incoming(Packet::ConnAck(ack)))) => {
                    log::info!(
                        "Connected to MQTT broker ({:?}), subscribed to {}",
                        ack.code,
                        settings.topics.join(", ")
                    );
                }
                Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => {
                    on_message(BusMessage {
                        topic: publish.topic.clone(),
                        payload: publish.payload.to_vec(),
                    });
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    log::error!("MQTT connection error: {}. Reconnecting...", e);
                    break;
                }
                // Nothing arrived within the poll interval.
                Err(rumqttc::RecvTimeoutError::Timeout) => {}
                Err(rumqttc::RecvTimeoutError::Disconnected) => {
                    log::warn!("MQTT connection closed. Reconnecting...");
                    break;
                }
            }
        }

        if shutdown.load(Ordering::SeqCst) {
            if let Err(e) = client.disconnect() {
                log::debug!("MQTT disconnect failed: {}", e);
            }
            break;
        }
        drop(client);
        sleep_unless_shutdown(RECONNECT_DELAY, shutdown);
    }
    log::info!("MQTT subscriber stopped");
    Ok(())
}

fn sleep_unless_shutdown(delay: Duration, shutdown: &AtomicBool) {
    let deadline = Instant::now() + delay;
    while !shutdown.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep((deadline - now).min(Duration::from_millis(200)));
    }
}
