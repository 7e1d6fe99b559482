//! MQTT transport for motion and activity triggers.
//!
//! Wraps the rumqttc blocking client with broker address parsing, TLS
//! selection and a reconnecting subscribe loop.

mod mqtt;
mod tls;

pub use mqtt::{run_subscriber, BusMessage, BusSettings};
pub use tls::{parse_mqtt_endpoint, MqttEndpoint, TlsConfig, TlsMaterials, Verification};
