//! TLS setup for the MQTT subscription.
//!
//! - CA verification: custom CA path or the bundled webpki roots
//! - Client certificates: mutual TLS support
//! - Insecure mode: accepts any broker certificate, explicit opt-in only

use anyhow::{anyhow, Context, Result};
use rumqttc::tokio_rustls::rustls;
use rumqttc::{TlsConfiguration, Transport};
use std::path::Path;
use std::sync::Arc;

/// How the broker certificate is checked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Verification {
    #[default]
    Verify,
    /// Accept any certificate and hostname. For self-signed home brokers.
    Insecure,
}

impl std::fmt::Display for Verification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Verify => write!(f, "verify"),
            Self::Insecure => write!(f, "insecure"),
        }
    }
}

/// TLS certificate materials for MQTT connections.
#[derive(Clone, Debug, Default)]
pub struct TlsMaterials {
    /// PEM-encoded CA certificate bytes. `None` uses the default roots.
    pub ca: Option<Vec<u8>>,

    /// Client certificate and key for mutual TLS.
    pub client_auth: Option<(Vec<u8>, Vec<u8>)>,
}

impl TlsMaterials {
    /// Load TLS materials from file paths.
    ///
    /// Client cert and key must be provided together.
    pub fn load(
        ca_path: Option<&Path>,
        client_cert_path: Option<&Path>,
        client_key_path: Option<&Path>,
    ) -> Result<Self> {
        let ca = match ca_path {
            Some(path) => Some(
                std::fs::read(path)
                    .with_context(|| format!("failed to read MQTT TLS CA '{}'", path.display()))?,
            ),
            None => None,
        };

        let client_auth = match (client_cert_path, client_key_path) {
            (Some(cert_path), Some(key_path)) => {
                let cert = std::fs::read(cert_path).with_context(|| {
                    format!(
                        "failed to read MQTT TLS client cert '{}'",
                        cert_path.display()
                    )
                })?;
                let key = std::fs::read(key_path).with_context(|| {
                    format!(
                        "failed to read MQTT TLS client key '{}'",
                        key_path.display()
                    )
                })?;
                Some((cert, key))
            }
            (None, None) => None,
            (Some(_), None) => {
                return Err(anyhow!("MQTT TLS client certificate provided without key"))
            }
            (None, Some(_)) => {
                return Err(anyhow!("MQTT TLS client key provided without certificate"))
            }
        };

        Ok(Self { ca, client_auth })
    }

    pub fn is_configured(&self) -> bool {
        self.ca.is_some() || self.client_auth.is_some()
    }
}

/// Resolved broker address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqttEndpoint {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}

#[derive(Clone, Debug, Default)]
pub struct TlsConfig {
    pub verification: Verification,
    pub materials: TlsMaterials,
}

impl TlsConfig {
    /// Build a rumqttc Transport for `endpoint`.
    pub fn build_transport(&self, endpoint: &MqttEndpoint) -> Result<Transport> {
        if !endpoint.use_tls {
            if self.materials.is_configured() || self.verification == Verification::Insecure {
                return Err(anyhow!(
                    "MQTT TLS options provided but TLS is disabled.\n\
                     Set MQTT_USE_TLS=true or use an mqtts:// broker address."
                ));
            }
            return Ok(Transport::tcp());
        }

        match self.verification {
            Verification::Verify => self.build_verified_transport(),
            Verification::Insecure => self.build_insecure_transport(),
        }
    }

    fn build_verified_transport(&self) -> Result<Transport> {
        if !self.materials.is_configured() {
            return Ok(Transport::tls_with_default_config());
        }

        let ca = self.materials.ca.clone().ok_or_else(|| {
            anyhow!(
                "MQTT TLS CA certificate is required when providing client certificates.\n\
                 Set MQTT_TLS_CA_PATH or remove the client cert configuration."
            )
        })?;

        Ok(Transport::tls(ca, self.materials.client_auth.clone(), None))
    }

    fn build_insecure_transport(&self) -> Result<Transport> {
        if self.materials.is_configured() {
            return Err(anyhow!(
                "MQTT_TLS_INSECURE cannot be combined with a CA or client certificates"
            ));
        }
        let config = rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(insecure::AcceptAnyCert::new()))
            .with_no_client_auth();
        log::warn!("MQTT TLS certificate verification is disabled");
        Ok(Transport::tls_with_config(TlsConfiguration::Rustls(
            Arc::new(config),
        )))
    }
}

mod insecure {
    use super::rustls;
    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, WebPkiSupportedAlgorithms};
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use rustls::{DigitallySignedStruct, SignatureScheme};

    /// Skips certificate chain and hostname checks. Handshake signatures are
    /// still verified.
    #[derive(Debug)]
    pub(super) struct AcceptAnyCert {
        algorithms: WebPkiSupportedAlgorithms,
    }

    impl AcceptAnyCert {
        pub(super) fn new() -> Self {
            Self {
                algorithms: rustls::crypto::ring::default_provider().signature_verification_algorithms,
            }
        }
    }

    impl ServerCertVerifier for AcceptAnyCert {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, rustls::Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            verify_tls12_signature(message, cert, dss, &self.algorithms)
        }

        fn verify_tls13_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            verify_tls13_signature(message, cert, dss, &self.algorithms)
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            self.algorithms.supported_schemes()
        }
    }
}

/// Parse the broker address.
///
/// Supports formats:
/// - `host` (port taken from `default_port`)
/// - `host:port`
/// - `mqtt://host[:port]` / `tcp://host[:port]` (plain TCP)
/// - `mqtts://host[:port]` / `ssl://host[:port]` (TLS)
/// - `[ipv6]:port`
pub fn parse_mqtt_endpoint(addr: &str, default_port: u16, tls_override: bool) -> Result<MqttEndpoint> {
    let mut use_tls = tls_override;
    let mut remainder = addr.trim();

    if let Some((scheme, rest)) = remainder.split_once("://") {
        match scheme {
            "mqtt" | "tcp" => use_tls = false,
            "mqtts" | "ssl" => use_tls = true,
            other => return Err(anyhow!("unsupported MQTT scheme: {}", other)),
        }
        remainder = rest.trim_end_matches('/');
    }
    if remainder.is_empty() {
        return Err(anyhow!("empty MQTT broker address"));
    }

    let (host, port) = split_host_port(remainder, default_port)?;
    Ok(MqttEndpoint {
        host,
        port,
        use_tls,
    })
}

fn split_host_port(addr: &str, default_port: u16) -> Result<(String, u16)> {
    // IPv6 addresses in brackets: [::1]:1883
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("invalid MQTT address: {}", addr))?;
        let port = match rest.strip_prefix(':') {
            Some(port) => port
                .parse()
                .with_context(|| format!("invalid MQTT port in {}", addr))?,
            None if rest.is_empty() => default_port,
            None => return Err(anyhow!("invalid MQTT address: {}", addr)),
        };
        return Ok((host.to_string(), port));
    }

    match addr.rsplit_once(':') {
        Some((host, port)) => {
            let port: u16 = port
                .parse()
                .with_context(|| format!("invalid MQTT port in {}", addr))?;
            Ok((host.to_string(), port))
        }
        None => Ok((addr.to_string(), default_port)),
    }
}
