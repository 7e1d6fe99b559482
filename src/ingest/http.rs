use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use std::io::Read;
use std::time::Duration;
use url::Url;

use super::StillSource;

const MAX_JPEG_BYTES: u64 = 5 * 1024 * 1024;

/// Fetches a JPEG snapshot over HTTP(S) on every call.
///
/// Animation frames use their own, usually shorter, timeout so a stalled
/// camera cannot stretch the capture window.
pub struct HttpStillSource {
    agent: ureq::Agent,
    url: Url,
    still_timeout: Duration,
    frame_timeout: Duration,
}

impl HttpStillSource {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url).with_context(|| format!("invalid image URL '{}'", url))?;
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(anyhow!("unsupported image URL scheme: {}", other)),
        }
        let agent = ureq::AgentBuilder::new().build();
        Ok(Self {
            agent,
            url,
            still_timeout: timeout,
            frame_timeout: timeout,
        })
    }

    pub fn with_frame_timeout(mut self, timeout: Duration) -> Self {
        self.frame_timeout = timeout;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn fetch_jpeg(&self, timeout: Duration) -> Result<Vec<u8>> {
        let request = self.agent.request_url("GET", &self.url).timeout(timeout);
        let response = match request.call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => {
                return Err(anyhow!("snapshot request to {} returned HTTP {}", self.url, code))
            }
            Err(e) => return Err(e).with_context(|| format!("fetch snapshot from {}", self.url)),
        };
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_JPEG_BYTES + 1)
            .read_to_end(&mut bytes)
            .context("read snapshot body")?;
        if bytes.is_empty() {
            return Err(anyhow!("empty snapshot from {}", self.url));
        }
        if bytes.len() as u64 > MAX_JPEG_BYTES {
            return Err(anyhow!(
                "snapshot from {} exceeds {} bytes",
                self.url,
                MAX_JPEG_BYTES
            ));
        }
        Ok(bytes)
    }
}

impl StillSource for HttpStillSource {
    fn fetch_still(&mut self) -> Result<RgbImage> {
        decode_jpeg(&self.fetch_jpeg(self.still_timeout)?)
    }

    fn fetch_frame(&mut self) -> Result<RgbImage> {
        decode_jpeg(&self.fetch_jpeg(self.frame_timeout)?)
    }
}

fn decode_jpeg(bytes: &[u8]) -> Result<RgbImage> {
    let image = image::load_from_memory(bytes).context("decode snapshot")?;
    Ok(image.into_rgb8())
}
