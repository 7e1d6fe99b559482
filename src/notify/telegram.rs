use anyhow::{anyhow, Context, Result};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;
use std::path::Path;

use super::Notifier;
use crate::config::TelegramSettings;

/// Telegram Bot API client for `sendAnimation` and `sendPhoto`.
pub struct TelegramNotifier {
    client: Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(settings: &TelegramSettings) -> Result<Self> {
        let bot_token = settings
            .bot_token
            .clone()
            .ok_or_else(|| anyhow!("TELEGRAM_BOT_TOKEN is required"))?;
        let chat_id = settings
            .chat_id
            .clone()
            .ok_or_else(|| anyhow!("TELEGRAM_CHAT_ID is required"))?;
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .context("build Telegram HTTP client")?;
        Ok(Self {
            client,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            bot_token,
            chat_id,
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    fn post(&self, method: &str, form: Form) -> Result<()> {
        // reqwest errors carry the URL, which embeds the bot token.
        let response = self
            .client
            .post(self.endpoint(method))
            .multipart(form)
            .send()
            .map_err(|e| anyhow!(e.without_url()))
            .with_context(|| format!("Telegram {} request failed", method))?;
        let status = response.status();
        if status.is_success() {
            log::info!("Telegram {} succeeded ({})", method, status);
            return Ok(());
        }
        let body = response.text().unwrap_or_default();
        Err(anyhow!(
            "Telegram {} failed, status code: {}, response: {}",
            method,
            status,
            body
        ))
    }
}

impl Notifier for TelegramNotifier {
    fn send_animation(&mut self, caption: &str, path: &Path) -> Result<()> {
        let bytes =
            std::fs::read(path).with_context(|| format!("read animation {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "animation.gif".to_string());
        let form = Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("caption", escape_html(caption))
            .text("parse_mode", "HTML")
            .part(
                "animation",
                Part::bytes(bytes)
                    .file_name(file_name)
                    .mime_str("image/gif")?,
            );
        log::info!("Sending animation to Telegram...");
        self.post("sendAnimation", form)
    }

    fn send_photo(&mut self, caption: &str, jpeg: Vec<u8>) -> Result<()> {
        let form = Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("caption", caption.to_string())
            .part(
                "photo",
                Part::bytes(jpeg)
                    .file_name("snapshot.jpg")
                    .mime_str("image/jpeg")?,
            );
        log::info!("Sending snapshot to Telegram...");
        self.post("sendPhoto", form)
    }
}

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn settings() -> TelegramSettings {
        TelegramSettings {
            bot_token: Some("123:abc".to_string()),
            chat_id: Some("42".to_string()),
            api_base: "https://api.telegram.org/".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn escapes_html_control_characters() {
        assert_eq!(escape_html("Tom & <Jerry>"), "Tom &amp; &lt;Jerry&gt;");
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn endpoint_embeds_token_and_method() {
        let notifier = TelegramNotifier::new(&settings()).unwrap();
        assert_eq!(
            notifier.endpoint("sendPhoto"),
            "https://api.telegram.org/bot123:abc/sendPhoto"
        );
    }

    #[test]
    fn requires_token_and_chat() {
        let mut s = settings();
        s.chat_id = None;
        assert!(TelegramNotifier::new(&s).is_err());
        let mut s = settings();
        s.bot_token = None;
        assert!(TelegramNotifier::new(&s).is_err());
    }
}
