//! Outbound notifications.

mod telegram;

use anyhow::Result;
use std::collections::BTreeSet;
use std::path::Path;

pub use telegram::{escape_html, TelegramNotifier};

/// Delivers a caption together with a media attachment.
pub trait Notifier: Send {
    /// Send the GIF at `path` as an inline animation.
    fn send_animation(&mut self, caption: &str, path: &Path) -> Result<()>;

    /// Send an encoded JPEG as a photo.
    fn send_photo(&mut self, caption: &str, jpeg: Vec<u8>) -> Result<()>;
}

impl<T: Notifier + ?Sized> Notifier for Box<T> {
    fn send_animation(&mut self, caption: &str, path: &Path) -> Result<()> {
        (**self).send_animation(caption, path)
    }

    fn send_photo(&mut self, caption: &str, jpeg: Vec<u8>) -> Result<()> {
        (**self).send_photo(caption, jpeg)
    }
}

/// `"Jerry, Tom detected in the litter tray."`
pub fn detection_caption(subjects: &BTreeSet<String>) -> String {
    let names: Vec<&str> = subjects.iter().map(String::as_str).collect();
    format!("{} detected in the litter tray.", names.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caption_lists_subjects_in_sorted_order() {
        let subjects: BTreeSet<String> = ["Tom", "Jerry"].iter().map(|s| s.to_string()).collect();
        assert_eq!(
            detection_caption(&subjects),
            "Jerry, Tom detected in the litter tray."
        );
    }

    #[test]
    fn single_subject_caption() {
        let subjects: BTreeSet<String> = std::iter::once("Tom".to_string()).collect();
        assert_eq!(detection_caption(&subjects), "Tom detected in the litter tray.");
    }
}
