//! Per-section reload signalling.
//!
//! # Responsibilities
//! - Map configuration section identifiers to dedicated signal channels
//! - Deliver "please reload" signals without ever blocking the writer
//! - Hand each section's receiving end to exactly one listener
//!
//! # Design Decisions
//! - One channel per section, so a slow consumer never delays other sections
//! - Unbounded channels: signals written before a listener subscribes are
//!   buffered and delivered in order once it does
//! - Subscribing again creates a fresh channel and retires the previous reader

use std::sync::Arc;
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::observability::metrics;

struct Entry {
    tx: mpsc::UnboundedSender<()>,
    /// Receiving end not yet claimed by a listener.
    rx: Option<mpsc::UnboundedReceiver<()>>,
}

impl Entry {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx: Some(rx) }
    }
}

/// Registry of reload channels keyed by configuration section.
#[derive(Clone, Default)]
pub struct ReloadRegistry {
    channels: Arc<DashMap<String, Entry>>,
}

impl ReloadRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sending end of a section's channel, creating the entry if absent.
    pub fn get(&self, section: &str) -> mpsc::UnboundedSender<()> {
        self.channels
            .entry(section.to_string())
            .or_insert_with(Entry::new)
            .tx
            .clone()
    }

    /// Claim the receiving end of a section's channel.
    ///
    /// The first subscriber receives every signal buffered so far. A later
    /// subscriber gets a fresh channel, which ends the previous reader.
    pub fn subscribe(&self, section: &str) -> ReloadReceiver {
        let mut entry = self
            .channels
            .entry(section.to_string())
            .or_insert_with(Entry::new);
        let rx = match entry.rx.take() {
            Some(rx) => rx,
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                entry.tx = tx;
                rx
            }
        };
        ReloadReceiver {
            section: section.to_string(),
            rx,
        }
    }

    /// Signal that a section should be reloaded.
    ///
    /// Never blocks. If the section's reader has gone away the signal is kept
    /// for the next subscriber.
    pub fn notify(&self, section: &str) {
        metrics::record_reload_notification(section);
        if self.get(section).send(()).is_ok() {
            tracing::debug!(section = %section, "Reload signal queued");
            return;
        }

        let mut entry = self
            .channels
            .entry(section.to_string())
            .or_insert_with(Entry::new);
        if entry.tx.is_closed() {
            *entry = Entry::new();
        }
        let _ = entry.tx.send(());
        tracing::debug!(section = %section, "Reload signal buffered for next subscriber");
    }

    /// Sections known to the registry.
    pub fn sections(&self) -> Vec<String> {
        let mut sections: Vec<String> = self.channels.iter().map(|e| e.key().clone()).collect();
        sections.sort();
        sections
    }
}

/// Receiving end of one section's reload channel.
#[derive(Debug)]
pub struct ReloadReceiver {
    section: String,
    rx: mpsc::UnboundedReceiver<()>,
}

impl ReloadReceiver {
    /// Section this receiver listens to.
    pub fn section(&self) -> &str {
        &self.section
    }

    /// Wait for the next reload signal.
    ///
    /// Returns `None` once the channel has been replaced by a newer subscriber.
    pub async fn recv(&mut self) -> Option<()> {
        self.rx.recv().await
    }
}
