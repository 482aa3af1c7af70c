//! Message Store
//!
//! Envelopes keyed by content hash. The hash is recomputed on submit, so a
//! stored envelope always matches its key.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::debug;
use shade_privacy::{ContentEnvelope, Field};

use crate::error::{CoreError, Result};

#[derive(Debug, Default)]
pub struct MessageStore {
    sequence: AtomicU64,
    messages: DashMap<Field, (u64, ContentEnvelope)>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an envelope, returning its content hash.
    pub fn submit(&self, envelope: ContentEnvelope) -> Result<Field> {
        if !envelope.verify_hash() {
            return Err(CoreError::EncodingMismatch(format!(
                "content hash {} does not match envelope",
                envelope.content_hash
            )));
        }

        let hash = envelope.content_hash;
        match self.messages.entry(hash) {
            Entry::Occupied(_) => Err(CoreError::DuplicateMessage(hash.to_hex())),
            Entry::Vacant(slot) => {
                let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
                debug!("stored message {} for {}", hash, envelope.recipient_key);
                slot.insert((seq, envelope));
                Ok(hash)
            }
        }
    }

    pub fn get(&self, content_hash: &Field) -> Option<ContentEnvelope> {
        self.messages.get(content_hash).map(|m| m.value().1.clone())
    }

    /// Envelopes addressed to `recipient_key`, oldest first.
    pub fn inbox(&self, recipient_key: &Field) -> Vec<ContentEnvelope> {
        let mut found: Vec<(u64, ContentEnvelope)> = self
            .messages
            .iter()
            .filter(|m| &m.value().1.recipient_key == recipient_key)
            .map(|m| m.value().clone())
            .collect();
        found.sort_by_key(|(seq, _)| *seq);
        found.into_iter().map(|(_, envelope)| envelope).collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
