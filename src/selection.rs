use std::sync::Arc;

use tracing::{debug, warn};

use crate::bridge::{Notice, PresentationBridge, RenderEvent};
use crate::catalog::{Product, find_product};
use crate::storage::DurableStorage;

pub const STORAGE_KEY: &str = "selected-products";

pub fn serialize_selection(items: &[Product]) -> Result<String, serde_json::Error> {
    serde_json::to_string(items)
}

/// Parses a snapshot, keeping the first occurrence of each id.
pub fn deserialize_selection(raw: &str) -> Result<Vec<Product>, serde_json::Error> {
    let parsed: Vec<Product> = serde_json::from_str(raw)?;
    let mut out: Vec<Product> = Vec::with_capacity(parsed.len());
    for p in parsed {
        if !out.iter().any(|q| q.id == p.id) {
            out.push(p);
        }
    }
    Ok(out)
}

/// Ordered, id-unique set of selected products mirrored to durable storage.
///
/// Every mutation writes the whole set before returning. A failed write is
/// logged and the in-memory set stays authoritative for the session.
pub struct SelectionStore<S: DurableStorage> {
    items: Vec<Product>,
    storage: S,
    bridge: Arc<dyn PresentationBridge>,
}

impl<S: DurableStorage> SelectionStore<S> {
    pub fn new(storage: S, bridge: Arc<dyn PresentationBridge>) -> Self {
        Self { items: Vec::new(), storage, bridge }
    }

    /// Loads the durable snapshot. Returns whether one was found.
    pub async fn restore(&mut self) -> bool {
        let raw = match self.storage.read(STORAGE_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                self.items.clear();
                return false;
            }
            Err(e) => {
                warn!(error = %e, "failed to read saved selection");
                self.items.clear();
                return false;
            }
        };
        match deserialize_selection(&raw) {
            Ok(items) => {
                debug!(count = items.len(), "restored selection");
                self.items = items;
                self.emit_changed();
                true
            }
            Err(e) => {
                warn!(error = %e, "saved selection is corrupt; starting empty");
                self.items.clear();
                false
            }
        }
    }

    /// Removes `id` if selected, otherwise inserts it from `catalog`.
    /// Ids unknown to the catalog are ignored.
    pub async fn toggle(&mut self, id: i64, catalog: &[Product]) {
        if self.contains(id) {
            self.items.retain(|p| p.id != id);
        } else {
            match find_product(catalog, id) {
                Some(product) => self.items.push(product.clone()),
                None => {
                    debug!(id, "toggle ignored: product not in catalog");
                    return;
                }
            }
        }
        self.commit().await;
    }

    pub async fn remove(&mut self, id: i64) {
        self.items.retain(|p| p.id != id);
        self.commit().await;
    }

    pub async fn clear(&mut self) {
        self.items.clear();
        self.commit().await;
        self.bridge.render(RenderEvent::Notice { notice: Notice::SelectionCleared });
    }

    pub fn list(&self) -> &[Product] { &self.items }

    pub fn contains(&self, id: i64) -> bool { self.items.iter().any(|p| p.id == id) }

    pub fn len(&self) -> usize { self.items.len() }

    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    async fn commit(&mut self) {
        self.persist().await;
        self.emit_changed();
    }

    async fn persist(&self) {
        let raw = match serialize_selection(&self.items) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "failed to serialize selection");
                return;
            }
        };
        if let Err(e) = self.storage.write(STORAGE_KEY, &raw).await {
            warn!(error = %e, "failed to save selection");
        }
    }

    fn emit_changed(&self) {
        self.bridge.render(RenderEvent::SelectionChanged { selected: self.items.clone() });
    }
}
