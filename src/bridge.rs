use std::sync::Mutex;

use serde::Serialize;

use crate::catalog::Product;
use crate::conversation::Message;
use crate::error::CompletionError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductCard {
    pub product: Product,
    pub selected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Notice {
    SelectionCleared,
    NothingToClear,
    SelectProductsFirst,
}

impl Notice {
    pub fn text(&self) -> &'static str {
        match self {
            Notice::SelectionCleared => "All selected products have been cleared!",
            Notice::NothingToClear => "No products selected to clear.",
            Notice::SelectProductsFirst => "Please select some products first to generate a routine!",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    SelectionChanged { selected: Vec<Product> },
    CatalogChanged { category: String, cards: Vec<ProductCard> },
    MessageAppended { message: Message },
    Pending { label: String },
    PendingCleared,
    Notice { notice: Notice },
    ChatFailed { error: CompletionError },
}

/// Receives render triggers. Implementations must tolerate repeated events
/// carrying identical state.
pub trait PresentationBridge: Send + Sync {
    fn render(&self, event: RenderEvent);
}

/// Bridge that keeps every event it receives, in order.
#[derive(Debug, Default)]
pub struct RecordingBridge {
    events: Mutex<Vec<RenderEvent>>,
}

impl RecordingBridge {
    pub fn new() -> Self { Self::default() }

    pub fn events(&self) -> Vec<RenderEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn take(&self) -> Vec<RenderEvent> {
        self.events.lock().map(|mut e| std::mem::take(&mut *e)).unwrap_or_default()
    }
}

impl PresentationBridge for RecordingBridge {
    fn render(&self, event: RenderEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Bridge that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBridge;

impl PresentationBridge for NullBridge {
    fn render(&self, _event: RenderEvent) {}
}
