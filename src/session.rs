use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bridge::{Notice, PresentationBridge, ProductCard, RenderEvent};
use crate::catalog::{CatalogSource, Product, filter_by_category};
use crate::completion::CompletionClient;
use crate::conversation::{Message, Transcript};
use crate::error::{CatalogError, CompletionError};
use crate::prompt;
use crate::selection::SelectionStore;
use crate::settings::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
use crate::storage::DurableStorage;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChatParams {
    pub max_tokens: u32,
    pub temperature: f64,
}

impl Default for ChatParams {
    fn default() -> Self {
        Self { max_tokens: DEFAULT_MAX_TOKENS, temperature: DEFAULT_TEMPERATURE }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundTripState {
    Idle,
    Sending,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoundTripOutcome {
    Answered(String),
    Failed(CompletionError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundTripKind {
    Chat,
    Routine,
}

impl RoundTripKind {
    fn pending_label(&self) -> &'static str {
        match self {
            RoundTripKind::Chat => "Thinking...",
            RoundTripKind::Routine => "Creating your personalized routine...",
        }
    }
}

/// A submitted round-trip whose exchange has not resolved yet. Holds its own
/// snapshot of the transcript so the session stays free while it runs.
#[derive(Debug, Clone)]
pub struct PendingRoundTrip {
    pub id: Uuid,
    pub kind: RoundTripKind,
    pub transcript: Transcript,
    pub system_prompt: String,
    pub params: ChatParams,
}

impl PendingRoundTrip {
    pub async fn exchange(&self, client: &dyn CompletionClient) -> Result<String, CompletionError> {
        client
            .request_completion(
                &self.transcript,
                &self.system_prompt,
                self.params.max_tokens,
                self.params.temperature,
            )
            .await
    }
}

/// One user's selection and conversation, plus the UI filter state that
/// decides which catalog cards are shown.
pub struct ChatSession<S: DurableStorage> {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    selection: SelectionStore<S>,
    transcript: Transcript,
    catalog: Arc<dyn CatalogSource>,
    client: Arc<dyn CompletionClient>,
    bridge: Arc<dyn PresentationBridge>,
    active_category: Option<String>,
    in_flight: usize,
    params: ChatParams,
}

impl<S: DurableStorage> ChatSession<S> {
    pub fn new(
        storage: S,
        catalog: Arc<dyn CatalogSource>,
        client: Arc<dyn CompletionClient>,
        bridge: Arc<dyn PresentationBridge>,
        params: ChatParams,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            selection: SelectionStore::new(storage, bridge.clone()),
            transcript: Transcript::new(),
            catalog,
            client,
            bridge,
            active_category: None,
            in_flight: 0,
            params,
        }
    }

    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.active_category = category.filter(|c| !c.is_empty());
        self
    }

    /// Restores the saved selection and redraws the catalog if a category is
    /// already chosen.
    pub async fn start(&mut self) -> Result<(), CatalogError> {
        let restored = self.selection.restore().await;
        info!(session = %self.id, restored, selected = self.selection.len(), "session started");
        if restored {
            self.refresh_catalog_view(None).await?;
        }
        Ok(())
    }

    pub async fn select_category(&mut self, category: &str) -> Result<(), CatalogError> {
        self.active_category = Some(category.to_string()).filter(|c| !c.is_empty());
        self.refresh_catalog_view(None).await
    }

    pub async fn toggle_product(&mut self, id: i64) -> Result<(), CatalogError> {
        let products = self.catalog.load().await?;
        self.selection.toggle(id, &products).await;
        self.refresh_catalog_view(Some(&products[..])).await
    }

    pub async fn remove_product(&mut self, id: i64) -> Result<(), CatalogError> {
        self.selection.remove(id).await;
        self.refresh_catalog_view(None).await
    }

    /// Clears the selection, or emits a notice when there is nothing to
    /// clear. Returns whether anything was cleared.
    pub async fn request_clear(&mut self) -> Result<bool, CatalogError> {
        if self.selection.is_empty() {
            self.bridge.render(RenderEvent::Notice { notice: Notice::NothingToClear });
            return Ok(false);
        }
        self.selection.clear().await;
        self.refresh_catalog_view(None).await?;
        Ok(true)
    }

    /// Runs a freeform chat round-trip. Blank input is ignored.
    pub async fn send_message(&mut self, text: &str) -> Option<RoundTripOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let pending = self.begin_round_trip(RoundTripKind::Chat, text);
        Some(self.run(pending).await)
    }

    pub async fn generate_routine(&mut self) -> Option<RoundTripOutcome> {
        if self.selection.is_empty() {
            self.bridge.render(RenderEvent::Notice { notice: Notice::SelectProductsFirst });
            return None;
        }
        let request = prompt::routine_request(self.selection.list());
        let pending = self.begin_round_trip(RoundTripKind::Routine, &request);
        Some(self.run(pending).await)
    }

    async fn run(&mut self, pending: PendingRoundTrip) -> RoundTripOutcome {
        let client = self.client.clone();
        let result = pending.exchange(client.as_ref()).await;
        self.finish_round_trip(pending, result)
    }

    /// Appends the user message and snapshots everything the exchange needs.
    pub fn begin_round_trip(&mut self, kind: RoundTripKind, content: &str) -> PendingRoundTrip {
        let message = self.transcript.append_user(content).clone();
        self.bridge.render(RenderEvent::MessageAppended { message });
        self.in_flight += 1;
        self.bridge.render(RenderEvent::Pending { label: kind.pending_label().to_string() });

        let selected = self.selection.list();
        let system_prompt = match kind {
            RoundTripKind::Chat => prompt::chat_system_prompt(selected),
            RoundTripKind::Routine => prompt::routine_system_prompt(selected),
        };
        let pending = PendingRoundTrip {
            id: Uuid::new_v4(),
            kind,
            transcript: self.transcript.clone(),
            system_prompt,
            params: self.params,
        };
        debug!(session = %self.id, round_trip = %pending.id, ?kind, "round-trip sending");
        pending
    }

    /// Applies a resolved exchange. Results are appended in the order they
    /// are finished, not the order they were begun.
    pub fn finish_round_trip(
        &mut self,
        pending: PendingRoundTrip,
        result: Result<String, CompletionError>,
    ) -> RoundTripOutcome {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.bridge.render(RenderEvent::PendingCleared);
        match result {
            Ok(content) => {
                let message = self.transcript.append_assistant(content.clone()).clone();
                self.bridge.render(RenderEvent::MessageAppended { message });
                debug!(session = %self.id, round_trip = %pending.id, "round-trip answered");
                RoundTripOutcome::Answered(content)
            }
            Err(error) => {
                warn!(
                    session = %self.id,
                    round_trip = %pending.id,
                    error = %error,
                    "round-trip failed"
                );
                self.bridge.render(RenderEvent::ChatFailed { error: error.clone() });
                RoundTripOutcome::Failed(error)
            }
        }
    }

    pub fn state(&self) -> RoundTripState {
        if self.in_flight > 0 { RoundTripState::Sending } else { RoundTripState::Idle }
    }

    pub fn selection(&self) -> &[Product] { self.selection.list() }

    pub fn transcript(&self) -> &[Message] { self.transcript.messages() }

    pub fn active_category(&self) -> Option<&str> { self.active_category.as_deref() }

    async fn refresh_catalog_view(&self, loaded: Option<&[Product]>) -> Result<(), CatalogError> {
        let Some(category) = self.active_category.as_deref() else { return Ok(()) };
        let fetched;
        let products = match loaded {
            Some(p) => p,
            None => {
                fetched = self.catalog.load().await?;
                &fetched[..]
            }
        };
        let cards = filter_by_category(products, category)
            .into_iter()
            .map(|p| ProductCard { product: p.clone(), selected: self.selection.contains(p.id) })
            .collect();
        self.bridge.render(RenderEvent::CatalogChanged { category: category.to_string(), cards });
        Ok(())
    }
}
