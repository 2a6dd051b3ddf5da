//! External collaborators
//!
//! The engine talks to a text-generation model, a places/geocoding service
//! and a lodging/flight search. Each sits behind a trait so hosts and tests
//! can substitute them.
//! Their output is untrusted and re-validated before it reaches a session.

mod enrich;
mod error;
mod generator;
mod openai;
mod places;
mod travel;

#[cfg(test)]
pub mod testing;

pub use enrich::{enrich_activities, EnrichmentReport};
pub use error::ProviderError;
#[cfg(test)]
pub use error::ProviderErrorKind;
pub use generator::{ReplyContext, TextGenerator};
pub use openai::{ChatProvider, OpenAiChatModel};
pub use places::GooglePlacesClient;
pub use travel::{
    best_flight, best_hotel, CabinClass, FlightPreference, FlightQuery, HotelPreference, HotelQuery, SampleTravel,
};

use crate::session::{AccommodationOption, Coordinates, FlightOption};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// Text generation
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    /// Ask the model for a single JSON object
    pub json: bool,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

/// A chat-completions style model
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Text of the first choice
    async fn complete(&self, request: &ChatRequest) -> Result<String, ProviderError>;

    fn model_id(&self) -> &str;
}

/// Logging wrapper for chat models
pub struct LoggingChatModel {
    inner: Arc<dyn ChatModel>,
    model_id: String,
}

impl LoggingChatModel {
    pub fn new(inner: Arc<dyn ChatModel>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl ChatModel for LoggingChatModel {
    async fn complete(&self, request: &ChatRequest) -> Result<String, ProviderError> {
        let start = std::time::Instant::now();
        let result = self.inner.complete(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(text) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    messages = request.messages.len(),
                    reply_chars = text.len(),
                    "Chat request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    kind = e.kind.as_str(),
                    retryable = e.kind.is_retryable(),
                    "Chat request failed"
                );
            }
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Stand-in used when no credentials are configured
pub struct UnavailableChatModel;

#[async_trait]
impl ChatModel for UnavailableChatModel {
    async fn complete(&self, _request: &ChatRequest) -> Result<String, ProviderError> {
        Err(ProviderError::unavailable(
            "text generation is not configured (set OPENAI_API_KEY or DEEPSEEK_API_KEY)",
        ))
    }

    fn model_id(&self) -> &str {
        "unavailable"
    }
}

// ============================================================================
// Places
// ============================================================================

/// One place returned by a search
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlaceCandidate {
    pub name: String,
    pub coordinates: Option<Coordinates>,
    pub rating: Option<f64>,
    pub user_ratings_total: Option<u32>,
    pub address: Option<String>,
    /// Photo URLs with optional attribution
    pub photos: Vec<(String, Option<String>)>,
}

#[async_trait]
pub trait PlacesProvider: Send + Sync {
    /// Resolve an address or place name to coordinates
    async fn geocode(&self, address: &str) -> Result<Option<Coordinates>, ProviderError>;

    /// Free-text place search, optionally biased toward a point
    async fn search(
        &self,
        query: &str,
        bias: Option<Coordinates>,
        radius_meters: u32,
    ) -> Result<Vec<PlaceCandidate>, ProviderError>;
}

/// Places provider that knows nothing; enrichment becomes a no-op
pub struct NoPlaces;

#[async_trait]
impl PlacesProvider for NoPlaces {
    async fn geocode(&self, _address: &str) -> Result<Option<Coordinates>, ProviderError> {
        Ok(None)
    }

    async fn search(
        &self,
        _query: &str,
        _bias: Option<Coordinates>,
        _radius_meters: u32,
    ) -> Result<Vec<PlaceCandidate>, ProviderError> {
        Ok(Vec::new())
    }
}

// ============================================================================
// Lodging and flights
// ============================================================================

#[async_trait]
pub trait TravelProvider: Send + Sync {
    /// Lodging for the stay, cheapest first
    async fn search_hotels(&self, query: &HotelQuery) -> Result<Vec<AccommodationOption>, ProviderError>;

    /// Flights for the route, cheapest first. Prices are per traveler.
    async fn search_flights(&self, query: &FlightQuery) -> Result<Vec<FlightOption>, ProviderError>;
}
