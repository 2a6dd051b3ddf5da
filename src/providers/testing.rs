//! Mock collaborators for testing
//!
//! These mocks let the planner and api be exercised without network I/O.

use super::{
    ChatModel, ChatRequest, FlightQuery, HotelQuery, PlaceCandidate, PlacesProvider, ProviderError, SampleTravel,
    TravelProvider,
};
use crate::session::{AccommodationOption, Coordinates, FlightOption};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

// ============================================================================
// Mock chat model
// ============================================================================

/// Chat model that returns queued replies
pub struct MockChatModel {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    model_id: String,
    /// Record of all requests made
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl MockChatModel {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            model_id: model_id.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful reply
    pub fn queue_reply(&self, text: impl Into<String>) {
        self.replies.lock().unwrap().push_back(Ok(text.into()));
    }

    /// Queue a JSON value as the reply text
    pub fn queue_json(&self, value: &serde_json::Value) {
        self.queue_reply(value.to_string());
    }

    pub fn queue_error(&self, error: ProviderError) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Text of the last message of every request, in order
    pub fn recorded_prompts(&self) -> Vec<String> {
        self.recorded_requests()
            .iter()
            .filter_map(|r| r.messages.last().map(|m| m.content.clone()))
            .collect()
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn complete(&self, request: &ChatRequest) -> Result<String, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::network("No mock reply queued")))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ============================================================================
// Mock places
// ============================================================================

type SearchRecord = (String, Option<Coordinates>, u32);

/// Places provider with canned answers keyed by exact query
#[derive(Default)]
pub struct MockPlaces {
    geocodes: HashMap<String, Coordinates>,
    geocode_error: Mutex<Option<ProviderError>>,
    results: HashMap<String, Vec<PlaceCandidate>>,
    search_errors: Mutex<HashMap<String, ProviderError>>,
    searches: Mutex<Vec<SearchRecord>>,
}

impl MockPlaces {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_geocode(mut self, address: &str, point: Coordinates) -> Self {
        self.geocodes.insert(address.to_string(), point);
        self
    }

    /// The next geocode call fails
    pub fn with_geocode_error(self, error: ProviderError) -> Self {
        *self.geocode_error.lock().unwrap() = Some(error);
        self
    }

    pub fn with_results(mut self, query: &str, results: Vec<PlaceCandidate>) -> Self {
        self.results.insert(query.to_string(), results);
        self
    }

    /// The next search for `query` fails
    pub fn with_search_error(self, query: &str, error: ProviderError) -> Self {
        self.search_errors.lock().unwrap().insert(query.to_string(), error);
        self
    }

    pub fn recorded_searches(&self) -> Vec<SearchRecord> {
        self.searches.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlacesProvider for MockPlaces {
    async fn geocode(&self, address: &str) -> Result<Option<Coordinates>, ProviderError> {
        if let Some(error) = self.geocode_error.lock().unwrap().take() {
            return Err(error);
        }
        Ok(self.geocodes.get(address).copied())
    }

    async fn search(
        &self,
        query: &str,
        bias: Option<Coordinates>,
        radius_meters: u32,
    ) -> Result<Vec<PlaceCandidate>, ProviderError> {
        self.searches
            .lock()
            .unwrap()
            .push((query.to_string(), bias, radius_meters));
        if let Some(error) = self.search_errors.lock().unwrap().remove(query) {
            return Err(error);
        }
        Ok(self.results.get(query).cloned().unwrap_or_default())
    }
}

// ============================================================================
// Mock travel search
// ============================================================================

/// Serves the sample catalogue, records queries and can fail once
#[derive(Default)]
pub struct MockTravel {
    error: Mutex<Option<ProviderError>>,
    pub hotel_queries: Mutex<Vec<HotelQuery>>,
    pub flight_queries: Mutex<Vec<FlightQuery>>,
}

impl MockTravel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next search of either kind
    pub fn with_error(self, error: ProviderError) -> Self {
        *self.error.lock().unwrap() = Some(error);
        self
    }

    pub fn recorded_hotel_queries(&self) -> Vec<HotelQuery> {
        self.hotel_queries.lock().unwrap().clone()
    }

    pub fn recorded_flight_queries(&self) -> Vec<FlightQuery> {
        self.flight_queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl TravelProvider for MockTravel {
    async fn search_hotels(&self, query: &HotelQuery) -> Result<Vec<AccommodationOption>, ProviderError> {
        self.hotel_queries.lock().unwrap().push(query.clone());
        if let Some(error) = self.error.lock().unwrap().take() {
            return Err(error);
        }
        SampleTravel.search_hotels(query).await
    }

    async fn search_flights(&self, query: &FlightQuery) -> Result<Vec<FlightOption>, ProviderError> {
        self.flight_queries.lock().unwrap().push(query.clone());
        if let Some(error) = self.error.lock().unwrap().take() {
            return Err(error);
        }
        SampleTravel.search_flights(query).await
    }
}
