//! Service configuration from the environment

use crate::providers::{
    ChatModel, ChatProvider, GooglePlacesClient, LoggingChatModel, NoPlaces, OpenAiChatModel, PlacesProvider,
    TextGenerator, UnavailableChatModel,
};
use crate::session::TripLimits;
use std::sync::Arc;
use std::time::Duration;

const LLM_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub port: u16,
    pub session_ttl: Duration,
    pub sweep_interval: Duration,
    pub max_trip_days: u32,
    pub openai_api_key: Option<String>,
    pub deepseek_api_key: Option<String>,
    /// Overrides the provider's default model
    pub llm_model: Option<String>,
    /// Overrides the provider's chat completions URL
    pub llm_base_url: Option<String>,
    /// Calls per generation, counting the first
    pub llm_max_attempts: u32,
    pub places_api_key: Option<String>,
    /// Falls back to the places key
    pub geocoding_api_key: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            session_ttl: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(5 * 60),
            max_trip_days: 30,
            openai_api_key: None,
            deepseek_api_key: None,
            llm_model: None,
            llm_base_url: None,
            llm_max_attempts: 3,
            places_api_key: None,
            geocoding_api_key: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Unparseable numbers and blank
    /// strings fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let text = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let secs = |name: &str, default: Duration| {
            text(name)
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|v| *v > 0)
                .map_or(default, Duration::from_secs)
        };

        Self {
            port: text("TRIP_PLANNER_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            session_ttl: secs("TRIP_PLANNER_SESSION_TTL_SECS", defaults.session_ttl),
            sweep_interval: secs("TRIP_PLANNER_SWEEP_INTERVAL_SECS", defaults.sweep_interval),
            max_trip_days: text("TRIP_PLANNER_MAX_TRIP_DAYS")
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.max_trip_days),
            openai_api_key: text("OPENAI_API_KEY"),
            deepseek_api_key: text("DEEPSEEK_API_KEY"),
            llm_model: text("TRIP_PLANNER_LLM_MODEL"),
            llm_base_url: text("TRIP_PLANNER_LLM_BASE_URL"),
            llm_max_attempts: text("TRIP_PLANNER_LLM_MAX_ATTEMPTS")
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.llm_max_attempts),
            places_api_key: text("GOOGLE_PLACES_API_KEY"),
            geocoding_api_key: text("GOOGLE_GEOCODING_API_KEY"),
        }
    }

    pub fn trip_limits(&self) -> TripLimits {
        TripLimits {
            max_trip_days: self.max_trip_days,
        }
    }

    /// Credentials for the preferred text-generation provider
    fn chat_credentials(&self) -> Option<(ChatProvider, &str)> {
        self.openai_api_key
            .as_deref()
            .map(|key| (ChatProvider::OpenAi, key))
            .or_else(|| self.deepseek_api_key.as_deref().map(|key| (ChatProvider::DeepSeek, key)))
    }

    /// `OpenAI` when its key is set, else `DeepSeek`, else a model that fails
    /// every call
    pub fn chat_model(&self) -> Arc<dyn ChatModel> {
        let Some((provider, key)) = self.chat_credentials() else {
            tracing::warn!("No text-generation key configured. Set OPENAI_API_KEY or DEEPSEEK_API_KEY.");
            return Arc::new(UnavailableChatModel);
        };
        let mut model = OpenAiChatModel::new(key.to_string(), provider, self.llm_model.clone());
        if let Some(url) = &self.llm_base_url {
            model = model.with_base_url(url.clone());
        }
        tracing::info!(?provider, model = %model.model_id(), "Text generation configured");
        Arc::new(LoggingChatModel::new(Arc::new(model)))
    }

    /// Text generation with the configured retry budget
    pub fn text_generator(&self) -> TextGenerator {
        TextGenerator::new(self.chat_model()).with_retry(self.llm_max_attempts, LLM_RETRY_BASE_DELAY)
    }

    /// Google Places when a key is set; otherwise enrichment is a no-op
    pub fn places(&self) -> Arc<dyn PlacesProvider> {
        match &self.places_api_key {
            Some(key) => Arc::new(GooglePlacesClient::new(key.clone(), self.geocoding_api_key.clone())),
            None => {
                tracing::warn!("GOOGLE_PLACES_API_KEY not set; places enrichment disabled");
                Arc::new(NoPlaces)
            }
        }
    }
}
