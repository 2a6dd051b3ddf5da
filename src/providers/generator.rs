//! Trip content generation on top of a chat model
//!
//! Every card that comes back from the model is untrusted. Replies are
//! parsed leniently (one bad card never sinks the batch) and then
//! sanitized before anything reaches a session.

use super::{ChatMessage, ChatModel, ChatRequest, ChatRole, ProviderError};
use crate::merge::{MAX_MEDIA_PER_CARD, MAX_TAGS_PER_ACTIVITY};
use crate::session::{
    Activity, ActivityLevel, ConversationEntry, GroupedDay, Link, Photo, ResearchOption, Restaurant, Role, TimeOfDay, TripInfo,
};
use crate::workflow::WorkflowStage;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

const SYSTEM_PROMPT: &str = "You are an expert travel planner. Be specific with activities, locations and \
recommendations, and give realistic price estimates in US dollars.";

const TEMPERATURE: f32 = 0.7;
const REPLY_HISTORY: usize = 12;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

static JSON_OBJECT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));

/// Outermost `{...}` span of `text`, for replies that wrap JSON in prose
pub fn extract_json_object(text: &str) -> Option<&str> {
    JSON_OBJECT.find(text).map(|m| m.as_str())
}

/// What the model needs to write a conversational reply
#[derive(Debug, Clone, Copy)]
pub struct ReplyContext<'a> {
    pub stage: WorkflowStage,
    pub trip: &'a TripInfo,
    pub history: &'a [ConversationEntry],
    /// Actions applied this turn, by name
    pub applied: &'a [&'static str],
    /// Why an action was refused this turn, if one was
    pub rejection: Option<&'a str>,
}

pub struct TextGenerator {
    model: Arc<dyn ChatModel>,
    max_attempts: u32,
    base_delay: Duration,
}

impl TextGenerator {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }

    /// Retry retryable failures up to `max_attempts` calls in total,
    /// doubling `base_delay` between attempts
    pub fn with_retry(mut self, max_attempts: u32, base_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.base_delay = base_delay;
        self
    }

    pub fn model_id(&self) -> &str {
        self.model.model_id()
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1 << (attempt - 1).min(16))
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, ProviderError> {
        let mut attempt = 1;
        loop {
            match self.model.complete(request).await {
                Ok(text) => return Ok(text),
                Err(e) if e.kind.is_retryable() && attempt < self.max_attempts => {
                    let delay = e.retry_after.unwrap_or_else(|| self.backoff(attempt));
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = %delay.as_millis(),
                        kind = e.kind.as_str(),
                        error = %e,
                        "Retrying chat request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One JSON-mode request; returns the array found under `key`
    async fn generate_list(&self, prompt: String, key: &str) -> Result<Vec<Value>, ProviderError> {
        let request = ChatRequest {
            messages: vec![
                ChatMessage::new(ChatRole::System, format!("{SYSTEM_PROMPT} Always return valid JSON.")),
                ChatMessage::new(ChatRole::User, prompt),
            ],
            json: true,
            temperature: TEMPERATURE,
            max_tokens: None,
        };
        let text = self.complete(&request).await?;
        let value = parse_reply(&text)?;
        match value {
            Value::Array(items) => Ok(items),
            Value::Object(mut map) => match map.remove(key) {
                Some(Value::Array(items)) => Ok(items),
                _ => Err(ProviderError::invalid_response(format!("Reply has no \"{key}\" list"))),
            },
            _ => Err(ProviderError::invalid_response("Reply is not a JSON object")),
        }
    }

    /// Research options for the destination
    pub async fn research_options(&self, trip: &TripInfo) -> Result<Vec<ResearchOption>, ProviderError> {
        let prompt = format!(
            "Research this trip and suggest 6 to 8 options worth considering: neighborhoods to stay in, \
             signature experiences, seasonal events, day trips.\n\n{}\n\n\
             Reply with a JSON object {{\"options\": [{{\"id\": \"short-slug\", \"title\": \"...\", \
             \"category\": \"neighborhood|experience|event|day_trip|food\", \"summary\": \"one or two sentences\", \
             \"links\": [{{\"url\": \"...\", \"title\": \"...\"}}]}}]}}",
            describe_trip(trip)
        );
        let items = self.generate_list(prompt, "options").await?;
        Ok(sanitize_cards::<RawResearchOption, _>(items, research_option_from))
    }

    /// Candidate activities steered toward research options the traveler
    /// kept, avoiding names the user has already seen
    pub async fn suggest_activities(
        &self,
        trip: &TripInfo,
        interests: &[String],
        avoid: &[String],
    ) -> Result<Vec<Activity>, ProviderError> {
        let interest_line = if interests.is_empty() {
            String::new()
        } else {
            format!("\nThe traveler is keen on: {}.", interests.join("; "))
        };
        let avoid_line = if avoid.is_empty() {
            String::new()
        } else {
            format!("\nDo not repeat any of these: {}.", avoid.join("; "))
        };
        let prompt = format!(
            "Suggest 8 to 10 concrete activities for this trip.\n\n{}{interest_line}{avoid_line}\n\n\
             Reply with a JSON object {{\"activities\": [{{\"id\": \"short-slug\", \"name\": \"...\", \
             \"type\": \"museum|food|outdoors|nightlife|history|shopping|...\", \"interest_tags\": [\"...\"], \
             \"duration_hours\": 2, \"cost_estimate\": 15, \"time_of_day\": \"morning|afternoon|evening\", \
             \"neighborhood\": \"...\", \"description\": \"...\"}}]}}",
            describe_trip(trip)
        );
        let items = self.generate_list(prompt, "activities").await?;
        Ok(sanitize_cards::<RawActivity, _>(items, activity_from))
    }

    /// Restaurant cards near the planned days
    pub async fn suggest_restaurants(
        &self,
        trip: &TripInfo,
        days: &[GroupedDay],
    ) -> Result<Vec<Restaurant>, ProviderError> {
        let plan = if days.is_empty() {
            "No day plan yet.".to_string()
        } else {
            days.iter()
                .map(|day| {
                    let areas: Vec<&str> = day
                        .activities
                        .iter()
                        .filter_map(|a| a.neighborhood.as_deref())
                        .collect();
                    let names: Vec<&str> = day.activities.iter().map(|a| a.name.as_str()).collect();
                    format!(
                        "Day {}: {} ({}){}",
                        day.day,
                        day.theme,
                        names.join(", "),
                        if areas.is_empty() {
                            String::new()
                        } else {
                            format!(" around {}", areas.join(", "))
                        }
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        };
        let prompt = format!(
            "Suggest 6 to 8 restaurants that fit this trip, close to where each day is spent.\n\n{}\n\n{plan}\n\n\
             Reply with a JSON object {{\"restaurants\": [{{\"id\": \"short-slug\", \"name\": \"...\", \
             \"cuisine\": \"...\", \"cost_per_person\": 25, \"address\": \"...\", \"description\": \"...\"}}]}}",
            describe_trip(trip)
        );
        let items = self.generate_list(prompt, "restaurants").await?;
        Ok(sanitize_cards::<RawRestaurant, _>(items, restaurant_from))
    }

    /// Natural-language reply for the current turn
    pub async fn reply(&self, context: &ReplyContext<'_>) -> Result<String, ProviderError> {
        let mut system = format!(
            "{SYSTEM_PROMPT} You are guiding the user through planning step by step. Keep replies short and \
             end with one clear next step.\n\nCurrent step: {}. {}\n\n{}",
            context.stage,
            stage_guidance(context.stage),
            describe_trip(context.trip)
        );
        if !context.applied.is_empty() {
            system.push_str(&format!("\n\nJust applied: {}.", context.applied.join(", ")));
        }
        if let Some(reason) = context.rejection {
            system.push_str(&format!("\n\nThe last request could not be done: {reason}. Explain this briefly."));
        }

        let skip = context.history.len().saturating_sub(REPLY_HISTORY);
        let mut messages = vec![ChatMessage::new(ChatRole::System, system)];
        messages.extend(context.history.iter().skip(skip).map(|entry| {
            let role = match entry.role {
                Role::User => ChatRole::User,
                Role::Assistant => ChatRole::Assistant,
                Role::System => ChatRole::System,
            };
            ChatMessage::new(role, entry.content.clone())
        }));

        let request = ChatRequest {
            messages,
            json: false,
            temperature: TEMPERATURE,
            max_tokens: Some(600),
        };
        let text = self.complete(&request).await?;
        Ok(text.trim().to_string())
    }
}

fn stage_guidance(stage: WorkflowStage) -> &'static str {
    match stage {
        WorkflowStage::InfoGathering => {
            "Collect the destination, travel dates, number of travelers, interests and budget."
        }
        WorkflowStage::InitialResearch => "Help the user mark research options as keep, maybe or reject.",
        WorkflowStage::SuggestActivities => "Help the user choose activities.",
        WorkflowStage::GroupDays => "Explain how activities were grouped into days and offer to move any.",
        WorkflowStage::DayItinerary => "Walk through each day and suggest restaurants next.",
        WorkflowStage::MealPreferences => "Help the user pick restaurants for each day.",
        WorkflowStage::Review => "Summarize the plan, including lodging and flights, and ask for final changes.",
        WorkflowStage::Finalize => "The plan is final. Answer questions about it.",
    }
}

fn describe_trip(trip: &TripInfo) -> String {
    let mut lines = vec![format!(
        "Destination: {}",
        trip.destination.as_deref().unwrap_or("not decided")
    )];
    if let Some(origin) = &trip.origin {
        lines.push(format!("Departing from: {origin}"));
    }
    match (trip.start_date, trip.end_date) {
        (Some(start), Some(end)) => lines.push(format!("Dates: {start} to {end} ({} days)", trip.day_count())),
        _ => {
            if let Some(days) = trip.duration_days {
                lines.push(format!("Length: {days} days"));
            }
        }
    }
    lines.push(format!("Travelers: {}", trip.traveler_count()));
    if !trip.preferences.is_empty() {
        lines.push(format!("Interests: {}", trip.preferences.join(", ")));
    }
    if let Some(level) = trip.activity_level {
        let level = match level {
            ActivityLevel::Relaxed => "relaxed",
            ActivityLevel::Moderate => "moderate",
            ActivityLevel::Active => "active",
        };
        lines.push(format!("Activity level: {level}"));
    }
    if let Some(budget) = &trip.budget {
        lines.push(format!("Budget: {budget}"));
    }
    lines.join("\n")
}

fn parse_reply(text: &str) -> Result<Value, ProviderError> {
    if let Ok(value) = serde_json::from_str(text.trim()) {
        return Ok(value);
    }
    let embedded = extract_json_object(text)
        .ok_or_else(|| ProviderError::invalid_response("Reply contains no JSON object"))?;
    serde_json::from_str(embedded)
        .map_err(|e| ProviderError::invalid_response(format!("Failed to parse reply JSON: {e}")))
}

// ============================================================================
// Sanitizing
// ============================================================================

/// Parse each item on its own, dropping the ones that do not fit or that
/// `convert` rejects
fn sanitize_cards<R: DeserializeOwned, T>(items: Vec<Value>, convert: fn(R) -> Option<T>) -> Vec<T> {
    let total = items.len();
    let cards: Vec<T> = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<R>(item) {
            Ok(raw) => convert(raw),
            Err(e) => {
                tracing::debug!(error = %e, "Dropping malformed card");
                None
            }
        })
        .collect();
    if cards.len() < total {
        tracing::warn!(kept = cards.len(), dropped = total - cards.len(), "Dropped unusable generated cards");
    }
    cards
}

fn clean_text(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// String or numeric id, or a fresh one when missing
fn card_id(raw: Option<Value>, prefix: &str) -> String {
    let id = match raw {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    if id.is_empty() {
        format!("{prefix}-{}", uuid::Uuid::new_v4().simple())
    } else {
        id
    }
}

/// Non-negative finite number, read from a number or a leading numeric
/// string such as `"2.5 hours"`, `"$30"` or `"$1,200"`
fn estimate(raw: Option<Value>) -> Option<f64> {
    let number = match raw? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let digits: String = s
                .trim()
                .trim_start_matches('$')
                .chars()
                .take_while(|c| c.is_ascii_digit() || matches!(c, '.' | ','))
                .filter(|c| *c != ',')
                .collect();
            digits.parse().ok()
        }
        _ => None,
    }?;
    (number.is_finite() && number >= 0.0).then_some(number)
}

fn rating(raw: Option<f64>) -> Option<f64> {
    raw.filter(|r| r.is_finite() && (0.0..=5.0).contains(r))
}

fn parse_time_of_day(raw: Option<String>) -> Option<TimeOfDay> {
    match raw?.trim().to_lowercase().as_str() {
        "morning" => Some(TimeOfDay::Morning),
        "afternoon" | "midday" => Some(TimeOfDay::Afternoon),
        "evening" | "night" => Some(TimeOfDay::Evening),
        _ => None,
    }
}

fn clean_tags(raw: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && seen.insert(t.to_lowercase()))
        .take(MAX_TAGS_PER_ACTIVITY)
        .collect()
}

fn clean_links(raw: Vec<RawMedia>) -> Vec<Link> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .filter_map(RawMedia::into_parts)
        .filter(|(url, _)| seen.insert(url.clone()))
        .take(MAX_MEDIA_PER_CARD)
        .map(|(url, title)| Link { url, title })
        .collect()
}

fn clean_photos(raw: Vec<RawMedia>) -> Vec<Photo> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .filter_map(RawMedia::into_parts)
        .filter(|(url, _)| seen.insert(url.clone()))
        .take(MAX_MEDIA_PER_CARD)
        .map(|(url, attribution)| Photo { url, attribution })
        .collect()
}

fn research_option_from(raw: RawResearchOption) -> Option<ResearchOption> {
    let title = clean_text(Some(raw.title))?;
    Some(ResearchOption {
        id: card_id(raw.id, "opt"),
        title,
        category: clean_text(Some(raw.category)).unwrap_or_else(|| "general".to_string()),
        summary: clean_text(raw.summary),
        links: clean_links(raw.links),
        photos: clean_photos(raw.photos),
        aliases: vec![],
    })
}

fn activity_from(raw: RawActivity) -> Option<Activity> {
    let name = clean_text(Some(raw.name))?;
    let mut activity = Activity::new(
        card_id(raw.id, "act"),
        name,
        clean_text(Some(raw.activity_type)).unwrap_or_else(|| "sightseeing".to_string()),
    );
    activity.interest_tags = clean_tags(raw.interest_tags);
    activity.duration_hours = estimate(raw.duration_hours);
    activity.cost_estimate = estimate(raw.cost_estimate);
    activity.description = clean_text(raw.description);
    activity.time_of_day = parse_time_of_day(raw.time_of_day);
    activity.neighborhood = clean_text(raw.neighborhood);
    activity.address = clean_text(raw.address);
    Some(activity)
}

fn restaurant_from(raw: RawRestaurant) -> Option<Restaurant> {
    let name = clean_text(Some(raw.name))?;
    Some(Restaurant {
        id: card_id(raw.id, "rest"),
        name,
        cuisine: clean_text(Some(raw.cuisine)).unwrap_or_default(),
        cost_per_person: estimate(raw.cost_per_person),
        rating: rating(raw.rating),
        address: clean_text(raw.address),
        description: clean_text(raw.description),
        photos: vec![],
        aliases: vec![],
    })
}

// Raw reply shapes

/// A link or photo given either as a bare URL or as an object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawMedia {
    Url(String),
    Full {
        url: String,
        #[serde(default, alias = "attribution")]
        title: Option<String>,
    },
}

impl RawMedia {
    fn into_parts(self) -> Option<(String, Option<String>)> {
        let (url, label) = match self {
            RawMedia::Url(url) => (url, None),
            RawMedia::Full { url, title } => (url, title),
        };
        let url = url.trim().to_string();
        (!url.is_empty()).then(|| (url, clean_text(label)))
    }
}

#[derive(Debug, Deserialize)]
struct RawResearchOption {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default, alias = "name")]
    title: String,
    #[serde(default, alias = "type")]
    category: String,
    #[serde(default, alias = "description")]
    summary: Option<String>,
    #[serde(default)]
    links: Vec<RawMedia>,
    #[serde(default)]
    photos: Vec<RawMedia>,
}

#[derive(Debug, Deserialize)]
struct RawActivity {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default, alias = "title")]
    name: String,
    #[serde(default, rename = "type", alias = "category", alias = "activity_type")]
    activity_type: String,
    #[serde(default, alias = "tags", alias = "interestTags")]
    interest_tags: Vec<String>,
    #[serde(default, alias = "duration", alias = "durationHours")]
    duration_hours: Option<Value>,
    #[serde(default, alias = "cost", alias = "estimated_cost", alias = "costEstimate")]
    cost_estimate: Option<Value>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, alias = "timeOfDay")]
    time_of_day: Option<String>,
    #[serde(default, alias = "area")]
    neighborhood: Option<String>,
    #[serde(default, alias = "location")]
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRestaurant {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    name: String,
    #[serde(default, alias = "type")]
    cuisine: String,
    #[serde(default, alias = "price_per_person", alias = "costPerPerson", alias = "cost")]
    cost_per_person: Option<Value>,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default, alias = "location")]
    address: Option<String>,
    #[serde(default)]
    description: Option<String>,
}
