//! Session record and the collections it owns

use crate::error::{EngineError, EngineResult};
use crate::plan::FinalPlan;
use crate::workflow::{
    validate_stages, validate_transition, Actor, Flow, TransitionKind, TransitionRejection, WorkflowStage,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

// ============================================================================
// Trip facts
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Relaxed,
    Moderate,
    Active,
}

/// Facts gathered about the trip. Patched key by key, never rebuilt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripInfo {
    pub destination: Option<String>,
    /// Where the travelers depart from
    pub origin: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub duration_days: Option<u32>,
    #[serde(default)]
    pub preferences: Vec<String>,
    pub activity_level: Option<ActivityLevel>,
    pub travelers: Option<u32>,
    pub budget: Option<String>,
}

impl TripInfo {
    /// Number of day buckets to plan for
    pub fn day_count(&self) -> u32 {
        self.duration_days.unwrap_or(1).max(1)
    }

    pub fn traveler_count(&self) -> u32 {
        self.travelers.unwrap_or(1).max(1)
    }

    /// Calendar date of `day` (1-based), when the start date is known
    pub fn date_of_day(&self, day: u32) -> Option<NaiveDate> {
        let start = self.start_date?;
        start.checked_add_days(chrono::Days::new(u64::from(day.saturating_sub(1))))
    }
}

// ============================================================================
// Cards
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    /// Photo URL or provider reference; unique per photo
    pub url: String,
    #[serde(default)]
    pub attribution: Option<String>,
}

/// Tri-state preference recorded against a card id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preference {
    Keep,
    #[default]
    Maybe,
    Reject,
}

impl From<bool> for Preference {
    /// The legacy flow records a plain "selected" flag. Unselected means
    /// undecided, never rejected.
    fn from(selected: bool) -> Self {
        if selected {
            Preference::Keep
        } else {
            Preference::Maybe
        }
    }
}

/// A destination research option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchOption {
    pub id: String,
    pub title: String,
    pub category: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub photos: Vec<Photo>,
    /// Ids this card was recognized under in earlier merges
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
}

/// A candidate activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub activity_type: String,
    /// Free-text interest tags, at most three
    #[serde(default)]
    pub interest_tags: Vec<String>,
    #[serde(default)]
    pub duration_hours: Option<f64>,
    #[serde(default)]
    pub cost_estimate: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub time_of_day: Option<TimeOfDay>,
    #[serde(default)]
    pub neighborhood: Option<String>,
    // Places enrichment
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub user_ratings_total: Option<u32>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub photos: Vec<Photo>,
    /// Ids this card was recognized under in earlier merges
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl Activity {
    /// Minimal activity; enrichment fields empty
    pub fn new(id: impl Into<String>, name: impl Into<String>, activity_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            activity_type: activity_type.into(),
            interest_tags: vec![],
            duration_hours: None,
            cost_estimate: None,
            description: None,
            time_of_day: None,
            neighborhood: None,
            coordinates: None,
            rating: None,
            user_ratings_total: None,
            address: None,
            photos: vec![],
            aliases: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Restaurant {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub cuisine: String,
    #[serde(default)]
    pub cost_per_person: Option<f64>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub photos: Vec<Photo>,
    /// Ids this card was recognized under in earlier merges
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccommodationOption {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub price_per_night: Option<f64>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    /// Distance from the destination's center
    #[serde(default)]
    pub distance_km: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightOption {
    pub id: String,
    pub airline: String,
    #[serde(default)]
    pub flight_number: Option<String>,
    #[serde(default)]
    pub departure_time: Option<String>,
    #[serde(default)]
    pub arrival_time: Option<String>,
    /// Price per traveler
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub class_type: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub stops: Option<u32>,
}

/// Outcome of an accommodation or flight sub-step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Choice {
    Selected { id: String },
    Skipped,
}

impl Choice {
    pub fn selected_id(&self) -> Option<&str> {
        match self {
            Choice::Selected { id } => Some(id),
            Choice::Skipped => None,
        }
    }
}

// ============================================================================
// Days
// ============================================================================

/// Activity ids assigned to one trip day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayGroup {
    pub day: u32,
    pub date: Option<NaiveDate>,
    pub theme: String,
    pub activity_ids: Vec<String>,
}

/// UI-ready expansion of a [`DayGroup`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedDay {
    pub day: u32,
    pub date: Option<NaiveDate>,
    pub theme: String,
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub restaurants: Vec<Restaurant>,
}

// ============================================================================
// Conversation
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Session
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    /// Bumped on every successful write
    pub version: u64,
    pub flow: Flow,
    workflow_state: WorkflowStage,
    pub trip_info: TripInfo,
    #[serde(default)]
    pub research_options: Vec<ResearchOption>,
    #[serde(default)]
    pub research_option_selections: BTreeMap<String, Preference>,
    #[serde(default)]
    pub suggested_activities: Vec<Activity>,
    #[serde(default)]
    pub selected_activity_ids: Vec<String>,
    #[serde(default)]
    pub day_groups: Vec<DayGroup>,
    #[serde(default)]
    pub grouped_days: Vec<GroupedDay>,
    #[serde(default)]
    pub restaurant_suggestions: Vec<Restaurant>,
    #[serde(default)]
    pub selected_restaurant_ids: Vec<String>,
    #[serde(default)]
    pub accommodation_options: Vec<AccommodationOption>,
    #[serde(default)]
    pub accommodation_choice: Option<Choice>,
    #[serde(default)]
    pub flight_options: Vec<FlightOption>,
    #[serde(default)]
    pub flight_choice: Option<Choice>,
    #[serde(default)]
    conversation_history: Vec<ConversationEntry>,
    #[serde(default)]
    final_plan: Option<FinalPlan>,
}

impl Session {
    pub fn new(id: impl Into<String>, flow: Flow, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            created_at: now,
            last_accessed: now,
            version: 0,
            flow,
            workflow_state: flow.initial(),
            trip_info: TripInfo::default(),
            research_options: vec![],
            research_option_selections: BTreeMap::new(),
            suggested_activities: vec![],
            selected_activity_ids: vec![],
            day_groups: vec![],
            grouped_days: vec![],
            restaurant_suggestions: vec![],
            selected_restaurant_ids: vec![],
            accommodation_options: vec![],
            accommodation_choice: None,
            flight_options: vec![],
            flight_choice: None,
            conversation_history: vec![],
            final_plan: None,
        }
    }

    pub fn workflow_state(&self) -> WorkflowStage {
        self.workflow_state
    }

    /// Move to `to` if the validator allows it for `actor`.
    ///
    /// This is the only way the workflow stage changes.
    pub fn transition_to(&mut self, to: WorkflowStage, actor: Actor) -> EngineResult<TransitionKind> {
        let from = self.workflow_state;
        let kind = validate_stages(self.flow, from, to, actor).map_err(|rejection| {
            EngineError::TransitionRejected {
                from: from.to_string(),
                to: to.to_string(),
                reason: rejection.to_string(),
            }
        })?;
        if kind != TransitionKind::NoOp {
            tracing::debug!(session_id = %self.id, %from, %to, %actor, "Workflow stage changed");
        }
        self.workflow_state = to;
        Ok(kind)
    }

    /// Like [`Session::transition_to`] for a stage name from a caller. A name
    /// outside this session's flow is a validation error.
    pub fn transition_named(&mut self, to: &str, actor: Actor) -> EngineResult<TransitionKind> {
        match validate_transition(self.flow, self.workflow_state.as_str(), to, actor) {
            Ok(_) => {
                let stage: WorkflowStage = to.parse().map_err(EngineError::Validation)?;
                self.transition_to(stage, actor)
            }
            Err(TransitionRejection::UnknownStage(name)) => Err(EngineError::validation(format!(
                "'{name}' is not a stage of the {} flow",
                self.flow.as_str()
            ))),
            Err(rejection) => Err(EngineError::TransitionRejected {
                from: self.workflow_state.to_string(),
                to: to.to_string(),
                reason: rejection.to_string(),
            }),
        }
    }

    pub fn conversation_history(&self) -> &[ConversationEntry] {
        &self.conversation_history
    }

    pub fn append_conversation(&mut self, role: Role, content: impl Into<String>, now: DateTime<Utc>) {
        self.conversation_history.push(ConversationEntry {
            role,
            content: content.into(),
            timestamp: now,
        });
    }

    pub fn final_plan(&self) -> Option<&FinalPlan> {
        self.final_plan.as_ref()
    }

    /// Record the final plan. It can only be written once.
    pub fn set_final_plan(&mut self, plan: FinalPlan) -> EngineResult<()> {
        if self.final_plan.is_some() {
            return Err(EngineError::validation("final plan has already been written"));
        }
        self.final_plan = Some(plan);
        Ok(())
    }

    /// Preference for a research option; undecided when nothing was recorded
    pub fn preference_for(&self, option_id: &str) -> Preference {
        self.research_option_selections
            .get(option_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn activity(&self, id: &str) -> Option<&Activity> {
        self.suggested_activities.iter().find(|a| a.id == id)
    }

    /// Selected activities in selection order
    pub fn selected_activities(&self) -> Vec<Activity> {
        self.selected_activity_ids
            .iter()
            .filter_map(|id| self.activity(id).cloned())
            .collect()
    }

    pub fn restaurant(&self, id: &str) -> Option<&Restaurant> {
        self.restaurant_suggestions.iter().find(|r| r.id == id)
    }

    /// Check that every id referenced by a selection exists in its source
    /// collection and that day groups partition the selected activities.
    pub fn validate_references(&self) -> EngineResult<()> {
        let option_ids: HashSet<&str> = self.research_options.iter().map(|o| o.id.as_str()).collect();
        if let Some(id) = self
            .research_option_selections
            .keys()
            .find(|id| !option_ids.contains(id.as_str()))
        {
            return Err(EngineError::validation(format!(
                "preference recorded for unknown research option '{id}'"
            )));
        }

        let activity_ids: HashSet<&str> = self.suggested_activities.iter().map(|a| a.id.as_str()).collect();
        let selected = unique_subset(&self.selected_activity_ids, &activity_ids, "selected activity")?;

        let mut seen_in_days = HashSet::new();
        for (idx, group) in self.day_groups.iter().enumerate() {
            if usize::try_from(group.day).ok() != Some(idx + 1) {
                return Err(EngineError::validation(format!(
                    "day groups must be numbered sequentially from 1 (found day {} at position {})",
                    group.day,
                    idx + 1
                )));
            }
            for id in &group.activity_ids {
                if !selected.contains(id.as_str()) {
                    return Err(EngineError::validation(format!(
                        "day {} references activity '{id}' which is not selected",
                        group.day
                    )));
                }
                if !seen_in_days.insert(id.as_str()) {
                    return Err(EngineError::validation(format!(
                        "activity '{id}' is assigned to more than one day"
                    )));
                }
            }
        }

        let restaurant_ids: HashSet<&str> = self.restaurant_suggestions.iter().map(|r| r.id.as_str()).collect();
        unique_subset(&self.selected_restaurant_ids, &restaurant_ids, "selected restaurant")?;
        for day in &self.grouped_days {
            if let Some(r) = day.restaurants.iter().find(|r| !restaurant_ids.contains(r.id.as_str())) {
                return Err(EngineError::validation(format!(
                    "day {} lists unknown restaurant '{}'",
                    day.day, r.id
                )));
            }
        }

        if let Some(id) = self.accommodation_choice.as_ref().and_then(Choice::selected_id) {
            if !self.accommodation_options.iter().any(|o| o.id == id) {
                return Err(EngineError::validation(format!("unknown accommodation option '{id}'")));
            }
        }
        if let Some(id) = self.flight_choice.as_ref().and_then(Choice::selected_id) {
            if !self.flight_options.iter().any(|o| o.id == id) {
                return Err(EngineError::validation(format!("unknown flight option '{id}'")));
            }
        }
        Ok(())
    }
}

/// Ensure `ids` has no duplicates and every entry is in `known`
fn unique_subset<'a>(
    ids: &'a [String],
    known: &HashSet<&str>,
    what: &str,
) -> EngineResult<HashSet<&'a str>> {
    let mut seen = HashSet::new();
    for id in ids {
        if !known.contains(id.as_str()) {
            return Err(EngineError::validation(format!("{what} '{id}' does not exist")));
        }
        if !seen.insert(id.as_str()) {
            return Err(EngineError::validation(format!("{what} '{id}' listed twice")));
        }
    }
    Ok(seen)
}
