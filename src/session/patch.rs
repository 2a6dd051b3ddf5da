//! Field-level session updates
//!
//! Collections and scalars are replaced wholesale. `tripInfo` is merged key
//! by key so a caller can set the destination without clobbering dates.

use super::types::{
    AccommodationOption, Activity, ActivityLevel, Choice, DayGroup, FlightOption, GroupedDay, Preference,
    ResearchOption, Restaurant, Session, TripInfo,
};
use crate::error::{EngineError, EngineResult};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};

const MAX_TRAVELERS: u32 = 10;

/// Bounds applied to trip facts
#[derive(Debug, Clone, Copy)]
pub struct TripLimits {
    pub max_trip_days: u32,
}

impl Default for TripLimits {
    fn default() -> Self {
        Self { max_trip_days: 30 }
    }
}

/// Partial trip facts; `None` leaves the current value untouched
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TripInfoPatch {
    pub destination: Option<String>,
    pub origin: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub duration_days: Option<u32>,
    pub preferences: Option<Vec<String>>,
    pub activity_level: Option<ActivityLevel>,
    pub travelers: Option<u32>,
    pub budget: Option<String>,
}

impl TripInfoPatch {
    /// Merge into `trip`, validating the result. `trip` is untouched on error.
    pub fn apply_to(self, trip: &mut TripInfo, limits: TripLimits) -> EngineResult<()> {
        let mut next = trip.clone();

        if let Some(destination) = self.destination {
            let destination = destination.trim().to_string();
            if destination.is_empty() {
                return Err(EngineError::validation("destination cannot be empty"));
            }
            next.destination = Some(destination);
        }
        if let Some(origin) = self.origin {
            let origin = origin.trim().to_string();
            next.origin = (!origin.is_empty()).then_some(origin);
        }
        if let Some(start) = self.start_date {
            next.start_date = Some(start);
        }
        if let Some(end) = self.end_date {
            next.end_date = Some(end);
        }
        if let Some(days) = self.duration_days {
            next.duration_days = Some(days);
        }
        if let Some(preferences) = self.preferences {
            next.preferences = dedup_case_insensitive(preferences);
        }
        if let Some(level) = self.activity_level {
            next.activity_level = Some(level);
        }
        if let Some(travelers) = self.travelers {
            if travelers == 0 || travelers > MAX_TRAVELERS {
                return Err(EngineError::validation(format!(
                    "traveler count must be between 1 and {MAX_TRAVELERS}"
                )));
            }
            next.travelers = Some(travelers);
        }
        if let Some(budget) = self.budget {
            next.budget = Some(budget);
        }

        // Known dates always win over a stated duration
        if let (Some(start), Some(end)) = (next.start_date, next.end_date) {
            if end < start {
                return Err(EngineError::validation("end date must not be before start date"));
            }
            let days = (end - start).num_days() + 1;
            next.duration_days = Some(u32::try_from(days).unwrap_or(u32::MAX));
        }
        if let Some(days) = next.duration_days {
            if days == 0 {
                return Err(EngineError::validation("trip must be at least 1 day"));
            }
            if days > limits.max_trip_days {
                return Err(EngineError::validation(format!(
                    "maximum trip duration is {} days",
                    limits.max_trip_days
                )));
            }
        }

        *trip = next;
        Ok(())
    }
}

fn dedup_case_insensitive(values: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && seen.insert(v.to_lowercase()))
        .collect()
}

/// Fields a caller may replace on a session.
///
/// The workflow stage, conversation history and final plan are absent on
/// purpose: they change only through their own operations.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SessionPatch {
    pub trip_info: Option<TripInfoPatch>,
    pub research_options: Option<Vec<ResearchOption>>,
    pub research_option_selections: Option<BTreeMap<String, Preference>>,
    pub suggested_activities: Option<Vec<Activity>>,
    pub selected_activity_ids: Option<Vec<String>>,
    pub day_groups: Option<Vec<DayGroup>>,
    pub grouped_days: Option<Vec<GroupedDay>>,
    pub restaurant_suggestions: Option<Vec<Restaurant>>,
    pub selected_restaurant_ids: Option<Vec<String>>,
    pub accommodation_options: Option<Vec<AccommodationOption>>,
    pub accommodation_choice: Option<Choice>,
    pub flight_options: Option<Vec<FlightOption>>,
    pub flight_choice: Option<Choice>,
}

impl SessionPatch {
    pub fn trip_info(patch: TripInfoPatch) -> Self {
        Self {
            trip_info: Some(patch),
            ..Self::default()
        }
    }

    /// Apply to `session`. On error the session is left as it was.
    pub fn apply_to(self, session: &mut Session, limits: TripLimits) -> EngineResult<()> {
        let mut next = session.clone();

        if let Some(trip) = self.trip_info {
            trip.apply_to(&mut next.trip_info, limits)?;
        }
        replace(&mut next.research_options, self.research_options);
        replace(&mut next.research_option_selections, self.research_option_selections);
        replace(&mut next.suggested_activities, self.suggested_activities);
        replace(&mut next.selected_activity_ids, self.selected_activity_ids);
        replace(&mut next.day_groups, self.day_groups);
        replace(&mut next.grouped_days, self.grouped_days);
        replace(&mut next.restaurant_suggestions, self.restaurant_suggestions);
        replace(&mut next.selected_restaurant_ids, self.selected_restaurant_ids);
        replace(&mut next.accommodation_options, self.accommodation_options);
        if self.accommodation_choice.is_some() {
            next.accommodation_choice = self.accommodation_choice;
        }
        replace(&mut next.flight_options, self.flight_options);
        if self.flight_choice.is_some() {
            next.flight_choice = self.flight_choice;
        }

        next.validate_references()?;
        *session = next;
        Ok(())
    }
}

fn replace<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}
