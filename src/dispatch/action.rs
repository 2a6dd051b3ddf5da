//! Tool action vocabulary

use crate::session::{Preference, Restaurant};
use crate::workflow::WorkflowStage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A structured instruction that mutates a session.
///
/// Serialized with an `action` tag, e.g.
/// `{"action": "adjust_day_groups", "activity_id": "a1", "from_day": 1, "to_day": 3}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ToolAction {
    /// Record keep/maybe/reject against research options
    SetResearchPreferences {
        preferences: BTreeMap<String, Preference>,
    },
    /// Replace the activity selection
    SelectActivities { activity_ids: Vec<String> },
    /// Spread the selected activities over the trip days
    GroupActivities,
    /// Move one activity between days
    AdjustDayGroups {
        activity_id: String,
        from_day: u32,
        to_day: u32,
    },
    ConfirmDayGrouping,
    /// Merge restaurant cards produced for the grouped days
    GetRestaurantSuggestions { suggestions: Vec<Restaurant> },
    SetMealPreferences {
        restaurant_ids: Vec<String>,
        /// Restaurants to show on particular days
        #[serde(default)]
        by_day: Vec<DayRestaurants>,
    },
    /// Edit days during review
    ReviewPatchGroupedDays { days: Vec<DayPatch> },
    SelectAccommodation { option_id: String },
    SkipAccommodation,
    SelectFlight { option_id: String },
    SkipFlight,
    /// Explicit navigation
    GoToStage { stage: WorkflowStage },
    Finalize,
}

impl ToolAction {
    /// Action name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            ToolAction::SetResearchPreferences { .. } => "set_research_preferences",
            ToolAction::SelectActivities { .. } => "select_activities",
            ToolAction::GroupActivities => "group_activities",
            ToolAction::AdjustDayGroups { .. } => "adjust_day_groups",
            ToolAction::ConfirmDayGrouping => "confirm_day_grouping",
            ToolAction::GetRestaurantSuggestions { .. } => "get_restaurant_suggestions",
            ToolAction::SetMealPreferences { .. } => "set_meal_preferences",
            ToolAction::ReviewPatchGroupedDays { .. } => "review_patch_grouped_days",
            ToolAction::SelectAccommodation { .. } => "select_accommodation",
            ToolAction::SkipAccommodation => "skip_accommodation",
            ToolAction::SelectFlight { .. } => "select_flight",
            ToolAction::SkipFlight => "skip_flight",
            ToolAction::GoToStage { .. } => "go_to_stage",
            ToolAction::Finalize => "finalize",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DayRestaurants {
    pub day: u32,
    pub restaurant_ids: Vec<String>,
}

/// Changes to one day during review. Absent fields stay as they are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DayPatch {
    pub day: u32,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub activity_ids: Option<Vec<String>>,
    #[serde(default)]
    pub restaurant_ids: Option<Vec<String>>,
}
