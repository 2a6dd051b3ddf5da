//! Workflow stages and flows

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A workflow stage.
///
/// The serialized names are persisted with every session and must never
/// change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStage {
    InfoGathering,
    InitialResearch,
    /// Legacy flow only: pick activities without day-by-day expansion
    SuggestActivities,
    GroupDays,
    DayItinerary,
    MealPreferences,
    Review,
    Finalize,
}

impl WorkflowStage {
    pub const ALL: [WorkflowStage; 8] = [
        WorkflowStage::InfoGathering,
        WorkflowStage::InitialResearch,
        WorkflowStage::SuggestActivities,
        WorkflowStage::GroupDays,
        WorkflowStage::DayItinerary,
        WorkflowStage::MealPreferences,
        WorkflowStage::Review,
        WorkflowStage::Finalize,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStage::InfoGathering => "INFO_GATHERING",
            WorkflowStage::InitialResearch => "INITIAL_RESEARCH",
            WorkflowStage::SuggestActivities => "SUGGEST_ACTIVITIES",
            WorkflowStage::GroupDays => "GROUP_DAYS",
            WorkflowStage::DayItinerary => "DAY_ITINERARY",
            WorkflowStage::MealPreferences => "MEAL_PREFERENCES",
            WorkflowStage::Review => "REVIEW",
            WorkflowStage::Finalize => "FINALIZE",
        }
    }
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkflowStage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| format!("unknown workflow stage '{s}'"))
    }
}

/// Which stage sequence a session follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    /// Day-by-day planning
    #[default]
    Standard,
    /// Simplified flow without day grouping
    Legacy,
}

const STANDARD_SEQUENCE: &[WorkflowStage] = &[
    WorkflowStage::InfoGathering,
    WorkflowStage::InitialResearch,
    WorkflowStage::GroupDays,
    WorkflowStage::DayItinerary,
    WorkflowStage::MealPreferences,
    WorkflowStage::Review,
    WorkflowStage::Finalize,
];

const LEGACY_SEQUENCE: &[WorkflowStage] = &[
    WorkflowStage::InfoGathering,
    WorkflowStage::InitialResearch,
    WorkflowStage::SuggestActivities,
    WorkflowStage::MealPreferences,
    WorkflowStage::Review,
    WorkflowStage::Finalize,
];

impl Flow {
    pub fn as_str(self) -> &'static str {
        match self {
            Flow::Standard => "standard",
            Flow::Legacy => "legacy",
        }
    }

    /// Canonical forward order of this flow
    pub fn stages(self) -> &'static [WorkflowStage] {
        match self {
            Flow::Standard => STANDARD_SEQUENCE,
            Flow::Legacy => LEGACY_SEQUENCE,
        }
    }

    pub fn initial(self) -> WorkflowStage {
        self.stages()[0]
    }

    /// Index of `stage` in this flow, or `None` if the flow never visits it
    pub fn position(self, stage: WorkflowStage) -> Option<usize> {
        self.stages().iter().position(|s| *s == stage)
    }

    /// Stage one step forward of `stage`, if any
    pub fn next_of(self, stage: WorkflowStage) -> Option<WorkflowStage> {
        let idx = self.position(stage)?;
        self.stages().get(idx + 1).copied()
    }

    /// Whether `stage` is at or beyond `reference` in this flow
    pub fn reached(self, stage: WorkflowStage, reference: WorkflowStage) -> bool {
        match (self.position(stage), self.position(reference)) {
            (Some(a), Some(b)) => a >= b,
            _ => false,
        }
    }
}

/// Who is asking for a stage change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    /// Explicit user navigation from the interface
    Ui,
    /// Orchestration acting on the user's behalf
    Automated,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Ui => f.write_str("ui"),
            Actor::Automated => f.write_str("automated"),
        }
    }
}
