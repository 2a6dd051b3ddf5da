//! API request and response types

use crate::dispatch::{ActionRejection, ToolAction};
use crate::merge::MergeSummary;
use crate::providers::{CabinClass, EnrichmentReport, FlightPreference, HotelPreference};
use crate::session::Session;
use crate::workflow::Flow;
use serde::{Deserialize, Serialize};

/// Request to create a session; the body is optional
#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub flow: Flow,
}

/// The stage is a name so unknown stages get a typed error
#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub stage: String,
}

#[derive(Debug, Deserialize)]
pub struct ActionsRequest {
    pub actions: Vec<ToolAction>,
    /// Discard the whole batch if any action is rejected
    #[serde(default)]
    pub atomic: bool,
}

#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub message: String,
    /// Actions the orchestration proposed for this turn
    #[serde(default)]
    pub actions: Vec<ToolAction>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AccommodationRequest {
    #[serde(default)]
    pub preference: HotelPreference,
}

#[derive(Debug, Default, Deserialize)]
pub struct FlightsRequest {
    #[serde(default)]
    pub cabin: CabinClass,
    #[serde(default)]
    pub preference: FlightPreference,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session: Session,
}

/// The action that stopped a batch
#[derive(Debug, Serialize)]
pub struct RejectionBody {
    pub index: usize,
    pub action: &'static str,
    pub error: String,
    pub kind: &'static str,
}

impl From<&ActionRejection> for RejectionBody {
    fn from(rejection: &ActionRejection) -> Self {
        Self {
            index: rejection.index,
            action: rejection.action,
            error: rejection.error.to_string(),
            kind: rejection.error.kind(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ActionsResponse {
    pub session: Session,
    pub applied: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<RejectionBody>,
}

#[derive(Debug, Serialize)]
pub struct TurnResponse {
    pub session: Session,
    pub reply: String,
    pub applied: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<RejectionBody>,
    /// The reply is a canned fallback
    pub degraded: bool,
}

#[derive(Debug, Serialize)]
pub struct MergeCounts {
    pub added: usize,
    pub updated: usize,
    pub remapped: usize,
}

impl From<MergeSummary> for MergeCounts {
    fn from(summary: MergeSummary) -> Self {
        Self {
            added: summary.added,
            updated: summary.updated,
            remapped: summary.remapped,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EnrichmentCounts {
    pub enriched: usize,
    pub skipped: usize,
    pub not_found: usize,
    pub failed: usize,
}

impl From<EnrichmentReport> for EnrichmentCounts {
    fn from(report: EnrichmentReport) -> Self {
        Self {
            enriched: report.enriched,
            skipped: report.skipped,
            not_found: report.not_found,
            failed: report.failed,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SuggestionsResponse {
    pub session: Session,
    pub merged: MergeCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<EnrichmentCounts>,
}

#[derive(Debug, Serialize)]
pub struct TravelResponse {
    pub session: Session,
    pub recommended: Option<String>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>, kind: &'static str) -> Self {
        Self {
            error: message.into(),
            kind,
        }
    }
}
