//! Host-side orchestration
//!
//! Each operation loads one session, optionally calls the collaborators,
//! runs the engines over a working copy and writes the copy back with
//! [`SessionStore::save`]. A concurrent write in between surfaces as
//! [`EngineError::Conflict`] instead of being overwritten.

use crate::dispatch::{ActionRejection, DispatchOutcome, DispatchPolicy, Dispatcher, ToolAction};
use crate::error::{EngineError, EngineResult};
use crate::merge::{merge_activities, merge_research_options, MergeSummary};
use crate::providers::{
    best_flight, best_hotel, enrich_activities, CabinClass, EnrichmentReport, FlightPreference, FlightQuery,
    HotelPreference, HotelQuery, PlacesProvider, ProviderError, ReplyContext, TextGenerator, TravelProvider,
};
use crate::session::{Choice, Clock, Preference, Role, Session, SessionPatch, SessionStore, TripInfoPatch};
use crate::workflow::{Actor, Flow, WorkflowStage};
use std::sync::Arc;

/// Sent when the model cannot produce a reply; the turn still counts
pub const FALLBACK_REPLY: &str =
    "I've updated your plan, but I couldn't come up with a reply just now. Please try again in a moment.";

/// Result of a conversational turn
#[derive(Debug)]
pub struct TurnOutcome {
    pub session: Session,
    pub reply: String,
    pub applied: Vec<&'static str>,
    pub rejection: Option<ActionRejection>,
    /// The reply is [`FALLBACK_REPLY`] because generation failed
    pub degraded: bool,
}

/// Result of a suggestion run
#[derive(Debug)]
pub struct SuggestionOutcome {
    pub session: Session,
    pub merge: MergeSummary,
    pub enrichment: EnrichmentReport,
}

/// Result of a lodging or flight search
#[derive(Debug)]
pub struct TravelOutcome {
    pub session: Session,
    /// Id of the option that best fits the requested preference
    pub recommended: Option<String>,
}

pub struct Planner {
    store: Arc<dyn SessionStore>,
    generator: TextGenerator,
    places: Arc<dyn PlacesProvider>,
    travel: Arc<dyn TravelProvider>,
    clock: Arc<dyn Clock>,
}

impl Planner {
    pub fn new(
        store: Arc<dyn SessionStore>,
        generator: TextGenerator,
        places: Arc<dyn PlacesProvider>,
        travel: Arc<dyn TravelProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            generator,
            places,
            travel,
            clock,
        }
    }

    pub fn model_id(&self) -> &str {
        self.generator.model_id()
    }

    async fn load(&self, id: &str) -> EngineResult<Session> {
        self.store
            .get(id)
            .await
            .ok_or_else(|| EngineError::NotFound(id.to_string()))
    }

    pub async fn create(&self, flow: Flow) -> Session {
        self.store.create(flow).await
    }

    pub async fn get(&self, id: &str) -> EngineResult<Session> {
        self.load(id).await
    }

    pub async fn remove(&self, id: &str) -> EngineResult<()> {
        if self.store.remove(id).await {
            Ok(())
        } else {
            Err(EngineError::NotFound(id.to_string()))
        }
    }

    /// Field-level update (see [`SessionPatch`])
    pub async fn update(&self, id: &str, patch: SessionPatch) -> EngineResult<Session> {
        self.store.update(id, patch).await
    }

    /// Merge trip facts key by key
    pub async fn patch_trip(&self, id: &str, patch: TripInfoPatch) -> EngineResult<Session> {
        self.store.update(id, SessionPatch::trip_info(patch)).await
    }

    /// Explicit navigation from the interface, by stage name
    pub async fn transition(&self, id: &str, to: &str) -> EngineResult<Session> {
        let mut session = self.load(id).await?;
        ensure_open(&session)?;
        session.transition_named(to, Actor::Ui)?;
        self.store.save(session).await
    }

    /// Apply actions the user took directly in the interface
    pub async fn apply_ui_actions(
        &self,
        id: &str,
        actions: &[ToolAction],
        policy: DispatchPolicy,
    ) -> EngineResult<DispatchOutcome> {
        let session = self.load(id).await?;
        let dispatcher = Dispatcher::new(Actor::Ui, self.clock.clone()).with_policy(policy);
        let mut outcome = dispatcher.apply_actions(session, actions);
        if !outcome.applied.is_empty() {
            outcome.session = self.store.save(outcome.session).await?;
        }
        tracing::debug!(
            session_id = %id,
            ?policy,
            applied = outcome.applied.len(),
            complete = outcome.is_complete(),
            "Applied UI actions"
        );
        Ok(outcome)
    }

    /// One conversational turn: record the message, apply the actions the
    /// orchestration proposed, then reply.
    pub async fn take_turn(&self, id: &str, message: &str, actions: &[ToolAction]) -> EngineResult<TurnOutcome> {
        let message = message.trim();
        if message.is_empty() {
            return Err(EngineError::validation("message cannot be empty"));
        }
        // The message is kept even if the rest of the turn fails
        let session = self
            .store
            .append_conversation(id, Role::User, message.to_string())
            .await?;

        let dispatcher = Dispatcher::new(Actor::Automated, self.clock.clone());
        let DispatchOutcome {
            mut session,
            applied,
            rejection,
        } = dispatcher.apply_actions(session, actions);

        let rejection_text = rejection.as_ref().map(|r| r.error.to_string());
        let context = ReplyContext {
            stage: session.workflow_state(),
            trip: &session.trip_info,
            history: session.conversation_history(),
            applied: &applied,
            rejection: rejection_text.as_deref(),
        };
        let (reply, degraded) = match self.generator.reply(&context).await {
            Ok(reply) if !reply.is_empty() => (reply, false),
            Ok(_) => (FALLBACK_REPLY.to_string(), true),
            Err(e) => {
                tracing::warn!(session_id = %id, kind = e.kind.as_str(), error = %e, "Reply generation failed");
                (FALLBACK_REPLY.to_string(), true)
            }
        };
        session.append_conversation(Role::Assistant, reply.clone(), self.clock.now());

        let session = self.store.save(session).await?;
        tracing::info!(
            session_id = %id,
            stage = %session.workflow_state(),
            applied = applied.len(),
            rejected = rejection.is_some(),
            degraded,
            "Turn completed"
        );
        Ok(TurnOutcome {
            session,
            reply,
            applied,
            rejection,
            degraded,
        })
    }

    /// Generate research options and merge them, keeping preferences
    pub async fn run_research(&self, id: &str) -> EngineResult<(Session, MergeSummary)> {
        let mut session = self.load(id).await?;
        ensure_open(&session)?;
        let trip = &session.trip_info;
        if trip.destination.is_none() || trip.start_date.is_none() || trip.end_date.is_none() {
            return Err(EngineError::validation(
                "destination and travel dates are needed before research",
            ));
        }

        let options = self.generator.research_options(trip).await?;
        if options.is_empty() {
            return Err(ProviderError::invalid_response("no usable research options in reply").into());
        }
        let summary = merge_research_options(&mut session, &options);
        if session.workflow_state() == WorkflowStage::InfoGathering {
            session.transition_to(WorkflowStage::InitialResearch, Actor::Automated)?;
        }

        let session = self.store.save(session).await?;
        tracing::info!(
            session_id = %id,
            added = summary.added,
            updated = summary.updated,
            remapped = summary.remapped,
            "Research options merged"
        );
        Ok((session, summary))
    }

    /// Generate more activities, enrich them with places data and merge
    pub async fn suggest_activities(&self, id: &str) -> EngineResult<SuggestionOutcome> {
        let mut session = self.load(id).await?;
        ensure_open(&session)?;
        let Some(destination) = session.trip_info.destination.clone() else {
            return Err(EngineError::validation("a destination is needed before suggesting activities"));
        };

        let interests: Vec<String> = session
            .research_options
            .iter()
            .filter(|o| session.preference_for(&o.id) == Preference::Keep)
            .map(|o| o.title.clone())
            .collect();
        let avoid: Vec<String> = session.suggested_activities.iter().map(|a| a.name.clone()).collect();
        let mut activities = self
            .generator
            .suggest_activities(&session.trip_info, &interests, &avoid)
            .await?;
        if activities.is_empty() {
            return Err(ProviderError::invalid_response("no usable activities in reply").into());
        }
        let enrichment = enrich_activities(self.places.as_ref(), &destination, &mut activities).await;

        let merge = merge_activities(&mut session, &activities);
        if session.flow == Flow::Legacy && session.workflow_state() == WorkflowStage::InitialResearch {
            session.transition_to(WorkflowStage::SuggestActivities, Actor::Automated)?;
        }

        let session = self.store.save(session).await?;
        tracing::info!(
            session_id = %id,
            added = merge.added,
            updated = merge.updated,
            enriched = enrichment.enriched,
            "Activities merged"
        );
        Ok(SuggestionOutcome {
            session,
            merge,
            enrichment,
        })
    }

    /// Generate restaurant cards for the planned days and hand them to the
    /// dispatcher, which moves the session on to meal preferences
    pub async fn suggest_restaurants(&self, id: &str) -> EngineResult<Session> {
        let session = self.load(id).await?;
        ensure_open(&session)?;
        let suggestions = self
            .generator
            .suggest_restaurants(&session.trip_info, &session.grouped_days)
            .await?;
        if suggestions.is_empty() {
            return Err(ProviderError::invalid_response("no usable restaurants in reply").into());
        }

        let dispatcher = Dispatcher::new(Actor::Automated, self.clock.clone());
        let outcome = dispatcher.apply_actions(session, &[ToolAction::GetRestaurantSuggestions { suggestions }]);
        if let Some(rejection) = outcome.rejection {
            return Err(rejection.error);
        }
        self.store.save(outcome.session).await
    }

    /// Search lodging for the trip dates and replace the session's options
    pub async fn suggest_accommodation(&self, id: &str, preference: HotelPreference) -> EngineResult<TravelOutcome> {
        let mut session = self.load(id).await?;
        ensure_open(&session)?;
        let trip = &session.trip_info;
        let (Some(destination), Some(check_in), Some(end)) = (trip.destination.clone(), trip.start_date, trip.end_date)
        else {
            return Err(EngineError::validation(
                "destination and travel dates are needed before searching lodging",
            ));
        };
        // A same-day trip still books one night
        let check_out = end.max(check_in.succ_opt().unwrap_or(check_in));

        let landmark = match self.places.geocode(&destination).await {
            Ok(point) => point,
            Err(e) => {
                tracing::warn!(session_id = %id, error = %e, "Geocoding failed; distances omitted");
                None
            }
        };
        let query = HotelQuery {
            destination,
            check_in,
            check_out,
            landmark,
        };
        let options = self.travel.search_hotels(&query).await?;
        if options.is_empty() {
            return Err(ProviderError::invalid_response("no lodging found for these dates").into());
        }

        let recommended = best_hotel(&options, preference).map(|o| o.id.clone());
        let kept = session
            .accommodation_choice
            .as_ref()
            .and_then(Choice::selected_id)
            .is_none_or(|chosen| options.iter().any(|o| o.id == chosen));
        if !kept {
            session.accommodation_choice = None;
        }
        session.accommodation_options = options;

        let session = self.store.save(session).await?;
        tracing::info!(
            session_id = %id,
            options = session.accommodation_options.len(),
            ?preference,
            recommended = recommended.as_deref().unwrap_or("-"),
            "Lodging options updated"
        );
        Ok(TravelOutcome { session, recommended })
    }

    /// Search flights from the trip origin and replace the session's options
    pub async fn suggest_flights(
        &self,
        id: &str,
        cabin: CabinClass,
        preference: FlightPreference,
    ) -> EngineResult<TravelOutcome> {
        let mut session = self.load(id).await?;
        ensure_open(&session)?;
        let trip = &session.trip_info;
        let (Some(origin), Some(destination), Some(departure)) =
            (trip.origin.clone(), trip.destination.clone(), trip.start_date)
        else {
            return Err(EngineError::validation(
                "origin, destination and a start date are needed before searching flights",
            ));
        };
        let query = FlightQuery {
            origin,
            destination,
            departure,
            return_date: trip.end_date.filter(|end| *end > departure),
            cabin,
        };
        let options = self.travel.search_flights(&query).await?;
        if options.is_empty() {
            return Err(ProviderError::invalid_response("no flights found for this route").into());
        }

        let recommended = best_flight(&options, preference).map(|o| o.id.clone());
        let kept = session
            .flight_choice
            .as_ref()
            .and_then(Choice::selected_id)
            .is_none_or(|chosen| options.iter().any(|o| o.id == chosen));
        if !kept {
            session.flight_choice = None;
        }
        session.flight_options = options;

        let session = self.store.save(session).await?;
        tracing::info!(
            session_id = %id,
            options = session.flight_options.len(),
            ?preference,
            recommended = recommended.as_deref().unwrap_or("-"),
            "Flight options updated"
        );
        Ok(TravelOutcome { session, recommended })
    }
}

fn ensure_open(session: &Session) -> EngineResult<()> {
    if session.final_plan().is_some() {
        return Err(EngineError::validation("session is already finalized"));
    }
    Ok(())
}
