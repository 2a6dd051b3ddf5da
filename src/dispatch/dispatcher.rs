//! Sequential application of tool actions

use super::action::{DayPatch, DayRestaurants, ToolAction};
use crate::error::{EngineError, EngineResult};
use crate::grouping::{
    build_grouped_days, group_activities_by_day, move_activity, regroup_keeping_restaurants, theme_for_ids,
};
use crate::merge::{merge_restaurants, resolve, Card};
use crate::plan::build_final_plan;
use crate::session::{Choice, Clock, Preference, Restaurant, Session};
use crate::workflow::{Actor, Flow, WorkflowStage};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// What happens to earlier actions when a later one is rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchPolicy {
    /// Keep everything applied before the rejected action
    #[default]
    Partial,
    /// Discard the whole batch
    AllOrNothing,
}

/// The action that stopped a batch
#[derive(Debug)]
pub struct ActionRejection {
    /// Position of the rejected action in the batch
    pub index: usize,
    pub action: &'static str,
    pub error: EngineError,
}

/// Result of [`Dispatcher::apply_actions`]
#[derive(Debug)]
pub struct DispatchOutcome {
    /// Session as of the last action that was kept
    pub session: Session,
    /// Names of the actions that were kept, in order
    pub applied: Vec<&'static str>,
    pub rejection: Option<ActionRejection>,
}

impl DispatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.rejection.is_none()
    }
}

/// Applies tool actions to a session on behalf of one actor.
///
/// Each action is checked against the session as left by the previous
/// action. A rejected action never leaves a trace in the session.
pub struct Dispatcher {
    actor: Actor,
    policy: DispatchPolicy,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    pub fn new(actor: Actor, clock: Arc<dyn Clock>) -> Self {
        Self {
            actor,
            policy: DispatchPolicy::default(),
            clock,
        }
    }

    pub fn with_policy(mut self, policy: DispatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn apply_actions(&self, session: Session, actions: &[ToolAction]) -> DispatchOutcome {
        let original = (self.policy == DispatchPolicy::AllOrNothing).then(|| session.clone());
        let mut current = session;
        let mut applied = Vec::new();
        let mut rejection = None;

        for (index, action) in actions.iter().enumerate() {
            let mut next = current.clone();
            match self
                .apply(&mut next, action)
                .and_then(|()| next.validate_references())
            {
                Ok(()) => {
                    tracing::debug!(
                        session_id = %current.id,
                        action = action.name(),
                        actor = %self.actor,
                        "Applied action"
                    );
                    current = next;
                    applied.push(action.name());
                }
                Err(error) => {
                    tracing::warn!(
                        session_id = %current.id,
                        action = action.name(),
                        index,
                        error = %error,
                        "Action rejected"
                    );
                    rejection = Some(ActionRejection {
                        index,
                        action: action.name(),
                        error,
                    });
                    break;
                }
            }
        }

        if let (Some(original), Some(_)) = (original, rejection.as_ref()) {
            current = original;
            applied.clear();
        }

        DispatchOutcome {
            session: current,
            applied,
            rejection,
        }
    }

    fn apply(&self, session: &mut Session, action: &ToolAction) -> EngineResult<()> {
        if session.final_plan().is_some() {
            return Err(EngineError::validation("session is already finalized"));
        }
        match action {
            ToolAction::SetResearchPreferences { preferences } => set_research_preferences(session, preferences),
            ToolAction::SelectActivities { activity_ids } => select_activities(session, activity_ids),
            ToolAction::GroupActivities => self.group_activities(session),
            ToolAction::AdjustDayGroups {
                activity_id,
                from_day,
                to_day,
            } => adjust_day_groups(session, activity_id, *from_day, *to_day),
            ToolAction::ConfirmDayGrouping => self.confirm_day_grouping(session),
            ToolAction::GetRestaurantSuggestions { suggestions } => {
                self.take_restaurant_suggestions(session, suggestions)
            }
            ToolAction::SetMealPreferences { restaurant_ids, by_day } => {
                self.set_meal_preferences(session, restaurant_ids, by_day)
            }
            ToolAction::ReviewPatchGroupedDays { days } => review_patch_grouped_days(session, days),
            ToolAction::SelectAccommodation { option_id } => {
                if !session.accommodation_options.iter().any(|o| o.id == *option_id) {
                    return Err(EngineError::validation(format!("unknown accommodation option '{option_id}'")));
                }
                session.accommodation_choice = Some(Choice::Selected { id: option_id.clone() });
                Ok(())
            }
            ToolAction::SkipAccommodation => {
                session.accommodation_choice = Some(Choice::Skipped);
                Ok(())
            }
            ToolAction::SelectFlight { option_id } => {
                if !session.flight_options.iter().any(|o| o.id == *option_id) {
                    return Err(EngineError::validation(format!("unknown flight option '{option_id}'")));
                }
                session.flight_choice = Some(Choice::Selected { id: option_id.clone() });
                Ok(())
            }
            ToolAction::SkipFlight => {
                session.flight_choice = Some(Choice::Skipped);
                Ok(())
            }
            ToolAction::GoToStage { stage } => session.transition_to(*stage, self.actor).map(|_| ()),
            ToolAction::Finalize => {
                session.transition_to(WorkflowStage::Finalize, self.actor)?;
                let plan = build_final_plan(session, self.clock.now());
                session.set_final_plan(plan)
            }
        }
    }

    fn group_activities(&self, session: &mut Session) -> EngineResult<()> {
        require_day_flow(session.flow)?;
        let selected = session.selected_activities();
        if selected.is_empty() {
            return Err(EngineError::validation("select at least one activity before grouping"));
        }
        session.transition_to(WorkflowStage::GroupDays, self.actor)?;
        session.day_groups = group_activities_by_day(&session.trip_info, &selected);
        session.grouped_days = build_grouped_days(&session.day_groups, &session.suggested_activities);
        Ok(())
    }

    fn confirm_day_grouping(&self, session: &mut Session) -> EngineResult<()> {
        require_day_flow(session.flow)?;
        if session.day_groups.is_empty() {
            return Err(EngineError::validation("there are no day groups to confirm"));
        }
        if session.workflow_state() != WorkflowStage::GroupDays {
            return Err(EngineError::validation(format!(
                "day grouping can only be confirmed during {}",
                WorkflowStage::GroupDays
            )));
        }
        session.transition_to(WorkflowStage::DayItinerary, self.actor)?;
        session.grouped_days =
            regroup_keeping_restaurants(&session.day_groups, &session.suggested_activities, &session.grouped_days);
        Ok(())
    }

    fn take_restaurant_suggestions(&self, session: &mut Session, suggestions: &[Restaurant]) -> EngineResult<()> {
        let ready = stage_before(session.flow, WorkflowStage::MealPreferences)
            .is_some_and(|stage| session.flow.reached(session.workflow_state(), stage));
        if !ready {
            return Err(EngineError::validation(
                "restaurants are suggested once activities are planned",
            ));
        }
        if let Some(bad) = suggestions.iter().find(|r| r.id.trim().is_empty() || r.name.trim().is_empty()) {
            return Err(EngineError::validation(format!(
                "restaurant suggestion '{}' needs an id and a name",
                bad.name
            )));
        }
        let summary = merge_restaurants(session, suggestions);
        tracing::debug!(
            session_id = %session.id,
            added = summary.added,
            updated = summary.updated,
            "Merged restaurant suggestions"
        );
        if session.flow.next_of(session.workflow_state()) == Some(WorkflowStage::MealPreferences) {
            session.transition_to(WorkflowStage::MealPreferences, self.actor)?;
        }
        Ok(())
    }

    fn set_meal_preferences(
        &self,
        session: &mut Session,
        restaurant_ids: &[String],
        by_day: &[DayRestaurants],
    ) -> EngineResult<()> {
        if !session.flow.reached(session.workflow_state(), WorkflowStage::MealPreferences) {
            return Err(EngineError::validation(format!(
                "meal preferences are set from {} on",
                WorkflowStage::MealPreferences
            )));
        }
        session.selected_restaurant_ids =
            resolve_all(&session.restaurant_suggestions, restaurant_ids, "restaurant")?;

        let selected: HashSet<&str> = session.selected_restaurant_ids.iter().map(String::as_str).collect();
        let mut attachments = Vec::with_capacity(by_day.len());
        for entry in by_day {
            let ids = resolve_all(&session.restaurant_suggestions, &entry.restaurant_ids, "restaurant")?;
            if let Some(id) = ids.iter().find(|id| !selected.contains(id.as_str())) {
                return Err(EngineError::validation(format!(
                    "restaurant '{id}' is not among the selected restaurants"
                )));
            }
            attachments.push((entry.day, ids));
        }
        for (day, ids) in attachments {
            attach_restaurants(session, day, &ids)?;
        }
        let kept: HashSet<String> = session.selected_restaurant_ids.iter().cloned().collect();
        for day in &mut session.grouped_days {
            day.restaurants.retain(|r| kept.contains(&r.id));
        }

        if session.workflow_state() == WorkflowStage::MealPreferences {
            session.transition_to(WorkflowStage::Review, self.actor)?;
        }
        Ok(())
    }
}

fn require_day_flow(flow: Flow) -> EngineResult<()> {
    if flow.position(WorkflowStage::GroupDays).is_none() {
        return Err(EngineError::validation("this session's flow has no day-by-day planning"));
    }
    Ok(())
}

fn stage_before(flow: Flow, stage: WorkflowStage) -> Option<WorkflowStage> {
    let idx = flow.position(stage)?;
    idx.checked_sub(1).map(|prev| flow.stages()[prev])
}

/// Map ids (or aliases) to canonical card ids, de-duplicated in order
fn resolve_all<T: Card>(cards: &[T], ids: &[String], what: &str) -> EngineResult<Vec<String>> {
    let mut seen = HashSet::new();
    let mut resolved = Vec::with_capacity(ids.len());
    for id in ids {
        let card = resolve(cards, id).ok_or_else(|| EngineError::validation(format!("unknown {what} '{id}'")))?;
        if seen.insert(card.id().to_string()) {
            resolved.push(card.id().to_string());
        }
    }
    Ok(resolved)
}

fn set_research_preferences(session: &mut Session, preferences: &BTreeMap<String, Preference>) -> EngineResult<()> {
    for (id, preference) in preferences {
        let canonical = resolve(&session.research_options, id)
            .map(|o| o.id.clone())
            .ok_or_else(|| EngineError::validation(format!("unknown research option '{id}'")))?;
        session.research_option_selections.insert(canonical, *preference);
    }
    Ok(())
}

/// Replace the selection; activities no longer selected leave their day
fn select_activities(session: &mut Session, activity_ids: &[String]) -> EngineResult<()> {
    if !session.flow.reached(session.workflow_state(), WorkflowStage::InitialResearch) {
        return Err(EngineError::validation("activities are selected after trip facts are gathered"));
    }
    session.selected_activity_ids = resolve_all(&session.suggested_activities, activity_ids, "activity")?;

    let selected: HashSet<&str> = session.selected_activity_ids.iter().map(String::as_str).collect();
    let mut changed = false;
    for group in &mut session.day_groups {
        let before = group.activity_ids.len();
        group.activity_ids.retain(|id| selected.contains(id.as_str()));
        if group.activity_ids.len() != before {
            group.theme = theme_for_ids(&group.activity_ids, &session.suggested_activities);
            changed = true;
        }
    }
    if changed {
        session.grouped_days =
            regroup_keeping_restaurants(&session.day_groups, &session.suggested_activities, &session.grouped_days);
    }
    Ok(())
}

fn adjust_day_groups(session: &mut Session, activity_id: &str, from_day: u32, to_day: u32) -> EngineResult<()> {
    if session.day_groups.is_empty() {
        return Err(EngineError::validation("activities have not been grouped into days yet"));
    }
    let id = resolve(&session.suggested_activities, activity_id)
        .map_or_else(|| activity_id.to_string(), |a| a.id.clone());
    session.day_groups = move_activity(&session.day_groups, &session.suggested_activities, &id, from_day, to_day)?;
    session.grouped_days =
        regroup_keeping_restaurants(&session.day_groups, &session.suggested_activities, &session.grouped_days);
    Ok(())
}

fn attach_restaurants(session: &mut Session, day: u32, restaurant_ids: &[String]) -> EngineResult<()> {
    let restaurants: Vec<Restaurant> = restaurant_ids
        .iter()
        .filter_map(|id| session.restaurant(id).cloned())
        .collect();
    let grouped = session
        .grouped_days
        .iter_mut()
        .find(|d| d.day == day)
        .ok_or_else(|| EngineError::validation(format!("day {day} does not exist")))?;
    grouped.restaurants = restaurants;
    Ok(())
}

fn review_patch_grouped_days(session: &mut Session, days: &[DayPatch]) -> EngineResult<()> {
    if session.workflow_state() != WorkflowStage::Review {
        return Err(EngineError::validation(format!(
            "days are edited during {}",
            WorkflowStage::Review
        )));
    }
    if session.day_groups.is_empty() {
        return Err(EngineError::validation("there are no days to review"));
    }

    let mut restaurant_patches = Vec::new();
    for patch in days {
        let idx = usize::try_from(patch.day)
            .ok()
            .and_then(|d| d.checked_sub(1))
            .filter(|idx| *idx < session.day_groups.len())
            .ok_or_else(|| EngineError::validation(format!("day {} does not exist", patch.day)))?;

        if let Some(ids) = &patch.activity_ids {
            let ids = resolve_all(&session.suggested_activities, ids, "activity")?;
            session.day_groups[idx].theme = theme_for_ids(&ids, &session.suggested_activities);
            session.day_groups[idx].activity_ids = ids;
        }
        if let Some(theme) = patch.theme.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            session.day_groups[idx].theme = theme.to_string();
        }
        if let Some(ids) = &patch.restaurant_ids {
            restaurant_patches.push((patch.day, resolve_all(&session.restaurant_suggestions, ids, "restaurant")?));
        }
    }

    session.grouped_days =
        regroup_keeping_restaurants(&session.day_groups, &session.suggested_activities, &session.grouped_days);
    for (day, ids) in restaurant_patches {
        attach_restaurants(session, day, &ids)?;
        // A restaurant placed on a day is part of the selection
        for id in ids {
            if !session.selected_restaurant_ids.contains(&id) {
                session.selected_restaurant_ids.push(id);
            }
        }
    }
    Ok(())
}
