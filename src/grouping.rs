//! Day grouping
//!
//! Assigns chosen activities to numbered trip days and derives a short theme
//! for each day. Everything here is pure; callers persist the result.

#[cfg(test)]
mod proptests;

use crate::error::{EngineError, EngineResult};
use crate::merge::normalize;
use crate::session::{Activity, DayGroup, GroupedDay, TimeOfDay, TripInfo};
use std::collections::HashMap;

/// Theme used for a day with nothing assigned
pub const FREE_DAY_THEME: &str = "Free day";

fn time_rank(time: Option<TimeOfDay>) -> u8 {
    match time {
        Some(TimeOfDay::Morning) => 0,
        Some(TimeOfDay::Afternoon) => 1,
        Some(TimeOfDay::Evening) => 2,
        None => 3,
    }
}

/// Spread `activities` over the trip's days.
///
/// Activities sharing a neighborhood are kept next to each other and then
/// cut into contiguous, balanced runs: day counts differ by at most one and
/// earlier days take the extra activity. Within a day, activities are
/// ordered morning to evening. Identical input gives identical output.
pub fn group_activities_by_day(trip: &TripInfo, activities: &[Activity]) -> Vec<DayGroup> {
    let days = trip.day_count() as usize;

    // Cluster = position of the first activity seen in the same neighborhood
    let mut first_seen: HashMap<String, usize> = HashMap::new();
    let mut ordered: Vec<(usize, &Activity)> = activities
        .iter()
        .enumerate()
        .map(|(idx, activity)| {
            let cluster = match activity.neighborhood.as_deref().map(normalize) {
                Some(key) if !key.is_empty() => *first_seen.entry(key).or_insert(idx),
                _ => idx,
            };
            (cluster, activity)
        })
        .collect();
    ordered.sort_by_key(|(cluster, activity)| (*cluster, time_rank(activity.time_of_day)));

    let base = ordered.len() / days;
    let extra = ordered.len() % days;
    let mut remaining = ordered.into_iter().map(|(_, activity)| activity);

    (0..days)
        .map(|idx| {
            let take = base + usize::from(idx < extra);
            let mut members: Vec<&Activity> = remaining.by_ref().take(take).collect();
            members.sort_by_key(|a| time_rank(a.time_of_day));
            let day = u32::try_from(idx + 1).unwrap_or(u32::MAX);
            DayGroup {
                day,
                date: trip.date_of_day(day),
                theme: derive_theme(&members),
                activity_ids: members.iter().map(|a| a.id.clone()).collect(),
            }
        })
        .collect()
}

/// Theme from the dominant activity type; ties go to the type seen first.
///
/// When every activity shares one neighborhood it is named too.
pub fn derive_theme(activities: &[&Activity]) -> String {
    // (normalized type, display label, count) in first-seen order
    let mut tally: Vec<(String, &str, usize)> = Vec::new();
    for activity in activities {
        let key = normalize(&activity.activity_type);
        if key.is_empty() {
            continue;
        }
        match tally.iter_mut().find(|(k, _, _)| *k == key) {
            Some(entry) => entry.2 += 1,
            None => tally.push((key, activity.activity_type.trim(), 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (_, label, count) in &tally {
        match best {
            Some((_, top)) if top >= *count => {}
            _ => best = Some((label, *count)),
        }
    }
    let Some((label, _)) = best else {
        return if activities.is_empty() {
            FREE_DAY_THEME.to_string()
        } else {
            "Exploring".to_string()
        };
    };

    let mut theme = title_case(label);
    if let Some(area) = shared_neighborhood(activities) {
        theme.push_str(" in ");
        theme.push_str(area);
    }
    theme
}

fn shared_neighborhood<'a>(activities: &[&'a Activity]) -> Option<&'a str> {
    let first = activities.first()?.neighborhood.as_deref()?.trim();
    if first.is_empty() {
        return None;
    }
    let key = normalize(first);
    activities
        .iter()
        .all(|a| a.neighborhood.as_deref().map(normalize).as_deref() == Some(key.as_str()))
        .then_some(first)
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Move one activity between two days and re-theme both.
///
/// `activities` is used to look up types for the new themes. The input is
/// left untouched; the updated groups are returned.
pub fn move_activity(
    day_groups: &[DayGroup],
    activities: &[Activity],
    activity_id: &str,
    from_day: u32,
    to_day: u32,
) -> EngineResult<Vec<DayGroup>> {
    let last = day_groups.len();
    let index_of = |day: u32| -> EngineResult<usize> {
        usize::try_from(day)
            .ok()
            .filter(|d| (1..=last).contains(d))
            .map(|d| d - 1)
            .ok_or_else(|| EngineError::validation(format!("day {day} is outside 1..={last}")))
    };
    let from = index_of(from_day)?;
    let to = index_of(to_day)?;
    if from == to {
        return Err(EngineError::validation(format!(
            "activity is already on day {from_day}"
        )));
    }

    let mut groups = day_groups.to_vec();
    let pos = groups[from]
        .activity_ids
        .iter()
        .position(|id| id == activity_id)
        .ok_or_else(|| {
            EngineError::validation(format!("day {from_day} does not contain activity '{activity_id}'"))
        })?;
    let moved = groups[from].activity_ids.remove(pos);
    groups[to].activity_ids.push(moved);

    for idx in [from, to] {
        groups[idx].theme = theme_for_ids(&groups[idx].activity_ids, activities);
    }
    tracing::debug!(activity_id, from_day, to_day, "Moved activity between days");
    Ok(groups)
}

/// Theme for a day given its activity ids; unknown ids are ignored
pub fn theme_for_ids(ids: &[String], activities: &[Activity]) -> String {
    let members: Vec<&Activity> = ids
        .iter()
        .filter_map(|id| activities.iter().find(|a| a.id == *id))
        .collect();
    derive_theme(&members)
}

/// Expand day groups into UI-ready days.
///
/// Ids that no longer resolve are skipped. Restaurants start empty.
pub fn build_grouped_days(day_groups: &[DayGroup], activities: &[Activity]) -> Vec<GroupedDay> {
    let by_id: HashMap<&str, &Activity> = activities.iter().map(|a| (a.id.as_str(), a)).collect();
    day_groups
        .iter()
        .map(|group| GroupedDay {
            day: group.day,
            date: group.date,
            theme: group.theme.clone(),
            activities: group
                .activity_ids
                .iter()
                .filter_map(|id| by_id.get(id.as_str()).map(|a| (*a).clone()))
                .collect(),
            restaurants: Vec::new(),
        })
        .collect()
}

/// Rebuild grouped days after the day groups changed, keeping the
/// restaurants already attached to each day number.
pub fn regroup_keeping_restaurants(
    day_groups: &[DayGroup],
    activities: &[Activity],
    previous: &[GroupedDay],
) -> Vec<GroupedDay> {
    let mut days = build_grouped_days(day_groups, activities);
    for day in &mut days {
        if let Some(old) = previous.iter().find(|p| p.day == day.day) {
            day.restaurants = old.restaurants.clone();
        }
    }
    days
}
