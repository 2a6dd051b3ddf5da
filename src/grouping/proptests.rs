//! Property-based tests for day grouping

use super::*;
use proptest::prelude::*;
use std::collections::HashSet;

fn arb_time() -> impl Strategy<Value = Option<TimeOfDay>> {
    prop_oneof![
        Just(None),
        Just(Some(TimeOfDay::Morning)),
        Just(Some(TimeOfDay::Afternoon)),
        Just(Some(TimeOfDay::Evening)),
    ]
}

fn arb_activities() -> impl Strategy<Value = Vec<Activity>> {
    proptest::collection::vec(
        (
            prop_oneof![Just("museum"), Just("food"), Just("hiking"), Just("Museum")],
            proptest::option::of(prop_oneof![Just("Alfama"), Just("Belem"), Just("Baixa")]),
            arb_time(),
        ),
        0..15,
    )
    .prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(idx, (kind, area, time))| {
                let mut activity = Activity::new(format!("a{idx}"), format!("Activity {idx}"), kind);
                activity.neighborhood = area.map(str::to_string);
                activity.time_of_day = time;
                activity
            })
            .collect()
    })
}

fn arb_trip() -> impl Strategy<Value = TripInfo> {
    proptest::option::of(1u32..8).prop_map(|duration_days| TripInfo {
        duration_days,
        ..TripInfo::default()
    })
}

proptest! {
    #[test]
    fn prop_every_activity_assigned_once(trip in arb_trip(), activities in arb_activities()) {
        let groups = group_activities_by_day(&trip, &activities);
        prop_assert_eq!(groups.len(), trip.day_count() as usize);

        let assigned: Vec<&String> = groups.iter().flat_map(|g| &g.activity_ids).collect();
        let unique: HashSet<&String> = assigned.iter().copied().collect();
        prop_assert_eq!(assigned.len(), activities.len());
        prop_assert_eq!(unique.len(), activities.len());
        for (idx, group) in groups.iter().enumerate() {
            prop_assert_eq!(group.day as usize, idx + 1);
        }
    }

    #[test]
    fn prop_grouping_is_balanced_and_deterministic(trip in arb_trip(), activities in arb_activities()) {
        let groups = group_activities_by_day(&trip, &activities);
        let sizes: Vec<usize> = groups.iter().map(|g| g.activity_ids.len()).collect();
        let max = sizes.iter().copied().max().unwrap_or(0);
        let min = sizes.iter().copied().min().unwrap_or(0);
        prop_assert!(max - min <= 1);
        prop_assert_eq!(groups, group_activities_by_day(&trip, &activities));
    }

    #[test]
    fn prop_move_preserves_partition(
        trip in arb_trip(),
        activities in arb_activities(),
        pick in any::<prop::sample::Index>(),
        to_day in 1u32..8,
    ) {
        let groups = group_activities_by_day(&trip, &activities);
        prop_assume!(!activities.is_empty());
        let id = &activities[pick.index(activities.len())].id;
        let from_day = groups
            .iter()
            .find(|g| g.activity_ids.contains(id))
            .map(|g| g.day)
            .unwrap();

        match move_activity(&groups, &activities, id, from_day, to_day) {
            Ok(moved) => {
                let total: usize = moved.iter().map(|g| g.activity_ids.len()).sum();
                prop_assert_eq!(total, activities.len());
                let holders: Vec<u32> = moved
                    .iter()
                    .filter(|g| g.activity_ids.contains(id))
                    .map(|g| g.day)
                    .collect();
                prop_assert_eq!(holders, vec![to_day]);
                // Untouched days keep their theme
                for (before, after) in groups.iter().zip(&moved) {
                    if before.day != from_day && before.day != to_day {
                        prop_assert_eq!(before, after);
                    }
                }
            }
            Err(_) => {
                prop_assert!(to_day == from_day || to_day as usize > groups.len());
            }
        }
    }

    #[test]
    fn prop_grouped_days_mirror_groups(trip in arb_trip(), activities in arb_activities()) {
        let groups = group_activities_by_day(&trip, &activities);
        let days = build_grouped_days(&groups, &activities);
        prop_assert_eq!(days.len(), groups.len());
        for (group, day) in groups.iter().zip(&days) {
            let ids: Vec<&String> = day.activities.iter().map(|a| &a.id).collect();
            prop_assert_eq!(ids, group.activity_ids.iter().collect::<Vec<_>>());
        }
    }
}
