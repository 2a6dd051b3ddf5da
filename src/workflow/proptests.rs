//! Property-based tests for the stage validator

use super::*;
use proptest::prelude::*;

fn arb_flow() -> impl Strategy<Value = Flow> {
    prop_oneof![Just(Flow::Standard), Just(Flow::Legacy)]
}

fn arb_actor() -> impl Strategy<Value = Actor> {
    prop_oneof![Just(Actor::Ui), Just(Actor::Automated)]
}

/// A flow together with two indices into its stage sequence
fn arb_flow_and_pair() -> impl Strategy<Value = (Flow, usize, usize)> {
    arb_flow().prop_flat_map(|flow| {
        let len = flow.stages().len();
        (Just(flow), 0..len, 0..len)
    })
}

proptest! {
    #[test]
    fn prop_automated_may_advance_exactly_one(flow in arb_flow()) {
        for &stage in flow.stages() {
            if let Some(next) = flow.next_of(stage) {
                prop_assert_eq!(
                    validate_stages(flow, stage, next, Actor::Automated),
                    Ok(TransitionKind::Forward)
                );
                if let Some(after) = flow.next_of(next) {
                    let rejected = validate_stages(flow, stage, after, Actor::Automated);
                    let is_skip = matches!(rejected, Err(TransitionRejection::SkipsStages { .. }));
                    prop_assert!(is_skip);
                }
            }
        }
    }

    #[test]
    fn prop_decision_depends_only_on_positions((flow, a, b) in arb_flow_and_pair(), actor in arb_actor()) {
        let from = flow.stages()[a];
        let to = flow.stages()[b];
        let result = validate_stages(flow, from, to, actor);

        if a == b {
            prop_assert_eq!(result, Ok(TransitionKind::NoOp));
        } else if b == a + 1 {
            prop_assert_eq!(result, Ok(TransitionKind::Forward));
        } else if b > a {
            prop_assert!(result.is_err());
        } else if actor == Actor::Ui {
            prop_assert_eq!(result, Ok(TransitionKind::Backward));
        } else {
            prop_assert!(result.is_err());
        }
    }

    #[test]
    fn prop_string_and_typed_entry_points_agree((flow, a, b) in arb_flow_and_pair(), actor in arb_actor()) {
        let from = flow.stages()[a];
        let to = flow.stages()[b];
        prop_assert_eq!(
            validate_transition(flow, from.as_str(), to.as_str(), actor),
            validate_stages(flow, from, to, actor)
        );
    }

    #[test]
    fn prop_garbage_names_always_rejected(name in "[a-z_]{1,20}", actor in arb_actor()) {
        // Canonical names are upper case, so lower-case input never parses
        let result = validate_transition(Flow::Standard, &name, "REVIEW", actor);
        prop_assert!(
            matches!(result, Err(TransitionRejection::UnknownStage(_))),
            "expected unknown stage for {}", name
        );
    }
}
