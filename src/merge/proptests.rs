//! Property-based tests for card merging

use super::*;
use proptest::prelude::*;
use std::collections::HashSet;

// Small vocabularies so that id and content-key collisions are common
fn arb_title() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("Belem Tower".to_string()),
        Just("belem tower!".to_string()),
        Just("Sintra".to_string()),
        Just("Time Out Market".to_string()),
        Just("Fado Night".to_string()),
        "[A-Za-z ]{1,12}",
    ]
}

fn arb_category() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("History".to_string()),
        Just("history".to_string()),
        Just("Food".to_string()),
        Just("Nightlife".to_string()),
    ]
}

fn arb_link() -> impl Strategy<Value = Link> {
    "https://[a-d]{1,2}".prop_map(|url| Link { url, title: None })
}

fn arb_option(id_pool: &'static [&'static str]) -> impl Strategy<Value = ResearchOption> {
    (
        proptest::sample::select(id_pool),
        arb_title(),
        arb_category(),
        proptest::option::of("[a-z ]{0,20}"),
        proptest::collection::vec(arb_link(), 0..5),
    )
        .prop_map(|(id, title, category, summary, links)| ResearchOption {
            id: id.to_string(),
            title,
            category,
            summary,
            links,
            photos: vec![],
            aliases: vec![],
        })
}

/// Existing cards as they would be stored: unique ids
fn arb_existing() -> impl Strategy<Value = Vec<ResearchOption>> {
    proptest::collection::vec(arb_option(&["e1", "e2", "e3", "e4", "e5"]), 0..6).prop_map(|cards| {
        let mut seen = HashSet::new();
        cards.into_iter().filter(|c| seen.insert(c.id.clone())).collect()
    })
}

fn arb_incoming() -> impl Strategy<Value = Vec<ResearchOption>> {
    proptest::collection::vec(arb_option(&["e1", "e3", "n1", "n2", "n3"]), 0..6)
}

proptest! {
    #[test]
    fn prop_merge_is_idempotent(existing in arb_existing(), incoming in arb_incoming()) {
        let once = merge_cards(&existing, &incoming).cards;
        let twice = merge_cards(&once, &incoming).cards;
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_existing_ids_never_dropped(existing in arb_existing(), incoming in arb_incoming()) {
        let merged = merge_cards(&existing, &incoming);
        prop_assert!(merged.cards.len() >= existing.len());
        for (pos, card) in existing.iter().enumerate() {
            prop_assert_eq!(&merged.cards[pos].id, &card.id, "existing cards keep position and id");
        }
    }

    #[test]
    fn prop_unmatched_existing_cards_untouched(existing in arb_existing(), incoming in arb_incoming()) {
        let incoming_ids: HashSet<_> = incoming.iter().map(|c| c.id.clone()).collect();
        let incoming_keys: HashSet<_> = incoming.iter().map(Card::merge_key).collect();
        let merged = merge_cards(&existing, &incoming);

        for (pos, card) in existing.iter().enumerate() {
            if !incoming_ids.contains(&card.id) && !incoming_keys.contains(&card.merge_key()) {
                prop_assert_eq!(&merged.cards[pos], card);
            }
        }
    }

    #[test]
    fn prop_media_capped(existing in arb_existing(), incoming in arb_incoming()) {
        let merged = merge_cards(&existing, &incoming);
        let touched: HashSet<_> = incoming
            .iter()
            .map(|c| c.id.clone())
            .chain(merged.remapped.values().cloned())
            .collect();
        for card in &merged.cards {
            if touched.contains(&card.id) {
                prop_assert!(card.links.len() <= MAX_MEDIA_PER_CARD);
            }
        }
    }

    #[test]
    fn prop_preferences_cover_exactly_merged_cards(
        existing in arb_existing(),
        incoming in arb_incoming(),
        keep_first in any::<bool>(),
    ) {
        let mut previous = BTreeMap::new();
        if let Some(first) = existing.first() {
            let pref = if keep_first { Preference::Keep } else { Preference::Reject };
            previous.insert(first.id.clone(), pref);
        }
        let merged = merge_cards(&existing, &incoming);
        let prefs = carry_over_preferences(&merged.cards, &previous);

        prop_assert_eq!(prefs.len(), merged.cards.iter().map(|c| &c.id).collect::<HashSet<_>>().len());
        for (id, pref) in &previous {
            prop_assert_eq!(prefs.get(id), Some(pref));
        }
        for id in &merged.added {
            if !previous.contains_key(id) {
                prop_assert_eq!(prefs.get(id), Some(&Preference::Maybe));
            }
        }
    }
}
