//! Card merging across repeated generation calls
//!
//! Asking for "more suggestions" must neither duplicate cards the user has
//! already seen nor lose preferences set on a card that comes back under a
//! new id. Cards are matched by id first, then by a normalized content key.

#[cfg(test)]
mod proptests;

use crate::session::{Activity, Link, Photo, Preference, ResearchOption, Restaurant, Session};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Cap on links and photos kept per card
pub const MAX_MEDIA_PER_CARD: usize = 3;

/// Cap on interest tags kept per activity
pub const MAX_TAGS_PER_ACTIVITY: usize = 3;

/// A candidate shown to the user for selection
pub trait Card: Clone {
    fn id(&self) -> &str;

    /// Ids this card was recognized under in earlier merges
    fn aliases(&self) -> &[String];

    fn add_alias(&mut self, alias: String);

    /// Aliases on generated cards are not trusted
    fn clear_aliases(&mut self);

    /// The two fields that identify a card by content
    fn key_fields(&self) -> (&str, &str);

    /// Fold `incoming` into `self`. Incoming values win, except the id.
    fn absorb(&mut self, incoming: Self);

    fn merge_key(&self) -> String {
        let (a, b) = self.key_fields();
        format!("{}|{}", normalize(a), normalize(b))
    }
}

/// Lower-case, drop punctuation, collapse whitespace
pub fn normalize(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Result of [`merge_cards`]
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome<T> {
    pub cards: Vec<T>,
    /// Incoming ids that were recognized by content, mapped to the id kept
    pub remapped: BTreeMap<String, String>,
    /// Ids of cards appended as new
    pub added: Vec<String>,
    /// Number of incoming cards folded into an existing card
    pub updated: usize,
}

/// Merge `incoming` into `existing`.
///
/// Existing cards keep their position and id. Merging the same incoming
/// list twice gives the same result as merging it once.
pub fn merge_cards<T: Card>(existing: &[T], incoming: &[T]) -> MergeOutcome<T> {
    let mut cards = existing.to_vec();
    let mut by_id: HashMap<String, usize> = HashMap::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();
    for (pos, card) in cards.iter().enumerate() {
        by_id.entry(card.id().to_string()).or_insert(pos);
        for alias in card.aliases() {
            by_id.entry(alias.clone()).or_insert(pos);
        }
        by_key.entry(card.merge_key()).or_insert(pos);
    }

    let mut remapped = BTreeMap::new();
    let mut added = Vec::new();
    let mut updated = 0;

    for card in incoming {
        let key = card.merge_key();
        let pos = if let Some(&pos) = by_id.get(card.id()) {
            cards[pos].absorb(card.clone());
            updated += 1;
            pos
        } else if let Some(&pos) = by_key.get(&key) {
            // Remember the incoming id so the next merge matches it by id
            remapped.insert(card.id().to_string(), cards[pos].id().to_string());
            cards[pos].add_alias(card.id().to_string());
            cards[pos].absorb(card.clone());
            updated += 1;
            pos
        } else {
            let mut fresh = card.clone();
            fresh.clear_aliases();
            added.push(card.id().to_string());
            cards.push(fresh);
            cards.len() - 1
        };
        by_id.insert(card.id().to_string(), pos);
        by_key.entry(key).or_insert(pos);
    }

    MergeOutcome {
        cards,
        remapped,
        added,
        updated,
    }
}

/// Rebuild a preference map for `cards`.
///
/// A card keeps the preference recorded under its id, or under any id it
/// was recognized by. Everything else is undecided. Entries for ids no
/// longer present are dropped.
pub fn carry_over_preferences<T: Card>(
    cards: &[T],
    previous: &BTreeMap<String, Preference>,
) -> BTreeMap<String, Preference> {
    cards
        .iter()
        .map(|card| {
            let pref = std::iter::once(card.id())
                .chain(card.aliases().iter().map(String::as_str))
                .find_map(|id| previous.get(id).copied())
                .unwrap_or_default();
            (card.id().to_string(), pref)
        })
        .collect()
}

/// Find the card known under `id`, either directly or as an alias
pub fn resolve<'a, T: Card>(cards: &'a [T], id: &str) -> Option<&'a T> {
    cards
        .iter()
        .find(|c| c.id() == id)
        .or_else(|| cards.iter().find(|c| c.aliases().iter().any(|a| a == id)))
}

/// Counts reported after merging into a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeSummary {
    pub added: usize,
    pub updated: usize,
    pub remapped: usize,
}

impl<T> From<&MergeOutcome<T>> for MergeSummary {
    fn from(outcome: &MergeOutcome<T>) -> Self {
        Self {
            added: outcome.added.len(),
            updated: outcome.updated,
            remapped: outcome.remapped.len(),
        }
    }
}

/// Merge research options into a session and carry preferences over
pub fn merge_research_options(session: &mut Session, incoming: &[ResearchOption]) -> MergeSummary {
    let outcome = merge_cards(&session.research_options, incoming);
    session.research_option_selections =
        carry_over_preferences(&outcome.cards, &session.research_option_selections);
    let summary = MergeSummary::from(&outcome);
    session.research_options = outcome.cards;
    summary
}

/// Merge suggested activities into a session.
///
/// Selections stay valid: existing ids are never dropped.
pub fn merge_activities(session: &mut Session, incoming: &[Activity]) -> MergeSummary {
    let outcome = merge_cards(&session.suggested_activities, incoming);
    let summary = MergeSummary::from(&outcome);
    session.suggested_activities = outcome.cards;
    summary
}

pub fn merge_restaurants(session: &mut Session, incoming: &[Restaurant]) -> MergeSummary {
    let outcome = merge_cards(&session.restaurant_suggestions, incoming);
    let summary = MergeSummary::from(&outcome);
    session.restaurant_suggestions = outcome.cards;
    summary
}

// ============================================================================
// Field-level merge helpers
// ============================================================================

/// Union by `key`, existing entries first, capped
fn union_capped<T, F>(existing: &mut Vec<T>, incoming: Vec<T>, key: F)
where
    F: Fn(&T) -> &str,
{
    let mut seen: HashSet<String> = existing.iter().map(|item| key(item).to_string()).collect();
    for item in incoming {
        if seen.insert(key(&item).to_string()) {
            existing.push(item);
        }
    }
    existing.truncate(MAX_MEDIA_PER_CARD);
}

fn merge_links(existing: &mut Vec<Link>, incoming: Vec<Link>) {
    union_capped(existing, incoming, |l| l.url.as_str());
}

fn merge_photos(existing: &mut Vec<Photo>, incoming: Vec<Photo>) {
    union_capped(existing, incoming, |p| p.url.as_str());
}

fn prefer<T>(slot: &mut Option<T>, incoming: Option<T>) {
    if incoming.is_some() {
        *slot = incoming;
    }
}

fn prefer_text(slot: &mut String, incoming: String) {
    if !incoming.trim().is_empty() {
        *slot = incoming;
    }
}

impl Card for ResearchOption {
    fn id(&self) -> &str {
        &self.id
    }

    fn aliases(&self) -> &[String] {
        &self.aliases
    }

    fn add_alias(&mut self, alias: String) {
        if alias != self.id && !self.aliases.contains(&alias) {
            self.aliases.push(alias);
        }
    }

    fn clear_aliases(&mut self) {
        self.aliases.clear();
    }

    fn key_fields(&self) -> (&str, &str) {
        (&self.title, &self.category)
    }

    fn absorb(&mut self, incoming: Self) {
        prefer_text(&mut self.title, incoming.title);
        prefer_text(&mut self.category, incoming.category);
        prefer(&mut self.summary, incoming.summary);
        merge_links(&mut self.links, incoming.links);
        merge_photos(&mut self.photos, incoming.photos);
    }
}

impl Card for Activity {
    fn id(&self) -> &str {
        &self.id
    }

    fn aliases(&self) -> &[String] {
        &self.aliases
    }

    fn add_alias(&mut self, alias: String) {
        if alias != self.id && !self.aliases.contains(&alias) {
            self.aliases.push(alias);
        }
    }

    fn clear_aliases(&mut self) {
        self.aliases.clear();
    }

    fn key_fields(&self) -> (&str, &str) {
        (&self.name, &self.activity_type)
    }

    fn absorb(&mut self, incoming: Self) {
        prefer_text(&mut self.name, incoming.name);
        prefer_text(&mut self.activity_type, incoming.activity_type);
        if !incoming.interest_tags.is_empty() {
            self.interest_tags = incoming.interest_tags;
            self.interest_tags.truncate(MAX_TAGS_PER_ACTIVITY);
        }
        prefer(&mut self.duration_hours, incoming.duration_hours);
        prefer(&mut self.cost_estimate, incoming.cost_estimate);
        prefer(&mut self.description, incoming.description);
        prefer(&mut self.time_of_day, incoming.time_of_day);
        prefer(&mut self.neighborhood, incoming.neighborhood);
        prefer(&mut self.coordinates, incoming.coordinates);
        prefer(&mut self.rating, incoming.rating);
        prefer(&mut self.user_ratings_total, incoming.user_ratings_total);
        prefer(&mut self.address, incoming.address);
        merge_photos(&mut self.photos, incoming.photos);
    }
}

impl Card for Restaurant {
    fn id(&self) -> &str {
        &self.id
    }

    fn aliases(&self) -> &[String] {
        &self.aliases
    }

    fn add_alias(&mut self, alias: String) {
        if alias != self.id && !self.aliases.contains(&alias) {
            self.aliases.push(alias);
        }
    }

    fn clear_aliases(&mut self) {
        self.aliases.clear();
    }

    fn key_fields(&self) -> (&str, &str) {
        (&self.name, &self.cuisine)
    }

    fn absorb(&mut self, incoming: Self) {
        prefer_text(&mut self.name, incoming.name);
        prefer_text(&mut self.cuisine, incoming.cuisine);
        prefer(&mut self.cost_per_person, incoming.cost_per_person);
        prefer(&mut self.rating, incoming.rating);
        prefer(&mut self.address, incoming.address);
        prefer(&mut self.description, incoming.description);
        merge_photos(&mut self.photos, incoming.photos);
    }
}
