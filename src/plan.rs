//! Final plan assembly

use crate::grouping::{build_grouped_days, group_activities_by_day};
use crate::session::{
    AccommodationOption, Activity, Choice, FlightOption, GroupedDay, Restaurant, Session, TripInfo,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of top-rated activities called out in the plan
pub const HIGHLIGHT_COUNT: usize = 3;

/// Outcome of an optional booking sub-step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "option", rename_all = "snake_case")]
pub enum Booking<T> {
    Booked(T),
    Skipped,
    Undecided,
}

impl<T: Clone> Booking<T> {
    fn from_choice<F>(choice: Option<&Choice>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<T>,
    {
        match choice {
            None => Booking::Undecided,
            Some(Choice::Skipped) => Booking::Skipped,
            Some(Choice::Selected { id }) => lookup(id).map_or(Booking::Undecided, Booking::Booked),
        }
    }

    fn booked(&self) -> Option<&T> {
        match self {
            Booking::Booked(option) => Some(option),
            Booking::Skipped | Booking::Undecided => None,
        }
    }
}

/// Estimated trip cost, in the currency the estimates were given in
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    pub activities: f64,
    pub accommodation: f64,
    pub transportation: f64,
    pub food: f64,
    pub total: f64,
    pub per_person: f64,
}

/// The terminal itinerary, written once when the session is finalized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalPlan {
    pub trip_info: TripInfo,
    pub days: Vec<GroupedDay>,
    pub restaurants: Vec<Restaurant>,
    pub accommodation: Booking<AccommodationOption>,
    pub flight: Booking<FlightOption>,
    pub highlights: Vec<Activity>,
    pub costs: CostBreakdown,
    pub finalized_at: DateTime<Utc>,
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Assemble the final plan from the session as it stands.
///
/// Sessions without day groups (the legacy flow) get their selected
/// activities spread over the trip days here.
pub fn build_final_plan(session: &Session, now: DateTime<Utc>) -> FinalPlan {
    let trip = &session.trip_info;
    let selected = session.selected_activities();

    let days = if session.grouped_days.is_empty() && !selected.is_empty() {
        build_grouped_days(&group_activities_by_day(trip, &selected), &selected)
    } else {
        session.grouped_days.clone()
    };

    let restaurants: Vec<Restaurant> = session
        .selected_restaurant_ids
        .iter()
        .filter_map(|id| session.restaurant(id).cloned())
        .collect();

    let accommodation = Booking::from_choice(session.accommodation_choice.as_ref(), |id| {
        session.accommodation_options.iter().find(|o| o.id == id).cloned()
    });
    let flight = Booking::from_choice(session.flight_choice.as_ref(), |id| {
        session.flight_options.iter().find(|o| o.id == id).cloned()
    });

    let mut highlights = selected.clone();
    // Stable sort keeps selection order among equal ratings
    highlights.sort_by(|a, b| {
        b.rating
            .unwrap_or(f64::MIN)
            .total_cmp(&a.rating.unwrap_or(f64::MIN))
    });
    highlights.truncate(HIGHLIGHT_COUNT);

    let costs = estimate_costs(trip, &selected, &restaurants, accommodation.booked(), flight.booked());

    FinalPlan {
        trip_info: trip.clone(),
        days,
        restaurants,
        accommodation,
        flight,
        highlights,
        costs,
        finalized_at: now,
    }
}

/// Per-traveler estimates scale with the party size; lodging is per night.
pub fn estimate_costs(
    trip: &TripInfo,
    activities: &[Activity],
    restaurants: &[Restaurant],
    accommodation: Option<&AccommodationOption>,
    flight: Option<&FlightOption>,
) -> CostBreakdown {
    let travelers = f64::from(trip.traveler_count());
    let nights = f64::from(trip.day_count().saturating_sub(1).max(1));

    let activities_cost: f64 = activities.iter().filter_map(|a| a.cost_estimate).sum::<f64>() * travelers;
    let accommodation_cost = accommodation
        .and_then(|o| o.price_per_night)
        .map_or(0.0, |price| price * nights);
    let transportation = flight.and_then(|f| f.price).map_or(0.0, |price| price * travelers);
    let food = restaurants.iter().filter_map(|r| r.cost_per_person).sum::<f64>() * travelers;

    let total = activities_cost + accommodation_cost + transportation + food;
    CostBreakdown {
        activities: round_cents(activities_cost),
        accommodation: round_cents(accommodation_cost),
        transportation: round_cents(transportation),
        food: round_cents(food),
        total: round_cents(total),
        per_person: round_cents(total / travelers),
    }
}

#[cfg(test)]
impl FinalPlan {
    pub fn empty_for_tests() -> Self {
        let now = Utc::now();
        build_final_plan(&Session::new("test", crate::workflow::Flow::Standard, now), now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::Flow;

    fn priced(id: &str, cost: f64, rating: Option<f64>) -> Activity {
        let mut activity = Activity::new(id, format!("Activity {id}"), "sightseeing");
        activity.cost_estimate = Some(cost);
        activity.rating = rating;
        activity
    }

    fn session_with_selection() -> Session {
        let mut session = Session::new("s", Flow::Legacy, Utc::now());
        session.trip_info = TripInfo {
            destination: Some("Lisbon".into()),
            duration_days: Some(3),
            travelers: Some(2),
            ..TripInfo::default()
        };
        session.suggested_activities = vec![
            priced("a1", 10.0, Some(4.1)),
            priced("a2", 20.0, Some(4.9)),
            priced("a3", 5.0, None),
            priced("a4", 0.0, Some(4.5)),
        ];
        session.selected_activity_ids = vec!["a1".into(), "a2".into(), "a3".into(), "a4".into()];
        session
    }

    #[test]
    fn test_cost_breakdown() {
        let mut session = session_with_selection();
        session.accommodation_options = vec![AccommodationOption {
            id: "h1".into(),
            name: "Memmo Alfama".into(),
            kind: Some("hotel".into()),
            price_per_night: Some(150.0),
            rating: None,
            address: None,
            amenities: vec![],
            coordinates: None,
            distance_km: None,
        }];
        session.accommodation_choice = Some(Choice::Selected { id: "h1".into() });
        session.flight_options = vec![FlightOption {
            id: "f1".into(),
            airline: "TAP".into(),
            flight_number: Some("TP1351".into()),
            departure_time: None,
            arrival_time: None,
            price: Some(120.0),
            class_type: None,
            duration_minutes: None,
            stops: None,
        }];
        session.flight_choice = Some(Choice::Skipped);
        session.restaurant_suggestions = vec![Restaurant {
            id: "r1".into(),
            name: "Cervejaria Ramiro".into(),
            cuisine: "seafood".into(),
            cost_per_person: Some(35.0),
            rating: None,
            address: None,
            description: None,
            photos: vec![],
            aliases: vec![],
        }];
        session.selected_restaurant_ids = vec!["r1".into()];

        let plan = build_final_plan(&session, Utc::now());
        assert_eq!(plan.costs.activities, 70.0);
        assert_eq!(plan.costs.accommodation, 300.0);
        assert_eq!(plan.costs.transportation, 0.0);
        assert_eq!(plan.costs.food, 70.0);
        assert_eq!(plan.costs.total, 440.0);
        assert_eq!(plan.costs.per_person, 220.0);
        assert!(matches!(plan.accommodation, Booking::Booked(ref h) if h.id == "h1"));
        assert_eq!(plan.flight, Booking::Skipped);
    }

    #[test]
    fn test_one_day_trip_still_pays_one_night() {
        let trip = TripInfo { duration_days: Some(1), ..TripInfo::default() };
        let hotel = AccommodationOption {
            id: "h".into(),
            name: "Hostel".into(),
            kind: None,
            price_per_night: Some(40.0),
            rating: None,
            address: None,
            amenities: vec![],
            coordinates: None,
            distance_km: None,
        };
        let costs = estimate_costs(&trip, &[], &[], Some(&hotel), None);
        assert_eq!(costs.accommodation, 40.0);
        assert_eq!(costs.per_person, 40.0);
    }

    #[test]
    fn test_highlights_are_top_rated() {
        let plan = build_final_plan(&session_with_selection(), Utc::now());
        let ids: Vec<_> = plan.highlights.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a2", "a4", "a1"]);
    }

    #[test]
    fn test_legacy_session_gets_days() {
        let plan = build_final_plan(&session_with_selection(), Utc::now());
        assert_eq!(plan.days.len(), 3);
        let total: usize = plan.days.iter().map(|d| d.activities.len()).sum();
        assert_eq!(total, 4);
        assert_eq!(plan.accommodation, Booking::Undecided);
    }
}
