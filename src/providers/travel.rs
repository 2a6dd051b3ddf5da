//! Lodging and flight search
//!
//! [`SampleTravel`] builds a plausible catalogue for any destination so the
//! lodging and flight steps work without a booking API. The catalogue is a
//! pure function of the query, and ids change when the query does.

use super::{ProviderError, TravelProvider};
use crate::session::{AccommodationOption, Coordinates, FlightOption};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::cmp::Ordering;

const EARTH_RADIUS_KM: f64 = 6371.0;
const CATALOGUE_SIZE: usize = 10;

/// Great-circle distance in kilometers
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
}

#[derive(Debug, Clone, PartialEq)]
pub struct HotelQuery {
    pub destination: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    /// Point distances are measured from, usually the geocoded destination
    pub landmark: Option<Coordinates>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlightQuery {
    pub origin: String,
    pub destination: String,
    pub departure: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub cabin: CabinClass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CabinClass {
    #[default]
    Economy,
    PremiumEconomy,
    Business,
    First,
}

impl CabinClass {
    pub fn as_str(self) -> &'static str {
        match self {
            CabinClass::Economy => "economy",
            CabinClass::PremiumEconomy => "premium_economy",
            CabinClass::Business => "business",
            CabinClass::First => "first",
        }
    }

    fn base_fare(self) -> f64 {
        match self {
            CabinClass::Economy => 300.0,
            CabinClass::PremiumEconomy => 600.0,
            CabinClass::Business => 1200.0,
            CabinClass::First => 2500.0,
        }
    }
}

/// How to pick the recommended lodging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HotelPreference {
    #[default]
    Price,
    Distance,
    Rating,
}

/// How to pick the recommended flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightPreference {
    #[default]
    Price,
    Duration,
    Direct,
}

/// Missing values sort last
fn ascending(a: Option<f64>, b: Option<f64>) -> Ordering {
    a.unwrap_or(f64::INFINITY).total_cmp(&b.unwrap_or(f64::INFINITY))
}

/// Best lodging for `preference`. Ties go to the earlier option.
pub fn best_hotel(options: &[AccommodationOption], preference: HotelPreference) -> Option<&AccommodationOption> {
    match preference {
        HotelPreference::Price => options.iter().min_by(|a, b| ascending(a.price_per_night, b.price_per_night)),
        HotelPreference::Distance => options.iter().min_by(|a, b| ascending(a.distance_km, b.distance_km)),
        HotelPreference::Rating => options
            .iter()
            .min_by(|a, b| b.rating.unwrap_or(0.0).total_cmp(&a.rating.unwrap_or(0.0))),
    }
}

/// Best flight for `preference`. Without a nonstop, `Direct` falls back to
/// the first option.
pub fn best_flight(options: &[FlightOption], preference: FlightPreference) -> Option<&FlightOption> {
    match preference {
        FlightPreference::Price => options.iter().min_by(|a, b| ascending(a.price, b.price)),
        FlightPreference::Duration => options
            .iter()
            .min_by_key(|f| f.duration_minutes.unwrap_or(u32::MAX)),
        FlightPreference::Direct => options
            .iter()
            .find(|f| f.stops == Some(0))
            .or_else(|| options.first()),
    }
}

// ============================================================================
// Sample catalogue
// ============================================================================

const CHAINS: [&str; 12] = [
    "Marriott",
    "Hilton",
    "Hyatt",
    "InterContinental",
    "Radisson",
    "Best Western",
    "Holiday Inn",
    "Sheraton",
    "Westin",
    "Four Seasons",
    "Ritz-Carlton",
    "W Hotels",
];
const HOTEL_KINDS: [&str; 6] = ["Hotel", "Inn", "Resort", "Suites", "Plaza", "Grand Hotel"];
const STREETS: [&str; 4] = ["Main St", "Central Ave", "Park Blvd", "Market St"];
const AIRLINES: [(&str, &str); 6] = [
    ("American Airlines", "AA"),
    ("United Airlines", "UA"),
    ("Delta Air Lines", "DL"),
    ("JetBlue Airways", "B6"),
    ("Southwest Airlines", "WN"),
    ("Alaska Airlines", "AS"),
];

#[derive(Debug, Clone, Copy)]
enum Tier {
    Budget,
    Mid,
    Upscale,
    Luxury,
}

impl Tier {
    const ALL: [Tier; 4] = [Tier::Budget, Tier::Mid, Tier::Upscale, Tier::Luxury];

    /// Lowest nightly price and the width of the range above it
    fn price_band(self) -> (usize, usize) {
        match self {
            Tier::Budget => (60, 40),
            Tier::Mid => (100, 80),
            Tier::Upscale => (180, 170),
            Tier::Luxury => (350, 450),
        }
    }

    fn rating_floor(self) -> f64 {
        match self {
            Tier::Budget => 2.5,
            Tier::Mid => 3.5,
            Tier::Upscale => 4.0,
            Tier::Luxury => 4.5,
        }
    }

    fn amenities(self) -> &'static [&'static str] {
        match self {
            Tier::Budget => &["Free WiFi", "Parking"],
            Tier::Mid => &["Free WiFi", "Gym", "Restaurant", "Parking"],
            Tier::Upscale | Tier::Luxury => &["Free WiFi", "Pool", "Spa", "Gym", "Restaurant", "Room Service"],
        }
    }
}

fn seed_of(parts: &[&str]) -> usize {
    parts
        .iter()
        .flat_map(|p| p.bytes())
        .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(usize::from(b)))
}

fn slug(text: &str) -> String {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// `step` in `0..steps` mapped onto `-0.05..0.05` degrees
#[allow(clippy::cast_precision_loss)]
fn offset(step: usize, steps: usize) -> f64 {
    (step % steps) as f64 / steps as f64 * 0.1 - 0.05
}

fn clock_time(minutes: usize) -> String {
    format!("{:02}:{:02}", (minutes / 60) % 24, minutes % 60)
}

/// Deterministic stand-in for a hotel and flight booking API
pub struct SampleTravel;

impl SampleTravel {
    #[allow(clippy::cast_precision_loss)]
    fn hotels(query: &HotelQuery) -> Vec<AccommodationOption> {
        // Rates move with the dates
        let dates = format!("{}/{}", query.check_in, query.check_out);
        let seed = seed_of(&[query.destination.as_str(), dates.as_str()]);
        let place = slug(&query.destination);
        let mut hotels: Vec<AccommodationOption> = (0..CATALOGUE_SIZE)
            .map(|i| {
                let mix = seed.wrapping_add(i.wrapping_mul(7919));
                let tier = Tier::ALL[i % Tier::ALL.len()];
                let (floor, width) = tier.price_band();
                let coordinates = query.landmark.map(|center| Coordinates {
                    lat: center.lat + offset(mix, 97),
                    lng: center.lng + offset(mix / 97, 89),
                });
                let distance_km = query
                    .landmark
                    .zip(coordinates)
                    .map(|(center, at)| (haversine_km(center, at) * 100.0).round() / 100.0);

                let mut price = (floor + mix % width) as f64;
                match distance_km {
                    Some(d) if d < 2.0 => price = (price * 1.3).round(),
                    Some(d) if d < 5.0 => price = (price * 1.1).round(),
                    _ => {}
                }

                let kind = HOTEL_KINDS[mix % HOTEL_KINDS.len()];
                AccommodationOption {
                    id: format!("hotel-{place}-{:04x}", mix % 0x1_0000),
                    name: format!("{} {kind} {}", CHAINS[mix % CHAINS.len()], query.destination),
                    kind: Some(kind.to_ascii_lowercase()),
                    price_per_night: Some(price),
                    rating: Some(tier.rating_floor() + (mix % 6) as f64 / 10.0),
                    address: Some(format!("{} {}", 1 + mix % 200, STREETS[mix % STREETS.len()])),
                    amenities: tier.amenities().iter().map(|a| (*a).to_string()).collect(),
                    coordinates,
                    distance_km,
                }
            })
            .collect();
        hotels.sort_by(|a, b| ascending(a.price_per_night, b.price_per_night));
        hotels
    }

    #[allow(clippy::cast_precision_loss)]
    fn flights(query: &FlightQuery) -> Vec<FlightOption> {
        let departure_day = query.departure.to_string();
        let seed = seed_of(&[query.origin.as_str(), query.destination.as_str(), departure_day.as_str()]);
        let route = slug(&format!("{} {}", query.origin, query.destination));
        // Round trips cost a little less than two one-way fares
        let trip_factor = if query.return_date.is_some() { 1.85 } else { 1.0 };

        let mut flights: Vec<FlightOption> = (0..CATALOGUE_SIZE)
            .map(|i| {
                let mix = seed.wrapping_add(i.wrapping_mul(104_729));
                let (airline, code) = AIRLINES[mix % AIRLINES.len()];
                let departure = (6 + (i * 2) % 18) * 60 + (mix % 4) * 15;
                let duration = 180 + (mix % 37) * 15;
                let variation = 0.7 + (mix % 61) as f64 / 100.0;
                let stops = match mix % 20 {
                    0..=13 => 0,
                    14..=18 => 1,
                    _ => 2,
                };

                FlightOption {
                    id: format!("flight-{route}-{:04x}", mix % 0x1_0000),
                    airline: airline.to_string(),
                    flight_number: Some(format!("{code}{}", 100 + mix % 9900)),
                    departure_time: Some(clock_time(departure)),
                    arrival_time: Some(clock_time(departure + duration)),
                    price: Some((query.cabin.base_fare() * variation * trip_factor).round()),
                    class_type: Some(query.cabin.as_str().to_string()),
                    duration_minutes: u32::try_from(duration).ok(),
                    stops: Some(stops),
                }
            })
            .collect();
        flights.sort_by(|a, b| ascending(a.price, b.price));
        flights
    }
}

#[async_trait]
impl TravelProvider for SampleTravel {
    async fn search_hotels(&self, query: &HotelQuery) -> Result<Vec<AccommodationOption>, ProviderError> {
        Ok(Self::hotels(query))
    }

    async fn search_flights(&self, query: &FlightQuery) -> Result<Vec<FlightOption>, ProviderError> {
        Ok(Self::flights(query))
    }
}
