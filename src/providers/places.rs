//! Google Places text search and Geocoding

use super::{PlaceCandidate, PlacesProvider, ProviderError};
use crate::session::Coordinates;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

const TEXT_SEARCH_URL: &str = "https://maps.googleapis.com/maps/api/place/textsearch/json";
const GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";
const PHOTO_URL: &str = "https://maps.googleapis.com/maps/api/place/photo";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_RESULTS: usize = 10;
const MAX_PHOTOS: usize = 3;

pub struct GooglePlacesClient {
    client: Client,
    places_key: String,
    geocoding_key: String,
}

impl GooglePlacesClient {
    /// `geocoding_key` falls back to the places key when absent
    pub fn new(places_key: String, geocoding_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");
        let geocoding_key = geocoding_key.unwrap_or_else(|| places_key.clone());
        Self {
            client,
            places_key,
            geocoding_key,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T, ProviderError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(&e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::network(format!("Failed to read response: {e}")))?;
        if !status.is_success() {
            return Err(ProviderError::from_status(status.as_u16(), &body));
        }
        serde_json::from_str(&body)
            .map_err(|e| ProviderError::invalid_response(format!("Failed to parse places response: {e}")))
    }
}

/// Map the API's in-body status to an error; `ZERO_RESULTS` is not one
fn check_status(status: &str, message: Option<&str>) -> Result<(), ProviderError> {
    let detail = message.unwrap_or(status);
    match status {
        "OK" | "ZERO_RESULTS" => Ok(()),
        "OVER_QUERY_LIMIT" => Err(ProviderError::rate_limit(detail.to_string())),
        "REQUEST_DENIED" => Err(ProviderError::auth(detail.to_string())),
        "UNKNOWN_ERROR" => Err(ProviderError::server_error(detail.to_string())),
        _ => Err(ProviderError::invalid_response(format!("{status}: {detail}"))),
    }
}

fn photo_url(reference: &str) -> String {
    format!("{PHOTO_URL}?maxwidth=800&photo_reference={reference}")
}

fn candidate_from(place: WirePlace) -> PlaceCandidate {
    PlaceCandidate {
        name: place.name,
        coordinates: place.geometry.map(|g| Coordinates {
            lat: g.location.lat,
            lng: g.location.lng,
        }),
        rating: place.rating,
        user_ratings_total: place.user_ratings_total,
        address: place.formatted_address.or(place.vicinity),
        photos: place
            .photos
            .into_iter()
            .take(MAX_PHOTOS)
            .map(|p| (photo_url(&p.photo_reference), p.html_attributions.into_iter().next()))
            .collect(),
    }
}

#[async_trait]
impl PlacesProvider for GooglePlacesClient {
    async fn geocode(&self, address: &str) -> Result<Option<Coordinates>, ProviderError> {
        let reply: WireGeocodeResponse = self
            .get_json(
                GEOCODE_URL,
                &[("address", address.to_string()), ("key", self.geocoding_key.clone())],
            )
            .await?;
        check_status(&reply.status, reply.error_message.as_deref())?;
        Ok(reply.results.into_iter().next().map(|r| Coordinates {
            lat: r.geometry.location.lat,
            lng: r.geometry.location.lng,
        }))
    }

    async fn search(
        &self,
        query: &str,
        bias: Option<Coordinates>,
        radius_meters: u32,
    ) -> Result<Vec<PlaceCandidate>, ProviderError> {
        let mut params = vec![("query", query.to_string()), ("key", self.places_key.clone())];
        if let Some(point) = bias {
            params.push(("location", format!("{},{}", point.lat, point.lng)));
            params.push(("radius", radius_meters.to_string()));
        }
        let reply: WireSearchResponse = self.get_json(TEXT_SEARCH_URL, &params).await?;
        check_status(&reply.status, reply.error_message.as_deref())?;
        Ok(reply
            .results
            .into_iter()
            .take(MAX_RESULTS)
            .map(candidate_from)
            .collect())
    }
}

// Wire types

#[derive(Debug, Deserialize)]
struct WireLatLng {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct WireGeometry {
    location: WireLatLng,
}

#[derive(Debug, Deserialize)]
struct WirePhoto {
    photo_reference: String,
    #[serde(default)]
    html_attributions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct WirePlace {
    #[serde(default)]
    name: String,
    #[serde(default)]
    geometry: Option<WireGeometry>,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    user_ratings_total: Option<u32>,
    #[serde(default)]
    formatted_address: Option<String>,
    #[serde(default)]
    vicinity: Option<String>,
    #[serde(default)]
    photos: Vec<WirePhoto>,
}

#[derive(Debug, Deserialize)]
struct WireSearchResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<WirePlace>,
}

#[derive(Debug, Deserialize)]
struct WireGeocodeResult {
    geometry: WireGeometry,
}

#[derive(Debug, Deserialize)]
struct WireGeocodeResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<WireGeocodeResult>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderErrorKind;

    #[test]
    fn test_search_response_to_candidates() {
        let reply: WireSearchResponse = serde_json::from_str(
            r#"{
                "status": "OK",
                "results": [{
                    "name": "Belem Tower",
                    "formatted_address": "Av. Brasilia, 1400-038 Lisboa",
                    "geometry": {"location": {"lat": 38.6916, "lng": -9.2160}},
                    "rating": 4.6,
                    "user_ratings_total": 81234,
                    "photos": [
                        {"photo_reference": "p1", "html_attributions": ["<a>Ana</a>"]},
                        {"photo_reference": "p2"},
                        {"photo_reference": "p3"},
                        {"photo_reference": "p4"}
                    ]
                }]
            }"#,
        )
        .unwrap();
        check_status(&reply.status, None).unwrap();
        let candidate = reply.results.into_iter().map(candidate_from).next().unwrap();
        assert_eq!(candidate.name, "Belem Tower");
        assert_eq!(candidate.user_ratings_total, Some(81234));
        assert_eq!(candidate.photos.len(), MAX_PHOTOS);
        assert!(candidate.photos[0].0.ends_with("photo_reference=p1"));
        assert_eq!(candidate.photos[0].1.as_deref(), Some("<a>Ana</a>"));
        assert!(candidate.coordinates.is_some());
    }

    #[test]
    fn test_in_body_status() {
        assert!(check_status("ZERO_RESULTS", None).is_ok());
        assert_eq!(
            check_status("OVER_QUERY_LIMIT", None).unwrap_err().kind,
            ProviderErrorKind::RateLimit
        );
        assert_eq!(
            check_status("REQUEST_DENIED", Some("The provided API key is invalid.")).unwrap_err().kind,
            ProviderErrorKind::Auth
        );
        assert_eq!(
            check_status("INVALID_REQUEST", None).unwrap_err().kind,
            ProviderErrorKind::InvalidResponse
        );
    }
}
