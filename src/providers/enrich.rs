//! Places enrichment of suggested activities
//!
//! Enrichment never fails the caller: lookups that error are logged and the
//! activity is left as it was.

use super::{PlaceCandidate, PlacesProvider};
use crate::merge::MAX_MEDIA_PER_CARD;
use crate::session::{Activity, Photo};

/// Search radius around the destination
pub const ENRICH_RADIUS_METERS: u32 = 2_000;

/// What happened during one enrichment pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichmentReport {
    pub enriched: usize,
    /// Already had coordinates
    pub skipped: usize,
    pub not_found: usize,
    pub failed: usize,
}

fn best_match(candidates: Vec<PlaceCandidate>) -> Option<PlaceCandidate> {
    candidates.into_iter().max_by(|a, b| {
        a.rating
            .unwrap_or(f64::MIN)
            .total_cmp(&b.rating.unwrap_or(f64::MIN))
    })
}

fn apply_place(activity: &mut Activity, place: PlaceCandidate) {
    activity.coordinates = place.coordinates.or(activity.coordinates);
    activity.rating = place.rating.or(activity.rating);
    activity.user_ratings_total = place.user_ratings_total.or(activity.user_ratings_total);
    activity.address = place.address.or(activity.address.take());
    for (url, attribution) in place.photos {
        if activity.photos.len() >= MAX_MEDIA_PER_CARD {
            break;
        }
        if activity.photos.iter().all(|p| p.url != url) {
            activity.photos.push(Photo { url, attribution });
        }
    }
}

/// Fill coordinates, rating, address and photos for activities that lack
/// coordinates, looking each up as `"<name>, <destination>"`.
pub async fn enrich_activities(
    places: &dyn PlacesProvider,
    destination: &str,
    activities: &mut [Activity],
) -> EnrichmentReport {
    let mut report = EnrichmentReport::default();
    if activities.iter().all(|a| a.coordinates.is_some()) {
        report.skipped = activities.len();
        return report;
    }

    let bias = match places.geocode(destination).await {
        Ok(point) => point,
        Err(e) => {
            tracing::warn!(destination, error = %e, "Destination geocoding failed; searching without bias");
            None
        }
    };

    for activity in activities.iter_mut() {
        if activity.coordinates.is_some() {
            report.skipped += 1;
            continue;
        }
        let query = format!("{}, {destination}", activity.name);
        match places.search(&query, bias, ENRICH_RADIUS_METERS).await {
            Ok(candidates) => match best_match(candidates) {
                Some(place) => {
                    apply_place(activity, place);
                    report.enriched += 1;
                }
                None => report.not_found += 1,
            },
            Err(e) => {
                tracing::warn!(activity_id = %activity.id, query = %query, error = %e, "Place lookup failed");
                report.failed += 1;
            }
        }
    }

    tracing::debug!(
        destination,
        enriched = report.enriched,
        not_found = report.not_found,
        failed = report.failed,
        "Enrichment finished"
    );
    report
}
