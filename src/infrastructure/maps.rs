use crate::config::MapsConfig;
use crate::types::{Coordinates, Place, Route, Toll};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

const PLACES_API_URL: &str = "https://places.googleapis.com/v1/places:searchText";
const ROUTES_API_URL: &str = "https://routes.googleapis.com/directions/v2:computeRoutes";

const PLACES_FIELD_MASK: &str = "places.displayName,places.formattedAddress,places.rating,\
     places.userRatingCount,places.location,places.priceLevel";
const ROUTES_FIELD_MASK: &str = "routes.duration,routes.distanceMeters,\
     routes.travelAdvisory.tollInfo,routes.polyline.encodedPolyline,\
     routes.optimizedIntermediateWaypointIndex,routes.legs.endLocation";

/// Departure is set slightly in the future so the provider applies live
/// traffic instead of a null timestamp.
const DEPARTURE_OFFSET_MINUTES: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapsErrorKind {
    ConfigMissing,
    RateLimit,
    NotFound,
    ApiFailure,
}

impl MapsErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MapsErrorKind::ConfigMissing => "config_missing",
            MapsErrorKind::RateLimit => "rate_limit",
            MapsErrorKind::NotFound => "not_found",
            MapsErrorKind::ApiFailure => "api_failure",
        }
    }
}

/// Domain error of the mapping client. Carried as a tagged value end to
/// end; converted to HTTP semantics only at the handler boundary.
#[derive(Debug, Clone, Error)]
#[error("{message} [{}]", kind.as_str())]
pub struct MapsError {
    pub kind: MapsErrorKind,
    pub message: String,
}

impl MapsError {
    fn config_missing() -> Self {
        Self {
            kind: MapsErrorKind::ConfigMissing,
            message: "サービスの設定に問題があります。管理者にお問い合わせください。".into(),
        }
    }

    fn rate_limit() -> Self {
        Self {
            kind: MapsErrorKind::RateLimit,
            message: "リクエストが集中しています。しばらく待ってから再度お試しください。".into(),
        }
    }

    fn not_found() -> Self {
        Self {
            kind: MapsErrorKind::NotFound,
            message: "ルートが見つかりませんでした。地名を確認してください。".into(),
        }
    }

    fn search_failure() -> Self {
        Self {
            kind: MapsErrorKind::ApiFailure,
            message: "スポット検索に失敗しました。ネットワークを確認してください。".into(),
        }
    }

    fn route_failure() -> Self {
        Self {
            kind: MapsErrorKind::ApiFailure,
            message: "ルート計算に失敗しました。ネットワークを確認してください。".into(),
        }
    }

    /// Wire form fed back to the model as a failed tool result.
    pub fn to_tool_result(&self) -> Value {
        json!({ "error": self.message, "error_type": self.kind.as_str() })
    }
}

#[async_trait]
pub trait MapsApi: Send + Sync {
    async fn search_places(
        &self,
        location_query: &str,
        place_type: &str,
    ) -> Result<Vec<Place>, MapsError>;

    async fn calculate_route(
        &self,
        origin: &str,
        destination: &str,
        waypoints: &[String],
    ) -> Result<Route, MapsError>;
}

/// HTTP client for the Places text-search and Routes v2 endpoints.
#[derive(Clone)]
pub struct MapsClient {
    http: Client,
    api_key: Option<String>,
    min_rating: f64,
    max_results: u32,
    places_timeout: Duration,
    routes_timeout: Duration,
}

impl MapsClient {
    pub fn new(config: &MapsConfig) -> Self {
        Self {
            http: Client::new(),
            api_key: config.api_key.clone(),
            min_rating: config.min_rating,
            max_results: config.max_results,
            places_timeout: config.places_timeout,
            routes_timeout: config.routes_timeout,
        }
    }

    fn require_api_key(&self) -> Result<&str, MapsError> {
        self.api_key.as_deref().ok_or_else(|| {
            error!("MAPS_API_KEY is not configured");
            MapsError::config_missing()
        })
    }
}

#[async_trait]
impl MapsApi for MapsClient {
    async fn search_places(
        &self,
        location_query: &str,
        place_type: &str,
    ) -> Result<Vec<Place>, MapsError> {
        let api_key = self.require_api_key()?;

        let payload = json!({
            "textQuery": format!("{place_type} near {location_query}"),
            "minRating": self.min_rating,
            "maxResultCount": self.max_results,
        });

        info!(location_query, place_type, "Searching places");
        let response = self
            .http
            .post(PLACES_API_URL)
            .header("X-Goog-Api-Key", api_key)
            .header("X-Goog-FieldMask", PLACES_FIELD_MASK)
            .timeout(self.places_timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                error!(%err, "Places API request failed");
                MapsError::search_failure()
            })?;

        let body: PlacesResponse = read_json(response, MapsError::search_failure).await?;
        let places: Vec<Place> = body.places.into_iter().map(Place::from).collect();
        debug!(count = places.len(), "Place search completed");
        Ok(places)
    }

    async fn calculate_route(
        &self,
        origin: &str,
        destination: &str,
        waypoints: &[String],
    ) -> Result<Route, MapsError> {
        let api_key = self.require_api_key()?;

        let departure_time = (Utc::now() + chrono::Duration::minutes(DEPARTURE_OFFSET_MINUTES))
            .to_rfc3339_opts(SecondsFormat::Secs, true);

        let mut payload = json!({
            "origin": { "address": origin },
            "destination": { "address": destination },
            "travelMode": "DRIVE",
            "routingPreference": "TRAFFIC_AWARE",
            "extraComputations": ["TOLLS"],
            "departureTime": departure_time,
        });
        if !waypoints.is_empty() {
            let intermediates: Vec<Value> =
                waypoints.iter().map(|wp| json!({ "address": wp })).collect();
            payload["intermediates"] = Value::Array(intermediates);
        }
        if waypoints.len() > 1 {
            payload["optimizeWaypointOrder"] = Value::Bool(true);
        }

        info!(origin, destination, waypoints = waypoints.len(), "Calculating route");
        let response = self
            .http
            .post(ROUTES_API_URL)
            .header("X-Goog-Api-Key", api_key)
            .header("X-Goog-FieldMask", ROUTES_FIELD_MASK)
            .timeout(self.routes_timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                error!(%err, "Routes API request failed");
                MapsError::route_failure()
            })?;

        let body: RoutesResponse = read_json(response, MapsError::route_failure).await?;
        let Some(route) = body.routes.into_iter().next() else {
            info!(origin, destination, "No route found");
            return Err(MapsError::not_found());
        };

        Ok(build_route(origin, destination, waypoints, route))
    }
}

/// Classify the HTTP outcome and deserialize on success. 429 is the only
/// status with its own taxonomy entry.
async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    failure: fn() -> MapsError,
) -> Result<T, MapsError> {
    match classify_status(response.status()) {
        StatusOutcome::Ok => response.json().await.map_err(|err| {
            error!(%err, "Maps API returned unparseable body");
            failure()
        }),
        StatusOutcome::RateLimited => {
            warn!("Maps API rate limit exceeded");
            Err(MapsError::rate_limit())
        }
        StatusOutcome::Failed => {
            error!(status = %response.status(), "Maps API returned error status");
            Err(failure())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusOutcome {
    Ok,
    RateLimited,
    Failed,
}

fn classify_status(status: StatusCode) -> StatusOutcome {
    if status.is_success() {
        StatusOutcome::Ok
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        StatusOutcome::RateLimited
    } else {
        StatusOutcome::Failed
    }
}

/// Normalize one provider route into a `Route` record, applying the
/// optimized waypoint permutation and aligning per-leg coordinates.
fn build_route(origin: &str, destination: &str, waypoints: &[String], raw: RawRoute) -> Route {
    let waypoints = reorder_waypoints(waypoints, raw.optimized_intermediate_waypoint_index);
    let waypoint_coords = leg_coordinates(&raw.legs, waypoints.len());

    let tolls = raw
        .travel_advisory
        .and_then(|advisory| advisory.toll_info)
        .map(|info| {
            info.estimated_price
                .into_iter()
                .map(|price| Toll {
                    currency_code: price.currency_code.unwrap_or_else(|| "JPY".into()),
                    units: price.units.unwrap_or_else(|| "0".into()),
                })
                .collect()
        })
        .unwrap_or_default();

    Route {
        origin: origin.to_string(),
        destination: destination.to_string(),
        waypoints,
        waypoint_coords,
        duration_seconds: raw.duration.unwrap_or_else(|| "0s".into()),
        distance_meters: raw.distance_meters.unwrap_or(0),
        encoded_polyline: raw
            .polyline
            .and_then(|polyline| polyline.encoded_polyline)
            .unwrap_or_default(),
        tolls,
        google_maps_url: None,
    }
}

/// Apply the provider's optimized visit order so callers see the order
/// actually driven. A malformed permutation keeps the requested order.
fn reorder_waypoints(requested: &[String], order: Option<Vec<usize>>) -> Vec<String> {
    let Some(order) = order else {
        return requested.to_vec();
    };
    let valid = order.len() == requested.len() && order.iter().all(|&idx| idx < requested.len());
    if !valid {
        warn!(?order, "Ignoring malformed waypoint optimization index");
        return requested.to_vec();
    }
    order.into_iter().map(|idx| requested[idx].clone()).collect()
}

/// Per-leg end locations, excluding the final leg (it ends at the
/// destination, not a waypoint). Empty unless legs align exactly.
fn leg_coordinates(legs: &[RawLeg], waypoint_count: usize) -> Vec<Coordinates> {
    if waypoint_count == 0 || legs.len() != waypoint_count + 1 {
        return Vec::new();
    }
    let coords: Vec<Coordinates> = legs[..waypoint_count]
        .iter()
        .filter_map(|leg| leg.end_location.as_ref().and_then(|loc| loc.lat_lng))
        .collect();
    if coords.len() == waypoint_count {
        coords
    } else {
        Vec::new()
    }
}

#[derive(Debug, Deserialize)]
struct PlacesResponse {
    #[serde(default)]
    places: Vec<RawPlace>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPlace {
    display_name: Option<RawDisplayName>,
    formatted_address: Option<String>,
    rating: Option<f64>,
    location: Option<Coordinates>,
    price_level: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDisplayName {
    text: Option<String>,
}

impl From<RawPlace> for Place {
    fn from(raw: RawPlace) -> Self {
        Self {
            name: raw
                .display_name
                .and_then(|name| name.text)
                .unwrap_or_else(|| "不明".into()),
            address: raw.formatted_address.unwrap_or_else(|| "不明".into()),
            rating: raw.rating.unwrap_or(0.0),
            coords: raw.location.unwrap_or(Coordinates {
                latitude: 0.0,
                longitude: 0.0,
            }),
            price_level: raw.price_level.unwrap_or_else(|| "UNKNOWN".into()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RoutesResponse {
    #[serde(default)]
    routes: Vec<RawRoute>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRoute {
    duration: Option<String>,
    distance_meters: Option<u64>,
    polyline: Option<RawPolyline>,
    travel_advisory: Option<RawTravelAdvisory>,
    optimized_intermediate_waypoint_index: Option<Vec<usize>>,
    #[serde(default)]
    legs: Vec<RawLeg>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPolyline {
    encoded_polyline: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTravelAdvisory {
    toll_info: Option<RawTollInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTollInfo {
    #[serde(default)]
    estimated_price: Vec<RawPrice>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPrice {
    currency_code: Option<String>,
    units: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLeg {
    end_location: Option<RawEndLocation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEndLocation {
    lat_lng: Option<Coordinates>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn waypoints(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn status_classification() {
        assert_eq!(classify_status(StatusCode::OK), StatusOutcome::Ok);
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            StatusOutcome::RateLimited
        );
        assert_eq!(classify_status(StatusCode::FORBIDDEN), StatusOutcome::Failed);
        assert_eq!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR),
            StatusOutcome::Failed
        );
    }

    #[test]
    fn empty_places_response_is_empty_list() {
        let body: PlacesResponse = serde_json::from_value(json!({ "places": [] })).expect("parse");
        let places: Vec<Place> = body.places.into_iter().map(Place::from).collect();
        assert!(places.is_empty());
    }

    #[test]
    fn place_fields_extracted() {
        let raw: RawPlace = serde_json::from_value(json!({
            "displayName": { "text": "テストレストラン" },
            "formattedAddress": "東京都千代田区丸の内1-1",
            "rating": 4.5,
            "location": { "latitude": 35.6812, "longitude": 139.7671 },
            "priceLevel": "PRICE_LEVEL_MODERATE"
        }))
        .expect("parse");
        let place = Place::from(raw);
        assert_eq!(place.name, "テストレストラン");
        assert_eq!(place.address, "東京都千代田区丸の内1-1");
        assert_eq!(place.rating, 4.5);
        assert_eq!(place.coords.latitude, 35.6812);
        assert_eq!(place.price_level, "PRICE_LEVEL_MODERATE");
    }

    #[test]
    fn missing_place_fields_use_defaults() {
        let place = Place::from(RawPlace::default());
        assert_eq!(place.name, "不明");
        assert_eq!(place.address, "不明");
        assert_eq!(place.rating, 0.0);
        assert_eq!(place.coords.latitude, 0.0);
        assert_eq!(place.price_level, "UNKNOWN");
    }

    #[test]
    fn route_extracts_duration_distance_polyline_and_tolls() {
        let raw: RawRoute = serde_json::from_value(json!({
            "duration": "3600s",
            "distanceMeters": 50000,
            "polyline": { "encodedPolyline": "abc123" },
            "travelAdvisory": { "tollInfo": { "estimatedPrice": [
                { "currencyCode": "JPY", "units": "1320" }
            ]}}
        }))
        .expect("parse");

        let route = build_route("東京駅", "横浜駅", &[], raw);
        assert_eq!(route.duration_seconds, "3600s");
        assert_eq!(route.distance_meters, 50000);
        assert_eq!(route.encoded_polyline, "abc123");
        assert_eq!(route.tolls.len(), 1);
        assert_eq!(route.tolls[0].currency_code, "JPY");
        assert_eq!(route.tolls[0].units, "1320");
        assert!(route.google_maps_url.is_none());
    }

    #[test]
    fn absent_toll_info_yields_empty_list() {
        let raw: RawRoute = serde_json::from_value(json!({
            "duration": "3600s",
            "distanceMeters": 50000,
            "polyline": { "encodedPolyline": "abc123" }
        }))
        .expect("parse");
        let route = build_route("東京駅", "横浜駅", &[], raw);
        assert!(route.tolls.is_empty());
    }

    #[test]
    fn missing_route_fields_use_defaults() {
        let route = build_route("A", "B", &[], RawRoute::default());
        assert_eq!(route.duration_seconds, "0s");
        assert_eq!(route.distance_meters, 0);
        assert_eq!(route.encoded_polyline, "");
    }

    #[test]
    fn optimized_index_reorders_waypoints_and_aligns_coords() {
        let raw: RawRoute = serde_json::from_value(json!({
            "duration": "7200s",
            "distanceMeters": 90000,
            "optimizedIntermediateWaypointIndex": [1, 0, 2],
            "legs": [
                { "endLocation": { "latLng": { "latitude": 35.1, "longitude": 139.1 } } },
                { "endLocation": { "latLng": { "latitude": 35.2, "longitude": 139.2 } } },
                { "endLocation": { "latLng": { "latitude": 35.3, "longitude": 139.3 } } },
                { "endLocation": { "latLng": { "latitude": 35.4, "longitude": 139.4 } } }
            ]
        }))
        .expect("parse");

        let route = build_route("出発", "到着", &waypoints(&["A", "B", "C"]), raw);
        assert_eq!(route.waypoints, waypoints(&["B", "A", "C"]));
        assert_eq!(route.waypoint_coords.len(), 3);
        assert_eq!(route.waypoint_coords[0].latitude, 35.1);
        assert_eq!(route.waypoint_coords[2].longitude, 139.3);
    }

    #[test]
    fn malformed_optimized_index_keeps_requested_order() {
        assert_eq!(
            reorder_waypoints(&waypoints(&["A", "B"]), Some(vec![0])),
            waypoints(&["A", "B"])
        );
        assert_eq!(
            reorder_waypoints(&waypoints(&["A", "B"]), Some(vec![0, 5])),
            waypoints(&["A", "B"])
        );
        assert_eq!(
            reorder_waypoints(&waypoints(&["A", "B"]), None),
            waypoints(&["A", "B"])
        );
    }

    #[test]
    fn misaligned_legs_leave_coords_empty() {
        let raw: RawRoute = serde_json::from_value(json!({
            "legs": [
                { "endLocation": { "latLng": { "latitude": 35.1, "longitude": 139.1 } } }
            ]
        }))
        .expect("parse");
        let route = build_route("A", "B", &waypoints(&["W1", "W2"]), raw);
        assert!(route.waypoint_coords.is_empty());
        assert_eq!(route.waypoints, waypoints(&["W1", "W2"]));
    }

    #[test]
    fn error_kinds_have_wire_tags() {
        assert_eq!(MapsError::not_found().kind.as_str(), "not_found");
        assert_eq!(MapsError::rate_limit().kind.as_str(), "rate_limit");
        assert_eq!(MapsError::config_missing().kind.as_str(), "config_missing");
        assert_eq!(MapsError::search_failure().kind.as_str(), "api_failure");

        let result = MapsError::not_found().to_tool_result();
        assert_eq!(result["error_type"], json!("not_found"));
        assert!(
            result["error"]
                .as_str()
                .expect("message")
                .contains("見つかりませんでした")
        );
    }
}
