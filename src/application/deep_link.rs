use urlencoding::encode;

const BASE_URL: &str = "https://www.google.com/maps/dir/";

/// Build a Google Maps navigation deep link. Opening it on a phone starts
/// turn-by-turn driving navigation for the given route.
///
/// Every component is percent-encoded. Waypoints are joined with an encoded
/// pipe (`%7C`); literal pipes inside a place name are stripped first so
/// they cannot be mistaken for the separator.
pub fn generate_google_maps_url(origin: &str, destination: &str, waypoints: &[String]) -> String {
    let mut url = format!(
        "{BASE_URL}?api=1&origin={}&destination={}",
        encode(origin),
        encode(destination)
    );

    if !waypoints.is_empty() {
        let joined = waypoints
            .iter()
            .map(|waypoint| encode(&waypoint.replace('|', "")).into_owned())
            .collect::<Vec<_>>()
            .join("%7C");
        url.push_str("&waypoints=");
        url.push_str(&joined);
    }

    url.push_str("&travelmode=driving");
    url
}
