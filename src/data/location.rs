//! Static catalog of known dashboard locations
//!
//! Location ids are the numeric strings the dashboard uses for selection and
//! as cache identifiers. Unknown ids are still valid; they simply carry no
//! display name.

use super::Location;

/// Static array of the locations offered by the location selector
pub static LOCATIONS: [Location; 8] = [
    Location {
        id: "1",
        name: "San Francisco",
        region: "California",
        country: "United States",
        latitude: 37.7749,
        longitude: -122.4194,
    },
    Location {
        id: "2",
        name: "New York",
        region: "New York",
        country: "United States",
        latitude: 40.7128,
        longitude: -74.0060,
    },
    Location {
        id: "3",
        name: "London",
        region: "England",
        country: "United Kingdom",
        latitude: 51.5074,
        longitude: -0.1278,
    },
    Location {
        id: "4",
        name: "Tokyo",
        region: "Kanto",
        country: "Japan",
        latitude: 35.6762,
        longitude: 139.6503,
    },
    Location {
        id: "5",
        name: "Sydney",
        region: "New South Wales",
        country: "Australia",
        latitude: -33.8688,
        longitude: 151.2093,
    },
    Location {
        id: "6",
        name: "Seattle",
        region: "Washington",
        country: "United States",
        latitude: 47.6062,
        longitude: -122.3321,
    },
    Location {
        id: "7",
        name: "Paris",
        region: "Ile-de-France",
        country: "France",
        latitude: 48.8566,
        longitude: 2.3522,
    },
    Location {
        id: "8",
        name: "Vancouver",
        region: "British Columbia",
        country: "Canada",
        latitude: 49.2827,
        longitude: -123.1207,
    },
];

/// Get a location by its id
///
/// Returns `Some(&Location)` if found, `None` otherwise
pub fn get_location_by_id(id: &str) -> Option<&'static Location> {
    LOCATIONS.iter().find(|location| location.id == id)
}

/// Case-insensitive search over name, region and country, capped at 10 results
pub fn search_locations(query: &str) -> Vec<&'static Location> {
    let term = query.trim().to_lowercase();
    LOCATIONS
        .iter()
        .filter(|location| {
            location.name.to_lowercase().contains(&term)
                || location.region.to_lowercase().contains(&term)
                || location.country.to_lowercase().contains(&term)
        })
        .take(10)
        .collect()
}
