use reqwest::Url;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com/maps/api/staticmap";
pub const ZOOM: u8 = 17;
pub const TILE_SIZE: &str = "1024x1024";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Build the satellite tile URL for a property center
pub fn build_tile_url(
    base_url: &str,
    center: Coordinates,
    api_key: &str,
) -> Result<Url, String> {
    let zoom = ZOOM.to_string();
    let center = format!("{},{}", center.lat, center.lng);

    Url::parse_with_params(
        base_url,
        &[
            ("center", center.as_str()),
            ("zoom", zoom.as_str()),
            ("size", TILE_SIZE),
            ("maptype", "satellite"),
            ("format", "jpg"),
            ("key", api_key),
        ],
    )
    .map_err(|e| e.to_string())
}
