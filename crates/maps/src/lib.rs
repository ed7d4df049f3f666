pub mod client;
pub mod tile;

pub use client::{MapsError, StaticMapClient};
pub use tile::{Coordinates, DEFAULT_BASE_URL, TILE_SIZE, ZOOM};
