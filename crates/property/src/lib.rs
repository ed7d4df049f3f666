pub mod client;

pub use client::{DroneImagePatch, PropertyClient, PropertyError};
