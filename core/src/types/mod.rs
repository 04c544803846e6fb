//! Data types module - map data structures shared between the protocol and the map buffer

mod map;

// Re-export all types
pub use map::{CellLayer, MapCell, clamp_face_size};
