pub mod animations;
pub mod decoder;
pub mod error;
pub mod face_cache;
pub mod face_index;
pub mod filepaths;
pub mod image_store;
pub mod map;
pub mod network;
pub mod session;
pub mod settings;
