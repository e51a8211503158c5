pub mod alerts;
pub mod annunciation;
pub mod audio;
pub mod classifier;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod model;
pub mod polling;
pub mod provider;
pub mod scheduler;
