//! Library crate for portwait-rs exposing reusable modules.
pub mod config;
pub mod fallback;
pub mod pipeline;
pub mod poller;
pub mod probe;
pub mod target;
pub mod types;
