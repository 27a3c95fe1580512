//! Domain models for privlink.
//!
//! This crate contains pure data structures representing the core
//! concepts in our application. Models have no business logic - they're
//! just data that can be passed between layers.
//!
//! ## Architecture
//!
//! - **models** (this crate): Pure data structures and wire frames
//! - **service-core**: Business logic operating on models
//! - **privlinkd**: The worker daemon wiring everything together
//!
//! This layered architecture keeps concerns separated and makes testing easier.

pub mod error;
pub mod snapshot;
pub mod wire;
pub mod worker_info;

pub use error::error_location::ErrorLocation;
pub use error::model_error::ModelError;
pub use snapshot::ProcessSnapshot;
pub use wire::ProcessInfo;
pub use worker_info::{WorkerInfo, WorkerInfoBuilder};

#[cfg(test)]
mod tests;
