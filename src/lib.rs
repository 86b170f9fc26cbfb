//! claimlens: loss-ratio analytics over a historical auto-insurance portfolio.
//!
//! The pipeline is load → derive → test: [`loader`] parses the pipe-delimited
//! policy file into immutable [`record::PolicyRecord`]s, [`aggregate`] groups
//! them by categorical dimensions and computes the loss-ratio KPIs,
//! [`hypothesis`] runs the statistical battery over the grouped data, and
//! [`model`] fits the baseline predictive models. Everything downstream of the
//! loader is derived and recomputed per analysis run; nothing is persisted as
//! a source of truth.

pub mod aggregate;
pub mod error;
pub mod hypothesis;
pub mod loader;
pub mod model;
pub mod quality;
pub mod record;
pub mod schema;

pub use error::{DataError, ModelError, StatError};
