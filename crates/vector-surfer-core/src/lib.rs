//! # Vector Surfer Core
//!
//! Shared logic for Vector Surfer: execution models, the vector store
//! abstraction, the embedding provider trait, and the vector-space
//! analytics engine (projection, clustering, nearest-neighbor distances,
//! drift detection).
//!
//! This crate contains no tokio, sqlx, HTTP clients, or filesystem I/O.
//! Every analysis takes its store (and, for drift simulation, its
//! embedding provider) as an explicit argument, fetches its working set
//! once, and runs the numeric routines in-process.

pub mod analysis;
pub mod clustering;
pub mod embedding;
pub mod error;
pub mod golden;
pub mod models;
pub mod neighbors;
pub mod projection;
pub mod store;

pub use error::AnalysisError;
