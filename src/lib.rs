//! # Vector Surfer
//!
//! Vector-space analytics for instrumented function executions.
//!
//! Each recorded execution carries an embedding of its input plus scalar
//! metadata (status, duration, identifiers). Vector Surfer stores these in
//! SQLite and runs the analyses from [`vector_surfer_core`] over them:
//! 2D scatter projections, latency and error clustering, reference
//! coverage, outlier ("hallucination") detection, diversity-aware test
//! recommendation, and drift detection.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────────────┐
//! │ JSONL ingest│──▶│    SQLite    │──▶│ vector-surfer-core │
//! │   (vsurf)   │   │ executions + │   │ projection, k-means│
//! └─────────────┘   │    golden    │   │ k-NN, analyses     │
//!                   └──────────────┘   └─────────┬─────────┘
//!                                    ┌───────────┤
//!                                    ▼           ▼
//!                               ┌────────┐  ┌────────┐
//!                               │  CLI   │  │  HTTP  │
//!                               └────────┘  └────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! vsurf init
//! vsurf ingest executions.jsonl
//! vsurf scatter --function checkout
//! vsurf drift summary
//! vsurf serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | SQLite connection pool |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite implementation of the vector store |
//! | [`client_cache`] | TTL cache of store handles |
//! | [`embedding`] | OpenAI / Ollama / disabled embedding providers |
//! | [`ingest`] | JSONL loading |
//! | [`analyze`] | CLI runners for each analysis |
//! | [`server`] | Axum HTTP server |

pub mod analyze;
pub mod client_cache;
pub mod config;
pub mod db;
pub mod embedding;
pub mod ingest;
pub mod migrate;
pub mod server;
pub mod sqlite_store;
