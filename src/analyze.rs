//! CLI runners for the analyses and reference curation.
//!
//! Each runner opens the selected store, runs one core analysis, and prints
//! the [`Report`] envelope as pretty JSON on stdout. Analysis failures are
//! part of the envelope, not process errors; only plumbing failures (config,
//! database connect) bubble up as `anyhow` errors.
//!
//! Request bounds are applied by [`limits`], shared with the HTTP server.

use anyhow::Result;
use serde::Serialize;

use vector_surfer_core::analysis::bottleneck::{self, BottleneckRequest};
use vector_surfer_core::analysis::coverage::{self, CoverageRequest};
use vector_surfer_core::analysis::drift::{self, DriftSummaryRequest, SimulateRequest};
use vector_surfer_core::analysis::errors::{self, ErrorClusterRequest};
use vector_surfer_core::analysis::hallucination::{self, HallucinationRequest};
use vector_surfer_core::analysis::recommend::{self, RecommendRequest};
use vector_surfer_core::analysis::scatter::{self, ScatterRequest};
use vector_surfer_core::analysis::Report;
use vector_surfer_core::golden::{self, RegisterRequest};

use crate::config::Config;
use crate::embedding::create_provider;
use crate::sqlite_store::SqliteStore;

/// Bounds applied to caller-supplied request parameters.
pub mod limits {
    pub const SCATTER_MAX: usize = 1000;
    pub const BOTTLENECK_MAX: usize = 1000;
    pub const COVERAGE_MAX: usize = 2000;
    pub const HALLUCINATIONS_MAX: usize = 100;
    pub const RECOMMEND_MAX: usize = 50;
    pub const ERROR_CLUSTERS_MAX: usize = 1000;
    pub const GOLDEN_LIST_MAX: usize = 1000;
    pub const CLUSTERS_MIN: usize = 2;
    pub const CLUSTERS_MAX: usize = 20;

    /// Clamp a limit into `1..=max`.
    pub fn limit(value: usize, max: usize) -> usize {
        value.clamp(1, max)
    }

    pub fn clusters(value: usize) -> usize {
        value.clamp(CLUSTERS_MIN, CLUSTERS_MAX)
    }

    /// Clamp a distance threshold into `[0, 1]`; NaN falls back to `default`.
    pub fn threshold(value: f64, default: f64) -> f64 {
        if value.is_nan() {
            default
        } else {
            value.clamp(0.0, 1.0)
        }
    }
}

fn print_report<T: Serialize>(report: &Report<T>) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

async fn open_store(config: &Config, store: Option<&str>) -> Result<SqliteStore> {
    SqliteStore::open_initialized(config.store_path(store)?).await
}

pub async fn run_scatter(
    config: &Config,
    store: Option<&str>,
    function_name: Option<String>,
    limit: usize,
) -> Result<()> {
    let db = open_store(config, store).await?;
    let req = ScatterRequest {
        function_name,
        limit: limits::limit(limit, limits::SCATTER_MAX),
    };
    let result = scatter::input_scatter(&db, &req).await;
    print_report(&Report::from_result("scatter", result))
}

pub async fn run_bottleneck(
    config: &Config,
    store: Option<&str>,
    function_name: Option<String>,
    n_clusters: usize,
    limit: usize,
) -> Result<()> {
    let db = open_store(config, store).await?;
    let req = BottleneckRequest {
        function_name,
        n_clusters: limits::clusters(n_clusters),
        limit: limits::limit(limit, limits::BOTTLENECK_MAX),
    };
    let result = bottleneck::bottleneck_clusters(&db, &req, &config.analysis).await;
    print_report(&Report::from_result("bottleneck", result))
}

pub async fn run_coverage(
    config: &Config,
    store: Option<&str>,
    function_name: Option<String>,
    limit: usize,
) -> Result<()> {
    let db = open_store(config, store).await?;
    let req = CoverageRequest {
        function_name,
        limit: limits::limit(limit, limits::COVERAGE_MAX),
    };
    let result = coverage::golden_coverage(&db, &req, &config.analysis).await;
    print_report(&Report::from_result("coverage", result))
}

pub async fn run_hallucinations(
    config: &Config,
    store: Option<&str>,
    function_name: Option<String>,
    threshold: f64,
    limit: usize,
) -> Result<()> {
    let db = open_store(config, store).await?;
    let req = HallucinationRequest {
        function_name,
        threshold: limits::threshold(threshold, HallucinationRequest::default().threshold),
        limit: limits::limit(limit, limits::HALLUCINATIONS_MAX),
    };
    let result = hallucination::hallucination_candidates(&db, &req, &config.analysis).await;
    print_report(&Report::from_result("hallucinations", result))
}

pub async fn run_error_clusters(
    config: &Config,
    store: Option<&str>,
    n_clusters: usize,
    limit: usize,
) -> Result<()> {
    let db = open_store(config, store).await?;
    let req = ErrorClusterRequest {
        n_clusters: limits::clusters(n_clusters),
        limit: limits::limit(limit, limits::ERROR_CLUSTERS_MAX),
    };
    let result = errors::error_clusters(&db, &req).await;
    print_report(&Report::from_result("error_clusters", result))
}

pub async fn run_recommend(
    config: &Config,
    store: Option<&str>,
    function_name: String,
    limit: usize,
) -> Result<()> {
    let db = open_store(config, store).await?;
    let req = RecommendRequest {
        function_name,
        limit: limits::limit(limit, limits::RECOMMEND_MAX),
    };
    let result = recommend::recommend_with_diversity(&db, &req, &config.analysis).await;
    print_report(&Report::from_result("recommend", result))
}

pub async fn run_drift_summary(
    config: &Config,
    store: Option<&str>,
    functions: Vec<String>,
) -> Result<()> {
    let db = open_store(config, store).await?;
    let req = DriftSummaryRequest {
        functions: if functions.is_empty() {
            None
        } else {
            Some(functions)
        },
    };
    let result = drift::drift_summary(&db, &req, &config.analysis).await;
    print_report(&Report::from_result("drift_summary", result))
}

pub async fn run_drift_simulate(
    config: &Config,
    store: Option<&str>,
    req: SimulateRequest,
) -> Result<()> {
    let db = open_store(config, store).await?;
    let provider = create_provider(&config.embedding)?;
    let req = SimulateRequest {
        threshold: req
            .threshold
            .map(|t| limits::threshold(t, config.analysis.drift_threshold)),
        k: req.k.map(|k| k.max(1)),
        ..req
    };
    let result = drift::simulate_drift(&db, Some(&*provider), &req, &config.analysis).await;
    print_report(&Report::from_result("drift_simulate", result))
}

pub async fn run_golden_register(
    config: &Config,
    store: Option<&str>,
    req: RegisterRequest,
) -> Result<()> {
    let db = open_store(config, store).await?;
    let result = golden::register(&db, &req).await.map(|mut record| {
        record.vector = None;
        Some(record)
    });
    print_report(&Report::from_result("golden_register", result))
}

pub async fn run_golden_list(
    config: &Config,
    store: Option<&str>,
    function_name: Option<&str>,
    limit: usize,
) -> Result<()> {
    let db = open_store(config, store).await?;
    let limit = limits::limit(limit, limits::GOLDEN_LIST_MAX);
    let result = golden::list(&db, function_name, limit).await;
    print_report(&Report::from_result("golden_list", result))
}

pub async fn run_golden_delete(config: &Config, store: Option<&str>, id: &str) -> Result<()> {
    let db = open_store(config, store).await?;
    let result = golden::delete(&db, id).await;
    print_report(&Report::from_result("golden_delete", result))
}

pub async fn run_golden_stats(config: &Config, store: Option<&str>) -> Result<()> {
    let db = open_store(config, store).await?;
    let result = golden::stats(&db).await;
    print_report(&Report::from_result("golden_stats", result))
}
