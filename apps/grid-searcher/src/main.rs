//! Grid Searcher Binary
//!
//! Runs the reference model over every combination in a sweep file.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin grid-searcher -- sweep.yaml
//! ```
//!
//! # Environment Variables
//!
//! - `GRID_SEARCH_CONFIG`: Sweep file path when none is given (default: sweep.yaml)
//! - `RUST_LOG`: Log level, overrides `logging.level`

use anyhow::Context;
use grid_searcher::{GridSearcher, ParameterSum, load_sweep, telemetry};

/// Default sweep file path.
const DEFAULT_SWEEP_PATH: &str = "sweep.yaml";

fn main() -> anyhow::Result<()> {
    load_dotenv();

    let path = sweep_path();
    let sweep = load_sweep(Some(&path)).with_context(|| format!("loading sweep '{path}'"))?;
    telemetry::init_tracing(&sweep.logging)?;

    tracing::info!(
        path = %path,
        parameters = sweep.parameters.len(),
        "Loaded sweep"
    );

    let searcher = GridSearcher::<ParameterSum>::new(sweep.parameters.clone(), sweep.search_config())?;
    let store = match &sweep.output.path {
        Some(output) => searcher.search_and_persist(output)?,
        None => searcher.search()?,
    };

    let failures = store.failures();
    if !failures.is_empty() {
        tracing::warn!(
            failed = failures.len(),
            success_rate = store.success_rate(),
            "Some combinations failed"
        );
    }

    if let Some((index, best)) = store.best_by(|record| Some(record.result)) {
        tracing::info!(
            index,
            result = best.result,
            parameters = %best.parameters,
            "Best combination"
        );
    }

    Ok(())
}

/// Sweep path from the first argument, then `GRID_SEARCH_CONFIG`.
fn sweep_path() -> String {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("GRID_SEARCH_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_SWEEP_PATH.to_string())
}

/// Load `.env` from the working directory or its nearest ancestor.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}
