use std::sync::Arc;

use dist_matrix::{Grid, ThreadComm};
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

/// Thread-local subscriber for integration tests, honoring `RUST_LOG`.
pub fn init_test_subscriber() -> tracing::subscriber::DefaultGuard {
    let fmt_layer = fmt::layer().with_target(true).with_test_writer();

    let filter_layer = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .set_default()
}

/// Run `f` on every process of a `procs`-process grid and collect the
/// results in rank order.
#[allow(dead_code)]
pub fn on_grid<R, F>(procs: usize, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(Arc<Grid>) -> R + Sync,
{
    ThreadComm::run(procs, |comm| f(Grid::new(Arc::new(comm)).unwrap()))
}
