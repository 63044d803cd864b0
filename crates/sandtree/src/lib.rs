pub mod app;
pub mod domain;
pub mod infra;
pub mod ui;

/// Install the stderr tracing subscriber filtered by `SANDTREE_LOG`.
pub fn init() {
    infra::logging::init();
}
