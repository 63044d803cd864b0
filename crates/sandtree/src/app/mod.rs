//! Application layer orchestrating the tree store, derived state and the sandbox.

pub mod bootstrap;
pub mod explorer;
pub mod store;
pub mod sync;
pub mod tabs;
pub mod workspace;
