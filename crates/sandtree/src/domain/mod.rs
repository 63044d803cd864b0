//! Core domain types: the tree model, logical paths and error taxonomy.

pub mod errors;
pub mod model;
pub mod path;
