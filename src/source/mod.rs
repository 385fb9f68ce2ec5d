//! Data sources shipped with the crate.

pub mod synthetic;
