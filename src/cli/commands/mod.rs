//! CLI command implementations.

pub mod controller;
pub mod crd;
pub mod scan;
pub mod status;
pub mod tenant;
