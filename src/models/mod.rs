//! Configuration model for WinPlacer: process rules, grid layout and the
//! aggregate settings document

pub mod app_config;
pub mod geometry;
pub mod grid;
pub mod process_rule;

pub use app_config::*;
pub use geometry::*;
pub use grid::*;
pub use process_rule::*;
