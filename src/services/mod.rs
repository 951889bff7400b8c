//! Core services for WinPlacer: grid allocation, enforcement passes and the
//! loop that schedules them

pub mod enforcement_engine;
pub mod grid_allocator;
pub mod scheduler;

pub use enforcement_engine::*;
pub use grid_allocator::*;
pub use scheduler::*;
