//! Window system integration layer for WinPlacer
//!
//! The enforcement engine talks to the desktop only through the
//! [`WindowSystem`] trait. Concrete backends enumerate and move real windows
//! while tests rely on the in-memory implementation or mocks.

pub mod window_system;

pub use window_system::*;
