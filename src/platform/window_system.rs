use crate::models::{Geometry, Point, Size};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Opaque window identifier, stable for the lifetime of the window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowHandle(pub u64);

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Top-level window as reported by enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowEntry {
    pub handle: WindowHandle,
    /// Executable name of the owning process
    pub process_name: String,
    pub title: String,
}

impl WindowEntry {
    pub fn new(handle: u64, process_name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            handle: WindowHandle(handle),
            process_name: process_name.into(),
            title: title.into(),
        }
    }
}

/// Failures reported by the window system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum WindowSystemError {
    /// The handle went stale, usually because the window closed
    #[error("Window {0} no longer exists")]
    WindowGone(WindowHandle),

    #[error("Permission denied for window {handle}: {reason}")]
    PermissionDenied { handle: WindowHandle, reason: String },

    #[error("Window system unavailable: {0}")]
    Unavailable(String),
}

/// Primitives the host platform provides for reading and moving windows.
///
/// Enumeration order must be deterministic from one call to the next; grid
/// assignment follows it.
#[cfg_attr(test, mockall::automock)]
pub trait WindowSystem: Send + Sync {
    /// Snapshot every top-level window with its owning process and title
    fn enumerate_windows(&self) -> Result<Vec<WindowEntry>, WindowSystemError>;

    /// Read the live geometry of a window
    fn get_geometry(&self, handle: WindowHandle) -> Result<Geometry, WindowSystemError>;

    /// Move and resize a window
    fn set_geometry(&self, handle: WindowHandle, geometry: Geometry)
        -> Result<(), WindowSystemError>;
}

/// Default system-backed window system placeholder
#[derive(Debug, Default)]
pub struct SystemWindowSystem;

impl SystemWindowSystem {
    pub fn new() -> Self {
        Self
    }

    fn unavailable() -> WindowSystemError {
        WindowSystemError::Unavailable(format!(
            "no window system backend is available for {}",
            std::env::consts::OS
        ))
    }
}

impl WindowSystem for SystemWindowSystem {
    fn enumerate_windows(&self) -> Result<Vec<WindowEntry>, WindowSystemError> {
        Err(Self::unavailable())
    }

    fn get_geometry(&self, _handle: WindowHandle) -> Result<Geometry, WindowSystemError> {
        Err(Self::unavailable())
    }

    fn set_geometry(
        &self,
        _handle: WindowHandle,
        _geometry: Geometry,
    ) -> Result<(), WindowSystemError> {
        Err(Self::unavailable())
    }
}

#[derive(Debug, Clone)]
struct SimulatedWindow {
    entry: WindowEntry,
    geometry: Geometry,
    deny_changes: bool,
    close_after_enumeration: bool,
}

#[derive(Debug, Default)]
struct SimulatedDesktop {
    windows: Vec<SimulatedWindow>,
    set_calls: Vec<(WindowHandle, Geometry)>,
}

/// Simple in-memory window system used for testing the enforcement engine
/// and for running the daemon without a platform backend.
///
/// Windows are enumerated in the order they were opened.
#[derive(Debug, Default)]
pub struct InMemoryWindowSystem {
    desktop: Mutex<SimulatedDesktop>,
}

impl InMemoryWindowSystem {
    pub fn new_with(windows: Vec<(WindowEntry, Geometry)>) -> Self {
        let provider = Self::default();
        for (entry, geometry) in windows {
            provider.open_window(entry, geometry);
        }
        provider
    }

    fn desktop(&self) -> MutexGuard<'_, SimulatedDesktop> {
        self.desktop.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn open_window(&self, entry: WindowEntry, geometry: Geometry) {
        self.desktop().windows.push(SimulatedWindow {
            entry,
            geometry,
            deny_changes: false,
            close_after_enumeration: false,
        });
    }

    pub fn close_window(&self, handle: WindowHandle) -> bool {
        let mut desktop = self.desktop();
        let before = desktop.windows.len();
        desktop.windows.retain(|window| window.entry.handle != handle);
        desktop.windows.len() != before
    }

    /// Simulate the user dragging a window somewhere else
    pub fn drag_window(&self, handle: WindowHandle, to: Point) -> bool {
        self.with_window(handle, |window| {
            window.geometry.x = to.x;
            window.geometry.y = to.y;
        })
    }

    /// Simulate the user resizing a window
    pub fn resize_window(&self, handle: WindowHandle, size: Size) -> bool {
        self.with_window(handle, |window| {
            window.geometry.width = size.width;
            window.geometry.height = size.height;
        })
    }

    pub fn rename_window(&self, handle: WindowHandle, title: impl Into<String>) -> bool {
        let title = title.into();
        self.with_window(handle, |window| window.entry.title = title)
    }

    /// Make every later `set_geometry` on this window fail with a permission error
    pub fn deny_changes(&self, handle: WindowHandle) -> bool {
        self.with_window(handle, |window| window.deny_changes = true)
    }

    /// The window is still reported by the next enumeration but is gone by
    /// the time the engine tries to read or move it.
    pub fn close_after_enumeration(&self, handle: WindowHandle) -> bool {
        self.with_window(handle, |window| window.close_after_enumeration = true)
    }

    pub fn geometry(&self, handle: WindowHandle) -> Option<Geometry> {
        self.desktop()
            .windows
            .iter()
            .find(|window| window.entry.handle == handle)
            .map(|window| window.geometry)
    }

    /// Every `set_geometry` call received so far, successful or not
    pub fn set_calls(&self) -> Vec<(WindowHandle, Geometry)> {
        self.desktop().set_calls.clone()
    }

    pub fn clear_set_calls(&self) {
        self.desktop().set_calls.clear();
    }

    fn with_window(&self, handle: WindowHandle, f: impl FnOnce(&mut SimulatedWindow)) -> bool {
        let mut desktop = self.desktop();
        match desktop
            .windows
            .iter_mut()
            .find(|window| window.entry.handle == handle)
        {
            Some(window) => {
                f(window);
                true
            }
            None => false,
        }
    }
}

impl WindowSystem for InMemoryWindowSystem {
    fn enumerate_windows(&self) -> Result<Vec<WindowEntry>, WindowSystemError> {
        let mut desktop = self.desktop();
        let entries = desktop
            .windows
            .iter()
            .map(|window| window.entry.clone())
            .collect();
        desktop
            .windows
            .retain(|window| !window.close_after_enumeration);
        Ok(entries)
    }

    fn get_geometry(&self, handle: WindowHandle) -> Result<Geometry, WindowSystemError> {
        self.geometry(handle)
            .ok_or(WindowSystemError::WindowGone(handle))
    }

    fn set_geometry(
        &self,
        handle: WindowHandle,
        geometry: Geometry,
    ) -> Result<(), WindowSystemError> {
        let mut desktop = self.desktop();
        desktop.set_calls.push((handle, geometry));

        let window = desktop
            .windows
            .iter_mut()
            .find(|window| window.entry.handle == handle)
            .ok_or(WindowSystemError::WindowGone(handle))?;

        if window.deny_changes {
            return Err(WindowSystemError::PermissionDenied {
                handle,
                reason: "target process is elevated".to_string(),
            });
        }

        window.geometry = geometry;
        Ok(())
    }
}
