//! Reconciles the configured placement rules against the live desktop.
//!
//! One call to [`EnforcementEngine::run_pass`] enumerates windows, matches
//! them to rules, refreshes the tracked set, assigns grid cells, computes
//! target geometries and moves every window whose observed geometry differs
//! from its target. Passes are serialized by an internal lock.
//!
//! Window system calls may block on the host, so each one runs on tokio's
//! blocking pool rather than on the worker driving the pass.

use crate::config::ConfigHandle;
use crate::models::process_rule::normalize_process_name;
use crate::models::{AppConfig, Geometry, GridCell, Point, ProcessRule, Size};
use crate::platform::{WindowEntry, WindowHandle, WindowSystem, WindowSystemError};
use crate::services::grid_allocator::{AllocationCandidate, GridAllocator};
use crate::{Result, WinPlacerError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

/// A live window that matched a rule, owned by the engine between passes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagedWindow {
    pub handle: WindowHandle,
    pub process_name: String,
    pub title: String,
    /// Key of the matched rule; resolved against the current snapshot every pass
    rule_key: String,
    /// Grid cell held while the grid is enabled
    pub assigned_cell: Option<GridCell>,
    /// Geometry most recently set by the engine
    pub last_applied_geometry: Option<Geometry>,
}

impl ManagedWindow {
    fn new(entry: WindowEntry, rule_key: String) -> Self {
        Self {
            handle: entry.handle,
            process_name: entry.process_name,
            title: entry.title,
            rule_key,
            assigned_cell: None,
            last_applied_geometry: None,
        }
    }

    pub fn rule_key(&self) -> &str {
        &self.rule_key
    }
}

/// Per-window failure recorded during a pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowFailure {
    pub handle: WindowHandle,
    pub process_name: String,
    pub error: WindowSystemError,
}

/// Outcome of a single enforcement pass
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    /// Windows returned by enumeration
    pub enumerated: usize,
    /// Windows whose process matched a rule, excluded titles included
    pub matched: usize,
    /// Matching windows skipped because of an excluded title
    pub excluded: usize,
    /// Windows tracked at the end of the pass
    pub tracked: usize,
    pub newly_tracked: usize,
    /// Windows dropped from tracking because they vanished or stopped matching
    pub released: usize,
    /// Windows holding a grid cell
    pub assigned: usize,
    /// Geometry changes successfully applied
    pub applied: Vec<(WindowHandle, Geometry)>,
    /// Windows already at their target
    pub unchanged: usize,
    /// Grid-mode windows without a cell, left as they are
    pub untouched: usize,
    pub failures: Vec<WindowFailure>,
}

impl PassReport {
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            duration: Duration::ZERO,
            enumerated: 0,
            matched: 0,
            excluded: 0,
            tracked: 0,
            newly_tracked: 0,
            released: 0,
            assigned: 0,
            applied: Vec::new(),
            unchanged: 0,
            untouched: 0,
            failures: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Telemetry for enforcement passes
#[derive(Debug, Default, Clone, Serialize)]
pub struct EngineMetrics {
    pub passes: u64,
    pub failed_passes: u64,
    pub geometry_applied: u64,
    pub window_failures: u64,
}

/// Where a window should end up this pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    /// Move to an anchor (grid cell or rule coordinates) and resize
    At(Point),
    /// Resize only, keep the observed position
    KeepPosition,
    /// Grid is on but no cell is free: leave the window alone
    Untouched,
}

impl Placement {
    fn resolve(config: &AppConfig, rule: &ProcessRule, window: &ManagedWindow) -> Self {
        if config.grid.enabled {
            return match window.assigned_cell {
                Some(cell) => Placement::At(cell.anchor()),
                None => Placement::Untouched,
            };
        }

        if rule.use_coordinates {
            Placement::At(rule.position())
        } else {
            Placement::KeepPosition
        }
    }

    fn target(self, size: Size, current: Geometry) -> Option<Geometry> {
        match self {
            Placement::At(origin) => Some(Geometry::from_parts(origin, size)),
            Placement::KeepPosition => Some(Geometry::from_parts(current.origin(), size)),
            Placement::Untouched => None,
        }
    }
}

#[derive(Debug, Default)]
struct EngineState {
    /// Tracked windows in the most recent enumeration order
    tracked: Vec<ManagedWindow>,
}

/// Drives windows towards the geometry their rules ask for
pub struct EnforcementEngine {
    window_system: Arc<dyn WindowSystem>,
    config: ConfigHandle,
    state: Mutex<EngineState>,
    metrics: Arc<RwLock<EngineMetrics>>,
}

impl EnforcementEngine {
    pub fn new(window_system: Arc<dyn WindowSystem>, config: ConfigHandle) -> Self {
        Self {
            window_system,
            config,
            state: Mutex::new(EngineState::default()),
            metrics: Arc::new(RwLock::new(EngineMetrics::default())),
        }
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    /// Run one enumerate, match, allocate, apply cycle.
    ///
    /// Fails only when the window list cannot be read; per-window failures
    /// are collected in the report and never stop the pass.
    #[instrument(skip(self), level = "debug")]
    pub async fn run_pass(&self) -> Result<PassReport> {
        let mut state = self.state.lock().await;
        let started = Instant::now();
        let config = self.config.snapshot();
        let mut report = PassReport::new();

        let entries = match self.call(|system| system.enumerate_windows()).await {
            Ok(entries) => entries,
            Err(err) => {
                self.metrics.write().await.failed_passes += 1;
                warn!(error = %err, "Window enumeration failed, skipping pass");
                return Err(WinPlacerError::PlatformError(err.to_string()).into());
            }
        };
        report.enumerated = entries.len();

        let rules: HashMap<String, &ProcessRule> = config
            .rules()
            .iter()
            .map(|rule| (rule.key(), rule))
            .collect();

        let previous = std::mem::take(&mut state.tracked);
        let mut tracked = reconcile(&rules, entries, previous, &mut report);

        assign_cells(&config, &mut tracked);
        report.assigned = tracked
            .iter()
            .filter(|window| window.assigned_cell.is_some())
            .count();

        for window in tracked.iter_mut() {
            let Some(rule) = rules.get(window.rule_key()).copied() else {
                continue;
            };
            self.enforce(&config, rule, window, &mut report).await;
        }

        report.tracked = tracked.len();
        state.tracked = tracked;
        drop(state);

        report.duration = started.elapsed();
        {
            let mut metrics = self.metrics.write().await;
            metrics.passes += 1;
            metrics.geometry_applied += report.applied.len() as u64;
            metrics.window_failures += report.failures.len() as u64;
        }

        debug!(
            enumerated = report.enumerated,
            tracked = report.tracked,
            assigned = report.assigned,
            applied = report.applied.len(),
            unchanged = report.unchanged,
            failures = report.failures.len(),
            duration_ms = report.duration.as_millis() as u64,
            "Enforcement pass complete"
        );

        Ok(report)
    }

    /// Windows tracked after the most recent pass, in enumeration order
    pub async fn tracked_windows(&self) -> Vec<ManagedWindow> {
        self.state.lock().await.tracked.clone()
    }

    pub async fn metrics(&self) -> EngineMetrics {
        self.metrics.read().await.clone()
    }

    /// Run a window system call on the blocking pool
    async fn call<T, F>(&self, op: F) -> std::result::Result<T, WindowSystemError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn WindowSystem) -> std::result::Result<T, WindowSystemError> + Send + 'static,
    {
        let system = Arc::clone(&self.window_system);
        tokio::task::spawn_blocking(move || op(system.as_ref()))
            .await
            .unwrap_or_else(|e| {
                Err(WindowSystemError::Unavailable(format!(
                    "window system call did not complete: {}",
                    e
                )))
            })
    }

    async fn enforce(
        &self,
        config: &AppConfig,
        rule: &ProcessRule,
        window: &mut ManagedWindow,
        report: &mut PassReport,
    ) {
        let placement = Placement::resolve(config, rule, window);
        if placement == Placement::Untouched {
            report.untouched += 1;
            return;
        }

        let handle = window.handle;
        let current = match self.call(move |system| system.get_geometry(handle)).await {
            Ok(geometry) => geometry,
            Err(err) => {
                record_failure(window, err, report);
                return;
            }
        };

        let Some(target) = placement.target(rule.size(), current) else {
            return;
        };

        if current == target {
            report.unchanged += 1;
            return;
        }

        if window
            .last_applied_geometry
            .is_some_and(|last| last == target && last != current)
        {
            debug!(
                handle = %window.handle,
                process = %window.process_name,
                observed = %current,
                "Window drifted from enforced geometry"
            );
        }

        match self
            .call(move |system| system.set_geometry(handle, target))
            .await
        {
            Ok(()) => {
                debug!(
                    handle = %window.handle,
                    process = %window.process_name,
                    from = %current,
                    to = %target,
                    "Applied window geometry"
                );
                window.last_applied_geometry = Some(target);
                report.applied.push((window.handle, target));
            }
            Err(err) => record_failure(window, err, report),
        }
    }
}

/// Rebuild the tracked set from this pass's enumeration, carrying over state
/// for windows that were already tracked under the same rule.
fn reconcile(
    rules: &HashMap<String, &ProcessRule>,
    entries: Vec<WindowEntry>,
    previous: Vec<ManagedWindow>,
    report: &mut PassReport,
) -> Vec<ManagedWindow> {
    let mut previous: HashMap<WindowHandle, ManagedWindow> = previous
        .into_iter()
        .map(|window| (window.handle, window))
        .collect();
    let mut seen = HashSet::new();
    let mut tracked = Vec::new();

    for entry in entries {
        if !seen.insert(entry.handle) {
            continue;
        }

        let key = normalize_process_name(&entry.process_name);
        let Some(rule) = rules.get(&key) else {
            continue;
        };
        report.matched += 1;

        if rule.is_excluded(&entry.title) {
            report.excluded += 1;
            continue;
        }

        let window = match previous.remove(&entry.handle) {
            Some(mut existing) if existing.rule_key == key => {
                existing.title = entry.title;
                existing
            }
            _ => {
                debug!(
                    handle = %entry.handle,
                    process = %entry.process_name,
                    title = %entry.title,
                    "Tracking window"
                );
                report.newly_tracked += 1;
                ManagedWindow::new(entry, key)
            }
        };
        tracked.push(window);
    }

    for window in previous.into_values() {
        debug!(
            handle = %window.handle,
            process = %window.process_name,
            cell = ?window.assigned_cell.map(|cell| cell.rank),
            "Released window"
        );
        report.released += 1;
    }

    tracked
}

fn assign_cells(config: &AppConfig, tracked: &mut [ManagedWindow]) {
    if !config.grid.enabled {
        for window in tracked.iter_mut() {
            window.assigned_cell = None;
        }
        return;
    }

    let candidates: Vec<AllocationCandidate> = tracked
        .iter()
        .map(|window| AllocationCandidate::new(window.handle, window.assigned_cell))
        .collect();
    let assignments =
        GridAllocator::new(config.grid.assignment).allocate(&candidates, config.grid.cells());

    for (window, assignment) in tracked.iter_mut().zip(assignments) {
        if window.assigned_cell != assignment.cell {
            info!(
                handle = %window.handle,
                process = %window.process_name,
                from = ?window.assigned_cell.map(|cell| cell.rank),
                to = ?assignment.cell.map(|cell| cell.rank),
                "Grid cell assignment changed"
            );
        }
        window.assigned_cell = assignment.cell;
    }
}

fn record_failure(window: &ManagedWindow, error: WindowSystemError, report: &mut PassReport) {
    match &error {
        WindowSystemError::WindowGone(_) => debug!(
            handle = %window.handle,
            process = %window.process_name,
            "Window closed before it could be placed"
        ),
        WindowSystemError::PermissionDenied { .. } | WindowSystemError::Unavailable(_) => warn!(
            handle = %window.handle,
            process = %window.process_name,
            error = %error,
            "Failed to place window"
        ),
    }

    report.failures.push(WindowFailure {
        handle: window.handle,
        process_name: window.process_name.clone(),
        error,
    });
}
