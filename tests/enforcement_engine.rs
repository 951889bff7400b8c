//! Integration tests for the enforcement engine
//!
//! Drives full passes against the in-memory window system: rule placement,
//! grid allocation, exclusions, failure isolation and tracking lifecycle.

use std::sync::Arc;
use winplacer::{
    config::ConfigHandle,
    models::{AppConfig, AssignmentPolicy, Geometry, GridConfig, Point, ProcessRule, Size},
    platform::{InMemoryWindowSystem, WindowEntry, WindowHandle, WindowSystemError},
    services::EnforcementEngine,
};

fn placed_rule(name: &str, x: i32, y: i32, width: u32, height: u32) -> ProcessRule {
    ProcessRule::with_position(name, Size::new(width, height), Point::new(x, y)).unwrap()
}

fn sized_rule(name: &str, width: u32, height: u32) -> ProcessRule {
    ProcessRule::new(name, Size::new(width, height)).unwrap()
}

fn engine_with(
    windows: Vec<(WindowEntry, Geometry)>,
    config: AppConfig,
) -> (Arc<InMemoryWindowSystem>, ConfigHandle, EnforcementEngine) {
    let system = Arc::new(InMemoryWindowSystem::new_with(windows));
    let handle = ConfigHandle::new(config).unwrap();
    let engine = EnforcementEngine::new(system.clone(), handle.clone());
    (system, handle, engine)
}

fn grid(anchors: &[(i32, i32)], policy: AssignmentPolicy) -> GridConfig {
    let mut grid = GridConfig::new(true, anchors.iter().map(|&(x, y)| Point::new(x, y)));
    grid.assignment = policy;
    grid
}

#[tokio::test]
async fn places_window_at_rule_coordinates() {
    let config = AppConfig::new(
        vec![placed_rule("notepad.exe", 100, 100, 400, 300)],
        GridConfig::default(),
    )
    .unwrap();
    let (system, _, engine) = engine_with(
        vec![(
            WindowEntry::new(1, "notepad.exe", "Untitled"),
            Geometry::new(0, 0, 640, 480),
        )],
        config,
    );

    let report = engine.run_pass().await.unwrap();

    assert_eq!(report.enumerated, 1);
    assert_eq!(report.tracked, 1);
    assert_eq!(
        system.geometry(WindowHandle(1)),
        Some(Geometry::new(100, 100, 400, 300))
    );
}

#[tokio::test]
async fn second_pass_is_idempotent() {
    let config = AppConfig::new(
        vec![placed_rule("notepad.exe", 100, 100, 400, 300)],
        GridConfig::default(),
    )
    .unwrap();
    let (system, _, engine) = engine_with(
        vec![(
            WindowEntry::new(1, "notepad.exe", "Untitled"),
            Geometry::new(0, 0, 640, 480),
        )],
        config,
    );

    engine.run_pass().await.unwrap();
    system.clear_set_calls();

    let report = engine.run_pass().await.unwrap();
    assert!(report.applied.is_empty());
    assert_eq!(report.unchanged, 1);
    assert!(system.set_calls().is_empty());
}

#[tokio::test]
async fn process_names_match_case_insensitively() {
    let config = AppConfig::new(
        vec![placed_rule("Notepad.EXE", 10, 10, 400, 300)],
        GridConfig::default(),
    )
    .unwrap();
    let (system, _, engine) = engine_with(
        vec![(
            WindowEntry::new(1, "notepad.exe", "Untitled"),
            Geometry::new(0, 0, 640, 480),
        )],
        config,
    );

    engine.run_pass().await.unwrap();
    assert_eq!(
        system.geometry(WindowHandle(1)),
        Some(Geometry::new(10, 10, 400, 300))
    );
}

#[tokio::test]
async fn size_only_rule_keeps_user_position() {
    let config = AppConfig::new(vec![sized_rule("code.exe", 1200, 900)], GridConfig::default())
        .unwrap();
    let (system, _, engine) = engine_with(
        vec![(
            WindowEntry::new(1, "code.exe", "main.rs"),
            Geometry::new(-1800, 40, 800, 600),
        )],
        config,
    );

    engine.run_pass().await.unwrap();
    assert_eq!(
        system.geometry(WindowHandle(1)),
        Some(Geometry::new(-1800, 40, 1200, 900))
    );

    system.drag_window(WindowHandle(1), Point::new(300, 300));
    system.clear_set_calls();
    engine.run_pass().await.unwrap();
    assert!(system.set_calls().is_empty());
}

#[tokio::test]
async fn unmatched_windows_are_ignored() {
    let config = AppConfig::new(
        vec![placed_rule("notepad.exe", 100, 100, 400, 300)],
        GridConfig::default(),
    )
    .unwrap();
    let (system, _, engine) = engine_with(
        vec![(
            WindowEntry::new(1, "explorer.exe", "Downloads"),
            Geometry::new(0, 0, 640, 480),
        )],
        config,
    );

    let report = engine.run_pass().await.unwrap();
    assert_eq!(report.matched, 0);
    assert!(system.set_calls().is_empty());
    assert!(engine.tracked_windows().await.is_empty());
}

#[tokio::test]
async fn grid_reassigns_cells_when_first_window_closes() {
    let config = AppConfig::new(
        vec![sized_rule("code.exe", 800, 600)],
        grid(&[(0, 0), (500, 0)], AssignmentPolicy::Recompute),
    )
    .unwrap();
    let (system, _, engine) = engine_with(
        vec![
            (
                WindowEntry::new(1, "code.exe", "one"),
                Geometry::new(30, 30, 800, 600),
            ),
            (
                WindowEntry::new(2, "code.exe", "two"),
                Geometry::new(60, 60, 800, 600),
            ),
        ],
        config,
    );

    engine.run_pass().await.unwrap();
    assert_eq!(
        system.geometry(WindowHandle(1)),
        Some(Geometry::new(0, 0, 800, 600))
    );
    assert_eq!(
        system.geometry(WindowHandle(2)),
        Some(Geometry::new(500, 0, 800, 600))
    );

    system.close_window(WindowHandle(1));
    let report = engine.run_pass().await.unwrap();

    assert_eq!(report.released, 1);
    assert_eq!(
        system.geometry(WindowHandle(2)),
        Some(Geometry::new(0, 0, 800, 600))
    );
    let tracked = engine.tracked_windows().await;
    assert_eq!(tracked.len(), 1);
    assert_eq!(tracked[0].assigned_cell.map(|cell| cell.rank), Some(0));
}

#[tokio::test]
async fn sticky_policy_keeps_surviving_window_in_place() {
    let config = AppConfig::new(
        vec![sized_rule("code.exe", 800, 600)],
        grid(&[(0, 0), (500, 0)], AssignmentPolicy::Sticky),
    )
    .unwrap();
    let (system, _, engine) = engine_with(
        vec![
            (
                WindowEntry::new(1, "code.exe", "one"),
                Geometry::new(30, 30, 800, 600),
            ),
            (
                WindowEntry::new(2, "code.exe", "two"),
                Geometry::new(60, 60, 800, 600),
            ),
        ],
        config,
    );

    engine.run_pass().await.unwrap();
    system.close_window(WindowHandle(1));
    system.clear_set_calls();

    engine.run_pass().await.unwrap();
    assert!(system.set_calls().is_empty());
    assert_eq!(
        system.geometry(WindowHandle(2)),
        Some(Geometry::new(500, 0, 800, 600))
    );

    // A new window takes the freed highest-priority cell
    system.open_window(
        WindowEntry::new(3, "code.exe", "three"),
        Geometry::new(90, 90, 640, 480),
    );
    engine.run_pass().await.unwrap();
    assert_eq!(
        system.geometry(WindowHandle(3)),
        Some(Geometry::new(0, 0, 800, 600))
    );
}

#[tokio::test]
async fn sticky_policy_survives_removal_of_another_cell() {
    let config = AppConfig::new(
        vec![sized_rule("code.exe", 800, 600)],
        grid(&[(0, 0), (500, 0), (1000, 0)], AssignmentPolicy::Sticky),
    )
    .unwrap();
    let windows = (1..=3)
        .map(|i| {
            (
                WindowEntry::new(i, "code.exe", format!("window {}", i)),
                Geometry::new(40, 40, 640, 480),
            )
        })
        .collect();
    let (system, handle, engine) = engine_with(windows, config);

    engine.run_pass().await.unwrap();
    assert_eq!(
        system.geometry(WindowHandle(2)),
        Some(Geometry::new(500, 0, 800, 600))
    );

    handle.update(|config| config.remove_cell(1)).unwrap();
    system.clear_set_calls();
    let report = engine.run_pass().await.unwrap();

    // The window on the removed cell loses it; the others stay where they are
    assert!(system.set_calls().is_empty());
    assert_eq!(report.untouched, 1);
    assert_eq!(
        system.geometry(WindowHandle(1)),
        Some(Geometry::new(0, 0, 800, 600))
    );
    assert_eq!(
        system.geometry(WindowHandle(3)),
        Some(Geometry::new(1000, 0, 800, 600))
    );

    let cells: Vec<Option<Point>> = engine
        .tracked_windows()
        .await
        .iter()
        .map(|window| window.assigned_cell.map(|cell| cell.anchor()))
        .collect();
    assert_eq!(
        cells,
        vec![Some(Point::new(0, 0)), None, Some(Point::new(1000, 0))]
    );
}

#[tokio::test]
async fn surplus_windows_are_left_untouched() {
    let config = AppConfig::new(
        vec![placed_rule("code.exe", 10, 10, 800, 600)],
        grid(&[(0, 0), (500, 0)], AssignmentPolicy::Recompute),
    )
    .unwrap();
    let windows = (1..=4)
        .map(|i| {
            (
                WindowEntry::new(i, "code.exe", format!("window {}", i)),
                Geometry::new(i as i32 * 7, i as i32 * 7, 640, 480),
            )
        })
        .collect();
    let (system, _, engine) = engine_with(windows, config);

    let report = engine.run_pass().await.unwrap();

    assert_eq!(report.assigned, 2);
    assert_eq!(report.untouched, 2);
    assert_eq!(
        system.geometry(WindowHandle(3)),
        Some(Geometry::new(21, 21, 640, 480))
    );
    assert_eq!(
        system.geometry(WindowHandle(4)),
        Some(Geometry::new(28, 28, 640, 480))
    );
    let touched: Vec<WindowHandle> = system.set_calls().iter().map(|(h, _)| *h).collect();
    assert_eq!(touched, vec![WindowHandle(1), WindowHandle(2)]);
}

#[tokio::test]
async fn excluded_titles_are_never_moved() {
    let mut rule = placed_rule("notepad.exe", 100, 100, 400, 300);
    rule.exclude_title("Save As");
    let config = AppConfig::new(vec![rule], GridConfig::default()).unwrap();
    let (system, _, engine) = engine_with(
        vec![
            (
                WindowEntry::new(1, "notepad.exe", "Save As"),
                Geometry::new(0, 0, 500, 400),
            ),
            (
                WindowEntry::new(2, "notepad.exe", "Untitled"),
                Geometry::new(0, 0, 500, 400),
            ),
        ],
        config,
    );

    let report = engine.run_pass().await.unwrap();

    assert_eq!(report.matched, 2);
    assert_eq!(report.excluded, 1);
    assert_eq!(
        system.set_calls(),
        vec![(WindowHandle(2), Geometry::new(100, 100, 400, 300))]
    );
}

#[tokio::test]
async fn retitled_window_leaves_tracking_when_excluded() {
    let mut rule = placed_rule("notepad.exe", 100, 100, 400, 300);
    rule.exclude_title("Save As");
    let config = AppConfig::new(vec![rule], GridConfig::default()).unwrap();
    let (system, _, engine) = engine_with(
        vec![(
            WindowEntry::new(1, "notepad.exe", "Untitled"),
            Geometry::new(0, 0, 500, 400),
        )],
        config,
    );

    engine.run_pass().await.unwrap();
    system.rename_window(WindowHandle(1), "Save As");
    system.drag_window(WindowHandle(1), Point::new(700, 700));
    system.clear_set_calls();

    let report = engine.run_pass().await.unwrap();
    assert_eq!(report.released, 1);
    assert!(system.set_calls().is_empty());
}

#[tokio::test]
async fn permission_failure_does_not_stop_the_pass() {
    let config = AppConfig::new(
        vec![placed_rule("notepad.exe", 100, 100, 400, 300)],
        GridConfig::default(),
    )
    .unwrap();
    let (system, _, engine) = engine_with(
        vec![
            (
                WindowEntry::new(1, "notepad.exe", "admin"),
                Geometry::new(0, 0, 640, 480),
            ),
            (
                WindowEntry::new(2, "notepad.exe", "user"),
                Geometry::new(0, 0, 640, 480),
            ),
        ],
        config,
    );
    system.deny_changes(WindowHandle(1));

    let report = engine.run_pass().await.unwrap();

    assert_eq!(report.failures.len(), 1);
    assert!(matches!(
        report.failures[0].error,
        WindowSystemError::PermissionDenied { .. }
    ));
    assert_eq!(
        system.geometry(WindowHandle(2)),
        Some(Geometry::new(100, 100, 400, 300))
    );

    let tracked = engine.tracked_windows().await;
    assert_eq!(tracked[0].last_applied_geometry, None);
    assert_eq!(
        tracked[1].last_applied_geometry,
        Some(Geometry::new(100, 100, 400, 300))
    );
}

#[tokio::test]
async fn window_closing_mid_pass_is_recorded_and_released() {
    let config = AppConfig::new(
        vec![placed_rule("notepad.exe", 100, 100, 400, 300)],
        GridConfig::default(),
    )
    .unwrap();
    let (system, _, engine) = engine_with(
        vec![
            (
                WindowEntry::new(1, "notepad.exe", "closing"),
                Geometry::new(0, 0, 640, 480),
            ),
            (
                WindowEntry::new(2, "notepad.exe", "staying"),
                Geometry::new(0, 0, 640, 480),
            ),
        ],
        config,
    );
    system.close_after_enumeration(WindowHandle(1));

    let report = engine.run_pass().await.unwrap();
    assert_eq!(
        report.failures[0].error,
        WindowSystemError::WindowGone(WindowHandle(1))
    );
    assert_eq!(report.applied.len(), 1);

    let report = engine.run_pass().await.unwrap();
    assert_eq!(report.released, 1);
    assert_eq!(engine.tracked_windows().await.len(), 1);
}

#[tokio::test]
async fn removed_rule_releases_its_windows() {
    let config = AppConfig::new(
        vec![
            placed_rule("notepad.exe", 100, 100, 400, 300),
            sized_rule("code.exe", 800, 600),
        ],
        GridConfig::default(),
    )
    .unwrap();
    let (system, handle, engine) = engine_with(
        vec![
            (
                WindowEntry::new(1, "notepad.exe", "Untitled"),
                Geometry::new(0, 0, 640, 480),
            ),
            (
                WindowEntry::new(2, "code.exe", "main.rs"),
                Geometry::new(0, 0, 640, 480),
            ),
        ],
        config,
    );

    engine.run_pass().await.unwrap();
    handle
        .update(|config| config.remove_rule("notepad.exe").map(|_| ()))
        .unwrap();
    system.drag_window(WindowHandle(1), Point::new(900, 900));
    system.clear_set_calls();

    let report = engine.run_pass().await.unwrap();
    assert_eq!(report.released, 1);
    assert!(system.set_calls().is_empty());

    let tracked = engine.tracked_windows().await;
    assert_eq!(tracked.len(), 1);
    assert_eq!(tracked[0].handle, WindowHandle(2));
}

#[tokio::test]
async fn drifted_window_is_restored() {
    let config = AppConfig::new(
        vec![placed_rule("notepad.exe", 100, 100, 400, 300)],
        GridConfig::default(),
    )
    .unwrap();
    let (system, _, engine) = engine_with(
        vec![(
            WindowEntry::new(1, "notepad.exe", "Untitled"),
            Geometry::new(0, 0, 640, 480),
        )],
        config,
    );

    engine.run_pass().await.unwrap();
    system.resize_window(WindowHandle(1), Size::new(1024, 768));
    system.drag_window(WindowHandle(1), Point::new(5, 5));

    let report = engine.run_pass().await.unwrap();
    assert_eq!(report.applied.len(), 1);
    assert_eq!(
        system.geometry(WindowHandle(1)),
        Some(Geometry::new(100, 100, 400, 300))
    );
}

#[tokio::test]
async fn disabling_grid_returns_windows_to_rule_coordinates() {
    let config = AppConfig::new(
        vec![placed_rule("notepad.exe", 100, 100, 400, 300)],
        grid(&[(0, 0)], AssignmentPolicy::Recompute),
    )
    .unwrap();
    let (system, handle, engine) = engine_with(
        vec![(
            WindowEntry::new(1, "notepad.exe", "Untitled"),
            Geometry::new(50, 50, 640, 480),
        )],
        config,
    );

    engine.run_pass().await.unwrap();
    assert_eq!(
        system.geometry(WindowHandle(1)),
        Some(Geometry::new(0, 0, 400, 300))
    );

    handle
        .update(|config| {
            config.set_grid_enabled(false);
            Ok(())
        })
        .unwrap();
    engine.run_pass().await.unwrap();

    assert_eq!(
        system.geometry(WindowHandle(1)),
        Some(Geometry::new(100, 100, 400, 300))
    );
    assert_eq!(engine.tracked_windows().await[0].assigned_cell, None);
}

#[tokio::test]
async fn metrics_accumulate_across_passes() {
    let config = AppConfig::new(
        vec![placed_rule("notepad.exe", 100, 100, 400, 300)],
        GridConfig::default(),
    )
    .unwrap();
    let (system, _, engine) = engine_with(
        vec![(
            WindowEntry::new(1, "notepad.exe", "Untitled"),
            Geometry::new(0, 0, 640, 480),
        )],
        config,
    );

    engine.run_pass().await.unwrap();
    system.drag_window(WindowHandle(1), Point::new(0, 0));
    engine.run_pass().await.unwrap();
    engine.run_pass().await.unwrap();

    let metrics = engine.metrics().await;
    assert_eq!(metrics.passes, 3);
    assert_eq!(metrics.geometry_applied, 2);
    assert_eq!(metrics.failed_passes, 0);
}
