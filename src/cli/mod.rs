//! Command-line interface for WinPlacer
//!
//! Runs the daemon or a single pass and edits the settings file. Every edit
//! goes through the configuration model, so invalid settings are rejected
//! before anything is written.

use crate::{
    config::{ConfigHandle, ConfigStore, FileConfigStore, PersistenceConfig, StoreError},
    lifecycle::Daemon,
    models::{AppConfig, AssignmentPolicy, ConfigError, Point, ProcessRule, Size},
    platform::{SystemWindowSystem, WindowSystem},
    services::{EnforcementEngine, PassReport},
    Result, WinPlacerError,
};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// WinPlacer command-line interface
#[derive(Parser)]
#[command(name = "winplacer")]
#[command(about = "Keeps application windows at configured sizes, positions and grid slots")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct WinPlacerCli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Settings file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable JSON output for machine-readable results
    #[arg(long, global = true)]
    pub json: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the placement daemon until interrupted
    Run {
        /// Fixed pass interval, overriding engine.poll_interval_ms
        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// Run a single enforcement pass and print what changed
    Once,

    /// Load and validate the settings file
    Check,

    /// Write the default settings template
    Init {
        /// Overwrite an existing settings file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the current settings
    Show,

    /// Process rule management commands
    Rule(RuleCommands),

    /// Grid cell management commands
    Cell(CellCommands),

    /// Grid mode commands
    Grid(GridCommands),
}

/// Process rule subcommands
#[derive(Args)]
pub struct RuleCommands {
    #[command(subcommand)]
    pub action: RuleActions,
}

#[derive(Subcommand)]
pub enum RuleActions {
    /// List all rules
    List,

    /// Add a rule for a process
    Add {
        /// Executable name, e.g. "notepad.exe"
        process_name: String,

        #[arg(long)]
        width: u32,

        #[arg(long)]
        height: u32,

        #[arg(long, allow_negative_numbers = true)]
        x: Option<i32>,

        #[arg(long, allow_negative_numbers = true)]
        y: Option<i32>,

        /// Enforce the x/y position as well as the size
        #[arg(long)]
        use_coordinates: bool,
    },

    /// Change an existing rule; omitted values are kept
    Update {
        process_name: String,

        /// Rename the rule
        #[arg(long)]
        rename: Option<String>,

        #[arg(long)]
        width: Option<u32>,

        #[arg(long)]
        height: Option<u32>,

        #[arg(long, allow_negative_numbers = true)]
        x: Option<i32>,

        #[arg(long, allow_negative_numbers = true)]
        y: Option<i32>,

        #[arg(long)]
        use_coordinates: Option<bool>,
    },

    /// Remove a rule
    Remove { process_name: String },

    /// Never touch windows of this process with the given title
    Exclude { process_name: String, title: String },

    /// Remove a title exclusion
    Include { process_name: String, title: String },
}

/// Grid cell subcommands
#[derive(Args)]
pub struct CellCommands {
    #[command(subcommand)]
    pub action: CellActions,
}

#[derive(Subcommand)]
pub enum CellActions {
    /// List cells by rank
    List,

    /// Append a cell with the lowest priority
    Add {
        #[arg(allow_negative_numbers = true)]
        x: i32,
        #[arg(allow_negative_numbers = true)]
        y: i32,
    },

    /// Move a cell's anchor
    Set {
        rank: usize,
        #[arg(allow_negative_numbers = true)]
        x: i32,
        #[arg(allow_negative_numbers = true)]
        y: i32,
    },

    /// Remove a cell; later cells move up one rank
    Remove { rank: usize },

    /// Raise a cell's priority by one
    Up { rank: usize },

    /// Lower a cell's priority by one
    Down { rank: usize },
}

/// Grid mode subcommands
#[derive(Args)]
pub struct GridCommands {
    #[command(subcommand)]
    pub action: GridActions,
}

#[derive(Subcommand)]
pub enum GridActions {
    /// Place matched windows on grid cells
    Enable,

    /// Place matched windows by their rule coordinates
    Disable,

    /// Choose how cells are reassigned between passes
    Policy {
        /// recompute or sticky
        policy: AssignmentPolicy,
    },
}

#[derive(Serialize)]
struct CheckOutput<'a> {
    path: String,
    valid: bool,
    rules: usize,
    cells: usize,
    grid_enabled: bool,
    assignment: &'a AssignmentPolicy,
}

/// CLI command executor
pub struct CliExecutor {
    store: Arc<FileConfigStore>,
    json_output: bool,
}

impl CliExecutor {
    /// Create a new CLI executor
    pub fn new(store: Arc<FileConfigStore>, json_output: bool) -> Self {
        Self { store, json_output }
    }

    /// Execute a CLI command
    pub async fn execute(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Run { interval_ms } => self.run_daemon(interval_ms).await,
            Commands::Once => self
                .run_once(Arc::new(SystemWindowSystem::new()))
                .await
                .map(|_| ()),
            Commands::Check => self.check(),
            Commands::Init { force } => self.init(force),
            Commands::Show => self.show(),
            Commands::Rule(cmd) => self.execute_rule_command(cmd),
            Commands::Cell(cmd) => self.execute_cell_command(cmd),
            Commands::Grid(cmd) => self.execute_grid_command(cmd),
        }
    }

    async fn run_daemon(&self, interval_ms: Option<u64>) -> Result<()> {
        if interval_ms == Some(0) {
            return Err(
                WinPlacerError::ValidationError("--interval-ms must be positive".into()).into(),
            );
        }

        Daemon::new(self.store.clone(), Arc::new(SystemWindowSystem::new()))
            .with_interval(interval_ms.map(Duration::from_millis))
            .run()
            .await
    }

    /// Run a single pass against `window_system` and print the report
    pub async fn run_once(&self, window_system: Arc<dyn WindowSystem>) -> Result<PassReport> {
        let config = ConfigHandle::new(self.load()?)?;
        let engine = EnforcementEngine::new(window_system, config);
        let report = engine.run_pass().await?;

        if self.json_output {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report);
        }
        Ok(report)
    }

    fn check(&self) -> Result<()> {
        let config = self.load()?;

        if self.json_output {
            let output = CheckOutput {
                path: self.store.path().display().to_string(),
                valid: true,
                rules: config.rules().len(),
                cells: config.grid.len(),
                grid_enabled: config.grid.enabled,
                assignment: &config.grid.assignment,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!("Settings OK: {}", self.store.path().display());
            println!(
                "  {} rule(s), {} cell(s), grid {}",
                config.rules().len(),
                config.grid.len(),
                if config.grid.enabled { "enabled" } else { "disabled" }
            );
        }
        Ok(())
    }

    fn init(&self, force: bool) -> Result<()> {
        let written = self.store.initialize(force)?;
        if written {
            println!("Wrote default settings to {}", self.store.path().display());
        } else {
            println!(
                "Settings already exist at {} (use --force to overwrite)",
                self.store.path().display()
            );
        }
        Ok(())
    }

    fn show(&self) -> Result<()> {
        let config = self.load()?;

        if self.json_output {
            println!("{}", serde_json::to_string_pretty(&config)?);
        } else {
            println!("Settings: {}", self.store.path().display());
            println!(
                "Engine: poll every {}ms, reload every {}ms",
                config.engine.poll_interval_ms, config.engine.reload_interval_ms
            );
            print_grid(&config);
            print_rules(&config);
        }
        Ok(())
    }

    fn execute_rule_command(&self, cmd: RuleCommands) -> Result<()> {
        match cmd.action {
            RuleActions::List => {
                let config = self.load()?;
                if self.json_output {
                    println!("{}", serde_json::to_string_pretty(config.rules())?);
                } else {
                    print_rules(&config);
                }
            }
            RuleActions::Add {
                process_name,
                width,
                height,
                x,
                y,
                use_coordinates,
            } => {
                let position = Point::new(x.unwrap_or(0), y.unwrap_or(0));
                let mut rule =
                    ProcessRule::with_position(process_name, Size::new(width, height), position)?;
                rule.use_coordinates = use_coordinates;
                let name = rule.process_name.clone();

                self.edit(|config| config.add_rule(rule))?;
                println!("Added rule for {}", name);
            }
            RuleActions::Update {
                process_name,
                rename,
                width,
                height,
                x,
                y,
                use_coordinates,
            } => {
                self.edit(|config| {
                    let mut rule = config
                        .rule(&process_name)
                        .cloned()
                        .ok_or_else(|| ConfigError::UnknownRule(process_name.clone()))?;

                    if let Some(name) = rename {
                        rule.process_name = name;
                    }
                    rule.width = width.unwrap_or(rule.width);
                    rule.height = height.unwrap_or(rule.height);
                    rule.x = x.unwrap_or(rule.x);
                    rule.y = y.unwrap_or(rule.y);
                    rule.use_coordinates = use_coordinates.unwrap_or(rule.use_coordinates);

                    config.update_rule(&process_name, rule)
                })?;
                println!("Updated rule for {}", process_name);
            }
            RuleActions::Remove { process_name } => {
                self.edit(|config| config.remove_rule(&process_name).map(|_| ()))?;
                println!("Removed rule for {}", process_name);
            }
            RuleActions::Exclude {
                process_name,
                title,
            } => {
                let mut added = false;
                self.edit(|config| {
                    added = config.add_excluded_title(&process_name, title.clone())?;
                    Ok(())
                })?;
                if added {
                    println!("{} windows titled \"{}\" will be ignored", process_name, title);
                } else {
                    println!("\"{}\" was already excluded for {}", title, process_name);
                }
            }
            RuleActions::Include {
                process_name,
                title,
            } => {
                let mut removed = false;
                self.edit(|config| {
                    removed = config.remove_excluded_title(&process_name, &title)?;
                    Ok(())
                })?;
                if removed {
                    println!("{} windows titled \"{}\" are managed again", process_name, title);
                } else {
                    println!("\"{}\" was not excluded for {}", title, process_name);
                }
            }
        }

        Ok(())
    }

    fn execute_cell_command(&self, cmd: CellCommands) -> Result<()> {
        match cmd.action {
            CellActions::List => {
                let config = self.load()?;
                if self.json_output {
                    println!("{}", serde_json::to_string_pretty(config.grid.cells())?);
                } else {
                    print_grid(&config);
                }
            }
            CellActions::Add { x, y } => {
                let mut rank = 0;
                self.edit(|config| {
                    rank = config.add_cell(Point::new(x, y));
                    Ok(())
                })?;
                println!("Added cell {} at ({}, {})", rank, x, y);
            }
            CellActions::Set { rank, x, y } => {
                self.edit(|config| config.update_cell(rank, Point::new(x, y)))?;
                println!("Moved cell {} to ({}, {})", rank, x, y);
            }
            CellActions::Remove { rank } => {
                self.edit(|config| config.remove_cell(rank))?;
                println!("Removed cell {}", rank);
            }
            CellActions::Up { rank } => {
                let mut moved = false;
                self.edit(|config| {
                    moved = config.move_cell_up(rank)?;
                    Ok(())
                })?;
                if moved {
                    println!("Cell {} is now rank {}", rank, rank - 1);
                } else {
                    println!("Cell {} already has the highest priority", rank);
                }
            }
            CellActions::Down { rank } => {
                let mut moved = false;
                self.edit(|config| {
                    moved = config.move_cell_down(rank)?;
                    Ok(())
                })?;
                if moved {
                    println!("Cell {} is now rank {}", rank, rank + 1);
                } else {
                    println!("Cell {} already has the lowest priority", rank);
                }
            }
        }

        Ok(())
    }

    fn execute_grid_command(&self, cmd: GridCommands) -> Result<()> {
        match cmd.action {
            GridActions::Enable => {
                self.edit(|config| {
                    config.set_grid_enabled(true);
                    Ok(())
                })?;
                println!("Grid enabled");
            }
            GridActions::Disable => {
                self.edit(|config| {
                    config.set_grid_enabled(false);
                    Ok(())
                })?;
                println!("Grid disabled");
            }
            GridActions::Policy { policy } => {
                self.edit(|config| {
                    config.set_assignment_policy(policy);
                    Ok(())
                })?;
                println!("Grid assignment policy set to {:?}", policy);
            }
        }

        Ok(())
    }

    /// Load for reading; a missing file is an error, never created here
    fn load(&self) -> Result<AppConfig> {
        self.store.load().map_err(|e| {
            let hint = match &e {
                StoreError::NotFound(_) => " (run `winplacer init` to create it)",
                _ => "",
            };
            WinPlacerError::ConfigurationError(format!("Failed to load settings: {}{}", e, hint))
                .into()
        })
    }

    /// Load, apply `f` to a copy, then save the result.
    ///
    /// Edits start from the default template when no file exists yet.
    fn edit<F>(&self, f: F) -> Result<AppConfig>
    where
        F: FnOnce(&mut AppConfig) -> std::result::Result<(), ConfigError>,
    {
        let mut config = self.store.load_or_init().map_err(|e| {
            WinPlacerError::ConfigurationError(format!("Failed to load settings: {}", e))
        })?;
        f(&mut config)?;
        self.store.save(&config)?;
        debug!(path = %self.store.path().display(), "Settings updated");
        Ok(config)
    }
}

fn print_report(report: &PassReport) {
    println!(
        "Pass finished in {}ms: {} window(s) enumerated, {} matched, {} tracked",
        report.duration.as_millis(),
        report.enumerated,
        report.matched,
        report.tracked
    );
    for (handle, geometry) in &report.applied {
        println!("  moved {} to {}", handle, geometry);
    }
    if report.unchanged > 0 {
        println!("  {} already in place", report.unchanged);
    }
    if report.untouched > 0 {
        println!("  {} without a free grid cell", report.untouched);
    }
    for failure in &report.failures {
        println!(
            "  failed {} ({}): {}",
            failure.handle, failure.process_name, failure.error
        );
    }
}

fn print_rules(config: &AppConfig) {
    if config.rules().is_empty() {
        println!("No rules configured.");
        return;
    }

    println!("Rules:");
    for rule in config.rules() {
        let placement = if rule.use_coordinates {
            format!("at {}", rule.position())
        } else {
            "keeps position".to_string()
        };
        println!("  {} - {} {}", rule.process_name, rule.size(), placement);
        if !rule.excluded_titles.is_empty() {
            let titles: Vec<&str> = rule.excluded_titles.iter().map(String::as_str).collect();
            println!("    excluded: {}", titles.join(", "));
        }
    }
}

fn print_grid(config: &AppConfig) {
    println!(
        "Grid: {} ({:?} assignment)",
        if config.grid.enabled { "enabled" } else { "disabled" },
        config.grid.assignment
    );
    if config.grid.is_empty() {
        println!("  No cells configured.");
    }
    for cell in config.grid.cells() {
        println!("  {} - {}", cell.rank, cell.anchor());
    }
}

/// Parse arguments and execute the requested command
pub async fn run_cli(cli: WinPlacerCli) -> Result<()> {
    let store = match cli.config {
        Some(path) => FileConfigStore::new(PersistenceConfig::at(path)),
        None => FileConfigStore::default(),
    };
    info!(settings = %store.path().display(), "Using settings file");

    CliExecutor::new(Arc::new(store), cli.json)
        .execute(cli.command)
        .await
}
