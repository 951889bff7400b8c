use super::geometry::Point;
use super::grid::{AssignmentPolicy, GridConfig, GridError};
use super::process_rule::{normalize_process_name, ProcessRule, RuleError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Scheduling knobs for the enforcement loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Delay between enforcement passes
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How often the daemon checks the settings file for edits
    #[serde(default = "default_reload_interval_ms")]
    pub reload_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_reload_interval_ms() -> u64 {
    2000
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            reload_interval_ms: default_reload_interval_ms(),
        }
    }
}

impl EngineSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn reload_interval(&self) -> Duration {
        Duration::from_millis(self.reload_interval_ms)
    }
}

/// Aggregate root persisted by the configuration store
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    rules: Vec<ProcessRule>,
}

impl AppConfig {
    /// Build a configuration, rejecting invalid or duplicate rules
    pub fn new(rules: Vec<ProcessRule>, grid: GridConfig) -> Result<Self, ConfigError> {
        let config = Self {
            engine: EngineSettings::default(),
            grid,
            rules,
        };
        config.validate()?;
        Ok(config)
    }

    /// Rules in their configured order
    pub fn rules(&self) -> &[ProcessRule] {
        &self.rules
    }

    pub fn rule(&self, process_name: &str) -> Option<&ProcessRule> {
        self.rules
            .iter()
            .find(|rule| rule.matches_process(process_name))
    }

    pub fn add_rule(&mut self, rule: ProcessRule) -> Result<(), ConfigError> {
        rule.validate().map_err(|source| ConfigError::InvalidRule {
            process_name: rule.process_name.clone(),
            source,
        })?;

        if self.rule(&rule.process_name).is_some() {
            return Err(ConfigError::DuplicateRule(rule.process_name));
        }

        self.rules.push(rule);
        Ok(())
    }

    /// Replace the rule currently registered under `process_name`, keeping its position
    pub fn update_rule(&mut self, process_name: &str, rule: ProcessRule) -> Result<(), ConfigError> {
        rule.validate().map_err(|source| ConfigError::InvalidRule {
            process_name: rule.process_name.clone(),
            source,
        })?;

        let index = self.rule_index(process_name)?;
        let renamed_onto_other = self
            .rules
            .iter()
            .enumerate()
            .any(|(other, existing)| other != index && existing.key() == rule.key());
        if renamed_onto_other {
            return Err(ConfigError::DuplicateRule(rule.process_name));
        }

        self.rules[index] = rule;
        Ok(())
    }

    pub fn remove_rule(&mut self, process_name: &str) -> Result<ProcessRule, ConfigError> {
        let index = self.rule_index(process_name)?;
        Ok(self.rules.remove(index))
    }

    pub fn add_excluded_title(
        &mut self,
        process_name: &str,
        title: impl Into<String>,
    ) -> Result<bool, ConfigError> {
        let index = self.rule_index(process_name)?;
        Ok(self.rules[index].exclude_title(title))
    }

    pub fn remove_excluded_title(
        &mut self,
        process_name: &str,
        title: &str,
    ) -> Result<bool, ConfigError> {
        let index = self.rule_index(process_name)?;
        Ok(self.rules[index].include_title(title))
    }

    pub fn set_grid_enabled(&mut self, enabled: bool) {
        self.grid.set_enabled(enabled);
    }

    pub fn set_assignment_policy(&mut self, policy: AssignmentPolicy) {
        self.grid.assignment = policy;
    }

    pub fn add_cell(&mut self, anchor: Point) -> usize {
        self.grid.add_cell(anchor)
    }

    pub fn update_cell(&mut self, rank: usize, anchor: Point) -> Result<(), ConfigError> {
        Ok(self.grid.update_cell(rank, anchor)?)
    }

    pub fn remove_cell(&mut self, rank: usize) -> Result<(), ConfigError> {
        self.grid.remove_cell(rank)?;
        Ok(())
    }

    pub fn move_cell_up(&mut self, rank: usize) -> Result<bool, ConfigError> {
        Ok(self.grid.move_cell_up(rank)?)
    }

    pub fn move_cell_down(&mut self, rank: usize) -> Result<bool, ConfigError> {
        Ok(self.grid.move_cell_down(rank)?)
    }

    /// Repair ordering data coming from an external document
    pub fn normalize(&mut self) {
        self.grid.normalize();
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for rule in &self.rules {
            rule.validate().map_err(|source| ConfigError::InvalidRule {
                process_name: rule.process_name.clone(),
                source,
            })?;

            if !seen.insert(rule.key()) {
                return Err(ConfigError::DuplicateRule(rule.process_name.clone()));
            }
        }

        self.grid.validate()?;

        if self.engine.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidEngineSettings(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.engine.reload_interval_ms == 0 {
            return Err(ConfigError::InvalidEngineSettings(
                "reload_interval_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    fn rule_index(&self, process_name: &str) -> Result<usize, ConfigError> {
        let key = normalize_process_name(process_name);
        self.rules
            .iter()
            .position(|rule| rule.key() == key)
            .ok_or_else(|| ConfigError::UnknownRule(process_name.to_string()))
    }
}

/// Errors raised while editing or validating the configuration model
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid rule '{process_name}': {source}")]
    InvalidRule {
        process_name: String,
        #[source]
        source: RuleError,
    },

    #[error("A rule for process '{0}' already exists")]
    DuplicateRule(String),

    #[error("No rule for process '{0}'")]
    UnknownRule(String),

    #[error("Invalid grid: {0}")]
    Grid(#[from] GridError),

    #[error("Invalid engine settings: {0}")]
    InvalidEngineSettings(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::geometry::Size;

    fn rule(name: &str) -> ProcessRule {
        ProcessRule::new(name, Size::new(400, 300)).unwrap()
    }

    #[test]
    fn add_rule_rejects_duplicates_case_insensitively() {
        let mut config = AppConfig::default();
        config.add_rule(rule("notepad.exe")).unwrap();

        let result = config.add_rule(rule("NOTEPAD.EXE"));
        assert_eq!(
            result,
            Err(ConfigError::DuplicateRule("NOTEPAD.EXE".to_string()))
        );
        assert_eq!(config.rules().len(), 1);
    }

    #[test]
    fn add_rule_rejects_invalid_rule() {
        let mut config = AppConfig::default();
        let mut invalid = rule("notepad.exe");
        invalid.height = 0;

        let result = config.add_rule(invalid);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidRule {
                source: RuleError::InvalidSize { .. },
                ..
            })
        ));
    }

    #[test]
    fn new_rejects_duplicate_rules() {
        let result = AppConfig::new(
            vec![rule("code.exe"), rule("Code.exe")],
            GridConfig::default(),
        );
        assert!(matches!(result, Err(ConfigError::DuplicateRule(_))));
    }

    #[test]
    fn update_rule_keeps_position_and_rejects_collisions() {
        let mut config =
            AppConfig::new(vec![rule("a.exe"), rule("b.exe")], GridConfig::default()).unwrap();

        let mut replacement = rule("c.exe");
        replacement.width = 1024;
        config.update_rule("A.EXE", replacement).unwrap();
        assert_eq!(config.rules()[0].process_name, "c.exe");
        assert_eq!(config.rules()[0].width, 1024);

        let result = config.update_rule("c.exe", rule("b.exe"));
        assert!(matches!(result, Err(ConfigError::DuplicateRule(_))));

        // Renaming a rule onto itself with different casing is allowed
        config.update_rule("c.exe", rule("C.exe")).unwrap();
    }

    #[test]
    fn remove_unknown_rule_fails() {
        let mut config = AppConfig::default();
        assert_eq!(
            config.remove_rule("ghost.exe"),
            Err(ConfigError::UnknownRule("ghost.exe".to_string()))
        );
    }

    #[test]
    fn excluded_titles_are_edited_through_the_rule() {
        let mut config = AppConfig::new(vec![rule("notepad.exe")], GridConfig::default()).unwrap();
        assert!(config.add_excluded_title("notepad.exe", "Save As").unwrap());
        assert!(config.rule("notepad.exe").unwrap().is_excluded("Save As"));
        assert!(config
            .remove_excluded_title("notepad.exe", "Save As")
            .unwrap());
        assert!(!config.rule("notepad.exe").unwrap().is_excluded("Save As"));
    }

    #[test]
    fn validate_rejects_zero_poll_interval() {
        let mut config = AppConfig::default();
        config.engine.poll_interval_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidEngineSettings(_))
        ));
    }

    #[test]
    fn cell_edits_delegate_to_grid() {
        let mut config = AppConfig::default();
        config.add_cell(Point::new(0, 0));
        config.add_cell(Point::new(500, 0));
        assert!(config.move_cell_down(0).unwrap());
        assert_eq!(config.grid.cell(0).unwrap().x, 500);
        assert!(matches!(
            config.remove_cell(5),
            Err(ConfigError::Grid(GridError::UnknownCell(5)))
        ));
    }
}
