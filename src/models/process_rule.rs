use super::geometry::{Point, Size};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Desired geometry policy for every window owned by one process
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessRule {
    /// Executable name, matched case-insensitively (e.g. `notepad.exe`)
    pub process_name: String,
    /// Whether `x`/`y` are enforced when the grid is not in use
    #[serde(default)]
    pub use_coordinates: bool,
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
    pub width: u32,
    pub height: u32,
    /// Window titles that are never touched, compared exactly
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub excluded_titles: BTreeSet<String>,
}

impl ProcessRule {
    /// Create a size-only rule with validation
    pub fn new(process_name: impl Into<String>, size: Size) -> Result<Self, RuleError> {
        let rule = Self {
            process_name: process_name.into(),
            use_coordinates: false,
            x: 0,
            y: 0,
            width: size.width,
            height: size.height,
            excluded_titles: BTreeSet::new(),
        };

        rule.validate()?;
        Ok(rule)
    }

    /// Create a rule that also pins the window to `position`
    pub fn with_position(
        process_name: impl Into<String>,
        size: Size,
        position: Point,
    ) -> Result<Self, RuleError> {
        let mut rule = Self::new(process_name, size)?;
        rule.use_coordinates = true;
        rule.x = position.x;
        rule.y = position.y;
        Ok(rule)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Lookup key shared by matching and duplicate detection
    pub fn key(&self) -> String {
        normalize_process_name(&self.process_name)
    }

    /// Check whether this rule targets the given owning process
    pub fn matches_process(&self, process_name: &str) -> bool {
        self.key() == normalize_process_name(process_name)
    }

    pub fn is_excluded(&self, title: &str) -> bool {
        self.excluded_titles.contains(title)
    }

    /// Add a title to the exclusion set. Returns false if it was already present.
    pub fn exclude_title(&mut self, title: impl Into<String>) -> bool {
        self.excluded_titles.insert(title.into())
    }

    pub fn include_title(&mut self, title: &str) -> bool {
        self.excluded_titles.remove(title)
    }

    pub fn validate(&self) -> Result<(), RuleError> {
        if self.process_name.trim().is_empty() {
            return Err(RuleError::EmptyProcessName);
        }

        if !self.size().is_valid() {
            return Err(RuleError::InvalidSize {
                width: self.width,
                height: self.height,
            });
        }

        Ok(())
    }
}

pub(crate) fn normalize_process_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Errors that can occur with process rules
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    #[error("Process name cannot be empty")]
    EmptyProcessName,

    #[error("Window size must be positive, got {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
}
