//! Per-function and per-module instrumentation statistics.

use std::fmt;
use std::ops::AddAssign;

/// Counters accumulated while instrumenting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counters {
    /// Index steps that received a runtime range check.
    pub checked: usize,
    /// Pointer steps left unchecked because the allocation size is unknown.
    pub skipped: usize,
    /// Address computations that received a guard.
    pub modified: usize,
    /// Address computations that needed no guard.
    pub unmodified: usize,
    /// Address computations guarded by an earlier run and left alone.
    pub already_guarded: usize,
}

impl AddAssign for Counters {
    fn add_assign(&mut self, rhs: Self) {
        self.checked += rhs.checked;
        self.skipped += rhs.skipped;
        self.modified += rhs.modified;
        self.unmodified += rhs.unmodified;
        self.already_guarded += rhs.already_guarded;
    }
}

impl fmt::Display for Counters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "pointers skipped: {}", self.skipped)?;
        writeln!(f, "pointers checked: {}", self.checked)?;
        writeln!(f, "address computations modified: {}", self.modified)?;
        write!(f, "address computations unmodified: {}", self.unmodified)
    }
}

/// Outcome of instrumenting one function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionReport {
    pub function: String,
    pub counters: Counters,
}

impl FunctionReport {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            counters: Counters::default(),
        }
    }

    /// Whether any guard was inserted.
    pub fn changed(&self) -> bool {
        self.counters.modified > 0
    }
}

impl fmt::Display for FunctionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.counters, f)
    }
}

/// Outcome of instrumenting a whole module.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassReport {
    pub functions: Vec<FunctionReport>,
}

impl PassReport {
    /// Counters summed over all functions.
    pub fn totals(&self) -> Counters {
        let mut totals = Counters::default();
        for report in &self.functions {
            totals += report.counters;
        }
        totals
    }

    /// Whether any function was modified.
    pub fn changed(&self) -> bool {
        self.functions.iter().any(FunctionReport::changed)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionReport> {
        self.functions.iter().find(|r| r.function == name)
    }
}
