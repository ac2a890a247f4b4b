//! Pass driver.
//!
//! Runs the three phases per function, in order:
//!
//! 1. **Tracking**: [`track_allocations`] records allocation sizes for the
//!    whole function before anything else happens.
//! 2. **Collection**: [`collect_address_computations`] snapshots every
//!    address computation in one full scan, so guards inserted later are
//!    never themselves considered.
//! 3. **Guarding**: for each collected computation, [`synthesize`] decides
//!    the checks and [`insert_guard`] applies them. Earlier guards split
//!    blocks and move instructions, so the collected position is adjusted
//!    by `SiteLocations` before use.

use tracing::{debug, info};

use gepsafe_ir::{BlockId, Function, Instr, InstrLocation, Module, TypePool};

use crate::alloc_size::track_allocations;
use crate::bounds::{collect_address_computations, synthesize};
use crate::config::GepSafeConfig;
use crate::error::GepSafeError;
use crate::guard::insert_guard;
use crate::report::{FunctionReport, PassReport};

/// Tracks where collected address computations live while guards split
/// their blocks.
///
/// Sites are guarded in layout order, so a split only moves sites later in
/// the same original block. Those end up in the newest continuation,
/// shifted down by the original index the split happened at.
#[derive(Debug, Default)]
struct SiteLocations {
    /// Original block, the continuation now holding its tail, and the
    /// original index of the tail's first instruction.
    moved: Option<(BlockId, BlockId, usize)>,
}

impl SiteLocations {
    fn current(&self, original: InstrLocation) -> InstrLocation {
        match self.moved {
            Some((block, tail, start)) if block == original.block => InstrLocation {
                block: tail,
                index: original.index.saturating_sub(start),
            },
            _ => original,
        }
    }

    fn record_split(&mut self, original: InstrLocation, continuation: BlockId) {
        self.moved = Some((original.block, continuation, original.index));
    }
}

/// A transformation a host runs once per function.
pub trait FunctionPass {
    /// Symbolic name the host uses to select the pass.
    fn name(&self) -> &'static str;

    /// Transform `func`. Returns whether it was changed.
    fn run_on_function(&mut self, func: &mut Function, pool: &TypePool)
        -> Result<bool, GepSafeError>;
}

/// Inserts a runtime bounds guard in front of every address computation
/// whose indices can be checked.
#[derive(Debug, Clone, Default)]
pub struct GepSafePass {
    config: GepSafeConfig,
}

impl GepSafePass {
    pub const NAME: &'static str = "gepsafe";

    pub fn new(config: GepSafeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GepSafeConfig {
        &self.config
    }

    /// Instrument one function and report what was done.
    ///
    /// On error the function may already contain guards for computations
    /// visited before the failing one.
    pub fn instrument_function(
        &self,
        func: &mut Function,
        pool: &TypePool,
    ) -> Result<FunctionReport, GepSafeError> {
        info!(function = %func.name, "instrumenting");
        let mut report = FunctionReport::new(func.name.clone());

        let allocs = track_allocations(func, pool, &self.config);
        let sites = collect_address_computations(func);
        report.counters.already_guarded = sites.already_guarded;
        let mut locations = SiteLocations::default();

        for site in &sites.pending {
            let plan = synthesize(func, pool, site, &allocs).map_err(|violation| {
                GepSafeError::Contract {
                    function: func.name.clone(),
                    violation,
                }
            })?;
            report.counters.checked += plan.checked;
            report.counters.skipped += plan.skipped;

            let Some(condition) = plan.condition else {
                report.counters.unmodified += 1;
                continue;
            };

            let at = locations.current(site.location);
            if func.instr(at).and_then(Instr::defined_value) != Some(site.dst) {
                return Err(GepSafeError::LostInstruction {
                    function: func.name.clone(),
                    gep: site.dst,
                });
            }
            let guard = insert_guard(func, pool, at, &condition);
            locations.record_split(site.location, guard.continuation);
            report.counters.modified += 1;

            debug!(
                function = %func.name,
                gep = site.dst.raw(),
                checks = condition.len(),
                head = guard.head.raw(),
                continuation = guard.continuation.raw(),
                trap = guard.trap.raw(),
                "inserted guard"
            );
        }

        let counters = &report.counters;
        info!(
            function = %func.name,
            skipped = counters.skipped,
            checked = counters.checked,
            modified = counters.modified,
            unmodified = counters.unmodified,
            already_guarded = counters.already_guarded,
            "instrumentation complete"
        );
        Ok(report)
    }
}

impl FunctionPass for GepSafePass {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn run_on_function(
        &mut self,
        func: &mut Function,
        pool: &TypePool,
    ) -> Result<bool, GepSafeError> {
        self.instrument_function(func, pool)
            .map(|report| report.changed())
    }
}

/// Instrument every function of `module`.
///
/// Stops at the first contract violation.
pub fn run_on_module(
    module: &mut Module,
    config: &GepSafeConfig,
) -> Result<PassReport, GepSafeError> {
    let pass = GepSafePass::new(config.clone());
    let mut report = PassReport::default();
    for func in &mut module.functions {
        report
            .functions
            .push(pass.instrument_function(func, &module.types)?);
    }
    Ok(report)
}
