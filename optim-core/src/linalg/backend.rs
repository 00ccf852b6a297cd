//! Execution-context selection for the dual-path kernels.
//!
//! The original engine kept one process-wide "use the accelerator" flag
//! and a single default device context. Here backend selection is an
//! explicit value passed into kernels and solver constructors, so tests
//! can run both paths side by side deterministically.

/// Which execution path the dense kernels take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecPolicy {
    /// Plain scalar loops on the calling thread.
    Sequential,
    /// Data-parallel work items dispatched synchronously; each kernel
    /// blocks until its dispatch completes. No overlap between
    /// successive operations.
    Parallel,
}

/// Default reduction group size. Must be a power of two.
pub const DEFAULT_WORK_GROUP: usize = 128;

/// Default panel width for blocked Cholesky and substitution.
pub const DEFAULT_PANEL: usize = 32;

/// Execution context threaded through every dense kernel.
///
/// The two policies are functionally interchangeable: results agree to
/// working `f32` precision on identical inputs, but not bitwise, since
/// the parallel reduction sums in a different order.
#[derive(Debug, Clone, Copy)]
pub struct ExecContext {
    pub policy: ExecPolicy,
    /// Group size for the blocked parallel reduction.
    pub work_group: usize,
    /// Block size for blocked factorization and substitution panels.
    pub panel: usize,
}

impl ExecContext {
    pub fn sequential() -> Self {
        Self {
            policy: ExecPolicy::Sequential,
            work_group: DEFAULT_WORK_GROUP,
            panel: DEFAULT_PANEL,
        }
    }

    pub fn parallel() -> Self {
        Self {
            policy: ExecPolicy::Parallel,
            work_group: DEFAULT_WORK_GROUP,
            panel: DEFAULT_PANEL,
        }
    }

    /// Override the reduction group size. `work_group` must be a power
    /// of two.
    pub fn with_work_group(mut self, work_group: usize) -> Self {
        debug_assert!(work_group.is_power_of_two());
        self.work_group = work_group;
        self
    }

    /// Override the factorization panel width.
    pub fn with_panel(mut self, panel: usize) -> Self {
        debug_assert!(panel > 0);
        self.panel = panel;
        self
    }

    #[inline]
    pub fn is_parallel(&self) -> bool {
        self.policy == ExecPolicy::Parallel
    }
}

impl Default for ExecContext {
    fn default() -> Self {
        Self::sequential()
    }
}
