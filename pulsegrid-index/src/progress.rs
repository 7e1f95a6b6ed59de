//! Progress reporting hook for long-running builds.

/// Callback surface the index builder drives during the split and merge
/// phases. Implementations decide how (or whether) to display it.
pub trait Progress {
    /// Declare how many steps the current phase has.
    fn set_total_steps(&mut self, total: usize);

    /// Report completion of `step` of the declared total.
    fn set_progress(&mut self, step: usize);

    /// Start a fresh phase.
    fn reset(&mut self);

    /// Describe the current phase.
    fn set_label_text(&mut self, label: &str);
}

/// Discards all progress reports.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullProgress;

impl Progress for NullProgress {
    fn set_total_steps(&mut self, _total: usize) {}
    fn set_progress(&mut self, _step: usize) {}
    fn reset(&mut self) {}
    fn set_label_text(&mut self, _label: &str) {}
}
