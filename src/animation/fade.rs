//! Per-frame opacity interpolation, independent of placement cadence.

use crate::core::config::FadeConfig;
use crate::labels::sink::{LabelSink, RenderableLabel};
use std::time::Duration;

/// Moves every label's opacity linearly towards its target. A full 0 → 1
/// transition takes `duration` of wall-clock time regardless of frame rate.
#[derive(Debug, Clone)]
pub struct FadeDriver {
    duration: Duration,
}

impl FadeDriver {
    pub fn new(config: &FadeConfig) -> Self {
        Self {
            duration: config.duration(),
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Opacity change allowed for `elapsed` wall-clock time
    pub fn step_for(&self, elapsed: Duration) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).min(1.0) as f32
    }

    /// Advance all labels by `elapsed`. Returns the number still animating.
    pub fn tick<'a>(
        &self,
        labels: impl Iterator<Item = &'a mut RenderableLabel>,
        elapsed: Duration,
        sink: &mut dyn LabelSink,
    ) -> usize {
        let step = self.step_for(elapsed);
        labels
            .map(|label| label.step_opacity(step, sink))
            .filter(|animating| *animating)
            .count()
    }
}

impl Default for FadeDriver {
    fn default() -> Self {
        Self::new(&FadeConfig::default())
    }
}
