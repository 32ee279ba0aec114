use serde::{Serialize, Deserialize};

/// Exponentially decaying exploration rate:
/// `end + (start - end) * exp(-steps / decay)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpsilonSchedule {
    pub start: f32,
    pub end: f32,
    pub decay: f32,
}

impl Default for EpsilonSchedule {
    fn default() -> Self {
        EpsilonSchedule {
            start: 0.9,
            end: 0.05,
            decay: 200.0,
        }
    }
}

impl EpsilonSchedule {
    pub fn new(start: f32, end: f32, decay: f32) -> Self {
        EpsilonSchedule { start, end, decay }
    }

    /// Exploration threshold after `steps_done` action selections.
    pub fn threshold(&self, steps_done: u64) -> f32 {
        let decayed = (-(steps_done as f64) / self.decay as f64).exp() as f32;
        self.end + (self.start - self.end) * decayed
    }
}
