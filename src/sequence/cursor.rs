/// Remainders shorter than this are folded into the previous clip.
pub const MIN_TAIL: f64 = 1.0;

const TIME_EPSILON: f64 = 1e-9;

/// One slot produced by [`SequencerCursor::step`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipSlot {
    pub index: usize,
    pub image_index: usize,
    pub start: f64,
    pub duration: f64,
}

/// Walks the virtual timeline, handing out image slots round-robin.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SequencerCursor {
    pub clip_index: usize,
    pub image_index: usize,
    pub time_elapsed: f64,
}

impl SequencerCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next slot of length `slot`, or `None` once `total` is covered.
    ///
    /// The final slot takes whatever time is left, so slot durations always
    /// sum to `total`.
    pub fn step(&mut self, pool_len: usize, slot: f64, total: f64) -> Option<ClipSlot> {
        let remaining = total - self.time_elapsed;
        if pool_len == 0 || remaining <= TIME_EPSILON {
            return None;
        }

        let duration = if remaining - slot < MIN_TAIL - TIME_EPSILON {
            remaining
        } else {
            slot
        };

        let out = ClipSlot {
            index: self.clip_index,
            image_index: self.image_index,
            start: self.time_elapsed,
            duration,
        };

        self.clip_index += 1;
        self.image_index = (self.image_index + 1) % pool_len;
        self.time_elapsed += duration;

        Some(out)
    }
}
