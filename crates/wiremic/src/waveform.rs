//! Synthetic waveform generator
//!
//! Produces the byte stream the capture buffer is filled with when no
//! external PCM has been ingested. The generator walks a fixed sample table
//! and bumps a "lift" index on every full pass, which offsets subsequent
//! samples so the output is a slowly varying tone rather than a static buzz.
//!
//! The cursor is a small value type threaded through each fill call, with no
//! shared state, so it can be tested in isolation.

/// Fixed synthetic sample table. One pass is one waveform cycle.
const WAVE_TABLE: [u8; 21] = [
    20, 22, 24, 25, 24, 22, 21, 19, 17, 15, 14, 15, 17, 19, 20, 127, 22, 19, 17, 15, 19,
];

/// The lift index wraps at this modulus.
const LIFT_WRAP: u8 = 4;

/// Position within the sample table plus the current lift index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Waveform {
    pos: usize,
    lift: u8,
}

impl Waveform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to the start of the table with no lift. Called on stream open.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Length of one full table pass, in bytes.
    pub fn cycle_len() -> usize {
        WAVE_TABLE.len()
    }

    pub fn lift(&self) -> u8 {
        self.lift
    }

    /// Draw the next sample byte and advance the cursor.
    ///
    /// The lift offset is `lift * 10 - 10`, applied with wrapping byte
    /// arithmetic so the bit pattern matches a signed char add.
    pub fn next_sample(&mut self) -> u8 {
        let offset = (self.lift as i16) * 10 - 10;
        let sample = WAVE_TABLE[self.pos].wrapping_add(offset as u8);

        self.pos += 1;
        if self.pos >= WAVE_TABLE.len() {
            self.pos = 0;
            self.lift += 1;
            if self.lift >= LIFT_WRAP {
                self.lift = 0;
            }
        }

        sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_cycle_is_table_minus_ten() {
        let mut wvf = Waveform::new();
        let first: Vec<u8> = (0..Waveform::cycle_len())
            .map(|_| wvf.next_sample())
            .collect();

        let expected: Vec<u8> = WAVE_TABLE.iter().map(|b| b.wrapping_sub(10)).collect();
        assert_eq!(first, expected);
    }

    #[test]
    fn test_lift_bumps_once_per_cycle() {
        let mut wvf = Waveform::new();
        assert_eq!(wvf.lift(), 0);

        for _ in 0..Waveform::cycle_len() {
            wvf.next_sample();
        }
        assert_eq!(wvf.lift(), 1);

        for _ in 0..Waveform::cycle_len() {
            wvf.next_sample();
        }
        assert_eq!(wvf.lift(), 2);
    }

    #[test]
    fn test_lift_wraps_at_four() {
        let mut wvf = Waveform::new();
        for _ in 0..(Waveform::cycle_len() * LIFT_WRAP as usize) {
            wvf.next_sample();
        }
        assert_eq!(wvf.lift(), 0);

        // second pass of lift 0 matches the first
        let mut fresh = Waveform::new();
        for _ in 0..Waveform::cycle_len() {
            assert_eq!(wvf.next_sample(), fresh.next_sample());
        }
    }

    #[test]
    fn test_reset_returns_to_start() {
        let mut wvf = Waveform::new();
        let first = {
            let mut w = Waveform::new();
            w.next_sample()
        };

        for _ in 0..100 {
            wvf.next_sample();
        }
        wvf.reset();
        assert_eq!(wvf.next_sample(), first);
    }
}
