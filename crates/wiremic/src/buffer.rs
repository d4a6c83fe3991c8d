//! Circular capture buffer
//!
//! Models the DMA region a capture consumer reads from: a fixed-size byte
//! buffer with a write cursor that wraps by modulo and never overflows.
//! Written only from the tick engine; readers poll the published cursor.

use std::collections::TryReserveError;

/// One audio period: 50ms at 16kHz s16le mono, or 100ms at 8kHz.
pub const PERIOD_BYTES: usize = 1600;

/// Maximum number of periods in the buffer.
pub const PERIODS_MAX: usize = 16;

/// Largest negotiable buffer size.
pub const MAX_BUFFER: usize = PERIODS_MAX * PERIOD_BYTES;

/// Sentinel the buffer is cleared to on prepare. A recognizable non-zero
/// marker rather than true silence, so unfilled regions are visible.
pub const SENTINEL_FILL: u8 = 45;

/// Placeholder written by the silence-padding pass.
pub const SILENCE_FILL: u8 = 0xbe;

#[derive(Debug)]
pub struct CaptureBuffer {
    data: Vec<u8>,
    /// Write cursor in bytes, always < data.len()
    pos: usize,
    /// Bytes of the buffer covered by the silent region since prepare
    silent_filled: usize,
}

impl CaptureBuffer {
    /// Allocate a buffer of `size` bytes. Fallible so an exhausted allocation
    /// fails the configure attempt instead of aborting the daemon.
    pub fn allocate(size: usize) -> Result<Self, TryReserveError> {
        let mut data = Vec::new();
        data.try_reserve_exact(size)?;
        data.resize(size, 0);
        Ok(Self {
            data,
            pos: 0,
            silent_filled: 0,
        })
    }

    /// Clear to the sentinel value and reset the cursor. Marks the whole
    /// buffer as silent-covered, so the padding pass stays idle until a
    /// future prepare says otherwise.
    pub fn prepare(&mut self) {
        self.data.fill(SENTINEL_FILL);
        self.pos = 0;
        self.silent_filled = self.data.len();
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current write cursor in bytes.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Write one byte at the cursor and advance it, wrapping by modulo.
    pub fn write_byte(&mut self, byte: u8) {
        self.data[self.pos] = byte;
        self.pos += 1;
        if self.pos >= self.data.len() {
            self.pos = 0;
        }
    }

    /// Copy `out.len()` bytes starting at `start`, wrapping around the end.
    /// This is the consumer's read path.
    pub fn read_at(&self, start: usize, out: &mut [u8]) {
        let len = self.data.len();
        if len == 0 {
            return;
        }
        let mut src = start % len;
        for slot in out.iter_mut() {
            *slot = self.data[src];
            src += 1;
            if src >= len {
                src = 0;
            }
        }
    }

    /// Silence-padding pass: if the silent region has not covered the whole
    /// buffer since the last prepare, overwrite up to `count` bytes starting
    /// at `start` with the placeholder, honoring wraparound. Never exceeds
    /// the requested count.
    pub fn pad_silence(&mut self, start: usize, count: usize) {
        let len = self.data.len();
        if self.silent_filled >= len {
            return;
        }

        let mut bytes = count.min(len - self.silent_filled);
        let mut dst_off = start % len;

        while bytes > 0 {
            let size = bytes.min(len - dst_off);
            self.data[dst_off..dst_off + size].fill(SILENCE_FILL);
            self.silent_filled += size;
            bytes -= size;
            dst_off = 0;
        }
    }

    #[cfg(test)]
    pub(crate) fn set_silent_filled(&mut self, bytes: usize) {
        self.silent_filled = bytes;
    }

    #[cfg(test)]
    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_is_total_mod_size() {
        let mut buf = CaptureBuffer::allocate(MAX_BUFFER).unwrap();
        buf.prepare();

        // scenario from the hardware geometry: 16 * 1600 = 25600, one extra byte
        for _ in 0..(MAX_BUFFER + 1) {
            buf.write_byte(0);
        }
        assert_eq!(buf.pos(), 1);

        for n in [0usize, 7, 1599, 1600, 25599] {
            let mut b = CaptureBuffer::allocate(MAX_BUFFER).unwrap();
            b.prepare();
            for _ in 0..n {
                b.write_byte(0);
            }
            assert_eq!(b.pos(), n % MAX_BUFFER);
        }
    }

    #[test]
    fn test_prepare_fills_sentinel() {
        let mut buf = CaptureBuffer::allocate(PERIOD_BYTES).unwrap();
        buf.prepare();
        assert!(buf.as_slice().iter().all(|&b| b == SENTINEL_FILL));
        assert_eq!(buf.pos(), 0);
    }

    #[test]
    fn test_pad_silence_idle_after_prepare() {
        let mut buf = CaptureBuffer::allocate(PERIOD_BYTES).unwrap();
        buf.prepare();

        // whole buffer counts as covered, so the pass must not touch anything
        buf.pad_silence(0, PERIOD_BYTES);
        assert!(buf.as_slice().iter().all(|&b| b == SENTINEL_FILL));
    }

    #[test]
    fn test_pad_silence_wraps_and_respects_count() {
        let mut buf = CaptureBuffer::allocate(16).unwrap();
        buf.prepare();
        buf.set_silent_filled(0);

        // start near the end so the pass must wrap
        buf.pad_silence(14, 4);
        let data = buf.as_slice();
        assert_eq!(data[14], SILENCE_FILL);
        assert_eq!(data[15], SILENCE_FILL);
        assert_eq!(data[0], SILENCE_FILL);
        assert_eq!(data[1], SILENCE_FILL);
        assert_eq!(data[2], SENTINEL_FILL);
        assert_eq!(data[13], SENTINEL_FILL);
    }

    #[test]
    fn test_pad_silence_never_exceeds_remaining() {
        let mut buf = CaptureBuffer::allocate(16).unwrap();
        buf.prepare();
        buf.set_silent_filled(14);

        // only 2 bytes of the silent region remain uncovered
        buf.pad_silence(0, 8);
        let padded = buf.as_slice().iter().filter(|&&b| b == SILENCE_FILL).count();
        assert_eq!(padded, 2);
    }

    #[test]
    fn test_read_at_wraps() {
        let mut buf = CaptureBuffer::allocate(8).unwrap();
        buf.prepare();
        for b in 0..8u8 {
            buf.write_byte(b);
        }

        let mut out = [0u8; 4];
        buf.read_at(6, &mut out);
        assert_eq!(out, [6, 7, 0, 1]);
    }
}
