//! PCM stream state machine
//!
//! One `Device` per registered card. The device owns a single lock that
//! serializes all configuration and lifecycle state against both the
//! consumer's control calls and the tick engine's fires. The write cursor is
//! mirrored into an atomic so `pointer()` reads never take the lock
//! (single writer: the tick engine).
//!
//! Lifecycle: Closed -> Opened -> Prepared -> Running <-> Stopped -> Closed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use micproto::{CardStatus, PcmChunk};
use tokio::sync::{mpsc, watch};
use tracing::debug;
use uuid::Uuid;

use crate::buffer::{CaptureBuffer, MAX_BUFFER, PERIOD_BYTES};
use crate::tick::{TickEngine, TickState, TICK_SCALE};
use crate::waveform::Waveform;

/// Sample rates the device will negotiate.
pub const SUPPORTED_RATES: [u32; 2] = [8000, 16000];

/// Depth of the bounded queue between the ingest handler and the fill path.
/// The handler never blocks on the device lock; overflow drops the chunk.
const INGEST_QUEUE_DEPTH: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("device busy: a capture session is already open")]
    Busy,

    #[error("invalid stream parameters: {0}")]
    InvalidParams(String),

    #[error("invalid trigger command")]
    InvalidTrigger,

    #[error("no open session")]
    NotOpen,

    #[error("capture buffer allocation of {0} bytes failed")]
    Alloc(usize),
}

/// Stream direction. Only capture is implemented; the playback bit exists so
/// the running/valid masks keep their per-direction shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Playback = 0,
    Capture = 1,
}

impl Direction {
    fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

/// Trigger commands. Pause/resume are rejected with *invalid trigger*.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Start,
    Stop,
    Pause,
    Resume,
}

/// Parameters requested by the consumer.
#[derive(Debug, Clone, Copy)]
pub struct StreamConfig {
    pub rate: u32,
    pub channels: u32,
    pub sample_width: u32,
    pub buffer_bytes: usize,
}

/// Parameters derived from a successful configure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NegotiatedParams {
    pub bytes_per_second: u32,
    pub period_bytes: usize,
    /// Period size in fixed-point, scaled by the tick frequency
    pub period_frac: u64,
    pub frame_bytes: usize,
}

/// Engine transition reported by a trigger, so the session holder can spawn
/// or abort the tick task outside the device lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Armed,
    Disarmed,
    Unchanged,
}

/// State guarded by the single device lock.
struct Shared {
    session: Option<Uuid>,
    /// Per-direction configured bits
    valid: u32,
    /// Per-direction running bits
    running: u32,
    params: NegotiatedParams,
    buffer: Option<CaptureBuffer>,
    waveform: Waveform,
    tick: TickState,
    /// Fill-path end of the ingest queue
    ingest_rx: mpsc::Receiver<PcmChunk>,
    /// Partially consumed ingested chunk: (payload, read offset)
    pending: Option<(Vec<u8>, usize)>,
    last_sequence: Option<u32>,
}

impl Shared {
    /// Emit `count` bytes at the write cursor: relayed PCM first, synthetic
    /// waveform for the remainder, then the silence-padding pass.
    fn fill(&mut self, count: usize) {
        let Some(mut buffer) = self.buffer.take() else {
            return;
        };
        let start = buffer.pos();

        let mut remaining = count;
        while remaining > 0 {
            match self.next_ingested_byte() {
                Some(byte) => {
                    buffer.write_byte(byte);
                    remaining -= 1;
                }
                None => break,
            }
        }

        for _ in 0..remaining {
            let sample = self.waveform.next_sample();
            buffer.write_byte(sample);
        }

        buffer.pad_silence(start, count);
        self.buffer = Some(buffer);
    }

    /// Next byte of relayed PCM, draining the bounded queue chunk by chunk.
    /// Never blocks; an empty queue falls back to the waveform.
    fn next_ingested_byte(&mut self) -> Option<u8> {
        loop {
            if let Some((data, offset)) = self.pending.as_mut() {
                if *offset < data.len() {
                    let byte = data[*offset];
                    *offset += 1;
                    return Some(byte);
                }
                self.pending = None;
            }

            match self.ingest_rx.try_recv() {
                Ok(chunk) => {
                    if let Some(last) = self.last_sequence {
                        let expected = last.wrapping_add(1);
                        if chunk.sequence != expected {
                            debug!(expected, got = chunk.sequence, "pcm chunk sequence gap");
                        }
                    }
                    self.last_sequence = Some(chunk.sequence);
                    self.pending = Some((chunk.data, 0));
                }
                Err(_) => return None,
            }
        }
    }
}

/// One virtual capture card.
pub struct Device {
    index: u32,
    shared: Mutex<Shared>,
    /// Mirror of the buffer write cursor, published after each fill
    cursor_bytes: AtomicUsize,
    /// Cumulative count of period-boundary crossings
    periods_tx: watch::Sender<u64>,
    ingest_tx: mpsc::Sender<PcmChunk>,
}

impl Device {
    pub fn new(index: u32) -> Arc<Self> {
        let (ingest_tx, ingest_rx) = mpsc::channel(INGEST_QUEUE_DEPTH);
        let (periods_tx, _) = watch::channel(0u64);

        Arc::new(Self {
            index,
            shared: Mutex::new(Shared {
                session: None,
                valid: 0,
                running: 0,
                params: NegotiatedParams::default(),
                buffer: None,
                waveform: Waveform::new(),
                tick: TickState::new(),
                ingest_rx,
                pending: None,
                last_sequence: None,
            }),
            cursor_bytes: AtomicUsize::new(0),
            periods_tx,
            ingest_tx,
        })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Open a capture session. Fails with *device busy* while another
    /// session holds the device. Resets the waveform cursor and allocates
    /// the (not yet started) tick state; the buffer is untouched.
    pub fn open(self: &Arc<Self>, direction: Direction) -> Result<Stream, DeviceError> {
        if direction != Direction::Capture {
            return Err(DeviceError::InvalidParams(
                "playback direction not supported".into(),
            ));
        }

        let mut shared = self.shared.lock().unwrap();
        if shared.session.is_some() {
            return Err(DeviceError::Busy);
        }

        let session = Uuid::new_v4();
        shared.session = Some(session);
        shared.waveform.reset();
        shared.tick.disarm();

        Ok(Stream {
            device: Arc::clone(self),
            session,
            direction,
            frame_bytes: 0,
            engine: None,
            periods: self.periods_tx.subscribe(),
        })
    }

    /// Subscribe to the cumulative period-elapsed counter. This is what
    /// unblocks a waiting reader when new data crosses a period boundary.
    pub fn subscribe_periods(&self) -> watch::Receiver<u64> {
        self.periods_tx.subscribe()
    }

    /// Hand a chunk to the fill path via the bounded queue. Called from the
    /// bus dispatch context; never waits on the device lock.
    pub fn push_chunk(
        &self,
        chunk: PcmChunk,
    ) -> Result<(), mpsc::error::TrySendError<PcmChunk>> {
        self.ingest_tx.try_send(chunk)
    }

    /// Snapshot for the control channel.
    pub fn status(&self) -> CardStatus {
        let shared = self.shared.lock().unwrap();
        CardStatus {
            index: self.index,
            running: shared.running != 0,
            valid: shared.valid != 0,
            cursor_bytes: self.cursor_bytes.load(Ordering::Acquire) as u64,
        }
    }

    /// Lock-free cursor read for pointer queries.
    pub fn cursor(&self) -> usize {
        self.cursor_bytes.load(Ordering::Acquire)
    }

    /// One tick engine fire.
    ///
    /// Running is checked before anything else, so a stop that lands before
    /// a pending fire reduces it to a no-op. A zero elapsed delta (double
    /// fire) skips the fill but leaves the engine armed.
    pub fn timer_fire(&self, now: Instant) {
        let mut shared = self.shared.lock().unwrap();
        if shared.running == 0 {
            return;
        }
        let Some(last) = shared.tick.last_tick() else {
            return;
        };

        let delta_ms = now.saturating_duration_since(last).as_millis() as u64;
        if delta_ms == 0 {
            return;
        }
        // Advance by the consumed whole milliseconds, not to `now`: the
        // sub-ms remainder stays in last_tick and is counted by a later
        // fire, so no elapsed time is ever dropped.
        shared.tick.set_last_tick(last + Duration::from_millis(delta_ms));

        let params = shared.params;
        if params.bytes_per_second == 0 {
            return;
        }

        let (count, periods) =
            shared
                .tick
                .advance(delta_ms, params.bytes_per_second, params.period_frac);
        if count == 0 {
            return;
        }

        shared.fill(count);
        let pos = shared.buffer.as_ref().map_or(0, |b| b.pos());
        self.cursor_bytes.store(pos, Ordering::Release);

        if periods > 0 {
            self.periods_tx.send_modify(|total| *total += periods);
        }
    }

    fn configure(
        &self,
        session: Uuid,
        direction: Direction,
        config: StreamConfig,
    ) -> Result<NegotiatedParams, DeviceError> {
        // All parameter checks happen before any state mutation, so a
        // rejected configure leaves prior state intact.
        if !SUPPORTED_RATES.contains(&config.rate) {
            return Err(DeviceError::InvalidParams(format!(
                "unsupported rate {} (supported: {:?})",
                config.rate, SUPPORTED_RATES
            )));
        }
        if config.channels != 1 {
            return Err(DeviceError::InvalidParams(format!(
                "unsupported channel count {}",
                config.channels
            )));
        }
        if config.sample_width != 16 {
            return Err(DeviceError::InvalidParams(format!(
                "unsupported sample width {}",
                config.sample_width
            )));
        }
        let frame_bytes = (config.channels * config.sample_width / 8) as usize;
        let bps = config.rate * config.channels * (config.sample_width / 8);
        if bps == 0 {
            return Err(DeviceError::InvalidParams(
                "non-positive byte rate".into(),
            ));
        }
        if config.buffer_bytes == 0
            || config.buffer_bytes > MAX_BUFFER
            || config.buffer_bytes % PERIOD_BYTES != 0
        {
            return Err(DeviceError::InvalidParams(format!(
                "buffer size {} not a multiple of {} within {}",
                config.buffer_bytes, PERIOD_BYTES, MAX_BUFFER
            )));
        }

        let mut shared = self.shared.lock().unwrap();
        if shared.session != Some(session) {
            return Err(DeviceError::NotOpen);
        }

        let mut buffer = CaptureBuffer::allocate(config.buffer_bytes)
            .map_err(|_| DeviceError::Alloc(config.buffer_bytes))?;

        if direction == Direction::Capture {
            // sentinel marker, not true zero silence
            buffer.prepare();
        }

        if shared.running == 0 {
            shared.tick.reset_position();
        }

        if shared.valid & !direction.bit() == 0 {
            shared.params = NegotiatedParams {
                bytes_per_second: bps,
                period_bytes: PERIOD_BYTES,
                period_frac: PERIOD_BYTES as u64 * TICK_SCALE,
                frame_bytes,
            };
        }
        shared.valid |= direction.bit();
        shared.buffer = Some(buffer);
        self.cursor_bytes.store(0, Ordering::Release);

        debug!(
            card = self.index,
            bps,
            buffer_bytes = config.buffer_bytes,
            "stream configured"
        );
        Ok(shared.params)
    }

    fn trigger(
        &self,
        session: Uuid,
        direction: Direction,
        cmd: Trigger,
    ) -> Result<Transition, DeviceError> {
        let mut shared = self.shared.lock().unwrap();
        if shared.session != Some(session) {
            return Err(DeviceError::NotOpen);
        }

        match cmd {
            Trigger::Start => {
                let transition = if shared.running == 0 {
                    shared.tick.arm(Instant::now());
                    Transition::Armed
                } else {
                    // repeated start within the same mask is idempotent
                    Transition::Unchanged
                };
                shared.running |= direction.bit();
                Ok(transition)
            }
            Trigger::Stop => {
                shared.running &= !direction.bit();
                if shared.running == 0 {
                    shared.tick.disarm();
                    Ok(Transition::Disarmed)
                } else {
                    Ok(Transition::Unchanged)
                }
            }
            Trigger::Pause | Trigger::Resume => Err(DeviceError::InvalidTrigger),
        }
    }

    fn close_session(&self, session: Uuid) {
        // The lock is taken even though clearing the reference would be safe
        // without it: every device-state mutation stays lock-guarded.
        let mut shared = self.shared.lock().unwrap();
        if shared.session == Some(session) {
            shared.running = 0;
            shared.tick.disarm();
            shared.session = None;
        }
    }

    fn read_at(&self, start: usize, out: &mut [u8]) {
        let shared = self.shared.lock().unwrap();
        if let Some(buffer) = shared.buffer.as_ref() {
            buffer.read_at(start, out);
        }
    }

    #[cfg(test)]
    fn test_set_last_tick(&self, now: Instant) {
        self.shared.lock().unwrap().tick.set_last_tick(now);
    }
}

/// The stream operations a host subsystem binds to.
pub trait PcmOps {
    fn configure(&mut self, config: StreamConfig) -> Result<NegotiatedParams, DeviceError>;
    fn trigger(&mut self, cmd: Trigger) -> Result<(), DeviceError>;
    /// Frames captured so far.
    fn pointer(&self) -> u64;
    fn close(self);
}

/// An open capture session. At most one per device.
pub struct Stream {
    device: Arc<Device>,
    session: Uuid,
    direction: Direction,
    frame_bytes: usize,
    engine: Option<TickEngine>,
    periods: watch::Receiver<u64>,
}

impl Stream {
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Copy captured bytes out of the circular buffer, wrapping at the end.
    pub fn read_at(&self, start: usize, out: &mut [u8]) {
        self.device.read_at(start, out);
    }

    /// Cumulative period-elapsed count observed so far.
    pub fn periods_elapsed(&self) -> u64 {
        *self.periods.borrow()
    }

    /// Wait until the next period boundary is crossed. This is the blocking
    /// read path: the tick engine wakes it once per elapsed period.
    pub async fn period_elapsed(&mut self) -> u64 {
        if self.periods.changed().await.is_err() {
            return *self.periods.borrow();
        }
        *self.periods.borrow_and_update()
    }
}

impl PcmOps for Stream {
    fn configure(&mut self, config: StreamConfig) -> Result<NegotiatedParams, DeviceError> {
        let params = self.device.configure(self.session, self.direction, config)?;
        self.frame_bytes = params.frame_bytes;
        Ok(params)
    }

    fn trigger(&mut self, cmd: Trigger) -> Result<(), DeviceError> {
        match self.device.trigger(self.session, self.direction, cmd)? {
            Transition::Armed => {
                self.engine = Some(TickEngine::spawn(Arc::clone(&self.device)));
            }
            Transition::Disarmed => {
                if let Some(engine) = self.engine.take() {
                    engine.disarm();
                }
            }
            Transition::Unchanged => {}
        }
        Ok(())
    }

    fn pointer(&self) -> u64 {
        if self.frame_bytes == 0 {
            return 0;
        }
        (self.device.cursor() / self.frame_bytes) as u64
    }

    fn close(mut self) {
        if let Some(engine) = self.engine.take() {
            engine.disarm();
        }
        self.device.close_session(self.session);
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.take() {
            engine.disarm();
        }
        self.device.close_session(self.session);
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("card", &self.device.index)
            .field("session", &self.session)
            .field("direction", &self.direction)
            .finish()
    }
}
