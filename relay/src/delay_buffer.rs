//! The time shifting queue that sits between the publisher and the upstream server.
//!
//! Every message received from the publisher is appended to the primary queue.  What
//! `pop_ready()` releases depends on the mode:
//!
//! * `Realtime` releases everything immediately.  Once a keyframe has been seen every message
//!   is also mirrored into a rolling window that holds the last `delay_ms` of the stream.
//! * `Delay` releases messages once they are older than `delay_ms`.
//! * `Rewind` puts the rolling window back in front of the queue, so the last `delay_ms` of the
//!   stream is sent again, then continues as `Delay`.
//! * `Forward` throws away everything before the most recent keyframe, then continues as
//!   `Realtime`.
//!
//! The rolling window is only ever cut at keyframes so a replay never starts mid group of
//! pictures.  The primary queue is bounded by a message count and a byte count; crossing
//! either pauses the publisher and further overflow drops the oldest messages.

use crate::media::{MediaFlag, MediaKind, MediaMessage};
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

const LOG_EVERY: u64 = 100;
const LARGE_RELEASE: usize = 25;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferMode {
    Realtime,
    Delay,
    Rewind,
    Forward,
}

impl BufferMode {
    /// The mode a one-shot mode turns into once it has been applied
    pub fn settled(self) -> BufferMode {
        match self {
            BufferMode::Rewind => BufferMode::Delay,
            BufferMode::Forward => BufferMode::Realtime,
            mode => mode,
        }
    }
}

impl fmt::Display for BufferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BufferMode::Realtime => "realtime",
            BufferMode::Delay => "delay",
            BufferMode::Rewind => "rewind",
            BufferMode::Forward => "forward",
        };

        f.write_str(name)
    }
}

impl FromStr for BufferMode {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "realtime" => Ok(BufferMode::Realtime),
            "delay" => Ok(BufferMode::Delay),
            "rewind" | "activate" => Ok(BufferMode::Rewind),
            "forward" | "deactivate" => Ok(BufferMode::Forward),
            _ => Err(()),
        }
    }
}

/// Values the buffer reads from the relay configuration on every cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferLimits {
    pub delay_ms: u64,
    pub max_chunks: usize,
    pub max_bytes: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BufferedChunk {
    pub id: u64,
    pub message: MediaMessage,
    pub received_at_ms: u64,
    pub is_keyframe: bool,
}

/// How full a buffer is, as reported in status snapshots
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BufferOccupancy {
    pub chunks: usize,
    pub bytes: u64,
    pub window_chunks: usize,
    pub paused: bool,
}

pub struct DelayBuffer {
    queue: VecDeque<BufferedChunk>,
    queued_bytes: u64,
    window: VecDeque<BufferedChunk>,
    window_active: bool,
    mode: BufferMode,
    applied_mode_epoch: Option<u64>,
    limits: BufferLimits,
    paused: bool,
    next_id: u64,
    last_flag: Option<MediaFlag>,
    pushed_count: u64,
    released_count: u64,
}

impl DelayBuffer {
    pub fn new(limits: BufferLimits, mode: BufferMode) -> DelayBuffer {
        DelayBuffer {
            queue: VecDeque::new(),
            queued_bytes: 0,
            window: VecDeque::new(),
            window_active: false,
            mode,
            applied_mode_epoch: None,
            limits,
            paused: false,
            next_id: 0,
            last_flag: None,
            pushed_count: 0,
            released_count: 0,
        }
    }

    pub fn set_limits(&mut self, limits: BufferLimits) {
        self.limits = limits;
    }

    pub fn set_mode(&mut self, mode: BufferMode) {
        if mode != self.mode {
            info!(from = %self.mode, to = %mode, "Buffer mode changed");
            self.mode = mode;
        }
    }

    /// Applies a configured mode once per configuration change.  Returns true if the mode was
    /// applied, false if this epoch had already been seen.
    pub fn apply_mode(&mut self, mode: BufferMode, epoch: u64) -> bool {
        if self.applied_mode_epoch == Some(epoch) {
            return false;
        }

        self.applied_mode_epoch = Some(epoch);
        self.set_mode(mode);
        true
    }

    pub fn mode(&self) -> BufferMode {
        self.mode
    }

    /// True while the publisher should not be read from
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn occupancy(&self) -> BufferOccupancy {
        BufferOccupancy {
            chunks: self.queue.len(),
            bytes: self.queued_bytes,
            window_chunks: self.window.len(),
            paused: self.paused,
        }
    }

    pub fn push(&mut self, message: MediaMessage, now_ms: u64) {
        let flag = message.flag();

        // Only the first keyframe of a run starts a new group of pictures
        let is_keyframe = message.kind == MediaKind::Video
            && flag == MediaFlag::KeyFrame
            && self.last_flag != Some(MediaFlag::KeyFrame);
        self.last_flag = Some(flag);

        let chunk = BufferedChunk {
            id: self.next_id,
            message,
            received_at_ms: now_ms,
            is_keyframe,
        };

        self.next_id += 1;
        self.pushed_count += 1;
        self.queued_bytes += chunk.message.data.len() as u64;

        if self.mode == BufferMode::Realtime {
            if is_keyframe {
                self.window_active = true;
            }

            if self.window_active {
                self.window.push_back(chunk.clone());
            }
        }

        self.queue.push_back(chunk);
        self.enforce_limits();

        if self.pushed_count % LOG_EVERY == 0 {
            info!(
                pushed = self.pushed_count,
                queued_chunks = self.queue.len(),
                queued_bytes = self.queued_bytes,
                window_chunks = self.window.len(),
                "Buffer progress"
            );
        }
    }

    /// Returns the messages that should be sent upstream now, oldest first
    pub fn pop_ready(&mut self, now_ms: u64) -> Vec<BufferedChunk> {
        match self.mode {
            BufferMode::Rewind => {
                self.rewind();
                self.set_mode(BufferMode::Delay);
            }

            BufferMode::Forward => {
                self.forward();
                self.set_mode(BufferMode::Realtime);
            }

            _ => (),
        }

        let mut ready = Vec::new();
        match self.mode {
            BufferMode::Realtime => {
                ready.extend(self.queue.drain(..));
                self.queued_bytes = 0;
                self.prune_window(now_ms);
            }

            _ => {
                while let Some(chunk) = self.queue.front() {
                    if !is_older_than(chunk, now_ms, self.limits.delay_ms) {
                        break;
                    }

                    if let Some(chunk) = self.queue.pop_front() {
                        self.queued_bytes -= chunk.message.data.len() as u64;
                        ready.push(chunk);
                    }
                }
            }
        }

        if !ready.is_empty() {
            let before = self.released_count;
            self.released_count += ready.len() as u64;
            if before / LOG_EVERY != self.released_count / LOG_EVERY {
                info!(released = self.released_count, "Relay progress");
            }

            if ready.len() > LARGE_RELEASE {
                warn!(count = ready.len(), "Releasing a large number of chunks at once");
            }
        }

        self.update_pause();
        ready
    }

    /// Drops whole groups of pictures from the front of the rolling window until it holds no
    /// more than `delay_ms` of the stream.  The window always starts at a keyframe afterwards.
    fn prune_window(&mut self, now_ms: u64) {
        let delay_ms = self.limits.delay_ms;
        while let Some(head) = self.window.front() {
            if !is_older_than(head, now_ms, delay_ms) {
                break;
            }

            // Drop up to the next keyframe
            let mut skipping_current_group = head.is_keyframe;
            while !skipping_current_group {
                self.window.pop_front();
                match self.window.front() {
                    Some(next) => skipping_current_group = next.is_keyframe,
                    None => break,
                }
            }

            // Drop that keyframe's group, stopping at the keyframe after it
            while let Some(next) = self.window.front() {
                if next.is_keyframe && !skipping_current_group {
                    break;
                }

                if !next.is_keyframe {
                    skipping_current_group = false;
                }

                self.window.pop_front();
            }
        }

        // The rest of a dropped group must not start the window, so wait for the next keyframe
        if self.window.is_empty() {
            self.window_active = false;
        }
    }

    fn rewind(&mut self) {
        let queued: HashSet<u64> = self.queue.iter().map(|chunk| chunk.id).collect();
        let missing: Vec<BufferedChunk> = self
            .window
            .iter()
            .filter(|chunk| !queued.contains(&chunk.id))
            .cloned()
            .collect();

        info!(reinjected = missing.len(), "Rewinding buffer");
        for chunk in missing.into_iter().rev() {
            self.queued_bytes += chunk.message.data.len() as u64;
            self.queue.push_front(chunk);
        }
    }

    fn forward(&mut self) {
        match self.queue.iter().rposition(|chunk| chunk.is_keyframe) {
            Some(index) => {
                let dropped: Vec<BufferedChunk> = self.queue.drain(..index).collect();
                let dropped_bytes: u64 = dropped.iter().map(|x| x.message.data.len() as u64).sum();
                self.queued_bytes -= dropped_bytes;
                info!(dropped = dropped.len(), "Skipping to the most recent keyframe");
            }

            None => {
                info!(dropped = self.queue.len(), "No keyframe queued, clearing buffer");
                self.queue.clear();
                self.queued_bytes = 0;
            }
        }
    }

    fn is_over_limits(&self) -> bool {
        self.queue.len() > self.limits.max_chunks || self.queued_bytes > self.limits.max_bytes
    }

    fn enforce_limits(&mut self) {
        if !self.is_over_limits() {
            return;
        }

        if !self.paused {
            warn!(
                chunks = self.queue.len(),
                bytes = self.queued_bytes,
                "Buffer limit reached, pausing publisher"
            );

            self.paused = true;
            return;
        }

        let mut dropped = 0;
        while self.is_over_limits() && self.queue.len() > 1 {
            if let Some(chunk) = self.queue.pop_front() {
                self.queued_bytes -= chunk.message.data.len() as u64;
                dropped += 1;
            }
        }

        warn!(dropped, "Buffer still over its limit, dropped oldest chunks");
    }

    fn update_pause(&mut self) {
        if !self.paused {
            return;
        }

        // Resume below 80% of both limits, or once drained when a limit is too small to have
        // an 80% mark
        let chunks_low = (self.queue.len() as u64) * 5 < (self.limits.max_chunks as u64) * 4;
        let bytes_low = self.queued_bytes * 5 < self.limits.max_bytes * 4;
        if self.queue.is_empty() || (chunks_low && bytes_low) {
            debug!(chunks = self.queue.len(), bytes = self.queued_bytes, "Resuming publisher");
            self.paused = false;
        }
    }
}

fn is_older_than(chunk: &BufferedChunk, now_ms: u64, delay_ms: u64) -> bool {
    now_ms.saturating_sub(chunk.received_at_ms) > delay_ms
}
