//! Typewriter playback for streamed answers.
//!
//! Decouples the rate at which the backend pushes text chunks from the rate
//! at which the UI reveals characters, so bursty network delivery doesn't
//! produce jarring jumps while the final displayed text always matches the
//! full answer. One `Playback` is owned per in-flight request; nothing here
//! lives in ambient state across requests.

/// Lifecycle of a single request's playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No request in flight.
    Idle,
    /// Stream open, no reveal tick pending (nothing undisplayed).
    Streaming,
    /// Reveal tick pending; undisplayed characters remain.
    Revealing,
    /// Terminal: everything revealed after a done frame.
    Done,
    /// Terminal: request failed, playback cancelled.
    Errored,
}

pub struct Playback {
    phase: Phase,
    buffer: String,
    revealed_bytes: usize,
    revealed_chars: usize,
    total_chars: usize,
    complete: bool,
    // Set by a done frame: the next tick reveals the whole remainder at
    // once. A preloaded fallback body is complete but plays out gradually.
    snap_on_complete: bool,
}

impl Playback {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            buffer: String::new(),
            revealed_bytes: 0,
            revealed_chars: 0,
            total_chars: 0,
            complete: false,
            snap_on_complete: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// True only while a reveal tick is pending.
    pub fn is_active(&self) -> bool {
        self.phase == Phase::Revealing
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self.phase, Phase::Streaming | Phase::Revealing)
    }

    /// The currently revealed prefix of the answer.
    pub fn revealed(&self) -> &str {
        &self.buffer[..self.revealed_bytes]
    }

    pub fn full_text(&self) -> &str {
        &self.buffer
    }

    /// Start a fresh playback for a newly opened stream.
    pub fn begin(&mut self) {
        self.phase = Phase::Streaming;
        self.buffer.clear();
        self.revealed_bytes = 0;
        self.revealed_chars = 0;
        self.total_chars = 0;
        self.complete = false;
        self.snap_on_complete = false;
    }

    /// Append a content chunk. Starts a reveal cycle if none is active.
    pub fn push_chunk(&mut self, chunk: &str) {
        if !self.is_in_flight() || chunk.is_empty() {
            return;
        }
        self.buffer.push_str(chunk);
        self.total_chars += chunk.chars().count();
        if self.phase == Phase::Streaming {
            self.phase = Phase::Revealing;
        }
    }

    /// Load an already-complete answer (non-streaming fallback). The reveal
    /// cycle then plays it back exactly like the streamed path.
    pub fn preload(&mut self, text: &str) {
        if !self.is_in_flight() {
            return;
        }
        self.push_chunk(text);
        self.complete = true;
        if self.phase == Phase::Streaming {
            self.phase = Phase::Revealing;
        }
    }

    /// Mark the buffer complete after a done frame. The snap to full length
    /// happens on the next tick, not here. Only this path snaps: a preloaded
    /// fallback body drains through the ordinary reveal steps.
    pub fn finish(&mut self, full_answer: Option<&str>) {
        if !self.is_in_flight() {
            return;
        }
        if let Some(full) = full_answer {
            // The buffer never shrinks: adopt the server's full answer only
            // when it extends what we accumulated (e.g. a dropped tail chunk).
            if full.len() > self.buffer.len() && full.starts_with(self.buffer.as_str()) {
                let tail = &full[self.buffer.len()..];
                self.buffer.push_str(tail);
                self.total_chars += tail.chars().count();
            } else if full != self.buffer {
                tracing::warn!(
                    accumulated = self.buffer.len(),
                    reported = full.len(),
                    "full_answer does not extend accumulated text; keeping accumulated"
                );
            }
        }
        self.complete = true;
        self.snap_on_complete = true;
        if self.phase == Phase::Streaming {
            self.phase = Phase::Revealing;
        }
    }

    /// Cancel playback for a failed request.
    pub fn fail(&mut self) {
        self.phase = Phase::Errored;
    }

    /// Release a terminal playback back to idle.
    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
    }

    /// One reveal tick. Returns true if the revealed text changed.
    ///
    /// Completion is re-checked here on every tick: a done frame that arrived
    /// while a tick was pending snaps the remainder in one step. A tick with
    /// nothing undisplayed and no completion deactivates the cycle.
    pub fn tick(&mut self) -> bool {
        if self.phase != Phase::Revealing {
            return false;
        }
        if self.complete && self.snap_on_complete {
            let changed = self.revealed_bytes < self.buffer.len();
            self.revealed_bytes = self.buffer.len();
            self.revealed_chars = self.total_chars;
            self.phase = Phase::Done;
            return changed;
        }
        let remaining = self.total_chars - self.revealed_chars;
        if remaining == 0 {
            self.phase = if self.complete {
                Phase::Done
            } else {
                Phase::Streaming
            };
            return false;
        }
        // Decelerating step: a large backlog converges quickly, a short tail
        // plays out one character at a time.
        let step = (remaining / 10).max(1).min(remaining);
        let advance = self.buffer[self.revealed_bytes..]
            .char_indices()
            .nth(step)
            .map(|(i, _)| i)
            .unwrap_or(self.buffer.len() - self.revealed_bytes);
        self.revealed_bytes += advance;
        self.revealed_chars += step;
        true
    }
}
