//! Fixed-window buffering of transcript events.

use super::TranscriptEvent;

/// Default number of events per batch.
pub const DEFAULT_BATCH_SIZE: usize = 6;

/// Ordered events drained from the batcher in one piece.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub events: Vec<TranscriptEvent>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Text submitted to the reasoning engine, one utterance per line.
    pub fn text(&self) -> String {
        self.events
            .iter()
            .map(TranscriptEvent::as_line)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Pure buffer: no knowledge of reasoning or dispatch.
#[derive(Debug)]
pub struct TranscriptBatcher {
    window: usize,
    buffer: Vec<TranscriptEvent>,
}

impl TranscriptBatcher {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            buffer: Vec::with_capacity(window),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Append an event. Returns true once the window is full.
    pub fn ingest(&mut self, event: TranscriptEvent) -> bool {
        self.buffer.push(event);
        self.is_full()
    }

    pub fn is_full(&self) -> bool {
        self.buffer.len() >= self.window
    }

    /// Drain the buffer, full or partial.
    pub fn take_batch(&mut self) -> Batch {
        let events = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.window));
        Batch { events }
    }
}

impl Default for TranscriptBatcher {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}
