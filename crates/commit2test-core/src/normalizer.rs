use tracing::debug;

use crate::accumulator::{Accumulator, TextFragment};
use crate::config::ProviderFamily;
use crate::frame::{Frame, FrameDecoder, WireDecoder};

/// Turns raw chunks of either wire family into cumulative text fragments.
pub struct StreamNormalizer {
    decoder: WireDecoder,
    accumulator: Accumulator,
    complete: bool,
    unparseable: u64,
}

impl StreamNormalizer {
    pub fn new(family: ProviderFamily) -> Self {
        Self {
            decoder: WireDecoder::for_family(family),
            accumulator: Accumulator::new(),
            complete: false,
            unparseable: 0,
        }
    }

    pub fn family(&self) -> ProviderFamily {
        self.decoder.family()
    }

    /// Decodes `chunk` and returns one fragment per non-empty content frame.
    ///
    /// Once a terminator has been seen, this and every later call return
    /// nothing, including frames that followed the terminator in the same chunk.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<TextFragment> {
        if self.complete {
            return Vec::new();
        }
        let frames = self.decoder.decode(chunk);
        self.apply(frames)
    }

    /// Flushes a trailing unterminated line after the transport has ended.
    pub fn finish(&mut self) -> Vec<TextFragment> {
        if self.complete {
            return Vec::new();
        }
        let frames = self.decoder.flush();
        let fragments = self.apply(frames);
        self.complete = true;
        fragments
    }

    fn apply(&mut self, frames: Vec<Frame>) -> Vec<TextFragment> {
        let mut fragments = Vec::new();
        for frame in frames {
            match frame {
                Frame::Content { text } => {
                    if let Some(fragment) = self.accumulator.append(&text) {
                        fragments.push(fragment);
                    }
                }
                Frame::Terminator => {
                    self.complete = true;
                    break;
                }
                Frame::Unparseable { raw } => {
                    self.unparseable = self.unparseable.saturating_add(1);
                    debug!(family = %self.decoder.family(), bytes = raw.len(), "dropping unparseable frame");
                }
            }
        }
        fragments
    }

    /// True once a terminator frame was decoded or [`StreamNormalizer::finish`] ran.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Number of candidate lines that could not be parsed.
    pub fn unparseable_count(&self) -> u64 {
        self.unparseable
    }

    /// Cumulative text so far.
    pub fn cumulative(&self) -> &str {
        self.accumulator.snapshot()
    }

    /// Freezes the buffer and returns the final cumulative text.
    pub fn finalize(&mut self) -> String {
        self.complete = true;
        self.accumulator.finalize()
    }
}
