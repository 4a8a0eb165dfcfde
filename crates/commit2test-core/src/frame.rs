//! Line-oriented frame decoding for the two provider wire families.

use crate::config::ProviderFamily;

const FIELD_MARKER: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";
const CONTENT_BLOCK_DELTA: &str = "content_block_delta";

/// One decoded protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A piece of model output text.
    Content { text: String },
    /// The provider signalled the end of the stream.
    Terminator,
    /// A complete candidate line whose payload could not be parsed.
    Unparseable { raw: String },
}

/// Capability interface shared by both families.
pub trait FrameDecoder: Send {
    /// Decodes every complete line in `chunk`, buffering any trailing partial line.
    fn decode(&mut self, chunk: &[u8]) -> Vec<Frame>;

    /// Decodes whatever is left in the buffer once the transport has ended.
    fn flush(&mut self) -> Vec<Frame>;
}

/// Splits bytes into lines and keeps the unterminated tail between calls.
///
/// Buffering bytes rather than text keeps UTF-8 sequences that straddle a
/// chunk boundary intact: `\n` never occurs inside a multibyte sequence.
#[derive(Default)]
struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    fn push_chunk(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(idx) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=idx).collect();
            lines.push(decode_line(&line[..idx]));
        }
        lines
    }

    fn take_rest(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(decode_line(&rest))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\r')
        .to_string()
}

/// Returns the payload of a `data:` line, or `None` for any other line.
fn candidate_payload(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix(FIELD_MARKER)?;
    let payload = rest.strip_prefix(' ').unwrap_or(rest).trim_end();
    if payload.is_empty() {
        None
    } else {
        Some(payload)
    }
}

/// Decoder for the delta-style family (`choices[0].delta.content`, `[DONE]`).
#[derive(Default)]
pub struct DeltaStyleDecoder {
    lines: LineBuffer,
}

impl DeltaStyleDecoder {
    fn decode_line(line: &str) -> Option<Frame> {
        let payload = candidate_payload(line)?;
        if payload == DONE_SENTINEL {
            return Some(Frame::Terminator);
        }
        let value: serde_json::Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(_) => {
                return Some(Frame::Unparseable {
                    raw: payload.to_string(),
                });
            }
        };
        value
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("delta"))
            .and_then(|d| d.get("content"))
            .and_then(|v| v.as_str())
            .filter(|text| !text.is_empty())
            .map(|text| Frame::Content {
                text: text.to_string(),
            })
    }
}

impl FrameDecoder for DeltaStyleDecoder {
    fn decode(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.lines
            .push_chunk(chunk)
            .iter()
            .filter_map(|line| Self::decode_line(line))
            .collect()
    }

    fn flush(&mut self) -> Vec<Frame> {
        self.lines
            .take_rest()
            .and_then(|line| Self::decode_line(&line))
            .into_iter()
            .collect()
    }
}

/// Decoder for the content-block family (`type == "content_block_delta"`).
#[derive(Default)]
pub struct ContentBlockDecoder {
    lines: LineBuffer,
}

impl ContentBlockDecoder {
    fn decode_line(line: &str) -> Option<Frame> {
        let payload = candidate_payload(line)?;
        let value: serde_json::Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(_) => {
                return Some(Frame::Unparseable {
                    raw: payload.to_string(),
                });
            }
        };
        if value.get("type").and_then(|v| v.as_str()) != Some(CONTENT_BLOCK_DELTA) {
            return None;
        }
        value
            .get("delta")
            .and_then(|d| d.get("text"))
            .and_then(|v| v.as_str())
            .filter(|text| !text.is_empty())
            .map(|text| Frame::Content {
                text: text.to_string(),
            })
    }
}

impl FrameDecoder for ContentBlockDecoder {
    fn decode(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.lines
            .push_chunk(chunk)
            .iter()
            .filter_map(|line| Self::decode_line(line))
            .collect()
    }

    fn flush(&mut self) -> Vec<Frame> {
        self.lines
            .take_rest()
            .and_then(|line| Self::decode_line(&line))
            .into_iter()
            .collect()
    }
}

/// Decoder selected once per session from its provider family.
pub enum WireDecoder {
    DeltaStyle(DeltaStyleDecoder),
    ContentBlock(ContentBlockDecoder),
}

impl WireDecoder {
    pub fn for_family(family: ProviderFamily) -> Self {
        match family {
            ProviderFamily::DeltaStyle => Self::DeltaStyle(DeltaStyleDecoder::default()),
            ProviderFamily::ContentBlock => Self::ContentBlock(ContentBlockDecoder::default()),
        }
    }

    pub fn family(&self) -> ProviderFamily {
        match self {
            Self::DeltaStyle(_) => ProviderFamily::DeltaStyle,
            Self::ContentBlock(_) => ProviderFamily::ContentBlock,
        }
    }

    fn inner(&mut self) -> &mut dyn FrameDecoder {
        match self {
            Self::DeltaStyle(decoder) => decoder,
            Self::ContentBlock(decoder) => decoder,
        }
    }
}

impl FrameDecoder for WireDecoder {
    fn decode(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.inner().decode(chunk)
    }

    fn flush(&mut self) -> Vec<Frame> {
        self.inner().flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(text: &str) -> Frame {
        Frame::Content {
            text: text.to_string(),
        }
    }

    #[test]
    fn delta_style_decodes_content_and_done() {
        let mut decoder = DeltaStyleDecoder::default();
        let frames = decoder.decode(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n",
        );
        assert_eq!(frames, vec![content("Hi"), Frame::Terminator]);
    }

    #[test]
    fn delta_style_ignores_role_only_and_non_data_lines() {
        let mut decoder = DeltaStyleDecoder::default();
        let frames = decoder.decode(
            b": keep-alive\nevent: ping\ndata: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n",
        );
        assert!(frames.is_empty());
    }

    #[test]
    fn split_json_line_is_buffered_across_chunks() {
        let mut decoder = DeltaStyleDecoder::default();
        assert!(decoder.decode(b"data: {\"choi").is_empty());
        let frames = decoder.decode(b"ces\":[{\"delta\":{\"content\":\"ok\"}}]}\n");
        assert_eq!(frames, vec![content("ok")]);
    }

    #[test]
    fn split_multibyte_character_survives_chunk_boundary() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"需求\"}}]}\n".as_bytes();
        let cut = line
            .iter()
            .position(|b| *b >= 0x80)
            .expect("multibyte byte")
            + 1;
        let mut decoder = DeltaStyleDecoder::default();
        assert!(decoder.decode(&line[..cut]).is_empty());
        assert_eq!(decoder.decode(&line[cut..]), vec![content("需求")]);
    }

    #[test]
    fn malformed_complete_line_is_unparseable() {
        let mut decoder = DeltaStyleDecoder::default();
        let frames = decoder.decode(b"data: {not json}\r\n");
        assert_eq!(
            frames,
            vec![Frame::Unparseable {
                raw: "{not json}".to_string()
            }]
        );
    }

    #[test]
    fn flush_decodes_unterminated_tail() {
        let mut decoder = DeltaStyleDecoder::default();
        assert!(
            decoder
                .decode(b"data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}")
                .is_empty()
        );
        assert_eq!(decoder.flush(), vec![content("tail")]);
        assert!(decoder.flush().is_empty());
    }

    #[test]
    fn content_block_only_emits_delta_events() {
        let mut decoder = ContentBlockDecoder::default();
        let stream = concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{\"id\":\"m1\"}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"用例\"}}\n\n",
            "event: message_stop\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        );
        let frames = decoder.decode(stream.as_bytes());
        assert_eq!(frames, vec![content("用例")]);
    }

    #[test]
    fn content_block_has_no_sentinel() {
        let mut decoder = ContentBlockDecoder::default();
        let frames = decoder.decode(b"data: [DONE]\n");
        assert!(matches!(frames.as_slice(), [Frame::Unparseable { .. }]));
    }

    #[test]
    fn wire_decoder_dispatches_by_family() {
        let mut decoder = WireDecoder::for_family(ProviderFamily::ContentBlock);
        assert_eq!(decoder.family(), ProviderFamily::ContentBlock);
        let frames = decoder.decode(
            b"data: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\"x\"}}\n",
        );
        assert_eq!(frames, vec![content("x")]);
    }
}
