use bytes::BytesMut;
use tracing::trace;

use crate::error::ProtocolError;
use crate::retina::{RetinaEvent, RetinaEventFormat};

/// One unit recovered from the robot byte stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Event(RetinaEvent),
    /// A text line without its terminator
    Line(String),
    Malformed(ProtocolError),
}

/// Bytes that belong to the text side of the stream: printable ASCII plus
/// the usual whitespace controls.
pub fn is_text_byte(byte: u8) -> bool {
    matches!(byte, 0x20..=0x7e | b'\n' | b'\r' | b'\t')
}

/// Splits socket chunks into retina frames and ASCII lines.
///
/// State carried between chunks is the incomplete trailing frame and the
/// text of the current unfinished line, so the output does not depend on
/// how the stream was chunked. Use one classifier per connection and call
/// [`reset`](Self::reset) on reconnect.
#[derive(Debug, Clone)]
pub struct StreamFrameClassifier {
    format: RetinaEventFormat,
    pending_binary_tail: BytesMut,
    pending_ascii_tail: String,
}

impl StreamFrameClassifier {
    pub fn new(format: RetinaEventFormat) -> Self {
        Self {
            format,
            pending_binary_tail: BytesMut::with_capacity(format.frame_size()),
            pending_ascii_tail: String::new(),
        }
    }

    pub fn format(&self) -> &RetinaEventFormat {
        &self.format
    }

    pub fn pending_binary_tail(&self) -> &[u8] {
        &self.pending_binary_tail
    }

    pub fn pending_ascii_tail(&self) -> &str {
        &self.pending_ascii_tail
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamItem> {
        let frame_size = self.format.frame_size();
        self.pending_binary_tail.extend_from_slice(chunk);
        let data = self.pending_binary_tail.split();

        let mut items = Vec::new();
        let mut pos = 0;
        while pos < data.len() {
            let byte = data[pos];
            if is_text_byte(byte) {
                self.push_text(byte, &mut items);
                pos += 1;
                continue;
            }

            let Some(frame) = data.get(pos..pos + frame_size) else {
                self.pending_binary_tail.extend_from_slice(&data[pos..]);
                break;
            };
            match self.format.decode(frame) {
                Ok(Some(event)) => items.push(StreamItem::Event(event)),
                Ok(None) => trace!(frame = %hex::encode(frame), "Event dropped by polarity filter"),
                Err(e) => items.push(StreamItem::Malformed(e)),
            }
            pos += frame_size;
        }
        items
    }

    fn push_text(&mut self, byte: u8, items: &mut Vec<StreamItem>) {
        if byte == b'\n' {
            let mut line = std::mem::take(&mut self.pending_ascii_tail);
            if line.ends_with('\r') {
                line.pop();
            }
            items.push(StreamItem::Line(line));
        } else {
            self.pending_ascii_tail.push(char::from(byte));
        }
    }

    /// Drop all carried state.
    pub fn reset(&mut self) {
        self.pending_binary_tail.clear();
        self.pending_ascii_tail.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> StreamFrameClassifier {
        StreamFrameClassifier::new(RetinaEventFormat::default())
    }

    fn events(items: &[StreamItem]) -> usize {
        items.iter().filter(|item| matches!(item, StreamItem::Event(_))).count()
    }

    #[test]
    fn test_trailing_frame_is_carried() {
        let mut classifier = classifier();
        let items = classifier.feed(&[0x81, 0x41, 0x02]);
        assert_eq!(events(&items), 1);
        assert_eq!(classifier.pending_binary_tail(), &[0x02]);

        let items = classifier.feed(&[0x55]);
        assert_eq!(items.len(), 1);
        let StreamItem::Event(event) = &items[0] else {
            panic!("expected an event, got {items:?}");
        };
        assert_eq!((event.x, event.y), (0x55, 0x02));
        assert!(classifier.pending_binary_tail().is_empty());
    }

    #[test]
    fn test_lines_are_split_and_stripped() {
        let mut classifier = classifier();
        let items = classifier.feed(b"OK\r\nACK\npart");
        assert_eq!(
            items,
            vec![StreamItem::Line("OK".to_string()), StreamItem::Line("ACK".to_string())]
        );
        assert_eq!(classifier.pending_ascii_tail(), "part");
        let items = classifier.feed(b"ial\n");
        assert_eq!(items, vec![StreamItem::Line("partial".to_string())]);
    }

    #[test]
    fn test_frame_inside_text_run() {
        let mut classifier = classifier();
        let items = classifier.feed(&[b'A', 0x80, 0x01, b'B', b'\n']);
        assert_eq!(events(&items), 1);
        assert_eq!(items.last(), Some(&StreamItem::Line("AB".to_string())));
    }

    #[test]
    fn test_malformed_frame_is_skipped() {
        let format = RetinaEventFormat::new(
            crate::retina::RetinaResolution::Downsample16,
            crate::retina::RetinaPolarity::Merged,
            None,
        )
        .unwrap();
        let mut classifier = StreamFrameClassifier::new(format);
        let items = classifier.feed(&[0xff, 0x7f, 0x81, 0x01]);
        assert!(matches!(items[0], StreamItem::Malformed(ProtocolError::MalformedFrame { .. })));
        assert!(matches!(items[1], StreamItem::Event(_)));
    }

    #[test]
    fn test_reset_discards_state() {
        let mut classifier = classifier();
        classifier.feed(&[b'x', 0x81]);
        classifier.reset();
        assert!(classifier.pending_binary_tail().is_empty());
        assert!(classifier.pending_ascii_tail().is_empty());
        assert!(classifier.feed(b"\n") == vec![StreamItem::Line(String::new())]);
    }
}
