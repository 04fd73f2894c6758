use tracing::warn;

use crate::domain::models::{ChunkPayload, Frame, DONE_SENTINEL, FRAME_PREFIX};

/// Incremental decoder for `data:`-framed event streams.
///
/// Chunks may split a frame anywhere, including inside a multi-byte UTF-8
/// sequence, or carry several frames at once. Bytes after the last newline are
/// kept until the next call. Lines are only decoded once complete, so the
/// concatenated delta text never depends on where the chunk boundaries fell.
///
/// Once the `[DONE]` sentinel has been seen the parser yields nothing more.
#[derive(Debug, Default)]
pub struct FrameParser {
    buffer: Vec<u8>,
    finished: bool,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return the complete frames now available.
    ///
    /// The iterator is lazy: frames it does not get to yield stay buffered and
    /// come out of the next `feed` or `finish` call.
    pub fn feed(&mut self, chunk: &[u8]) -> Frames<'_> {
        if !self.finished {
            self.buffer.extend_from_slice(chunk);
        }
        Frames {
            parser: self,
            flush: false,
        }
    }

    /// Treat the end of input as a line terminator and drain what is left.
    pub fn finish(&mut self) -> Frames<'_> {
        Frames {
            parser: self,
            flush: true,
        }
    }

    /// Whether the terminal sentinel has been decoded.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    fn next_line(&mut self, flush: bool) -> Option<String> {
        let raw = match self.buffer.iter().position(|b| *b == b'\n') {
            Some(end) => {
                let mut line: Vec<u8> = self.buffer.drain(..=end).collect();
                line.pop();
                line
            }
            None if flush && !self.buffer.is_empty() => std::mem::take(&mut self.buffer),
            None => return None,
        };
        let text = String::from_utf8_lossy(&raw);
        Some(text.trim_end_matches('\r').to_string())
    }
}

/// Lazy sequence of complete frames produced by one [`FrameParser`] call.
pub struct Frames<'a> {
    parser: &'a mut FrameParser,
    flush: bool,
}

impl Iterator for Frames<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        if self.parser.finished {
            return None;
        }
        while let Some(line) = self.parser.next_line(self.flush) {
            if let Some(frame) = decode_line(&line) {
                if frame.is_done() {
                    self.parser.finished = true;
                    self.parser.buffer.clear();
                }
                return Some(frame);
            }
        }
        None
    }
}

/// Decode one line. Lines without the `data:` prefix (comments, `event:`
/// fields, blank separators), chunks with no content and undecodable
/// payloads yield nothing.
fn decode_line(line: &str) -> Option<Frame> {
    let payload = line.strip_prefix(FRAME_PREFIX)?.trim();
    if payload.is_empty() {
        return None;
    }
    if payload == DONE_SENTINEL {
        return Some(Frame::Done);
    }

    match serde_json::from_str::<ChunkPayload>(payload) {
        Ok(chunk) => match chunk.error_message() {
            Some(message) => Some(Frame::Error(message)),
            None => chunk.content().map(Frame::Delta),
        },
        Err(e) => {
            warn!("Dropping malformed frame ({}): {}", e, payload);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIECES: [&str; 5] = ["He", "llo", "!", " héllo wörld ", "😀 done"];

    fn wire() -> Vec<u8> {
        let mut out = String::from(": keep-alive\n\n");
        for piece in PIECES {
            out.push_str(&Frame::delta(piece).encode());
        }
        out.push_str("data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n");
        out.push_str(&Frame::Done.encode());
        out.into_bytes()
    }

    fn collect_text(parser: &mut FrameParser, chunks: &[&[u8]]) -> (String, bool) {
        let mut text = String::new();
        let mut saw_done = false;
        let mut absorb = |frame: Frame| match frame {
            Frame::Delta(d) => text.push_str(&d),
            Frame::Done => saw_done = true,
            other => panic!("unexpected frame {other:?}"),
        };
        for chunk in chunks {
            parser.feed(chunk).for_each(&mut absorb);
        }
        parser.finish().for_each(&mut absorb);
        (text, saw_done)
    }

    #[test]
    fn reassembly_is_invariant_under_any_single_split() {
        let bytes = wire();
        let expected: String = PIECES.concat();

        for split in 0..=bytes.len() {
            let mut parser = FrameParser::new();
            let (text, done) = collect_text(&mut parser, &[&bytes[..split], &bytes[split..]]);
            assert_eq!(text, expected, "split at byte {split}");
            assert!(done, "split at byte {split}");
        }
    }

    #[test]
    fn reassembly_survives_byte_at_a_time_and_uneven_chunks() {
        let bytes = wire();
        let expected: String = PIECES.concat();

        let singles: Vec<&[u8]> = bytes.chunks(1).collect();
        let (text, _) = collect_text(&mut FrameParser::new(), &singles);
        assert_eq!(text, expected);

        for size in [2, 3, 7, 13, 64] {
            let chunks: Vec<&[u8]> = bytes.chunks(size).collect();
            let (text, done) = collect_text(&mut FrameParser::new(), &chunks);
            assert_eq!(text, expected, "chunk size {size}");
            assert!(done);
        }
    }

    #[test]
    fn several_frames_in_one_chunk() {
        let mut parser = FrameParser::new();
        let frames: Vec<Frame> = parser.feed(&wire()).collect();
        assert_eq!(
            frames,
            vec![
                Frame::delta("He"),
                Frame::delta("llo"),
                Frame::delta("!"),
                Frame::delta(" héllo wörld "),
                Frame::delta("😀 done"),
                Frame::Done,
            ]
        );
        assert!(parser.is_finished());
    }

    #[test]
    fn malformed_lines_do_not_abort_the_stream() {
        let mut parser = FrameParser::new();
        let input = b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\
                      data: {not json\n\
                      data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n";
        let frames: Vec<Frame> = parser.feed(input).collect();
        assert_eq!(frames, vec![Frame::delta("a"), Frame::delta("b")]);
    }

    #[test]
    fn partial_trailing_line_is_carried_over() {
        let mut parser = FrameParser::new();
        let encoded = Frame::delta("carry").encode();
        let (head, tail) = encoded.as_bytes().split_at(20);

        assert_eq!(parser.feed(head).count(), 0);
        assert_eq!(parser.buffered_len(), 20);
        assert_eq!(parser.feed(tail).collect::<Vec<_>>(), vec![Frame::delta("carry")]);
    }

    #[test]
    fn unread_frames_come_out_of_the_next_call() {
        let mut parser = FrameParser::new();
        let mut input = Frame::delta("one").encode();
        input.push_str(&Frame::delta("two").encode());
        input.push_str(&Frame::delta("three").encode());

        let first = parser.feed(input.as_bytes()).next();
        assert_eq!(first, Some(Frame::delta("one")));

        let rest: Vec<Frame> = parser.feed(b"").collect();
        assert_eq!(rest, vec![Frame::delta("two"), Frame::delta("three")]);
    }

    #[test]
    fn nothing_is_yielded_after_the_sentinel() {
        let mut parser = FrameParser::new();
        let mut input = Frame::Done.encode();
        input.push_str(&Frame::delta("late").encode());

        assert_eq!(parser.feed(input.as_bytes()).collect::<Vec<_>>(), vec![Frame::Done]);
        assert_eq!(parser.feed(Frame::delta("later").encode().as_bytes()).count(), 0);
        assert_eq!(parser.finish().count(), 0);
    }

    #[test]
    fn crlf_lines_and_error_frames() {
        let mut parser = FrameParser::new();
        let input = b"data: {\"error\":true,\"message\":\"upstream unreachable\"}\r\n\r\ndata: [DONE]\r\n";
        let frames: Vec<Frame> = parser.feed(input).collect();
        assert_eq!(
            frames,
            vec![Frame::error("upstream unreachable"), Frame::Done]
        );
    }

    #[test]
    fn finish_flushes_an_unterminated_last_line() {
        let mut parser = FrameParser::new();
        let encoded = Frame::delta("tail").encode();
        let unterminated = encoded.trim_end();

        assert_eq!(parser.feed(unterminated.as_bytes()).count(), 0);
        assert_eq!(parser.finish().collect::<Vec<_>>(), vec![Frame::delta("tail")]);
    }
}
