//! Byte-stream framing: buffers arbitrary reads and yields complete lines.
//!
//! Tolerant of `CRLF`, bare `LF`, and bare `CR` terminators (SPEC_FULL.md
//! §4.A), since real-world servers and bouncers are not always strict about
//! CRLF. Empty lines (two terminators back to back) are discarded rather
//! than yielded as empty messages.

/// Accumulates bytes from a transport and splits them into lines.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> LineDecoder {
        LineDecoder { buf: Vec::new() }
    }

    /// Append newly-read bytes to the internal buffer.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete, non-empty line, if one is available.
    ///
    /// Call this in a loop after each `feed` until it returns `None`: a
    /// single read can contain more than one line, and a read can also
    /// complete zero lines (a partial line stays buffered).
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let mut terminator = None;
            for i in 0..self.buf.len() {
                match self.buf[i] {
                    b'\n' => {
                        terminator = Some((i, 1));
                        break;
                    }
                    b'\r' => {
                        match self.buf.get(i + 1) {
                            Some(b'\n') => terminator = Some((i, 2)),
                            Some(_) => terminator = Some((i, 1)),
                            // Last byte in the buffer: could be a bare CR, or
                            // the first half of a CRLF that hasn't arrived
                            // yet. Wait for more data rather than guess.
                            None => return None,
                        }
                        break;
                    }
                    _ => {}
                }
            }

            let (pos, term_len) = terminator?;
            let mut removed: Vec<u8> = self.buf.drain(0..pos + term_len).collect();
            removed.truncate(pos);
            if removed.is_empty() {
                continue;
            }
            return Some(String::from_utf8_lossy(&removed).into_owned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_one_line_per_terminator_and_buffers_the_rest() {
        let mut dec = LineDecoder::new();
        dec.feed(b"A\nB\rC\r\nD");
        assert_eq!(dec.next_line().as_deref(), Some("A"));
        assert_eq!(dec.next_line().as_deref(), Some("B"));
        assert_eq!(dec.next_line().as_deref(), Some("C"));
        assert_eq!(dec.next_line(), None);
        dec.feed(b"\r\n");
        assert_eq!(dec.next_line().as_deref(), Some("D"));
    }

    #[test]
    fn discards_empty_lines() {
        let mut dec = LineDecoder::new();
        dec.feed(b"\r\n\r\nPING :x\r\n");
        assert_eq!(dec.next_line().as_deref(), Some("PING :x"));
        assert_eq!(dec.next_line(), None);
    }

    #[test]
    fn holds_a_dangling_cr_until_more_data_arrives() {
        let mut dec = LineDecoder::new();
        dec.feed(b"PING :x\r");
        assert_eq!(dec.next_line(), None);
        dec.feed(b"\n");
        assert_eq!(dec.next_line().as_deref(), Some("PING :x"));
    }

    #[test]
    fn splits_across_multiple_feeds() {
        let mut dec = LineDecoder::new();
        dec.feed(b"PRIV");
        assert_eq!(dec.next_line(), None);
        dec.feed(b"MSG #rust :hi\r\n");
        assert_eq!(dec.next_line().as_deref(), Some("PRIVMSG #rust :hi"));
    }
}
