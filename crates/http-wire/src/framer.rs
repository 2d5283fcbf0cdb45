//! Length-aware splitter for pipelined HTTP messages on a byte stream.
//!
//! A message ends at CRLFCRLF unless a `Content-Length` header appears, in
//! which case it ends that many bytes later. The manager's listener sends a
//! bogus extra newline after empty-body `GET` requests, so any whitespace
//! already buffered after a complete message is attached to that message
//! rather than poisoning the next header scan.

use bytes::{Bytes, BytesMut};

use crate::classify::{content_length, header_end};
use crate::error::WireError;

/// Incremental framer over an internal receive buffer.
///
/// Feed bytes with [`extend`](Self::extend), drain whole messages with
/// [`next_frame`](Self::next_frame). A return of `Ok(None)` means more
/// bytes are needed; the buffer is only consumed when a complete frame is
/// produced.
#[derive(Debug, Default)]
pub struct HttpFramer {
    buf: BytesMut,
}

impl HttpFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A framer pre-seeded with bytes that were already read from the
    /// stream (e.g. during the login peek).
    pub fn from_bytes(buf: impl Into<BytesMut>) -> Self {
        Self { buf: buf.into() }
    }

    /// Append freshly read bytes to the receive buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Number of bytes buffered but not yet framed.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Try to produce the next whole message.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, WireError> {
        let Some(head_len) = header_end(&self.buf) else {
            return Ok(None);
        };

        let body_len = content_length(&self.buf[..head_len])?.unwrap_or(0);
        let total = head_len + body_len;
        if self.buf.len() < total {
            // Body not fully buffered yet.
            return Ok(None);
        }

        // Attach any stray whitespace that follows the message (the
        // eIDCListener empty-GET bug) up to the next non-space byte.
        let mut end = total;
        while end < self.buf.len() && self.buf[end].is_ascii_whitespace() {
            end += 1;
        }

        Ok(Some(self.buf.split_to(end).freeze()))
    }

    /// Signal end-of-stream. Errors if the stream died inside a message.
    pub fn finish(&self) -> Result<(), WireError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(WireError::Truncated {
                buffered: self.buf.len(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(framer: &mut HttpFramer) -> Vec<Bytes> {
        let mut out = Vec::new();
        while let Some(frame) = framer.next_frame().unwrap() {
            out.push(frame);
        }
        out
    }

    // -----------------------------------------------------------------------
    // splitting
    // -----------------------------------------------------------------------

    #[test]
    fn two_pipelined_headerless_messages() {
        let mut f = HttpFramer::new();
        f.extend(b"foo1\r\nbar1\r\n\r\nfoo2\r\nbar2\r\n\r\n");
        let frames = drain(&mut f);
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0][..], b"foo1\r\nbar1\r\n\r\n");
        assert_eq!(&frames[1][..], b"foo2\r\nbar2\r\n\r\n");
        assert!(f.finish().is_ok());
    }

    #[test]
    fn message_with_body_waits_for_full_body() {
        let mut f = HttpFramer::new();
        f.extend(b"POST /x HTTP/1.1\r\nContent-Length: 10\r\n\r\n12345");
        assert!(f.next_frame().unwrap().is_none());
        f.extend(b"67890");
        let frame = f.next_frame().unwrap().expect("complete frame");
        assert!(frame.ends_with(b"1234567890"));
        assert!(f.next_frame().unwrap().is_none());
    }

    #[test]
    fn trailing_whitespace_attaches_to_previous_message() {
        // The eIDCListener sends "GET ...\r\n\r\n" plus a stray "\r\n".
        let mut f = HttpFramer::new();
        f.extend(b"GET /eidc/heartbeat HTTP/1.1\r\nHost: h\r\n\r\n\r\nGET /eidc/getoutbound HTTP/1.1\r\nHost: h\r\n\r\n");
        let frames = drain(&mut f);
        assert_eq!(frames.len(), 2);
        assert!(frames[0].ends_with(b"\r\n\r\n\r\n"));
        assert!(frames[1].starts_with(b"GET /eidc/getoutbound"));
    }

    #[test]
    fn zero_length_body_header() {
        let mut f = HttpFramer::new();
        f.extend(b"GET /x HTTP/1.1\r\nContent-Length: 0\r\n\r\n");
        let frames = drain(&mut f);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn byte_at_a_time_delivery() {
        let wire = b"POST /x HTTP/1.1\r\nContent-Length: 2\r\n\r\nok";
        let mut f = HttpFramer::new();
        let mut frames = Vec::new();
        for b in wire.iter() {
            f.extend(std::slice::from_ref(b));
            while let Some(frame) = f.next_frame().unwrap() {
                frames.push(frame);
            }
        }
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &wire[..]);
    }

    // -----------------------------------------------------------------------
    // end of stream
    // -----------------------------------------------------------------------

    #[test]
    fn finish_with_partial_message_is_an_error() {
        let mut f = HttpFramer::new();
        f.extend(b"POST /x HTTP/1.1\r\nContent-Length: 10\r\n\r\nhalf");
        assert!(f.next_frame().unwrap().is_none());
        assert!(matches!(
            f.finish(),
            Err(WireError::Truncated { .. })
        ));
    }

    #[test]
    fn finish_on_clean_boundary() {
        let mut f = HttpFramer::new();
        f.extend(b"foo\r\n\r\n");
        drain(&mut f);
        assert!(f.finish().is_ok());
    }
}
