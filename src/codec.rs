use bytes::{Buf, BytesMut};
use encoding_rs::{Decoder as CharsetDecoder, Encoding};
use std::io;
use tokio_util::codec::Decoder;

/// Re-encodes an arbitrary charset byte stream as UTF-8 for the CSV reader.
pub struct Transcoder {
    decoder: CharsetDecoder,
}

impl Transcoder {
    pub fn new(encoding: &'static Encoding) -> Self {
        Self {
            decoder: encoding.new_decoder(),
        }
    }

    fn transcode(&mut self, src: &mut BytesMut, last: bool) -> Option<BytesMut> {
        let capacity = self
            .decoder
            .max_utf8_buffer_length(src.len())
            .unwrap_or(src.len() * 3 + 16);
        let mut out = vec![0u8; capacity];

        // malformed sequences become U+FFFD; the CSV layer treats fields as opaque text
        let (_result, read, written, _replaced) = self.decoder.decode_to_utf8(&src[..], &mut out, last);

        src.advance(read);
        out.truncate(written);
        (!out.is_empty()).then(|| BytesMut::from(&out[..]))
    }
}

impl Decoder for Transcoder {
    type Item = BytesMut;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        // an incomplete trailing sequence is kept inside the decoder until more bytes arrive
        Ok(self.transcode(src, false))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let out = self.transcode(buf, true);
        buf.clear();
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteState {
    FieldStart,
    Unquoted,
    Quoted,
    /// A `"` inside a quoted field: either an escape or the closing quote.
    QuoteInQuoted,
}

/// Pass-through `Decoder` that enforces RFC 4180 quoting.
///
/// The CSV reader accepts a bare `"` inside an unquoted field and lets an
/// unterminated quoted field run to EOF. Both are rejected here with
/// `InvalidData`. Bytes before the offending one are still handed on, so every
/// complete record ahead of it decodes normally.
pub struct QuoteCheck {
    delimiter: u8,
    state: QuoteState,
    line: u64,
    failed: Option<String>,
    finished: bool,
}

impl QuoteCheck {
    pub fn new(delimiter: u8) -> Self {
        Self {
            delimiter,
            state: QuoteState::FieldStart,
            line: 1,
            failed: None,
            finished: false,
        }
    }

    fn step(&mut self, b: u8) -> Result<(), String> {
        use QuoteState::*;

        let d = self.delimiter;
        self.state = match (self.state, b) {
            (Quoted, b'"') => QuoteInQuoted,
            (Quoted, _) => Quoted,
            (QuoteInQuoted, b'"') => Quoted,
            (FieldStart, b'"') => Quoted,
            (Unquoted, b'"') => {
                return Err(format!("line {}: bare \" in non-quoted field", self.line))
            }
            (_, x) if x == d || x == b'\r' || x == b'\n' => FieldStart,
            (QuoteInQuoted, _) => {
                return Err(format!(
                    "line {}: extraneous or missing \" in quoted field",
                    self.line
                ))
            }
            (FieldStart | Unquoted, _) => Unquoted,
        };
        if b == b'\n' {
            self.line += 1;
        }
        Ok(())
    }
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

impl Decoder for QuoteCheck {
    type Item = BytesMut;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(msg) = self.failed.take() {
            return Err(invalid(msg));
        }
        if src.is_empty() {
            return Ok(None);
        }
        for i in 0..src.len() {
            if let Err(msg) = self.step(src[i]) {
                if i == 0 {
                    return Err(invalid(msg));
                }
                // release the clean prefix now, fail on the next call
                self.failed = Some(msg);
                return Ok(Some(src.split_to(i)));
            }
        }
        Ok(Some(src.split()))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(out) = self.decode(buf)? {
            return Ok(Some(out));
        }
        if !self.finished && self.state == QuoteState::Quoted {
            self.finished = true;
            return Err(invalid(format!(
                "line {}: unterminated quoted field at end of input",
                self.line
            )));
        }
        Ok(None)
    }
}
