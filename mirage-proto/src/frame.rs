//! BLE message framing
//!
//! Every message on the request/response characteristics ends with the
//! two-byte marker `0x00 0x00`. To keep that marker unambiguous, a payload
//! `0x00` that is followed by `0x00` or `0x01` gets a `0x01` escape byte
//! inserted after it. Framing is applied after encryption on the way out and
//! removed before decryption on the way in.

/// End-of-message marker
pub const TERMINATOR: [u8; 2] = [0x00, 0x00];

/// Escape byte inserted after a `0x00`
pub const ESCAPE: u8 = 0x01;

/// Upper bound for a reassembled frame. Camera replies are a few KiB at most.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FramingError {
    #[error("frame too short: {0} bytes")]
    TooShort(usize),
    #[error("no end-of-message marker found")]
    MissingTerminator,
    #[error("frame exceeds {MAX_FRAME_SIZE} bytes without a terminator")]
    Oversized,
}

/// Escape `payload` and append the terminator.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + payload.len() / 16 + TERMINATOR.len());
    let mut prev: Option<u8> = None;

    for &byte in payload {
        if prev == Some(0x00) && (byte == 0x00 || byte == ESCAPE) {
            out.push(ESCAPE);
        }
        out.push(byte);
        prev = Some(byte);
    }

    out.extend_from_slice(&TERMINATOR);
    out
}

/// Strip the terminator and drop the escape bytes added by [`encode`].
pub fn decode(frame: &[u8]) -> Result<Vec<u8>, FramingError> {
    if frame.len() < TERMINATOR.len() {
        return Err(FramingError::TooShort(frame.len()));
    }
    let (body, marker) = frame.split_at(frame.len() - TERMINATOR.len());
    if marker != TERMINATOR {
        return Err(FramingError::MissingTerminator);
    }

    let mut out = Vec::with_capacity(body.len());
    for (i, &byte) in body.iter().enumerate() {
        // In an encoded body a 0x00 is never followed by a literal 0x01
        if i > 0 && body[i - 1] == 0x00 && byte == ESCAPE {
            continue;
        }
        out.push(byte);
    }
    Ok(out)
}

/// Joins notification chunks into complete frames.
///
/// A notification usually carries a whole frame, but long replies can be
/// split across several notifications. Chunks are buffered until the buffer
/// ends with the terminator.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buffer: Vec<u8>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one notification. Returns the complete raw frame (terminator
    /// included) once one is available.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Option<Vec<u8>>, FramingError> {
        if chunk.is_empty() {
            return Ok(None);
        }

        self.buffer.extend_from_slice(chunk);

        if self.buffer.len() >= TERMINATOR.len() && self.buffer.ends_with(&TERMINATOR) {
            return Ok(Some(std::mem::take(&mut self.buffer)));
        }

        if self.buffer.len() > MAX_FRAME_SIZE {
            self.buffer.clear();
            return Err(FramingError::Oversized);
        }

        Ok(None)
    }

    /// Bytes received so far for an incomplete frame
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(512))]

        #[test]
        fn decode_inverts_encode(payload in proptest::collection::vec(
            prop_oneof![Just(0x00u8), Just(0x01u8), any::<u8>()],
            0..256,
        )) {
            prop_assert_eq!(decode(&encode(&payload)).unwrap(), payload);
        }
    }
}
