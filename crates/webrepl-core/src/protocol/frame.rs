//! Binary codec for WebREPL file-transfer frames.
//!
//! Request wire format (always 82 bytes):
//! ```text
//! ["WA":2][opcode:1][reserved:1][reserved:8][file_size:4][name_len:2][name:64]
//! ```
//! Response wire format (4 bytes):
//! ```text
//! ["WB":2][status:2]
//! ```
//! All multi-byte integers are little-endian.  The name field is UTF-8,
//! zero-padded on the right, and truncated to 64 bytes.

use thiserror::Error;

/// Two-byte signature opening every client request.
pub const REQUEST_SIGNATURE: [u8; 2] = *b"WA";

/// Two-byte signature opening every device response.
pub const RESPONSE_SIGNATURE: [u8; 2] = *b"WB";

/// Width of the inline filename field.
pub const NAME_FIELD_LEN: usize = 64;

/// Bytes in the fixed part of a request frame, before the filename field.
pub const REQUEST_HEADER_LEN: usize = 18;

/// Total encoded size of a request frame.
pub const REQUEST_FRAME_LEN: usize = REQUEST_HEADER_LEN + NAME_FIELD_LEN;

/// Total encoded size of a response frame.
pub const RESPONSE_FRAME_LEN: usize = 4;

/// Payload chunk size for PUT transfers.  Never varies mid-transfer.
pub const CHUNK_SIZE: usize = 1024;

/// Conservative default upload limit for an ESP8266 heap.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 8 * 1024;

/// Errors that can occur while decoding a frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The byte slice is shorter than the fixed frame size.
    #[error("insufficient data: need {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The first two bytes are not the expected signature.
    #[error("bad signature: {0:02X?}")]
    BadSignature([u8; 2]),

    /// The opcode byte is not PUT or GET.
    #[error("unknown opcode: 0x{0:02X}")]
    UnknownOpcode(u8),

    /// The declared name length is larger than the name field.
    #[error("name length {0} exceeds the {NAME_FIELD_LEN}-byte field")]
    NameTooLong(usize),

    /// The filename bytes are not valid UTF-8.
    #[error("filename is not valid UTF-8")]
    InvalidName,
}

/// Operation requested by a transfer frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Upload a file to the device.
    Put = 1,
    /// Download a file from the device.
    Get = 2,
}

impl TryFrom<u8> for Opcode {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Opcode::Put),
            2 => Ok(Opcode::Get),
            other => Err(FrameError::UnknownOpcode(other)),
        }
    }
}

/// Status code carried by a `"WB"` response.  Zero means success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResponseCode(pub u16);

impl ResponseCode {
    /// The code the device sends when an operation succeeded.
    pub const OK: ResponseCode = ResponseCode(0);

    /// Returns `true` when the device reported success.
    pub fn is_success(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A request record sent to the device to start a PUT or GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferFrame {
    pub opcode: Opcode,
    /// Size of the file being uploaded; zero for downloads.
    pub file_size: u32,
    /// Remote path.  `/` separators make the device create directories.
    pub name: String,
}

impl TransferFrame {
    /// Builds a PUT request for `name` carrying `file_size` bytes.
    pub fn put(name: impl Into<String>, file_size: u32) -> Self {
        Self {
            opcode: Opcode::Put,
            file_size,
            name: name.into(),
        }
    }

    /// Builds a GET request for `name`.
    pub fn get(name: impl Into<String>) -> Self {
        Self {
            opcode: Opcode::Get,
            file_size: 0,
            name: name.into(),
        }
    }

    /// Returns the filename bytes as they will appear on the wire.
    ///
    /// Names longer than the field are cut at the last UTF-8 character
    /// boundary that fits, so the device never sees a split code point.
    pub fn wire_name(&self) -> &[u8] {
        let bytes = self.name.as_bytes();
        if bytes.len() <= NAME_FIELD_LEN {
            return bytes;
        }
        let mut end = NAME_FIELD_LEN;
        while !self.name.is_char_boundary(end) {
            end -= 1;
        }
        &bytes[..end]
    }

    /// Encodes the frame into its fixed 82-byte representation.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use webrepl_core::protocol::frame::{TransferFrame, REQUEST_FRAME_LEN};
    ///
    /// let bytes = TransferFrame::put("main.py", 500).encode();
    /// assert_eq!(bytes.len(), REQUEST_FRAME_LEN);
    /// assert_eq!(&bytes[..2], b"WA");
    /// ```
    pub fn encode(&self) -> [u8; REQUEST_FRAME_LEN] {
        let mut buf = [0u8; REQUEST_FRAME_LEN];
        let name = self.wire_name();

        buf[0..2].copy_from_slice(&REQUEST_SIGNATURE);
        buf[2] = self.opcode as u8;
        // buf[3] and buf[4..12] are reserved and stay zero
        buf[12..16].copy_from_slice(&self.file_size.to_le_bytes());
        buf[16..18].copy_from_slice(&(name.len() as u16).to_le_bytes());
        buf[REQUEST_HEADER_LEN..REQUEST_HEADER_LEN + name.len()].copy_from_slice(name);
        buf
    }

    /// Decodes a request frame from the start of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError`] if the bytes are short, carry the wrong
    /// signature or opcode, or hold an invalid filename.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < REQUEST_FRAME_LEN {
            return Err(FrameError::InsufficientData {
                needed: REQUEST_FRAME_LEN,
                available: bytes.len(),
            });
        }

        let signature = [bytes[0], bytes[1]];
        if signature != REQUEST_SIGNATURE {
            return Err(FrameError::BadSignature(signature));
        }

        let opcode = Opcode::try_from(bytes[2])?;
        let file_size = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
        let name_len = u16::from_le_bytes([bytes[16], bytes[17]]) as usize;
        if name_len > NAME_FIELD_LEN {
            return Err(FrameError::NameTooLong(name_len));
        }

        let name_bytes = &bytes[REQUEST_HEADER_LEN..REQUEST_HEADER_LEN + name_len];
        let name = std::str::from_utf8(name_bytes)
            .map_err(|_| FrameError::InvalidName)?
            .to_string();

        Ok(Self {
            opcode,
            file_size,
            name,
        })
    }
}

/// Encodes a `"WB"` response frame.  The client never sends these; the
/// scripted test link uses it to play the device's side.
pub fn encode_response(code: ResponseCode) -> [u8; RESPONSE_FRAME_LEN] {
    let status = code.0.to_le_bytes();
    [RESPONSE_SIGNATURE[0], RESPONSE_SIGNATURE[1], status[0], status[1]]
}

/// Decodes a response frame that is known to start at offset 0.
///
/// Use [`crate::protocol::resync::AckScanner`] when the stream may carry
/// leading noise.
///
/// # Errors
///
/// Returns [`FrameError`] when the slice is short or mis-signed.
pub fn decode_response(bytes: &[u8]) -> Result<ResponseCode, FrameError> {
    if bytes.len() < RESPONSE_FRAME_LEN {
        return Err(FrameError::InsufficientData {
            needed: RESPONSE_FRAME_LEN,
            available: bytes.len(),
        });
    }
    let signature = [bytes[0], bytes[1]];
    if signature != RESPONSE_SIGNATURE {
        return Err(FrameError::BadSignature(signature));
    }
    Ok(ResponseCode(u16::from_le_bytes([bytes[2], bytes[3]])))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_frame_layout_matches_wire_format() {
        // Arrange
        let frame = TransferFrame::put("main.py", 500);

        // Act
        let bytes = frame.encode();

        // Assert
        assert_eq!(&bytes[0..2], b"WA");
        assert_eq!(bytes[2], 1, "PUT opcode");
        assert!(bytes[3..12].iter().all(|b| *b == 0), "reserved bytes are zero");
        assert_eq!(&bytes[12..16], &500u32.to_le_bytes());
        assert_eq!(&bytes[16..18], &7u16.to_le_bytes());
        assert_eq!(&bytes[18..25], b"main.py");
        assert!(bytes[25..].iter().all(|b| *b == 0), "name field is zero-padded");
    }

    #[test]
    fn test_frame_size_is_fixed_regardless_of_name_length() {
        let short = TransferFrame::put("a", 1).encode();
        let long = TransferFrame::put("x".repeat(200), 1).encode();
        assert_eq!(short.len(), long.len());
        assert_eq!(short.len(), 82);
    }

    #[test]
    fn test_long_name_is_truncated_to_field_width() {
        // Arrange
        let frame = TransferFrame::put("d".repeat(80), 3);

        // Act
        let decoded = TransferFrame::decode(&frame.encode()).unwrap();

        // Assert
        assert_eq!(decoded.name.len(), NAME_FIELD_LEN);
    }

    #[test]
    fn test_truncation_never_splits_a_utf8_character() {
        // 63 ASCII bytes followed by a two-byte 'ñ' would straddle the limit.
        let name = format!("{}ñ", "a".repeat(63));
        let frame = TransferFrame::put(name, 0);

        let wire = frame.wire_name();

        assert_eq!(wire.len(), 63);
        assert!(std::str::from_utf8(wire).is_ok());
    }

    #[test]
    fn test_nested_name_is_sent_verbatim() {
        let frame = TransferFrame::put("gallinero/app.py", 10);
        let decoded = TransferFrame::decode(&frame.encode()).unwrap();
        assert_eq!(decoded.name, "gallinero/app.py");
    }

    #[test]
    fn test_get_frame_has_zero_size() {
        let frame = TransferFrame::get("log.txt");
        let bytes = frame.encode();
        assert_eq!(bytes[2], 2);
        assert_eq!(&bytes[12..16], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_decode_rejects_short_input() {
        let result = TransferFrame::decode(&[b'W', b'A', 1]);
        assert_eq!(
            result,
            Err(FrameError::InsufficientData {
                needed: REQUEST_FRAME_LEN,
                available: 3
            })
        );
    }

    #[test]
    fn test_decode_rejects_response_signature() {
        let mut bytes = TransferFrame::put("a.py", 1).encode();
        bytes[1] = b'B';
        assert_eq!(
            TransferFrame::decode(&bytes),
            Err(FrameError::BadSignature(*b"WB"))
        );
    }

    #[test]
    fn test_decode_rejects_unknown_opcode() {
        let mut bytes = TransferFrame::put("a.py", 1).encode();
        bytes[2] = 9;
        assert_eq!(TransferFrame::decode(&bytes), Err(FrameError::UnknownOpcode(9)));
    }

    #[test]
    fn test_decode_rejects_oversized_name_length() {
        let mut bytes = TransferFrame::put("a.py", 1).encode();
        bytes[16..18].copy_from_slice(&65u16.to_le_bytes());
        assert_eq!(TransferFrame::decode(&bytes), Err(FrameError::NameTooLong(65)));
    }

    #[test]
    fn test_response_code_is_little_endian() {
        let bytes = encode_response(ResponseCode(0x0102));
        assert_eq!(bytes, [b'W', b'B', 0x02, 0x01]);
        assert_eq!(decode_response(&bytes), Ok(ResponseCode(0x0102)));
    }

    #[test]
    fn test_decode_response_rejects_request_signature() {
        assert_eq!(
            decode_response(b"WA\x00\x00"),
            Err(FrameError::BadSignature(*b"WA"))
        );
    }

    #[test]
    fn test_response_code_success_flag() {
        assert!(ResponseCode::OK.is_success());
        assert!(!ResponseCode(1).is_success());
    }
}
