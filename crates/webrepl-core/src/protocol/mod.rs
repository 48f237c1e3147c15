//! Protocol module containing the binary frames, the acknowledgement
//! resynchronizer, the REPL text markers, and the channel mode machine.

pub mod frame;
pub mod mode;
pub mod repl;
pub mod resync;

pub use frame::{
    decode_response, encode_response, FrameError, Opcode, ResponseCode, TransferFrame,
    CHUNK_SIZE, DEFAULT_MAX_FILE_SIZE, NAME_FIELD_LEN, REQUEST_FRAME_LEN, REQUEST_SIGNATURE,
    RESPONSE_FRAME_LEN, RESPONSE_SIGNATURE,
};
pub use mode::ChannelMode;
pub use resync::AckScanner;
