use std::fmt;

/// Result alias used throughout the crate's public API.
pub type Result<T> = std::result::Result<T, Error>;

/// The four error kinds the core decode engine can surface.
///
/// These map directly onto the status codes a C-style `decode_packet_in`
/// would return; here they are a proper enum instead of sentinel integers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
  /// A required argument was missing (null picture info, null packet, ...).
  Fault(&'static str),
  /// The engine was called while already in the `Done` state.
  InvalidState,
  /// The packet was malformed: a framing bit didn't match, the entropy
  /// oracle ran past the end of the buffer, or a decoded value violated
  /// an invariant the decoder relies on.
  BadPacket(String),
  /// A `ctl` request code wasn't recognized.
  Unimplemented(u32),
}

impl fmt::Display for Error {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Error::Fault(what) => write!(f, "fault: missing required argument: {}", what),
      Error::InvalidState => write!(f, "invalid_state: engine is no longer accepting packets"),
      Error::BadPacket(reason) => write!(f, "bad_packet: {}", reason),
      Error::Unimplemented(req) => write!(f, "unimplemented: ctl request {}", req),
    }
  }
}

impl std::error::Error for Error {}

impl From<OracleUnderflow> for Error {
  fn from(_: OracleUnderflow) -> Self {
    Error::BadPacket("entropy oracle read past end of packet".to_string())
  }
}

/// Internal signal raised by the entropy oracle when it is asked to
/// produce more bits than the packet buffer contains. Always converted
/// into `Error::BadPacket` before it reaches a caller.
#[derive(Debug, Clone, Copy)]
pub struct OracleUnderflow;
