//! Error types for the agent core.

use thiserror::Error;

/// Errors raised while decoding, authorizing, or otherwise servicing an
/// agent-protocol request.
///
/// The wire protocol never distinguishes these beyond a single `FAILURE`
/// response; the variant and its context are only ever observed in logs.
#[derive(Error, Debug)]
pub enum AgentError {
    /// A frame or one of its nested structures did not parse, was too big,
    /// or was empty. The connection stays open; the caller answers with
    /// `FAILURE`.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The peer is not permitted to perform the requested operation.
    #[error("authorization denied")]
    AuthorizationDenied,

    /// A sign or remove request named a fingerprint the store doesn't hold.
    #[error("key not found")]
    NotFound,

    /// The request code is recognized but this agent doesn't implement it.
    #[error("not implemented")]
    NotImplemented,

    /// A socket read or write failed; the connection is torn down without a
    /// response.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Startup failed in a way that should abort the process.
    #[error("fatal startup error: {0}")]
    FatalStartup(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;
