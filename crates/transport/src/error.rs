use std::io;
use std::sync::Arc;

use resp::RespError;
use thiserror::Error;

/// Errors surfaced to callers of a transport or pool.
///
/// Cloneable so a single connection failure can be handed to every caller
/// that was waiting on that connection.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
	/// The byte stream is malformed or uses an unsupported shape. The
	/// connection cannot be used afterwards.
	#[error("Protocol error: {0}")]
	Protocol(RespError),

	/// The server answered with an error reply.
	#[error("Server error: {0}")]
	Server(String),

	/// The reply was well formed but not what the decoder expected.
	#[error("Reply error: {0}")]
	Reply(RespError),

	#[error("I/O error: {0}")]
	Io(Arc<io::Error>),

	#[error("Connection closed by peer")]
	ConnectionClosed,

	#[error("Timed out")]
	Timeout,

	#[error("Connection pool exhausted")]
	PoolExhausted,

	/// The reply slot was dropped before the reply arrived.
	#[error("Request canceled")]
	Canceled,

	/// The reply decoder panicked. Only its own caller is affected.
	#[error("Reply decoder panicked")]
	DecoderPanicked,

	/// A request-response frame arrived with no request waiting for it.
	#[error("Unexpected reply with no pending request")]
	UnexpectedReply,

	/// The connection was shut down earlier by the contained failure.
	#[error("Connection terminated: {0}")]
	Terminated(Box<TransportError>),
}

impl TransportError {
	/// Whether the connection that produced this error must be discarded.
	pub fn is_fatal(&self) -> bool {
		match self {
			TransportError::Server(_)
			| TransportError::Reply(_)
			| TransportError::Timeout
			| TransportError::PoolExhausted
			| TransportError::Canceled
			| TransportError::DecoderPanicked => false,
			TransportError::Protocol(_)
			| TransportError::Io(_)
			| TransportError::ConnectionClosed
			| TransportError::UnexpectedReply
			| TransportError::Terminated(_) => true,
		}
	}

	pub(crate) fn terminated(cause: &TransportError) -> Self {
		match cause {
			TransportError::Terminated(_) => cause.clone(),
			other => TransportError::Terminated(Box::new(other.clone())),
		}
	}
}

impl From<RespError> for TransportError {
	fn from(e: RespError) -> Self {
		match e {
			RespError::Server(message) => TransportError::Server(message),
			e if e.is_fatal() => TransportError::Protocol(e),
			e => TransportError::Reply(e),
		}
	}
}

impl From<io::Error> for TransportError {
	fn from(e: io::Error) -> Self {
		match e.kind() {
			io::ErrorKind::UnexpectedEof
			| io::ErrorKind::ConnectionReset
			| io::ErrorKind::BrokenPipe => TransportError::ConnectionClosed,
			// a blocking socket's read timeout
			io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportError::Timeout,
			_ => TransportError::Io(Arc::new(e)),
		}
	}
}
