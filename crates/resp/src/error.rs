//! Error types for RESP reading, writing and scanning.

use thiserror::Error;

use crate::types::RespElementType;

/// Main error type for RESP operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RespError {
	/// Malformed bytes on the wire. Fatal to the connection.
	#[error("Parse error: {0}")]
	Parse(#[from] ParseError),

	/// A well-formed error reply (`-ERR ...` or `!len\r\n...`).
	#[error("Server error: {0}")]
	Server(String),

	/// A valid but unsupported shape, never approximated.
	#[error("Not supported: {0}")]
	NotSupported(&'static str),

	/// A value or element was read as a shape it does not have.
	#[error("Wrong type: expected {expected}, found {found:?}")]
	WrongType {
		expected: &'static str,
		found: Option<RespElementType>,
	},
}

impl RespError {
	/// Whether this error leaves the byte stream in an unknown state.
	pub fn is_fatal(&self) -> bool {
		matches!(self, RespError::Parse(_) | RespError::NotSupported(_))
	}

	pub(crate) fn wrong_type(expected: &'static str, found: Option<RespElementType>) -> Self {
		RespError::WrongType { expected, found }
	}
}

/// Errors that can occur during RESP parsing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
	/// Unexpected end of input while parsing
	#[error("Unexpected end of input")]
	UnexpectedEOF,

	/// Invalid type marker encountered
	#[error("Invalid type marker: {0:?}")]
	InvalidTypeMarker(char),

	/// Invalid format for the current type
	#[error("Invalid format: {0}")]
	InvalidFormat(String),

	/// Invalid integer value
	#[error("Invalid integer: {0}")]
	InvalidInteger(String),

	/// Invalid bulk string length
	#[error("Invalid bulk string length: {0}")]
	InvalidBulkStringLength(i64),

	/// Invalid array length
	#[error("Invalid array length: {0}")]
	InvalidArrayLength(i64),

	/// Length or child count does not fit in 32 bits
	#[error("Length prefix overflow")]
	LengthOverflow,

	/// Payload not followed by CRLF
	#[error("Missing CRLF after {0}")]
	MissingCrlf(&'static str),

	/// Bytes left over where the message should have ended
	#[error("{0} trailing bytes after end of message")]
	TrailingData(usize),

	/// UTF-8 conversion error
	#[error("UTF-8 error: {0}")]
	Utf8Error(String),

	/// Invalid double value
	#[error("Invalid double: {0}")]
	InvalidDouble(String),
}

impl From<std::str::Utf8Error> for ParseError {
	fn from(e: std::str::Utf8Error) -> Self {
		ParseError::Utf8Error(e.to_string())
	}
}

impl From<std::num::ParseIntError> for ParseError {
	fn from(e: std::num::ParseIntError) -> Self {
		ParseError::InvalidInteger(e.to_string())
	}
}

impl From<std::num::ParseFloatError> for ParseError {
	fn from(e: std::num::ParseFloatError) -> Self {
		ParseError::InvalidDouble(e.to_string())
	}
}

impl From<std::str::Utf8Error> for RespError {
	fn from(e: std::str::Utf8Error) -> Self {
		RespError::Parse(e.into())
	}
}
