//! Turning one reply frame into a caller's result type.
//!
//! A decoder receives a reader positioned just before the reply. It advances
//! the reader itself, so it can stream through large aggregates without
//! materializing them. Any function or closure
//! `Fn(&mut RespReader) -> Result<T, RespError>` is a decoder.

use resp::RespError;
use resp::RespReader;
use resp::RespValue;

pub trait ReplyDecoder: Send + 'static {
	type Output: Send + 'static;

	fn decode(&self, reader: &mut RespReader<'_>) -> Result<Self::Output, RespError>;
}

impl<F, T> ReplyDecoder for F
where
	F: Fn(&mut RespReader<'_>) -> Result<T, RespError> + Send + 'static,
	T: Send + 'static,
{
	type Output = T;

	fn decode(&self, reader: &mut RespReader<'_>) -> Result<T, RespError> {
		self(reader)
	}
}

/// The whole reply as an owned value. Attributes are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueDecoder;

impl ReplyDecoder for ValueDecoder {
	type Output = RespValue<'static>;

	fn decode(&self, reader: &mut RespReader<'_>) -> Result<Self::Output, RespError> {
		reader.advance()?;
		Ok(reader.read_tree()?.preserve())
	}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerDecoder;

impl ReplyDecoder for IntegerDecoder {
	type Output = i64;

	fn decode(&self, reader: &mut RespReader<'_>) -> Result<i64, RespError> {
		reader.advance()?;
		reader.read_i64()
	}
}

/// A string reply, or `None` for null.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringDecoder;

impl ReplyDecoder for StringDecoder {
	type Output = Option<String>;

	fn decode(&self, reader: &mut RespReader<'_>) -> Result<Option<String>, RespError> {
		reader.advance()?;
		if reader.is_null() {
			return Ok(None);
		}
		reader.read_string().map(Some)
	}
}

/// Accepts exactly `+OK`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OkDecoder;

impl ReplyDecoder for OkDecoder {
	type Output = ();

	fn decode(&self, reader: &mut RespReader<'_>) -> Result<(), RespError> {
		reader.advance()?;
		if reader.is_scalar()
			&& !reader.is_null()
			&& reader.read_value()?.to_bytes()?.as_ref() == b"OK"
		{
			return Ok(());
		}
		Err(RespError::WrongType {
			expected: "OK",
			found: reader.element_type(),
		})
	}
}
