//! Utility functions and constants for RESP protocol.

use crate::error::ParseError;

/// CRLF line ending
pub const CRLF: &[u8] = b"\r\n";

/// Type markers for RESP2
pub const SIMPLE_STRING: u8 = b'+';
pub const ERROR: u8 = b'-';
pub const INTEGER: u8 = b':';
pub const BULK_STRING: u8 = b'$';
pub const ARRAY: u8 = b'*';

/// Type markers for RESP3
pub const NULL: u8 = b'_';
pub const BOOLEAN: u8 = b'#';
pub const DOUBLE: u8 = b',';
pub const BIG_NUMBER: u8 = b'(';
pub const BULK_ERROR: u8 = b'!';
pub const VERBATIM_STRING: u8 = b'=';
pub const MAP: u8 = b'%';
pub const SET: u8 = b'~';
pub const ATTRIBUTE: u8 = b'|';
pub const PUSH: u8 = b'>';
pub const STREAM_CONTINUATION: u8 = b';';
pub const STREAM_TERMINATOR: u8 = b'.';

/// Marker for an unknown length (`$?`, `*?`).
pub const STREAMING_MARKER: u8 = b'?';

/// Longest accepted digit run in a length or count.
pub const MAX_LENGTH_DIGITS: usize = 10;

/// Find the position of CRLF in a byte slice
#[inline]
pub fn find_crlf(buf: &[u8]) -> Option<usize> {
	let mut from = 0;
	while let Some(pos) = memchr::memchr(b'\r', &buf[from..]) {
		let at = from + pos;
		match buf.get(at + 1) {
			Some(b'\n') => return Some(at),
			Some(_) => from = at + 1,
			None => return None,
		}
	}
	None
}

/// Parsed form of a length or count header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthHeader {
	Known(usize),
	Null,
	Streaming,
}

/// Parse the digits of a length/count header (`-1`, `?`, or `0..=i32::MAX`).
pub fn parse_length(digits: &[u8]) -> Result<LengthHeader, ParseError> {
	match digits {
		[STREAMING_MARKER] => return Ok(LengthHeader::Streaming),
		b"-1" => return Ok(LengthHeader::Null),
		[] => return Err(ParseError::InvalidFormat("empty length".into())),
		_ => {}
	}
	if digits.len() > MAX_LENGTH_DIGITS {
		return Err(ParseError::LengthOverflow);
	}
	let mut value: u64 = 0;
	for &b in digits {
		if !b.is_ascii_digit() {
			return Err(ParseError::InvalidInteger(
				String::from_utf8_lossy(digits).into_owned(),
			));
		}
		value = value * 10 + (b - b'0') as u64;
	}
	if value > i32::MAX as u64 {
		return Err(ParseError::LengthOverflow);
	}
	Ok(LengthHeader::Known(value as usize))
}

/// Parse an integer from a byte slice
#[inline]
pub fn parse_integer(buf: &[u8]) -> Result<i64, ParseError> {
	let s = std::str::from_utf8(buf)?;
	s.parse::<i64>()
		.map_err(|e| ParseError::InvalidInteger(format!("{:?}: {}", s, e)))
}

/// Parse a double from a byte slice
#[inline]
pub fn parse_double(buf: &[u8]) -> Result<f64, ParseError> {
	let s = std::str::from_utf8(buf)?;

	// Handle special values
	match s {
		"inf" | "+inf" => Ok(f64::INFINITY),
		"-inf" => Ok(f64::NEG_INFINITY),
		"nan" => Ok(f64::NAN),
		_ => s
			.parse::<f64>()
			.map_err(|e| ParseError::InvalidDouble(format!("{:?}: {}", s, e))),
	}
}

/// Parse a RESP boolean payload.
#[inline]
pub fn parse_boolean(buf: &[u8]) -> Result<bool, ParseError> {
	match buf {
		b"t" | b"1" => Ok(true),
		b"f" | b"0" => Ok(false),
		_ => Err(ParseError::InvalidFormat(
			"Boolean must be 't' or 'f'".to_string(),
		)),
	}
}

/// Stack-allocated decimal rendering of an integer.
pub struct IntBuf {
	buf: [u8; 20],
	start: usize,
}

impl IntBuf {
	pub fn new(value: i64) -> Self {
		let mut buf = [0u8; 20];
		let mut pos = buf.len();
		let negative = value < 0;
		let mut rest = value.unsigned_abs();
		loop {
			pos -= 1;
			buf[pos] = b'0' + (rest % 10) as u8;
			rest /= 10;
			if rest == 0 {
				break;
			}
		}
		if negative {
			pos -= 1;
			buf[pos] = b'-';
		}
		IntBuf { buf, start: pos }
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.buf[self.start..]
	}
}

/// Render a double the way it is sent on the wire.
pub fn format_double(d: f64) -> String {
	if d.is_nan() {
		"nan".to_string()
	} else if d.is_infinite() {
		if d.is_sign_positive() {
			"inf".to_string()
		} else {
			"-inf".to_string()
		}
	} else {
		d.to_string()
	}
}

#[cfg(test)]
mod tests {
	use rstest::rstest;

	use super::*;

	#[test]
	fn test_find_crlf() {
		assert_eq!(find_crlf(b"hello\r\n"), Some(5));
		assert_eq!(find_crlf(b"hello"), None);
		assert_eq!(find_crlf(b"\r\n"), Some(0));
		assert_eq!(find_crlf(b"a\rb\r\n"), Some(3));
		assert_eq!(find_crlf(b"abc\r"), None);
	}

	#[rstest]
	#[case(b"0", LengthHeader::Known(0))]
	#[case(b"22", LengthHeader::Known(22))]
	#[case(b"-1", LengthHeader::Null)]
	#[case(b"?", LengthHeader::Streaming)]
	#[case(b"2147483647", LengthHeader::Known(i32::MAX as usize))]
	fn test_parse_length(#[case] input: &[u8], #[case] expected: LengthHeader) {
		assert_eq!(parse_length(input).unwrap(), expected);
	}

	#[rstest]
	#[case(b"2147483648")]
	#[case(b"99999999999")]
	fn test_parse_length_overflow(#[case] input: &[u8]) {
		assert_eq!(parse_length(input), Err(ParseError::LengthOverflow));
	}

	#[test]
	fn test_parse_length_invalid() {
		assert!(matches!(
			parse_length(b"-2"),
			Err(ParseError::InvalidInteger(_))
		));
		assert!(matches!(
			parse_length(b""),
			Err(ParseError::InvalidFormat(_))
		));
	}

	#[test]
	fn test_parse_integer() {
		assert_eq!(parse_integer(b"123").unwrap(), 123);
		assert_eq!(parse_integer(b"-456").unwrap(), -456);
		assert!(parse_integer(b"abc").is_err());
	}

	#[test]
	fn test_parse_double() {
		assert_eq!(parse_double(b"3.14").unwrap(), 3.14);
		assert_eq!(parse_double(b"-2.5").unwrap(), -2.5);
		assert_eq!(parse_double(b"inf").unwrap(), f64::INFINITY);
		assert_eq!(parse_double(b"-inf").unwrap(), f64::NEG_INFINITY);
		assert!(parse_double(b"nan").unwrap().is_nan());
	}

	#[rstest]
	#[case(0, "0")]
	#[case(7, "7")]
	#[case(-100, "-100")]
	#[case(i64::MAX, "9223372036854775807")]
	#[case(i64::MIN, "-9223372036854775808")]
	fn test_int_buf(#[case] value: i64, #[case] expected: &str) {
		assert_eq!(IntBuf::new(value).as_bytes(), expected.as_bytes());
	}
}
