//! RESP serialization.
//!
//! [`RespWriter`] appends elements to a [`BytesMut`]. In
//! [`RespVersion::Resp2`] mode RESP3-only shapes are lowered to their RESP2
//! equivalents; the few that have none are rejected.

use bytes::BufMut;
use bytes::Bytes;
use bytes::BytesMut;

use crate::error::RespError;
use crate::types::RespElementType;
use crate::types::RespVersion;
use crate::utils::*;
use crate::value::RespValue;

/// Trait for encoding RESP values.
pub trait RespEncoder {
	fn encode_with(&self, writer: &mut RespWriter<'_>) -> Result<(), RespError>;

	fn encode_to(&self, buf: &mut BytesMut) -> Result<(), RespError> {
		self.encode_with(&mut RespWriter::new(buf, RespVersion::Resp3))
	}

	fn encode(&self) -> Result<Bytes, RespError> {
		let mut buf = BytesMut::new();
		self.encode_to(&mut buf)?;
		Ok(buf.freeze())
	}
}

impl RespEncoder for RespValue<'_> {
	fn encode_with(&self, writer: &mut RespWriter<'_>) -> Result<(), RespError> {
		writer.write_value(self)
	}
}

/// Appends RESP elements to a buffer.
pub struct RespWriter<'b> {
	buf: &'b mut BytesMut,
	version: RespVersion,
}

impl<'b> RespWriter<'b> {
	pub fn new(buf: &'b mut BytesMut, version: RespVersion) -> Self {
		RespWriter { buf, version }
	}

	pub fn version(&self) -> RespVersion {
		self.version
	}

	fn is_resp2(&self) -> bool {
		self.version == RespVersion::Resp2
	}

	#[inline]
	fn header(&mut self, marker: u8, len: usize) {
		self.buf.put_u8(marker);
		self.buf.put_slice(IntBuf::new(len as i64).as_bytes());
		self.buf.put_slice(CRLF);
	}

	#[inline]
	fn line(&mut self, marker: u8, body: &[u8]) {
		self.buf.reserve(body.len() + 3);
		self.buf.put_u8(marker);
		self.buf.put_slice(body);
		self.buf.put_slice(CRLF);
	}

	#[inline]
	fn blob(&mut self, marker: u8, body: &[u8]) {
		self.header(marker, body.len());
		self.buf.reserve(body.len() + 2);
		self.buf.put_slice(body);
		self.buf.put_slice(CRLF);
	}

	pub fn write_simple_string(&mut self, s: &[u8]) -> Result<(), RespError> {
		if s.iter().any(|&b| b == b'\r' || b == b'\n') {
			return Err(RespError::NotSupported("simple string containing CR or LF"));
		}
		self.line(SIMPLE_STRING, s);
		Ok(())
	}

	/// Simple error; CR and LF in the message become spaces.
	pub fn write_error(&mut self, message: &[u8]) {
		if message.iter().any(|&b| b == b'\r' || b == b'\n') {
			let cleaned: Vec<u8> = message
				.iter()
				.map(|&b| if b == b'\r' || b == b'\n' { b' ' } else { b })
				.collect();
			self.line(ERROR, &cleaned);
		} else {
			self.line(ERROR, message);
		}
	}

	pub fn write_blob_string(&mut self, s: &[u8]) {
		self.blob(BULK_STRING, s);
	}

	pub fn write_blob_error(&mut self, message: &[u8]) {
		if self.is_resp2() {
			self.write_error(message);
		} else {
			self.blob(BULK_ERROR, message);
		}
	}

	pub fn write_integer(&mut self, i: i64) {
		self.line(INTEGER, IntBuf::new(i).as_bytes());
	}

	pub fn write_null(&mut self) {
		if self.is_resp2() {
			self.buf.put_slice(b"$-1\r\n");
		} else {
			self.buf.put_slice(b"_\r\n");
		}
	}

	/// Null of a specific type. RESP3 has a single null; RESP2 keeps the
	/// array/blob distinction.
	pub fn write_null_of(&mut self, ty: RespElementType) {
		if self.is_resp2() && ty.is_aggregate() {
			self.buf.put_slice(b"*-1\r\n");
		} else {
			self.write_null();
		}
	}

	pub fn write_boolean(&mut self, b: bool) {
		match (self.is_resp2(), b) {
			(true, true) => self.buf.put_slice(b":1\r\n"),
			(true, false) => self.buf.put_slice(b":0\r\n"),
			(false, true) => self.buf.put_slice(b"#t\r\n"),
			(false, false) => self.buf.put_slice(b"#f\r\n"),
		}
	}

	pub fn write_double(&mut self, d: f64) {
		let text = format_double(d);
		if self.is_resp2() {
			self.blob(BULK_STRING, text.as_bytes());
		} else {
			self.line(DOUBLE, text.as_bytes());
		}
	}

	fn write_double_text(&mut self, text: &[u8]) {
		if self.is_resp2() {
			self.blob(BULK_STRING, text);
		} else {
			self.line(DOUBLE, text);
		}
	}

	pub fn write_big_number(&mut self, digits: &[u8]) {
		if self.is_resp2() {
			self.blob(BULK_STRING, digits);
		} else {
			self.line(BIG_NUMBER, digits);
		}
	}

	/// Verbatim string; `payload` includes the `xxx:` format hint.
	pub fn write_verbatim(&mut self, payload: &[u8]) {
		if self.is_resp2() {
			let text = match payload.get(3) {
				Some(b':') => &payload[4..],
				_ => payload,
			};
			self.blob(BULK_STRING, text);
		} else {
			self.blob(VERBATIM_STRING, payload);
		}
	}

	/// Header of a sized aggregate; `len` counts pairs for maps.
	pub fn write_aggregate_header(&mut self, ty: RespElementType, len: usize) -> Result<(), RespError> {
		if self.is_resp2() {
			match ty {
				RespElementType::Attribute => {
					return Err(RespError::NotSupported("attributes in RESP2"));
				}
				RespElementType::Map => self.header(ARRAY, len * 2),
				_ => self.header(ARRAY, len),
			}
			return Ok(());
		}
		let marker = match ty {
			RespElementType::Array => ARRAY,
			RespElementType::Map => MAP,
			RespElementType::Set => SET,
			RespElementType::Attribute => ATTRIBUTE,
			RespElementType::Push => PUSH,
			_ => return Err(RespError::wrong_type("aggregate", Some(ty))),
		};
		self.header(marker, len);
		Ok(())
	}

	pub fn write_array_header(&mut self, len: usize) {
		self.header(ARRAY, len);
	}

	/// `$?` for a streamed string or `*?`, `%?`, `~?`, `>?` for aggregates.
	pub fn write_streaming_header(&mut self, ty: RespElementType) -> Result<(), RespError> {
		if self.is_resp2() {
			return Err(RespError::NotSupported("streamed elements in RESP2"));
		}
		let marker = match ty {
			RespElementType::BlobString => BULK_STRING,
			RespElementType::Array => ARRAY,
			RespElementType::Map => MAP,
			RespElementType::Set => SET,
			RespElementType::Push => PUSH,
			_ => return Err(RespError::NotSupported("streamed element of this type")),
		};
		self.buf.put_u8(marker);
		self.buf.put_slice(b"?\r\n");
		Ok(())
	}

	/// One chunk of a streamed string. Empty chunks are not written since a
	/// zero-length chunk ends the string.
	pub fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), RespError> {
		if self.is_resp2() {
			return Err(RespError::NotSupported("streamed elements in RESP2"));
		}
		if !chunk.is_empty() {
			self.blob(STREAM_CONTINUATION, chunk);
		}
		Ok(())
	}

	pub fn write_chunk_end(&mut self) -> Result<(), RespError> {
		if self.is_resp2() {
			return Err(RespError::NotSupported("streamed elements in RESP2"));
		}
		self.buf.put_slice(b";0\r\n");
		Ok(())
	}

	pub fn write_stream_end(&mut self) -> Result<(), RespError> {
		if self.is_resp2() {
			return Err(RespError::NotSupported("streamed elements in RESP2"));
		}
		self.buf.put_slice(b".\r\n");
		Ok(())
	}

	/// A command as an array of blob strings, valid in both versions.
	pub fn write_command<A: AsRef<[u8]>>(&mut self, args: &[A]) {
		self.header(ARRAY, args.len());
		for arg in args {
			self.blob(BULK_STRING, arg.as_ref());
		}
	}

	pub fn write_value(&mut self, value: &RespValue<'_>) -> Result<(), RespError> {
		let ty = value.element_type();
		if value.is_null() {
			self.write_null_of(ty);
			return Ok(());
		}
		if ty.is_aggregate() {
			return self.write_aggregate(value);
		}
		let payload = value.to_bytes()?;
		match ty {
			RespElementType::SimpleString => self.write_simple_string(&payload)?,
			RespElementType::SimpleError => self.write_error(&payload),
			RespElementType::BlobString => self.write_blob_string(&payload),
			RespElementType::BlobError => self.write_blob_error(&payload),
			RespElementType::Integer => self.line(INTEGER, &payload),
			RespElementType::Null => self.write_null(),
			RespElementType::Double => self.write_double_text(&payload),
			RespElementType::Boolean => self.write_boolean(value.as_bool()?),
			RespElementType::BigNumber => self.write_big_number(&payload),
			RespElementType::VerbatimString => self.write_verbatim(&payload),
			_ => return Err(RespError::wrong_type("scalar", Some(ty))),
		}
		Ok(())
	}

	fn write_aggregate(&mut self, value: &RespValue<'_>) -> Result<(), RespError> {
		let ty = value.element_type();
		if ty == RespElementType::Attribute && self.is_resp2() {
			return Ok(());
		}
		let children = value.children()?;
		// attributes annotate the next sibling and are not counted
		let counted = children
			.iter()
			.filter(|c| c.element_type() != RespElementType::Attribute)
			.count();
		self.write_aggregate_header(ty, counted / ty.arity())?;
		for child in children {
			self.write_value(child)?;
		}
		Ok(())
	}
}

/// A request: command name followed by its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
	args: Vec<Bytes>,
}

impl Command {
	pub fn new(name: impl AsRef<[u8]>) -> Self {
		Command {
			args: vec![Bytes::copy_from_slice(name.as_ref())],
		}
	}

	pub fn arg(mut self, arg: impl AsRef<[u8]>) -> Self {
		self.args.push(Bytes::copy_from_slice(arg.as_ref()));
		self
	}

	pub fn arg_int(mut self, arg: i64) -> Self {
		self.args
			.push(Bytes::copy_from_slice(IntBuf::new(arg).as_bytes()));
		self
	}

	pub fn name(&self) -> &[u8] {
		&self.args[0]
	}

	pub fn args(&self) -> &[Bytes] {
		&self.args
	}
}

impl RespEncoder for Command {
	fn encode_with(&self, writer: &mut RespWriter<'_>) -> Result<(), RespError> {
		writer.write_command(self.args.as_slice());
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use rstest::rstest;

	use super::*;

	fn write3(value: &RespValue<'_>) -> Vec<u8> {
		let mut buf = BytesMut::new();
		RespWriter::new(&mut buf, RespVersion::Resp3)
			.write_value(value)
			.unwrap();
		buf.to_vec()
	}

	fn write2(value: &RespValue<'_>) -> Vec<u8> {
		let mut buf = BytesMut::new();
		RespWriter::new(&mut buf, RespVersion::Resp2)
			.write_value(value)
			.unwrap();
		buf.to_vec()
	}

	#[rstest]
	#[case(RespValue::simple_string("OK"), b"+OK\r\n")]
	#[case(RespValue::error("ERR unknown command"), b"-ERR unknown command\r\n")]
	#[case(RespValue::integer(-42), b":-42\r\n")]
	#[case(RespValue::bulk_string("hello"), b"$5\r\nhello\r\n")]
	#[case(RespValue::bulk_string(""), b"$0\r\n\r\n")]
	#[case(RespValue::null(), b"_\r\n")]
	#[case(RespValue::boolean(false), b"#f\r\n")]
	#[case(RespValue::double(1.5), b",1.5\r\n")]
	#[case(RespValue::double(f64::NEG_INFINITY), b",-inf\r\n")]
	#[case(RespValue::big_number("3492890328409238509324850943850943825024385"), b"(3492890328409238509324850943850943825024385\r\n")]
	#[case(RespValue::blob_error("SYNTAX invalid syntax"), b"!21\r\nSYNTAX invalid syntax\r\n")]
	#[case(RespValue::verbatim("txt", "Some string"), b"=15\r\ntxt:Some string\r\n")]
	fn test_write_scalar_resp3(#[case] value: RespValue<'static>, #[case] expected: &[u8]) {
		assert_eq!(write3(&value), expected);
	}

	#[rstest]
	#[case(RespValue::null(), b"$-1\r\n")]
	#[case(RespValue::null_of(RespElementType::Array), b"*-1\r\n")]
	#[case(RespValue::boolean(true), b":1\r\n")]
	#[case(RespValue::double(2.5), b"$3\r\n2.5\r\n")]
	#[case(RespValue::big_number("12345"), b"$5\r\n12345\r\n")]
	#[case(RespValue::verbatim("txt", "hi"), b"$2\r\nhi\r\n")]
	#[case(RespValue::blob_error("ERR multi\r\nline"), b"-ERR multi  line\r\n")]
	fn test_write_scalar_resp2(#[case] value: RespValue<'static>, #[case] expected: &[u8]) {
		assert_eq!(write2(&value), expected);
	}

	#[test]
	fn test_write_map_both_versions() {
		let map = RespValue::map(vec![(RespValue::simple_string("k"), RespValue::integer(1))]);
		assert_eq!(write3(&map), b"%1\r\n+k\r\n:1\r\n");
		assert_eq!(write2(&map), b"*2\r\n+k\r\n:1\r\n");
	}

	#[test]
	fn test_write_set_and_push_resp2() {
		let set = RespValue::set(vec![RespValue::integer(1)]);
		let push = RespValue::push(vec![RespValue::simple_string("message")]);
		assert_eq!(write3(&set), b"~1\r\n:1\r\n");
		assert_eq!(write2(&set), b"*1\r\n:1\r\n");
		assert_eq!(write3(&push), b">1\r\n+message\r\n");
		assert_eq!(write2(&push), b"*1\r\n+message\r\n");
	}

	#[test]
	fn test_attribute_not_counted() {
		let value = RespValue::array(vec![
			RespValue::attribute(vec![(RespValue::simple_string("ttl"), RespValue::integer(5))]),
			RespValue::integer(7),
		]);
		assert_eq!(write3(&value), b"*1\r\n|1\r\n+ttl\r\n:5\r\n:7\r\n");
		assert_eq!(write2(&value), b"*1\r\n:7\r\n");
	}

	#[test]
	fn test_simple_string_with_newline_rejected() {
		let mut buf = BytesMut::new();
		let mut writer = RespWriter::new(&mut buf, RespVersion::Resp3);
		assert!(matches!(
			writer.write_simple_string(b"a\r\nb"),
			Err(RespError::NotSupported(_))
		));
	}

	#[test]
	fn test_streaming() {
		let mut buf = BytesMut::new();
		let mut writer = RespWriter::new(&mut buf, RespVersion::Resp3);
		writer
			.write_streaming_header(RespElementType::BlobString)
			.unwrap();
		writer.write_chunk(b"foo").unwrap();
		writer.write_chunk(b"").unwrap();
		writer.write_chunk(b"bar").unwrap();
		writer.write_chunk_end().unwrap();
		writer
			.write_streaming_header(RespElementType::Array)
			.unwrap();
		writer.write_integer(1);
		writer.write_stream_end().unwrap();
		assert_eq!(
			&buf[..],
			b"$?\r\n;3\r\nfoo\r\n;3\r\nbar\r\n;0\r\n*?\r\n:1\r\n.\r\n"
		);
	}

	#[test]
	fn test_streaming_resp2_not_supported() {
		let mut buf = BytesMut::new();
		let mut writer = RespWriter::new(&mut buf, RespVersion::Resp2);
		assert!(matches!(
			writer.write_streaming_header(RespElementType::Array),
			Err(RespError::NotSupported(_))
		));
		assert!(writer.write_chunk(b"x").is_err());
		assert!(writer.write_stream_end().is_err());
		assert!(buf.is_empty());
	}

	#[test]
	fn test_command() {
		let cmd = Command::new("SET").arg("key").arg_int(10);
		assert_eq!(cmd.name(), b"SET");
		assert_eq!(
			&cmd.encode().unwrap()[..],
			b"*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$2\r\n10\r\n"
		);
	}

	#[test]
	fn test_encoder_trait() {
		let value = RespValue::array(vec![RespValue::integer(1), RespValue::bulk_string("x")]);
		assert_eq!(&value.encode().unwrap()[..], b"*2\r\n:1\r\n$1\r\nx\r\n");
	}
}
