//! Incremental RESP reader.
//!
//! [`RespReader`] is a cursor that advances one element at a time over a
//! single slice, a list of segments, or a [`Bytes`]. Aggregates are reported
//! as a header only; their children are read by the following calls.
//!
//! ```
//! use resp::RespElementType;
//! use resp::RespReader;
//!
//! let mut reader = RespReader::new(b"*2\r\n:1\r\n$3\r\nfoo\r\n");
//! reader.advance().unwrap();
//! assert_eq!(reader.element_type(), Some(RespElementType::Array));
//! assert_eq!(reader.aggregate_len().unwrap(), 2);
//! reader.advance().unwrap();
//! assert_eq!(reader.read_i64().unwrap(), 1);
//! reader.advance().unwrap();
//! assert_eq!(reader.read_string().unwrap(), "foo");
//! reader.demand_end().unwrap();
//! ```

use std::borrow::Cow;

use bytes::Bytes;
use bytes::BytesMut;
use smallvec::SmallVec;

use crate::error::ParseError;
use crate::error::RespError;
use crate::fast_path;
use crate::fast_path::ShortForm;
use crate::scan::ScanState;
use crate::types::ElementFlags;
use crate::types::RespElementType;
use crate::types::RespPrefix;
use crate::utils::CRLF;
use crate::utils::LengthHeader;
use crate::utils::STREAM_CONTINUATION;
use crate::utils::find_crlf;
use crate::utils::parse_length;
use crate::value::RespValue;

type Pieces<'a> = SmallVec<[&'a [u8]; 2]>;

#[derive(Clone, Copy)]
enum Source<'a> {
	Single(&'a [u8]),
	Multi(&'a [&'a [u8]]),
	Shared(&'a Bytes),
}

impl<'a> Source<'a> {
	fn segment(self, index: usize) -> Option<&'a [u8]> {
		match self {
			Source::Single(s) => (index == 0).then_some(s),
			Source::Multi(segments) => segments.get(index).copied(),
			Source::Shared(b) => (index == 0).then_some(b.as_ref()),
		}
	}
}

#[derive(Clone, Default)]
struct Element<'a> {
	prefix: Option<RespPrefix>,
	flags: ElementFlags,
	/// Payload bytes for scalars, logical child count for aggregates.
	length: usize,
	payload: Pieces<'a>,
}

impl<'a> Element<'a> {
	fn scalar(prefix: RespPrefix, payload: Pieces<'a>) -> Self {
		let mut flags = ElementFlags::SCALAR;
		if matches!(prefix, RespPrefix::SimpleError | RespPrefix::BlobError) {
			flags |= ElementFlags::ERROR;
		}
		Element {
			prefix: Some(prefix),
			flags,
			length: payload.iter().map(|p| p.len()).sum(),
			payload,
		}
	}

	fn null(prefix: RespPrefix) -> Self {
		let kind = if prefix.is_aggregate() {
			ElementFlags::AGGREGATE
		} else {
			ElementFlags::SCALAR
		};
		Element {
			prefix: Some(prefix),
			flags: kind | ElementFlags::NULL,
			..Default::default()
		}
	}

	fn aggregate(prefix: RespPrefix, header: LengthHeader) -> Result<Self, ParseError> {
		let mut element = match header {
			LengthHeader::Null => return Ok(Element::null(prefix)),
			LengthHeader::Known(length) => Element {
				prefix: Some(prefix),
				flags: ElementFlags::AGGREGATE,
				length,
				payload: Pieces::new(),
			},
			LengthHeader::Streaming if prefix == RespPrefix::Attribute => {
				return Err(ParseError::InvalidFormat(
					"attributes cannot be streamed".into(),
				));
			}
			LengthHeader::Streaming => Element {
				prefix: Some(prefix),
				flags: ElementFlags::AGGREGATE | ElementFlags::STREAMING,
				length: 0,
				payload: Pieces::new(),
			},
		};
		if prefix == RespPrefix::Attribute {
			element.flags |= ElementFlags::ATTRIBUTE;
		}
		Ok(element)
	}

	fn fast(mut self) -> Self {
		self.flags |= ElementFlags::FAST_PATH;
		self
	}
}

fn join<'a>(pieces: &[&'a [u8]]) -> Cow<'a, [u8]> {
	match pieces {
		[] => Cow::Borrowed(&[]),
		[one] => Cow::Borrowed(*one),
		many => Cow::Owned(many.concat()),
	}
}

fn strip_prefix_byte(mut line: Pieces<'_>) -> Pieces<'_> {
	if let Some(first) = line.first_mut() {
		let piece = *first;
		*first = &piece[1..];
		if first.is_empty() {
			line.remove(0);
		}
	}
	line
}

/// Cursor over RESP input, positioned on at most one element at a time.
pub struct RespReader<'a> {
	source: Source<'a>,
	seg: usize,
	pos: usize,
	offset: usize,
	current: Element<'a>,
}

impl<'a> RespReader<'a> {
	pub fn new(input: &'a [u8]) -> Self {
		Self::with_source(Source::Single(input))
	}

	/// Reader over input split across several buffers.
	pub fn from_segments(segments: &'a [&'a [u8]]) -> Self {
		Self::with_source(Source::Multi(segments))
	}

	/// Reader whose materialized payloads are zero-copy slices of `input`.
	pub fn from_bytes(input: &'a Bytes) -> Self {
		Self::with_source(Source::Shared(input))
	}

	fn with_source(source: Source<'a>) -> Self {
		RespReader {
			source,
			seg: 0,
			pos: 0,
			offset: 0,
			current: Element::default(),
		}
	}

	/// Bytes consumed since the reader was created.
	pub fn offset(&self) -> usize {
		self.offset
	}

	/// Bytes still available after the current element.
	pub fn remaining(&self) -> usize {
		let mut total = 0;
		let mut index = self.seg;
		let mut pos = self.pos;
		while let Some(segment) = self.source.segment(index) {
			total += segment.len().saturating_sub(pos);
			index += 1;
			pos = 0;
		}
		total
	}

	/// Skip `n` raw bytes without interpreting them.
	pub fn skip_bytes(&mut self, n: usize) -> Result<(), ParseError> {
		if n == 0 {
			return Ok(());
		}
		self.take_exact(n).ok_or(ParseError::UnexpectedEOF)?;
		self.current = Element::default();
		Ok(())
	}

	pub fn prefix(&self) -> Option<RespPrefix> {
		self.current.prefix
	}

	pub fn element_type(&self) -> Option<RespElementType> {
		self.current.prefix.and_then(|p| p.element_type())
	}

	pub fn flags(&self) -> ElementFlags {
		self.current.flags
	}

	pub fn is_null(&self) -> bool {
		self.current.flags.contains(ElementFlags::NULL)
	}

	pub fn is_scalar(&self) -> bool {
		self.current.flags.contains(ElementFlags::SCALAR)
	}

	pub fn is_aggregate(&self) -> bool {
		self.current.flags.contains(ElementFlags::AGGREGATE)
	}

	pub fn is_streaming(&self) -> bool {
		self.current.flags.contains(ElementFlags::STREAMING)
	}

	pub fn is_error(&self) -> bool {
		self.current.flags.contains(ElementFlags::ERROR)
	}

	pub fn is_attribute(&self) -> bool {
		self.current.flags.contains(ElementFlags::ATTRIBUTE)
	}

	pub fn is_stream_terminator(&self) -> bool {
		self.current.flags.contains(ElementFlags::STREAM_TERMINATOR)
	}

	/// Declared child count of the current aggregate; pairs for maps.
	pub fn aggregate_len(&self) -> Result<usize, RespError> {
		if !self.is_aggregate() || self.is_streaming() {
			return Err(RespError::wrong_type("sized aggregate", self.element_type()));
		}
		Ok(self.current.length)
	}

	/// Payload length of the current scalar.
	pub fn scalar_len(&self) -> Result<usize, RespError> {
		if !self.is_scalar() {
			return Err(RespError::wrong_type("scalar", self.element_type()));
		}
		Ok(self.current.length)
	}

	/// Contribution of the current element to the outstanding element count
	/// of a message.
	pub fn delta(&self) -> i64 {
		let flags = self.current.flags;
		if !flags.contains(ElementFlags::AGGREGATE) || flags.contains(ElementFlags::NULL) {
			return -1;
		}
		if flags.contains(ElementFlags::STREAMING) {
			return 0;
		}
		let length = self.current.length as i64;
		if flags.contains(ElementFlags::ATTRIBUTE) {
			length * 2
		} else {
			let arity = self.element_type().map_or(1, |t| t.arity()) as i64;
			length * arity - 1
		}
	}

	/// Position on the next element. `Ok(false)` when more input is needed,
	/// in which case the reader is left exactly where it was.
	pub fn try_advance_raw(&mut self) -> Result<bool, RespError> {
		let (seg, pos, offset) = (self.seg, self.pos, self.offset);
		match self.read_element() {
			Ok(Some(element)) => {
				self.current = element;
				Ok(true)
			}
			Ok(None) => {
				self.seg = seg;
				self.pos = pos;
				self.offset = offset;
				Ok(false)
			}
			Err(e) => {
				self.seg = seg;
				self.pos = pos;
				self.offset = offset;
				Err(e)
			}
		}
	}

	/// Position on the next element, treating missing input as an error.
	/// Attributes and error elements are reported as they are.
	pub fn advance_raw(&mut self) -> Result<(), RespError> {
		if self.try_advance_raw()? {
			Ok(())
		} else {
			Err(ParseError::UnexpectedEOF.into())
		}
	}

	/// Position on the next content element. Attributes are skipped and an
	/// error element is returned as [`RespError::Server`].
	pub fn advance(&mut self) -> Result<(), RespError> {
		loop {
			self.advance_raw()?;
			if self.is_attribute() {
				self.skip_children()?;
				continue;
			}
			if self.is_error() {
				let message = String::from_utf8_lossy(&join(&self.current.payload)).into_owned();
				return Err(RespError::Server(message));
			}
			return Ok(());
		}
	}

	/// Consume every child of the current aggregate without materializing
	/// them. A no-op on scalars and nulls.
	pub fn skip_children(&mut self) -> Result<(), RespError> {
		if !self.is_aggregate() || self.is_null() {
			return Ok(());
		}
		let mut state = ScanState::for_children(self);
		while !state.is_complete() {
			self.advance_raw()?;
			state.absorb(self)?;
		}
		Ok(())
	}

	/// Fail if any input remains.
	pub fn demand_end(&self) -> Result<(), RespError> {
		match self.remaining() {
			0 => Ok(()),
			n => Err(ParseError::TrailingData(n).into()),
		}
	}

	/// The current scalar as a value borrowing the input.
	pub fn read_value(&self) -> Result<RespValue<'a>, RespError> {
		let ty = self
			.element_type()
			.filter(|t| t.is_scalar())
			.ok_or(RespError::wrong_type("scalar", self.element_type()))?;
		if self.is_null() {
			return Ok(RespValue::null_of(ty));
		}
		let payload = &self.current.payload;
		if let Source::Shared(bytes) = self.source {
			return Ok(match payload.as_slice() {
				[] => RespValue::scalar(ty, b""),
				[one] => RespValue::shared(ty, bytes.slice_ref(one)),
				many => {
					let mut joined = BytesMut::with_capacity(self.current.length);
					for piece in many {
						joined.extend_from_slice(piece);
					}
					RespValue::shared(ty, joined.freeze())
				}
			});
		}
		Ok(match payload.as_slice() {
			[one] => RespValue::borrowed(ty, *one),
			_ => RespValue::segmented(ty, payload.to_vec()),
		})
	}

	/// The current element and, for aggregates, its whole sub-tree.
	/// Attributes nested below the current element are dropped.
	pub fn read_tree(&mut self) -> Result<RespValue<'a>, RespError> {
		let ty = self
			.element_type()
			.ok_or(RespError::wrong_type("element", None))?;
		if self.is_scalar() {
			return self.read_value();
		}
		if self.is_null() {
			return Ok(RespValue::null_of(ty));
		}
		let mut children = Vec::new();
		if self.is_streaming() {
			loop {
				self.advance_content()?;
				if self.is_stream_terminator() {
					break;
				}
				children.push(self.read_tree()?);
			}
			if children.len() % ty.arity() != 0 {
				return Err(ParseError::InvalidFormat(format!(
					"streamed {} has an odd number of elements",
					ty
				))
				.into());
			}
		} else {
			let count = self.current.length * ty.arity();
			children.reserve(count);
			for _ in 0..count {
				self.advance_content()?;
				children.push(self.read_tree()?);
			}
		}
		Ok(RespValue::aggregate(ty, children))
	}

	fn advance_content(&mut self) -> Result<(), RespError> {
		loop {
			self.advance_raw()?;
			if !self.is_attribute() {
				return Ok(());
			}
			self.skip_children()?;
		}
	}

	pub fn read_i64(&self) -> Result<i64, RespError> {
		self.read_value()?.as_i64()
	}

	pub fn read_f64(&self) -> Result<f64, RespError> {
		self.read_value()?.as_f64()
	}

	pub fn read_bool(&self) -> Result<bool, RespError> {
		self.read_value()?.as_bool()
	}

	pub fn read_string(&self) -> Result<String, RespError> {
		self.read_value()?.as_string()
	}

	/// Normalized cursor: the segment and position of the next unread byte.
	fn locate(&self) -> Option<(usize, usize, &'a [u8])> {
		let mut seg = self.seg;
		let mut pos = self.pos;
		while let Some(segment) = self.source.segment(seg) {
			if pos < segment.len() {
				return Some((seg, pos, &segment[pos..]));
			}
			seg += 1;
			pos = 0;
		}
		None
	}

	fn take_exact(&mut self, n: usize) -> Option<Pieces<'a>> {
		let mut pieces = Pieces::new();
		let mut need = n;
		let (mut seg, mut pos) = (self.seg, self.pos);
		while need > 0 {
			let segment = self.source.segment(seg)?;
			let available = segment.len().saturating_sub(pos);
			if available == 0 {
				seg += 1;
				pos = 0;
				continue;
			}
			let take = available.min(need);
			pieces.push(&segment[pos..pos + take]);
			pos += take;
			need -= take;
		}
		self.seg = seg;
		self.pos = pos;
		self.offset += n;
		Some(pieces)
	}

	/// Take bytes up to the next CRLF, which may straddle segments.
	fn take_line(&mut self) -> Option<Pieces<'a>> {
		let mut pieces = Pieces::new();
		let (mut seg, mut pos) = (self.seg, self.pos);
		let mut consumed = 0;
		let mut pending_cr = false;
		loop {
			let segment = self.source.segment(seg)?;
			let rest = &segment[pos.min(segment.len())..];
			if rest.is_empty() {
				seg += 1;
				pos = 0;
				continue;
			}
			if pending_cr && rest[0] == b'\n' {
				if let Some(last) = pieces.last_mut() {
					let piece = *last;
					*last = &piece[..piece.len() - 1];
					if last.is_empty() {
						pieces.pop();
					}
				}
				pos += 1;
				consumed += 1;
				break;
			}
			if let Some(at) = find_crlf(rest) {
				if at > 0 {
					pieces.push(&rest[..at]);
				}
				pos += at + 2;
				consumed += at + 2;
				break;
			}
			pieces.push(rest);
			consumed += rest.len();
			pending_cr = rest.last() == Some(&b'\r');
			seg += 1;
			pos = 0;
		}
		self.seg = seg;
		self.pos = pos;
		self.offset += consumed;
		Some(pieces)
	}

	fn expect_crlf(&mut self, after: &'static str) -> Result<bool, RespError> {
		let Some(pieces) = self.take_exact(2) else {
			return Ok(false);
		};
		if join(&pieces).as_ref() != CRLF {
			return Err(ParseError::MissingCrlf(after).into());
		}
		Ok(true)
	}

	fn consume_in_segment(&mut self, seg: usize, pos: usize, n: usize) {
		self.seg = seg;
		self.pos = pos + n;
		self.offset += n;
	}

	fn read_element(&mut self) -> Result<Option<Element<'a>>, RespError> {
		let Some((seg, pos, head)) = self.locate() else {
			return Ok(None);
		};
		match fast_path::recognize(head) {
			Some(ShortForm::Integer) => {
				self.consume_in_segment(seg, pos, 4);
				let payload = Pieces::from_slice(&[&head[1..2]]);
				return Ok(Some(Element::scalar(RespPrefix::Integer, payload).fast()));
			}
			Some(ShortForm::ArrayLength(n)) => {
				self.consume_in_segment(seg, pos, 4);
				let element = Element::aggregate(RespPrefix::Array, LengthHeader::Known(n))?;
				return Ok(Some(element.fast()));
			}
			Some(ShortForm::BlobLength(n)) => {
				self.consume_in_segment(seg, pos, 4);
				let element = self.read_blob_body(RespPrefix::BlobString, n)?;
				return Ok(element.map(Element::fast));
			}
			Some(ShortForm::Ok) if head.get(4) == Some(&b'\n') => {
				self.consume_in_segment(seg, pos, 5);
				let payload = Pieces::from_slice(&[&head[1..3]]);
				return Ok(Some(Element::scalar(RespPrefix::SimpleString, payload).fast()));
			}
			Some(ShortForm::ErrPrefix) => {
				let Some(line) = self.take_line() else {
					return Ok(None);
				};
				let payload = strip_prefix_byte(line);
				return Ok(Some(Element::scalar(RespPrefix::SimpleError, payload).fast()));
			}
			_ => {}
		}

		let Some(line) = self.take_line() else {
			return Ok(None);
		};
		let marker = line
			.first()
			.and_then(|piece| piece.first())
			.copied()
			.ok_or_else(|| ParseError::InvalidFormat("empty element header".into()))?;
		let prefix =
			RespPrefix::from_byte(marker).ok_or(ParseError::InvalidTypeMarker(marker as char))?;
		let rest = strip_prefix_byte(line);

		match prefix {
			RespPrefix::SimpleString
			| RespPrefix::SimpleError
			| RespPrefix::Integer
			| RespPrefix::Double
			| RespPrefix::Boolean
			| RespPrefix::BigNumber => Ok(Some(Element::scalar(prefix, rest))),
			RespPrefix::Null => {
				if !rest.is_empty() {
					return Err(ParseError::InvalidFormat("null carries no payload".into()).into());
				}
				Ok(Some(Element::null(prefix)))
			}
			RespPrefix::BlobString | RespPrefix::BlobError | RespPrefix::VerbatimString => {
				match parse_length(&join(&rest))? {
					LengthHeader::Known(n) => self.read_blob_body(prefix, n),
					LengthHeader::Null => Ok(Some(Element::null(prefix))),
					LengthHeader::Streaming if prefix == RespPrefix::BlobString => {
						self.read_streamed_blob()
					}
					LengthHeader::Streaming => Err(ParseError::InvalidFormat(format!(
						"{:?} cannot be streamed",
						prefix
					))
					.into()),
				}
			}
			RespPrefix::Array
			| RespPrefix::Map
			| RespPrefix::Set
			| RespPrefix::Attribute
			| RespPrefix::Push => {
				let header = parse_length(&join(&rest))?;
				Ok(Some(Element::aggregate(prefix, header)?))
			}
			RespPrefix::StreamContinuation => Err(ParseError::InvalidFormat(
				"stream chunk outside a streamed string".into(),
			)
			.into()),
			RespPrefix::StreamTerminator => {
				if !rest.is_empty() {
					return Err(
						ParseError::InvalidFormat("stream terminator carries a payload".into()).into(),
					);
				}
				Ok(Some(Element {
					prefix: Some(prefix),
					flags: ElementFlags::STREAM_TERMINATOR,
					..Default::default()
				}))
			}
		}
	}

	fn read_blob_body(&mut self, prefix: RespPrefix, n: usize) -> Result<Option<Element<'a>>, RespError> {
		if prefix == RespPrefix::VerbatimString && n < 4 {
			return Err(ParseError::InvalidFormat("verbatim string without format".into()).into());
		}
		let Some(payload) = self.take_exact(n) else {
			return Ok(None);
		};
		if !self.expect_crlf("blob payload")? {
			return Ok(None);
		}
		Ok(Some(Element::scalar(prefix, payload)))
	}

	fn read_streamed_blob(&mut self) -> Result<Option<Element<'a>>, RespError> {
		let mut payload = Pieces::new();
		loop {
			let Some(line) = self.take_line() else {
				return Ok(None);
			};
			let header = join(&line);
			if header.first() != Some(&STREAM_CONTINUATION) {
				return Err(ParseError::InvalidFormat("expected stream chunk".into()).into());
			}
			match parse_length(&header[1..])? {
				LengthHeader::Known(0) => break,
				LengthHeader::Known(n) => {
					let Some(chunk) = self.take_exact(n) else {
						return Ok(None);
					};
					if !self.expect_crlf("stream chunk")? {
						return Ok(None);
					}
					payload.extend(chunk);
				}
				_ => {
					return Err(ParseError::InvalidFormat("invalid stream chunk length".into()).into());
				}
			}
		}
		let mut element = Element::scalar(RespPrefix::BlobString, payload);
		element.flags |= ElementFlags::STREAMING;
		Ok(Some(element))
	}
}

#[cfg(test)]
mod tests {
	use rstest::rstest;

	use super::*;

	#[test]
	fn test_integer() {
		let mut reader = RespReader::new(b":100\r\n");
		reader.advance().unwrap();
		assert_eq!(reader.element_type(), Some(RespElementType::Integer));
		assert_eq!(reader.read_i64().unwrap(), 100);
		assert_eq!(reader.delta(), -1);
		assert_eq!(reader.offset(), 6);
		reader.demand_end().unwrap();
	}

	#[rstest]
	#[case(b":5\r\n", RespElementType::Integer)]
	#[case(b"$1\r\nx\r\n", RespElementType::BlobString)]
	#[case(b"*0\r\n", RespElementType::Array)]
	#[case(b"+OK\r\n", RespElementType::SimpleString)]
	#[case(b"-ERR no\r\n", RespElementType::SimpleError)]
	fn test_fast_path_flags(#[case] input: &[u8], #[case] ty: RespElementType) {
		let mut reader = RespReader::new(input);
		reader.advance_raw().unwrap();
		assert_eq!(reader.element_type(), Some(ty));
		assert!(reader.flags().contains(ElementFlags::FAST_PATH));
		reader.demand_end().unwrap();
	}

	#[test]
	fn test_general_path_has_no_fast_flag() {
		let mut reader = RespReader::new(b":12\r\n");
		reader.advance_raw().unwrap();
		assert!(!reader.flags().contains(ElementFlags::FAST_PATH));
		assert_eq!(reader.read_i64().unwrap(), 12);
	}

	#[test]
	fn test_incomplete_leaves_cursor() {
		let mut reader = RespReader::new(b"$5\r\nhel");
		assert!(!reader.try_advance_raw().unwrap());
		assert_eq!(reader.offset(), 0);
		assert_eq!(reader.prefix(), None);
		assert!(matches!(
			reader.advance_raw(),
			Err(RespError::Parse(ParseError::UnexpectedEOF))
		));
	}

	#[rstest]
	#[case(b"@foo\r\n")]
	#[case(b"$3\r\nfoobar\r\n")]
	#[case(b"_x\r\n")]
	#[case(b"$2147483648\r\n")]
	#[case(b";3\r\nfoo\r\n")]
	fn test_malformed(#[case] input: &[u8]) {
		let mut reader = RespReader::new(input);
		let err = reader.try_advance_raw().unwrap_err();
		assert!(err.is_fatal(), "{:?}", err);
	}

	#[test]
	fn test_blob_null() {
		let mut reader = RespReader::new(b"$-1\r\n");
		reader.advance().unwrap();
		assert_eq!(reader.element_type(), Some(RespElementType::BlobString));
		assert!(reader.is_null());
		assert!(reader.read_value().unwrap().is_null());
	}

	#[test]
	fn test_error_becomes_server_error() {
		let mut reader = RespReader::new(b"-ERR bad\r\n");
		assert_eq!(
			reader.advance(),
			Err(RespError::Server("ERR bad".to_string()))
		);

		let mut raw = RespReader::new(b"!9\r\nERR thing\r\n");
		raw.advance_raw().unwrap();
		assert!(raw.is_error());
		assert_eq!(raw.read_string().unwrap(), "ERR thing");
	}

	#[test]
	fn test_attribute_skipped_by_content_advance() {
		let input = b"|1\r\n+key-popularity\r\n%1\r\n$1\r\na\r\n,0.19\r\n:7\r\n";
		let mut reader = RespReader::new(input);
		reader.advance().unwrap();
		assert_eq!(reader.read_i64().unwrap(), 7);
		reader.demand_end().unwrap();

		let mut raw = RespReader::new(input);
		raw.advance_raw().unwrap();
		assert!(raw.is_attribute());
		assert_eq!(raw.delta(), 2);
	}

	#[test]
	fn test_streamed_blob() {
		let mut reader = RespReader::new(b"$?\r\n;3\r\nfoo\r\n;3\r\nbar\r\n;0\r\n");
		reader.advance().unwrap();
		assert!(reader.is_streaming());
		assert_eq!(reader.scalar_len().unwrap(), 6);
		let value = reader.read_value().unwrap();
		assert_eq!(value, RespValue::bulk_string("foobar"));
		reader.demand_end().unwrap();
	}

	#[test]
	fn test_skip_children() {
		let mut reader = RespReader::new(b"*2\r\n*1\r\n:1\r\n%1\r\n+a\r\n+b\r\n:9\r\n");
		reader.advance().unwrap();
		reader.skip_children().unwrap();
		reader.advance().unwrap();
		assert_eq!(reader.read_i64().unwrap(), 9);
		reader.demand_end().unwrap();
	}

	#[test]
	fn test_skip_streamed_aggregate() {
		let mut reader = RespReader::new(b"~?\r\n:1\r\n$1\r\nx\r\n.\r\n+done\r\n");
		reader.advance().unwrap();
		assert!(reader.is_streaming());
		reader.skip_children().unwrap();
		reader.advance().unwrap();
		assert_eq!(reader.read_string().unwrap(), "done");
	}

	#[test]
	fn test_read_tree() {
		let mut reader = RespReader::new(b"%2\r\n+a\r\n:1\r\n+b\r\n*2\r\n#t\r\n_\r\n");
		reader.advance().unwrap();
		let tree = reader.read_tree().unwrap();
		assert_eq!(
			tree,
			RespValue::map(vec![
				(RespValue::simple_string("a"), RespValue::integer(1)),
				(
					RespValue::simple_string("b"),
					RespValue::array(vec![RespValue::boolean(true), RespValue::null()])
				),
			])
		);
		reader.demand_end().unwrap();
	}

	#[test]
	fn test_read_tree_streamed_aggregate() {
		let mut reader = RespReader::new(b"*?\r\n:1\r\n:2\r\n.\r\n");
		reader.advance().unwrap();
		let tree = reader.read_tree().unwrap();
		assert_eq!(
			tree,
			RespValue::array(vec![RespValue::integer(1), RespValue::integer(2)])
		);
	}

	#[test]
	fn test_segmented_input() {
		let parts: [&[u8]; 4] = [b"*2\r", b"\n$5\r\nhel", b"lo\r\n:4", b"2\r\n"];
		let mut reader = RespReader::from_segments(&parts);
		reader.advance().unwrap();
		assert_eq!(reader.aggregate_len().unwrap(), 2);
		reader.advance().unwrap();
		let value = reader.read_value().unwrap();
		assert!(value.is_borrowed());
		assert_eq!(value.as_str().as_deref(), Some("hello"));
		reader.advance().unwrap();
		assert_eq!(reader.read_i64().unwrap(), 42);
		reader.demand_end().unwrap();
	}

	#[test]
	fn test_shared_input_is_zero_copy() {
		let input = Bytes::from_static(b"$26\r\nabcdefghijklmnopqrstuvwxyz\r\n");
		let value = {
			let mut reader = RespReader::from_bytes(&input);
			reader.advance().unwrap();
			reader.read_value().unwrap()
		};
		assert!(!value.is_borrowed());
		assert_eq!(value.byte_len(), 26);
	}

	#[test]
	fn test_trailing_data() {
		let mut reader = RespReader::new(b"+OK\r\n+extra\r\n");
		reader.advance().unwrap();
		assert_eq!(
			reader.demand_end(),
			Err(RespError::Parse(ParseError::TrailingData(8)))
		);
	}

	#[test]
	fn test_wrong_shape_reads() {
		let mut reader = RespReader::new(b"*1\r\n:1\r\n");
		reader.advance().unwrap();
		assert!(matches!(
			reader.read_i64(),
			Err(RespError::WrongType { .. })
		));
		reader.advance().unwrap();
		assert!(matches!(
			reader.aggregate_len(),
			Err(RespError::WrongType { .. })
		));
	}
}
