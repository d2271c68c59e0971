//! RESP element classification: semantic types, wire prefixes and flags.

use std::fmt;
use std::ops::BitOr;
use std::ops::BitOrAssign;

use crate::utils::*;

/// The semantic type of one RESP element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RespElementType {
	/// `$6\r\nfoobar\r\n`
	BlobString,
	/// `+OK\r\n`
	SimpleString,
	/// `-ERR message\r\n`
	SimpleError,
	/// `!21\r\nSYNTAX invalid syntax\r\n`
	BlobError,
	/// `:1000\r\n`
	Integer,
	/// `_\r\n`
	Null,
	/// `,3.14\r\n`
	Double,
	/// `#t\r\n`
	Boolean,
	/// `(3492890328409238509324850943850943825024385\r\n`
	BigNumber,
	/// `=15\r\ntxt:Some string\r\n`
	VerbatimString,
	/// `*2\r\n...`
	Array,
	/// `%2\r\n...`
	Map,
	/// `~5\r\n...`
	Set,
	/// `|1\r\n...` followed by the annotated element
	Attribute,
	/// `>4\r\n...`
	Push,
}

impl RespElementType {
	pub fn is_aggregate(self) -> bool {
		matches!(
			self,
			RespElementType::Array
				| RespElementType::Map
				| RespElementType::Set
				| RespElementType::Attribute
				| RespElementType::Push
		)
	}

	pub fn is_scalar(self) -> bool {
		!self.is_aggregate()
	}

	pub fn is_error(self) -> bool {
		matches!(self, RespElementType::SimpleError | RespElementType::BlobError)
	}

	/// Number of wire elements per logical child: 2 for key/value shapes.
	pub fn arity(self) -> usize {
		match self {
			RespElementType::Map | RespElementType::Attribute => 2,
			_ => 1,
		}
	}

	/// Whether this type exists in RESP2.
	pub fn is_resp2(self) -> bool {
		matches!(
			self,
			RespElementType::BlobString
				| RespElementType::SimpleString
				| RespElementType::SimpleError
				| RespElementType::Integer
				| RespElementType::Array
		)
	}

	/// Wire prefix used when this type is written.
	pub fn prefix(self) -> RespPrefix {
		match self {
			RespElementType::BlobString => RespPrefix::BlobString,
			RespElementType::SimpleString => RespPrefix::SimpleString,
			RespElementType::SimpleError => RespPrefix::SimpleError,
			RespElementType::BlobError => RespPrefix::BlobError,
			RespElementType::Integer => RespPrefix::Integer,
			RespElementType::Null => RespPrefix::Null,
			RespElementType::Double => RespPrefix::Double,
			RespElementType::Boolean => RespPrefix::Boolean,
			RespElementType::BigNumber => RespPrefix::BigNumber,
			RespElementType::VerbatimString => RespPrefix::VerbatimString,
			RespElementType::Array => RespPrefix::Array,
			RespElementType::Map => RespPrefix::Map,
			RespElementType::Set => RespPrefix::Set,
			RespElementType::Attribute => RespPrefix::Attribute,
			RespElementType::Push => RespPrefix::Push,
		}
	}
}

impl fmt::Display for RespElementType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(self, f)
	}
}

/// The leading byte of an element on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RespPrefix {
	BlobString,
	SimpleString,
	SimpleError,
	BlobError,
	Integer,
	Null,
	Double,
	Boolean,
	BigNumber,
	VerbatimString,
	Array,
	Map,
	Set,
	Attribute,
	Push,
	/// `;len\r\n` chunk of a streaming scalar
	StreamContinuation,
	/// `.\r\n` end of a streaming aggregate
	StreamTerminator,
}

impl RespPrefix {
	pub fn from_byte(b: u8) -> Option<Self> {
		let prefix = match b {
			BULK_STRING => RespPrefix::BlobString,
			SIMPLE_STRING => RespPrefix::SimpleString,
			ERROR => RespPrefix::SimpleError,
			BULK_ERROR => RespPrefix::BlobError,
			INTEGER => RespPrefix::Integer,
			NULL => RespPrefix::Null,
			DOUBLE => RespPrefix::Double,
			BOOLEAN => RespPrefix::Boolean,
			BIG_NUMBER => RespPrefix::BigNumber,
			VERBATIM_STRING => RespPrefix::VerbatimString,
			ARRAY => RespPrefix::Array,
			MAP => RespPrefix::Map,
			SET => RespPrefix::Set,
			ATTRIBUTE => RespPrefix::Attribute,
			PUSH => RespPrefix::Push,
			STREAM_CONTINUATION => RespPrefix::StreamContinuation,
			STREAM_TERMINATOR => RespPrefix::StreamTerminator,
			_ => return None,
		};
		Some(prefix)
	}

	pub fn as_byte(self) -> u8 {
		match self {
			RespPrefix::BlobString => BULK_STRING,
			RespPrefix::SimpleString => SIMPLE_STRING,
			RespPrefix::SimpleError => ERROR,
			RespPrefix::BlobError => BULK_ERROR,
			RespPrefix::Integer => INTEGER,
			RespPrefix::Null => NULL,
			RespPrefix::Double => DOUBLE,
			RespPrefix::Boolean => BOOLEAN,
			RespPrefix::BigNumber => BIG_NUMBER,
			RespPrefix::VerbatimString => VERBATIM_STRING,
			RespPrefix::Array => ARRAY,
			RespPrefix::Map => MAP,
			RespPrefix::Set => SET,
			RespPrefix::Attribute => ATTRIBUTE,
			RespPrefix::Push => PUSH,
			RespPrefix::StreamContinuation => STREAM_CONTINUATION,
			RespPrefix::StreamTerminator => STREAM_TERMINATOR,
		}
	}

	/// The element type this prefix introduces, if it introduces one.
	pub fn element_type(self) -> Option<RespElementType> {
		let ty = match self {
			RespPrefix::BlobString => RespElementType::BlobString,
			RespPrefix::SimpleString => RespElementType::SimpleString,
			RespPrefix::SimpleError => RespElementType::SimpleError,
			RespPrefix::BlobError => RespElementType::BlobError,
			RespPrefix::Integer => RespElementType::Integer,
			RespPrefix::Null => RespElementType::Null,
			RespPrefix::Double => RespElementType::Double,
			RespPrefix::Boolean => RespElementType::Boolean,
			RespPrefix::BigNumber => RespElementType::BigNumber,
			RespPrefix::VerbatimString => RespElementType::VerbatimString,
			RespPrefix::Array => RespElementType::Array,
			RespPrefix::Map => RespElementType::Map,
			RespPrefix::Set => RespElementType::Set,
			RespPrefix::Attribute => RespElementType::Attribute,
			RespPrefix::Push => RespElementType::Push,
			RespPrefix::StreamContinuation | RespPrefix::StreamTerminator => return None,
		};
		Some(ty)
	}

	/// Prefixes followed by a decimal length and a payload.
	pub fn is_length_prefixed(self) -> bool {
		matches!(
			self,
			RespPrefix::BlobString
				| RespPrefix::BlobError
				| RespPrefix::VerbatimString
				| RespPrefix::StreamContinuation
		)
	}

	/// Prefixes followed by a decimal child count and no payload.
	pub fn is_aggregate(self) -> bool {
		matches!(
			self,
			RespPrefix::Array
				| RespPrefix::Map
				| RespPrefix::Set
				| RespPrefix::Attribute
				| RespPrefix::Push
		)
	}
}

/// Classification bits for the element a reader is positioned on.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ElementFlags(u16);

impl ElementFlags {
	pub const SCALAR: ElementFlags = ElementFlags(1 << 0);
	pub const AGGREGATE: ElementFlags = ElementFlags(1 << 1);
	pub const NULL: ElementFlags = ElementFlags(1 << 2);
	pub const STREAMING: ElementFlags = ElementFlags(1 << 3);
	pub const ERROR: ElementFlags = ElementFlags(1 << 4);
	pub const ATTRIBUTE: ElementFlags = ElementFlags(1 << 5);
	pub const STREAM_TERMINATOR: ElementFlags = ElementFlags(1 << 6);
	pub const FAST_PATH: ElementFlags = ElementFlags(1 << 7);

	pub const fn empty() -> Self {
		ElementFlags(0)
	}

	pub const fn bits(self) -> u16 {
		self.0
	}

	pub const fn contains(self, other: ElementFlags) -> bool {
		self.0 & other.0 == other.0
	}

	pub const fn is_empty(self) -> bool {
		self.0 == 0
	}

	pub fn insert(&mut self, other: ElementFlags) {
		self.0 |= other.0;
	}

	pub fn remove(&mut self, other: ElementFlags) {
		self.0 &= !other.0;
	}
}

impl BitOr for ElementFlags {
	type Output = ElementFlags;

	fn bitor(self, rhs: ElementFlags) -> ElementFlags {
		ElementFlags(self.0 | rhs.0)
	}
}

impl BitOrAssign for ElementFlags {
	fn bitor_assign(&mut self, rhs: ElementFlags) {
		self.0 |= rhs.0;
	}
}

impl fmt::Debug for ElementFlags {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		const NAMES: [(ElementFlags, &str); 8] = [
			(ElementFlags::SCALAR, "SCALAR"),
			(ElementFlags::AGGREGATE, "AGGREGATE"),
			(ElementFlags::NULL, "NULL"),
			(ElementFlags::STREAMING, "STREAMING"),
			(ElementFlags::ERROR, "ERROR"),
			(ElementFlags::ATTRIBUTE, "ATTRIBUTE"),
			(ElementFlags::STREAM_TERMINATOR, "STREAM_TERMINATOR"),
			(ElementFlags::FAST_PATH, "FAST_PATH"),
		];
		let mut set = f.debug_set();
		for (flag, name) in NAMES {
			if self.contains(flag) {
				set.entry(&format_args!("{}", name));
			}
		}
		set.finish()
	}
}

/// Protocol generation spoken on a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RespVersion {
	Resp2,
	#[default]
	Resp3,
}

#[cfg(test)]
mod tests {
	use rstest::rstest;

	use super::*;

	#[rstest]
	#[case(b'$', RespPrefix::BlobString)]
	#[case(b'*', RespPrefix::Array)]
	#[case(b'|', RespPrefix::Attribute)]
	#[case(b';', RespPrefix::StreamContinuation)]
	#[case(b'.', RespPrefix::StreamTerminator)]
	fn test_prefix_byte_mapping(#[case] byte: u8, #[case] prefix: RespPrefix) {
		assert_eq!(RespPrefix::from_byte(byte), Some(prefix));
		assert_eq!(prefix.as_byte(), byte);
	}

	#[test]
	fn test_unknown_prefix() {
		assert_eq!(RespPrefix::from_byte(b'@'), None);
		assert_eq!(RespPrefix::from_byte(b'P'), None);
	}

	#[test]
	fn test_arity() {
		assert_eq!(RespElementType::Map.arity(), 2);
		assert_eq!(RespElementType::Attribute.arity(), 2);
		assert_eq!(RespElementType::Array.arity(), 1);
		assert_eq!(RespElementType::Push.arity(), 1);
		assert!(RespElementType::Set.is_aggregate());
		assert!(RespElementType::VerbatimString.is_scalar());
	}

	#[test]
	fn test_flags() {
		let mut flags = ElementFlags::AGGREGATE | ElementFlags::STREAMING;
		assert!(flags.contains(ElementFlags::STREAMING));
		assert!(!flags.contains(ElementFlags::NULL));
		flags.remove(ElementFlags::STREAMING);
		assert_eq!(flags, ElementFlags::AGGREGATE);
		assert_eq!(format!("{:?}", flags), "{AGGREGATE}");
	}
}
