//! RESP value representation.
//!
//! A [`RespValue`] is one element's payload plus its [`RespElementType`].
//! Small scalars live inline, large ones in shared [`Bytes`], and values
//! produced by a [`RespReader`](crate::RespReader) over borrowed input keep
//! pointing into that input until [`RespValue::preserve`] copies them out.

use std::borrow::Cow;
use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use bytes::BytesMut;

use crate::error::ParseError;
use crate::error::RespError;
use crate::types::RespElementType;
use crate::utils::IntBuf;
use crate::utils::format_double;
use crate::utils::parse_boolean;
use crate::utils::parse_double;
use crate::utils::parse_integer;

/// Largest payload stored without a heap allocation.
pub const INLINE_CAPACITY: usize = 23;

#[derive(Clone, Copy)]
struct InlineBytes {
	len: u8,
	buf: [u8; INLINE_CAPACITY],
}

impl InlineBytes {
	fn new(src: &[u8]) -> Self {
		debug_assert!(src.len() <= INLINE_CAPACITY);
		let mut buf = [0u8; INLINE_CAPACITY];
		buf[..src.len()].copy_from_slice(src);
		InlineBytes {
			len: src.len() as u8,
			buf,
		}
	}

	fn as_slice(&self) -> &[u8] {
		&self.buf[..self.len as usize]
	}
}

#[derive(Clone)]
enum Storage<'a> {
	Empty,
	Null,
	Inline(InlineBytes),
	Int32(i32),
	Int64(i64),
	Double(f64),
	Shared(Bytes),
	Borrowed(&'a [u8]),
	Segmented(Arc<[&'a [u8]]>),
	Single(Arc<RespValue<'a>>),
	Children(Arc<[RespValue<'a>]>),
}

/// One RESP element: scalar, aggregate or null.
///
/// Cloning is cheap: payloads and children are shared, never deep-copied.
#[derive(Clone)]
pub struct RespValue<'a> {
	ty: RespElementType,
	storage: Storage<'a>,
}

fn owned_storage(src: &[u8]) -> Storage<'static> {
	if src.is_empty() {
		Storage::Empty
	} else if src.len() <= INLINE_CAPACITY {
		Storage::Inline(InlineBytes::new(src))
	} else {
		Storage::Shared(Bytes::copy_from_slice(src))
	}
}

fn shared_storage(src: Bytes) -> Storage<'static> {
	if src.len() <= INLINE_CAPACITY {
		owned_storage(&src)
	} else {
		Storage::Shared(src)
	}
}

impl RespValue<'static> {
	/// A scalar holding a copy of `bytes`.
	pub fn scalar(ty: RespElementType, bytes: impl AsRef<[u8]>) -> Self {
		debug_assert!(ty.is_scalar());
		RespValue {
			ty,
			storage: owned_storage(bytes.as_ref()),
		}
	}

	/// A scalar sharing `bytes` without copying large payloads.
	pub fn shared(ty: RespElementType, bytes: Bytes) -> Self {
		debug_assert!(ty.is_scalar());
		RespValue {
			ty,
			storage: shared_storage(bytes),
		}
	}

	/// Create a simple string value
	pub fn simple_string(s: impl AsRef<[u8]>) -> Self {
		Self::scalar(RespElementType::SimpleString, s)
	}

	/// Create a bulk string value
	pub fn bulk_string(s: impl AsRef<[u8]>) -> Self {
		Self::scalar(RespElementType::BlobString, s)
	}

	/// Create an error value
	pub fn error(e: impl AsRef<[u8]>) -> Self {
		Self::scalar(RespElementType::SimpleError, e)
	}

	/// Create a bulk error value
	pub fn blob_error(e: impl AsRef<[u8]>) -> Self {
		Self::scalar(RespElementType::BlobError, e)
	}

	/// Create an integer value
	pub fn integer(i: i64) -> Self {
		RespValue {
			ty: RespElementType::Integer,
			storage: Storage::Int64(i),
		}
	}

	pub fn double(d: f64) -> Self {
		RespValue {
			ty: RespElementType::Double,
			storage: Storage::Double(d),
		}
	}

	pub fn boolean(b: bool) -> Self {
		Self::scalar(RespElementType::Boolean, if b { b"t" } else { b"f" })
	}

	pub fn big_number(digits: impl AsRef<[u8]>) -> Self {
		Self::scalar(RespElementType::BigNumber, digits)
	}

	/// Verbatim string; `format` is the three byte encoding hint, e.g. `txt`.
	pub fn verbatim(format: &str, text: impl AsRef<[u8]>) -> Self {
		let text = text.as_ref();
		let mut payload = Vec::with_capacity(4 + text.len());
		payload.extend_from_slice(format.as_bytes());
		payload.push(b':');
		payload.extend_from_slice(text);
		Self::scalar(RespElementType::VerbatimString, payload)
	}

	/// Create a null value
	pub fn null() -> Self {
		Self::null_of(RespElementType::Null)
	}

	/// A null of a specific type, e.g. `$-1` or `*-1`.
	pub fn null_of(ty: RespElementType) -> Self {
		RespValue {
			ty,
			storage: Storage::Null,
		}
	}
}

impl<'a> RespValue<'a> {
	/// A scalar viewing `bytes` without copying.
	pub fn borrowed(ty: RespElementType, bytes: &'a [u8]) -> Self {
		debug_assert!(ty.is_scalar());
		RespValue {
			ty,
			storage: if bytes.is_empty() {
				Storage::Empty
			} else {
				Storage::Borrowed(bytes)
			},
		}
	}

	pub(crate) fn segmented(ty: RespElementType, mut parts: Vec<&'a [u8]>) -> Self {
		parts.retain(|p| !p.is_empty());
		match parts.len() {
			0 => RespValue {
				ty,
				storage: Storage::Empty,
			},
			1 => Self::borrowed(ty, parts[0]),
			_ => RespValue {
				ty,
				storage: Storage::Segmented(parts.into()),
			},
		}
	}

	/// An aggregate of the given type. Maps and attributes take a flat
	/// key, value, key, value sequence.
	pub fn aggregate(ty: RespElementType, mut children: Vec<RespValue<'a>>) -> Self {
		debug_assert!(ty.is_aggregate());
		debug_assert_eq!(children.len() % ty.arity(), 0);
		let storage = match children.len() {
			0 => Storage::Empty,
			1 => Storage::Single(Arc::new(children.remove(0))),
			_ => Storage::Children(children.into()),
		};
		RespValue { ty, storage }
	}

	/// Create an array value from an iterator
	pub fn array(items: impl IntoIterator<Item = RespValue<'a>>) -> Self {
		Self::aggregate(RespElementType::Array, items.into_iter().collect())
	}

	pub fn set(items: impl IntoIterator<Item = RespValue<'a>>) -> Self {
		Self::aggregate(RespElementType::Set, items.into_iter().collect())
	}

	pub fn push(items: impl IntoIterator<Item = RespValue<'a>>) -> Self {
		Self::aggregate(RespElementType::Push, items.into_iter().collect())
	}

	pub fn map(pairs: impl IntoIterator<Item = (RespValue<'a>, RespValue<'a>)>) -> Self {
		Self::aggregate(RespElementType::Map, flatten_pairs(pairs))
	}

	pub fn attribute(pairs: impl IntoIterator<Item = (RespValue<'a>, RespValue<'a>)>) -> Self {
		Self::aggregate(RespElementType::Attribute, flatten_pairs(pairs))
	}

	pub fn element_type(&self) -> RespElementType {
		self.ty
	}

	/// Check if the value is null
	pub fn is_null(&self) -> bool {
		matches!(self.storage, Storage::Null)
	}

	/// Check if the value is an error
	pub fn is_error(&self) -> bool {
		self.ty.is_error()
	}

	pub fn is_aggregate(&self) -> bool {
		self.ty.is_aggregate()
	}

	/// Whether any part of this value still points into borrowed memory.
	pub fn is_borrowed(&self) -> bool {
		match &self.storage {
			Storage::Borrowed(_) | Storage::Segmented(_) => true,
			Storage::Single(child) => child.is_borrowed(),
			Storage::Children(children) => children.iter().any(|c| c.is_borrowed()),
			_ => false,
		}
	}

	/// Copy every borrowed payload into owned storage so the value can
	/// outlive the buffer it was read from.
	pub fn preserve(&self) -> RespValue<'static> {
		let storage = match &self.storage {
			Storage::Empty => Storage::Empty,
			Storage::Null => Storage::Null,
			Storage::Inline(inline) => Storage::Inline(*inline),
			Storage::Int32(i) => Storage::Int32(*i),
			Storage::Int64(i) => Storage::Int64(*i),
			Storage::Double(d) => Storage::Double(*d),
			Storage::Shared(b) => Storage::Shared(b.clone()),
			Storage::Borrowed(b) => owned_storage(b),
			Storage::Segmented(parts) => {
				let total: usize = parts.iter().map(|p| p.len()).sum();
				let mut joined = BytesMut::with_capacity(total);
				for part in parts.iter() {
					joined.extend_from_slice(part);
				}
				shared_storage(joined.freeze())
			}
			Storage::Single(child) => Storage::Single(Arc::new(child.preserve())),
			Storage::Children(children) => {
				Storage::Children(children.iter().map(|c| c.preserve()).collect())
			}
		};
		RespValue {
			ty: self.ty,
			storage,
		}
	}

	/// Children of an aggregate, flat for maps and attributes.
	pub fn children(&self) -> Result<&[RespValue<'a>], RespError> {
		if !self.ty.is_aggregate() {
			return Err(RespError::wrong_type("aggregate", Some(self.ty)));
		}
		Ok(match &self.storage {
			Storage::Single(child) => std::slice::from_ref(&**child),
			Storage::Children(children) => children,
			_ => &[],
		})
	}

	/// Number of logical children: pairs for maps and attributes.
	pub fn aggregate_len(&self) -> Result<usize, RespError> {
		Ok(self.children()?.len() / self.ty.arity())
	}

	/// Key/value pairs of a map or attribute.
	pub fn pairs(&self) -> Result<impl Iterator<Item = (&RespValue<'a>, &RespValue<'a>)>, RespError> {
		if self.ty.arity() != 2 {
			return Err(RespError::wrong_type("map", Some(self.ty)));
		}
		Ok(self.children()?.chunks_exact(2).map(|kv| (&kv[0], &kv[1])))
	}

	/// Try to consume and convert to Vec<RespValue>
	pub fn into_vec(self) -> Option<Vec<RespValue<'a>>> {
		match self.storage {
			Storage::Empty if self.ty.is_aggregate() => Some(Vec::new()),
			Storage::Single(child) => {
				Some(vec![Arc::try_unwrap(child).unwrap_or_else(|c| (*c).clone())])
			}
			Storage::Children(children) => Some(children.to_vec()),
			_ => None,
		}
	}

	fn scalar_bytes(&self) -> Option<Cow<'_, [u8]>> {
		let bytes = match &self.storage {
			Storage::Empty if self.ty.is_scalar() => Cow::Borrowed(&[][..]),
			Storage::Inline(inline) => Cow::Borrowed(inline.as_slice()),
			Storage::Int32(i) => Cow::Owned(IntBuf::new(*i as i64).as_bytes().to_vec()),
			Storage::Int64(i) => Cow::Owned(IntBuf::new(*i).as_bytes().to_vec()),
			Storage::Double(d) => Cow::Owned(format_double(*d).into_bytes()),
			Storage::Shared(b) => Cow::Borrowed(&b[..]),
			Storage::Borrowed(b) => Cow::Borrowed(*b),
			Storage::Segmented(parts) => Cow::Owned(parts.concat()),
			_ => return None,
		};
		Some(bytes)
	}

	/// The scalar payload, copied only when it is not contiguous.
	pub fn to_bytes(&self) -> Result<Cow<'_, [u8]>, RespError> {
		self.require_scalar("scalar")
	}

	/// Try to convert to a string slice
	pub fn as_str(&self) -> Option<Cow<'_, str>> {
		match self.text_bytes()? {
			Cow::Borrowed(b) => std::str::from_utf8(b).ok().map(Cow::Borrowed),
			Cow::Owned(v) => String::from_utf8(v).ok().map(Cow::Owned),
		}
	}

	/// Convert to String with lossy UTF-8 conversion
	pub fn to_string_lossy(&self) -> Option<String> {
		self.text_bytes()
			.map(|b| String::from_utf8_lossy(&b).into_owned())
	}

	/// Scalar bytes with the verbatim `xxx:` hint removed.
	fn text_bytes(&self) -> Option<Cow<'_, [u8]>> {
		let bytes = self.scalar_bytes()?;
		if self.ty != RespElementType::VerbatimString || bytes.len() < 4 || bytes[3] != b':' {
			return Some(bytes);
		}
		Some(match bytes {
			Cow::Borrowed(b) => Cow::Borrowed(&b[4..]),
			Cow::Owned(mut v) => {
				v.drain(..4);
				Cow::Owned(v)
			}
		})
	}

	/// Encoding hint of a verbatim string, e.g. `txt` or `mkd`.
	pub fn verbatim_format(&self) -> Option<String> {
		if self.ty != RespElementType::VerbatimString {
			return None;
		}
		let bytes = self.scalar_bytes()?;
		(bytes.len() >= 4 && bytes[3] == b':')
			.then(|| String::from_utf8_lossy(&bytes[..3]).into_owned())
	}

	fn require_scalar(&self, expected: &'static str) -> Result<Cow<'_, [u8]>, RespError> {
		self.scalar_bytes()
			.ok_or(RespError::wrong_type(expected, Some(self.ty)))
	}

	pub fn as_string(&self) -> Result<String, RespError> {
		let bytes = self
			.text_bytes()
			.ok_or(RespError::wrong_type("string", Some(self.ty)))?;
		match bytes {
			Cow::Borrowed(b) => Ok(std::str::from_utf8(b)?.to_owned()),
			Cow::Owned(v) => String::from_utf8(v)
				.map_err(|e| ParseError::Utf8Error(e.to_string()).into()),
		}
	}

	pub fn as_i64(&self) -> Result<i64, RespError> {
		match &self.storage {
			Storage::Int64(i) => return Ok(*i),
			Storage::Int32(i) => return Ok(*i as i64),
			Storage::Double(d) if d.fract() == 0.0 && d.is_finite() => return Ok(*d as i64),
			_ => {}
		}
		let bytes = self.require_scalar("integer")?;
		if self.ty == RespElementType::Boolean {
			return Ok(parse_boolean(&bytes)? as i64);
		}
		Ok(parse_integer(&bytes)?)
	}

	pub fn as_i32(&self) -> Result<i32, RespError> {
		let wide = self.as_i64()?;
		i32::try_from(wide)
			.map_err(|_| ParseError::InvalidInteger(format!("{} out of range for i32", wide)).into())
	}

	pub fn as_f64(&self) -> Result<f64, RespError> {
		match &self.storage {
			Storage::Double(d) => return Ok(*d),
			Storage::Int64(i) => return Ok(*i as f64),
			Storage::Int32(i) => return Ok(*i as f64),
			_ => {}
		}
		let bytes = self.require_scalar("double")?;
		Ok(parse_double(&bytes)?)
	}

	pub fn as_bool(&self) -> Result<bool, RespError> {
		match &self.storage {
			Storage::Int64(i) => return Ok(*i != 0),
			Storage::Int32(i) => return Ok(*i != 0),
			_ => {}
		}
		let bytes = self.require_scalar("boolean")?;
		Ok(parse_boolean(&bytes)?)
	}

	/// Parse the textual payload, e.g. into a caller-defined enum.
	pub fn parse<T>(&self) -> Result<T, RespError>
	where
		T: FromStr,
		T::Err: fmt::Display,
	{
		let text = self.as_string()?;
		text.parse::<T>()
			.map_err(|e| ParseError::InvalidFormat(format!("{:?}: {}", text, e)).into())
	}

	/// Payload size in bytes, without materializing segmented payloads.
	pub fn byte_len(&self) -> usize {
		match &self.storage {
			Storage::Inline(inline) => inline.len as usize,
			Storage::Shared(b) => b.len(),
			Storage::Borrowed(b) => b.len(),
			Storage::Segmented(parts) => parts.iter().map(|p| p.len()).sum(),
			Storage::Int32(i) => IntBuf::new(*i as i64).as_bytes().len(),
			Storage::Int64(i) => IntBuf::new(*i).as_bytes().len(),
			Storage::Double(d) => format_double(*d).len(),
			Storage::Empty | Storage::Null | Storage::Single(_) | Storage::Children(_) => 0,
		}
	}

	/// Copy the scalar payload into `dst`, returning the bytes written.
	/// `None` if this is not a scalar or `dst` is too small.
	pub fn copy_to(&self, dst: &mut [u8]) -> Option<usize> {
		if let Storage::Segmented(parts) = &self.storage {
			if dst.len() < self.byte_len() {
				return None;
			}
			let mut at = 0;
			for part in parts.iter() {
				dst[at..at + part.len()].copy_from_slice(part);
				at += part.len();
			}
			return Some(at);
		}
		let bytes = self.scalar_bytes()?;
		let dst = dst.get_mut(..bytes.len())?;
		dst.copy_from_slice(&bytes);
		Some(bytes.len())
	}
}

fn flatten_pairs<'a>(
	pairs: impl IntoIterator<Item = (RespValue<'a>, RespValue<'a>)>,
) -> Vec<RespValue<'a>> {
	let mut flat = Vec::new();
	for (k, v) in pairs {
		flat.push(k);
		flat.push(v);
	}
	flat
}

/// All nulls are equal whatever their type tag: RESP3 writes a single null,
/// so `$-1` and `*-1` read back as the same value.
impl PartialEq for RespValue<'_> {
	fn eq(&self, other: &Self) -> bool {
		if self.is_null() || other.is_null() {
			return self.is_null() == other.is_null();
		}
		if self.ty != other.ty {
			return false;
		}
		if self.ty.is_aggregate() {
			return match (self.children(), other.children()) {
				(Ok(a), Ok(b)) => a == b,
				_ => false,
			};
		}
		self.scalar_bytes() == other.scalar_bytes()
	}
}

impl Eq for RespValue<'_> {}

impl Hash for RespValue<'_> {
	fn hash<H: Hasher>(&self, state: &mut H) {
		if self.is_null() {
			0u8.hash(state);
			return;
		}
		self.ty.hash(state);
		if let Ok(children) = self.children() {
			children.hash(state);
		} else if let Some(bytes) = self.scalar_bytes() {
			bytes.hash(state);
		}
	}
}

impl fmt::Debug for RespValue<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.is_null() {
			return write!(f, "{:?}(null)", self.ty);
		}
		match self.children() {
			Ok(children) => {
				write!(f, "{:?}", self.ty)?;
				f.debug_list().entries(children).finish()
			}
			Err(_) => {
				let bytes = self.scalar_bytes().unwrap_or_default();
				write!(f, "{:?}({:?})", self.ty, String::from_utf8_lossy(&bytes))
			}
		}
	}
}

impl fmt::Display for RespValue<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.is_null() {
			return f.write_str("(nil)");
		}
		match self.children() {
			Ok(children) => {
				f.write_str("[")?;
				for (i, child) in children.iter().enumerate() {
					if i > 0 {
						f.write_str(", ")?;
					}
					write!(f, "{}", child)?;
				}
				f.write_str("]")
			}
			Err(_) => {
				let text = self.text_bytes().unwrap_or_default();
				f.write_str(&String::from_utf8_lossy(&text))
			}
		}
	}
}

// Convenient From implementations
impl From<&str> for RespValue<'_> {
	fn from(s: &str) -> Self {
		RespValue::bulk_string(s)
	}
}

impl From<String> for RespValue<'_> {
	fn from(s: String) -> Self {
		RespValue::shared(RespElementType::BlobString, Bytes::from(s))
	}
}

impl From<&[u8]> for RespValue<'_> {
	fn from(b: &[u8]) -> Self {
		RespValue::bulk_string(b)
	}
}

impl From<Vec<u8>> for RespValue<'_> {
	fn from(v: Vec<u8>) -> Self {
		RespValue::shared(RespElementType::BlobString, Bytes::from(v))
	}
}

impl From<Bytes> for RespValue<'_> {
	fn from(b: Bytes) -> Self {
		RespValue::shared(RespElementType::BlobString, b)
	}
}

impl From<i64> for RespValue<'_> {
	fn from(i: i64) -> Self {
		RespValue::integer(i)
	}
}

impl From<i32> for RespValue<'_> {
	fn from(i: i32) -> Self {
		RespValue {
			ty: RespElementType::Integer,
			storage: Storage::Int32(i),
		}
	}
}

impl From<bool> for RespValue<'_> {
	fn from(b: bool) -> Self {
		RespValue::boolean(b)
	}
}

impl From<f64> for RespValue<'_> {
	fn from(d: f64) -> Self {
		RespValue::double(d)
	}
}

impl<'a> From<Vec<RespValue<'a>>> for RespValue<'a> {
	fn from(v: Vec<RespValue<'a>>) -> Self {
		RespValue::array(v)
	}
}

impl<'a, T: Into<RespValue<'a>>> From<Option<T>> for RespValue<'a> {
	fn from(o: Option<T>) -> Self {
		match o {
			Some(v) => v.into(),
			None => RespValue::null(),
		}
	}
}
