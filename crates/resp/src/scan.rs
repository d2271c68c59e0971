//! Frame boundary detection.
//!
//! [`ScanState`] walks a [`RespReader`] element by element and reports when
//! exactly one top-level message has been seen, without building values.
//! State survives incomplete input, so a message can be scanned across any
//! number of reads.

use crate::error::ParseError;
use crate::error::RespError;
use crate::reader::RespReader;
use crate::types::ElementFlags;
use crate::types::RespElementType;

/// How a message was classified while it was scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
	/// Nothing classified yet.
	Root,
	/// Nothing classified yet, connection is in subscribed mode.
	PubSubRoot,
	/// Subscribed mode, root is an array whose first child decides.
	PubSubArrayRoot,
	/// Push data not paired with any request.
	OutOfBand,
	/// Reply to the oldest outstanding request.
	RequestResponse,
}

impl MessageKind {
	pub fn is_out_of_band(self) -> bool {
		self == MessageKind::OutOfBand
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanState {
	delta: i64,
	depth: u32,
	kind: MessageKind,
	bytes: usize,
	/// Counter value at which the first child of a subscribed-mode array
	/// root is seen.
	anchor: i64,
}

impl Default for ScanState {
	fn default() -> Self {
		Self::new()
	}
}

impl ScanState {
	pub fn new() -> Self {
		Self::with_kind(MessageKind::Root)
	}

	/// Scanner for a connection that has subscribed to channels.
	pub fn subscribed() -> Self {
		Self::with_kind(MessageKind::PubSubRoot)
	}

	fn with_kind(kind: MessageKind) -> Self {
		ScanState {
			delta: 0,
			depth: 0,
			kind,
			bytes: 0,
			anchor: 0,
		}
	}

	/// Counter for the children of the aggregate `reader` is positioned on.
	pub(crate) fn for_children(reader: &RespReader<'_>) -> Self {
		let mut state = Self::with_kind(MessageKind::RequestResponse);
		if reader.is_streaming() {
			state.depth = 1;
		} else {
			let arity = reader.element_type().map_or(1, |t| t.arity());
			let children = reader.aggregate_len().unwrap_or(0) * arity;
			state.delta = children as i64 - 1;
		}
		state
	}

	pub fn is_complete(&self) -> bool {
		self.delta == -1 && self.depth == 0
	}

	pub fn kind(&self) -> MessageKind {
		self.kind
	}

	/// Bytes of the message scanned so far; its full length once complete.
	pub fn bytes(&self) -> usize {
		self.bytes
	}

	pub fn delta(&self) -> i64 {
		self.delta
	}

	pub fn depth(&self) -> u32 {
		self.depth
	}

	/// Scan from the message start `reader` is positioned at. Returns
	/// `Ok(true)` once the message is complete, `Ok(false)` when more input
	/// is needed. Bytes already accounted for by an earlier call are skipped.
	pub fn try_scan(&mut self, reader: &mut RespReader<'_>) -> Result<bool, RespError> {
		if self.is_complete() {
			return Ok(true);
		}
		let start = reader.offset();
		reader.skip_bytes(self.bytes)?;
		while reader.try_advance_raw()? {
			self.absorb(reader)?;
			self.bytes = reader.offset() - start;
			if self.is_complete() {
				return Ok(true);
			}
		}
		Ok(false)
	}

	/// Account for the element `reader` is positioned on.
	pub(crate) fn absorb(&mut self, reader: &RespReader<'_>) -> Result<(), RespError> {
		self.classify(reader)?;
		let flags = reader.flags();

		if flags.contains(ElementFlags::STREAM_TERMINATOR) {
			if self.depth == 0 {
				return Err(ParseError::InvalidFormat(
					"stream terminator outside a streamed aggregate".into(),
				)
				.into());
			}
			self.depth -= 1;
			if self.depth == 0 {
				self.delta -= 1;
			}
			return Ok(());
		}

		if flags.contains(ElementFlags::AGGREGATE | ElementFlags::STREAMING) {
			self.depth += 1;
			return Ok(());
		}

		if self.depth > 0 {
			// attribute entries are absorbed like ordinary stream children
			if reader.is_attribute() {
				return Ok(());
			}
			if reader.is_aggregate() && !reader.is_null() && reader.aggregate_len()? > 0 {
				return Err(RespError::NotSupported(
					"sized aggregate nested in a streamed aggregate",
				));
			}
			return Ok(());
		}

		self.delta += reader.delta();
		Ok(())
	}

	fn classify(&mut self, reader: &RespReader<'_>) -> Result<(), RespError> {
		if reader.is_attribute() {
			return Ok(());
		}
		let ty = reader.element_type();
		self.kind = match self.kind {
			// still inside the children of a leading attribute
			MessageKind::Root | MessageKind::PubSubRoot if self.delta > 0 => return Ok(()),
			MessageKind::Root => match ty {
				Some(RespElementType::Push) => MessageKind::OutOfBand,
				_ => MessageKind::RequestResponse,
			},
			MessageKind::PubSubRoot => match (ty, reader.aggregate_len()) {
				(Some(RespElementType::Array), Ok(len @ (1 | 2))) => {
					self.anchor = self.delta + len as i64 - 1;
					MessageKind::PubSubArrayRoot
				}
				(Some(t), _) if t.is_error() => MessageKind::RequestResponse,
				_ => MessageKind::OutOfBand,
			},
			MessageKind::PubSubArrayRoot if self.delta != self.anchor => return Ok(()),
			MessageKind::PubSubArrayRoot => {
				if reader.is_scalar()
					&& !reader.is_null()
					&& reader.read_value()?.to_bytes()?.eq_ignore_ascii_case(b"pong")
				{
					MessageKind::RequestResponse
				} else {
					MessageKind::OutOfBand
				}
			}
			settled => settled,
		};
		Ok(())
	}
}
