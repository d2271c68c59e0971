//! Cutting complete messages out of a staging buffer.

use bytes::Bytes;
use log::debug;
use log::trace;
use resp::MessageKind;
use resp::RespError;
use resp::RespReader;
use resp::RespValue;
use resp::ScanState;
use resp::StagingBuffer;

use crate::OutOfBandHandler;
use crate::decode::ReplyDecoder;
use crate::error::TransportError;

#[derive(Debug, Clone)]
pub(crate) struct Frame {
	pub(crate) bytes: Bytes,
	pub(crate) kind: MessageKind,
}

/// Scan state for the message at the front of a staging buffer, kept across
/// reads so bytes already examined are not scanned again.
#[derive(Debug)]
pub(crate) struct FrameScanner {
	state: ScanState,
	subscribed: bool,
}

impl FrameScanner {
	pub(crate) fn new(subscribed: bool) -> Self {
		FrameScanner {
			state: Self::fresh(subscribed),
			subscribed,
		}
	}

	fn fresh(subscribed: bool) -> ScanState {
		if subscribed {
			ScanState::subscribed()
		} else {
			ScanState::new()
		}
	}

	/// Takes effect from the next message; one already being scanned keeps
	/// its classification.
	pub(crate) fn set_subscribed(&mut self, subscribed: bool) {
		if self.subscribed == subscribed {
			return;
		}
		self.subscribed = subscribed;
		if self.state.bytes() == 0 {
			self.state = Self::fresh(subscribed);
		}
	}

	/// Split the next complete message off the front of `buffer`, or `None`
	/// when more bytes are needed.
	pub(crate) fn next_frame(&mut self, buffer: &mut StagingBuffer) -> Result<Option<Frame>, RespError> {
		if buffer.is_empty() {
			return Ok(None);
		}
		let complete = {
			let segments = buffer.segments();
			let mut reader = RespReader::from_segments(&segments);
			self.state.try_scan(&mut reader)?
		};
		if !complete {
			return Ok(None);
		}
		let kind = self.state.kind();
		let bytes = buffer.take(self.state.bytes());
		self.state = Self::fresh(self.subscribed);
		trace!("framed {} byte {:?} message", bytes.len(), kind);
		Ok(Some(Frame { bytes, kind }))
	}
}

/// Run `decoder` over one complete reply.
pub(crate) fn decode_frame<D: ReplyDecoder>(
	bytes: &Bytes,
	decoder: &D,
) -> Result<D::Output, TransportError> {
	let mut reader = RespReader::from_bytes(bytes);
	Ok(decoder.decode(&mut reader)?)
}

/// An out-of-band message as an owned value, leading attributes dropped.
pub(crate) fn read_message(bytes: &Bytes) -> Result<RespValue<'static>, RespError> {
	let mut reader = RespReader::from_bytes(bytes);
	loop {
		reader.advance_raw()?;
		if !reader.is_attribute() {
			break;
		}
		reader.skip_children()?;
	}
	Ok(reader.read_tree()?.preserve())
}

/// Hand an out-of-band message to `handler`, or drop it when there is none.
pub(crate) fn deliver_out_of_band(
	handler: Option<&OutOfBandHandler>,
	bytes: &Bytes,
) -> Result<(), RespError> {
	let message = read_message(bytes)?;
	match handler {
		Some(handler) => handler(message),
		None => debug!("no out-of-band handler, dropping {}", message),
	}
	Ok(())
}
