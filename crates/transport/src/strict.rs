//! One request in flight at a time.
//!
//! A strict transport writes a request and then reads until the reply to it
//! arrives. Out-of-band messages seen while waiting go to the out-of-band
//! handler. [`StrictTransport`] drives an async stream, [`BlockingTransport`]
//! a blocking one.
//!
//! A send that ends without its reply, by reply timeout or by the caller
//! dropping the future, leaves that reply on the stream. The transport then
//! reports itself terminated so a pool discards it.

use std::io::Read;
use std::io::Write;
use std::time::Duration;

use bytes::Bytes;
use bytes::BytesMut;
use log::debug;
use log::error;
use resp::RespEncoder;
use resp::RespVersion;
use resp::RespWriter;
use resp::StagingBuffer;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;

use crate::OutOfBandHandler;
use crate::config::TransportConfig;
use crate::decode::ReplyDecoder;
use crate::error::TransportError;
use crate::framing::FrameScanner;
use crate::framing::decode_frame;
use crate::framing::deliver_out_of_band;

/// Receive side shared by the strict transports.
struct Inbox {
	buffer: StagingBuffer,
	scanner: FrameScanner,
	min_read: usize,
	out_of_band: Option<OutOfBandHandler>,
}

impl Inbox {
	fn new(config: &TransportConfig) -> Self {
		Inbox {
			buffer: StagingBuffer::new(config.segment_size),
			scanner: FrameScanner::new(false),
			min_read: config.min_read,
			out_of_band: None,
		}
	}

	/// The next request-response frame already buffered, routing any
	/// out-of-band frames in front of it.
	fn buffered_reply(&mut self) -> Result<Option<Bytes>, TransportError> {
		while let Some(frame) = self.scanner.next_frame(&mut self.buffer)? {
			if frame.kind.is_out_of_band() {
				deliver_out_of_band(self.out_of_band.as_ref(), &frame.bytes)?;
				continue;
			}
			return Ok(Some(frame.bytes));
		}
		Ok(None)
	}
}

fn encode_request(
	out: &mut BytesMut,
	version: RespVersion,
	request: &impl RespEncoder,
) -> Result<(), TransportError> {
	out.clear();
	request.encode_with(&mut RespWriter::new(out, version))?;
	Ok(())
}

/// Remember an error that leaves the stream unusable so later sends fail
/// fast with it. A reply timeout is one: the late reply is still unread.
fn record(failure: &mut Option<TransportError>, e: TransportError) -> TransportError {
	let unusable = e.is_fatal() || matches!(e, TransportError::Timeout);
	if unusable && failure.is_none() {
		error!("strict transport terminated: {}", e);
		*failure = Some(e.clone());
	}
	e
}

pub struct StrictTransport<S> {
	stream: S,
	inbox: Inbox,
	version: RespVersion,
	request: BytesMut,
	failure: Option<TransportError>,
	reply_timeout: Option<Duration>,
	// set while a send is between writing and reading its reply
	in_flight: bool,
}

impl<S> StrictTransport<S>
where
	S: AsyncRead + AsyncWrite + Unpin,
{
	pub fn new(stream: S, config: &TransportConfig) -> Self {
		StrictTransport {
			stream,
			inbox: Inbox::new(config),
			version: config.version(),
			request: BytesMut::new(),
			failure: None,
			reply_timeout: config.reply_timeout(),
			in_flight: false,
		}
	}

	pub fn with_out_of_band(mut self, handler: OutOfBandHandler) -> Self {
		self.inbox.out_of_band = Some(handler);
		self
	}

	/// Classify incoming messages as a subscribed connection does.
	pub fn set_subscribed(&mut self, subscribed: bool) {
		self.inbox.scanner.set_subscribed(subscribed);
	}

	/// Failed earlier, or an earlier send was abandoned before its reply.
	pub fn is_terminated(&self) -> bool {
		self.failure.is_some() || self.in_flight
	}

	pub fn into_inner(self) -> S {
		self.stream
	}

	/// Write `request` and decode its reply, waiting at most
	/// `reply_timeout_ms` when set.
	pub async fn send<D: ReplyDecoder>(
		&mut self,
		request: &impl RespEncoder,
		decoder: &D,
	) -> Result<D::Output, TransportError> {
		if self.in_flight && self.failure.is_none() {
			error!("strict transport terminated: earlier send abandoned before its reply");
			self.failure = Some(TransportError::Canceled);
		}
		if let Some(cause) = &self.failure {
			return Err(TransportError::terminated(cause));
		}
		encode_request(&mut self.request, self.version, request)?;

		self.in_flight = true;
		let exchanged = match self.reply_timeout {
			Some(limit) => tokio::time::timeout(limit, self.exchange())
				.await
				.unwrap_or(Err(TransportError::Timeout)),
			None => self.exchange().await,
		};
		self.in_flight = false;

		match exchanged {
			Ok(reply) => decode_frame(&reply, decoder),
			Err(e) => Err(record(&mut self.failure, e)),
		}
	}

	async fn exchange(&mut self) -> Result<Bytes, TransportError> {
		self.stream.write_all(&self.request).await?;
		self.stream.flush().await?;
		loop {
			if let Some(reply) = self.inbox.buffered_reply()? {
				return Ok(reply);
			}
			let n = self
				.inbox
				.buffer
				.read_from(&mut self.stream, self.inbox.min_read)
				.await?;
			if n == 0 {
				return Err(TransportError::ConnectionClosed);
			}
			debug!("read {} bytes", n);
		}
	}
}

/// [`StrictTransport`] for blocking streams.
pub struct BlockingTransport<S> {
	stream: S,
	inbox: Inbox,
	version: RespVersion,
	request: BytesMut,
	failure: Option<TransportError>,
}

impl<S> BlockingTransport<S>
where
	S: Read + Write,
{
	pub fn new(stream: S, config: &TransportConfig) -> Self {
		BlockingTransport {
			stream,
			inbox: Inbox::new(config),
			version: config.version(),
			request: BytesMut::new(),
			failure: None,
		}
	}

	pub fn with_out_of_band(mut self, handler: OutOfBandHandler) -> Self {
		self.inbox.out_of_band = Some(handler);
		self
	}

	pub fn set_subscribed(&mut self, subscribed: bool) {
		self.inbox.scanner.set_subscribed(subscribed);
	}

	pub fn is_terminated(&self) -> bool {
		self.failure.is_some()
	}

	pub fn into_inner(self) -> S {
		self.stream
	}

	pub fn send<D: ReplyDecoder>(
		&mut self,
		request: &impl RespEncoder,
		decoder: &D,
	) -> Result<D::Output, TransportError> {
		if let Some(cause) = &self.failure {
			return Err(TransportError::terminated(cause));
		}
		encode_request(&mut self.request, self.version, request)?;
		match self.exchange() {
			Ok(reply) => decode_frame(&reply, decoder),
			Err(e) => Err(record(&mut self.failure, e)),
		}
	}

	fn exchange(&mut self) -> Result<Bytes, TransportError> {
		self.stream.write_all(&self.request)?;
		self.stream.flush()?;
		self.wait_reply()
	}

	fn wait_reply(&mut self) -> Result<Bytes, TransportError> {
		loop {
			if let Some(reply) = self.inbox.buffered_reply()? {
				return Ok(reply);
			}
			let n = self
				.inbox
				.buffer
				.fill_from(&mut self.stream, self.inbox.min_read)?;
			if n == 0 {
				return Err(TransportError::ConnectionClosed);
			}
			debug!("read {} bytes", n);
		}
	}
}

#[cfg(test)]
mod tests {
	use std::io::Cursor;

	use resp::Command;

	use super::*;
	use crate::decode::IntegerDecoder;

	/// Replays canned reply bytes and records what was written.
	struct Scripted {
		replies: Cursor<Vec<u8>>,
		written: Vec<u8>,
	}

	impl Read for Scripted {
		fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
			// one byte at a time to exercise resumed scanning
			let n = buf.len().min(1);
			self.replies.read(&mut buf[..n])
		}
	}

	impl Write for Scripted {
		fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
			self.written.extend_from_slice(buf);
			Ok(buf.len())
		}

		fn flush(&mut self) -> std::io::Result<()> {
			Ok(())
		}
	}

	fn scripted(replies: &[u8]) -> BlockingTransport<Scripted> {
		let stream = Scripted {
			replies: Cursor::new(replies.to_vec()),
			written: Vec::new(),
		};
		BlockingTransport::new(stream, &TransportConfig::default())
	}

	#[test]
	fn test_blocking_round_trip() {
		let mut transport = scripted(b":3\r\n");
		let n = transport
			.send(&Command::new("INCRBY").arg("k").arg_int(3), &IntegerDecoder)
			.unwrap();
		assert_eq!(n, 3);
		assert_eq!(
			transport.into_inner().written,
			b"*3\r\n$6\r\nINCRBY\r\n$1\r\nk\r\n$1\r\n3\r\n"
		);
	}

	#[test]
	fn test_blocking_eof_terminates() {
		let mut transport = scripted(b":1");
		let err = transport
			.send(&Command::new("INCR").arg("k"), &IntegerDecoder)
			.unwrap_err();
		assert!(matches!(err, TransportError::ConnectionClosed));
		assert!(transport.is_terminated());
		assert!(matches!(
			transport.send(&Command::new("PING"), &IntegerDecoder),
			Err(TransportError::Terminated(_))
		));
	}
}
