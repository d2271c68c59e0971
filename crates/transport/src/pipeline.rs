//! Many requests in flight on one connection.
//!
//! Under the queue lock, a sender appends its pending call to the FIFO queue
//! and hands its encoded request to the writer task, so queue order always
//! matches wire order. Neither step awaits, so a caller that gives up can
//! never leave half a request on the wire or a record without a request.
//! A read loop task owns the read half and the staging buffer and forwards
//! every complete frame to a worker task. The worker pairs request-response
//! frames with the oldest pending call, decodes them and completes the
//! caller. Out-of-band frames go to the out-of-band handler.
//!
//! Any failure of the connection itself fails every pending call with the
//! same cause and terminates the transport.

use std::collections::VecDeque;
use std::io;
use std::panic;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use bytes::Bytes;
use bytes::BytesMut;
use log::debug;
use log::error;
use log::warn;
use resp::RespEncoder;
use resp::RespVersion;
use resp::RespWriter;
use resp::StagingBuffer;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::io::ReadHalf;
use tokio::io::WriteHalf;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::OutOfBandHandler;
use crate::config::TransportConfig;
use crate::decode::ReplyDecoder;
use crate::error::TransportError;
use crate::framing::Frame;
use crate::framing::FrameScanner;
use crate::framing::decode_frame;
use crate::framing::deliver_out_of_band;

const MAX_BATCH: usize = 256;

/// Decodes one reply and completes its caller.
type PendingCall = Box<dyn FnOnce(Result<Bytes, TransportError>) + Send>;

enum WorkerMessage {
	Frame(Frame),
	Fail(TransportError),
}

#[derive(Default)]
struct CallQueue {
	calls: VecDeque<PendingCall>,
	terminated: Option<TransportError>,
}

#[derive(Default)]
struct Shared {
	queue: Mutex<CallQueue>,
	subscribed: AtomicBool,
}

impl Shared {
	fn queue(&self) -> MutexGuard<'_, CallQueue> {
		self.queue.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Queue `call` and pass `request` to the writer as one step.
	fn enqueue(
		&self,
		call: PendingCall,
		request: Bytes,
		writer: &mpsc::UnboundedSender<Bytes>,
	) -> Result<(), TransportError> {
		let mut queue = self.queue();
		if let Some(cause) = &queue.terminated {
			return Err(TransportError::terminated(cause));
		}
		if writer.send(request).is_err() {
			return Err(TransportError::ConnectionClosed);
		}
		queue.calls.push_back(call);
		Ok(())
	}

	fn pop(&self) -> Option<PendingCall> {
		self.queue().calls.pop_front()
	}

	fn terminated(&self) -> Option<TransportError> {
		self.queue().terminated.clone()
	}

	/// Terminate with `cause` and fail every pending call with it. Only the
	/// first cause is kept.
	fn fail_all(&self, cause: TransportError) {
		let drained: Vec<PendingCall> = {
			let mut queue = self.queue();
			if queue.terminated.is_some() {
				return;
			}
			queue.terminated = Some(cause.clone());
			queue.calls.drain(..).collect()
		};
		if drained.is_empty() {
			debug!("pipelined connection terminated: {}", cause);
		} else {
			error!(
				"pipelined connection terminated, failing {} pending calls: {}",
				drained.len(),
				cause
			);
		}
		for call in drained {
			call(Err(cause.clone()));
		}
	}
}

/// Terminates the transport when the task holding it ends, panics
/// included. A no-op when a cause was already recorded.
struct FailOnExit(Arc<Shared>);

impl Drop for FailOnExit {
	fn drop(&mut self) {
		self.0.fail_all(TransportError::ConnectionClosed);
	}
}

pub struct PipelinedTransport {
	shared: Arc<Shared>,
	requests: mpsc::UnboundedSender<Bytes>,
	version: RespVersion,
	reply_timeout: Option<Duration>,
	read_task: JoinHandle<()>,
	write_task: JoinHandle<()>,
	worker_task: JoinHandle<()>,
}

impl PipelinedTransport {
	/// Split `stream` and start its read loop, writer and worker. Must be
	/// called inside a tokio runtime.
	pub fn spawn<S>(
		stream: S,
		config: &TransportConfig,
		out_of_band: Option<OutOfBandHandler>,
	) -> Self
	where
		S: AsyncRead + AsyncWrite + Send + 'static,
	{
		let (read_half, write_half) = tokio::io::split(stream);
		let shared = Arc::new(Shared::default());
		let (frame_tx, frame_rx) = mpsc::unbounded_channel();
		let (request_tx, request_rx) = mpsc::unbounded_channel();

		let read_task = tokio::spawn(read_loop(
			read_half,
			StagingBuffer::new(config.segment_size),
			config.min_read,
			shared.clone(),
			frame_tx,
		));
		let write_task = tokio::spawn(write_loop(write_half, request_rx, shared.clone()));
		let worker_task = tokio::spawn(worker_loop(frame_rx, shared.clone(), out_of_band));

		PipelinedTransport {
			shared,
			requests: request_tx,
			version: config.version(),
			reply_timeout: config.reply_timeout(),
			read_task,
			write_task,
			worker_task,
		}
	}

	/// Send `request` and wait for its decoded reply. Safe to call from many
	/// tasks at once; replies are matched to requests in write order.
	///
	/// Giving up on the reply, by timeout or by dropping the future, does
	/// not unqueue the request: it is still written whole, and its reply is
	/// read and discarded.
	pub async fn send<D: ReplyDecoder>(
		&self,
		request: &impl RespEncoder,
		decoder: D,
	) -> Result<D::Output, TransportError> {
		if let Some(cause) = self.shared.terminated() {
			return Err(TransportError::terminated(&cause));
		}
		let mut encoded = BytesMut::new();
		request.encode_with(&mut RespWriter::new(&mut encoded, self.version))?;

		let (tx, rx) = oneshot::channel();
		let call: PendingCall = Box::new(move |frame| {
			let result = frame.and_then(|bytes| decode_guarded(&bytes, &decoder));
			if tx.send(result).is_err() {
				warn!("Failed to deliver reply; receiver dropped");
			}
		});
		self.shared.enqueue(call, encoded.freeze(), &self.requests)?;

		let reply = match self.reply_timeout {
			Some(limit) => tokio::time::timeout(limit, rx)
				.await
				.map_err(|_| TransportError::Timeout)?,
			None => rx.await,
		};
		reply.map_err(|_| TransportError::Canceled)?
	}

	/// Classify incoming messages as a subscribed connection does, from the
	/// next message on.
	pub fn set_subscribed(&self, subscribed: bool) {
		self.shared.subscribed.store(subscribed, Ordering::Release);
	}

	pub fn is_subscribed(&self) -> bool {
		self.shared.subscribed.load(Ordering::Acquire)
	}

	pub fn is_terminated(&self) -> bool {
		self.shared.terminated().is_some()
	}

	/// Calls queued and not yet answered.
	pub fn pending(&self) -> usize {
		self.shared.queue().calls.len()
	}
}

impl Drop for PipelinedTransport {
	fn drop(&mut self) {
		self.read_task.abort();
		self.write_task.abort();
		self.worker_task.abort();
		self.shared.fail_all(TransportError::ConnectionClosed);
	}
}

/// A panicking decoder fails its own call and leaves the worker running.
fn decode_guarded<D: ReplyDecoder>(
	bytes: &Bytes,
	decoder: &D,
) -> Result<D::Output, TransportError> {
	match panic::catch_unwind(AssertUnwindSafe(|| decode_frame(bytes, decoder))) {
		Ok(result) => result,
		Err(_) => {
			error!("reply decoder panicked");
			Err(TransportError::DecoderPanicked)
		}
	}
}

async fn write_loop<S>(
	mut writer: WriteHalf<S>,
	mut rx: mpsc::UnboundedReceiver<Bytes>,
	shared: Arc<Shared>,
) where
	S: AsyncWrite + Send,
{
	let mut batch = Vec::with_capacity(64);
	while let Some(request) = rx.recv().await {
		batch.push(request);
		while batch.len() < MAX_BATCH {
			match rx.try_recv() {
				Ok(request) => batch.push(request),
				Err(_) => break,
			}
		}
		if let Err(e) = write_batch(&mut writer, &mut batch).await {
			shared.fail_all(e.into());
			return;
		}
	}
}

async fn write_batch<W>(writer: &mut W, batch: &mut Vec<Bytes>) -> io::Result<()>
where
	W: AsyncWrite + Unpin,
{
	for request in batch.drain(..) {
		writer.write_all(&request).await?;
	}
	writer.flush().await
}

async fn read_loop<S>(
	mut reader: ReadHalf<S>,
	mut buffer: StagingBuffer,
	min_read: usize,
	shared: Arc<Shared>,
	tx: mpsc::UnboundedSender<WorkerMessage>,
) where
	S: AsyncRead + Send,
{
	let mut scanner = FrameScanner::new(false);
	let failure = loop {
		scanner.set_subscribed(shared.subscribed.load(Ordering::Acquire));
		match scanner.next_frame(&mut buffer) {
			Ok(Some(frame)) => {
				if tx.send(WorkerMessage::Frame(frame)).is_err() {
					shared.fail_all(TransportError::ConnectionClosed);
					return;
				}
				continue;
			}
			Ok(None) => {}
			Err(e) => break TransportError::from(e),
		}
		match buffer.read_from(&mut reader, min_read).await {
			Ok(0) => break TransportError::ConnectionClosed,
			Ok(n) => debug!("Read {} bytes from socket", n),
			Err(e) => break TransportError::from(e),
		}
	};
	let _ = tx.send(WorkerMessage::Fail(failure));
}

async fn worker_loop(
	mut rx: mpsc::UnboundedReceiver<WorkerMessage>,
	shared: Arc<Shared>,
	out_of_band: Option<OutOfBandHandler>,
) {
	let _guard = FailOnExit(shared.clone());
	let mut batch = Vec::with_capacity(64);
	while let Some(msg) = rx.recv().await {
		batch.push(msg);
		while batch.len() < MAX_BATCH {
			match rx.try_recv() {
				Ok(msg) => batch.push(msg),
				Err(_) => break,
			}
		}
		for msg in batch.drain(..) {
			match msg {
				WorkerMessage::Frame(frame) if frame.kind.is_out_of_band() => {
					if let Err(e) = deliver_out_of_band(out_of_band.as_ref(), &frame.bytes) {
						shared.fail_all(e.into());
						return;
					}
				}
				WorkerMessage::Frame(frame) => match shared.pop() {
					Some(call) => call(Ok(frame.bytes)),
					None => {
						shared.fail_all(TransportError::UnexpectedReply);
						return;
					}
				},
				WorkerMessage::Fail(cause) => {
					shared.fail_all(cause);
					return;
				}
			}
		}
	}
}
