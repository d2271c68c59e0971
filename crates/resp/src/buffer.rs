//! Segmented receive buffer.
//!
//! Socket reads land in the tail segment. When the tail runs out of room a
//! new segment is started instead of growing the old one, so bytes that were
//! already examined are never moved. Frames are handed out from the front.

use std::collections::VecDeque;
use std::io;
use std::io::Read;

use bytes::Buf;
use bytes::Bytes;
use bytes::BytesMut;
use smallvec::SmallVec;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;

/// Default size of a freshly allocated segment.
pub const DEFAULT_SEGMENT_SIZE: usize = 16 * 1024;

pub struct StagingBuffer {
	segments: VecDeque<BytesMut>,
	segment_size: usize,
	len: usize,
	/// Length of the tail segment before the outstanding `spare` call.
	pending: Option<usize>,
}

impl Default for StagingBuffer {
	fn default() -> Self {
		Self::new(DEFAULT_SEGMENT_SIZE)
	}
}

impl StagingBuffer {
	pub fn new(segment_size: usize) -> Self {
		StagingBuffer {
			segments: VecDeque::new(),
			segment_size: segment_size.max(1),
			len: 0,
			pending: None,
		}
	}

	/// Committed bytes not yet advanced past.
	pub fn len(&self) -> usize {
		self.len
	}

	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	pub fn segment_count(&self) -> usize {
		self.segments.len()
	}

	/// Make sure the tail segment can take at least `min` more bytes.
	pub fn reserve(&mut self, min: usize) -> &mut BytesMut {
		self.abandon_spare();
		let fits = self
			.segments
			.back()
			.is_some_and(|tail| tail.capacity() - tail.len() >= min.max(1));
		if !fits {
			if self.segments.back().is_some_and(|tail| tail.is_empty()) {
				self.segments.pop_back();
			}
			let capacity = self.segment_size.max(min);
			self.segments.push_back(BytesMut::with_capacity(capacity));
		}
		// a segment was pushed above if there was none
		let last = self.segments.len() - 1;
		&mut self.segments[last]
	}

	/// Writable space of at least `min` bytes at the tail. Nothing written
	/// there is visible until [`commit`](Self::commit).
	pub fn spare(&mut self, min: usize) -> &mut [u8] {
		let tail = self.reserve(min);
		let filled = tail.len();
		let capacity = tail.capacity();
		tail.resize(capacity, 0);
		self.pending = Some(filled);
		let last = self.segments.len() - 1;
		&mut self.segments[last][filled..]
	}

	/// Publish `n` bytes written into the last [`spare`](Self::spare) region.
	pub fn commit(&mut self, n: usize) {
		let Some(filled) = self.pending.take() else {
			debug_assert!(n == 0, "commit without spare");
			return;
		};
		if let Some(tail) = self.segments.back_mut() {
			let n = n.min(tail.len() - filled);
			tail.truncate(filled + n);
			self.len += n;
		}
	}

	fn abandon_spare(&mut self) {
		if let Some(filled) = self.pending.take()
			&& let Some(tail) = self.segments.back_mut()
		{
			tail.truncate(filled);
		}
	}

	/// One read from an async source. `Ok(0)` means end of stream.
	pub async fn read_from<R>(&mut self, reader: &mut R, min: usize) -> io::Result<usize>
	where
		R: AsyncRead + Unpin,
	{
		let tail = self.reserve(min);
		let n = reader.read_buf(tail).await?;
		self.len += n;
		Ok(n)
	}

	/// One read from a blocking source. `Ok(0)` means end of stream.
	pub fn fill_from<R: Read>(&mut self, reader: &mut R, min: usize) -> io::Result<usize> {
		let spare = self.spare(min);
		match reader.read(spare) {
			Ok(n) => {
				self.commit(n);
				Ok(n)
			}
			Err(e) => {
				self.commit(0);
				Err(e)
			}
		}
	}

	/// Zero-copy view of the committed bytes, front to back.
	pub fn segments(&self) -> SmallVec<[&[u8]; 4]> {
		let last = self.segments.len().saturating_sub(1);
		self.segments
			.iter()
			.enumerate()
			.map(|(i, seg)| match self.pending {
				Some(filled) if i == last => &seg[..filled],
				_ => &seg[..],
			})
			.filter(|seg| !seg.is_empty())
			.collect()
	}

	/// Discard `n` bytes from the front.
	pub fn advance(&mut self, mut n: usize) {
		self.abandon_spare();
		debug_assert!(n <= self.len, "advance past committed bytes");
		n = n.min(self.len);
		self.len -= n;
		while n > 0 && !self.segments.is_empty() {
			let visible = self.visible_len(0);
			if visible <= n && self.segments.len() > 1 {
				n -= visible;
				self.segments.pop_front();
				continue;
			}
			let step = visible.min(n);
			if let Some(front) = self.segments.front_mut() {
				front.advance(step);
			}
			n -= step;
			if step == 0 {
				break;
			}
		}
		self.drop_drained_front();
	}

	/// Split `n` bytes off the front as one frame. Zero-copy when the frame
	/// lies inside a single segment.
	pub fn take(&mut self, n: usize) -> Bytes {
		self.abandon_spare();
		debug_assert!(n <= self.len, "take past committed bytes");
		let n = n.min(self.len);
		if n == 0 {
			return Bytes::new();
		}
		if self.visible_len(0) >= n {
			self.len -= n;
			let frame = match self.segments.front_mut() {
				Some(front) => front.split_to(n).freeze(),
				None => Bytes::new(),
			};
			self.drop_drained_front();
			return frame;
		}
		let mut frame = BytesMut::with_capacity(n);
		let mut need = n;
		for (i, seg) in self.segments.iter().enumerate() {
			if need == 0 {
				break;
			}
			let visible = &seg[..self.visible_len(i)];
			let step = visible.len().min(need);
			frame.extend_from_slice(&visible[..step]);
			need -= step;
		}
		self.advance(n);
		frame.freeze()
	}

	fn visible_len(&self, index: usize) -> usize {
		let Some(seg) = self.segments.get(index) else {
			return 0;
		};
		match self.pending {
			Some(filled) if index + 1 == self.segments.len() => filled,
			_ => seg.len(),
		}
	}

	fn drop_drained_front(&mut self) {
		while self.segments.len() > 1 && self.visible_len(0) == 0 {
			self.segments.pop_front();
		}
	}
}
