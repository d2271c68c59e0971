//! Bounded connection pool.
//!
//! Capacity is a semaphore: a lease holds one permit for as long as it
//! lives, so leased connections never exceed the pool size. Idle
//! connections wait in a queue and are reused oldest first. A new
//! connection is made only when none is idle.
//!
//! Async tasks rent with [`ConnectionPool::rent`]. Plain threads rent with
//! [`ConnectionPool::rent_blocking`], which waits on a condition variable
//! signalled whenever a slot is released.

use std::collections::VecDeque;
use std::net;
use std::ops::Deref;
use std::ops::DerefMut;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use log::debug;
use log::warn;
use tokio::net::TcpStream;
use tokio::sync::OwnedSemaphorePermit;
use tokio::sync::Semaphore;

use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::strict::BlockingTransport;
use crate::strict::StrictTransport;

/// The connections a pool holds and the check applied when a lease ends.
pub trait Recycle: Send + Sync + 'static {
	type Connection: Send + 'static;

	/// Unusable connections are dropped instead of returning to the idle
	/// queue.
	fn is_reusable(&self, _connection: &Self::Connection) -> bool {
		true
	}
}

/// Makes connections for [`ConnectionPool::rent`].
#[async_trait]
pub trait ConnectionFactory: Recycle {
	async fn connect(&self) -> Result<Self::Connection, TransportError>;
}

/// Makes connections for [`ConnectionPool::rent_blocking`].
pub trait BlockingConnectionFactory: Recycle {
	fn connect_blocking(&self) -> Result<Self::Connection, TransportError>;
}

struct PoolInner<F: Recycle> {
	factory: F,
	idle: Mutex<VecDeque<F::Connection>>,
	// signalled under `idle` whenever a permit is released
	released: Condvar,
	permits: Arc<Semaphore>,
	capacity: usize,
	rent_timeout: Option<Duration>,
}

impl<F: Recycle> PoolInner<F> {
	fn idle(&self) -> MutexGuard<'_, VecDeque<F::Connection>> {
		self.idle.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

/// One unit of capacity held by a lease.
struct Slot<F: Recycle> {
	pool: Arc<PoolInner<F>>,
	permit: Option<OwnedSemaphorePermit>,
}

impl<F: Recycle> Drop for Slot<F> {
	fn drop(&mut self) {
		// released under the idle lock so a blocked renter cannot miss it
		let _idle = self.pool.idle();
		drop(self.permit.take());
		self.pool.released.notify_one();
	}
}

pub struct ConnectionPool<F: Recycle> {
	inner: Arc<PoolInner<F>>,
}

impl<F: Recycle> Clone for ConnectionPool<F> {
	fn clone(&self) -> Self {
		ConnectionPool {
			inner: self.inner.clone(),
		}
	}
}

impl<F: Recycle> ConnectionPool<F> {
	/// Pool sized by `pool_size`, waiting at most `rent_timeout_ms` for a
	/// free slot.
	pub fn new(factory: F, config: &TransportConfig) -> Self {
		Self::with_capacity(factory, config.pool_size, config.rent_timeout())
	}

	pub fn with_capacity(factory: F, capacity: usize, rent_timeout: Option<Duration>) -> Self {
		let capacity = capacity.max(1);
		ConnectionPool {
			inner: Arc::new(PoolInner {
				factory,
				idle: Mutex::new(VecDeque::with_capacity(capacity)),
				released: Condvar::new(),
				permits: Arc::new(Semaphore::new(capacity)),
				capacity,
				rent_timeout,
			}),
		}
	}

	pub fn factory(&self) -> &F {
		&self.inner.factory
	}

	pub fn idle_count(&self) -> usize {
		self.inner.idle().len()
	}

	pub fn capacity(&self) -> usize {
		self.inner.capacity
	}

	/// Slots not currently leased.
	pub fn available(&self) -> usize {
		self.inner.permits.available_permits()
	}

	fn slot(&self, permit: OwnedSemaphorePermit) -> Slot<F> {
		Slot {
			pool: self.inner.clone(),
			permit: Some(permit),
		}
	}
}

impl<F: ConnectionFactory> ConnectionPool<F> {
	/// Lease a connection, waiting for one to be released when the pool is
	/// at capacity.
	pub async fn rent(&self) -> Result<Lease<F>, TransportError> {
		let acquire = self.inner.permits.clone().acquire_owned();
		let permit = match self.inner.rent_timeout {
			Some(limit) => tokio::time::timeout(limit, acquire)
				.await
				.map_err(|_| TransportError::Timeout)?,
			None => acquire.await,
		}
		.map_err(|_| TransportError::PoolExhausted)?;
		self.lease(permit).await
	}

	/// Lease a connection without waiting for capacity. Fails with
	/// [`TransportError::PoolExhausted`] when every slot is leased.
	pub async fn try_rent(&self) -> Result<Lease<F>, TransportError> {
		let permit = self
			.inner
			.permits
			.clone()
			.try_acquire_owned()
			.map_err(|_| TransportError::PoolExhausted)?;
		self.lease(permit).await
	}

	async fn lease(&self, permit: OwnedSemaphorePermit) -> Result<Lease<F>, TransportError> {
		let slot = self.slot(permit);
		let reused = self.inner.idle().pop_front();
		let connection = match reused {
			Some(connection) => connection,
			None => {
				debug!(
					"pool has no idle connection, connecting ({} of {} slots free)",
					self.available(),
					self.inner.capacity
				);
				// a failed connect drops `slot`, freeing it
				self.inner.factory.connect().await?
			}
		};
		Ok(Lease::new(connection, slot))
	}
}

impl<F: BlockingConnectionFactory> ConnectionPool<F> {
	/// Lease a connection from a plain thread, blocking while the pool is at
	/// capacity. Must not be called from inside an async task.
	pub fn rent_blocking(&self) -> Result<Lease<F>, TransportError> {
		let deadline = self.inner.rent_timeout.map(|limit| Instant::now() + limit);
		let mut idle = self.inner.idle();
		let permit = loop {
			if let Ok(permit) = self.inner.permits.clone().try_acquire_owned() {
				break permit;
			}
			idle = match deadline {
				Some(deadline) => {
					let left = deadline.saturating_duration_since(Instant::now());
					if left.is_zero() {
						return Err(TransportError::Timeout);
					}
					self.inner
						.released
						.wait_timeout(idle, left)
						.unwrap_or_else(PoisonError::into_inner)
						.0
				}
				None => self
					.inner
					.released
					.wait(idle)
					.unwrap_or_else(PoisonError::into_inner),
			};
		};
		let reused = idle.pop_front();
		drop(idle);

		let slot = self.slot(permit);
		let connection = match reused {
			Some(connection) => connection,
			None => {
				debug!("pool has no idle connection, connecting");
				self.inner.factory.connect_blocking()?
			}
		};
		Ok(Lease::new(connection, slot))
	}
}

/// A leased connection. Goes back to the idle queue when dropped unless it
/// was doomed or the factory rejects it.
pub struct Lease<F: Recycle> {
	connection: Option<F::Connection>,
	doomed: bool,
	// released after `drop` has re-queued the connection
	slot: Slot<F>,
}

impl<F: Recycle> Lease<F> {
	fn new(connection: F::Connection, slot: Slot<F>) -> Self {
		Lease {
			connection: Some(connection),
			doomed: false,
			slot,
		}
	}

	/// Dispose of the connection instead of returning it to the pool.
	pub fn doom(&mut self) {
		self.doomed = true;
	}

	pub fn is_doomed(&self) -> bool {
		self.doomed
	}
}

impl<F: Recycle> Deref for Lease<F> {
	type Target = F::Connection;

	fn deref(&self) -> &Self::Target {
		self.connection.as_ref().expect("lease holds a connection until dropped")
	}
}

impl<F: Recycle> DerefMut for Lease<F> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		self.connection.as_mut().expect("lease holds a connection until dropped")
	}
}

impl<F: Recycle> Drop for Lease<F> {
	fn drop(&mut self) {
		let Some(connection) = self.connection.take() else {
			return;
		};
		let pool = &self.slot.pool;
		if self.doomed || !pool.factory.is_reusable(&connection) {
			warn!("discarding pooled connection");
			return;
		}
		pool.idle().push_back(connection);
	}
}

/// Opens [`StrictTransport`]s over TCP.
pub struct TcpConnector {
	addr: String,
	config: TransportConfig,
}

impl TcpConnector {
	pub fn new(addr: impl Into<String>, config: TransportConfig) -> Self {
		TcpConnector {
			addr: addr.into(),
			config,
		}
	}
}

impl Recycle for TcpConnector {
	type Connection = StrictTransport<TcpStream>;

	fn is_reusable(&self, connection: &Self::Connection) -> bool {
		!connection.is_terminated()
	}
}

#[async_trait]
impl ConnectionFactory for TcpConnector {
	async fn connect(&self) -> Result<Self::Connection, TransportError> {
		let stream = TcpStream::connect(&self.addr).await?;
		stream.set_nodelay(true)?;
		debug!("connected to {}", self.addr);
		Ok(StrictTransport::new(stream, &self.config))
	}
}

/// Opens [`BlockingTransport`]s over TCP. The reply timeout becomes the
/// socket read timeout.
pub struct BlockingTcpConnector {
	addr: String,
	config: TransportConfig,
}

impl BlockingTcpConnector {
	pub fn new(addr: impl Into<String>, config: TransportConfig) -> Self {
		BlockingTcpConnector {
			addr: addr.into(),
			config,
		}
	}
}

impl Recycle for BlockingTcpConnector {
	type Connection = BlockingTransport<net::TcpStream>;

	fn is_reusable(&self, connection: &Self::Connection) -> bool {
		!connection.is_terminated()
	}
}

impl BlockingConnectionFactory for BlockingTcpConnector {
	fn connect_blocking(&self) -> Result<Self::Connection, TransportError> {
		let stream = net::TcpStream::connect(&self.addr)?;
		stream.set_nodelay(true)?;
		stream.set_read_timeout(self.config.reply_timeout())?;
		debug!("connected to {}", self.addr);
		Ok(BlockingTransport::new(stream, &self.config))
	}
}

#[cfg(test)]
mod tests {
	use resp::Command;
	use tokio::io::AsyncReadExt;
	use tokio::io::AsyncWriteExt;
	use tokio::net::TcpListener;

	use std::io::Read;
	use std::io::Write;

	use super::*;
	use crate::decode::StringDecoder;

	/// Answers every read with `+PONG`, then closes after `replies`.
	async fn pong_server(replies: usize) -> String {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap().to_string();
		tokio::spawn(async move {
			let (mut socket, _) = listener.accept().await.unwrap();
			let mut buf = [0u8; 256];
			for _ in 0..replies {
				if socket.read(&mut buf).await.unwrap_or(0) == 0 {
					return;
				}
				socket.write_all(b"+PONG\r\n").await.unwrap();
			}
		});
		addr
	}

	#[tokio::test]
	async fn test_tcp_connection_is_reused() {
		let addr = pong_server(2).await;
		let pool = ConnectionPool::with_capacity(
			TcpConnector::new(addr, TransportConfig::default()),
			1,
			None,
		);
		for _ in 0..2 {
			let mut lease = pool.rent().await.unwrap();
			let reply = lease.send(&Command::new("PING"), &StringDecoder).await.unwrap();
			assert_eq!(reply.as_deref(), Some("PONG"));
		}
		assert_eq!(pool.idle_count(), 1);
	}

	#[tokio::test]
	async fn test_terminated_tcp_connection_is_dropped() {
		let addr = pong_server(0).await;
		let pool = ConnectionPool::with_capacity(
			TcpConnector::new(addr, TransportConfig::default()),
			1,
			None,
		);
		{
			let mut lease = pool.rent().await.unwrap();
			assert!(lease.send(&Command::new("PING"), &StringDecoder).await.is_err());
			assert!(lease.is_terminated());
		}
		assert_eq!(pool.idle_count(), 0);
		assert_eq!(pool.available(), 1);
	}

	/// Blocking twin of `pong_server`.
	fn blocking_pong_server(replies: usize) -> String {
		let listener = net::TcpListener::bind("127.0.0.1:0").unwrap();
		let addr = listener.local_addr().unwrap().to_string();
		std::thread::spawn(move || {
			let (mut socket, _) = listener.accept().unwrap();
			let mut buf = [0u8; 256];
			for _ in 0..replies {
				if socket.read(&mut buf).unwrap_or(0) == 0 {
					return;
				}
				socket.write_all(b"+PONG\r\n").unwrap();
			}
		});
		addr
	}

	#[test]
	fn test_blocking_tcp_connection_is_reused() {
		let addr = blocking_pong_server(2);
		let pool = ConnectionPool::with_capacity(
			BlockingTcpConnector::new(addr, TransportConfig::default()),
			1,
			None,
		);
		for _ in 0..2 {
			let mut lease = pool.rent_blocking().unwrap();
			let reply = lease.send(&Command::new("PING"), &StringDecoder).unwrap();
			assert_eq!(reply.as_deref(), Some("PONG"));
		}
		assert_eq!(pool.idle_count(), 1);
	}

	#[test]
	fn test_blocking_read_timeout_discards_connection() {
		// accepts but never answers
		let listener = net::TcpListener::bind("127.0.0.1:0").unwrap();
		let addr = listener.local_addr().unwrap().to_string();
		let server = std::thread::spawn(move || listener.accept().map(|(socket, _)| socket));

		let config = TransportConfig {
			reply_timeout_ms: 20,
			..TransportConfig::default()
		};
		let pool = ConnectionPool::with_capacity(BlockingTcpConnector::new(addr, config), 1, None);
		{
			let mut lease = pool.rent_blocking().unwrap();
			let err = lease.send(&Command::new("PING"), &StringDecoder).unwrap_err();
			assert!(matches!(err, TransportError::Timeout));
			assert!(lease.is_terminated());
		}
		assert_eq!(pool.idle_count(), 0);
		assert_eq!(pool.available(), 1);
		drop(server.join());
	}
}
