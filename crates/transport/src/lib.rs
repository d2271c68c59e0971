//! RESP connections: a bounded pool, a strict one-at-a-time transport and a
//! pipelined transport that keeps many requests in flight.
//!
//! ```no_run
//! use resp::Command;
//! use transport::PipelinedTransport;
//! use transport::TransportConfig;
//! use transport::decode::StringDecoder;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TransportConfig::default();
//! let stream = tokio::net::TcpStream::connect("127.0.0.1:6379").await?;
//! let transport = PipelinedTransport::spawn(stream, &config, None);
//! let reply = transport.send(&Command::new("PING"), StringDecoder).await?;
//! assert_eq!(reply.as_deref(), Some("PONG"));
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use resp::RespValue;

pub mod config;
pub mod decode;
mod error;
mod framing;
pub mod pipeline;
pub mod pool;
pub mod strict;

pub use config::ConfigError;
pub use config::TransportConfig;
pub use decode::ReplyDecoder;
pub use error::TransportError;
pub use pipeline::PipelinedTransport;
pub use pool::BlockingConnectionFactory;
pub use pool::BlockingTcpConnector;
pub use pool::ConnectionFactory;
pub use pool::ConnectionPool;
pub use pool::Lease;
pub use pool::Recycle;
pub use pool::TcpConnector;
pub use strict::BlockingTransport;
pub use strict::StrictTransport;

/// Receives messages that are not replies to any request, such as pub/sub
/// deliveries. Called inline while replies are being processed, so it
/// should hand work off rather than block.
pub type OutOfBandHandler = Arc<dyn Fn(RespValue<'static>) + Send + Sync>;
