//! Fire a burst of pipelined commands at a RESP server.
//!
//! ```text
//! cargo run -p transport --example pipelined_ping -- 127.0.0.1:6379 1000
//! ```

use std::sync::Arc;
use std::time::Instant;

use log::info;
use resp::Command;
use resp::RespValue;
use tokio::net::TcpStream;
use transport::OutOfBandHandler;
use transport::PipelinedTransport;
use transport::TransportConfig;
use transport::decode::IntegerDecoder;
use transport::decode::StringDecoder;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let mut args = std::env::args().skip(1);
	let addr = args.next().unwrap_or_else(|| "127.0.0.1:6379".to_string());
	let count: i64 = args.next().map(|n| n.parse()).transpose()?.unwrap_or(1000);

	let config = TransportConfig {
		log_level: "info,transport=debug".into(),
		..TransportConfig::default()
	};
	config.init_logging()?;

	let stream = TcpStream::connect(&addr).await?;
	stream.set_nodelay(true)?;
	let on_push: OutOfBandHandler = Arc::new(|message: RespValue<'static>| {
		info!("push: {}", message);
	});
	let transport = PipelinedTransport::spawn(stream, &config, Some(on_push));

	let pong = transport.send(&Command::new("PING"), StringDecoder).await?;
	info!("connected to {}: {:?}", addr, pong);

	let started = Instant::now();
	let key = "pipelined_ping:counter";
	let transport = &transport;
	let increments = (0..count).map(|_| async move {
		transport
			.send(&Command::new("INCR").arg(key), IntegerDecoder)
			.await
	});
	let mut last = 0;
	for reply in futures::future::join_all(increments).await {
		let value = reply?;
		// replies arrive in request order
		assert!(value > last);
		last = value;
	}
	info!(
		"{} INCRs in {:?}, counter now {}",
		count,
		started.elapsed(),
		last
	);
	Ok(())
}
