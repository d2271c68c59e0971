use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use resp::Command;
use resp::RespError;
use resp::RespReader;
use resp::RespValue;
use rstest::rstest;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::DuplexStream;
use tokio::task::JoinHandle;
use transport::OutOfBandHandler;
use transport::StrictTransport;
use transport::TransportConfig;
use transport::TransportError;
use transport::config::Protocol;
use transport::decode::IntegerDecoder;
use transport::decode::OkDecoder;
use transport::decode::StringDecoder;
use transport::decode::ValueDecoder;

/// Answer each read on `server` with the next canned reply, written one
/// byte at a time. Returns everything the client wrote.
fn script(mut server: DuplexStream, replies: &[&'static str]) -> JoinHandle<Vec<u8>> {
	let replies = replies.to_vec();
	tokio::spawn(async move {
		let mut received = Vec::new();
		let mut buf = [0u8; 256];
		for reply in replies {
			let n = server.read(&mut buf).await.unwrap();
			received.extend_from_slice(&buf[..n]);
			for byte in reply.as_bytes() {
				server.write_all(&[*byte]).await.unwrap();
			}
		}
		received
	})
}

fn transport(config: &TransportConfig) -> (StrictTransport<DuplexStream>, DuplexStream) {
	let (client, server) = tokio::io::duplex(1024);
	(StrictTransport::new(client, config), server)
}

#[tokio::test]
async fn test_sequential_requests() {
	let (mut transport, server) = transport(&TransportConfig::default());
	let server = script(server, &["+OK\r\n", "$5\r\nvalue\r\n", ":2\r\n"]);

	transport
		.send(&Command::new("SET").arg("key").arg("value"), &OkDecoder)
		.await
		.unwrap();
	let value = transport
		.send(&Command::new("GET").arg("key"), &StringDecoder)
		.await
		.unwrap();
	assert_eq!(value.as_deref(), Some("value"));
	let n = transport
		.send(&Command::new("INCR").arg("n"), &IntegerDecoder)
		.await
		.unwrap();
	assert_eq!(n, 2);

	let written = server.await.unwrap();
	assert!(written.starts_with(b"*3\r\n$3\r\nSET\r\n"));
}

#[rstest]
#[case::streamed("$?\r\n;3\r\nfoo\r\n;0\r\n")]
#[case::plain("$3\r\nfoo\r\n")]
#[case::verbatim("=7\r\ntxt:foo\r\n")]
#[tokio::test]
async fn test_string_reply_shapes(#[case] reply: &'static str) {
	let (mut transport, server) = transport(&TransportConfig::default());
	let _server = script(server, &[reply]);
	let value = transport
		.send(&Command::new("GET").arg("k"), &StringDecoder)
		.await
		.unwrap();
	assert_eq!(value.as_deref(), Some("foo"));
}

#[tokio::test]
async fn test_out_of_band_while_waiting() {
	let seen = Arc::new(Mutex::new(Vec::new()));
	let sink = seen.clone();
	let handler: OutOfBandHandler = Arc::new(move |message: RespValue<'static>| {
		sink.lock().unwrap().push(message);
	});
	let (transport, server) = transport(&TransportConfig::default());
	let mut transport = transport.with_out_of_band(handler);
	let _server = script(
		server,
		&[">3\r\n$10\r\ninvalidate\r\n*1\r\n$1\r\nk\r\n$0\r\n\r\n:7\r\n"],
	);

	let n = transport
		.send(&Command::new("DBSIZE"), &IntegerDecoder)
		.await
		.unwrap();
	assert_eq!(n, 7);
	let seen = seen.lock().unwrap();
	assert_eq!(seen.len(), 1);
	assert_eq!(seen[0].children().unwrap()[0], RespValue::bulk_string("invalidate"));
}

#[tokio::test]
async fn test_error_reply_keeps_connection() {
	let (mut transport, server) = transport(&TransportConfig::default());
	let _server = script(server, &["-ERR unknown command 'NOPE'\r\n", "+PONG\r\n"]);

	let err = transport
		.send(&Command::new("NOPE"), &ValueDecoder)
		.await
		.unwrap_err();
	assert!(matches!(err, TransportError::Server(ref m) if m.starts_with("ERR unknown")));
	assert!(!transport.is_terminated());

	let pong = transport
		.send(&Command::new("PING"), &StringDecoder)
		.await
		.unwrap();
	assert_eq!(pong.as_deref(), Some("PONG"));
}

#[tokio::test]
async fn test_decoder_mismatch_is_not_fatal() {
	let (mut transport, server) = transport(&TransportConfig::default());
	let _server = script(server, &["*1\r\n:1\r\n", ":5\r\n"]);

	let err = transport
		.send(&Command::new("LRANGE").arg("l").arg("0").arg("-1"), &IntegerDecoder)
		.await
		.unwrap_err();
	assert!(matches!(err, TransportError::Reply(_)));

	let n = transport
		.send(&Command::new("LLEN").arg("l"), &IntegerDecoder)
		.await
		.unwrap();
	assert_eq!(n, 5);
}

#[tokio::test]
async fn test_protocol_error_terminates() {
	let (mut transport, server) = transport(&TransportConfig::default());
	let _server = script(server, &["$3\r\nfoo!!"]);

	let err = transport
		.send(&Command::new("GET").arg("k"), &StringDecoder)
		.await
		.unwrap_err();
	assert!(matches!(err, TransportError::Protocol(_)));
	assert!(transport.is_terminated());
	assert!(matches!(
		transport.send(&Command::new("PING"), &StringDecoder).await,
		Err(TransportError::Terminated(_))
	));
}

fn string_list(reader: &mut RespReader<'_>) -> Result<Vec<String>, RespError> {
	reader.advance()?;
	let value = reader.read_tree()?;
	value.children()?.iter().map(|child| child.as_string()).collect()
}

#[tokio::test]
async fn test_resp2_requests_and_function_decoder() {
	let config = TransportConfig {
		protocol: Protocol::Resp2,
		..TransportConfig::default()
	};
	let (mut transport, server) = transport(&config);
	let _server = script(server, &["*2\r\n$1\r\na\r\n$1\r\nb\r\n"]);

	let keys = transport
		.send(&Command::new("KEYS").arg("*"), &string_list)
		.await
		.unwrap();
	assert_eq!(keys, vec!["a", "b"]);
}

#[tokio::test]
async fn test_reply_timeout_terminates() {
	let config = TransportConfig {
		reply_timeout_ms: 20,
		..TransportConfig::default()
	};
	let (mut transport, _server) = transport(&config);

	let err = transport
		.send(&Command::new("BLPOP").arg("q").arg_int(0), &ValueDecoder)
		.await
		.unwrap_err();
	assert!(matches!(err, TransportError::Timeout));
	assert!(transport.is_terminated());
	match transport.send(&Command::new("PING"), &StringDecoder).await {
		Err(TransportError::Terminated(cause)) => {
			assert!(matches!(*cause, TransportError::Timeout))
		}
		other => panic!("expected terminated, got {:?}", other),
	}
}

#[tokio::test]
async fn test_abandoned_send_terminates() {
	let (mut transport, _server) = transport(&TransportConfig::default());
	assert!(!transport.is_terminated());

	let abandoned = tokio::time::timeout(
		Duration::from_millis(20),
		transport.send(&Command::new("GET").arg("k"), &StringDecoder),
	)
	.await;
	assert!(abandoned.is_err());
	assert!(transport.is_terminated());
	assert!(matches!(
		transport.send(&Command::new("PING"), &StringDecoder).await,
		Err(TransportError::Terminated(_))
	));
}

