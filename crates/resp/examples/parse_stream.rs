use resp::MessageKind;
use resp::RespReader;
use resp::ScanState;
use resp::StagingBuffer;

fn main() {
	println!("--- RESP Frame Scanning Example ---");

	// Simulate a TCP stream with fragmented data
	// We are receiving:
	// - A Simple String: "+OK\r\n"
	// - An Integer: ":1000\r\n"
	// - A Push: ">3\r\n$7\r\nmessage\r\n$4\r\nnews\r\n$2\r\nhi\r\n"
	// - A streamed string: "$?\r\n;3\r\nfoo\r\n;3\r\nbar\r\n;0\r\n"
	// - But split into arbitrary chunks.
	let data_chunks = vec![
		b"+O".as_slice(),
		b"K\r\n:1".as_slice(),
		b"00".as_slice(),
		b"0\r\n>3\r\n$7\r\nmess".as_slice(),
		b"age\r\n$4\r\nnews\r\n$2\r\nhi".as_slice(),
		b"\r\n$?\r\n;3\r\nfoo\r\n;3".as_slice(),
		b"\r\nbar\r\n;0\r\n".as_slice(),
	];

	let mut buffer = StagingBuffer::new(16);
	let mut state = ScanState::new();

	for (i, chunk) in data_chunks.iter().enumerate() {
		println!("\n[Stream] Received Chunk {}: {:?}", i, String::from_utf8_lossy(chunk));
		let mut src: &[u8] = chunk;
		while !src.is_empty() {
			let want = src.len();
			if let Err(e) = buffer.fill_from(&mut src, want) {
				eprintln!("[Buffer] Read failed: {}", e);
				return;
			}
		}

		loop {
			let scanned = {
				let segments = buffer.segments();
				state.try_scan(&mut RespReader::from_segments(&segments))
			};
			match scanned {
				Ok(true) => {
					let frame = buffer.take(state.bytes());
					let mut reader = RespReader::from_bytes(&frame);
					let value = reader.advance().and_then(|_| reader.read_tree());
					let label = match state.kind() {
						MessageKind::OutOfBand => "Out-of-band",
						_ => "Reply",
					};
					println!("[Scanner] {} ({} bytes): {:?}", label, frame.len(), value);
					state = ScanState::new();
				}
				Ok(false) => {
					println!(
						"[Scanner] Incomplete after {} bytes, waiting for more data...",
						state.bytes()
					);
					break;
				}
				Err(e) => {
					eprintln!("[Scanner] Error: {}", e);
					return;
				}
			}
		}
	}
}
