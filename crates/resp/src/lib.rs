//! # RESP - Redis Serialization Protocol engine
//!
//! Client-side building blocks for RESP2 and RESP3:
//!
//! - [`RespValue`]: one element, with inline storage for small payloads and
//!   zero-copy storage for large ones
//! - [`RespReader`]: an incremental cursor over possibly segmented input
//! - [`RespWriter`] and [`RespEncoder`]: serialization, with RESP2 downgrade
//! - [`ScanState`]: finds where one top-level message ends and whether it
//!   is a reply or out-of-band push data
//! - [`StagingBuffer`]: segmented receive buffer feeding the scanner
//!
//! ## Example
//!
//! ```rust
//! use resp::RespReader;
//! use resp::RespValue;
//! use resp::ScanState;
//!
//! let input = b"*2\r\n$3\r\nfoo\r\n:7\r\n+next";
//! let mut state = ScanState::new();
//! assert!(state.try_scan(&mut RespReader::new(input)).unwrap());
//! assert_eq!(state.bytes(), 17);
//!
//! let mut reader = RespReader::new(&input[..state.bytes()]);
//! reader.advance().unwrap();
//! let value = reader.read_tree().unwrap();
//! assert_eq!(
//! 	value,
//! 	RespValue::array(vec![RespValue::bulk_string("foo"), RespValue::integer(7)])
//! );
//! ```

mod buffer;
mod error;
mod fast_path;
mod reader;
mod scan;
mod types;
mod utils;
mod value;
mod writer;

pub use buffer::DEFAULT_SEGMENT_SIZE;
pub use buffer::StagingBuffer;
pub use error::ParseError;
pub use error::RespError;
pub use reader::RespReader;
pub use scan::MessageKind;
pub use scan::ScanState;
pub use types::ElementFlags;
pub use types::RespElementType;
pub use types::RespPrefix;
pub use types::RespVersion;
pub use value::INLINE_CAPACITY;
pub use value::RespValue;
pub use writer::Command;
pub use writer::RespEncoder;
pub use writer::RespWriter;
