//! Word-at-a-time recognizer for the most common short headers.
//!
//! The first four bytes are loaded as one little-endian `u32` and compared
//! against a handful of constants, with the digit byte masked out.

/// Short form recognized at the start of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ShortForm {
	/// `:d\r\n`
	Integer,
	/// `$d\r\n`
	BlobLength(usize),
	/// `*d\r\n`
	ArrayLength(usize),
	/// `+OK\r`
	Ok,
	/// `-ERR`
	ErrPrefix,
}

const fn word(bytes: &[u8; 4]) -> u32 {
	u32::from_le_bytes(*bytes)
}

const DIGIT_MASK: u32 = 0xFFFF_00FF;
const INTEGER_WORD: u32 = word(b":\0\r\n");
const BLOB_WORD: u32 = word(b"$\0\r\n");
const ARRAY_WORD: u32 = word(b"*\0\r\n");
const OK_WORD: u32 = word(b"+OK\r");
const ERR_WORD: u32 = word(b"-ERR");

pub(crate) fn recognize(head: &[u8]) -> Option<ShortForm> {
	let bytes: [u8; 4] = head.get(..4)?.try_into().ok()?;
	let w = u32::from_le_bytes(bytes);
	match w {
		OK_WORD => return Some(ShortForm::Ok),
		ERR_WORD => return Some(ShortForm::ErrPrefix),
		_ => {}
	}
	let digit = bytes[1];
	if !digit.is_ascii_digit() {
		return None;
	}
	let n = digit - b'0';
	match w & DIGIT_MASK {
		INTEGER_WORD => Some(ShortForm::Integer),
		BLOB_WORD => Some(ShortForm::BlobLength(n as usize)),
		ARRAY_WORD => Some(ShortForm::ArrayLength(n as usize)),
		_ => None,
	}
}
