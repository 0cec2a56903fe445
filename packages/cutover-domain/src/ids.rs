use uuid::Uuid;

const SHORT_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz1234567890";
pub const SHORT_ID_LEN: usize = 16;

/// Returns a 16-character id drawn from `[a-z0-9]`, the shape legacy clients generate.
pub fn new_short_id() -> String {
	Uuid::new_v4()
		.as_bytes()
		.iter()
		.map(|byte| SHORT_ALPHABET[(*byte as usize) % SHORT_ALPHABET.len()] as char)
		.collect()
}
