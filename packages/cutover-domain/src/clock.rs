use time::OffsetDateTime;

/// Milliseconds since the Unix epoch, the timestamp unit shared with the legacy tree.
pub fn now_ms() -> i64 {
	to_ms(OffsetDateTime::now_utc())
}

pub fn to_ms(ts: OffsetDateTime) -> i64 {
	(ts.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Next timestamp for an entity whose stored version carries `previous`.
pub fn next_after(previous: i64) -> i64 {
	now_ms().max(previous.saturating_add(1))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn next_after_is_strictly_newer() {
		let future = now_ms() + 60_000;

		assert_eq!(next_after(future), future + 1);
		assert!(next_after(0) > 0);
	}
}
