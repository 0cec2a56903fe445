//! Change-log cursors.
//!
//! A cursor is a per-user sequence number rendered as a fixed-width decimal string, so string
//! order and numeric order agree. The empty string addresses the start of the log.

use crate::{Error, Result};

pub const START: &str = "";

const WIDTH: usize = 20;

pub fn format(seq: i64) -> String {
	format!("{seq:0width$}", width = WIDTH)
}

/// Returns the sequence number after which events should be listed.
pub fn parse(raw: &str) -> Result<i64> {
	let raw = raw.trim();

	if raw.is_empty() {
		return Ok(0);
	}
	if raw.len() > WIDTH || !raw.bytes().all(|byte| byte.is_ascii_digit()) {
		return Err(Error::InvalidArgument(format!("Malformed cursor {raw:?}.")));
	}

	raw.parse::<i64>().map_err(|_| Error::InvalidArgument(format!("Malformed cursor {raw:?}.")))
}
