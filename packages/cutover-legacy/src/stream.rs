//! Live change notifications from the legacy store.
//!
//! The subscription is a text event stream of `event:`/`data:` line pairs, each event terminated
//! by a blank line. `put` and `patch` carry `{"path": ..., "data": ...}`, where `path` is relative
//! to the subscription root. A `put` at the root itself is the initial snapshot; its payload is
//! validated but never decoded into a tree.

use reqwest::Response;
use serde::Deserialize;
use serde_json::{Value, value::RawValue};

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
	/// Replaces the subtree at `path`. `data` is null for deletes.
	Put { path: String, data: Value },
	/// Replaces the named children of the node at `path`.
	Patch { path: String, data: Value },
	/// A `put` replacing the whole subscription root. The payload is dropped undecoded.
	Snapshot { path: String },
	KeepAlive,
}

#[derive(Debug, Deserialize)]
struct Message<'a> {
	path: String,
	#[serde(default, borrow)]
	data: Option<&'a RawValue>,
}

/// Accumulates lines into complete events.
#[derive(Debug, Default)]
pub struct EventParser {
	event: String,
	data: String,
}
impl EventParser {
	/// Feeds one line without its terminator. Returns the event name and data once a blank line
	/// completes an event.
	pub fn push_line(&mut self, line: &str) -> Option<(String, String)> {
		let line = line.strip_suffix('\r').unwrap_or(line);

		if line.is_empty() {
			let event = std::mem::take(&mut self.event);
			let data = std::mem::take(&mut self.data);

			if event.is_empty() {
				return None;
			}

			return Some((event, data.trim().to_string()));
		}

		if let Some(rest) = line.strip_prefix("event:") {
			self.event = rest.trim().to_string();
		} else if let Some(rest) = line.strip_prefix("data:") {
			if !self.data.is_empty() {
				self.data.push('\n');
			}

			self.data.push_str(rest.trim());
		}

		None
	}
}

/// Interprets a complete event. Unknown events yield `None`; `cancel` and `auth_revoked` end
/// the stream.
pub fn decode(event: &str, data: &str) -> Result<Option<StreamEvent>> {
	match event {
		"put" | "patch" => {
			let message: Message<'_> = serde_json::from_str(data)?;
			let path = message.path;

			if event == "put" && path.trim_matches('/').is_empty() {
				return Ok(Some(StreamEvent::Snapshot { path }));
			}

			let data = match message.data {
				Some(raw) => serde_json::from_str(raw.get())?,
				None => Value::Null,
			};

			Ok(Some(if event == "put" {
				StreamEvent::Put { path, data }
			} else {
				StreamEvent::Patch { path, data }
			}))
		},
		"keep-alive" => Ok(Some(StreamEvent::KeepAlive)),
		"cancel" | "auth_revoked" => Err(Error::StreamEnded(format!("server sent {event}"))),
		_ => Ok(None),
	}
}

/// An open subscription. Reads the response body incrementally.
pub struct EventStream {
	res: Response,
	buf: Vec<u8>,
	parser: EventParser,
}
impl EventStream {
	pub fn new(res: Response) -> Self {
		Self { res, buf: Vec::new(), parser: EventParser::default() }
	}

	/// Next event, or `Ok(None)` once the server closes the body.
	pub async fn next_event(&mut self) -> Result<Option<StreamEvent>> {
		loop {
			while let Some(pos) = self.buf.iter().position(|byte| *byte == b'\n') {
				let raw = self.buf.drain(..=pos).collect::<Vec<_>>();
				let line = std::str::from_utf8(&raw[..raw.len() - 1]).map_err(|err| {
					Error::InvalidResponse(format!("Stream line is not UTF-8: {err}."))
				})?;

				if let Some((event, data)) = self.parser.push_line(line)
					&& let Some(event) = decode(&event, &data)?
				{
					return Ok(Some(event));
				}
			}

			match self.res.chunk().await? {
				Some(chunk) => self.buf.extend_from_slice(&chunk),
				None => return Ok(None),
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn feed(parser: &mut EventParser, text: &str) -> Vec<(String, String)> {
		text.split('\n').filter_map(|line| parser.push_line(line)).collect()
	}

	#[test]
	fn assembles_events_across_lines() {
		let mut parser = EventParser::default();
		let events = feed(
			&mut parser,
			"event: put\ndata: {\"path\":\"/u1/inited\",\"data\":true}\n\nevent: keep-alive\ndata: null\n\n",
		);

		assert_eq!(events.len(), 2);
		assert_eq!(events[0].0, "put");
		assert_eq!(events[1], ("keep-alive".to_string(), "null".to_string()));
	}

	#[test]
	fn handles_crlf_and_multiline_data() {
		let mut parser = EventParser::default();
		let events = feed(&mut parser, "event: patch\r\ndata: {\"path\":\"/u1\",\r\ndata: \"data\":{}}\r\n\r\n");

		assert_eq!(events, vec![("patch".to_string(), "{\"path\":\"/u1\",\n\"data\":{}}".to_string())]);
	}

	#[test]
	fn blank_lines_without_event_are_ignored() {
		let mut parser = EventParser::default();

		assert!(feed(&mut parser, "\n\ndata: orphan\n\n").is_empty());
	}

	#[test]
	fn decodes_put_and_patch() {
		let put = decode("put", r#"{"path":"/u1/Category/c1","data":null}"#)
			.expect("Valid put must decode.");

		assert_eq!(
			put,
			Some(StreamEvent::Put { path: "/u1/Category/c1".to_string(), data: Value::Null })
		);

		let patch = decode("patch", r#"{"path":"/u1","data":{"inited":true}}"#)
			.expect("Valid patch must decode.");

		assert!(matches!(patch, Some(StreamEvent::Patch { .. })));
		assert_eq!(decode("keep-alive", "null").expect("Keep-alive decodes."), Some(StreamEvent::KeepAlive));
		assert_eq!(decode("unknown", "").expect("Unknown events are skipped."), None);
	}

	#[test]
	fn root_put_is_a_snapshot_without_payload() {
		let snapshot = decode("put", r#"{"path":"/","data":{"u1":{"Category":{"c1":{"label":"Food"}}}}}"#)
			.expect("Root put must decode.");
		let root_patch = decode("patch", r#"{"path":"/","data":{"u1":null}}"#)
			.expect("Root patch must decode.");

		assert_eq!(snapshot, Some(StreamEvent::Snapshot { path: "/".to_string() }));
		assert!(matches!(root_patch, Some(StreamEvent::Patch { .. })));
		assert!(matches!(decode("put", r#"{"path":"/","data":{"u1":"#), Err(Error::SerdeJson(_))));
	}

	#[test]
	fn cancel_ends_the_stream() {
		assert!(matches!(decode("cancel", "null"), Err(Error::StreamEnded(_))));
		assert!(matches!(decode("auth_revoked", "null"), Err(Error::StreamEnded(_))));
		assert!(matches!(decode("put", "not json"), Err(Error::SerdeJson(_))));
	}
}
