//! Read modes over the per-user change log: long poll and persistent push.

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tokio::time::{self, Instant};

use cutover_domain::ChangeEvent;
use cutover_storage::{CanonicalStore, ChangePage};

use crate::Result;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChangesResponse {
	pub cursor: String,
	pub changes: Vec<ChangeEvent>,
}
impl ChangesResponse {
	fn from_page(page: ChangePage) -> Self {
		Self {
			cursor: page.next_cursor,
			changes: page.changes.into_iter().map(ChangeEvent::without_cursor).collect(),
		}
	}
}

/// Frames sent over a push connection.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushFrame {
	Changes { cursor: String, changes: Vec<ChangeEvent> },
	Heartbeat { cursor: String },
}

#[derive(Clone)]
pub struct ChangeFeed {
	store: Arc<dyn CanonicalStore>,
	cfg: cutover_config::Feed,
}
impl ChangeFeed {
	pub fn new(store: Arc<dyn CanonicalStore>, cfg: cutover_config::Feed) -> Self {
		Self { store, cfg }
	}

	pub fn cfg(&self) -> &cutover_config::Feed {
		&self.cfg
	}

	/// Clamps a requested page size. Missing or non-positive values use the default.
	pub fn limit(&self, requested: Option<i64>) -> u32 {
		match requested {
			Some(limit) if limit > 0 => limit.min(i64::from(self.cfg.max_limit)) as u32,
			_ => self.cfg.default_limit,
		}
	}

	/// Clamps a requested wait. Missing or zero values use the default.
	pub fn timeout(&self, requested: Option<Duration>) -> Duration {
		let max = Duration::from_millis(self.cfg.max_timeout_ms);

		match requested {
			Some(timeout) if !timeout.is_zero() => timeout.min(max),
			_ => Duration::from_millis(self.cfg.default_timeout_ms),
		}
	}

	/// Waits until changes after `cursor` exist or `timeout` passes. On timeout the response
	/// is empty and echoes `cursor`.
	pub async fn long_poll(
		&self,
		user_id: &str,
		cursor: &str,
		limit: u32,
		timeout: Duration,
	) -> Result<ChangesResponse> {
		crate::require("user_id", user_id)?;

		let deadline = Instant::now() + timeout;
		let tick = Duration::from_millis(self.cfg.poll_interval_ms);

		loop {
			let page = self.store.list_changes(user_id, cursor, limit).await?;

			if !page.changes.is_empty() {
				return Ok(ChangesResponse::from_page(page));
			}

			let now = Instant::now();

			if now >= deadline {
				return Ok(ChangesResponse::from_page(page));
			}

			time::sleep(tick.min(deadline - now)).await;
		}
	}

	pub fn push_session(&self, user_id: &str, cursor: &str, limit: u32) -> PushSession {
		PushSession {
			store: self.store.clone(),
			user_id: user_id.to_string(),
			cursor: cursor.to_string(),
			limit,
			heartbeat: Duration::from_millis(self.cfg.heartbeat_interval_ms),
			interval: Duration::from_millis(self.cfg.push_interval_ms),
			last_frame: Instant::now(),
		}
	}
}

/// State of one push connection. Owns its cursor; nothing is shared between connections.
pub struct PushSession {
	store: Arc<dyn CanonicalStore>,
	user_id: String,
	cursor: String,
	limit: u32,
	heartbeat: Duration,
	interval: Duration,
	last_frame: Instant,
}
impl PushSession {
	pub fn cursor(&self) -> &str {
		&self.cursor
	}

	pub fn interval(&self) -> Duration {
		self.interval
	}

	/// One push tick: new changes, a heartbeat once idle long enough, or nothing.
	pub async fn poll(&mut self) -> Result<Option<PushFrame>> {
		let page = self.store.list_changes(&self.user_id, &self.cursor, self.limit).await?;

		if !page.changes.is_empty() {
			let response = ChangesResponse::from_page(page);

			self.cursor = response.cursor.clone();
			self.last_frame = Instant::now();

			return Ok(Some(PushFrame::Changes {
				cursor: response.cursor,
				changes: response.changes,
			}));
		}
		if self.last_frame.elapsed() >= self.heartbeat {
			self.last_frame = Instant::now();

			return Ok(Some(PushFrame::Heartbeat { cursor: self.cursor.clone() }));
		}

		Ok(None)
	}
}
