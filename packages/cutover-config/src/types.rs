use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	/// Optional. Without it no legacy reader or writer is configured.
	pub legacy: Option<Legacy>,
	pub feature: Feature,
	pub sync: Reconciliation,
	#[serde(default)]
	pub feed: Feed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Legacy {
	pub base_url: String,
	pub auth_token: Option<String>,
	#[serde(default = "default_legacy_timeout_ms")]
	pub timeout_ms: u64,
	/// When false, writes are not mirrored into the legacy tree. Reads still fall back to it.
	#[serde(default = "default_true")]
	pub mirror_writes: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadSource {
	LegacyOnly,
	CanonicalPrimary,
	Cohort,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Feature {
	pub read_source: ReadSource,
	#[serde(default)]
	pub cohort_percent: u8,
}
impl Default for Feature {
	fn default() -> Self {
		Self { read_source: ReadSource::LegacyOnly, cohort_percent: 0 }
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Reconciliation {
	pub poll_interval_ms: u64,
	#[serde(default)]
	pub stream_enabled: bool,
	#[serde(default = "default_stream_path")]
	pub stream_path: String,
	#[serde(default = "default_stream_reconnect_ms")]
	pub stream_reconnect_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Feed {
	#[serde(default = "default_feed_poll_interval_ms")]
	pub poll_interval_ms: u64,
	#[serde(default = "default_push_interval_ms")]
	pub push_interval_ms: u64,
	#[serde(default = "default_heartbeat_interval_ms")]
	pub heartbeat_interval_ms: u64,
	#[serde(default = "default_timeout_ms")]
	pub default_timeout_ms: u64,
	#[serde(default = "default_max_timeout_ms")]
	pub max_timeout_ms: u64,
	#[serde(default = "default_limit")]
	pub default_limit: u32,
	#[serde(default = "default_max_limit")]
	pub max_limit: u32,
}
impl Default for Feed {
	fn default() -> Self {
		Self {
			poll_interval_ms: default_feed_poll_interval_ms(),
			push_interval_ms: default_push_interval_ms(),
			heartbeat_interval_ms: default_heartbeat_interval_ms(),
			default_timeout_ms: default_timeout_ms(),
			max_timeout_ms: default_max_timeout_ms(),
			default_limit: default_limit(),
			max_limit: default_max_limit(),
		}
	}
}

fn default_true() -> bool {
	true
}

fn default_legacy_timeout_ms() -> u64 {
	15_000
}

fn default_stream_path() -> String {
	"users".to_string()
}

fn default_stream_reconnect_ms() -> u64 {
	5_000
}

fn default_feed_poll_interval_ms() -> u64 {
	500
}

fn default_push_interval_ms() -> u64 {
	1_000
}

fn default_heartbeat_interval_ms() -> u64 {
	25_000
}

fn default_timeout_ms() -> u64 {
	25_000
}

fn default_max_timeout_ms() -> u64 {
	60_000
}

fn default_limit() -> u32 {
	100
}

fn default_max_limit() -> u32 {
	500
}
