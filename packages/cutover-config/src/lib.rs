mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, Feature, Feed, Legacy, Postgres, ReadSource, Reconciliation, Service, Storage,
};

use std::{fs, net::SocketAddr, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	parse(path, &raw)
}

pub fn parse(path: &Path, raw: &str) -> Result<Config> {
	let mut cfg: Config = toml::from_str(raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.parse::<SocketAddr>().is_err() {
		return Err(Error::Validation {
			message: "service.http_bind must be a socket address.".to_string(),
		});
	}
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}

	if let Some(legacy) = cfg.legacy.as_ref() {
		if legacy.base_url.trim().is_empty() {
			return Err(Error::Validation {
				message: "legacy.base_url must be non-empty.".to_string(),
			});
		}
		if !legacy.base_url.starts_with("http://") && !legacy.base_url.starts_with("https://") {
			return Err(Error::Validation {
				message: "legacy.base_url must be an http or https URL.".to_string(),
			});
		}
		if legacy.timeout_ms == 0 {
			return Err(Error::Validation {
				message: "legacy.timeout_ms must be greater than zero.".to_string(),
			});
		}
	}

	if cfg.feature.cohort_percent > 100 {
		return Err(Error::Validation {
			message: "feature.cohort_percent must be in the range 0-100.".to_string(),
		});
	}
	if cfg.sync.poll_interval_ms == 0 {
		return Err(Error::Validation {
			message: "sync.poll_interval_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.sync.stream_reconnect_ms == 0 {
		return Err(Error::Validation {
			message: "sync.stream_reconnect_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.sync.stream_enabled && cfg.legacy.is_none() {
		return Err(Error::Validation {
			message: "sync.stream_enabled requires a [legacy] section.".to_string(),
		});
	}

	for (label, value) in [
		("feed.poll_interval_ms", cfg.feed.poll_interval_ms),
		("feed.push_interval_ms", cfg.feed.push_interval_ms),
		("feed.heartbeat_interval_ms", cfg.feed.heartbeat_interval_ms),
		("feed.default_timeout_ms", cfg.feed.default_timeout_ms),
		("feed.max_timeout_ms", cfg.feed.max_timeout_ms),
		("feed.default_limit", u64::from(cfg.feed.default_limit)),
		("feed.max_limit", u64::from(cfg.feed.max_limit)),
	] {
		if value == 0 {
			return Err(Error::Validation { message: format!("{label} must be greater than zero.") });
		}
	}

	if cfg.feed.default_timeout_ms > cfg.feed.max_timeout_ms {
		return Err(Error::Validation {
			message: "feed.default_timeout_ms must not exceed feed.max_timeout_ms.".to_string(),
		});
	}
	if cfg.feed.default_limit > cfg.feed.max_limit {
		return Err(Error::Validation {
			message: "feed.default_limit must not exceed feed.max_limit.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if let Some(legacy) = cfg.legacy.as_mut() {
		legacy.base_url = legacy.base_url.trim().trim_end_matches('/').to_string();

		if legacy.auth_token.as_deref().map(|token| token.trim().is_empty()).unwrap_or(false) {
			legacy.auth_token = None;
		}
	}

	cfg.sync.stream_path = cfg.sync.stream_path.trim().trim_matches('/').to_string();
}
