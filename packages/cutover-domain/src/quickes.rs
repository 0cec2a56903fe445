use serde_json::Value;

/// Default quick phrases, one per slot. Clients always see exactly this many slots.
pub const DEFAULT_QUICKES: [&str; 6] = ["Да", "Нет", "Спасибо", "Пожалуйста", "Привет", "Пока"];

/// Maps any input to the fixed slot layout, falling back to the default for blank or missing
/// slots.
pub fn normalize(quickes: &[String]) -> Vec<String> {
	DEFAULT_QUICKES
		.iter()
		.enumerate()
		.map(|(idx, fallback)| match quickes.get(idx) {
			Some(text) if !text.trim().is_empty() => text.clone(),
			_ => (*fallback).to_string(),
		})
		.collect()
}

pub fn defaults() -> Vec<String> {
	DEFAULT_QUICKES.iter().map(|text| (*text).to_string()).collect()
}

/// Reads quick phrases from a legacy node, which stores them either as an array or as an
/// object keyed by slot index.
pub fn from_json(raw: &Value) -> Vec<String> {
	match raw {
		Value::Array(items) => items.iter().filter_map(|item| item.as_str().map(str::to_string)).collect(),
		Value::Object(map) => {
			let mut slots = map
				.iter()
				.filter_map(|(key, value)| {
					let idx = key.parse::<usize>().ok()?;

					value.as_str().map(|text| (idx, text.to_string()))
				})
				.collect::<Vec<_>>();

			slots.sort_by_key(|(idx, _)| *idx);

			slots.into_iter().map(|(_, text)| text).collect()
		},
		_ => Vec::new(),
	}
}
