//! Per-user read-source routing.
//!
//! The cohort bucket is the first four bytes of the user id's BLAKE3 digest, little-endian,
//! modulo 100, so every service instance and every restart puts a user in the same bucket.

use cutover_config::{Feature, ReadSource};

/// Whether reads for `user_id` are served from the canonical store.
pub fn use_canonical(user_id: &str, feature: &Feature) -> bool {
	match feature.read_source {
		ReadSource::LegacyOnly => false,
		ReadSource::CanonicalPrimary => true,
		ReadSource::Cohort => {
			if feature.cohort_percent == 0 {
				return false;
			}

			bucket(user_id) < u32::from(feature.cohort_percent)
		},
	}
}

/// Stable bucket in `0..100`.
pub fn bucket(user_id: &str) -> u32 {
	let digest = blake3::hash(user_id.as_bytes());
	let [b0, b1, b2, b3, ..] = *digest.as_bytes();

	u32::from_le_bytes([b0, b1, b2, b3]) % 100
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bucket_follows_reference_digests() {
		// BLAKE3("") starts with af1349b9, BLAKE3("abc") with 6437b3ac.
		assert_eq!(bucket(""), 0xb949_13af % 100);
		assert_eq!(bucket("abc"), 0xacb3_3764 % 100);
	}
}
