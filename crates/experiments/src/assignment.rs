//! Deterministic user-to-variant assignment
//!
//! Bucketing combines the experiment and user identifiers into a single
//! key, hashes it, and reduces modulo 100. A user therefore keeps the same
//! variant for the lifetime of an experiment's configuration without any
//! stored assignment state, and assignment needs no I/O or randomness.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use campaign_optimizer_types::Variant;

/// Allocations are whole percentages, so 100 buckets
const BUCKETS: u64 = 100;

/// Map an (experiment, user) pair to a traffic bucket in [0, 100)
pub fn bucket_for(experiment_id: &str, user_id: &str) -> u8 {
    let key = format!("{}:{}", experiment_id, user_id);

    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);

    (hasher.finish() % BUCKETS) as u8
}

/// Resolve a bucket to a variant
///
/// Walks variants in configured order accumulating traffic allocations and
/// returns the first variant whose cumulative allocation exceeds the
/// bucket. When the allocations do not cover the bucket (percentages not
/// summing to 100), falls back to the control variant, or the first
/// variant if no control is marked. Returns `None` only for an empty
/// variant list.
pub fn variant_for_bucket(variants: &[Variant], bucket: u8) -> Option<&Variant> {
    let mut cumulative = 0u32;
    for variant in variants {
        cumulative += u32::from(variant.traffic_allocation);
        if u32::from(bucket) < cumulative {
            return Some(variant);
        }
    }

    variants
        .iter()
        .find(|v| v.is_control)
        .or_else(|| variants.first())
}
