//! Decode limits for untrusted PSBT data.

/// Default cap on a single record key.
pub const DEFAULT_MAX_KEY_SIZE: usize = 1_000;
/// Default cap on a single record value.
pub const DEFAULT_MAX_VALUE_SIZE: usize = 4_000_000;
/// Default cap on records in one map.
pub const DEFAULT_MAX_ENTRIES_PER_MAP: usize = 10_000;
/// Default cap on the whole encoded PSBT.
pub const DEFAULT_MAX_PSBT_SIZE: usize = 100_000_000;

/// Hard limits applied while decoding.
///
/// Every read is already bounded by the remaining input; these caps make
/// hostile inputs fail before any large allocation or long loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodeConfig {
    pub max_key_size: usize,
    pub max_value_size: usize,
    pub max_entries_per_map: usize,
    pub max_psbt_size: usize,
}

impl DecodeConfig {
    /// Limits that never trigger.
    pub fn unbounded() -> Self {
        DecodeConfig {
            max_key_size: usize::MAX,
            max_value_size: usize::MAX,
            max_entries_per_map: usize::MAX,
            max_psbt_size: usize::MAX,
        }
    }
}

impl Default for DecodeConfig {
    fn default() -> Self {
        DecodeConfig {
            max_key_size: DEFAULT_MAX_KEY_SIZE,
            max_value_size: DEFAULT_MAX_VALUE_SIZE,
            max_entries_per_map: DEFAULT_MAX_ENTRIES_PER_MAP,
            max_psbt_size: DEFAULT_MAX_PSBT_SIZE,
        }
    }
}
