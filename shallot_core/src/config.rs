/*! Protocol settings of a node.
*/

use std::time::Duration;

use serde::{Deserialize, Deserializer};

/// Number of intermediate hops in a circuit.
pub const DEFAULT_ROUTE_LENGTH: usize = 3;
/// Timeout of a single substrate call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(666);
/// How many times a timed out call is repeated.
pub const DEFAULT_MAX_CALL_RETRIES: u32 = 3;
/// Maximum number of cached identities.
pub const DEFAULT_IDENTITY_CACHE_SIZE: usize = 1024;

fn deserialize_millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

/// Settings of circuit building and relaying.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Number of random waypoints before the destination.
    pub route_length: usize,
    /// Timeout of a single substrate call, in milliseconds when deserialized.
    #[serde(rename = "call_timeout_ms", deserialize_with = "deserialize_millis")]
    pub call_timeout: Duration,
    /// How many times a timed out call is repeated.
    pub max_call_retries: u32,
    /// Maximum number of cached identities.
    pub identity_cache_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            route_length: DEFAULT_ROUTE_LENGTH,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_call_retries: DEFAULT_MAX_CALL_RETRIES,
            identity_cache_size: DEFAULT_IDENTITY_CACHE_SIZE,
        }
    }
}
