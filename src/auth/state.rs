use rand::distr::Alphanumeric;
use rand::Rng;

/// Length of generated `state` values.
pub const STATE_LENGTH: usize = 32;

/// Generates an unpredictable anti-forgery `state` value.
///
/// Returns 32 ASCII alphanumeric characters drawn from the thread-local
/// CSPRNG, safe to embed in a query string without escaping.
#[must_use]
pub fn generate_state() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(STATE_LENGTH)
        .map(char::from)
        .collect()
}
