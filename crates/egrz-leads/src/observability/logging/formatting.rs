use std::fmt;
use std::time::Duration;

/// Records the error with its `source()` chain, the fmt layer renders all of it
#[must_use]
pub fn tracing_err<'a, E: std::error::Error + 'static>(err: &'a E) -> impl tracing::Value + 'a {
    err as &dyn std::error::Error
}

/// Durations in the logs are seconds with millisecond precision, runs and
/// registry downloads range from milliseconds to tens of minutes.
pub(crate) fn tracing_duration(duration: Duration) -> impl tracing::Value {
    tracing::field::display(Seconds(duration))
}

struct Seconds(Duration);

impl fmt::Display for Seconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.0.as_secs_f64())
    }
}
