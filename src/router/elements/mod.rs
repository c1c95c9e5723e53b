//! Built-in element classes.

pub mod compare_block;
pub mod counter;
pub mod discard;
pub mod ip_checksum;
pub mod null;
pub mod pull_sink;
pub mod queue;
pub mod rate_anno;
pub mod sources;
pub mod tee;

pub use compare_block::CompareBlock;
pub use counter::{Counter, RateEwma};
pub use discard::Discard;
pub use ip_checksum::SetIPChecksum;
pub use null::Null;
pub use pull_sink::PullSink;
pub use queue::Queue;
pub use rate_anno::SetRateAnno;
pub use sources::{InfiniteSource, TimedSource};
pub use tee::Tee;

use crate::router::error::HandlerError;
use crate::router::registry::ElementRegistry;

pub(crate) fn register_builtins(registry: &mut ElementRegistry) {
    registry.register("CompareBlock", || Box::new(CompareBlock::default()));
    registry.register("Counter", || Box::new(Counter::default()));
    registry.register("Discard", || Box::new(Discard::default()));
    registry.register("InfiniteSource", || Box::new(InfiniteSource::default()));
    registry.register("Null", || Box::new(Null));
    registry.register("PullSink", || Box::new(PullSink::default()));
    registry.register("Queue", || Box::new(Queue::default()));
    registry.register("SetIPChecksum", || Box::new(SetIPChecksum::default()));
    registry.register("SetRateAnno", || Box::new(SetRateAnno::default()));
    registry.register("Tee", || Box::new(Tee::default()));
    registry.register("TimedSource", || Box::new(TimedSource::default()));
}

/// Parse a write-handler value as a single integer.
pub(crate) fn parse_int<T: std::str::FromStr>(handler: &str, value: &str) -> Result<T, HandlerError> {
    value
        .trim()
        .parse()
        .map_err(|_| HandlerError::BadValue(format!("{handler}: expected one integer, got {value:?}")))
}

/// Parse a write-handler value as a boolean.
pub(crate) fn parse_bool(handler: &str, value: &str) -> Result<bool, HandlerError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(HandlerError::BadValue(format!(
            "{handler}: expected true or false, got {value:?}"
        ))),
    }
}
