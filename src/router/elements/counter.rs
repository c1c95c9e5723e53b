//! Packet and byte counting with a smoothed rate.

use crate::router::args::Args;
use crate::router::element::{Element, ElementContext, HandlerSpec};
use crate::router::error::{ConfigError, HandlerError, InitError};
use crate::router::packet::Packet;
use std::time::{Duration, Instant};

/// Length of one rate-averaging epoch.
pub const RATE_EPOCH: Duration = Duration::from_millis(100);

/// Weight of the newest epoch in the average.
pub const RATE_ALPHA: f64 = 0.125;

/// Exponentially weighted moving average of an event rate.
///
/// Amounts are accumulated per epoch; when an epoch closes its total is
/// folded into the average. Empty epochs decay the average.
#[derive(Debug, Clone)]
pub struct RateEwma {
    epoch: Duration,
    alpha: f64,
    /// Average amount per epoch.
    average: f64,
    current: u64,
    epoch_start: Option<Instant>,
}

impl RateEwma {
    pub fn new(epoch: Duration, alpha: f64) -> Self {
        Self {
            epoch,
            alpha,
            average: 0.0,
            current: 0,
            epoch_start: None,
        }
    }

    pub fn update(&mut self, now: Instant, amount: u64) {
        self.advance(now);
        self.current += amount;
    }

    /// Close every epoch that ended by `now`.
    pub fn advance(&mut self, now: Instant) {
        let Some(start) = self.epoch_start else {
            self.epoch_start = Some(now);
            return;
        };
        let elapsed = now.saturating_duration_since(start);
        let epochs = (elapsed.as_nanos() / self.epoch.as_nanos().max(1)) as u64;
        if epochs == 0 {
            return;
        }

        self.average += self.alpha * (self.current as f64 - self.average);
        self.current = 0;
        // Remaining epochs were empty.
        let idle = (epochs - 1).min(i32::MAX as u64) as i32;
        self.average *= (1.0 - self.alpha).powi(idle);
        self.epoch_start = Some(start + self.epoch * epochs.min(u32::MAX as u64) as u32);
    }

    /// Smoothed rate in units per second.
    pub fn per_second(&self) -> f64 {
        self.average / self.epoch.as_secs_f64()
    }

    pub fn reset(&mut self) {
        self.average = 0.0;
        self.current = 0;
        self.epoch_start = None;
    }
}

impl Default for RateEwma {
    fn default() -> Self {
        Self::new(RATE_EPOCH, RATE_ALPHA)
    }
}

/// Counts packets passing through.
///
/// Optional argument: `"packets"` (default) or `"bytes"`, which selects what
/// the rate measures.
#[derive(Debug, Default)]
pub struct Counter {
    bytes_mode: bool,
    count: u64,
    byte_count: u64,
    rate: RateEwma,
}

impl Counter {
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn byte_count(&self) -> u64 {
        self.byte_count
    }

    /// Smoothed rate in packets (or bytes) per second.
    pub fn rate(&self) -> f64 {
        self.rate.per_second()
    }

    pub fn reset(&mut self) {
        self.count = 0;
        self.byte_count = 0;
        self.rate.reset();
    }
}

impl Element for Counter {
    fn class_name(&self) -> &'static str {
        "Counter"
    }

    fn configure(&mut self, args: &Args) -> Result<(), ConfigError> {
        args.expect_at_most(1)?;
        self.bytes_mode = match args.optional_str(0, "unit")? {
            None => false,
            Some(unit) if unit.eq_ignore_ascii_case("packets") => false,
            Some(unit) if unit.eq_ignore_ascii_case("bytes") => true,
            Some(_) => {
                return Err(ConfigError::argument(
                    0,
                    "unit",
                    "should be \"bytes\" or \"packets\"",
                ))
            }
        };
        Ok(())
    }

    fn initialize(&mut self, _ctx: &mut ElementContext<'_>) -> Result<(), InitError> {
        self.reset();
        Ok(())
    }

    fn simple_action(&mut self, ctx: &mut ElementContext<'_>, packet: Packet) -> Option<Packet> {
        let len = packet.len() as u64;
        self.count += 1;
        self.byte_count += len;
        self.rate
            .update(ctx.now(), if self.bytes_mode { len } else { 1 });
        Some(packet)
    }

    fn handlers(&self) -> &'static [HandlerSpec] {
        const HANDLERS: &[HandlerSpec] = &[
            HandlerSpec::read("count"),
            HandlerSpec::read("byte_count"),
            HandlerSpec::read("rate"),
            HandlerSpec::write("reset"),
        ];
        HANDLERS
    }

    fn read_handler(&self, name: &str) -> Option<String> {
        match name {
            "count" => Some(self.count.to_string()),
            "byte_count" => Some(self.byte_count.to_string()),
            "rate" => Some(format!("{:.2}", self.rate())),
            _ => None,
        }
    }

    fn write_handler(
        &mut self,
        _ctx: &mut ElementContext<'_>,
        name: &str,
        _value: &str,
    ) -> Result<(), HandlerError> {
        match name {
            "reset" => {
                self.reset();
                Ok(())
            }
            _ => Err(HandlerError::BadValue(format!("{name} is not writable"))),
        }
    }
}
