//! Packet generators.

use super::{parse_bool, parse_int};
use crate::router::args::Args;
use crate::router::element::{Element, ElementContext, HandlerSpec};
use crate::router::error::{ConfigError, HandlerError, InitError};
use crate::router::id::{TaskId, TimerId};
use crate::router::packet::Packet;
use crate::router::port::{PortCount, ProcessingSpec, PORTS_0_1};
use std::time::{Duration, Instant};

pub const DEFAULT_DATA: &str = "Random bytes in a packet, at least 64 bytes long. Well, now it is.";

pub const DEFAULT_BURST: u64 = 1;

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

/// Largest BURST an `InfiniteSource` accepts.
pub const MAX_BURST: u64 = 1 << 16;

fn make_packet(ctx: &ElementContext<'_>, data: &[u8]) -> Packet {
    let mut packet = Packet::new(data);
    packet.anno_mut().timestamp = Some(ctx.elapsed());
    packet
}

/// A negative or missing LIMIT means no limit.
fn parse_limit(args: &Args, index: usize) -> Result<Option<u64>, ConfigError> {
    Ok(args
        .optional_int(index, "limit")?
        .and_then(|limit| u64::try_from(limit).ok()))
}

/// Pushes packets from a task as fast as the scheduler lets it.
///
/// Arguments: DATA (string), LIMIT (total packets, negative for none),
/// BURST (packets per task run), ACTIVE (start emitting at once), STOP
/// (stop the router when LIMIT is reached).
#[derive(Debug)]
pub struct InfiniteSource {
    data: Vec<u8>,
    limit: Option<u64>,
    burst: u64,
    active: bool,
    stop: bool,
    count: u64,
    task: Option<TaskId>,
}

impl Default for InfiniteSource {
    fn default() -> Self {
        Self {
            data: DEFAULT_DATA.as_bytes().to_vec(),
            limit: None,
            burst: DEFAULT_BURST,
            active: true,
            stop: false,
            count: 0,
            task: None,
        }
    }
}

impl InfiniteSource {
    pub fn count(&self) -> u64 {
        self.count
    }

    fn exhausted(&self) -> bool {
        self.limit.is_some_and(|limit| self.count >= limit)
    }

    fn wake(&mut self, ctx: &mut ElementContext<'_>) {
        if let Some(task) = self.task {
            if self.active && !self.exhausted() {
                let _ = ctx.schedule_task(task);
            } else {
                let _ = ctx.unschedule_task(task);
            }
        }
    }
}

impl Element for InfiniteSource {
    fn class_name(&self) -> &'static str {
        "InfiniteSource"
    }

    fn port_count(&self) -> PortCount {
        PORTS_0_1
    }

    fn processing(&self) -> ProcessingSpec {
        ProcessingSpec::PUSH
    }

    fn configure(&mut self, args: &Args) -> Result<(), ConfigError> {
        args.expect_at_most(5)?;
        if let Some(data) = args.optional_str(0, "data")? {
            self.data = data.as_bytes().to_vec();
        }
        self.limit = parse_limit(args, 1)?;
        self.burst = args
            .optional_unsigned(2, "burst", MAX_BURST)?
            .unwrap_or(DEFAULT_BURST);
        if self.burst == 0 {
            return Err(ConfigError::argument(2, "burst", "must be at least 1"));
        }
        self.active = args.optional_bool(3, "active")?.unwrap_or(true);
        self.stop = args.optional_bool(4, "stop")?.unwrap_or(false);
        Ok(())
    }

    fn initialize(&mut self, ctx: &mut ElementContext<'_>) -> Result<(), InitError> {
        self.count = 0;
        let task = ctx
            .register_task(None)
            .map_err(|e| InitError::new(e.to_string()))?;
        self.task = Some(task);
        self.wake(ctx);
        Ok(())
    }

    fn uninitialize(&mut self, _ctx: &mut ElementContext<'_>) {
        self.task = None;
    }

    fn run_task(&mut self, ctx: &mut ElementContext<'_>, task: TaskId) -> bool {
        if !self.active {
            return false;
        }

        let mut n = self.burst;
        if let Some(limit) = self.limit {
            n = n.min(limit.saturating_sub(self.count));
        }
        for _ in 0..n {
            let packet = make_packet(ctx, &self.data);
            ctx.push_output(0, packet);
            self.count += 1;
        }

        if self.exhausted() {
            tracing::debug!("{}: limit of {} packets reached", ctx.name(), self.count);
            if self.stop {
                ctx.request_stop();
            }
        } else {
            let _ = ctx.schedule_task(task);
        }
        n > 0
    }

    fn handlers(&self) -> &'static [HandlerSpec] {
        const HANDLERS: &[HandlerSpec] = &[
            HandlerSpec::read("count"),
            HandlerSpec::read("limit"),
            HandlerSpec::read("burst"),
            HandlerSpec::read_write("active"),
            HandlerSpec::write("reset"),
        ];
        HANDLERS
    }

    fn read_handler(&self, name: &str) -> Option<String> {
        match name {
            "count" => Some(self.count.to_string()),
            "limit" => Some(self.limit.map_or_else(|| "-1".to_string(), |l| l.to_string())),
            "burst" => Some(self.burst.to_string()),
            "active" => Some(self.active.to_string()),
            _ => None,
        }
    }

    fn write_handler(
        &mut self,
        ctx: &mut ElementContext<'_>,
        name: &str,
        value: &str,
    ) -> Result<(), HandlerError> {
        match name {
            "active" => self.active = parse_bool(name, value)?,
            "reset" => self.count = 0,
            _ => return Err(HandlerError::BadValue(format!("{name} is not writable"))),
        }
        self.wake(ctx);
        Ok(())
    }
}

/// Pushes one packet every INTERVAL from a timer.
///
/// Arguments: INTERVAL (seconds), DATA (string), LIMIT (total packets,
/// negative for none), STOP (stop the router when LIMIT is reached).
#[derive(Debug)]
pub struct TimedSource {
    interval: Duration,
    data: Vec<u8>,
    limit: Option<u64>,
    stop: bool,
    count: u64,
    timer: Option<TimerId>,
    next_fire: Option<Instant>,
}

impl Default for TimedSource {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            data: DEFAULT_DATA.as_bytes().to_vec(),
            limit: None,
            stop: false,
            count: 0,
            timer: None,
            next_fire: None,
        }
    }
}

impl TimedSource {
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Element for TimedSource {
    fn class_name(&self) -> &'static str {
        "TimedSource"
    }

    fn port_count(&self) -> PortCount {
        PORTS_0_1
    }

    fn processing(&self) -> ProcessingSpec {
        ProcessingSpec::PUSH
    }

    fn configure(&mut self, args: &Args) -> Result<(), ConfigError> {
        args.expect_at_most(4)?;
        if args.get(0).is_some() {
            self.interval = args.required_seconds(0, "interval")?;
        }
        if self.interval.is_zero() {
            return Err(ConfigError::argument(0, "interval", "must be positive"));
        }
        if let Some(data) = args.optional_str(1, "data")? {
            self.data = data.as_bytes().to_vec();
        }
        self.limit = parse_limit(args, 2)?;
        self.stop = args.optional_bool(3, "stop")?.unwrap_or(false);
        Ok(())
    }

    fn initialize(&mut self, ctx: &mut ElementContext<'_>) -> Result<(), InitError> {
        self.count = 0;
        if self.limit == Some(0) {
            return Ok(());
        }
        let next = ctx
            .now()
            .checked_add(self.interval)
            .ok_or_else(|| InitError::new(format!("interval {:?} is too long", self.interval)))?;
        let timer = ctx.create_timer();
        ctx.schedule_timer_at(timer, next)
            .map_err(|e| InitError::new(e.to_string()))?;
        self.timer = Some(timer);
        self.next_fire = Some(next);
        Ok(())
    }

    fn uninitialize(&mut self, _ctx: &mut ElementContext<'_>) {
        self.timer = None;
        self.next_fire = None;
    }

    fn run_timer(&mut self, ctx: &mut ElementContext<'_>, timer: TimerId) {
        let packet = make_packet(ctx, &self.data);
        ctx.push_output(0, packet);
        self.count += 1;

        if self.limit.is_some_and(|limit| self.count >= limit) {
            tracing::debug!("{}: limit of {} packets reached", ctx.name(), self.count);
            if self.stop {
                ctx.request_stop();
            }
            return;
        }

        // Schedule from the previous expiry so the period does not drift.
        let Some(next) = self
            .next_fire
            .unwrap_or_else(|| ctx.now())
            .checked_add(self.interval)
        else {
            tracing::warn!("{}: interval {:?} is too long, stopping", ctx.name(), self.interval);
            self.next_fire = None;
            return;
        };
        self.next_fire = Some(next);
        if let Err(e) = ctx.schedule_timer_at(timer, next) {
            tracing::warn!("{}: cannot reschedule: {}", ctx.name(), e);
        }
    }

    fn handlers(&self) -> &'static [HandlerSpec] {
        const HANDLERS: &[HandlerSpec] = &[
            HandlerSpec::read("count"),
            HandlerSpec::read_write("interval_ms"),
        ];
        HANDLERS
    }

    fn read_handler(&self, name: &str) -> Option<String> {
        match name {
            "count" => Some(self.count.to_string()),
            "interval_ms" => Some(self.interval.as_millis().to_string()),
            _ => None,
        }
    }

    fn write_handler(
        &mut self,
        _ctx: &mut ElementContext<'_>,
        name: &str,
        value: &str,
    ) -> Result<(), HandlerError> {
        match name {
            "interval_ms" => {
                let ms: u64 = parse_int(name, value)?;
                if ms == 0 {
                    return Err(HandlerError::BadValue("interval_ms: must be positive".into()));
                }
                self.interval = Duration::from_millis(ms);
                Ok(())
            }
            _ => Err(HandlerError::BadValue(format!("{name} is not writable"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;

    #[test]
    fn test_infinite_source_configure() {
        let mut s = InfiniteSource::default();
        s.configure(&args!["abc", 10_i64, 4_i64, false, true]).unwrap();
        assert_eq!(s.data, b"abc");
        assert_eq!(s.limit, Some(10));
        assert_eq!(s.burst, 4);
        assert!(!s.active);
        assert!(s.stop);

        s.configure(&args!["abc", -1_i64]).unwrap();
        assert_eq!(s.limit, None);
        assert!(s.configure(&args!["abc", 1_i64, 0_i64]).is_err());
    }

    #[test]
    fn test_timed_source_configure() {
        let mut s = TimedSource::default();
        s.configure(&args![0.25]).unwrap();
        assert_eq!(s.interval(), Duration::from_millis(250));
        assert!(s.configure(&args![0_i64]).is_err());
        assert!(s.configure(&args!["soon"]).is_err());
    }

    #[test]
    fn test_timed_source_rejects_unrepresentable_interval() {
        let mut s = TimedSource::default();
        let err = s.configure(&args![1e30]).unwrap_err();
        assert_eq!(err.argument.unwrap().name, "interval");
        assert!(s.configure(&args![-0.5]).is_err());
        assert!(s.configure(&args![f64::NAN]).is_err());
    }
}
