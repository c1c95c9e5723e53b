//! Bounded FIFO between a push path and a pull path.

use crate::router::args::Args;
use crate::router::element::{Element, ElementContext, HandlerSpec};
use crate::router::error::{ConfigError, HandlerError, InitError};
use crate::router::packet::Packet;
use crate::router::port::ProcessingSpec;
use std::collections::VecDeque;

pub const DEFAULT_CAPACITY: usize = 1000;

/// Stores pushed packets until they are pulled. Drops arrivals when full.
///
/// Argument: optional CAPACITY (default 1000).
#[derive(Debug)]
pub struct Queue {
    capacity: usize,
    packets: VecDeque<Packet>,
    highwater: usize,
    drops: u64,
}

impl Default for Queue {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            packets: VecDeque::new(),
            highwater: 0,
            drops: 0,
        }
    }
}

impl Queue {
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn highwater_length(&self) -> usize {
        self.highwater
    }

    pub fn drops(&self) -> u64 {
        self.drops
    }

    fn reset(&mut self) {
        self.highwater = self.packets.len();
        self.drops = 0;
    }
}

impl Element for Queue {
    fn class_name(&self) -> &'static str {
        "Queue"
    }

    fn processing(&self) -> ProcessingSpec {
        ProcessingSpec::PUSH_TO_PULL
    }

    fn configure(&mut self, args: &Args) -> Result<(), ConfigError> {
        args.expect_at_most(1)?;
        let capacity = args
            .optional_unsigned(0, "capacity", u32::MAX as u64)?
            .map_or(DEFAULT_CAPACITY, |c| c as usize);
        if capacity == 0 {
            return Err(ConfigError::argument(0, "capacity", "must be at least 1"));
        }
        self.capacity = capacity;
        Ok(())
    }

    fn initialize(&mut self, _ctx: &mut ElementContext<'_>) -> Result<(), InitError> {
        self.packets = VecDeque::with_capacity(self.capacity.min(4096));
        self.highwater = 0;
        self.drops = 0;
        Ok(())
    }

    fn uninitialize(&mut self, _ctx: &mut ElementContext<'_>) {
        self.packets.clear();
    }

    fn push(&mut self, ctx: &mut ElementContext<'_>, _port: usize, packet: Packet) {
        if self.packets.len() >= self.capacity {
            if self.drops == 0 {
                tracing::warn!("{}: overflow, dropping packets", ctx.name());
            }
            self.drops += 1;
            return;
        }
        self.packets.push_back(packet);
        self.highwater = self.highwater.max(self.packets.len());
    }

    fn pull(&mut self, _ctx: &mut ElementContext<'_>, _port: usize) -> Option<Packet> {
        self.packets.pop_front()
    }

    fn handlers(&self) -> &'static [HandlerSpec] {
        const HANDLERS: &[HandlerSpec] = &[
            HandlerSpec::read("length"),
            HandlerSpec::read("highwater_length"),
            HandlerSpec::read("capacity"),
            HandlerSpec::read("drops"),
            HandlerSpec::write("reset"),
        ];
        HANDLERS
    }

    fn read_handler(&self, name: &str) -> Option<String> {
        match name {
            "length" => Some(self.packets.len().to_string()),
            "highwater_length" => Some(self.highwater.to_string()),
            "capacity" => Some(self.capacity.to_string()),
            "drops" => Some(self.drops.to_string()),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;

    #[test]
    fn test_configure_capacity() {
        let mut q = Queue::default();
        q.configure(&args![]).unwrap();
        assert_eq!(q.capacity(), DEFAULT_CAPACITY);
        q.configure(&args![3_i64]).unwrap();
        assert_eq!(q.capacity(), 3);
        assert!(q.configure(&args![0_i64]).is_err());
        assert!(q.configure(&args![-1_i64]).is_err());
        assert!(q.configure(&args!["big"]).is_err());
    }
}
