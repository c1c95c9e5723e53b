//! Rate-ratio classifier.

use super::parse_int;
use crate::router::args::Args;
use crate::router::element::{Element, ElementContext, HandlerSpec};
use crate::router::error::{ConfigError, HandlerError};
use crate::router::packet::Packet;
use crate::router::port::{PortCount, ProcessingSpec, PORTS_1_2};

/// Routes packets by the ratio of their rate annotations.
///
/// A packet goes to output 1 when either rate exceeds THRESH and
/// `fwd_weight * fwd_rate > rev_weight * rev_rate`; otherwise to output 0.
/// Rates below 1 count as 1.
///
/// Arguments: FWD_WEIGHT, REV_WEIGHT, THRESH (all integers).
#[derive(Debug)]
pub struct CompareBlock {
    fwd_weight: i64,
    rev_weight: i64,
    thresh: i64,
}

impl Default for CompareBlock {
    fn default() -> Self {
        Self {
            fwd_weight: 0,
            rev_weight: 1,
            thresh: 0,
        }
    }
}

impl CompareBlock {
    /// Output port a packet with these annotations goes to.
    pub fn classify(&self, fwd_rate: i32, rev_rate: i32) -> usize {
        let fwd = i64::from(fwd_rate.max(1));
        let rev = i64::from(rev_rate.max(1));
        let busy = fwd > self.thresh || rev > self.thresh;
        if busy && self.fwd_weight.saturating_mul(fwd) > self.rev_weight.saturating_mul(rev) {
            1
        } else {
            0
        }
    }
}

impl Element for CompareBlock {
    fn class_name(&self) -> &'static str {
        "CompareBlock"
    }

    fn port_count(&self) -> PortCount {
        PORTS_1_2
    }

    fn processing(&self) -> ProcessingSpec {
        ProcessingSpec::PUSH
    }

    fn configure(&mut self, args: &Args) -> Result<(), ConfigError> {
        args.expect_at_most(3)?;
        self.fwd_weight = args.required_int(0, "forward weight")?;
        self.rev_weight = args.required_int(1, "reverse weight")?;
        self.thresh = args.required_int(2, "threshold")?;
        Ok(())
    }

    fn push(&mut self, ctx: &mut ElementContext<'_>, _port: usize, packet: Packet) {
        let anno = packet.anno();
        let port = self.classify(anno.fwd_rate, anno.rev_rate);
        ctx.push_output(port, packet);
    }

    fn handlers(&self) -> &'static [HandlerSpec] {
        const HANDLERS: &[HandlerSpec] = &[
            HandlerSpec::read_write("fwd_weight"),
            HandlerSpec::read_write("rev_weight"),
            HandlerSpec::read_write("thresh"),
        ];
        HANDLERS
    }

    fn read_handler(&self, name: &str) -> Option<String> {
        match name {
            "fwd_weight" => Some(self.fwd_weight.to_string()),
            "rev_weight" => Some(self.rev_weight.to_string()),
            "thresh" => Some(self.thresh.to_string()),
            _ => None,
        }
    }

    fn write_handler(
        &mut self,
        _ctx: &mut ElementContext<'_>,
        name: &str,
        value: &str,
    ) -> Result<(), HandlerError> {
        let parsed: i64 = parse_int(name, value)?;
        match name {
            "fwd_weight" => self.fwd_weight = parsed,
            "rev_weight" => self.rev_weight = parsed,
            "thresh" => self.thresh = parsed,
            _ => return Err(HandlerError::BadValue(format!("{name} is not writable"))),
        }
        Ok(())
    }
}
