use crate::router::args::Args;
use crate::router::element::{Element, ElementContext, HandlerSpec};
use crate::router::error::{ConfigError, HandlerError};
use crate::router::packet::Packet;

use super::parse_int;

/// Stamps the forward and reverse rate annotations.
///
/// Arguments: FWD_RATE, optional REV_RATE (default 0).
#[derive(Debug, Default)]
pub struct SetRateAnno {
    fwd_rate: i32,
    rev_rate: i32,
}

impl Element for SetRateAnno {
    fn class_name(&self) -> &'static str {
        "SetRateAnno"
    }

    fn configure(&mut self, args: &Args) -> Result<(), ConfigError> {
        args.expect_at_most(2)?;
        let to_i32 = |index: usize, name: &str, v: i64| {
            i32::try_from(v).map_err(|_| ConfigError::argument(index, name, format!("{v} is out of range")))
        };
        self.fwd_rate = to_i32(0, "forward rate", args.required_int(0, "forward rate")?)?;
        self.rev_rate = match args.optional_int(1, "reverse rate")? {
            Some(v) => to_i32(1, "reverse rate", v)?,
            None => 0,
        };
        Ok(())
    }

    fn simple_action(&mut self, _ctx: &mut ElementContext<'_>, mut packet: Packet) -> Option<Packet> {
        let anno = packet.anno_mut();
        anno.fwd_rate = self.fwd_rate;
        anno.rev_rate = self.rev_rate;
        Some(packet)
    }

    fn handlers(&self) -> &'static [HandlerSpec] {
        const HANDLERS: &[HandlerSpec] = &[
            HandlerSpec::read_write("fwd_rate"),
            HandlerSpec::read_write("rev_rate"),
        ];
        HANDLERS
    }

    fn read_handler(&self, name: &str) -> Option<String> {
        match name {
            "fwd_rate" => Some(self.fwd_rate.to_string()),
            "rev_rate" => Some(self.rev_rate.to_string()),
            _ => None,
        }
    }

    fn write_handler(
        &mut self,
        _ctx: &mut ElementContext<'_>,
        name: &str,
        value: &str,
    ) -> Result<(), HandlerError> {
        let rate: i32 = parse_int(name, value)?;
        match name {
            "fwd_rate" => self.fwd_rate = rate,
            "rev_rate" => self.rev_rate = rate,
            _ => return Err(HandlerError::BadValue(format!("{name} is not writable"))),
        }
        Ok(())
    }
}
