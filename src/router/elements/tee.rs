use crate::router::args::Args;
use crate::router::element::{Element, ElementContext};
use crate::router::error::{ConfigError, InitError};
use crate::router::packet::Packet;
use crate::router::port::{PortCount, PortRange, ProcessingSpec};

/// Sends a copy of each packet to every output.
///
/// Copies share the packet buffer; the last output gets the original.
/// Optional argument N checks the number of connected outputs.
#[derive(Debug, Default)]
pub struct Tee {
    expected: Option<usize>,
}

impl Element for Tee {
    fn class_name(&self) -> &'static str {
        "Tee"
    }

    fn port_count(&self) -> PortCount {
        PortCount::new(PortRange::fixed(1), PortRange::at_least(1))
    }

    fn processing(&self) -> ProcessingSpec {
        ProcessingSpec::PUSH
    }

    fn configure(&mut self, args: &Args) -> Result<(), ConfigError> {
        args.expect_at_most(1)?;
        self.expected = args
            .optional_unsigned(0, "outputs", u16::MAX as u64)?
            .map(|n| n as usize);
        Ok(())
    }

    fn initialize(&mut self, ctx: &mut ElementContext<'_>) -> Result<(), InitError> {
        match self.expected {
            Some(n) if n != ctx.noutputs() => Err(InitError::new(format!(
                "configured for {n} outputs, but {} are connected",
                ctx.noutputs()
            ))),
            _ => Ok(()),
        }
    }

    fn push(&mut self, ctx: &mut ElementContext<'_>, _port: usize, packet: Packet) {
        let n = ctx.noutputs();
        for port in 0..n.saturating_sub(1) {
            ctx.push_output(port, packet.clone());
        }
        if n > 0 {
            ctx.push_output(n - 1, packet);
        }
    }
}
