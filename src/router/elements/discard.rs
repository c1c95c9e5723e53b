use crate::router::element::{Element, ElementContext, HandlerSpec};
use crate::router::error::{HandlerError, InitError};
use crate::router::id::TaskId;
use crate::router::packet::Packet;
use crate::router::port::PORTS_1_0;

/// Drops every packet it receives.
///
/// When its input resolves to pull, a task pulls one packet per run.
#[derive(Debug, Default)]
pub struct Discard {
    count: u64,
    task: Option<TaskId>,
}

impl Discard {
    pub fn count(&self) -> u64 {
        self.count
    }
}

impl Element for Discard {
    fn class_name(&self) -> &'static str {
        "Discard"
    }

    fn port_count(&self) -> crate::router::port::PortCount {
        PORTS_1_0
    }

    fn initialize(&mut self, ctx: &mut ElementContext<'_>) -> Result<(), InitError> {
        self.count = 0;
        if ctx.input_is_pull(0) {
            let task = ctx
                .register_task(None)
                .map_err(|e| InitError::new(e.to_string()))?;
            ctx.schedule_task(task)
                .map_err(|e| InitError::new(e.to_string()))?;
            self.task = Some(task);
        }
        Ok(())
    }

    fn uninitialize(&mut self, _ctx: &mut ElementContext<'_>) {
        self.task = None;
    }

    fn push(&mut self, _ctx: &mut ElementContext<'_>, _port: usize, packet: Packet) {
        self.count += 1;
        drop(packet);
    }

    fn run_task(&mut self, ctx: &mut ElementContext<'_>, task: TaskId) -> bool {
        let got = ctx.pull_input(0).is_some();
        if got {
            self.count += 1;
        }
        let _ = ctx.schedule_task(task);
        got
    }

    fn handlers(&self) -> &'static [HandlerSpec] {
        const HANDLERS: &[HandlerSpec] = &[HandlerSpec::read("count"), HandlerSpec::write("reset")];
        HANDLERS
    }

    fn read_handler(&self, name: &str) -> Option<String> {
        match name {
            "count" => Some(self.count.to_string()),
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
                self.count = 0;
                Ok(())
            }
            _ => Err(HandlerError::BadValue(format!("{name} is not writable"))),
        }
    }
}
