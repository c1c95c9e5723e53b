use crate::router::args::Args;
use crate::router::element::{Element, ElementContext, HandlerSpec};
use crate::router::error::{ConfigError, HandlerError, InitError};
use crate::router::id::TaskId;
use crate::router::port::{PortCount, ProcessingSpec, PORTS_1_0};

/// Pulls up to BURST packets per task run and drops them.
#[derive(Debug)]
pub struct PullSink {
    burst: u64,
    count: u64,
    byte_count: u64,
    task: Option<TaskId>,
}

impl Default for PullSink {
    fn default() -> Self {
        Self {
            burst: 1,
            count: 0,
            byte_count: 0,
            task: None,
        }
    }
}

impl PullSink {
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn byte_count(&self) -> u64 {
        self.byte_count
    }
}

impl Element for PullSink {
    fn class_name(&self) -> &'static str {
        "PullSink"
    }

    fn port_count(&self) -> PortCount {
        PORTS_1_0
    }

    fn processing(&self) -> ProcessingSpec {
        ProcessingSpec::PULL
    }

    fn configure(&mut self, args: &Args) -> Result<(), ConfigError> {
        args.expect_at_most(1)?;
        self.burst = args.optional_unsigned(0, "burst", 1 << 16)?.unwrap_or(1);
        if self.burst == 0 {
            return Err(ConfigError::argument(0, "burst", "must be at least 1"));
        }
        Ok(())
    }

    fn initialize(&mut self, ctx: &mut ElementContext<'_>) -> Result<(), InitError> {
        self.count = 0;
        self.byte_count = 0;
        let task = ctx
            .register_task(None)
            .map_err(|e| InitError::new(e.to_string()))?;
        ctx.schedule_task(task)
            .map_err(|e| InitError::new(e.to_string()))?;
        self.task = Some(task);
        Ok(())
    }

    fn uninitialize(&mut self, _ctx: &mut ElementContext<'_>) {
        self.task = None;
    }

    fn run_task(&mut self, ctx: &mut ElementContext<'_>, task: TaskId) -> bool {
        let mut got = 0;
        while got < self.burst {
            let Some(packet) = ctx.pull_input(0) else {
                break;
            };
            got += 1;
            self.byte_count += packet.len() as u64;
        }
        self.count += got;
        let _ = ctx.schedule_task(task);
        got > 0
    }

    fn handlers(&self) -> &'static [HandlerSpec] {
        const HANDLERS: &[HandlerSpec] = &[
            HandlerSpec::read("count"),
            HandlerSpec::read("byte_count"),
            HandlerSpec::write("reset"),
        ];
        HANDLERS
    }

    fn read_handler(&self, name: &str) -> Option<String> {
        match name {
            "count" => Some(self.count.to_string()),
            "byte_count" => Some(self.byte_count.to_string()),
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
                self.byte_count = 0;
                Ok(())
            }
            _ => Err(HandlerError::BadValue(format!("{name} is not writable"))),
        }
    }
}
