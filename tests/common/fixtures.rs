//! Test elements that expose what the router does to them

use pktgraph::router::port::{PortCount, PortRange, ProcessingSpec, PORTS_0_1, PORTS_1_0};
use pktgraph::router::{ElementContext, InitError};
use pktgraph::{Element, Packet};
use std::sync::{Arc, Mutex};

pub type Captured = Arc<Mutex<Vec<Packet>>>;
pub type EventLog = Arc<Mutex<Vec<String>>>;

/// Push source with no behavior of its own; tests `inject` packets through it
pub struct Inlet;

impl Element for Inlet {
    fn class_name(&self) -> &'static str {
        "Inlet"
    }

    fn port_count(&self) -> PortCount {
        PORTS_0_1
    }

    fn processing(&self) -> ProcessingSpec {
        ProcessingSpec::PUSH
    }
}

/// Push sink that keeps every packet it receives
pub struct Recorder {
    captured: Captured,
}

impl Recorder {
    pub fn new() -> (Box<Self>, Captured) {
        let captured = Captured::default();
        (
            Box::new(Self {
                captured: Arc::clone(&captured),
            }),
            captured,
        )
    }
}

impl Element for Recorder {
    fn class_name(&self) -> &'static str {
        "Recorder"
    }

    fn port_count(&self) -> PortCount {
        PORTS_1_0
    }

    fn processing(&self) -> ProcessingSpec {
        ProcessingSpec::PUSH
    }

    fn push(&mut self, _ctx: &mut ElementContext<'_>, _port: usize, packet: Packet) {
        self.captured.lock().unwrap().push(packet);
    }
}

/// Port-less element that logs its lifecycle calls and can be told to fail
pub struct Lifecycle {
    log: EventLog,
    fail_initialize: bool,
}

impl Lifecycle {
    pub fn new(log: &EventLog) -> Box<Self> {
        Box::new(Self {
            log: Arc::clone(log),
            fail_initialize: false,
        })
    }

    pub fn failing(log: &EventLog) -> Box<Self> {
        Box::new(Self {
            log: Arc::clone(log),
            fail_initialize: true,
        })
    }
}

impl Element for Lifecycle {
    fn class_name(&self) -> &'static str {
        "Lifecycle"
    }

    fn port_count(&self) -> PortCount {
        PortCount::new(PortRange::at_least(0), PortRange::at_least(0))
    }

    fn initialize(&mut self, ctx: &mut ElementContext<'_>) -> Result<(), InitError> {
        // A timer that outlives a failed start must be cleaned up by the router.
        let timer = ctx.create_timer();
        ctx.schedule_timer_after(timer, std::time::Duration::from_secs(60))
            .map_err(|e| InitError::new(e.to_string()))?;

        self.log.lock().unwrap().push(format!("init {}", ctx.name()));
        if self.fail_initialize {
            return Err(InitError::new("device busy"));
        }
        Ok(())
    }

    fn uninitialize(&mut self, ctx: &mut ElementContext<'_>) {
        self.log.lock().unwrap().push(format!("uninit {}", ctx.name()));
    }
}
