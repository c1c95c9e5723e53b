//! The element contract and the context elements run in.
//!
//! An element is a packet-processing node with declared ports. The router
//! owns every element as a `Box<dyn Element>` and calls into it with an
//! [`ElementContext`], which is the element's only way to reach the rest of
//! the graph: forwarding packets, pulling from upstream, and managing its
//! timers and tasks.

use crate::router::args::Args;
use crate::router::error::{ConfigError, HandlerError, InitError, TaskError, TimerError};
use crate::router::executor::{Router, TaskAction, TimerAction};
use crate::router::id::{ElementId, TaskId, TimerId};
use crate::router::packet::Packet;
use crate::router::port::{Mode, PortCount, PortDirection, ProcessingSpec, PORTS_1_1};
use std::any::Any;
use std::time::{Duration, Instant};

/// Declares one handler an element answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerSpec {
    pub name: &'static str,
    pub read: bool,
    pub write: bool,
}

impl HandlerSpec {
    pub const fn read(name: &'static str) -> Self {
        Self {
            name,
            read: true,
            write: false,
        }
    }

    pub const fn write(name: &'static str) -> Self {
        Self {
            name,
            read: false,
            write: true,
        }
    }

    pub const fn read_write(name: &'static str) -> Self {
        Self {
            name,
            read: true,
            write: true,
        }
    }
}

/// Downcasting support so callers can reach a concrete element type.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A packet-processing node.
///
/// Only `class_name` is required. An element that overrides nothing else is
/// a 1-in/1-out agnostic pass-through.
pub trait Element: AsAny + Send + 'static {
    /// Class name, as used in router descriptions.
    fn class_name(&self) -> &'static str;

    fn port_count(&self) -> PortCount {
        PORTS_1_1
    }

    fn processing(&self) -> ProcessingSpec {
        ProcessingSpec::AGNOSTIC
    }

    /// Parse and store configuration. Must not touch anything outside the
    /// element; the router applies no element's configuration unless every
    /// element configures successfully.
    fn configure(&mut self, args: &Args) -> Result<(), ConfigError> {
        args.expect_at_most(0)
    }

    /// Acquire resources and register timers and tasks.
    fn initialize(&mut self, _ctx: &mut ElementContext<'_>) -> Result<(), InitError> {
        Ok(())
    }

    /// Release resources. Timers and tasks created through the context are
    /// destroyed by the router afterwards.
    fn uninitialize(&mut self, _ctx: &mut ElementContext<'_>) {}

    /// Accept a packet pushed into input `port`.
    fn push(&mut self, ctx: &mut ElementContext<'_>, _port: usize, packet: Packet) {
        if let Some(packet) = self.simple_action(ctx, packet) {
            ctx.push_output(0, packet);
        }
    }

    /// Produce a packet for output `port`, if one is available.
    fn pull(&mut self, ctx: &mut ElementContext<'_>, _port: usize) -> Option<Packet> {
        let packet = ctx.pull_input(0)?;
        self.simple_action(ctx, packet)
    }

    /// Transform one packet. Returning `None` drops it.
    fn simple_action(&mut self, _ctx: &mut ElementContext<'_>, packet: Packet) -> Option<Packet> {
        Some(packet)
    }

    /// Called when one of this element's timers fires.
    fn run_timer(&mut self, _ctx: &mut ElementContext<'_>, _timer: TimerId) {}

    /// Called when one of this element's tasks is picked. Returns whether
    /// any work was done.
    fn run_task(&mut self, _ctx: &mut ElementContext<'_>, _task: TaskId) -> bool {
        false
    }

    fn handlers(&self) -> &'static [HandlerSpec] {
        &[]
    }

    fn read_handler(&self, _name: &str) -> Option<String> {
        None
    }

    fn write_handler(
        &mut self,
        _ctx: &mut ElementContext<'_>,
        name: &str,
        _value: &str,
    ) -> Result<(), HandlerError> {
        Err(HandlerError::BadValue(format!("{name} is not writable")))
    }
}

/// What an element sees of the router while one of its methods runs.
pub struct ElementContext<'a> {
    router: &'a mut Router,
    element: ElementId,
}

impl<'a> ElementContext<'a> {
    pub(crate) fn new(router: &'a mut Router, element: ElementId) -> Self {
        Self { router, element }
    }

    pub fn id(&self) -> ElementId {
        self.element
    }

    pub fn name(&self) -> &str {
        self.router.element_name(self.element).unwrap_or("")
    }

    pub fn now(&self) -> Instant {
        self.router.now()
    }

    /// Time since the router was initialized.
    pub fn elapsed(&self) -> Duration {
        self.router.elapsed()
    }

    // ── Packet flow ──

    /// Push `packet` out of output `port`.
    pub fn push_output(&mut self, port: usize, packet: Packet) {
        self.router.push_from(self.element, port, packet);
    }

    /// Pull a packet from upstream of input `port`.
    pub fn pull_input(&mut self, port: usize) -> Option<Packet> {
        self.router.pull_into(self.element, port)
    }

    pub fn ninputs(&self) -> usize {
        self.router.port_total(self.element, PortDirection::Input)
    }

    pub fn noutputs(&self) -> usize {
        self.router.port_total(self.element, PortDirection::Output)
    }

    pub fn input_mode(&self, port: usize) -> Option<Mode> {
        self.router
            .port_mode(self.element, PortDirection::Input, port)
    }

    pub fn output_mode(&self, port: usize) -> Option<Mode> {
        self.router
            .port_mode(self.element, PortDirection::Output, port)
    }

    pub fn input_is_pull(&self, port: usize) -> bool {
        self.input_mode(port) == Some(Mode::Pull)
    }

    pub fn output_is_push(&self, port: usize) -> bool {
        self.output_mode(port) == Some(Mode::Push)
    }

    // ── Timers ──

    /// Create a timer that calls this element's `run_timer` when it fires.
    pub fn create_timer(&mut self) -> TimerId {
        self.router
            .create_owned_timer(self.element, TimerAction::RunElement(self.element))
    }

    /// Create a timer that puts `task` on the run list when it fires.
    pub fn create_task_timer(&mut self, task: TaskId) -> TimerId {
        self.router
            .create_owned_timer(self.element, TimerAction::ScheduleTask(task))
    }

    pub fn schedule_timer_after(&mut self, timer: TimerId, delay: Duration) -> Result<(), TimerError> {
        let now = self.router.now();
        self.router.timers_mut().schedule_after(timer, now, delay)
    }

    pub fn schedule_timer_at(&mut self, timer: TimerId, when: Instant) -> Result<(), TimerError> {
        self.router.timers_mut().schedule_at(timer, when)
    }

    pub fn unschedule_timer(&mut self, timer: TimerId) -> Result<bool, TimerError> {
        self.router.timers_mut().unschedule(timer)
    }

    pub fn timer_scheduled(&self, timer: TimerId) -> bool {
        self.router.timers().is_scheduled(timer)
    }

    pub fn timer_expiry(&self, timer: TimerId) -> Option<Instant> {
        self.router.timers().expiry(timer)
    }

    // ── Tasks ──

    /// Register a task that calls this element's `run_task`. Uses the
    /// router's default tickets when `tickets` is `None`.
    pub fn register_task(&mut self, tickets: Option<u32>) -> Result<TaskId, TaskError> {
        self.router
            .register_owned_task(self.element, TaskAction::RunElement(self.element), tickets)
    }

    pub fn schedule_task(&mut self, task: TaskId) -> Result<bool, TaskError> {
        self.router.tasks_mut().schedule(task)
    }

    pub fn unschedule_task(&mut self, task: TaskId) -> Result<bool, TaskError> {
        self.router.tasks_mut().unschedule(task)
    }

    pub fn task_scheduled(&self, task: TaskId) -> bool {
        self.router.tasks().is_scheduled(task)
    }

    pub fn set_task_tickets(&mut self, task: TaskId, tickets: u32) -> Result<(), TaskError> {
        self.router.tasks_mut().set_tickets(task, tickets)
    }

    /// Ask the router's run loop to stop after the current iteration.
    pub fn request_stop(&mut self) {
        self.router.request_stop();
    }
}
