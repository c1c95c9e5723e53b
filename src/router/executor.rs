//! Router executor: owns the graph and drives the run loop.
//!
//! A router goes through these states:
//! 1. `New`: elements and connections are added.
//! 2. `Configured`: every element accepted its arguments.
//! 3. `Resolved`: every connection has a push or pull mode.
//! 4. `Live`: every element initialized; timers and tasks run.
//! 5. `Dead`: elements were uninitialized in reverse order.
//!
//! Each loop iteration services control commands, fires expired timers, and
//! runs up to `tasks_per_iteration` tasks. With nothing runnable the loop
//! blocks on the command channel until the next timer is due.

use crate::config::{RouterConfig, RouterSettings};
use crate::router::args::Args;
use crate::router::bridge::{RouterCommand, RouterHandle};
use crate::router::clock::{Clock, SystemClock};
use crate::router::element::{Element, ElementContext};
use crate::router::error::{
    RouterError, RouterResult, ResolutionError, TaskError, TimerError,
};
use crate::router::id::{ConnectionId, ElementId, Endpoint, TaskId, TimerId};
use crate::router::packet::Packet;
use crate::router::plan::ResolvedPlan;
use crate::router::port::{Mode, PortDirection};
use crate::router::registry::ElementRegistry;
use crate::router::resolver::{ElementShape, ProcessingResolver};
use crate::router::task::Scheduler;
use crate::router::timer::TimerList;
use crossbeam_channel::{Receiver, Select, TryRecvError};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// A connection from an output port of one element to an input port of another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub id: ConnectionId,
    pub from: Endpoint,
    pub to: Endpoint,
}

/// What happens when a timer fires.
pub enum TimerAction {
    /// Call the element's `run_timer`.
    RunElement(ElementId),
    /// Put a task on the run list.
    ScheduleTask(TaskId),
    /// Call a closure with the router.
    Callback(Box<dyn FnMut(&mut Router, TimerId) + Send>),
}

impl fmt::Debug for TimerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerAction::RunElement(id) => write!(f, "RunElement({id})"),
            TimerAction::ScheduleTask(id) => write!(f, "ScheduleTask({id:?})"),
            TimerAction::Callback(_) => write!(f, "Callback"),
        }
    }
}

/// What happens when a task is picked.
pub enum TaskAction {
    /// Call the element's `run_task`.
    RunElement(ElementId),
    /// Call a closure with the router. Returns whether it did work.
    Callback(Box<dyn FnMut(&mut Router, TaskId) -> bool + Send>),
}

impl fmt::Debug for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskAction::RunElement(id) => write!(f, "RunElement({id})"),
            TaskAction::Callback(_) => write!(f, "Callback"),
        }
    }
}

/// Lifecycle state of a router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterState {
    New,
    Configured,
    Resolved,
    Live,
    Dead,
}

/// Counters kept by the run loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub packets_pushed: u64,
    pub packets_pulled: u64,
    /// Packets the router itself dropped: misrouted or re-entrant calls.
    pub packets_dropped: u64,
    pub timers_fired: u64,
    pub tasks_run: u64,
    pub iterations: u64,
}

/// A slot holding an element and what it owns.
struct ElementSlot {
    name: String,
    class: &'static str,
    /// `None` while one of the element's methods is running.
    element: Option<Box<dyn Element>>,
    args: Args,
    timers: Vec<TimerId>,
    tasks: Vec<TaskId>,
}

/// The element graph and its run loop.
pub struct Router {
    elements: Vec<ElementSlot>,
    names: HashMap<String, ElementId>,
    connections: Vec<Connection>,
    plan: Option<ResolvedPlan>,
    timers: TimerList<TimerAction>,
    tasks: Scheduler<TaskAction>,
    clock: Box<dyn Clock>,
    settings: RouterSettings,
    state: RouterState,
    start_time: Instant,
    /// Elements in the order they finished `initialize`.
    initialized: Vec<ElementId>,
    stop_requested: bool,
    /// One receiver per `handle()` call. The router never holds a sender.
    cmd_rx: Vec<Receiver<RouterCommand>>,
    stats: RouterStats,
}

impl Router {
    pub fn new(settings: RouterSettings) -> Self {
        let clock = SystemClock;
        Self {
            elements: Vec::new(),
            names: HashMap::new(),
            connections: Vec::new(),
            plan: None,
            timers: TimerList::with_max_wait(settings.max_timer_wait()),
            tasks: Scheduler::new(),
            start_time: clock.now(),
            clock: Box::new(clock),
            settings,
            state: RouterState::New,
            initialized: Vec::new(),
            stop_requested: false,
            cmd_rx: Vec::new(),
            stats: RouterStats::default(),
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.start_time = clock.now();
        self.clock = Box::new(clock);
        self
    }

    /// Build an unconfigured router from a description.
    pub fn from_config(config: &RouterConfig, registry: &ElementRegistry) -> RouterResult<Self> {
        config
            .settings
            .validate()
            .map_err(RouterError::InvalidSettings)?;

        let mut router = Router::new(config.settings.clone());
        for decl in &config.elements {
            let element = registry
                .create(&decl.class)
                .ok_or_else(|| RouterError::UnknownClass {
                    element: decl.name.clone(),
                    class: decl.class.clone(),
                })?;
            router.add_element(decl.name.clone(), element, decl.args())?;
        }
        for conn in &config.connections {
            router.connect_named(&conn.from, conn.from_port, &conn.to, conn.to_port)?;
        }

        tracing::debug!(
            "Router built from config: {} elements, {} connections",
            router.elements.len(),
            router.connections.len()
        );
        Ok(router)
    }

    // ── Graph building ──

    /// Add an element. It is configured with `args` when the router is.
    pub fn add_element(
        &mut self,
        name: impl Into<String>,
        element: Box<dyn Element>,
        args: Args,
    ) -> RouterResult<ElementId> {
        if self.state != RouterState::New {
            return Err(RouterError::GraphFrozen);
        }
        let name = name.into();
        if name.is_empty() || name.contains('.') {
            return Err(ResolutionError::InvalidName(name).into());
        }
        if self.names.contains_key(&name) {
            return Err(ResolutionError::DuplicateName(name).into());
        }

        let id = ElementId(self.elements.len() as u32);
        self.names.insert(name.clone(), id);
        self.elements.push(ElementSlot {
            name,
            class: element.class_name(),
            element: Some(element),
            args,
            timers: Vec::new(),
            tasks: Vec::new(),
        });
        Ok(id)
    }

    /// Connect output `from_port` of `from` to input `to_port` of `to`.
    pub fn connect(
        &mut self,
        from: ElementId,
        from_port: usize,
        to: ElementId,
        to_port: usize,
    ) -> RouterResult<ConnectionId> {
        if self.state != RouterState::New {
            return Err(RouterError::GraphFrozen);
        }
        for id in [from, to] {
            if id.index() >= self.elements.len() {
                return Err(ResolutionError::InvalidElement { id }.into());
            }
        }

        let id = ConnectionId(self.connections.len() as u32);
        self.connections.push(Connection {
            id,
            from: Endpoint::new(from, from_port),
            to: Endpoint::new(to, to_port),
        });
        Ok(id)
    }

    pub fn connect_named(
        &mut self,
        from: &str,
        from_port: usize,
        to: &str,
        to_port: usize,
    ) -> RouterResult<ConnectionId> {
        let from_id = self
            .element_id(from)
            .ok_or_else(|| ResolutionError::UnknownElement(from.to_string()))?;
        let to_id = self
            .element_id(to)
            .ok_or_else(|| ResolutionError::UnknownElement(to.to_string()))?;
        self.connect(from_id, from_port, to_id, to_port)
    }

    // ── Accessors ──

    pub fn settings(&self) -> &RouterSettings {
        &self.settings
    }

    pub fn state(&self) -> RouterState {
        self.state
    }

    pub fn stats(&self) -> &RouterStats {
        &self.stats
    }

    pub fn element_id(&self, name: &str) -> Option<ElementId> {
        self.names.get(name).copied()
    }

    pub fn element_name(&self, id: ElementId) -> Option<&str> {
        self.elements.get(id.index()).map(|s| s.name.as_str())
    }

    pub fn element_class(&self, id: ElementId) -> Option<&'static str> {
        self.elements.get(id.index()).map(|s| s.class)
    }

    pub fn element_args(&self, id: ElementId) -> Option<&Args> {
        self.elements.get(id.index()).map(|s| &s.args)
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    pub fn element_ids(&self) -> impl Iterator<Item = ElementId> {
        (0..self.elements.len() as u32).map(ElementId)
    }

    /// Borrow an element as its concrete type.
    ///
    /// `None` if the id is unknown, the type does not match, or the element
    /// is currently running.
    pub fn element<T: Element>(&self, id: ElementId) -> Option<&T> {
        let element: &dyn Element = self.elements.get(id.index())?.element.as_deref()?;
        element.as_any().downcast_ref::<T>()
    }

    pub fn element_mut<T: Element>(&mut self, id: ElementId) -> Option<&mut T> {
        let element: &mut dyn Element = self.elements.get_mut(id.index())?.element.as_deref_mut()?;
        element.as_any_mut().downcast_mut::<T>()
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Describe a connection as `from[port] -> [port]to`.
    pub fn describe_connection(&self, connection: &Connection) -> String {
        format!(
            "{}[{}] -> [{}]{}",
            self.element_name(connection.from.element).unwrap_or("?"),
            connection.from.port,
            connection.to.port,
            self.element_name(connection.to.element).unwrap_or("?"),
        )
    }

    pub fn plan(&self) -> Option<&ResolvedPlan> {
        self.plan.as_ref()
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Time since the router was initialized.
    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.start_time)
    }

    pub fn timers(&self) -> &TimerList<TimerAction> {
        &self.timers
    }

    pub(crate) fn timers_mut(&mut self) -> &mut TimerList<TimerAction> {
        &mut self.timers
    }

    pub fn tasks(&self) -> &Scheduler<TaskAction> {
        &self.tasks
    }

    pub(crate) fn tasks_mut(&mut self) -> &mut Scheduler<TaskAction> {
        &mut self.tasks
    }

    pub(crate) fn port_total(&self, element: ElementId, direction: PortDirection) -> usize {
        self.plan
            .as_ref()
            .map_or(0, |plan| plan.ports(element, direction).len())
    }

    pub(crate) fn port_mode(
        &self,
        element: ElementId,
        direction: PortDirection,
        port: usize,
    ) -> Option<Mode> {
        self.plan.as_ref()?.mode(element, direction, port)
    }

    // ── Lifecycle ──

    /// Configure every element with its arguments.
    ///
    /// Every element is tried; all failures are reported together.
    pub fn configure(&mut self) -> RouterResult<()> {
        match self.state {
            RouterState::New => {}
            RouterState::Configured | RouterState::Resolved => return Ok(()),
            RouterState::Live | RouterState::Dead => return Err(RouterError::AlreadyInitialized),
        }

        let mut errors = Vec::new();
        for slot in &mut self.elements {
            let Some(element) = slot.element.as_mut() else {
                continue;
            };
            if let Err(e) = element.configure(&slot.args) {
                errors.push(e.located(&slot.name, slot.class));
            }
        }

        if !errors.is_empty() {
            for e in &errors {
                tracing::warn!("{}", e);
            }
            return Err(RouterError::Configuration(errors));
        }

        self.state = RouterState::Configured;
        tracing::debug!("Configured {} elements", self.elements.len());
        Ok(())
    }

    /// Assign every connection a mode. Configures first if needed.
    pub fn resolve(&mut self) -> RouterResult<&ResolvedPlan> {
        if self.state == RouterState::New {
            self.configure()?;
        }
        if self.state == RouterState::Configured {
            let shapes: Vec<ElementShape<'_>> = self
                .elements
                .iter()
                .filter_map(|slot| {
                    let element = slot.element.as_ref()?;
                    Some(ElementShape {
                        name: &slot.name,
                        ports: element.port_count(),
                        processing: element.processing(),
                    })
                })
                .collect();
            let plan = ProcessingResolver::resolve(&shapes, &self.connections)?;

            tracing::info!(
                "Router resolved: {} elements, {} connections ({} push, {} pull, {} defaulted components)",
                plan.stats.elements,
                plan.stats.connections,
                plan.stats.push_connections,
                plan.stats.pull_connections,
                plan.stats.defaulted_components,
            );

            self.plan = Some(plan);
            self.state = RouterState::Resolved;
        }
        self.plan.as_ref().ok_or(RouterError::NotInitialized)
    }

    /// Initialize every element in order. On failure, elements that were
    /// already initialized are uninitialized in reverse order.
    pub fn initialize(&mut self) -> RouterResult<()> {
        if matches!(self.state, RouterState::Live | RouterState::Dead) {
            return Err(RouterError::AlreadyInitialized);
        }
        self.resolve()?;
        self.start_time = self.clock.now();

        for index in 0..self.elements.len() {
            let id = ElementId(index as u32);
            let result = self.with_element(id, |element, ctx| element.initialize(ctx));
            match result {
                Some(Ok(())) => self.initialized.push(id),
                Some(Err(e)) => {
                    let slot = &self.elements[index];
                    let err = e.located(&slot.name, slot.class);
                    tracing::warn!(
                        "{}; uninitializing {} elements",
                        err,
                        self.initialized.len()
                    );
                    self.release_resources(id);
                    self.teardown();
                    return Err(err.into());
                }
                None => {}
            }
        }

        self.state = RouterState::Live;
        tracing::info!("Router initialized: {} elements", self.elements.len());
        Ok(())
    }

    /// Uninitialize every element in reverse initialization order.
    pub fn uninitialize(&mut self) {
        if self.state != RouterState::Live {
            return;
        }
        self.teardown();
        tracing::info!("Router uninitialized");
    }

    fn teardown(&mut self) {
        while let Some(id) = self.initialized.pop() {
            tracing::debug!(
                "Uninitializing {}",
                self.element_name(id).unwrap_or("?")
            );
            self.with_element(id, |element, ctx| element.uninitialize(ctx));
            self.release_resources(id);
        }
        self.state = RouterState::Dead;
    }

    /// Destroy the timers and tasks an element created.
    fn release_resources(&mut self, id: ElementId) {
        let slot = &mut self.elements[id.index()];
        let timers = std::mem::take(&mut slot.timers);
        let tasks = std::mem::take(&mut slot.tasks);
        for timer in timers {
            let _ = self.timers.destroy(timer);
        }
        for task in tasks {
            let _ = self.tasks.unregister(task);
        }
    }

    /// Run `f` on an element with a context borrowing the router.
    ///
    /// Returns `None` without calling `f` if the element is already running
    /// further up the call stack.
    fn with_element<R>(
        &mut self,
        id: ElementId,
        f: impl FnOnce(&mut dyn Element, &mut ElementContext<'_>) -> R,
    ) -> Option<R> {
        let slot = self.elements.get_mut(id.index())?;
        let Some(mut element) = slot.element.take() else {
            tracing::warn!("Element '{}' re-entered while running", slot.name);
            return None;
        };

        let result = {
            let mut ctx = ElementContext::new(self, id);
            f(element.as_mut(), &mut ctx)
        };

        self.elements[id.index()].element = Some(element);
        Some(result)
    }

    // ── Packet flow ──

    /// Deliver a packet pushed out of `from`'s output `port`.
    pub(crate) fn push_from(&mut self, from: ElementId, port: usize, packet: Packet) {
        let target = self.plan.as_ref().and_then(|plan| plan.push_target(from, port));
        let Some(target) = target else {
            self.drop_packet(from, port, "not a push output");
            return;
        };

        tracing::trace!(
            "push {}[{}] -> [{}]{} ({} bytes)",
            self.element_name(from).unwrap_or("?"),
            port,
            target.port,
            self.element_name(target.element).unwrap_or("?"),
            packet.len()
        );
        self.stats.packets_pushed += 1;
        if self
            .with_element(target.element, |element, ctx| {
                element.push(ctx, target.port, packet)
            })
            .is_none()
        {
            self.stats.packets_dropped += 1;
        }
    }

    /// Pull a packet for `into`'s input `port` from upstream.
    pub(crate) fn pull_into(&mut self, into: ElementId, port: usize) -> Option<Packet> {
        let source = self.plan.as_ref().and_then(|plan| plan.pull_source(into, port));
        let Some(source) = source else {
            tracing::warn!(
                "{}: input {} is not a pull input",
                self.element_name(into).unwrap_or("?"),
                port
            );
            return None;
        };

        let packet = self
            .with_element(source.element, |element, ctx| element.pull(ctx, source.port))
            .flatten();
        if let Some(packet) = &packet {
            tracing::trace!(
                "pull {}[{}] -> [{}]{} ({} bytes)",
                self.element_name(source.element).unwrap_or("?"),
                source.port,
                port,
                self.element_name(into).unwrap_or("?"),
                packet.len()
            );
            self.stats.packets_pulled += 1;
        }
        packet
    }

    fn drop_packet(&mut self, element: ElementId, port: usize, reason: &str) {
        tracing::warn!(
            "{}: dropping packet on output {}: {}",
            self.element_name(element).unwrap_or("?"),
            port,
            reason
        );
        self.stats.packets_dropped += 1;
    }

    /// Push a packet into `element`'s push input `port` from outside the graph.
    pub fn inject(&mut self, element: ElementId, port: usize, packet: Packet) -> RouterResult<()> {
        self.check_external_port(element, PortDirection::Input, port, Mode::Push)?;
        tracing::trace!(
            "inject -> [{}]{} ({} bytes)",
            port,
            self.element_name(element).unwrap_or("?"),
            packet.len()
        );
        self.stats.packets_pushed += 1;
        if self
            .with_element(element, |e, ctx| e.push(ctx, port, packet))
            .is_none()
        {
            self.stats.packets_dropped += 1;
        }
        Ok(())
    }

    /// Pull a packet from `element`'s pull output `port` from outside the graph.
    pub fn pull_from(&mut self, element: ElementId, port: usize) -> RouterResult<Option<Packet>> {
        self.check_external_port(element, PortDirection::Output, port, Mode::Pull)?;
        let packet = self
            .with_element(element, |e, ctx| e.pull(ctx, port))
            .flatten();
        if packet.is_some() {
            self.stats.packets_pulled += 1;
        }
        Ok(packet)
    }

    fn check_external_port(
        &self,
        element: ElementId,
        direction: PortDirection,
        port: usize,
        expected: Mode,
    ) -> RouterResult<()> {
        if self.state != RouterState::Live {
            return Err(RouterError::NotInitialized);
        }
        let Some(name) = self.element_name(element) else {
            return Err(ResolutionError::InvalidElement { id: element }.into());
        };
        let mode = self
            .plan
            .as_ref()
            .and_then(|plan| plan.mode(element, direction, port));
        if mode != Some(expected) {
            return Err(RouterError::PortMode {
                element: name.to_string(),
                direction,
                port,
                expected,
            });
        }
        Ok(())
    }

    // ── Timers and tasks ──

    pub(crate) fn create_owned_timer(&mut self, owner: ElementId, action: TimerAction) -> TimerId {
        let id = self.timers.create(action);
        if let Some(slot) = self.elements.get_mut(owner.index()) {
            slot.timers.push(id);
        }
        id
    }

    pub(crate) fn register_owned_task(
        &mut self,
        owner: ElementId,
        action: TaskAction,
        tickets: Option<u32>,
    ) -> Result<TaskId, TaskError> {
        let id = self
            .tasks
            .register(action, tickets.unwrap_or(self.settings.default_tickets))?;
        if let Some(slot) = self.elements.get_mut(owner.index()) {
            slot.tasks.push(id);
        }
        Ok(id)
    }

    /// Create a timer not owned by any element.
    pub fn create_timer(&mut self, action: TimerAction) -> TimerId {
        self.timers.create(action)
    }

    pub fn schedule_timer_after(&mut self, timer: TimerId, delay: Duration) -> Result<(), TimerError> {
        let now = self.clock.now();
        self.timers.schedule_after(timer, now, delay)
    }

    pub fn schedule_timer_at(&mut self, timer: TimerId, when: Instant) -> Result<(), TimerError> {
        self.timers.schedule_at(timer, when)
    }

    pub fn unschedule_timer(&mut self, timer: TimerId) -> Result<bool, TimerError> {
        self.timers.unschedule(timer)
    }

    pub fn destroy_timer(&mut self, timer: TimerId) -> Result<(), TimerError> {
        self.timers.destroy(timer).map(|_| ())
    }

    /// Register a task not owned by any element.
    pub fn register_task(&mut self, action: TaskAction, tickets: Option<u32>) -> Result<TaskId, TaskError> {
        self.tasks
            .register(action, tickets.unwrap_or(self.settings.default_tickets))
    }

    pub fn schedule_task(&mut self, task: TaskId) -> Result<bool, TaskError> {
        self.tasks.schedule(task)
    }

    pub fn unschedule_task(&mut self, task: TaskId) -> Result<bool, TaskError> {
        self.tasks.unschedule(task)
    }

    pub fn unregister_task(&mut self, task: TaskId) -> Result<(), TaskError> {
        self.tasks.unregister(task).map(|_| ())
    }

    /// Fire expired timers, earliest first. Returns how many fired.
    ///
    /// At most as many timers fire as were scheduled when the pass began,
    /// so a timer that keeps rescheduling itself into the past cannot stall
    /// the loop.
    pub fn run_timers(&mut self) -> usize {
        let now = self.clock.now();
        let limit = self.timers.len();
        let mut fired = 0;

        while fired < limit {
            let Some(id) = self.timers.pop_expired(now) else {
                break;
            };
            fired += 1;
            let Some(mut action) = self.timers.take_payload(id) else {
                continue;
            };
            match &mut action {
                TimerAction::RunElement(element) => {
                    let element = *element;
                    self.with_element(element, |e, ctx| e.run_timer(ctx, id));
                }
                TimerAction::ScheduleTask(task) => {
                    if let Err(e) = self.tasks.schedule(*task) {
                        tracing::warn!("Timer {:?} could not schedule task: {}", id, e);
                    }
                }
                TimerAction::Callback(callback) => callback(self, id),
            }
            self.timers.restore_payload(id, action);
        }

        self.stats.timers_fired += fired as u64;
        fired
    }

    /// Run up to `max` tasks in stride order. Returns how many ran.
    pub fn run_tasks(&mut self, max: usize) -> usize {
        let mut ran = 0;
        while ran < max {
            let Some(id) = self.tasks.pop_next() else {
                break;
            };
            ran += 1;
            let Some(mut action) = self.tasks.take_payload(id) else {
                continue;
            };
            match &mut action {
                TaskAction::RunElement(element) => {
                    let element = *element;
                    self.with_element(element, |e, ctx| e.run_task(ctx, id));
                }
                TaskAction::Callback(callback) => {
                    callback(self, id);
                }
            }
            self.tasks.restore_payload(id, action);
        }

        self.stats.tasks_run += ran as u64;
        ran
    }

    // ── Run loop ──

    /// Get a control handle. The router listens on it while running and
    /// stops listening once it and all its clones are dropped.
    pub fn handle(&mut self) -> RouterHandle {
        let (handle, cmd_rx) = RouterHandle::new(self.settings.command_queue_depth);
        self.cmd_rx.push(cmd_rx);
        handle
    }

    /// Make the run loop return after the current iteration.
    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    /// One loop iteration without blocking. Returns whether any timer or
    /// task ran.
    pub fn run_once(&mut self) -> bool {
        self.process_commands();
        let fired = self.run_timers();
        let ran = self.run_tasks(self.settings.tasks_per_iteration);
        self.stats.iterations += 1;
        fired > 0 || ran > 0
    }

    /// Iterate until an iteration does no work, a stop is requested, or
    /// `max_iterations` pass. Does not block. Returns iterations run.
    pub fn run_until_idle(&mut self, max_iterations: usize) -> usize {
        let mut iterations = 0;
        while iterations < max_iterations && !self.stop_requested {
            iterations += 1;
            if !self.run_once() {
                break;
            }
        }
        iterations
    }

    /// Run until stopped, or until nothing could ever happen again.
    pub fn run(&mut self) -> RouterResult<()> {
        self.run_loop(None)
    }

    /// Run for `duration` of router time, or until stopped.
    pub fn run_for(&mut self, duration: Duration) -> RouterResult<()> {
        let deadline = self.clock.now() + duration;
        self.run_loop(Some(deadline))
    }

    fn run_loop(&mut self, deadline: Option<Instant>) -> RouterResult<()> {
        if self.state != RouterState::Live {
            return Err(RouterError::NotInitialized);
        }
        tracing::info!("Router running");
        self.stop_requested = false;

        loop {
            let busy = self.run_once();
            if self.stop_requested {
                break;
            }
            if let Some(deadline) = deadline {
                if self.clock.now() >= deadline {
                    break;
                }
            }
            if !busy && self.tasks.runnable() == 0 && !self.wait_idle(deadline) {
                tracing::info!("Router is idle with nothing scheduled");
                break;
            }
        }

        tracing::info!(
            "Router stopped after {} iterations ({} pushed, {} pulled, {} dropped)",
            self.stats.iterations,
            self.stats.packets_pushed,
            self.stats.packets_pulled,
            self.stats.packets_dropped
        );
        Ok(())
    }

    /// Block until the next timer is due, a command arrives, or the
    /// deadline passes. Returns `false` if nothing can ever wake the router.
    fn wait_idle(&mut self, deadline: Option<Instant>) -> bool {
        if self.timers.is_empty() && self.cmd_rx.is_empty() && deadline.is_none() {
            return false;
        }

        let now = self.clock.now();
        let mut wait = self.timers.next_delay(now).min(self.settings.max_timer_wait());
        if let Some(deadline) = deadline {
            wait = wait.min(deadline.saturating_duration_since(now));
        }

        if self.cmd_rx.is_empty() {
            std::thread::sleep(wait);
            return true;
        }

        let received = {
            let mut select = Select::new();
            for rx in &self.cmd_rx {
                select.recv(rx);
            }
            match select.select_timeout(wait) {
                Ok(op) => {
                    let index = op.index();
                    Some((index, op.recv(&self.cmd_rx[index])))
                }
                Err(_) => None,
            }
        };
        match received {
            Some((_, Ok(cmd))) => self.handle_command(cmd),
            Some((index, Err(_))) => {
                tracing::debug!("Control handle dropped");
                self.cmd_rx.remove(index);
            }
            None => {}
        }
        true
    }

    /// Service queued commands and forget handles whose senders are gone.
    fn process_commands(&mut self) {
        let mut pending = Vec::new();
        self.cmd_rx.retain(|rx| loop {
            match rx.try_recv() {
                Ok(cmd) => pending.push(cmd),
                Err(TryRecvError::Empty) => break true,
                Err(TryRecvError::Disconnected) => break false,
            }
        });
        for cmd in pending {
            self.handle_command(cmd);
        }
    }

    fn handle_command(&mut self, cmd: RouterCommand) {
        match cmd {
            RouterCommand::ReadHandler { path, reply } => {
                let _ = reply.send(self.read_handler(&path));
            }
            RouterCommand::WriteHandler { path, value, reply } => {
                let _ = reply.send(self.write_handler(&path, &value));
            }
            RouterCommand::Stop => {
                tracing::debug!("Stop requested over control handle");
                self.stop_requested = true;
            }
        }
    }

    // ── Handler plumbing used by `handler.rs` ──

    pub(crate) fn element_dyn(&self, id: ElementId) -> Option<&dyn Element> {
        self.elements.get(id.index())?.element.as_deref()
    }

    pub(crate) fn is_running(&self, id: ElementId) -> bool {
        self.elements
            .get(id.index())
            .is_some_and(|slot| slot.element.is_none())
    }

    pub(crate) fn call_element<R>(
        &mut self,
        id: ElementId,
        f: impl FnOnce(&mut dyn Element, &mut ElementContext<'_>) -> R,
    ) -> Option<R> {
        self.with_element(id, f)
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new(RouterSettings::default())
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        self.uninitialize();
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("state", &self.state)
            .field("elements", &self.elements.len())
            .field("connections", &self.connections.len())
            .field("timers", &self.timers.len())
            .field("runnable_tasks", &self.tasks.runnable())
            .finish()
    }
}
