//! Builders for routers under test

use pktgraph::router::{Args, ManualClock};
use pktgraph::{Element, ElementId, ElementRegistry, Router, RouterSettings};

/// Builds a router on a manual clock, adding elements by instance or class
pub struct RouterBuilder {
    router: Router,
    clock: ManualClock,
    registry: ElementRegistry,
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self::with_settings(RouterSettings::default())
    }

    pub fn with_settings(settings: RouterSettings) -> Self {
        let clock = ManualClock::new();
        Self {
            router: Router::new(settings).with_clock(clock.clone()),
            clock,
            registry: ElementRegistry::with_builtins(),
        }
    }

    /// Add an element instance
    pub fn element(mut self, name: &str, element: Box<dyn Element>) -> Self {
        self.router
            .add_element(name, element, Args::empty())
            .unwrap();
        self
    }

    /// Add a built-in element by class name
    pub fn class(mut self, name: &str, class: &str, args: Args) -> Self {
        let element = self
            .registry
            .create(class)
            .unwrap_or_else(|| panic!("unknown class {class}"));
        self.router.add_element(name, element, args).unwrap();
        self
    }

    /// Connect output 0 of `from` to input 0 of `to`
    pub fn connect(self, from: &str, to: &str) -> Self {
        self.connect_ports(from, 0, to, 0)
    }

    pub fn connect_ports(mut self, from: &str, from_port: usize, to: &str, to_port: usize) -> Self {
        self.router
            .connect_named(from, from_port, to, to_port)
            .unwrap();
        self
    }

    /// The router before configuration, and its clock
    pub fn build(self) -> (Router, ManualClock) {
        (self.router, self.clock)
    }

    /// The initialized router, and its clock
    pub fn start(self) -> (Router, ManualClock) {
        let (mut router, clock) = self.build();
        router.initialize().unwrap();
        (router, clock)
    }
}

/// Look up an element id that must exist
pub fn id(router: &Router, name: &str) -> ElementId {
    router
        .element_id(name)
        .unwrap_or_else(|| panic!("no element {name}"))
}

/// Read a handler that must succeed and parse it as an integer
pub fn read_u64(router: &Router, path: &str) -> u64 {
    router
        .read_handler(path)
        .unwrap()
        .parse()
        .unwrap_or_else(|e| panic!("{path} is not an integer: {e}"))
}
