//! Router core: elements, the packet graph, and the run loop.
//!
//! - [`element`]: the contract every packet-processing node implements.
//! - [`resolver`]: assigns push or pull to every connection.
//! - [`timer`] and [`task`]: the two kinds of scheduled work.
//! - [`executor`]: the [`Router`] that owns the graph and drives both.
//! - [`bridge`]: talking to a running router from another thread.

pub mod args;
pub mod bridge;
pub mod clock;
pub mod element;
pub mod elements;
pub mod error;
pub mod executor;
pub mod handler;
pub mod id;
pub mod packet;
pub mod plan;
pub mod port;
pub mod registry;
pub mod resolver;
pub mod task;
pub mod timer;

pub use args::{ArgValue, Args};
pub use bridge::{RouterCommand, RouterHandle};
pub use clock::{Clock, ManualClock, SystemClock};
pub use element::{Element, ElementContext, HandlerSpec};
pub use error::{
    ConfigError, HandlerError, HandlerKind, InitError, PacketError, ResolutionError, RouterError,
    RouterResult, TaskError, TimerError,
};
pub use executor::{Connection, Router, RouterState, RouterStats, TaskAction, TimerAction};
pub use id::{ConnectionId, ElementId, Endpoint, TaskId, TimerId};
pub use packet::{Annotations, Packet, PacketType};
pub use plan::{PlanStats, PortBinding, ResolvedPlan};
pub use port::{Mode, PortCount, PortDirection, PortRange, Processing, ProcessingSpec};
pub use registry::ElementRegistry;
pub use resolver::{ElementShape, ProcessingResolver};
pub use task::Scheduler;
pub use timer::TimerList;
