//! # pktgraph: modular packet-processing graphs
//!
//! A router is a graph of elements connected output-to-input. Each
//! connection either pushes packets downstream or has them pulled from
//! upstream; the router works out which from the elements' declared port
//! capabilities before anything runs. Work happens in a single-threaded
//! loop that fires timers and runs tasks under a stride scheduler.
//!
//! ## Architecture
//!
//! - **Router**: owns elements, resolves processing modes, drives timers and tasks
//! - **Elements**: `Box<dyn Element>` nodes reached through an `ElementContext`
//! - **Config**: TOML/JSON router descriptions loaded with serde
//! - **Communication**: crossbeam channels between a running router and other threads
//!
//! ## Example
//!
//! ```no_run
//! use pktgraph::{config::RouterConfig, ElementRegistry, Router};
//!
//! fn main() -> pktgraph::Result<()> {
//!     let config = RouterConfig::load("router.toml")?;
//!     let registry = ElementRegistry::with_builtins();
//!
//!     let mut router = Router::from_config(&config, &registry)?;
//!     router.initialize()?;
//!     router.run_for(std::time::Duration::from_secs(1))?;
//!
//!     println!("{}", router.read_handler("counter.count")?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod router;

// Re-export commonly used types
pub use config::{ConnectionDecl, ElementDecl, RouterConfig, RouterSettings};
pub use error::{PktGraphError, Result, ResultExt};
pub use router::{
    Element, ElementContext, ElementId, ElementRegistry, Mode, Packet, Router, RouterError,
    RouterHandle,
};
