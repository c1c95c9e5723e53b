//! Error handling for pktgraph
//!
//! This module defines the crate-level error type and a Result alias used by
//! everything outside the router core: configuration files, the registry,
//! and the command-line driver.

use crate::router::error::{HandlerError, RouterError};
use thiserror::Error;

/// Main error type for pktgraph operations
#[derive(Error, Debug)]
pub enum PktGraphError {
    /// Errors raised while building, resolving or running a router
    #[error("Router error: {0}")]
    Router(#[from] RouterError),

    /// Errors from handler calls made through a control handle
    #[error("Handler error: {0}")]
    Handler(#[from] HandlerError),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PktGraphError>,
    },
}

impl PktGraphError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PktGraphError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for pktgraph operations
pub type Result<T> = std::result::Result<T, PktGraphError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, RouterError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| PktGraphError::from(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| PktGraphError::from(e).with_context(f()))
    }
}
