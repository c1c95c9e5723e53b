//! Router-specific error types.

use crate::router::id::{ConnectionId, ElementId};
use crate::router::port::{Mode, PortDirection};
use thiserror::Error;

/// Bad or missing configuration arguments for one element.
#[derive(Error, Debug, Clone, PartialEq)]
pub struct ConfigError {
    pub element: String,
    pub class: String,
    /// Index and name of the offending argument, when one is to blame.
    pub argument: Option<ArgumentRef>,
    pub message: String,
}

/// Locates an argument within an element's configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentRef {
    pub index: usize,
    pub name: String,
}

impl std::fmt::Display for ArgumentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.index, self.name)
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} :: {}: ", self.element, self.class)?;
        if let Some(arg) = &self.argument {
            write!(f, "argument {arg}: ")?;
        }
        write!(f, "{}", self.message)
    }
}

impl ConfigError {
    /// An error not tied to a specific argument. Element identity is filled
    /// in by the router.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            element: String::new(),
            class: String::new(),
            argument: None,
            message: message.into(),
        }
    }

    pub fn argument(index: usize, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            argument: Some(ArgumentRef {
                index,
                name: name.into(),
            }),
            ..Self::new(message)
        }
    }

    pub(crate) fn located(mut self, element: &str, class: &str) -> Self {
        self.element = element.to_string();
        self.class = class.to_string();
        self
    }
}

/// Resource acquisition failure while starting the router.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{element} :: {class}: initialization failed: {message}")]
pub struct InitError {
    pub element: String,
    pub class: String,
    pub message: String,
}

impl InitError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            element: String::new(),
            class: String::new(),
            message: message.into(),
        }
    }

    pub(crate) fn located(mut self, element: &str, class: &str) -> Self {
        self.element = element.to_string();
        self.class = class.to_string();
        self
    }
}

/// Static graph errors found before the router starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolutionError {
    #[error("connection {connection} ({description}) has conflicting processing: {first} is forced by one side, {second} by another")]
    Conflict {
        connection: ConnectionId,
        description: String,
        first: Mode,
        second: Mode,
    },

    #[error("{element}: {direction} {port} is not connected")]
    Unconnected {
        element: String,
        direction: PortDirection,
        port: usize,
    },

    #[error("{element}: has {count} {direction}s, but its class allows {allowed}")]
    PortCount {
        element: String,
        direction: PortDirection,
        count: usize,
        allowed: String,
    },

    #[error("{element}: push output {port} is connected more than once")]
    PushFanOut { element: String, port: usize },

    #[error("{element}: pull input {port} is connected more than once")]
    PullFanIn { element: String, port: usize },

    #[error("unknown element {0:?}")]
    UnknownElement(String),

    #[error("element {id:?} does not exist")]
    InvalidElement { id: ElementId },

    #[error("duplicate element name {0:?}")]
    DuplicateName(String),

    #[error("invalid element name {0:?}")]
    InvalidName(String),
}

/// A malformed packet or an out-of-bounds buffer operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PacketError {
    #[error("packet too short: needed {needed} bytes, have {len}")]
    TooShort { needed: usize, len: usize },

    #[error("malformed header: {0}")]
    Malformed(String),

    #[error("annotation access out of range: offset {offset}, width {width}")]
    AnnotationOutOfRange { offset: usize, width: usize },
}

/// Misuse of a timer handle.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimerError {
    #[error("timer {0:?} has been destroyed")]
    Stale(crate::router::id::TimerId),
}

/// Misuse of a task handle.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    #[error("task {0:?} has been unregistered")]
    Stale(crate::router::id::TaskId),

    #[error("tickets must be between 1 and {max}, got {got}")]
    InvalidTickets { got: u32, max: u32 },
}

/// Failure to route or execute a handler call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HandlerError {
    #[error("no element named {0:?}")]
    NoSuchElement(String),

    #[error("{element}: no {kind} handler named {handler:?}")]
    NoSuchHandler {
        element: String,
        handler: String,
        kind: HandlerKind,
    },

    #[error("handler path {0:?} is not of the form ELEMENT.HANDLER")]
    BadPath(String),

    #[error("{0}")]
    BadValue(String),

    #[error("element {0:?} is busy")]
    Busy(String),

    #[error("router is not running")]
    Disconnected,

    #[error("no reply within {0:?}")]
    Timeout(std::time::Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Read,
    Write,
}

impl std::fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerKind::Read => write!(f, "read"),
            HandlerKind::Write => write!(f, "write"),
        }
    }
}

/// Errors that abort building or starting a router.
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("configuration failed:\n{}", format_all(.0))]
    Configuration(Vec<ConfigError>),

    #[error(transparent)]
    Init(#[from] InitError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error(transparent)]
    Timer(#[from] TimerError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error("unknown element class {class:?} for element {element:?}")]
    UnknownClass { element: String, class: String },

    #[error("router is not initialized")]
    NotInitialized,

    #[error("{element}: {direction} {port} is not a {expected} port")]
    PortMode {
        element: String,
        direction: PortDirection,
        port: usize,
        expected: Mode,
    },

    #[error("router is already initialized")]
    AlreadyInitialized,

    #[error("the graph cannot change after configuration")]
    GraphFrozen,

    #[error("invalid router settings: {0}")]
    InvalidSettings(String),
}

impl From<ConfigError> for RouterError {
    fn from(err: ConfigError) -> Self {
        RouterError::Configuration(vec![err])
    }
}

fn format_all(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(|e| format!("  {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub type RouterResult<T> = std::result::Result<T, RouterError>;
