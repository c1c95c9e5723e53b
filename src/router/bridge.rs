//! Thread boundary between a running router and the rest of the program.
//!
//! A router runs on one thread. Other threads hold a [`RouterHandle`] and
//! send it [`RouterCommand`]s; the router services them between loop
//! iterations and answers handler calls over a one-shot reply channel.

use crate::router::error::HandlerError;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Commands sent to a router's run loop.
#[derive(Debug)]
pub enum RouterCommand {
    /// Call a read handler, addressed as `element.handler`.
    ReadHandler {
        path: String,
        reply: Sender<Result<String, HandlerError>>,
    },
    /// Call a write handler with `value`.
    WriteHandler {
        path: String,
        value: String,
        reply: Sender<Result<(), HandlerError>>,
    },
    /// Leave the run loop after the current iteration.
    Stop,
}

/// Cloneable, `Send` handle for talking to a router on another thread.
#[derive(Debug, Clone)]
pub struct RouterHandle {
    cmd_tx: Sender<RouterCommand>,
}

impl RouterHandle {
    /// Create a handle and the receiving end the router owns.
    pub(crate) fn new(depth: usize) -> (Self, Receiver<RouterCommand>) {
        let (cmd_tx, cmd_rx) = bounded(depth.max(1));
        (Self { cmd_tx }, cmd_rx)
    }

    /// Call a read handler and wait for the answer.
    pub fn read(&self, path: &str) -> Result<String, HandlerError> {
        let (reply, rx) = bounded(1);
        self.send(RouterCommand::ReadHandler {
            path: path.to_string(),
            reply,
        })?;
        rx.recv().map_err(|_| HandlerError::Disconnected)?
    }

    /// Call a read handler, giving up after `timeout`.
    pub fn read_timeout(&self, path: &str, timeout: Duration) -> Result<String, HandlerError> {
        let (reply, rx) = bounded(1);
        self.send(RouterCommand::ReadHandler {
            path: path.to_string(),
            reply,
        })?;
        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(HandlerError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(HandlerError::Disconnected),
        }
    }

    /// Call a write handler and wait for it to complete.
    pub fn write(&self, path: &str, value: &str) -> Result<(), HandlerError> {
        let (reply, rx) = bounded(1);
        self.send(RouterCommand::WriteHandler {
            path: path.to_string(),
            value: value.to_string(),
            reply,
        })?;
        rx.recv().map_err(|_| HandlerError::Disconnected)?
    }

    /// Ask the router to stop. Returns `false` if it is already gone.
    pub fn stop(&self) -> bool {
        self.cmd_tx.send(RouterCommand::Stop).is_ok()
    }

    fn send(&self, cmd: RouterCommand) -> Result<(), HandlerError> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| HandlerError::Disconnected)
    }
}
