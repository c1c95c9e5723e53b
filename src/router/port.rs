//! Port declarations for elements.
//!
//! Each element declares how many ports it has on each side (`PortCount`)
//! and what each port is capable of (`ProcessingSpec`). The resolver uses
//! these to assign every connection a concrete `Mode`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared capability of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Processing {
    /// The upstream side initiates delivery.
    Push,
    /// The downstream side requests packets.
    Pull,
    /// Resolved from the surrounding graph.
    Agnostic,
}

impl Processing {
    /// Single-letter code used in handler output: `h`, `l`, or `a`.
    pub fn code(self) -> char {
        match self {
            Processing::Push => 'h',
            Processing::Pull => 'l',
            Processing::Agnostic => 'a',
        }
    }

    /// The fixed mode, if this port is not agnostic.
    pub fn fixed(self) -> Option<Mode> {
        match self {
            Processing::Push => Some(Mode::Push),
            Processing::Pull => Some(Mode::Pull),
            Processing::Agnostic => None,
        }
    }
}

/// Resolved mode of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    Push,
    Pull,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Push => write!(f, "push"),
            Mode::Pull => write!(f, "pull"),
        }
    }
}

/// Whether a port is an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    Input,
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDirection::Input => write!(f, "input"),
            PortDirection::Output => write!(f, "output"),
        }
    }
}

/// Allowed number of ports on one side of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub min: usize,
    /// `None` means unbounded.
    pub max: Option<usize>,
}

impl PortRange {
    pub const fn fixed(n: usize) -> Self {
        Self {
            min: n,
            max: Some(n),
        }
    }

    pub const fn range(min: usize, max: usize) -> Self {
        Self {
            min,
            max: Some(max),
        }
    }

    pub const fn at_least(min: usize) -> Self {
        Self { min, max: None }
    }

    pub fn contains(&self, n: usize) -> bool {
        n >= self.min && self.max.map_or(true, |max| n <= max)
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) if max == self.min => write!(f, "{}", self.min),
            Some(max) => write!(f, "{}-{}", self.min, max),
            None => write!(f, "{}-", self.min),
        }
    }
}

/// Declared port counts for both sides of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortCount {
    pub inputs: PortRange,
    pub outputs: PortRange,
}

impl PortCount {
    pub const fn new(inputs: PortRange, outputs: PortRange) -> Self {
        Self { inputs, outputs }
    }

    pub fn range(&self, direction: PortDirection) -> PortRange {
        match direction {
            PortDirection::Input => self.inputs,
            PortDirection::Output => self.outputs,
        }
    }
}

impl fmt::Display for PortCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.inputs, self.outputs)
    }
}

pub const PORTS_0_1: PortCount = PortCount::new(PortRange::fixed(0), PortRange::fixed(1));
pub const PORTS_1_0: PortCount = PortCount::new(PortRange::fixed(1), PortRange::fixed(0));
pub const PORTS_1_1: PortCount = PortCount::new(PortRange::fixed(1), PortRange::fixed(1));
pub const PORTS_1_2: PortCount = PortCount::new(PortRange::fixed(1), PortRange::fixed(2));

/// Per-port capability declaration.
///
/// The last entry on each side repeats for any further ports, so `AGNOSTIC`
/// covers an element with any number of agnostic inputs and outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingSpec {
    pub inputs: &'static [Processing],
    pub outputs: &'static [Processing],
}

impl ProcessingSpec {
    pub const AGNOSTIC: ProcessingSpec = ProcessingSpec {
        inputs: &[Processing::Agnostic],
        outputs: &[Processing::Agnostic],
    };
    pub const PUSH: ProcessingSpec = ProcessingSpec {
        inputs: &[Processing::Push],
        outputs: &[Processing::Push],
    };
    pub const PULL: ProcessingSpec = ProcessingSpec {
        inputs: &[Processing::Pull],
        outputs: &[Processing::Pull],
    };
    /// Push input, pull output (a queue).
    pub const PUSH_TO_PULL: ProcessingSpec = ProcessingSpec {
        inputs: &[Processing::Push],
        outputs: &[Processing::Pull],
    };
    /// Pull input, push output (an unqueue).
    pub const PULL_TO_PUSH: ProcessingSpec = ProcessingSpec {
        inputs: &[Processing::Pull],
        outputs: &[Processing::Push],
    };

    pub fn port(&self, direction: PortDirection, port: usize) -> Processing {
        let side = match direction {
            PortDirection::Input => self.inputs,
            PortDirection::Output => self.outputs,
        };
        match side.get(port).or_else(|| side.last()) {
            Some(p) => *p,
            None => Processing::Agnostic,
        }
    }
}

impl fmt::Display for ProcessingSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for p in self.inputs {
            write!(f, "{}", p.code())?;
        }
        write!(f, "/")?;
        for p in self.outputs {
            write!(f, "{}", p.code())?;
        }
        Ok(())
    }
}
