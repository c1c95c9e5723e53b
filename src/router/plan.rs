use crate::router::id::{ConnectionId, ElementId, Endpoint};
use crate::router::port::{Mode, PortDirection};

/// Resolved state of one port: its mode and what it is connected to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    pub mode: Mode,
    /// Endpoints on the far side, in connection order.
    pub peers: Vec<Endpoint>,
}

/// Statistics about a resolution pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanStats {
    pub elements: usize,
    pub connections: usize,
    pub push_connections: usize,
    pub pull_connections: usize,
    /// Connected components with no fixed endpoint, resolved to push.
    pub defaulted_components: usize,
    pub resolve_time_us: u64,
}

/// Result of processing-mode resolution.
///
/// Every connection has exactly one mode, and every port of every element
/// knows its mode and peers.
#[derive(Debug, Clone, Default)]
pub struct ResolvedPlan {
    pub(crate) inputs: Vec<Vec<PortBinding>>,
    pub(crate) outputs: Vec<Vec<PortBinding>>,
    pub(crate) connection_modes: Vec<Mode>,
    pub stats: PlanStats,
}

impl ResolvedPlan {
    pub fn ports(&self, element: ElementId, direction: PortDirection) -> &[PortBinding] {
        let side = match direction {
            PortDirection::Input => &self.inputs,
            PortDirection::Output => &self.outputs,
        };
        side.get(element.index()).map_or(&[], Vec::as_slice)
    }

    pub fn port(
        &self,
        element: ElementId,
        direction: PortDirection,
        port: usize,
    ) -> Option<&PortBinding> {
        self.ports(element, direction).get(port)
    }

    pub fn mode(&self, element: ElementId, direction: PortDirection, port: usize) -> Option<Mode> {
        self.port(element, direction, port).map(|b| b.mode)
    }

    pub fn connection_mode(&self, connection: ConnectionId) -> Option<Mode> {
        self.connection_modes.get(connection.index()).copied()
    }

    /// Where a push out of `element`'s output `port` goes.
    pub fn push_target(&self, element: ElementId, port: usize) -> Option<Endpoint> {
        match self.port(element, PortDirection::Output, port) {
            Some(binding) if binding.mode == Mode::Push => binding.peers.first().copied(),
            _ => None,
        }
    }

    /// Where a pull on `element`'s input `port` is answered.
    pub fn pull_source(&self, element: ElementId, port: usize) -> Option<Endpoint> {
        match self.port(element, PortDirection::Input, port) {
            Some(binding) if binding.mode == Mode::Pull => binding.peers.first().copied(),
            _ => None,
        }
    }

    /// Resolved modes of one side as letters, e.g. `"hl"`.
    pub fn port_codes(&self, element: ElementId, direction: PortDirection) -> String {
        self.ports(element, direction)
            .iter()
            .map(|b| match b.mode {
                Mode::Push => 'h',
                Mode::Pull => 'l',
            })
            .collect()
    }
}
