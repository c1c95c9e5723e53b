//! Processing-mode resolution.
//!
//! Decides, for every connection, whether packets are pushed by the
//! upstream element or pulled by the downstream element.
//!
//! Ports are grouped with a union-find: each connection ties its two
//! endpoints together, and all agnostic ports of one element are tied to
//! each other. Every group then takes the mode of any fixed port in it, or
//! push if it has none. A group holding both a push and a pull port is a
//! conflict. Because grouping does not depend on the order connections are
//! visited, a consistent graph always resolves the same way.

use super::executor::Connection;
use super::plan::{PlanStats, PortBinding, ResolvedPlan};
use crate::router::error::ResolutionError;
use crate::router::id::{ConnectionId, ElementId};
use crate::router::port::{Mode, PortCount, PortDirection, Processing, ProcessingSpec};

/// What the resolver needs to know about one element.
#[derive(Debug, Clone, Copy)]
pub struct ElementShape<'a> {
    pub name: &'a str,
    pub ports: PortCount,
    pub processing: ProcessingSpec,
}

/// Disjoint sets over port indices.
struct PortSets {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl PortSets {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (a, b) = (self.find(a), self.find(b));
        if a == b {
            return;
        }
        match self.rank[a].cmp(&self.rank[b]) {
            std::cmp::Ordering::Less => self.parent[a] = b,
            std::cmp::Ordering::Greater => self.parent[b] = a,
            std::cmp::Ordering::Equal => {
                self.parent[b] = a;
                self.rank[a] += 1;
            }
        }
    }
}

/// Flat numbering of every port in the graph.
struct PortLayout {
    input_base: Vec<usize>,
    output_base: Vec<usize>,
    ninputs: Vec<usize>,
    noutputs: Vec<usize>,
    total: usize,
}

impl PortLayout {
    fn input(&self, element: ElementId, port: usize) -> usize {
        self.input_base[element.index()] + port
    }

    fn output(&self, element: ElementId, port: usize) -> usize {
        self.output_base[element.index()] + port
    }
}

pub struct ProcessingResolver;

impl ProcessingResolver {
    /// Resolve every connection's mode and validate the graph's shape.
    ///
    /// Checks, in order: connection endpoints exist, port counts fit each
    /// element's declared ranges, no group mixes push and pull, push
    /// outputs and pull inputs have at most one connection, and every port
    /// is connected.
    pub fn resolve(
        elements: &[ElementShape<'_>],
        connections: &[Connection],
    ) -> Result<ResolvedPlan, ResolutionError> {
        let start_time = std::time::Instant::now();

        let layout = Self::layout(elements, connections)?;
        let mut sets = PortSets::new(layout.total);

        // Tie each element's agnostic ports together.
        for (index, shape) in elements.iter().enumerate() {
            let id = ElementId(index as u32);
            let agnostic: Vec<usize> = (0..layout.ninputs[index])
                .filter(|&p| shape.processing.port(PortDirection::Input, p) == Processing::Agnostic)
                .map(|p| layout.input(id, p))
                .chain(
                    (0..layout.noutputs[index])
                        .filter(|&p| {
                            shape.processing.port(PortDirection::Output, p) == Processing::Agnostic
                        })
                        .map(|p| layout.output(id, p)),
                )
                .collect();
            for pair in agnostic.windows(2) {
                sets.union(pair[0], pair[1]);
            }
        }

        for conn in connections {
            sets.union(
                layout.output(conn.from.element, conn.from.port),
                layout.input(conn.to.element, conn.to.port),
            );
        }

        let forced = Self::forced_modes(elements, connections, &layout, &mut sets)?;

        let mode_of = |sets: &mut PortSets, port: usize| -> Mode {
            forced[sets.find(port)].map_or(Mode::Push, |(mode, _)| mode)
        };

        let mut inputs: Vec<Vec<PortBinding>> = Vec::with_capacity(elements.len());
        let mut outputs: Vec<Vec<PortBinding>> = Vec::with_capacity(elements.len());
        for index in 0..elements.len() {
            let id = ElementId(index as u32);
            inputs.push(
                (0..layout.ninputs[index])
                    .map(|p| PortBinding {
                        mode: mode_of(&mut sets, layout.input(id, p)),
                        peers: Vec::new(),
                    })
                    .collect(),
            );
            outputs.push(
                (0..layout.noutputs[index])
                    .map(|p| PortBinding {
                        mode: mode_of(&mut sets, layout.output(id, p)),
                        peers: Vec::new(),
                    })
                    .collect(),
            );
        }

        let mut connection_modes = Vec::with_capacity(connections.len());
        for conn in connections {
            let mode = mode_of(&mut sets, layout.output(conn.from.element, conn.from.port));
            connection_modes.push(mode);
            outputs[conn.from.element.index()][conn.from.port]
                .peers
                .push(conn.to);
            inputs[conn.to.element.index()][conn.to.port]
                .peers
                .push(conn.from);
        }

        Self::check_fan(elements, &inputs, &outputs)?;
        Self::check_connected(elements, &inputs, &outputs)?;

        let mut defaulted = vec![false; layout.total];
        for conn in connections {
            let root = sets.find(layout.output(conn.from.element, conn.from.port));
            if forced[root].is_none() {
                defaulted[root] = true;
            }
        }

        let push_connections = connection_modes.iter().filter(|m| **m == Mode::Push).count();
        let stats = PlanStats {
            elements: elements.len(),
            connections: connections.len(),
            push_connections,
            pull_connections: connections.len() - push_connections,
            defaulted_components: defaulted.iter().filter(|d| **d).count(),
            resolve_time_us: start_time.elapsed().as_micros() as u64,
        };

        Ok(ResolvedPlan {
            inputs,
            outputs,
            connection_modes,
            stats,
        })
    }

    /// Count each element's ports and check them against its declared range.
    ///
    /// An element has as many ports as its highest connected index plus
    /// one, and never fewer than its declared minimum.
    fn layout(
        elements: &[ElementShape<'_>],
        connections: &[Connection],
    ) -> Result<PortLayout, ResolutionError> {
        let n = elements.len();
        let mut ninputs = vec![0usize; n];
        let mut noutputs = vec![0usize; n];

        for conn in connections {
            for endpoint in [conn.from, conn.to] {
                if endpoint.element.index() >= n {
                    return Err(ResolutionError::InvalidElement {
                        id: endpoint.element,
                    });
                }
            }
            let from = conn.from.element.index();
            let to = conn.to.element.index();
            noutputs[from] = noutputs[from].max(conn.from.port + 1);
            ninputs[to] = ninputs[to].max(conn.to.port + 1);
        }

        for (index, shape) in elements.iter().enumerate() {
            for (direction, count) in [
                (PortDirection::Input, &mut ninputs[index]),
                (PortDirection::Output, &mut noutputs[index]),
            ] {
                let range = shape.ports.range(direction);
                *count = (*count).max(range.min);
                if !range.contains(*count) {
                    return Err(ResolutionError::PortCount {
                        element: shape.name.to_string(),
                        direction,
                        count: *count,
                        allowed: range.to_string(),
                    });
                }
            }
        }

        let mut input_base = Vec::with_capacity(n);
        let mut output_base = Vec::with_capacity(n);
        let mut total = 0;
        for index in 0..n {
            input_base.push(total);
            total += ninputs[index];
            output_base.push(total);
            total += noutputs[index];
        }

        Ok(PortLayout {
            input_base,
            output_base,
            ninputs,
            noutputs,
            total,
        })
    }

    /// Find the fixed mode of each port group, keyed by group root.
    ///
    /// Connections are visited in id order, so a conflict always names the
    /// lowest-numbered connection that completes it.
    fn forced_modes(
        elements: &[ElementShape<'_>],
        connections: &[Connection],
        layout: &PortLayout,
        sets: &mut PortSets,
    ) -> Result<Vec<Option<(Mode, ConnectionId)>>, ResolutionError> {
        let mut forced: Vec<Option<(Mode, ConnectionId)>> = vec![None; layout.total];

        for conn in connections {
            let from_shape = &elements[conn.from.element.index()];
            let to_shape = &elements[conn.to.element.index()];
            let ends = [
                (
                    layout.output(conn.from.element, conn.from.port),
                    from_shape.processing.port(PortDirection::Output, conn.from.port),
                ),
                (
                    layout.input(conn.to.element, conn.to.port),
                    to_shape.processing.port(PortDirection::Input, conn.to.port),
                ),
            ];
            for (port, processing) in ends {
                let Some(mode) = processing.fixed() else {
                    continue;
                };
                let root = sets.find(port);
                match forced[root] {
                    None => forced[root] = Some((mode, conn.id)),
                    Some((existing, _)) if existing != mode => {
                        return Err(ResolutionError::Conflict {
                            connection: conn.id,
                            description: format!(
                                "{}[{}] -> [{}]{}",
                                from_shape.name, conn.from.port, conn.to.port, to_shape.name
                            ),
                            first: existing,
                            second: mode,
                        });
                    }
                    Some(_) => {}
                }
            }
        }

        Ok(forced)
    }

    fn check_fan(
        elements: &[ElementShape<'_>],
        inputs: &[Vec<PortBinding>],
        outputs: &[Vec<PortBinding>],
    ) -> Result<(), ResolutionError> {
        for (index, shape) in elements.iter().enumerate() {
            for (port, binding) in outputs[index].iter().enumerate() {
                if binding.mode == Mode::Push && binding.peers.len() > 1 {
                    return Err(ResolutionError::PushFanOut {
                        element: shape.name.to_string(),
                        port,
                    });
                }
            }
            for (port, binding) in inputs[index].iter().enumerate() {
                if binding.mode == Mode::Pull && binding.peers.len() > 1 {
                    return Err(ResolutionError::PullFanIn {
                        element: shape.name.to_string(),
                        port,
                    });
                }
            }
        }
        Ok(())
    }

    fn check_connected(
        elements: &[ElementShape<'_>],
        inputs: &[Vec<PortBinding>],
        outputs: &[Vec<PortBinding>],
    ) -> Result<(), ResolutionError> {
        for (index, shape) in elements.iter().enumerate() {
            for (direction, side) in [
                (PortDirection::Input, &inputs[index]),
                (PortDirection::Output, &outputs[index]),
            ] {
                if let Some(port) = side.iter().position(|b| b.peers.is_empty()) {
                    return Err(ResolutionError::Unconnected {
                        element: shape.name.to_string(),
                        direction,
                        port,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::id::Endpoint;
    use crate::router::port::{PortRange, PORTS_0_1, PORTS_1_0, PORTS_1_1};
    use proptest::prelude::*;
    use std::collections::HashMap;

    const SOURCE: (PortCount, ProcessingSpec) = (PORTS_0_1, ProcessingSpec::PUSH);
    const PULL_SINK: (PortCount, ProcessingSpec) = (PORTS_1_0, ProcessingSpec::PULL);
    const AGNOSTIC: (PortCount, ProcessingSpec) = (PORTS_1_1, ProcessingSpec::AGNOSTIC);
    const QUEUE: (PortCount, ProcessingSpec) = (PORTS_1_1, ProcessingSpec::PUSH_TO_PULL);
    const AGNOSTIC_SINK: (PortCount, ProcessingSpec) = (PORTS_1_0, ProcessingSpec::AGNOSTIC);
    const AGNOSTIC_SOURCE: (PortCount, ProcessingSpec) = (PORTS_0_1, ProcessingSpec::AGNOSTIC);

    fn shapes<'a>(decls: &[(&'a str, (PortCount, ProcessingSpec))]) -> Vec<ElementShape<'a>> {
        decls
            .iter()
            .map(|(name, (ports, processing))| ElementShape {
                name: *name,
                ports: *ports,
                processing: *processing,
            })
            .collect()
    }

    fn conns(pairs: &[(u32, usize, u32, usize)]) -> Vec<Connection> {
        pairs
            .iter()
            .enumerate()
            .map(|(i, &(from, fp, to, tp))| Connection {
                id: ConnectionId(i as u32),
                from: Endpoint::new(ElementId(from), fp),
                to: Endpoint::new(ElementId(to), tp),
            })
            .collect()
    }

    #[test]
    fn test_push_into_pull_through_agnostic_conflicts() {
        let elements = shapes(&[("src", SOURCE), ("counter", AGNOSTIC), ("sink", PULL_SINK)]);
        let connections = conns(&[(0, 0, 1, 0), (1, 0, 2, 0)]);
        let err = ProcessingResolver::resolve(&elements, &connections).unwrap_err();
        match err {
            ResolutionError::Conflict {
                connection,
                description,
                first,
                second,
            } => {
                assert_eq!(connection, ConnectionId(1));
                assert_eq!(description, "counter[0] -> [0]sink");
                assert_eq!(first, Mode::Push);
                assert_eq!(second, Mode::Pull);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_queue_splits_push_and_pull() {
        let elements = shapes(&[
            ("src", SOURCE),
            ("counter", AGNOSTIC),
            ("queue", QUEUE),
            ("sink", PULL_SINK),
        ]);
        let connections = conns(&[(0, 0, 1, 0), (1, 0, 2, 0), (2, 0, 3, 0)]);
        let plan = ProcessingResolver::resolve(&elements, &connections).unwrap();
        assert_eq!(plan.connection_mode(ConnectionId(0)), Some(Mode::Push));
        assert_eq!(plan.connection_mode(ConnectionId(1)), Some(Mode::Push));
        assert_eq!(plan.connection_mode(ConnectionId(2)), Some(Mode::Pull));
        assert_eq!(plan.mode(ElementId(1), PortDirection::Input, 0), Some(Mode::Push));
        assert_eq!(plan.mode(ElementId(1), PortDirection::Output, 0), Some(Mode::Push));
        assert_eq!(plan.push_target(ElementId(1), 0), Some(Endpoint::new(ElementId(2), 0)));
        assert_eq!(plan.pull_source(ElementId(3), 0), Some(Endpoint::new(ElementId(2), 0)));
        assert_eq!(plan.stats.push_connections, 2);
        assert_eq!(plan.stats.pull_connections, 1);
        assert_eq!(plan.stats.defaulted_components, 0);
    }

    #[test]
    fn test_all_agnostic_defaults_to_push() {
        let elements = shapes(&[
            ("a", AGNOSTIC_SOURCE),
            ("b", AGNOSTIC),
            ("c", AGNOSTIC_SINK),
        ]);
        let connections = conns(&[(0, 0, 1, 0), (1, 0, 2, 0)]);
        let plan = ProcessingResolver::resolve(&elements, &connections).unwrap();
        assert_eq!(plan.connection_mode(ConnectionId(0)), Some(Mode::Push));
        assert_eq!(plan.connection_mode(ConnectionId(1)), Some(Mode::Push));
        assert_eq!(plan.stats.defaulted_components, 1);
    }

    #[test]
    fn test_pull_propagates_upstream_through_agnostic() {
        let elements = shapes(&[
            ("q", (PORTS_0_1, ProcessingSpec::PULL)),
            ("null", AGNOSTIC),
            ("sink", PULL_SINK),
        ]);
        let connections = conns(&[(0, 0, 1, 0), (1, 0, 2, 0)]);
        let plan = ProcessingResolver::resolve(&elements, &connections).unwrap();
        assert_eq!(plan.port_codes(ElementId(1), PortDirection::Input), "l");
        assert_eq!(plan.port_codes(ElementId(1), PortDirection::Output), "l");
    }

    #[test]
    fn test_push_output_fan_out_rejected() {
        let elements = shapes(&[
            ("src", SOURCE),
            ("a", AGNOSTIC_SINK),
            ("b", AGNOSTIC_SINK),
        ]);
        let connections = conns(&[(0, 0, 1, 0), (0, 0, 2, 0)]);
        assert_eq!(
            ProcessingResolver::resolve(&elements, &connections).unwrap_err(),
            ResolutionError::PushFanOut {
                element: "src".into(),
                port: 0
            }
        );
    }

    #[test]
    fn test_push_input_fan_in_allowed() {
        let elements = shapes(&[("s1", SOURCE), ("s2", SOURCE), ("sink", AGNOSTIC_SINK)]);
        let connections = conns(&[(0, 0, 2, 0), (1, 0, 2, 0)]);
        let plan = ProcessingResolver::resolve(&elements, &connections).unwrap();
        assert_eq!(plan.ports(ElementId(2), PortDirection::Input)[0].peers.len(), 2);
    }

    #[test]
    fn test_pull_input_fan_in_rejected() {
        let elements = shapes(&[("q1", QUEUE), ("q2", QUEUE), ("sink", PULL_SINK), ("s", SOURCE), ("t", SOURCE)]);
        let connections = conns(&[(3, 0, 0, 0), (4, 0, 1, 0), (0, 0, 2, 0), (1, 0, 2, 0)]);
        assert!(matches!(
            ProcessingResolver::resolve(&elements, &connections),
            Err(ResolutionError::PullFanIn { port: 0, .. })
        ));
    }

    #[test]
    fn test_unconnected_port_rejected() {
        let elements = shapes(&[("src", SOURCE), ("null", AGNOSTIC)]);
        let connections = conns(&[(0, 0, 1, 0)]);
        assert_eq!(
            ProcessingResolver::resolve(&elements, &connections).unwrap_err(),
            ResolutionError::Unconnected {
                element: "null".into(),
                direction: PortDirection::Output,
                port: 0
            }
        );
    }

    #[test]
    fn test_port_index_beyond_declared_range() {
        let elements = shapes(&[("src", SOURCE), ("sink", AGNOSTIC_SINK)]);
        let connections = conns(&[(0, 0, 1, 2)]);
        assert_eq!(
            ProcessingResolver::resolve(&elements, &connections).unwrap_err(),
            ResolutionError::PortCount {
                element: "sink".into(),
                direction: PortDirection::Input,
                count: 3,
                allowed: "1".into()
            }
        );
    }

    #[test]
    fn test_unknown_element_in_connection() {
        let elements = shapes(&[("src", SOURCE)]);
        let connections = conns(&[(0, 0, 7, 0)]);
        assert_eq!(
            ProcessingResolver::resolve(&elements, &connections).unwrap_err(),
            ResolutionError::InvalidElement { id: ElementId(7) }
        );
    }

    #[test]
    fn test_unbounded_outputs_count_connections() {
        let tee = (
            PortCount::new(PortRange::fixed(1), PortRange::at_least(1)),
            ProcessingSpec::PUSH,
        );
        let elements = shapes(&[
            ("src", SOURCE),
            ("tee", tee),
            ("a", AGNOSTIC_SINK),
            ("b", AGNOSTIC_SINK),
            ("c", AGNOSTIC_SINK),
        ]);
        let connections = conns(&[(0, 0, 1, 0), (1, 0, 2, 0), (1, 1, 3, 0), (1, 2, 4, 0)]);
        let plan = ProcessingResolver::resolve(&elements, &connections).unwrap();
        assert_eq!(plan.port_codes(ElementId(1), PortDirection::Output), "hhh");
    }

    /// src -> a0 -> ... -> queue -> ... -> sink, with agnostic elements on
    /// both sides of the queue.
    fn chain(before: usize, after: usize) -> (Vec<(String, (PortCount, ProcessingSpec))>, Vec<(u32, u32)>) {
        let mut decls = vec![("src".to_string(), SOURCE)];
        for i in 0..before {
            decls.push((format!("pre{i}"), AGNOSTIC));
        }
        decls.push(("queue".to_string(), QUEUE));
        for i in 0..after {
            decls.push((format!("post{i}"), AGNOSTIC));
        }
        decls.push(("sink".to_string(), PULL_SINK));
        let links = (0..decls.len() as u32 - 1).map(|i| (i, i + 1)).collect();
        (decls, links)
    }

    proptest! {
        #[test]
        fn prop_resolution_ignores_connection_order(
            before in 0usize..5,
            after in 0usize..5,
            seed in any::<u64>(),
        ) {
            let (decls, links) = chain(before, after);
            let named: Vec<(&str, (PortCount, ProcessingSpec))> =
                decls.iter().map(|(n, s)| (n.as_str(), *s)).collect();
            let elements = shapes(&named);

            let mut shuffled = links.clone();
            // Deterministic Fisher-Yates driven by the generated seed.
            let mut state = seed | 1;
            for i in (1..shuffled.len()).rev() {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                shuffled.swap(i, (state % (i as u64 + 1)) as usize);
            }

            let resolve = |links: &[(u32, u32)]| {
                let pairs: Vec<_> = links.iter().map(|&(a, b)| (a, 0, b, 0)).collect();
                let connections = conns(&pairs);
                let plan = ProcessingResolver::resolve(&elements, &connections).unwrap();
                connections
                    .iter()
                    .map(|c| ((c.from.element, c.to.element), plan.connection_mode(c.id).unwrap()))
                    .collect::<HashMap<_, _>>()
            };

            let ordered = resolve(&links);
            prop_assert_eq!(&ordered, &resolve(&shuffled));

            let queue = ElementId(before as u32 + 1);
            for ((from, _), mode) in ordered {
                let expected = if from < queue { Mode::Push } else { Mode::Pull };
                prop_assert_eq!(mode, expected);
            }
        }
    }
}
