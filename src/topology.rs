use std::{
    collections::{BTreeMap, VecDeque},
    net::IpAddr,
};

use ahash::RandomState;
use indexmap::IndexMap;
use petgraph::{
    graph::{NodeIndex, UnGraph},
    unionfind::UnionFind,
    visit::EdgeRef,
};

use crate::{record::Protocol, session::SessionMap};

/// Undirected host graph for one protocol: nodes are host addresses,
/// one edge per session, edge weight is the session byte total.
/// Self-pair sessions never become edges, so the graph has no
/// self-loops and every node has degree >= 1.
pub struct TopologyGraph {
    graph: UnGraph<IpAddr, u64>,
}

impl TopologyGraph {
    pub fn from_sessions(sessions: &SessionMap, protocol: Protocol) -> Self {
        let mut graph = UnGraph::new_undirected();
        let mut nodes: IndexMap<IpAddr, NodeIndex, RandomState> =
            IndexMap::with_hasher(RandomState::new());

        for (key, session) in sessions {
            if key.protocol() != protocol || key.is_self_pair() {
                continue;
            }
            let (a, b) = key.hosts();
            let node_a = *nodes.entry(a).or_insert_with(|| graph.add_node(a));
            let node_b = *nodes.entry(b).or_insert_with(|| graph.add_node(b));
            graph.add_edge(node_a, node_b, session.bytes);
        }

        Self { graph }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn hosts(&self) -> impl Iterator<Item = IpAddr> + '_ {
        self.graph.node_indices().map(move |index| self.graph[index])
    }

    pub fn edges(&self) -> impl Iterator<Item = (IpAddr, IpAddr, u64)> + '_ {
        self.graph.edge_references().map(move |edge| {
            (
                self.graph[edge.source()],
                self.graph[edge.target()],
                *edge.weight(),
            )
        })
    }

    /// Per-host degree: the number of distinct session partners. There
    /// is exactly one edge per partner, so the neighbor count is it.
    pub fn degrees(&self) -> Vec<(IpAddr, usize)> {
        self.graph
            .node_indices()
            .map(|index| (self.graph[index], self.graph.neighbors(index).count()))
            .collect()
    }

    /// Degree value -> number of hosts with that degree.
    pub fn degree_distribution(&self) -> BTreeMap<usize, usize> {
        let mut distribution = BTreeMap::new();
        for (_, degree) in self.degrees() {
            *distribution.entry(degree).or_insert(0) += 1;
        }
        distribution
    }

    /// Every connected component, each as a sorted host list. Components
    /// are ordered by descending size, ties broken by the smallest
    /// member address, so "the largest component" is deterministic no
    /// matter how the graph was assembled.
    pub fn connected_components(&self) -> Vec<Vec<IpAddr>> {
        let mut union_find = UnionFind::new(self.graph.node_count());
        for edge in self.graph.edge_references() {
            union_find.union(edge.source().index(), edge.target().index());
        }

        let mut groups: IndexMap<usize, Vec<IpAddr>, RandomState> =
            IndexMap::with_hasher(RandomState::new());
        for index in self.graph.node_indices() {
            groups
                .entry(union_find.find(index.index()))
                .or_insert_with(Vec::new)
                .push(self.graph[index]);
        }

        let mut components: Vec<Vec<IpAddr>> = groups.into_iter().map(|(_, v)| v).collect();
        for component in &mut components {
            component.sort();
        }
        components.sort_by(|x, y| y.len().cmp(&x.len()).then(x[0].cmp(&y[0])));
        components
    }

    /// The largest component by host count, or `None` for an empty
    /// graph. Ties resolve to the component holding the smallest host
    /// address.
    pub fn largest_component(&self) -> Option<Vec<IpAddr>> {
        self.connected_components().into_iter().next()
    }

    /// Longest finite shortest path between any two hosts, taken over
    /// every component. `None` for an empty graph.
    pub fn diameter(&self) -> Option<usize> {
        if self.graph.node_count() == 0 {
            return None;
        }
        let mut diameter = 0;
        for start in self.graph.node_indices() {
            let mut distance = vec![usize::MAX; self.graph.node_count()];
            let mut queue = VecDeque::new();
            distance[start.index()] = 0;
            queue.push_back(start);
            while let Some(node) = queue.pop_front() {
                for next in self.graph.neighbors(node) {
                    if distance[next.index()] == usize::MAX {
                        distance[next.index()] = distance[node.index()] + 1;
                        queue.push_back(next);
                    }
                }
            }
            let eccentricity = distance
                .into_iter()
                .filter(|d| *d != usize::MAX)
                .max()
                .unwrap_or(0);
            diameter = diameter.max(eccentricity);
        }
        Some(diameter)
    }

    /// Global clustering coefficient: closed triplets over all
    /// triplets. `None` when no host has two partners.
    pub fn clustering_coefficient(&self) -> Option<f64> {
        let mut closed = 0usize;
        let mut triplets = 0usize;
        for node in self.graph.node_indices() {
            let neighbors: Vec<NodeIndex> = self.graph.neighbors(node).collect();
            triplets += neighbors.len() * neighbors.len().saturating_sub(1) / 2;
            for (i, a) in neighbors.iter().enumerate() {
                for b in &neighbors[i + 1..] {
                    if self.graph.contains_edge(*a, *b) {
                        closed += 1;
                    }
                }
            }
        }
        if triplets == 0 {
            None
        } else {
            Some(closed as f64 / triplets as f64)
        }
    }

    /// Edges with both endpoints inside `hosts`, for drawing an induced
    /// subgraph.
    pub fn edges_among<'a>(
        &'a self,
        hosts: &'a [IpAddr],
    ) -> impl Iterator<Item = (IpAddr, IpAddr, u64)> + 'a {
        self.edges()
            .filter(move |(a, b, _)| hosts.contains(a) && hosts.contains(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Protocol;
    use crate::session::{aggregate, SessionKey};
    use std::net::Ipv4Addr;

    fn host(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    fn record(src: u8, dst: u8, protocol: Protocol, length: u64) -> crate::record::PacketRecord {
        crate::record::PacketRecord {
            timestamp: 0.0,
            source: host(src),
            destination: host(dst),
            source_port: None,
            destination_port: None,
            protocol,
            length,
        }
    }

    #[test]
    fn one_edge_per_session_key() {
        let records = vec![
            record(1, 2, Protocol::Tcp, 100),
            record(2, 1, Protocol::Tcp, 50),
            record(1, 2, Protocol::Tcp, 25),
            record(3, 4, Protocol::Tcp, 10),
        ];
        let sessions = aggregate(&records);
        let graph = TopologyGraph::from_sessions(&sessions, Protocol::Tcp);

        let tcp_sessions = sessions
            .keys()
            .filter(|k| k.protocol() == Protocol::Tcp && !k.is_self_pair())
            .count();
        assert_eq!(graph.edge_count(), tcp_sessions);
        assert_eq!(graph.edge_count(), 2);

        let weights: Vec<u64> = graph.edges().map(|(_, _, w)| w).collect();
        assert!(weights.contains(&175));
        assert!(weights.contains(&10));
    }

    #[test]
    fn no_self_loops() {
        let records = vec![
            record(1, 1, Protocol::Tcp, 100),
            record(1, 2, Protocol::Tcp, 40),
        ];
        let sessions = aggregate(&records);
        assert_eq!(sessions.len(), 2);

        let graph = TopologyGraph::from_sessions(&sessions, Protocol::Tcp);
        assert_eq!(graph.edge_count(), 1);
        assert!(graph.edges().all(|(a, b, _)| a != b));
    }

    #[test]
    fn degree_counts_distinct_partners() {
        // star: 1 talks to 2, 3, 4
        let records = vec![
            record(1, 2, Protocol::Udp, 10),
            record(1, 3, Protocol::Udp, 10),
            record(4, 1, Protocol::Udp, 10),
        ];
        let graph = TopologyGraph::from_sessions(&aggregate(&records), Protocol::Udp);

        let degrees: BTreeMap<IpAddr, usize> = graph.degrees().into_iter().collect();
        assert_eq!(degrees[&host(1)], 3);
        assert_eq!(degrees[&host(2)], 1);
        assert_eq!(degrees[&host(3)], 1);
        assert_eq!(degrees[&host(4)], 1);

        let distribution = graph.degree_distribution();
        assert_eq!(distribution[&1], 3);
        assert_eq!(distribution[&3], 1);
    }

    #[test]
    fn handshake_lemma_holds() {
        let records = vec![
            record(1, 2, Protocol::Tcp, 1),
            record(2, 3, Protocol::Tcp, 1),
            record(3, 1, Protocol::Tcp, 1),
            record(4, 5, Protocol::Tcp, 1),
        ];
        let graph = TopologyGraph::from_sessions(&aggregate(&records), Protocol::Tcp);
        let degree_sum: usize = graph.degrees().iter().map(|(_, d)| d).sum();
        assert_eq!(degree_sum, 2 * graph.edge_count());
    }

    #[test]
    fn diameter_of_a_path() {
        // 1 - 2 - 3 - 4
        let records = vec![
            record(1, 2, Protocol::Tcp, 1),
            record(2, 3, Protocol::Tcp, 1),
            record(3, 4, Protocol::Tcp, 1),
        ];
        let graph = TopologyGraph::from_sessions(&aggregate(&records), Protocol::Tcp);
        assert_eq!(graph.diameter(), Some(3));
        // a path closes no triangles
        assert_eq!(graph.clustering_coefficient(), Some(0.0));
    }

    #[test]
    fn triangle_has_full_clustering() {
        let records = vec![
            record(1, 2, Protocol::Tcp, 1),
            record(2, 3, Protocol::Tcp, 1),
            record(3, 1, Protocol::Tcp, 1),
        ];
        let graph = TopologyGraph::from_sessions(&aggregate(&records), Protocol::Tcp);
        assert_eq!(graph.diameter(), Some(1));
        assert_eq!(graph.clustering_coefficient(), Some(1.0));
    }

    #[test]
    fn diameter_ignores_disconnection() {
        // two disjoint edges: longest path inside any component is 1
        let records = vec![
            record(1, 2, Protocol::Tcp, 1),
            record(3, 4, Protocol::Tcp, 1),
        ];
        let graph = TopologyGraph::from_sessions(&aggregate(&records), Protocol::Tcp);
        assert_eq!(graph.diameter(), Some(1));
        // no host has two partners
        assert_eq!(graph.clustering_coefficient(), None);
    }

    #[test]
    fn two_triangles_make_two_components() {
        let records = vec![
            record(1, 2, Protocol::Tcp, 1),
            record(2, 3, Protocol::Tcp, 1),
            record(3, 1, Protocol::Tcp, 1),
            record(4, 5, Protocol::Tcp, 1),
            record(5, 6, Protocol::Tcp, 1),
            record(6, 4, Protocol::Tcp, 1),
        ];
        let graph = TopologyGraph::from_sessions(&aggregate(&records), Protocol::Tcp);
        assert_eq!(graph.node_count(), 6);
        assert_eq!(graph.edge_count(), 6);

        let components = graph.connected_components();
        assert_eq!(components.len(), 2);
        assert!(components.iter().all(|c| c.len() == 3));

        // size tie resolves to the component with the smallest address
        let largest = graph.largest_component().unwrap();
        assert_eq!(largest, vec![host(1), host(2), host(3)]);
    }

    #[test]
    fn protocols_build_disjoint_graphs() {
        let records = vec![
            record(1, 2, Protocol::Tcp, 100),
            record(3, 4, Protocol::Udp, 200),
        ];
        let sessions = aggregate(&records);

        let tcp = TopologyGraph::from_sessions(&sessions, Protocol::Tcp);
        let udp = TopologyGraph::from_sessions(&sessions, Protocol::Udp);
        assert_eq!((tcp.node_count(), tcp.edge_count()), (2, 1));
        assert_eq!((udp.node_count(), udp.edge_count()), (2, 1));
        assert_eq!(tcp.connected_components().len(), 1);
        assert_eq!(udp.connected_components().len(), 1);
    }

    #[test]
    fn empty_graph_is_not_an_error() {
        let sessions = aggregate(&[]);
        let graph = TopologyGraph::from_sessions(&sessions, Protocol::Tcp);
        assert!(graph.is_empty());
        assert!(graph.degree_distribution().is_empty());
        assert!(graph.connected_components().is_empty());
        assert!(graph.largest_component().is_none());
        assert!(graph.diameter().is_none());
        assert!(graph.clustering_coefficient().is_none());
    }

    #[test]
    fn key_orientation_does_not_change_the_graph() {
        let key_ab = SessionKey::new(host(1), host(2), Protocol::Tcp);
        let key_ba = SessionKey::new(host(2), host(1), Protocol::Tcp);
        assert_eq!(key_ab, key_ba);
    }
}
