//! Ocean network and shortest-path engine.
//!
//! An [`OceanNetwork`] is a weighted undirected graph over navigable
//! ocean nodes, a spatial index over the node coordinates and a list of
//! named chokepoints. It is built once and never mutated; a
//! [`ShortestPathEngine`] borrows it to answer distance queries between
//! arbitrary points.
//!
//! A query snaps both endpoints to their nearest nodes and routes
//! between them. When sailing straight is no longer than merely reaching
//! the network from both ends, the straight-line distance is reported
//! instead.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use petgraph::algo::astar;
use petgraph::graph::{NodeIndex, UnGraph};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::spatial_index::{IndexLevels, SpatialIndex};
use crate::types::{GeoPoint, PipelineError};

/// A node of the ocean network as supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OceanNode {
    /// Caller's node id.
    pub id: u64,
    /// Node location.
    pub position: GeoPoint,
}

/// An edge of the ocean network as supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OceanEdge {
    /// Id of one endpoint.
    pub source: u64,
    /// Id of the other endpoint.
    pub target: u64,
    /// Edge length in kilometres. `None` means the haversine distance
    /// between the endpoints.
    pub weight_km: Option<f64>,
}

/// A named strait or canal whose crossing is reported per route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chokepoint {
    /// Name, e.g. `"suez"`.
    pub name: String,
    /// Reference coordinate.
    pub position: GeoPoint,
}

/// Parameters of an [`OceanNetwork`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Grid levels for the node index.
    pub node_index: IndexLevels,

    /// A path crosses a chokepoint if any of its nodes lies within this
    /// many kilometres of it.
    pub chokepoint_radius_km: f64,
}

impl NetworkConfig {
    /// Default chokepoint radius (km).
    pub const DEFAULT_CHOKEPOINT_RADIUS_KM: f64 = 5.0;
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            node_index: IndexLevels::ocean_nodes(),
            chokepoint_radius_km: Self::DEFAULT_CHOKEPOINT_RADIUS_KM,
        }
    }
}

/// Errors building an [`OceanNetwork`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NetworkError {
    /// The node index could not be built.
    #[error("ocean node index: {0}")]
    Index(#[from] PipelineError),

    /// Two nodes share an id.
    #[error("duplicate ocean node id {0}")]
    DuplicateNode(u64),

    /// An edge references a node that does not exist.
    #[error("edge {start}-{end} references unknown node {missing}")]
    UnknownNode {
        /// Id of the edge's first endpoint.
        start: u64,
        /// Id of the edge's second endpoint.
        end: u64,
        /// The id that was not found.
        missing: u64,
    },

    /// An edge weight is negative or not finite.
    #[error("edge {start}-{end} has invalid weight {weight}")]
    InvalidWeight {
        /// Id of the edge's first endpoint.
        start: u64,
        /// Id of the edge's second endpoint.
        end: u64,
        /// The weight as given.
        weight: f64,
    },

    /// A chokepoint coordinate is invalid.
    #[error("chokepoint {0} has an invalid coordinate")]
    InvalidChokepoint(String),

    /// The chokepoint radius is negative or not finite.
    #[error("chokepoint radius must be a non-negative number, got {0}")]
    InvalidRadius(f64),
}

/// Immutable ocean graph with its node index and chokepoints.
#[derive(Debug)]
pub struct OceanNetwork {
    graph: UnGraph<GeoPoint, f64>,
    node_ids: Vec<u64>,
    index: SpatialIndex<NodeIndex>,
    chokepoints: Vec<Chokepoint>,
    /// Chokepoints within the radius of each node, for the few nodes
    /// near any chokepoint.
    near_chokepoints: HashMap<NodeIndex, Vec<usize>>,
}

impl OceanNetwork {
    /// Build the network.
    ///
    /// # Errors
    ///
    /// Returns a [`NetworkError`] for an empty node list, invalid node or
    /// chokepoint coordinates, duplicate node ids, edges referencing
    /// unknown nodes, or invalid weights.
    pub fn new(
        nodes: &[OceanNode],
        edges: &[OceanEdge],
        chokepoints: Vec<Chokepoint>,
        config: &NetworkConfig,
    ) -> Result<Self, NetworkError> {
        if !(config.chokepoint_radius_km.is_finite() && config.chokepoint_radius_km >= 0.0) {
            return Err(NetworkError::InvalidRadius(config.chokepoint_radius_km));
        }
        if let Some(bad) = chokepoints.iter().find(|c| !c.position.is_valid()) {
            return Err(NetworkError::InvalidChokepoint(bad.name.clone()));
        }

        let mut graph = UnGraph::with_capacity(nodes.len(), edges.len());
        let mut by_id = HashMap::with_capacity(nodes.len());
        for node in nodes {
            let ix = graph.add_node(node.position);
            if by_id.insert(node.id, ix).is_some() {
                return Err(NetworkError::DuplicateNode(node.id));
            }
        }

        for edge in edges {
            let lookup = |id: u64| {
                by_id.get(&id).copied().ok_or(NetworkError::UnknownNode {
                    start: edge.source,
                    end: edge.target,
                    missing: id,
                })
            };
            let a = lookup(edge.source)?;
            let b = lookup(edge.target)?;
            let weight = match edge.weight_km {
                Some(w) if w.is_finite() && w >= 0.0 => w,
                Some(w) => {
                    return Err(NetworkError::InvalidWeight {
                        start: edge.source,
                        end: edge.target,
                        weight: w,
                    });
                }
                None => graph[a].distance_km(graph[b]),
            };
            graph.add_edge(a, b, weight);
        }

        let index = SpatialIndex::new(
            graph
                .node_indices()
                .map(|ix| (ix, graph[ix]))
                .collect(),
            &config.node_index,
        )?;

        let mut near_chokepoints: HashMap<NodeIndex, Vec<usize>> = HashMap::new();
        for ix in graph.node_indices() {
            for (c, chokepoint) in chokepoints.iter().enumerate() {
                if graph[ix].distance_km(chokepoint.position) <= config.chokepoint_radius_km {
                    near_chokepoints.entry(ix).or_default().push(c);
                }
            }
        }

        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            chokepoints = chokepoints.len(),
            "ocean network built"
        );

        Ok(Self {
            graph,
            node_ids: nodes.iter().map(|n| n.id).collect(),
            index,
            chokepoints,
            near_chokepoints,
        })
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Chokepoints in reporting order.
    #[must_use]
    pub fn chokepoints(&self) -> &[Chokepoint] {
        &self.chokepoints
    }

    /// Caller's id of a node.
    #[must_use]
    pub fn node_id(&self, ix: NodeIndex) -> Option<u64> {
        self.node_ids.get(ix.index()).copied()
    }
}

/// Where a query's endpoints meet the network.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkEnds {
    /// Straight-line distance between the endpoints (km).
    pub direct_km: f64,
    /// Node nearest the source.
    pub source_node: NodeIndex,
    /// Distance from the source to its node (km).
    pub to_network_km: f64,
    /// Node nearest the destination.
    pub target_node: NodeIndex,
    /// Distance from the destination's node to the destination (km).
    pub from_network_km: f64,
}

impl NetworkEnds {
    /// Whether the straight line is no longer than reaching the network
    /// from both ends.
    #[must_use]
    pub fn direct_wins(&self) -> bool {
        self.direct_km <= self.to_network_km + self.from_network_km
    }
}

/// A route through the network between two nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkPath {
    /// Length in km; infinite when unreachable.
    pub length_km: f64,
    /// Flags aligned with [`OceanNetwork::chokepoints`].
    pub chokepoints: Vec<bool>,
    /// Nodes on the path, endpoints included. Empty when the endpoints
    /// coincide or are unreachable.
    pub nodes: Vec<NodeIndex>,
}

/// Answer to one distance query. All distances in kilometres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortestPathResult {
    /// Straight-line distance between source and destination.
    pub direct_km: f64,
    /// Reported distance.
    pub distance_km: f64,
    /// Source to its nearest node; 0 when the direct route is reported.
    pub to_network_km: f64,
    /// Path length inside the network; 0 when the direct route is
    /// reported.
    pub network_km: f64,
    /// Destination's nearest node to the destination; 0 when the direct
    /// route is reported.
    pub from_network_km: f64,
    /// Chokepoint flags aligned with [`OceanNetwork::chokepoints`].
    pub chokepoints: Vec<bool>,
}

impl ShortestPathResult {
    /// Whether the network route was reported.
    #[must_use]
    pub fn via_network(&self) -> bool {
        self.to_network_km > 0.0 || self.network_km > 0.0 || self.from_network_km > 0.0
    }

    /// Names of the flagged chokepoints.
    pub fn crossed<'n>(&self, network: &'n OceanNetwork) -> impl Iterator<Item = &'n str> {
        network
            .chokepoints
            .iter()
            .zip(&self.chokepoints)
            .filter_map(|(c, &hit)| hit.then_some(c.name.as_str()))
    }
}

/// Errors of a checked batch query.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    /// A query coordinate is invalid.
    #[error("row {row}: invalid coordinate ({lat}, {lon})")]
    InvalidCoordinate {
        /// Row within the batch.
        row: usize,
        /// Latitude as given.
        lat: f64,
        /// Longitude as given.
        lon: f64,
    },

    /// The batch did not finish before its deadline.
    #[error("batch of {rows} rows exceeded its deadline")]
    DeadlineExceeded {
        /// Rows in the batch.
        rows: usize,
    },
}

/// Distance queries against a borrowed [`OceanNetwork`].
#[derive(Debug, Clone, Copy)]
pub struct ShortestPathEngine<'n> {
    network: &'n OceanNetwork,
}

impl<'n> ShortestPathEngine<'n> {
    /// Create an engine over `network`.
    #[must_use]
    pub const fn new(network: &'n OceanNetwork) -> Self {
        Self { network }
    }

    /// The network queried.
    #[must_use]
    pub const fn network(&self) -> &'n OceanNetwork {
        self.network
    }

    /// Snap both endpoints to the network.
    #[must_use]
    pub fn ends(&self, source: GeoPoint, destination: GeoPoint) -> NetworkEnds {
        let s = self.network.index.nearest(source);
        let d = self.network.index.nearest(destination);
        NetworkEnds {
            direct_km: source.distance_km(destination),
            source_node: *s.feature,
            to_network_km: s.distance_km,
            target_node: *d.feature,
            from_network_km: d.distance_km,
        }
    }

    /// Shortest path between two nodes.
    #[must_use]
    pub fn path(&self, from: NodeIndex, to: NodeIndex) -> NetworkPath {
        let flags = vec![false; self.network.chokepoints.len()];
        if from == to {
            return NetworkPath {
                length_km: 0.0,
                chokepoints: flags,
                nodes: Vec::new(),
            };
        }
        let graph = &self.network.graph;
        match astar(graph, from, |n| n == to, |e| *e.weight(), |_| 0.0) {
            Some((length_km, nodes)) => {
                let mut chokepoints = flags;
                for c in nodes
                    .iter()
                    .filter_map(|n| self.network.near_chokepoints.get(n))
                    .flatten()
                {
                    chokepoints[*c] = true;
                }
                NetworkPath {
                    length_km,
                    chokepoints,
                    nodes,
                }
            }
            None => NetworkPath {
                length_km: f64::INFINITY,
                chokepoints: flags,
                nodes: Vec::new(),
            },
        }
    }

    /// Distance and chokepoints between two points.
    #[must_use]
    pub fn query(&self, source: GeoPoint, destination: GeoPoint) -> ShortestPathResult {
        let ends = self.ends(source, destination);
        let path = self.path(ends.source_node, ends.target_node);
        resolve(&ends, &path)
    }

    /// One result per pair, in input order.
    ///
    /// Endpoint snapping runs over the whole batch in parallel, then one
    /// path search per distinct pair of nodes.
    #[must_use]
    pub fn query_batch(&self, pairs: &[(GeoPoint, GeoPoint)]) -> Vec<ShortestPathResult> {
        self.run_batch(pairs, None).unwrap_or_default()
    }

    /// Like [`query_batch`](Self::query_batch), but rejects invalid
    /// coordinates up front and gives up once `deadline` has passed.
    ///
    /// The deadline is checked before each path search, so a single
    /// search already under way is never interrupted.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidCoordinate`] for the first invalid
    /// coordinate and [`QueryError::DeadlineExceeded`] on timeout.
    pub fn try_query_batch(
        &self,
        pairs: &[(GeoPoint, GeoPoint)],
        deadline: Option<Instant>,
    ) -> Result<Vec<ShortestPathResult>, QueryError> {
        for (row, (s, d)) in pairs.iter().enumerate() {
            if let Some(bad) = [s, d].into_iter().find(|p| !p.is_valid()) {
                return Err(QueryError::InvalidCoordinate {
                    row,
                    lat: bad.lat,
                    lon: bad.lon,
                });
            }
        }
        self.run_batch(pairs, deadline)
    }

    fn run_batch(
        &self,
        pairs: &[(GeoPoint, GeoPoint)],
        deadline: Option<Instant>,
    ) -> Result<Vec<ShortestPathResult>, QueryError> {
        let ends: Vec<NetworkEnds> = pairs.par_iter().map(|(s, d)| self.ends(*s, *d)).collect();

        let unique: HashSet<(NodeIndex, NodeIndex)> = ends
            .iter()
            .map(|e| node_key(e.source_node, e.target_node))
            .collect();
        let paths: HashMap<(NodeIndex, NodeIndex), NetworkPath> = unique
            .into_par_iter()
            .map(|(a, b)| {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    return Err(QueryError::DeadlineExceeded { rows: pairs.len() });
                }
                Ok(((a, b), self.path(a, b)))
            })
            .collect::<Result<_, _>>()?;

        Ok(ends
            .iter()
            .map(|e| {
                paths
                    .get(&node_key(e.source_node, e.target_node))
                    .map_or_else(
                        || resolve(e, &self.path(e.source_node, e.target_node)),
                        |p| resolve(e, p),
                    )
            })
            .collect())
    }
}

/// Undirected lookup key.
fn node_key(a: NodeIndex, b: NodeIndex) -> (NodeIndex, NodeIndex) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Apply the decision rule to snapped ends and the path between them.
fn resolve(ends: &NetworkEnds, path: &NetworkPath) -> ShortestPathResult {
    if ends.direct_wins() {
        ShortestPathResult {
            direct_km: ends.direct_km,
            distance_km: ends.direct_km,
            to_network_km: 0.0,
            network_km: 0.0,
            from_network_km: 0.0,
            chokepoints: path.chokepoints.clone(),
        }
    } else {
        ShortestPathResult {
            direct_km: ends.direct_km,
            distance_km: ends.to_network_km + path.length_km + ends.from_network_km,
            to_network_km: ends.to_network_km,
            network_km: path.length_km,
            from_network_km: ends.from_network_km,
            chokepoints: path.chokepoints.clone(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    /// Length of one degree of arc along the equator.
    fn km_per_degree() -> f64 {
        GeoPoint::new(0.0, 0.0).distance_km(GeoPoint::new(0.0, 1.0))
    }

    /// A chain of nodes along the equator, one degree apart, with a
    /// chokepoint about 1 km from the middle node.
    fn equator_chain(n: u32) -> OceanNetwork {
        let nodes: Vec<OceanNode> = (0..n)
            .map(|i| OceanNode {
                id: u64::from(i) * 10,
                position: GeoPoint::new(0.0, f64::from(i)),
            })
            .collect();
        let edges: Vec<OceanEdge> = (1..n)
            .map(|i| OceanEdge {
                source: u64::from(i - 1) * 10,
                target: u64::from(i) * 10,
                weight_km: None,
            })
            .collect();
        let chokepoints = vec![
            Chokepoint {
                name: "middle".to_owned(),
                position: GeoPoint::new(0.01, f64::from(n / 2)),
            },
            Chokepoint {
                name: "elsewhere".to_owned(),
                position: GeoPoint::new(45.0, 45.0),
            },
        ];
        let config = NetworkConfig {
            node_index: IndexLevels {
                resolutions: vec![1, 2, 3, 4],
                ring: 1,
            },
            ..NetworkConfig::default()
        };
        OceanNetwork::new(&nodes, &edges, chokepoints, &config).unwrap()
    }

    #[test]
    fn builds_with_haversine_default_weights() {
        let network = equator_chain(5);
        assert_eq!(network.node_count(), 5);
        assert_eq!(network.edge_count(), 4);
        assert_eq!(network.node_id(NodeIndex::new(3)), Some(30));
    }

    #[test]
    fn duplicate_and_unknown_nodes_rejected() {
        let node = |id| OceanNode {
            id,
            position: GeoPoint::new(0.0, 0.0),
        };
        let config = NetworkConfig::default();
        assert_eq!(
            OceanNetwork::new(&[node(1), node(1)], &[], Vec::new(), &config).unwrap_err(),
            NetworkError::DuplicateNode(1)
        );
        let edge = OceanEdge {
            source: 1,
            target: 2,
            weight_km: None,
        };
        assert_eq!(
            OceanNetwork::new(&[node(1)], &[edge], Vec::new(), &config).unwrap_err(),
            NetworkError::UnknownNode {
                start: 1,
                end: 2,
                missing: 2
            }
        );
        assert!(matches!(
            OceanNetwork::new(&[], &[], Vec::new(), &config).unwrap_err(),
            NetworkError::Index(PipelineError::EmptyReferenceSet)
        ));
    }

    #[test]
    fn negative_weight_rejected() {
        let nodes = [
            OceanNode {
                id: 1,
                position: GeoPoint::new(0.0, 0.0),
            },
            OceanNode {
                id: 2,
                position: GeoPoint::new(0.0, 1.0),
            },
        ];
        let edges = [OceanEdge {
            source: 1,
            target: 2,
            weight_km: Some(-1.0),
        }];
        assert!(matches!(
            OceanNetwork::new(&nodes, &edges, Vec::new(), &NetworkConfig::default()),
            Err(NetworkError::InvalidWeight { .. })
        ));
    }

    #[test]
    fn long_route_goes_through_network() {
        let network = equator_chain(11);
        let engine = ShortestPathEngine::new(&network);
        // Both endpoints 0.1 degree north of the end nodes.
        let result = engine.query(GeoPoint::new(0.1, 0.0), GeoPoint::new(0.1, 10.0));
        assert!(result.via_network());
        assert!((result.network_km - 10.0 * km_per_degree()).abs() < 1e-6);
        let expected = result.to_network_km + result.network_km + result.from_network_km;
        assert!((result.distance_km - expected).abs() < 1e-9);
        assert!(result.distance_km >= result.direct_km);
        assert_eq!(result.chokepoints, vec![true, false]);
        assert_eq!(result.crossed(&network).collect::<Vec<_>>(), vec!["middle"]);
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn short_hop_reports_direct_distance_exactly() {
        let network = equator_chain(11);
        let engine = ShortestPathEngine::new(&network);
        let (s, d) = (GeoPoint::new(0.3, 4.2), GeoPoint::new(0.3, 4.4));
        let ends = engine.ends(s, d);
        assert!(ends.direct_wins());
        let result = engine.query(s, d);
        assert_eq!(result.distance_km, s.distance_km(d));
        assert_eq!(result.to_network_km, 0.0);
        assert_eq!(result.network_km, 0.0);
        assert_eq!(result.from_network_km, 0.0);
        assert!(!result.via_network());
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn both_ends_near_one_node_compare_legs_against_direct() {
        let network = equator_chain(5);
        let engine = ShortestPathEngine::new(&network);
        // 2 km north and 2 km east of the node at (0, 2).
        let offset = 2.0 / km_per_degree();
        let (s, d) = (GeoPoint::new(offset, 2.0), GeoPoint::new(0.0, 2.0 + offset));

        let ends = engine.ends(s, d);
        assert_eq!(ends.source_node, ends.target_node);
        assert!((ends.to_network_km + ends.from_network_km - 4.0).abs() < 1e-6);
        let path = engine.path(ends.source_node, ends.target_node);
        assert_eq!(path.length_km, 0.0);
        assert!(path.nodes.is_empty());

        let result = engine.query(s, d);
        assert!(ends.direct_wins());
        assert_eq!(result.distance_km, ends.direct_km);
        assert!((result.distance_km - 2.0 * 2.0_f64.sqrt()).abs() < 1e-3);
        assert_eq!(result.to_network_km + result.from_network_km, 0.0);
        // Same node: no path, so no chokepoint even though one is 1 km away.
        assert_eq!(result.chokepoints, vec![false, false]);
    }

    #[test]
    fn unreachable_destination_is_infinite() {
        let nodes = [
            OceanNode {
                id: 1,
                position: GeoPoint::new(0.0, 0.0),
            },
            OceanNode {
                id: 2,
                position: GeoPoint::new(0.0, 30.0),
            },
        ];
        let network =
            OceanNetwork::new(&nodes, &[], Vec::new(), &NetworkConfig::default()).unwrap();
        let engine = ShortestPathEngine::new(&network);
        let result = engine.query(GeoPoint::new(0.5, 0.0), GeoPoint::new(0.5, 30.0));
        assert!(result.distance_km.is_infinite());
        assert!(result.network_km.is_infinite());
    }

    #[test]
    fn batch_matches_single_queries_in_order() {
        let network = equator_chain(11);
        let engine = ShortestPathEngine::new(&network);
        let pairs = vec![
            (GeoPoint::new(0.1, 0.0), GeoPoint::new(0.1, 10.0)),
            (GeoPoint::new(0.3, 4.2), GeoPoint::new(0.3, 4.4)),
            (GeoPoint::new(0.1, 10.0), GeoPoint::new(0.1, 0.0)),
            (GeoPoint::new(0.1, 0.0), GeoPoint::new(0.1, 10.0)),
        ];
        let batch = engine.query_batch(&pairs);
        assert_eq!(batch.len(), pairs.len());
        for ((s, d), result) in pairs.iter().zip(&batch) {
            let single = engine.query(*s, *d);
            assert!((single.distance_km - result.distance_km).abs() < 1e-9);
            assert_eq!(single.chokepoints, result.chokepoints);
        }
    }

    #[test]
    fn unchecked_queries_with_nan_give_nan_distances() {
        let network = equator_chain(3);
        let engine = ShortestPathEngine::new(&network);
        let nan = GeoPoint::new(f64::NAN, 1.0);
        assert!(engine.query(GeoPoint::new(0.0, 0.0), nan).distance_km.is_nan());
        let batch = engine.query_batch(&[
            (nan, GeoPoint::new(0.0, 2.0)),
            (GeoPoint::new(0.1, 0.0), GeoPoint::new(0.1, 2.0)),
        ]);
        assert!(batch[0].distance_km.is_nan());
        assert!(batch[1].distance_km.is_finite());
    }

    #[test]
    fn checked_batch_rejects_invalid_coordinates() {
        let network = equator_chain(3);
        let engine = ShortestPathEngine::new(&network);
        let pairs = [
            (GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 1.0)),
            (GeoPoint::new(0.0, 0.0), GeoPoint::new(f64::NAN, 1.0)),
        ];
        assert!(matches!(
            engine.try_query_batch(&pairs, None),
            Err(QueryError::InvalidCoordinate { row: 1, .. })
        ));
    }

    #[test]
    fn checked_batch_honours_deadline() {
        let network = equator_chain(11);
        let engine = ShortestPathEngine::new(&network);
        let pairs = [(GeoPoint::new(0.1, 0.0), GeoPoint::new(0.1, 10.0))];
        let past = Instant::now().checked_sub(Duration::from_secs(1));
        assert_eq!(
            engine.try_query_batch(&pairs, past),
            Err(QueryError::DeadlineExceeded { rows: 1 })
        );
        let future = Instant::now() + Duration::from_secs(60);
        assert_eq!(engine.try_query_batch(&pairs, Some(future)).unwrap().len(), 1);
    }
}
