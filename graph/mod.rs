/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Graph data structures for the object-graph visualizer.
//!
//! Core structures:
//! - `GraphStore`: id-indexed graph container backed by petgraph::StableGraph
//! - `GraphNode`: one visualized node with position, velocity, and pin state
//! - `NodeData`: per-kind payload descriptor (Page/Frame/Process/Worker)
//!
//! Boundary: topology mutators are `pub(crate)`; the view's event reducer
//! is the single write path; callers outside it are invariant violations.

use euclid::default::{Point2D, Vector2D};
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::{Directed, Direction};
use rand::Rng;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;

/// Stable node handle (petgraph NodeIndex, survives other deletions)
pub type NodeKey = NodeIndex;

/// Stable edge handle (petgraph EdgeIndex)
pub type EdgeKey = EdgeIndex;

/// Nominal node radius in scene units. The boundary force insets the
/// viewport by multiples of this so circles never clip the edges.
pub const NODE_RADIUS: f32 = 6.0;

/// Transport-assigned 64-bit node identity, stable for the node's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Node kind, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Page,
    Frame,
    Process,
    Worker,
}

/// Viewport dimensions supplied by the embedding page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Allowed vertical range for a node kind, resolved against a viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub min: f32,
    pub max: f32,
}

impl Band {
    pub fn midpoint(&self) -> f32 {
        (self.min + self.max) / 2.0
    }

    pub fn contains(&self, y: f32) -> bool {
        y >= self.min && y <= self.max
    }
}

/// Per-kind layout policy, a pure function of the kind tag.
///
/// `y_band` is in fractions of viewport height. Pages band the top,
/// processes the bottom, workers sit above the processes; frames float
/// across the middle with a weak pull so spring forces place them between
/// their page and their process.
#[derive(Debug, Clone, Copy)]
pub struct KindPolicy {
    pub y_band: (f32, f32),
    pub band_strength: f32,
    pub many_body_strength: f32,
    pub link_scale: f32,
}

impl NodeKind {
    pub fn policy(self) -> KindPolicy {
        match self {
            NodeKind::Page => KindPolicy {
                y_band: (0.0, 0.25),
                band_strength: 1.0,
                many_body_strength: -200.0,
                // Page↔Frame springs run at half strength so the band pull
                // dominates page placement.
                link_scale: 0.5,
            },
            NodeKind::Frame => KindPolicy {
                y_band: (0.25, 0.75),
                band_strength: 0.1,
                many_body_strength: -50.0,
                link_scale: 1.0,
            },
            NodeKind::Worker => KindPolicy {
                y_band: (0.5, 0.75),
                band_strength: 1.0,
                many_body_strength: -200.0,
                link_scale: 1.0,
            },
            NodeKind::Process => KindPolicy {
                y_band: (0.75, 1.0),
                band_strength: 1.0,
                many_body_strength: -200.0,
                link_scale: 1.0,
            },
        }
    }

    /// Resolve this kind's Y band against a viewport, inset by the node
    /// radius so a node centered on the band edge still fits.
    pub fn band(self, viewport: Viewport) -> Band {
        let (lo, hi) = self.policy().y_band;
        Band {
            min: lo * viewport.height + NODE_RADIUS,
            max: hi * viewport.height - NODE_RADIUS,
        }
    }
}

/// Page payload. Opener/embedder links can change over the page's life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PageDescriptor {
    pub id: NodeId,
    pub opener_frame_id: Option<NodeId>,
    pub embedder_frame_id: Option<NodeId>,
}

/// Frame payload. Link inputs are fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct FrameDescriptor {
    pub id: NodeId,
    pub parent_frame_id: Option<NodeId>,
    pub page_id: NodeId,
    pub process_id: NodeId,
}

/// Process payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ProcessDescriptor {
    pub id: NodeId,
    pub pid: u32,
}

/// Worker payload. Client/child sets can change over the worker's life.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkerDescriptor {
    pub id: NodeId,
    pub process_id: NodeId,
    #[serde(default)]
    pub client_frame_ids: Vec<NodeId>,
    #[serde(default)]
    pub client_worker_ids: Vec<NodeId>,
    #[serde(default)]
    pub child_worker_ids: Vec<NodeId>,
}

/// Per-kind payload, the tagged union behind every [`GraphNode`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NodeData {
    Page(PageDescriptor),
    Frame(FrameDescriptor),
    Process(ProcessDescriptor),
    Worker(WorkerDescriptor),
}

impl NodeData {
    pub fn id(&self) -> NodeId {
        match self {
            NodeData::Page(p) => p.id,
            NodeData::Frame(f) => f.id,
            NodeData::Process(p) => p.id,
            NodeData::Worker(w) => w.id,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            NodeData::Page(_) => NodeKind::Page,
            NodeData::Frame(_) => NodeKind::Frame,
            NodeData::Process(_) => NodeKind::Process,
            NodeData::Worker(_) => NodeKind::Worker,
        }
    }

    /// Solid "reference" link targets declared by this payload.
    pub fn solid_link_targets(&self) -> Vec<NodeId> {
        match self {
            NodeData::Page(_) | NodeData::Process(_) => Vec::new(),
            NodeData::Frame(f) => {
                let mut targets = Vec::with_capacity(3);
                if let Some(parent) = f.parent_frame_id {
                    targets.push(parent);
                }
                targets.push(f.page_id);
                targets.push(f.process_id);
                targets
            }
            NodeData::Worker(w) => {
                let mut targets =
                    Vec::with_capacity(1 + w.client_frame_ids.len() + w.client_worker_ids.len());
                targets.push(w.process_id);
                targets.extend(w.client_frame_ids.iter().copied());
                targets.extend(w.client_worker_ids.iter().copied());
                targets
            }
        }
    }

    /// Dashed "ownership" link targets declared by this payload.
    pub fn dashed_link_targets(&self) -> Vec<NodeId> {
        match self {
            NodeData::Page(p) => {
                let mut targets = Vec::with_capacity(2);
                if let Some(opener) = p.opener_frame_id {
                    targets.push(opener);
                }
                if let Some(embedder) = p.embedder_frame_id {
                    targets.push(embedder);
                }
                targets
            }
            NodeData::Worker(w) => w.child_worker_ids.clone(),
            NodeData::Frame(_) | NodeData::Process(_) => Vec::new(),
        }
    }

    /// The process whose identity drives this node's hue, when one exists.
    pub fn owning_process_id(&self) -> Option<NodeId> {
        match self {
            NodeData::Page(_) => None,
            NodeData::Frame(f) => Some(f.process_id),
            NodeData::Process(p) => Some(p.id),
            NodeData::Worker(w) => Some(w.process_id),
        }
    }
}

/// Deterministic hue in `[0, 360)` from an id, so nodes sharing a process
/// cluster by color. splitmix64 finalizer for avalanche.
pub fn hue_for_id(id: NodeId) -> f32 {
    let mut z = id.0.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^= z >> 31;
    (z % 360) as f32
}

/// One visualized node: payload plus simulation state.
#[derive(Debug, Clone)]
pub struct GraphNode {
    /// Per-kind payload descriptor; link policy is derived from it.
    pub data: NodeData,

    /// Position in scene space, mutated only by the layout engine.
    pub position: Point2D<f32>,

    /// Velocity for the physics simulation.
    pub velocity: Vector2D<f32>,

    /// Fixed position set by drag interactions; `Some` excludes the node
    /// from force-driven movement.
    pub pinned: Option<Point2D<f32>>,

    /// Hue derived from the owning process id (own id fallback for pages).
    pub hue: f32,

    /// Favicon bytes, set asynchronously when icon data arrives.
    pub favicon: Option<Vec<u8>>,
}

impl GraphNode {
    pub fn id(&self) -> NodeId {
        self.data.id()
    }

    pub fn kind(&self) -> NodeKind {
        self.data.kind()
    }
}

/// Edge class: general reference vs. directional ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeStyle {
    Solid,
    Dashed,
}

/// Read-only edge projection with endpoints resolved to stable ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeView {
    pub from: NodeId,
    pub to: NodeId,
    pub style: EdgeStyle,
}

/// Store-level invariant violations. The upstream event stream is assumed
/// authoritative, so these indicate desynchronization, not normal flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    UnknownNode(NodeId),
    DuplicateNode(NodeId),
    KindMismatch(NodeId),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::UnknownNode(id) => write!(f, "unknown node id {id}"),
            StoreError::DuplicateNode(id) => write!(f, "duplicate node id {id}"),
            StoreError::KindMismatch(id) => {
                write!(f, "update would change the kind of node id {id}")
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// Main graph container backed by petgraph::StableGraph.
pub struct GraphStore {
    inner: StableGraph<GraphNode, EdgeStyle, Directed>,

    /// Stable transport id to node key mapping.
    id_to_key: HashMap<NodeId, NodeKey>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self {
            inner: StableGraph::new(),
            id_to_key: HashMap::new(),
        }
    }

    /// Insert a node, seed its initial position from the viewport, and
    /// compute its declared edges.
    ///
    /// Targets not yet present in the store are silently skipped; they are
    /// never retroactively added unless this node is later updated. Initial
    /// Y is the kind band midpoint; X jitters around the horizontal center.
    pub(crate) fn add_node(
        &mut self,
        data: NodeData,
        viewport: Viewport,
    ) -> Result<NodeKey, StoreError> {
        let id = data.id();
        if self.id_to_key.contains_key(&id) {
            return Err(StoreError::DuplicateNode(id));
        }

        let hue = hue_for_id(data.owning_process_id().unwrap_or(id));
        let position = initial_position(data.kind(), viewport);
        let key = self.inner.add_node(GraphNode {
            data,
            position,
            velocity: Vector2D::zero(),
            pinned: None,
            hue,
            favicon: None,
        });
        self.id_to_key.insert(id, key);
        self.link_declared_edges(key);
        Ok(key)
    }

    /// Remove a node, its incident edges (both directions, both styles),
    /// and return its final state. Unknown ids are invariant violations.
    pub(crate) fn remove_node(&mut self, id: NodeId) -> Result<GraphNode, StoreError> {
        let key = self
            .id_to_key
            .remove(&id)
            .ok_or(StoreError::UnknownNode(id))?;
        // StableGraph drops incident edges with the node.
        self.inner
            .remove_node(key)
            .ok_or(StoreError::UnknownNode(id))
    }

    /// Replace a node's payload and relink: drop its outgoing edges and
    /// recompute them from the new policy values. This is the only moment
    /// a previously-skipped target can gain its edge.
    ///
    /// Kind is fixed at creation; a payload of a different kind is
    /// rejected without touching the node.
    pub(crate) fn update_node(&mut self, data: NodeData) -> Result<(), StoreError> {
        let id = data.id();
        let key = *self.id_to_key.get(&id).ok_or(StoreError::UnknownNode(id))?;

        let node = self
            .inner
            .node_weight_mut(key)
            .ok_or(StoreError::UnknownNode(id))?;
        if node.kind() != data.kind() {
            return Err(StoreError::KindMismatch(id));
        }
        node.hue = hue_for_id(data.owning_process_id().unwrap_or(id));
        node.data = data;

        let outgoing: Vec<EdgeKey> = self
            .inner
            .edges_directed(key, Direction::Outgoing)
            .map(|e| e.id())
            .collect();
        for edge in outgoing {
            let _ = self.inner.remove_edge(edge);
        }
        self.link_declared_edges(key);
        Ok(())
    }

    /// Best-effort favicon update; `false` when the node no longer exists.
    pub(crate) fn favicon_arrived(&mut self, id: NodeId, bytes: Vec<u8>) -> bool {
        match self.get_mut(id) {
            Some(node) => {
                node.favicon = Some(bytes);
                true
            }
            None => false,
        }
    }

    fn link_declared_edges(&mut self, key: NodeKey) {
        let Some(node) = self.inner.node_weight(key) else {
            return;
        };
        let solid = node.data.solid_link_targets();
        let dashed = node.data.dashed_link_targets();
        for target in solid {
            if let Some(&target_key) = self.id_to_key.get(&target) {
                self.inner.add_edge(key, target_key, EdgeStyle::Solid);
            }
        }
        for target in dashed {
            if let Some(&target_key) = self.id_to_key.get(&target) {
                self.inner.add_edge(key, target_key, EdgeStyle::Dashed);
            }
        }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.id_to_key.contains_key(&id)
    }

    pub fn get(&self, id: NodeId) -> Option<&GraphNode> {
        let key = *self.id_to_key.get(&id)?;
        self.inner.node_weight(key)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut GraphNode> {
        let key = *self.id_to_key.get(&id)?;
        self.inner.node_weight_mut(key)
    }

    pub fn key_of(&self, id: NodeId) -> Option<NodeKey> {
        self.id_to_key.get(&id).copied()
    }

    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// Iterate all nodes as (key, node) pairs.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeKey, &GraphNode)> {
        self.inner
            .node_indices()
            .map(move |idx| (idx, &self.inner[idx]))
    }

    /// Layout-only mutable iteration over simulation state.
    pub(crate) fn nodes_mut(&mut self) -> impl Iterator<Item = &mut GraphNode> {
        self.inner.node_weights_mut()
    }

    pub(crate) fn node_by_key(&self, key: NodeKey) -> Option<&GraphNode> {
        self.inner.node_weight(key)
    }

    pub(crate) fn node_by_key_mut(&mut self, key: NodeKey) -> Option<&mut GraphNode> {
        self.inner.node_weight_mut(key)
    }

    /// Both endpoints of a spring, mutably. `None` for self-loops or
    /// vacated keys.
    pub(crate) fn endpoints_mut(
        &mut self,
        a: NodeKey,
        b: NodeKey,
    ) -> Option<(&mut GraphNode, &mut GraphNode)> {
        if a == b || self.inner.node_weight(a).is_none() || self.inner.node_weight(b).is_none() {
            return None;
        }
        let (na, nb) = self.inner.index_twice_mut(a, b);
        Some((na, nb))
    }

    /// Iterate all edges as id-resolved views.
    pub fn edges(&self) -> impl Iterator<Item = EdgeView> + '_ {
        self.inner.edge_references().map(|e| EdgeView {
            from: self.inner[e.source()].id(),
            to: self.inner[e.target()].id(),
            style: *e.weight(),
        })
    }

    /// Iterate edges by node key, for the layout's spring table.
    pub(crate) fn edges_keyed(&self) -> impl Iterator<Item = (NodeKey, NodeKey, EdgeStyle)> + '_ {
        self.inner
            .edge_references()
            .map(|e| (e.source(), e.target(), *e.weight()))
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Seed position: band midpoint vertically, jittered around the
/// horizontal center so coincident arrivals do not stack exactly.
fn initial_position(kind: NodeKind, viewport: Viewport) -> Point2D<f32> {
    let band = kind.band(viewport);
    let mut rng = rand::thread_rng();
    let jitter = if viewport.width > 4.0 * NODE_RADIUS {
        rng.gen_range(-viewport.width / 4.0..=viewport.width / 4.0)
    } else {
        0.0
    };
    Point2D::new(viewport.width / 2.0 + jitter, band.midpoint())
}
