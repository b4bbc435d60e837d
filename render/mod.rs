/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Scene reconciliation.
//!
//! Each tick the [`Reconciler`] diffs the graph model against what it last
//! told the scene and emits a [`SceneDiff`]: added/updated/removed node
//! and edge visuals. The concrete drawing backend (canvas, retained scene
//! graph, native toolkit) implements [`SceneBackend`] and applies diffs;
//! nothing in here touches a rendering context, which keeps reconciliation
//! testable headlessly.
//!
//! Lifecycle animation: new nodes enter oversized in the "new" color and
//! settle to their kind color; deleted nodes animate to the exit color and
//! radius 0 before the scene element is physically removed.

use euclid::default::Point2D;
use std::collections::{HashMap, HashSet};

use crate::graph::{EdgeStyle, GraphNode, GraphStore, NODE_RADIUS, NodeId, NodeKind};

/// Ticks a node spends in its entrance animation.
const ENTER_TICKS: u64 = 24;

/// Ticks a removed node lingers while its exit animation plays.
const EXIT_TICKS: u64 = 18;

/// Entrance starts at this multiple of the nominal radius.
const ENTER_RADIUS_SCALE: f32 = 2.5;

/// Fixed color every node enters with.
const NEW_NODE_COLOR: Rgb = Rgb {
    r: 0x4c,
    g: 0xaf,
    b: 0x50,
};

/// Fixed color a node fades to on its way out.
const EXIT_NODE_COLOR: Rgb = Rgb {
    r: 0x9e,
    g: 0x9e,
    b: 0x9e,
};

/// 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    /// Linear blend, `t` in `[0, 1]`.
    pub fn lerp(self, other: Rgb, t: f32) -> Rgb {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
        Rgb {
            r: mix(self.r, other.r),
            g: mix(self.g, other.g),
            b: mix(self.b, other.b),
        }
    }
}

/// Kind color from a node's process-derived hue.
pub fn kind_color(hue: f32) -> Rgb {
    hsl_to_rgb(hue, 0.6, 0.55)
}

/// HSL → RGB, `h` in degrees, `s`/`l` in `[0, 1]`.
fn hsl_to_rgb(h: f32, s: f32, l: f32) -> Rgb {
    let h = h.rem_euclid(360.0);
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let x = c * (1.0 - ((h / 60.0).rem_euclid(2.0) - 1.0).abs());
    let m = l - c / 2.0;
    let (r, g, b) = match h as u32 {
        0..=59 => (c, x, 0.0),
        60..=119 => (x, c, 0.0),
        120..=179 => (0.0, c, x),
        180..=239 => (0.0, x, c),
        240..=299 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let to8 = |v: f32| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgb {
        r: to8(r),
        g: to8(g),
        b: to8(b),
    }
}

/// Where a node sits in its visual lifecycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VisualPhase {
    Entering { progress: f32 },
    Steady,
    Exiting { progress: f32 },
}

/// Everything a backend needs to draw one node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeVisual {
    pub id: NodeId,
    pub position: Point2D<f32>,
    pub radius: f32,
    pub color: Rgb,
    pub title: String,
    pub has_favicon: bool,
    pub phase: VisualPhase,
}

/// Everything a backend needs to draw one edge. Endpoint positions are
/// re-read from the model every tick, never cached here.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeVisual {
    pub from: NodeId,
    pub to: NodeId,
    pub style: EdgeStyle,
    pub from_pos: Point2D<f32>,
    pub to_pos: Point2D<f32>,
}

/// One frame's worth of scene mutations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneDiff {
    pub added_nodes: Vec<NodeVisual>,
    pub updated_nodes: Vec<NodeVisual>,
    pub removed_nodes: Vec<NodeId>,
    pub added_edges: Vec<EdgeVisual>,
    pub updated_edges: Vec<EdgeVisual>,
    pub removed_edges: Vec<(NodeId, NodeId, EdgeStyle)>,
}

impl SceneDiff {
    /// True when the diff carries no structural change (updates may still
    /// be present; they are idempotent).
    pub fn is_structurally_empty(&self) -> bool {
        self.added_nodes.is_empty()
            && self.removed_nodes.is_empty()
            && self.added_edges.is_empty()
            && self.removed_edges.is_empty()
    }
}

/// Concrete rendering backend contract.
pub trait SceneBackend {
    fn apply(&mut self, diff: &SceneDiff);
}

/// Backend that records every diff; used by tests and headless hosts.
#[derive(Default)]
pub struct CollectingBackend {
    pub diffs: Vec<SceneDiff>,
}

impl SceneBackend for CollectingBackend {
    fn apply(&mut self, diff: &SceneDiff) {
        self.diffs.push(diff.clone());
    }
}

enum TrackPhase {
    Entering { started: u64 },
    Steady,
    Exiting { started: u64 },
}

struct NodeTrack {
    phase: TrackPhase,
    /// Last visual emitted while the node was live; the exit animation
    /// plays against this after the model entry is gone.
    last: NodeVisual,
}

/// Identity-keyed diffing between the graph model and the scene.
pub struct Reconciler {
    nodes: HashMap<NodeId, NodeTrack>,
    edges: HashSet<(NodeId, NodeId, EdgeStyle)>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: HashSet::new(),
        }
    }

    /// Whether any exit animation is still playing (the scene needs more
    /// frames even if the simulation is cold).
    pub fn has_pending_exits(&self) -> bool {
        self.nodes
            .values()
            .any(|track| matches!(track.phase, TrackPhase::Exiting { .. }))
    }

    /// Diff the store against the known scene at `tick`.
    ///
    /// Ticks must be non-decreasing. Calling twice at the same tick with
    /// an unchanged model yields a structurally empty second diff with
    /// value-identical updates.
    pub fn reconcile(&mut self, store: &GraphStore, tick: u64) -> SceneDiff {
        let mut diff = SceneDiff::default();

        // Nodes present in the model.
        let mut seen: HashSet<NodeId> = HashSet::new();
        for (_, node) in store.nodes() {
            let id = node.id();
            seen.insert(id);
            match self.nodes.get_mut(&id) {
                None => {
                    let visual = entering_visual(node, 0.0);
                    self.nodes.insert(
                        id,
                        NodeTrack {
                            phase: TrackPhase::Entering { started: tick },
                            last: visual.clone(),
                        },
                    );
                    diff.added_nodes.push(visual);
                }
                Some(track) => {
                    let visual = match track.phase {
                        TrackPhase::Entering { started } => {
                            let progress = animation_progress(started, tick, ENTER_TICKS);
                            if progress >= 1.0 {
                                track.phase = TrackPhase::Steady;
                                steady_visual(node)
                            } else {
                                entering_visual(node, progress)
                            }
                        }
                        TrackPhase::Steady => steady_visual(node),
                        // A deleted id must never be resurrected by the
                        // transport; if it is, restart the track cleanly.
                        TrackPhase::Exiting { .. } => {
                            log::warn!("node {id} reappeared while exiting; restarting visual");
                            track.phase = TrackPhase::Entering { started: tick };
                            entering_visual(node, 0.0)
                        }
                    };
                    track.last = visual.clone();
                    diff.updated_nodes.push(visual);
                }
            }
        }

        // Nodes the model dropped: play the exit animation, then remove.
        let mut finished: Vec<NodeId> = Vec::new();
        for (id, track) in self.nodes.iter_mut() {
            if seen.contains(id) {
                continue;
            }
            let started = match track.phase {
                TrackPhase::Exiting { started } => started,
                _ => {
                    track.phase = TrackPhase::Exiting { started: tick };
                    tick
                }
            };
            let progress = animation_progress(started, tick, EXIT_TICKS);
            if progress >= 1.0 {
                finished.push(*id);
            } else {
                // Animate from the last live visual; `last` stays frozen
                // as the exit baseline.
                let mut visual = track.last.clone();
                visual.color = visual.color.lerp(EXIT_NODE_COLOR, progress);
                visual.radius = track.last.radius * (1.0 - progress);
                visual.phase = VisualPhase::Exiting { progress };
                diff.updated_nodes.push(visual);
            }
        }
        for id in finished {
            self.nodes.remove(&id);
            diff.removed_nodes.push(id);
        }

        // Edges.
        let current: HashSet<(NodeId, NodeId, EdgeStyle)> = store
            .edges()
            .map(|e| (e.from, e.to, e.style))
            .collect();
        for &(from, to, style) in &current {
            let visual = edge_visual(store, from, to, style);
            if self.edges.contains(&(from, to, style)) {
                diff.updated_edges.extend(visual);
            } else {
                diff.added_edges.extend(visual);
            }
        }
        for &(from, to, style) in self.edges.difference(&current) {
            diff.removed_edges.push((from, to, style));
        }
        self.edges = current;

        diff
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

fn animation_progress(started: u64, now: u64, duration: u64) -> f32 {
    if duration == 0 {
        return 1.0;
    }
    (now.saturating_sub(started) as f32 / duration as f32).min(1.0)
}

fn title_for(node: &GraphNode) -> String {
    let kind = match node.kind() {
        NodeKind::Page => "Page",
        NodeKind::Frame => "Frame",
        NodeKind::Process => "Process",
        NodeKind::Worker => "Worker",
    };
    format!("{kind} {}", node.id())
}

fn entering_visual(node: &GraphNode, progress: f32) -> NodeVisual {
    let settled = kind_color(node.hue);
    NodeVisual {
        id: node.id(),
        position: node.position,
        radius: NODE_RADIUS * (ENTER_RADIUS_SCALE + (1.0 - ENTER_RADIUS_SCALE) * progress),
        color: NEW_NODE_COLOR.lerp(settled, progress),
        title: title_for(node),
        has_favicon: node.favicon.is_some(),
        phase: VisualPhase::Entering { progress },
    }
}

fn steady_visual(node: &GraphNode) -> NodeVisual {
    NodeVisual {
        id: node.id(),
        position: node.position,
        radius: NODE_RADIUS,
        color: kind_color(node.hue),
        title: title_for(node),
        has_favicon: node.favicon.is_some(),
        phase: VisualPhase::Steady,
    }
}

fn edge_visual(
    store: &GraphStore,
    from: NodeId,
    to: NodeId,
    style: EdgeStyle,
) -> Option<EdgeVisual> {
    let from_node = store.get(from)?;
    let to_node = store.get(to)?;
    Some(EdgeVisual {
        from,
        to,
        style,
        from_pos: from_node.position,
        to_pos: to_node.position,
    })
}
