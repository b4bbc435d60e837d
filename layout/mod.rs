/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Force-directed layout engine.
//!
//! A continuous simulation in the d3-force mold: per-tick alpha relaxation
//! followed by a fixed force stack and velocity integration. On top of the
//! standard center/springs/many-body trio it carries the two forces this
//! visualizer depends on: a per-kind Y-band pull and a hard boundary clamp
//! that deliberately ignores the decaying alpha.

use euclid::default::{Point2D, Vector2D};
use rand::Rng;
use std::collections::HashMap;

use crate::graph::{GraphStore, NODE_RADIUS, NodeKey, Viewport};

/// Simulation stops stepping once alpha drops below this.
const ALPHA_MIN: f32 = 0.001;

/// Decay chosen so a cold start settles in roughly 300 ticks.
const ALPHA_DECAY: f32 = 0.022_8;

/// d3 convention: velocities shed 40% per tick.
const VELOCITY_DECAY: f32 = 0.4;

/// alphaTarget raised to this while something is in motion (mutation,
/// resize, drag) so the sim stays hot until the disturbance ends.
const REHEAT_TARGET: f32 = 0.3;

/// Weak pull toward the horizontal mid-line.
const CENTER_X_STRENGTH: f32 = 0.1;

/// Spring rest length.
const SPRING_DISTANCE: f32 = 30.0;

/// Synchronous ticks run on the first resize so the graph is visually
/// settled before first paint.
const PRESETTLE_TICKS: usize = 200;

/// One spring, precomputed from the edge set by [`LayoutEngine::sync`].
struct Spring {
    a: NodeKey,
    b: NodeKey,
    /// `1 / min(deg a, deg b)`, scaled by both endpoints' link scale.
    strength: f32,
    /// Degree bias: the lighter-connected endpoint absorbs more movement.
    bias: f32,
}

/// The simulation. Owns all force state explicitly; tick and interaction
/// handlers receive it by reference, there is no hidden shared object.
pub struct LayoutEngine {
    viewport: Viewport,
    alpha: f32,
    alpha_target: f32,
    springs: Vec<Spring>,
    /// First-resize latch: positions reseed and the sim pre-settles once.
    seeded: bool,
}

impl LayoutEngine {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            alpha: 1.0,
            alpha_target: 0.0,
            springs: Vec::new(),
            seeded: false,
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Whether the simulation still wants ticks.
    pub fn is_hot(&self) -> bool {
        self.alpha >= ALPHA_MIN || self.alpha_target > 0.0
    }

    /// Raise the alpha target and resume: called whenever the node/edge
    /// set changes, the viewport resizes, or a drag begins.
    pub fn reheat(&mut self) {
        self.alpha_target = REHEAT_TARGET;
        self.alpha = self.alpha.max(REHEAT_TARGET);
    }

    /// Let the simulation cool back down (drag ended).
    pub fn cool(&mut self) {
        self.alpha_target = 0.0;
    }

    /// One-shot heat for mutations and resizes. Unlike [`reheat`], the
    /// target stays at zero so the simulation settles again on its own.
    ///
    /// [`reheat`]: LayoutEngine::reheat
    pub fn kick(&mut self) {
        self.alpha = self.alpha.max(REHEAT_TARGET);
    }

    /// Stop the simulation outright (view teardown).
    pub fn halt(&mut self) {
        self.alpha = 0.0;
        self.alpha_target = 0.0;
    }

    /// Rebuild the spring table from the store's current edge set.
    pub fn sync(&mut self, store: &GraphStore) {
        let mut degrees: HashMap<NodeKey, f32> = HashMap::new();
        for (a, b, _) in store.edges_keyed() {
            *degrees.entry(a).or_default() += 1.0;
            *degrees.entry(b).or_default() += 1.0;
        }
        self.springs = store
            .edges_keyed()
            .filter(|(a, b, _)| a != b)
            .map(|(a, b, _)| {
                let deg_a = degrees[&a];
                let deg_b = degrees[&b];
                let scale = link_scale(store, a) * link_scale(store, b);
                Spring {
                    a,
                    b,
                    strength: scale / deg_a.min(deg_b),
                    bias: deg_a / (deg_a + deg_b),
                }
            })
            .collect();
    }

    /// Resize the viewport. The first resize after construction also
    /// reseeds every position and pre-runs the settle ticks.
    pub fn resize(&mut self, store: &mut GraphStore, viewport: Viewport) {
        self.viewport = viewport;
        if !self.seeded {
            self.seeded = true;
            self.reseed(store);
            self.alpha = 1.0;
            for _ in 0..PRESETTLE_TICKS {
                self.tick(store);
            }
        }
        self.kick();
    }

    fn reseed(&mut self, store: &mut GraphStore) {
        let viewport = self.viewport;
        let mut rng = rand::thread_rng();
        for node in store.nodes_mut() {
            let band = node.kind().band(viewport);
            let jitter = if viewport.width > 4.0 * NODE_RADIUS {
                rng.gen_range(-viewport.width / 4.0..=viewport.width / 4.0)
            } else {
                0.0
            };
            node.position = Point2D::new(viewport.width / 2.0 + jitter, band.midpoint());
            node.velocity = Vector2D::zero();
        }
    }

    /// One simulation step: alpha relaxation, force stack, integration.
    pub fn tick(&mut self, store: &mut GraphStore) {
        self.alpha += (self.alpha_target - self.alpha) * ALPHA_DECAY;
        let alpha = self.alpha;

        self.apply_center_x(store, alpha);
        self.apply_band_y(store, alpha);
        self.apply_springs(store, alpha);
        self.apply_many_body(store, alpha);
        // Bounds run last and unscaled so they stay hard as the sim cools.
        self.apply_bounds(store);

        for node in store.nodes_mut() {
            if let Some(pin) = node.pinned {
                node.position = pin;
                node.velocity = Vector2D::zero();
                continue;
            }
            node.velocity *= 1.0 - VELOCITY_DECAY;
            node.position += node.velocity;
        }
    }

    fn apply_center_x(&self, store: &mut GraphStore, alpha: f32) {
        let mid = self.viewport.width / 2.0;
        for node in store.nodes_mut() {
            node.velocity.x += (mid - node.position.x) * CENTER_X_STRENGTH * alpha;
        }
    }

    fn apply_band_y(&self, store: &mut GraphStore, alpha: f32) {
        let viewport = self.viewport;
        for node in store.nodes_mut() {
            let kind = node.kind();
            let target = kind.band(viewport).midpoint();
            node.velocity.y += (target - node.position.y) * kind.policy().band_strength * alpha;
        }
    }

    fn apply_springs(&self, store: &mut GraphStore, alpha: f32) {
        for spring in &self.springs {
            let Some((na, nb)) = store.endpoints_mut(spring.a, spring.b) else {
                continue;
            };
            let mut delta = (nb.position + nb.velocity) - (na.position + na.velocity);
            if delta.square_length() < f32::EPSILON {
                delta = Vector2D::new(0.1, 0.1);
            }
            let dist = delta.length();
            let displacement = (dist - SPRING_DISTANCE) / dist * alpha * spring.strength;
            let push = delta * displacement;
            nb.velocity -= push * spring.bias;
            na.velocity += push * (1.0 - spring.bias);
        }
    }

    fn apply_many_body(&self, store: &mut GraphStore, alpha: f32) {
        // Naive pairwise pass: diagnostic graphs stay small enough that a
        // quadtree would be overhead, not savings.
        let bodies: Vec<(NodeKey, Point2D<f32>, f32)> = store
            .nodes()
            .map(|(key, node)| (key, node.position, node.kind().policy().many_body_strength))
            .collect();
        for (key, position, _) in &bodies {
            let mut push = Vector2D::zero();
            for (other_key, other_position, other_strength) in &bodies {
                if other_key == key {
                    continue;
                }
                let delta = *other_position - *position;
                let dist_sq = delta.square_length().max(1.0);
                push += delta * (other_strength * alpha / dist_sq);
            }
            if let Some(node) = store.node_by_key_mut(*key) {
                node.velocity += push;
            }
        }
    }

    /// Predict each node's next position; if it would leave its Y band or
    /// the viewport's X range, correct the velocity so integration lands
    /// exactly on the clamp. No alpha scaling: boundaries are not springs.
    fn apply_bounds(&self, store: &mut GraphStore) {
        let viewport = self.viewport;
        let x_min = 2.0 * NODE_RADIUS;
        let x_max = viewport.width - 2.0 * NODE_RADIUS;
        for node in store.nodes_mut() {
            if node.pinned.is_some() {
                continue;
            }
            let band = node.kind().band(viewport);
            let proposed = node.position + node.velocity * (1.0 - VELOCITY_DECAY);
            let clamped = Point2D::new(
                proposed.x.clamp(x_min, x_max.max(x_min)),
                proposed.y.clamp(band.min, band.max.max(band.min)),
            );
            if clamped != proposed {
                // Divide by the decay factor so the post-decay velocity
                // still carries the full correction.
                node.velocity += (clamped - proposed) / (1.0 - VELOCITY_DECAY);
            }
        }
    }
}

fn link_scale(store: &GraphStore, key: NodeKey) -> f32 {
    store
        .node_by_key(key)
        .map(|node| node.kind().policy().link_scale)
        .unwrap_or(1.0)
}
