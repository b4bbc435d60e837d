/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The graph view: owns the store, the layout engine, the reconciler and
//! the open tooltips, and wires interaction into all of them.
//!
//! Everything here runs on one logical thread. Mutation events arrive on
//! a channel from the external transport and are drained at the top of
//! each frame, in order; the store assumes a "changed" or "deleted" event
//! is never delivered before its "created" event. Description content
//! flows on its own cadence through [`DescriptionPoller`], surfaced to
//! the host as [`ViewRequest`] values the host answers with
//! [`GraphView::descriptions_arrived`].

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use crossbeam_channel::{Receiver, Sender, unbounded};
use euclid::default::{Point2D, Vector2D};
use std::collections::HashMap;
use std::time::Instant;

use crate::graph::{GraphStore, NodeData, NodeId, Viewport};
use crate::layout::LayoutEngine;
use crate::render::{Reconciler, SceneBackend};
use crate::tooltip::{DescriptionPoller, Tooltip};

/// Offset of a floating tooltip's anchor from its node center.
const TOOLTIP_OFFSET_X: f32 = 10.0;
const TOOLTIP_OFFSET_Y: f32 = 10.0;

/// One lifecycle event from the external transport.
#[derive(Debug, Clone)]
pub enum GraphChangeEvent {
    NodeCreated(NodeData),
    NodeChanged(NodeData),
    NodeDeleted(NodeId),
    /// Base64-encoded icon bytes; best-effort, applied only if the node
    /// still exists.
    FavIconData { id: NodeId, data: String },
}

/// Something the view needs the embedding host to do on its behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewRequest {
    RequestNodeDescriptions(Vec<NodeId>),
}

/// Leader line from a pinned tooltip to its owning node, recomputed every
/// frame from current positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeaderLine {
    pub tooltip: Point2D<f32>,
    pub node: Point2D<f32>,
}

pub struct GraphView {
    store: GraphStore,
    layout: LayoutEngine,
    reconciler: Reconciler,
    tooltips: HashMap<NodeId, Tooltip>,
    poller: DescriptionPoller,
    inbox: Receiver<GraphChangeEvent>,
    tick: u64,
    /// Set when the node/edge set changes; the next frame rebuilds the
    /// spring table and restarts the simulation.
    dirty: bool,
}

impl GraphView {
    /// Build a view for the given viewport. The returned sender is handed
    /// to the transport; events queue until the next [`frame`].
    ///
    /// [`frame`]: GraphView::frame
    pub fn new(viewport: Viewport) -> (Self, Sender<GraphChangeEvent>) {
        let (sender, inbox) = unbounded();
        let view = Self {
            store: GraphStore::new(),
            layout: LayoutEngine::new(viewport),
            reconciler: Reconciler::new(),
            tooltips: HashMap::new(),
            poller: DescriptionPoller::new(),
            inbox,
            tick: 0,
            dirty: false,
        };
        (view, sender)
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn tooltip(&self, id: NodeId) -> Option<&Tooltip> {
        self.tooltips.get(&id)
    }

    pub fn open_tooltip_count(&self) -> usize {
        self.tooltips.len()
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_polling()
    }

    /// Whether the host should keep scheduling frames: the simulation is
    /// hot or an exit animation is still playing.
    pub fn needs_frames(&self) -> bool {
        self.layout.is_hot() || self.reconciler.has_pending_exits()
    }

    /// Apply one transport event. Returns whether the node/edge set
    /// changed. Events that violate the transport's ordering contract are
    /// logged and dropped, never fatal.
    pub fn apply_event(&mut self, event: GraphChangeEvent) -> bool {
        let changed = match event {
            GraphChangeEvent::NodeCreated(data) => {
                let id = data.id();
                match self.store.add_node(data, self.layout.viewport()) {
                    Ok(_) => true,
                    Err(err) => {
                        log::error!("create of node {id} rejected: {err}");
                        false
                    }
                }
            }
            GraphChangeEvent::NodeChanged(data) => {
                let id = data.id();
                match self.store.update_node(data) {
                    Ok(()) => true,
                    Err(err) => {
                        log::error!("change for node {id} rejected: {err}");
                        false
                    }
                }
            }
            GraphChangeEvent::NodeDeleted(id) => {
                // The tooltip goes immediately, even though the node's
                // exit animation keeps it on screen a little longer.
                self.tooltips.remove(&id);
                match self.store.remove_node(id) {
                    Ok(_) => true,
                    Err(err) => {
                        log::error!("delete of node {id} rejected: {err}");
                        false
                    }
                }
            }
            GraphChangeEvent::FavIconData { id, data } => {
                match BASE64.decode(data.as_bytes()) {
                    Ok(bytes) => {
                        self.store.favicon_arrived(id, bytes);
                    }
                    Err(err) => log::warn!("undecodable favicon for node {id}: {err}"),
                }
                false
            }
        };
        self.dirty |= changed;
        changed
    }

    /// One frame: drain queued events, step the simulation if hot, diff
    /// the scene into the backend and re-anchor tooltips.
    pub fn frame(&mut self, backend: &mut dyn SceneBackend) {
        while let Ok(event) = self.inbox.try_recv() {
            self.apply_event(event);
        }
        // Mutations from either delivery path (direct apply_event calls or
        // the inbox drain above) land here.
        if self.dirty {
            self.dirty = false;
            self.layout.sync(&self.store);
            self.layout.kick();
        }
        if self.layout.is_hot() {
            self.layout.tick(&mut self.store);
        }

        let diff = self.reconciler.reconcile(&self.store, self.tick);
        backend.apply(&diff);
        self.tick += 1;

        for tooltip in self.tooltips.values_mut() {
            if tooltip.is_floating() {
                if let Some(node) = self.store.get(tooltip.node_id) {
                    tooltip.position =
                        node.position + Vector2D::new(TOOLTIP_OFFSET_X, TOOLTIP_OFFSET_Y);
                }
            }
        }
    }

    /// Leader lines for pinned tooltips, from current positions.
    pub fn leader_lines(&self) -> Vec<LeaderLine> {
        self.tooltips
            .values()
            .filter(|t| !t.is_floating())
            .filter_map(|t| {
                let node = self.store.get(t.node_id)?;
                Some(LeaderLine {
                    tooltip: t.position,
                    node: node.position,
                })
            })
            .collect()
    }

    /// Toggle the tooltip for a node. Opening issues an immediate
    /// description request and arms the poller; closing issues nothing
    /// and lets the poller wind down on its own.
    pub fn node_clicked(&mut self, id: NodeId, now: Instant) -> Option<ViewRequest> {
        if self.tooltips.remove(&id).is_some() {
            return None;
        }
        let node = self.store.get(id)?;
        let anchor = node.position + Vector2D::new(TOOLTIP_OFFSET_X, TOOLTIP_OFFSET_Y);
        self.tooltips.insert(id, Tooltip::new(id, anchor));
        self.poller.arm(now);
        Some(ViewRequest::RequestNodeDescriptions(self.open_tooltip_ids()))
    }

    /// Drag start pins the node where it stands and heats the simulation
    /// for the duration of the drag.
    pub fn drag_started(&mut self, id: NodeId) {
        let Some(node) = self.store.get_mut(id) else {
            return;
        };
        node.pinned = Some(node.position);
        self.layout.reheat();
    }

    pub fn drag_moved(&mut self, id: NodeId, position: Point2D<f32>) {
        if let Some(node) = self.store.get_mut(id) {
            node.pinned = Some(position);
            node.position = position;
        }
    }

    /// Drop inside the node's band keeps the pin; outside releases it and
    /// lets the forces reclaim the node.
    pub fn drag_ended(&mut self, id: NodeId, position: Point2D<f32>) {
        let viewport = self.layout.viewport();
        if let Some(node) = self.store.get_mut(id) {
            if node.kind().band(viewport).contains(position.y) {
                node.pinned = Some(position);
                node.position = position;
            } else {
                node.pinned = None;
            }
        }
        self.layout.cool();
    }

    pub fn tooltip_drag_started(&mut self, id: NodeId) {
        if let Some(tooltip) = self.tooltips.get_mut(&id) {
            tooltip.begin_drag();
        }
    }

    pub fn tooltip_drag_moved(&mut self, id: NodeId, position: Point2D<f32>) {
        if let Some(tooltip) = self.tooltips.get_mut(&id) {
            tooltip.position = position;
        }
    }

    /// Collapse or expand one nested object in a node's tooltip.
    pub fn tooltip_row_clicked(&mut self, id: NodeId, object_index: usize) {
        if let Some(tooltip) = self.tooltips.get_mut(&id) {
            tooltip.toggle_object(object_index);
        }
    }

    pub fn resize(&mut self, width: f32, height: f32) {
        self.layout.resize(&mut self.store, Viewport::new(width, height));
    }

    /// Best-effort answer to a description request; ids missing from the
    /// map keep their last-known content.
    pub fn descriptions_arrived(&mut self, descriptions: &HashMap<NodeId, String>) {
        for (id, tooltip) in self.tooltips.iter_mut() {
            if let Some(serialized) = descriptions.get(id) {
                tooltip.update_content(serialized);
            }
        }
    }

    /// Host interval callback. Fires a request while tooltips are open;
    /// the first call that finds none disarms the poller.
    pub fn poll_timer_fired(&mut self, now: Instant) -> Option<ViewRequest> {
        if self.poller.tick(now, self.tooltips.len()) {
            Some(ViewRequest::RequestNodeDescriptions(self.open_tooltip_ids()))
        } else {
            None
        }
    }

    /// Full teardown: poll loop stopped, simulation and scene discarded.
    pub fn shutdown(&mut self) {
        self.tooltips.clear();
        self.poller = DescriptionPoller::new();
        self.store = GraphStore::new();
        self.layout = LayoutEngine::new(self.layout.viewport());
        self.layout.halt();
        self.reconciler = Reconciler::new();
        self.tick = 0;
        self.dirty = false;
    }

    fn open_tooltip_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.tooltips.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{FrameDescriptor, PageDescriptor, ProcessDescriptor};
    use crate::render::CollectingBackend;
    use crate::tooltip::POLL_INTERVAL;

    const VIEWPORT: Viewport = Viewport {
        width: 800.0,
        height: 600.0,
    };

    fn page(id: u64) -> NodeData {
        NodeData::Page(PageDescriptor {
            id: NodeId(id),
            opener_frame_id: None,
            embedder_frame_id: None,
        })
    }

    fn frame_node(id: u64, page_id: u64, process_id: u64) -> NodeData {
        NodeData::Frame(FrameDescriptor {
            id: NodeId(id),
            parent_frame_id: None,
            page_id: NodeId(page_id),
            process_id: NodeId(process_id),
        })
    }

    fn view_with_page() -> GraphView {
        let (mut view, _) = GraphView::new(VIEWPORT);
        view.apply_event(GraphChangeEvent::NodeCreated(page(1)));
        view
    }

    #[test]
    fn queued_events_are_applied_in_order_on_frame() {
        let (mut view, sender) = GraphView::new(VIEWPORT);
        sender
            .send(GraphChangeEvent::NodeCreated(page(1)))
            .unwrap();
        sender
            .send(GraphChangeEvent::NodeCreated(frame_node(2, 1, 100)))
            .unwrap();
        sender.send(GraphChangeEvent::NodeDeleted(NodeId(1))).unwrap();

        let mut backend = CollectingBackend::default();
        view.frame(&mut backend);

        assert_eq!(view.store().node_count(), 1);
        assert!(!view.store().contains(NodeId(1)));
        assert!(view.store().contains(NodeId(2)));
    }

    #[test]
    fn direct_events_restart_a_settled_simulation() {
        let mut view = view_with_page();
        let mut backend = CollectingBackend::default();
        for _ in 0..600 {
            view.frame(&mut backend);
        }
        assert!(!view.needs_frames());

        // Delivered directly, not through the inbox: the next frame must
        // still rebuild the springs and wake the simulation.
        view.apply_event(GraphChangeEvent::NodeCreated(frame_node(2, 1, 100)));
        let seeded = view.store().get(NodeId(2)).unwrap().position;
        view.frame(&mut backend);
        assert!(view.needs_frames());
        for _ in 0..200 {
            view.frame(&mut backend);
        }
        assert_ne!(view.store().get(NodeId(2)).unwrap().position, seeded);
    }

    #[test]
    fn click_opens_tooltip_and_requests_descriptions_once() {
        let mut view = view_with_page();
        let now = Instant::now();

        let request = view.node_clicked(NodeId(1), now);
        assert_eq!(
            request,
            Some(ViewRequest::RequestNodeDescriptions(vec![NodeId(1)]))
        );
        assert_eq!(view.open_tooltip_count(), 1);
        assert!(view.is_polling());
        // Poller waits a full interval after the immediate request.
        assert_eq!(view.poll_timer_fired(now), None);
    }

    #[test]
    fn second_click_closes_tooltip_and_poller_stops() {
        let mut view = view_with_page();
        let now = Instant::now();
        view.node_clicked(NodeId(1), now);

        assert_eq!(view.node_clicked(NodeId(1), now), None);
        assert_eq!(view.open_tooltip_count(), 0);

        assert_eq!(view.poll_timer_fired(now + POLL_INTERVAL), None);
        assert!(!view.is_polling());
    }

    #[test]
    fn poll_covers_every_open_tooltip() {
        let mut view = view_with_page();
        view.apply_event(GraphChangeEvent::NodeCreated(page(2)));
        let now = Instant::now();
        view.node_clicked(NodeId(2), now);
        view.node_clicked(NodeId(1), now);

        let request = view.poll_timer_fired(now + POLL_INTERVAL);
        assert_eq!(
            request,
            Some(ViewRequest::RequestNodeDescriptions(vec![
                NodeId(1),
                NodeId(2)
            ]))
        );
    }

    #[test]
    fn click_on_unknown_node_is_ignored() {
        let mut view = view_with_page();
        assert_eq!(view.node_clicked(NodeId(42), Instant::now()), None);
        assert_eq!(view.open_tooltip_count(), 0);
        assert!(!view.is_polling());
    }

    #[test]
    fn deleting_a_node_tears_its_tooltip_down_immediately() {
        let mut view = view_with_page();
        view.node_clicked(NodeId(1), Instant::now());

        view.apply_event(GraphChangeEvent::NodeDeleted(NodeId(1)));
        assert_eq!(view.open_tooltip_count(), 0);
    }

    #[test]
    fn drag_inside_band_keeps_pin_outside_releases_it() {
        let mut view = view_with_page();
        let band = crate::graph::NodeKind::Page.band(VIEWPORT);

        view.drag_started(NodeId(1));
        let inside = Point2D::new(100.0, band.midpoint());
        view.drag_moved(NodeId(1), inside);
        view.drag_ended(NodeId(1), inside);
        assert_eq!(view.store().get(NodeId(1)).unwrap().pinned, Some(inside));

        view.drag_started(NodeId(1));
        let outside = Point2D::new(100.0, VIEWPORT.height - 1.0);
        view.drag_ended(NodeId(1), outside);
        assert_eq!(view.store().get(NodeId(1)).unwrap().pinned, None);
    }

    #[test]
    fn floating_tooltip_tracks_its_node() {
        let mut view = view_with_page();
        view.node_clicked(NodeId(1), Instant::now());

        let moved = Point2D::new(321.0, 45.0);
        // Pin the node so the frame's simulation tick cannot move it.
        view.store.get_mut(NodeId(1)).unwrap().pinned = Some(moved);
        let mut backend = CollectingBackend::default();
        view.frame(&mut backend);

        let tooltip = view.tooltip(NodeId(1)).unwrap();
        assert_eq!(
            tooltip.position,
            moved + Vector2D::new(TOOLTIP_OFFSET_X, TOOLTIP_OFFSET_Y)
        );
        assert!(view.leader_lines().is_empty());
    }

    #[test]
    fn pinned_tooltip_holds_position_and_gets_a_leader_line() {
        let mut view = view_with_page();
        view.node_clicked(NodeId(1), Instant::now());
        view.tooltip_drag_started(NodeId(1));
        let parked = Point2D::new(700.0, 500.0);
        view.tooltip_drag_moved(NodeId(1), parked);

        let mut backend = CollectingBackend::default();
        view.frame(&mut backend);

        assert_eq!(view.tooltip(NodeId(1)).unwrap().position, parked);
        let lines = view.leader_lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].tooltip, parked);
        assert_eq!(
            lines[0].node,
            view.store().get(NodeId(1)).unwrap().position
        );
    }

    #[test]
    fn bad_favicon_payload_is_dropped_quietly() {
        let mut view = view_with_page();
        let changed = view.apply_event(GraphChangeEvent::FavIconData {
            id: NodeId(1),
            data: "!!! not base64 !!!".to_owned(),
        });
        assert!(!changed);
        assert!(view.store().get(NodeId(1)).unwrap().favicon.is_none());
    }

    #[test]
    fn good_favicon_payload_lands_on_the_node() {
        let mut view = view_with_page();
        view.apply_event(GraphChangeEvent::FavIconData {
            id: NodeId(1),
            data: BASE64.encode([1u8, 2, 3]),
        });
        assert_eq!(
            view.store().get(NodeId(1)).unwrap().favicon.as_deref(),
            Some(&[1u8, 2, 3][..])
        );
    }

    #[test]
    fn out_of_order_delete_is_logged_not_fatal() {
        let (mut view, _) = GraphView::new(VIEWPORT);
        assert!(!view.apply_event(GraphChangeEvent::NodeDeleted(NodeId(7))));
        assert_eq!(view.store().node_count(), 0);
    }

    #[test]
    fn shutdown_leaves_nothing_behind() {
        let mut view = view_with_page();
        view.node_clicked(NodeId(1), Instant::now());
        let mut backend = CollectingBackend::default();
        view.frame(&mut backend);

        view.shutdown();
        assert_eq!(view.store().node_count(), 0);
        assert_eq!(view.open_tooltip_count(), 0);
        assert!(!view.is_polling());
        assert!(!view.needs_frames());
    }
}
