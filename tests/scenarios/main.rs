/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! End-to-end scenarios driven through the public [`GraphView`] surface,
//! the way an embedding host would: transport events in, scene diffs and
//! description requests out.

use std::collections::HashMap;
use std::time::Instant;

use graph_observatory::graph::{
    FrameDescriptor, NODE_RADIUS, PageDescriptor, ProcessDescriptor,
};
use graph_observatory::render::CollectingBackend;
use graph_observatory::tooltip::POLL_INTERVAL;
use graph_observatory::{
    EdgeStyle, GraphChangeEvent, GraphView, NodeData, NodeId, NodeKind, VERSION, ViewRequest,
    Viewport,
};

const VIEWPORT: Viewport = Viewport {
    width: 800.0,
    height: 600.0,
};

fn page(id: u64) -> GraphChangeEvent {
    GraphChangeEvent::NodeCreated(NodeData::Page(PageDescriptor {
        id: NodeId(id),
        opener_frame_id: None,
        embedder_frame_id: None,
    }))
}

fn frame(id: u64, page_id: u64, process_id: u64) -> NodeData {
    NodeData::Frame(FrameDescriptor {
        id: NodeId(id),
        parent_frame_id: None,
        page_id: NodeId(page_id),
        process_id: NodeId(process_id),
    })
}

fn process(id: u64) -> GraphChangeEvent {
    GraphChangeEvent::NodeCreated(NodeData::Process(ProcessDescriptor {
        id: NodeId(id),
        pid: id as u32,
    }))
}

fn edges_of(view: &GraphView, id: NodeId) -> Vec<(NodeId, NodeId, EdgeStyle)> {
    view.store()
        .edges()
        .filter(|e| e.from == id || e.to == id)
        .map(|e| (e.from, e.to, e.style))
        .collect()
}

#[test]
fn scenarios_binary_smoke_runs() {
    assert!(!VERSION.is_empty());
}

#[test]
fn lone_page_has_no_edges_and_sits_at_band_midpoint() {
    let (mut view, _events) = GraphView::new(VIEWPORT);
    view.apply_event(page(1));

    assert!(edges_of(&view, NodeId(1)).is_empty());
    let node = view.store().get(NodeId(1)).unwrap();
    assert_eq!(node.position.y, NodeKind::Page.band(VIEWPORT).midpoint());
}

#[test]
fn frame_edge_to_late_process_never_appears_without_change() {
    let (mut view, _events) = GraphView::new(VIEWPORT);
    view.apply_event(page(1));
    view.apply_event(GraphChangeEvent::NodeCreated(frame(10, 1, 100)));

    // Process 100 does not exist yet: only the page edge materializes.
    assert_eq!(
        edges_of(&view, NodeId(10)),
        vec![(NodeId(10), NodeId(1), EdgeStyle::Solid)]
    );

    // Creating the process later does not retroactively add the edge.
    view.apply_event(process(100));
    assert_eq!(edges_of(&view, NodeId(10)).len(), 1);

    // A change event relinks the frame and the edge finally appears.
    view.apply_event(GraphChangeEvent::NodeChanged(frame(10, 1, 100)));
    let mut edges = edges_of(&view, NodeId(10));
    edges.sort_by_key(|(_, to, _)| *to);
    assert_eq!(
        edges,
        vec![
            (NodeId(10), NodeId(1), EdgeStyle::Solid),
            (NodeId(10), NodeId(100), EdgeStyle::Solid),
        ]
    );
}

#[test]
fn deleting_an_edge_target_then_its_source_never_panics() {
    let (mut view, _events) = GraphView::new(VIEWPORT);
    view.apply_event(page(1));
    view.apply_event(process(100));
    view.apply_event(GraphChangeEvent::NodeCreated(frame(10, 1, 100)));
    assert_eq!(view.store().edge_count(), 2);

    view.apply_event(GraphChangeEvent::NodeDeleted(NodeId(1)));
    assert_eq!(
        edges_of(&view, NodeId(10)),
        vec![(NodeId(10), NodeId(100), EdgeStyle::Solid)]
    );

    view.apply_event(GraphChangeEvent::NodeDeleted(NodeId(10)));
    assert_eq!(view.store().edge_count(), 0);
    assert_eq!(view.store().node_count(), 1);
}

#[test]
fn node_count_tracks_creates_minus_deletes_with_no_dangling_edges() {
    let (mut view, events) = GraphView::new(VIEWPORT);
    for id in 1..=6 {
        events.send(page(id)).unwrap();
    }
    events
        .send(GraphChangeEvent::NodeCreated(frame(10, 3, 100)))
        .unwrap();
    events.send(GraphChangeEvent::NodeDeleted(NodeId(3))).unwrap();
    events.send(GraphChangeEvent::NodeDeleted(NodeId(5))).unwrap();

    let mut backend = CollectingBackend::default();
    view.frame(&mut backend);

    assert_eq!(view.store().node_count(), 5);
    for edge in view.store().edges() {
        assert!(view.store().contains(edge.from));
        assert!(view.store().contains(edge.to));
    }
}

#[test]
fn tooltip_round_trip_polls_then_stops() {
    let (mut view, _events) = GraphView::new(VIEWPORT);
    view.apply_event(page(1));
    let t0 = Instant::now();

    // Opening issues exactly one immediate request.
    let opened = view.node_clicked(NodeId(1), t0);
    assert_eq!(
        opened,
        Some(ViewRequest::RequestNodeDescriptions(vec![NodeId(1)]))
    );

    // The host answers; rows become visible on the tooltip.
    let mut answer = HashMap::new();
    answer.insert(
        NodeId(1),
        r#"{"title":"example","frames":{"count":2}}"#.to_owned(),
    );
    view.descriptions_arrived(&answer);
    let tooltip = view.tooltip(NodeId(1)).unwrap();
    assert!(!tooltip.visible_rows().is_empty());

    // The interval keeps firing while the tooltip is open.
    assert!(view.poll_timer_fired(t0 + POLL_INTERVAL).is_some());
    assert!(view.poll_timer_fired(t0 + POLL_INTERVAL * 2).is_some());

    // Closing stops the loop on its next observation, with no request.
    assert_eq!(view.node_clicked(NodeId(1), t0 + POLL_INTERVAL * 2), None);
    assert_eq!(view.poll_timer_fired(t0 + POLL_INTERVAL * 3), None);
    assert!(!view.is_polling());
}

#[test]
fn every_unpinned_node_ends_inside_its_lane_after_settling() {
    let (mut view, events) = GraphView::new(VIEWPORT);
    events.send(process(100)).unwrap();
    for id in 1..=4 {
        events.send(page(id)).unwrap();
    }
    for id in 10..=15 {
        events
            .send(GraphChangeEvent::NodeCreated(frame(id, id - 9, 100)))
            .unwrap();
    }

    // First resize reseeds and pre-settles; then run plenty of frames.
    let mut backend = CollectingBackend::default();
    view.frame(&mut backend);
    view.resize(VIEWPORT.width, VIEWPORT.height);
    for _ in 0..400 {
        view.frame(&mut backend);
    }

    let x_min = 2.0 * NODE_RADIUS;
    let x_max = VIEWPORT.width - 2.0 * NODE_RADIUS;
    for (_, node) in view.store().nodes() {
        let band = node.kind().band(VIEWPORT);
        assert!(
            band.contains(node.position.y),
            "node {} y={} escaped [{}, {}]",
            node.id(),
            node.position.y,
            band.min,
            band.max
        );
        assert!(
            (x_min..=x_max).contains(&node.position.x),
            "node {} x={} escaped",
            node.id(),
            node.position.x
        );
    }
}

#[test]
fn scene_diffs_add_then_drain_removed_nodes() {
    let (mut view, events) = GraphView::new(VIEWPORT);
    events.send(page(1)).unwrap();
    let mut backend = CollectingBackend::default();
    view.frame(&mut backend);
    assert_eq!(backend.diffs[0].added_nodes.len(), 1);

    events.send(GraphChangeEvent::NodeDeleted(NodeId(1))).unwrap();
    // Run frames until the exit animation has finished and the scene has
    // dropped the element.
    let mut removed = Vec::new();
    for _ in 0..400 {
        view.frame(&mut backend);
        removed.extend(backend.diffs.last().unwrap().removed_nodes.clone());
    }
    assert_eq!(removed, vec![NodeId(1)]);
    assert!(!view.needs_frames());
}
