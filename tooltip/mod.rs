/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Per-node description tooltips.
//!
//! A tooltip starts out *floating* (re-anchored to its node every frame)
//! and becomes *pinned* the moment the user drags it; pinning is one-way.
//! Content is an arbitrary nested key/value blob, flattened into heading
//! and value rows that the host can render as a flat list. Refreshing is
//! driven by [`DescriptionPoller`], a fixed-interval loop that runs only
//! while at least one tooltip is open.

use euclid::default::Point2D;
use std::collections::HashSet;
use std::time::{Duration, Instant};

use crate::graph::NodeId;

/// Scalar values longer than this are truncated with an ellipsis.
const MAX_VALUE_CHARS: usize = 50;

/// How often open tooltips re-request their descriptions.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Heading,
    Value,
}

/// One flattened line of tooltip content.
///
/// `object_index` groups the rows of a single nested object so it can be
/// collapsed and expanded independently; indices are assigned depth-first
/// and are stable across refreshes of a structurally identical blob.
#[derive(Debug, Clone, PartialEq)]
pub struct TooltipRow {
    pub object_index: usize,
    pub depth: usize,
    pub kind: RowKind,
    pub label: String,
    pub text: String,
}

/// Flatten a description blob into display rows.
///
/// Within each object, scalar leaves come first and nested containers
/// after, each class sorted by key. Revisited objects are not descended
/// into again, so self-referential input terminates.
pub fn flatten_description(value: &serde_json::Value) -> (Vec<TooltipRow>, Vec<Option<usize>>) {
    let mut rows = Vec::new();
    let mut parents: Vec<Option<usize>> = vec![None];
    let mut visited: HashSet<usize> = HashSet::new();
    flatten_into(value, 0, 0, &mut rows, &mut parents, &mut visited);
    (rows, parents)
}

fn flatten_into(
    value: &serde_json::Value,
    object_index: usize,
    depth: usize,
    rows: &mut Vec<TooltipRow>,
    parents: &mut Vec<Option<usize>>,
    visited: &mut HashSet<usize>,
) {
    if !visited.insert(value as *const serde_json::Value as usize) {
        return;
    }

    let entries: Vec<(String, &serde_json::Value)> = match value {
        serde_json::Value::Object(map) => {
            map.iter().map(|(k, v)| (k.clone(), v)).collect()
        }
        serde_json::Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        other => {
            rows.push(TooltipRow {
                object_index,
                depth,
                kind: RowKind::Value,
                label: String::new(),
                text: scalar_text(other),
            });
            return;
        }
    };

    let (mut scalars, mut containers): (Vec<_>, Vec<_>) = entries
        .into_iter()
        .partition(|(_, v)| !v.is_object() && !v.is_array());
    scalars.sort_by(|a, b| a.0.cmp(&b.0));
    containers.sort_by(|a, b| a.0.cmp(&b.0));

    for (label, scalar) in scalars {
        rows.push(TooltipRow {
            object_index,
            depth,
            kind: RowKind::Value,
            label,
            text: scalar_text(scalar),
        });
    }

    for (label, container) in containers {
        let child_index = parents.len();
        parents.push(Some(object_index));
        rows.push(TooltipRow {
            object_index: child_index,
            depth,
            kind: RowKind::Heading,
            label,
            text: String::new(),
        });
        flatten_into(container, child_index, depth + 1, rows, parents, visited);
    }
}

fn scalar_text(value: &serde_json::Value) -> String {
    let text = match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if text.chars().count() > MAX_VALUE_CHARS {
        let mut truncated: String = text.chars().take(MAX_VALUE_CHARS).collect();
        truncated.push('…');
        truncated
    } else {
        text
    }
}

/// A single open tooltip.
pub struct Tooltip {
    pub node_id: NodeId,
    pub position: Point2D<f32>,
    floating: bool,
    rows: Vec<TooltipRow>,
    /// parent object index per object index, for collapse propagation.
    object_parents: Vec<Option<usize>>,
    collapsed: HashSet<usize>,
    last_serialized: Option<String>,
}

impl Tooltip {
    pub fn new(node_id: NodeId, position: Point2D<f32>) -> Self {
        Self {
            node_id,
            position,
            floating: true,
            rows: Vec::new(),
            object_parents: Vec::new(),
            collapsed: HashSet::new(),
            last_serialized: None,
        }
    }

    /// Floating tooltips track their node; pinned ones keep their dragged
    /// position and get a leader line instead.
    pub fn is_floating(&self) -> bool {
        self.floating
    }

    /// Drag-start pins the tooltip. There is no way back to floating.
    pub fn begin_drag(&mut self) {
        self.floating = false;
    }

    /// Re-flatten from a fresh serialized description. Skips all work when
    /// the serialized form is unchanged; a parse failure keeps the last
    /// good rows. Returns whether the rows changed.
    pub fn update_content(&mut self, serialized: &str) -> bool {
        if self.last_serialized.as_deref() == Some(serialized) {
            return false;
        }
        match serde_json::from_str::<serde_json::Value>(serialized) {
            Ok(value) => {
                let (rows, parents) = flatten_description(&value);
                self.rows = rows;
                self.collapsed.retain(|&idx| idx < parents.len());
                self.object_parents = parents;
                self.last_serialized = Some(serialized.to_owned());
                true
            }
            Err(err) => {
                log::warn!(
                    "undecodable description for node {}: {err}",
                    self.node_id
                );
                false
            }
        }
    }

    /// Collapse or expand one nested object.
    pub fn toggle_object(&mut self, object_index: usize) {
        if !self.collapsed.remove(&object_index) {
            self.collapsed.insert(object_index);
        }
    }

    /// Rows the host should draw, honoring collapsed objects. The heading
    /// row of a collapsed object stays visible so it can be reopened.
    pub fn visible_rows(&self) -> Vec<&TooltipRow> {
        self.rows
            .iter()
            .filter(|row| {
                if row.kind == RowKind::Value && self.collapsed.contains(&row.object_index) {
                    return false;
                }
                // A collapsed ancestor hides everything beneath it,
                // including the headings of nested objects.
                let mut ancestor = self.object_parents.get(row.object_index).copied().flatten();
                while let Some(idx) = ancestor {
                    if self.collapsed.contains(&idx) {
                        return false;
                    }
                    ancestor = self.object_parents.get(idx).copied().flatten();
                }
                true
            })
            .collect()
    }

    #[cfg(test)]
    fn row_texts(&self) -> Vec<String> {
        self.visible_rows()
            .iter()
            .map(|r| format!("{}:{}", r.label, r.text))
            .collect()
    }
}

/// Fixed-interval description refresh, alive only while tooltips are open.
///
/// Armed when a tooltip opens, it fires every [`POLL_INTERVAL`] and
/// disarms itself the first time it observes zero open tooltips. The open
/// itself triggers an immediate request outside this loop.
pub enum DescriptionPoller {
    Idle,
    Polling { last: Instant },
}

impl DescriptionPoller {
    pub fn new() -> Self {
        DescriptionPoller::Idle
    }

    pub fn is_polling(&self) -> bool {
        matches!(self, DescriptionPoller::Polling { .. })
    }

    /// Start the interval. The caller has just issued an immediate request,
    /// so the first timed fire waits a full interval.
    pub fn arm(&mut self, now: Instant) {
        if let DescriptionPoller::Idle = self {
            *self = DescriptionPoller::Polling { last: now };
        }
    }

    /// Advance the loop. Returns true when a request should be issued now.
    /// With no tooltips open the loop stops without firing.
    pub fn tick(&mut self, now: Instant, open_tooltips: usize) -> bool {
        match self {
            DescriptionPoller::Idle => false,
            DescriptionPoller::Polling { last } => {
                if open_tooltips == 0 {
                    *self = DescriptionPoller::Idle;
                    return false;
                }
                if now.duration_since(*last) >= POLL_INTERVAL {
                    *last = now;
                    true
                } else {
                    false
                }
            }
        }
    }
}

impl Default for DescriptionPoller {
    fn default() -> Self {
        Self::new()
    }
}
