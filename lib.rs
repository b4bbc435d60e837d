/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Live force-directed visualizer for a browser's internal object graph.
//!
//! The crate consumes a push stream of create/change/delete events for
//! pages, frames, processes, and workers, maintains an incremental graph
//! model, runs a banded physics layout, and reconciles the result into a
//! pluggable scene backend. Tooltips with on-demand node descriptions ride
//! on a separate poll cadence.
//!
//! All mutation and rendering happens on one logical thread; the only
//! cross-thread surface is the [`view::GraphView`] event inbox.

pub mod graph;
pub mod layout;
pub mod render;
pub mod tooltip;
pub mod view;

pub use graph::{EdgeStyle, GraphStore, NodeData, NodeId, NodeKind, Viewport};
pub use layout::LayoutEngine;
pub use render::{Reconciler, SceneBackend, SceneDiff};
pub use tooltip::{DescriptionPoller, Tooltip, TooltipRow};
pub use view::{GraphChangeEvent, GraphView, ViewRequest};

/// Crate version, surfaced for host diagnostics overlays.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
