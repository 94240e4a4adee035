//! Layout composition: per-component oracle layouts, grid normalization and packing
//!
//! Each connected component is laid out independently by a [`LayoutOracle`],
//! whose scale and origin are arbitrary. The composer rescales every
//! component to a common grid, then stacks components top to bottom (tallest
//! first) into one coordinate space.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use rayon::prelude::*;
use thiserror::Error;
use tracing::debug;

use crate::cancel::CancellationToken;
use crate::error::BuildError;
use crate::graph::CallGraph;
use crate::model::{MethodId, Point};

/// Node positions for one graph or component.
pub type Blueprint = BTreeMap<MethodId, Point>;

/// Spacing between adjacent nodes after normalization.
pub const GRID_UNIT: f64 = 0.1;

/// Where the left edge and the reference line of the merged layout land.
pub const BASELINE: f64 = 0.5;

/// Margin kept on each side by [`fit_to_viewport`].
pub const FIT_MARGIN: f64 = 0.1;

/// Coordinates are compared at this many steps per unit when measuring the grid.
const PRECISION: f64 = 1000.0;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("layout engine unavailable: {0}")]
    Unavailable(String),
    #[error("layout engine placed {placed} of {expected} nodes")]
    Incomplete { placed: usize, expected: usize },
    #[error("layout cancelled")]
    Cancelled,
}

/// External layout engine mapping a connected graph to 2D coordinates.
///
/// Scale and origin of the result are arbitrary; only relative placement matters.
pub trait LayoutOracle: Send + Sync {
    fn layout(&self, component: &CallGraph, cancel: &CancellationToken) -> Result<Blueprint, LayoutError>;
}

/// Lays out a whole graph component by component and merges the results.
#[derive(Clone)]
pub struct LayoutComposer {
    oracle: Arc<dyn LayoutOracle>,
}

impl LayoutComposer {
    pub fn new(oracle: Arc<dyn LayoutOracle>) -> Self {
        LayoutComposer { oracle }
    }

    /// Position every node of `graph`, writing both raw layout and display position.
    pub fn layout(&self, graph: &mut CallGraph, cancel: &CancellationToken) -> Result<(), BuildError> {
        let components = graph.connected_components();
        debug!("Laying out {} connected components", components.len());

        let blueprints = components
            .par_iter()
            .map(|component| self.component_blueprint(component, cancel))
            .collect::<Result<Vec<_>, LayoutError>>()?;

        let merged = merge_normalized_layouts(&blueprints);
        graph.apply_layout(&merged)?;
        Ok(())
    }

    /// Oracle layout for one component, normalized to the grid and anchored at the origin.
    pub fn component_blueprint(
        &self,
        component: &CallGraph,
        cancel: &CancellationToken,
    ) -> Result<Blueprint, LayoutError> {
        cancel.check().map_err(|_| LayoutError::Cancelled)?;

        let raw = if component.node_count() == 1 {
            component
                .node_ids()
                .map(|id| (id, Point::new(BASELINE, BASELINE)))
                .collect()
        } else {
            let raw = self.oracle.layout(component, cancel)?;
            let placed = component.node_ids().filter(|id| raw.contains_key(id)).count();
            if placed != component.node_count() {
                return Err(LayoutError::Incomplete {
                    placed,
                    expected: component.node_count(),
                });
            }
            raw
        };

        Ok(anchor_at_origin(&normalize_grid_size(&raw)))
    }
}

/// Mean gap between consecutive distinct coordinates, per axis.
///
/// Values are rounded to three decimals before deduplication. An axis with
/// fewer than two distinct values has grid size 0.
pub fn grid_size(blueprint: &Blueprint) -> Point {
    Point::new(
        average_distinct_gap(blueprint.values().map(|p| p.x)),
        average_distinct_gap(blueprint.values().map(|p| p.y)),
    )
}

fn average_distinct_gap(values: impl Iterator<Item = f64>) -> f64 {
    let distinct: BTreeSet<i64> = values.map(|v| (v * PRECISION).round() as i64).collect();
    match (distinct.first(), distinct.last()) {
        (Some(&min), Some(&max)) if distinct.len() >= 2 => {
            (max - min) as f64 / (distinct.len() - 1) as f64 / PRECISION
        }
        _ => 0.0,
    }
}

/// Rescale each axis so its grid size becomes [`GRID_UNIT`].
///
/// Blueprints with fewer than two points pass through; a degenerate axis keeps scale 1.
pub fn normalize_grid_size(blueprint: &Blueprint) -> Blueprint {
    if blueprint.len() < 2 {
        return blueprint.clone();
    }
    let grid = grid_size(blueprint);
    let x_factor = if grid.x == 0.0 { 1.0 } else { GRID_UNIT / grid.x };
    let y_factor = if grid.y == 0.0 { 1.0 } else { GRID_UNIT / grid.y };
    blueprint
        .iter()
        .map(|(&id, p)| (id, Point::new(p.x * x_factor, p.y * y_factor)))
        .collect()
}

/// Translate so the minimum corner sits at the origin.
pub fn anchor_at_origin(blueprint: &Blueprint) -> Blueprint {
    let Some(bounds) = Bounds::of(blueprint) else {
        return Blueprint::new();
    };
    blueprint
        .iter()
        .map(|(&id, p)| (id, Point::new(p.x - bounds.min_x, p.y - bounds.min_y)))
        .collect()
}

#[derive(Debug, Clone, Copy)]
struct Bounds {
    min_x: f64,
    max_x: f64,
    min_y: f64,
    max_y: f64,
}

impl Bounds {
    fn of(blueprint: &Blueprint) -> Option<Bounds> {
        let mut points = blueprint.values();
        let first = points.next()?;
        let init = Bounds {
            min_x: first.x,
            max_x: first.x,
            min_y: first.y,
            max_y: first.y,
        };
        Some(points.fold(init, |b, p| Bounds {
            min_x: b.min_x.min(p.x),
            max_x: b.max_x.max(p.x),
            min_y: b.min_y.min(p.y),
            max_y: b.max_y.max(p.y),
        }))
    }
}

/// Where one component lands in the merged layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Index into the input slice.
    pub index: usize,
    /// Sum of the heights of all components stacked above this one.
    pub offset: f64,
    pub width: f64,
    pub height: f64,
    pub min_x: f64,
}

/// Stacking order and vertical offsets: tallest first, wider first on ties.
///
/// Empty blueprints take no space and are left out.
pub fn stack_components(blueprints: &[Blueprint]) -> Vec<Placement> {
    let mut placements: Vec<Placement> = blueprints
        .iter()
        .enumerate()
        .filter_map(|(index, blueprint)| {
            let bounds = Bounds::of(blueprint)?;
            Some(Placement {
                index,
                offset: 0.0,
                width: bounds.max_x - bounds.min_x + GRID_UNIT,
                height: bounds.max_y - bounds.min_y + GRID_UNIT,
                min_x: bounds.min_x,
            })
        })
        .collect();

    placements.sort_by(|a, b| b.height.total_cmp(&a.height).then(b.width.total_cmp(&a.width)));

    let mut offset = 0.0;
    for placement in &mut placements {
        placement.offset = offset;
        offset += placement.height;
    }
    placements
}

/// Merge normalized component layouts into one coordinate space.
///
/// Components are stacked per [`stack_components`] and left-aligned at
/// [`BASELINE`]. The Y of the leftmost node of the first (tallest) component
/// is the shared reference line, which lands at [`BASELINE`].
pub fn merge_normalized_layouts(blueprints: &[Blueprint]) -> Blueprint {
    let placements = stack_components(blueprints);
    let Some(first) = placements.first() else {
        return Blueprint::new();
    };

    let reference_line = blueprints[first.index]
        .values()
        .min_by(|a, b| a.x.total_cmp(&b.x))
        .map_or(0.0, |p| p.y);

    let mut merged = Blueprint::new();
    for placement in &placements {
        let dy = placement.offset - reference_line + BASELINE;
        let dx = BASELINE - placement.min_x;
        merged.extend(
            blueprints[placement.index]
                .iter()
                .map(|(&id, p)| (id, Point::new(p.x + dx, p.y + dy))),
        );
    }
    merged
}

/// Map each axis linearly from `[min, max]` onto `[0.1, 0.9]`.
///
/// A degenerate axis (all nodes share one coordinate) is centered at 0.5.
pub fn fit_to_viewport(blueprint: &Blueprint) -> Blueprint {
    let Some(bounds) = Bounds::of(blueprint) else {
        return Blueprint::new();
    };
    let span = 1.0 - 2.0 * FIT_MARGIN;
    let fit = |value: f64, min: f64, max: f64| {
        if max > min {
            (value - min) / (max - min) * span + FIT_MARGIN
        } else {
            0.5
        }
    };
    blueprint
        .iter()
        .map(|(&id, p)| {
            (
                id,
                Point::new(
                    fit(p.x, bounds.min_x, bounds.max_x),
                    fit(p.y, bounds.min_y, bounds.max_y),
                ),
            )
        })
        .collect()
}
