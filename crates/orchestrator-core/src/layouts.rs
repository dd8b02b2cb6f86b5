// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Pure layout algorithms for positioning an [`ExecutionGraph`]'s nodes
//! in two dimensions. Each function is a deterministic, side-effect-free
//! `(graph, params) -> positions` computation; none of them mutate the
//! graph or talk to a renderer. See SPEC_FULL.md §4.D.

use crate::graph::ExecutionGraph;
use std::collections::HashMap;
use std::f64::consts::PI;

/// A node's position plus the layer it was assigned to by the layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub level: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct LayoutParams {
    pub horizontal_spacing: f64,
    pub vertical_spacing: f64,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            horizontal_spacing: 160.0,
            vertical_spacing: 120.0,
        }
    }
}

/// One row per BFS depth from the spec root; nodes within a row spread
/// out evenly along x.
pub fn hierarchical(graph: &ExecutionGraph, params: &LayoutParams) -> HashMap<String, Position> {
    let levels = graph.levels();
    let mut by_level: HashMap<usize, Vec<String>> = HashMap::new();
    for (id, level) in &levels {
        by_level.entry(*level).or_default().push(id.clone());
    }
    for ids in by_level.values_mut() {
        ids.sort();
    }

    let mut positions = HashMap::new();
    for (level, ids) in &by_level {
        let row_width = (ids.len().saturating_sub(1)) as f64 * params.horizontal_spacing;
        let start_x = -row_width / 2.0;
        for (i, id) in ids.iter().enumerate() {
            positions.insert(
                id.clone(),
                Position {
                    x: start_x + i as f64 * params.horizontal_spacing,
                    y: *level as f64 * params.vertical_spacing,
                    level: *level,
                },
            );
        }
    }
    positions
}

/// Concentric rings, one per BFS depth, nodes spread evenly by angle.
pub fn radial(graph: &ExecutionGraph, params: &LayoutParams) -> HashMap<String, Position> {
    let levels = graph.levels();
    let mut by_level: HashMap<usize, Vec<String>> = HashMap::new();
    for (id, level) in &levels {
        by_level.entry(*level).or_default().push(id.clone());
    }
    for ids in by_level.values_mut() {
        ids.sort();
    }

    let radius_step = params.horizontal_spacing.max(params.vertical_spacing);
    let mut positions = HashMap::new();
    for (level, ids) in &by_level {
        let radius = *level as f64 * radius_step;
        let count = ids.len().max(1);
        for (i, id) in ids.iter().enumerate() {
            let angle = 2.0 * PI * (i as f64) / (count as f64);
            positions.insert(
                id.clone(),
                Position {
                    x: radius * angle.cos(),
                    y: radius * angle.sin(),
                    level: *level,
                },
            );
        }
    }
    positions
}

/// Even rows and columns, ordered by BFS depth then node id — a cheap
/// fallback layout that needs no iteration to converge.
pub fn grid(graph: &ExecutionGraph, params: &LayoutParams) -> HashMap<String, Position> {
    let levels = graph.levels();
    let mut ids: Vec<String> = graph.node_ids();
    ids.sort_by(|a, b| {
        let la = levels.get(a).copied().unwrap_or(0);
        let lb = levels.get(b).copied().unwrap_or(0);
        la.cmp(&lb).then_with(|| a.cmp(b))
    });

    let columns = (ids.len() as f64).sqrt().ceil().max(1.0) as usize;
    let mut positions = HashMap::new();
    for (i, id) in ids.iter().enumerate() {
        let row = i / columns;
        let col = i % columns;
        positions.insert(
            id.clone(),
            Position {
                x: col as f64 * params.horizontal_spacing,
                y: row as f64 * params.vertical_spacing,
                level: levels.get(id).copied().unwrap_or(0),
            },
        );
    }
    positions
}

/// A fixed-iteration Fruchterman-Reingold style force-directed layout:
/// all node pairs repel, edges attract, positions settle over a bounded
/// number of iterations. Deterministic — no RNG — nodes start from a
/// grid, not random placement, so repeated calls are reproducible.
pub fn force_directed(graph: &ExecutionGraph, params: &LayoutParams) -> HashMap<String, Position> {
    const ITERATIONS: usize = 50;
    let ids = graph.node_ids();
    let edges = graph.edges();
    let levels = graph.levels();
    let n = ids.len().max(1);

    let area = params.horizontal_spacing * params.vertical_spacing * n as f64;
    let k = (area / n as f64).sqrt();

    let mut pos: HashMap<String, (f64, f64)> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let columns = (n as f64).sqrt().ceil().max(1.0) as usize;
            let row = (i / columns) as f64;
            let col = (i % columns) as f64;
            (id.clone(), (col * k, row * k))
        })
        .collect();

    for _ in 0..ITERATIONS {
        let mut displacement: HashMap<String, (f64, f64)> =
            ids.iter().map(|id| (id.clone(), (0.0, 0.0))).collect();

        for a in &ids {
            for b in &ids {
                if a == b {
                    continue;
                }
                let (ax, ay) = pos[a];
                let (bx, by) = pos[b];
                let dx = ax - bx;
                let dy = ay - by;
                let dist = (dx * dx + dy * dy).sqrt().max(0.01);
                let repulsion = (k * k) / dist;
                let entry = displacement.get_mut(a).unwrap();
                entry.0 += (dx / dist) * repulsion;
                entry.1 += (dy / dist) * repulsion;
            }
        }

        for (from, to) in &edges {
            let (fx, fy) = pos[from];
            let (tx, ty) = pos[to];
            let dx = fx - tx;
            let dy = fy - ty;
            let dist = (dx * dx + dy * dy).sqrt().max(0.01);
            let attraction = (dist * dist) / k;

            let from_entry = displacement.get_mut(from).unwrap();
            from_entry.0 -= (dx / dist) * attraction;
            from_entry.1 -= (dy / dist) * attraction;

            let to_entry = displacement.get_mut(to).unwrap();
            to_entry.0 += (dx / dist) * attraction;
            to_entry.1 += (dy / dist) * attraction;
        }

        for id in &ids {
            let (dx, dy) = displacement[id];
            let disp_len = (dx * dx + dy * dy).sqrt().max(0.01);
            let capped = disp_len.min(k);
            let entry = pos.get_mut(id).unwrap();
            entry.0 += (dx / disp_len) * capped;
            entry.1 += (dy / disp_len) * capped;
        }
    }

    pos.into_iter()
        .map(|(id, (x, y))| {
            let level = levels.get(&id).copied().unwrap_or(0);
            (id, Position { x, y, level })
        })
        .collect()
}
