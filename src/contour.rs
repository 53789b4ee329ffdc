//! Exact boundary tracing of binary planes.
//!
//! Every foreground pixel `(x, y)` covers the square `[x, x + 1] x [y, y + 1]`
//! in corner coordinates. Each pixel side facing background becomes a
//! directed unit edge, oriented so that walking all four sides of a lone
//! pixel gives one closed loop. Edges are chained into loops; where two
//! loops meet at a corner (diagonal neighbors), the walk turns towards its
//! own pixel so 4-connected components stay separate. Holes come out as
//! loops of their own, wound the other way.

use ndarray::ArrayView2;
use std::collections::HashMap;

/// Pixel corner in grid units: `(x, y)` with `0 <= x <= width`, `0 <= y <= height`.
pub type Corner = (usize, usize);

#[derive(Clone, Copy, Debug)]
struct Edge {
    from: Corner,
    to: Corner,
}

impl Edge {
    fn direction(&self) -> (i64, i64) {
        (
            self.to.0 as i64 - self.from.0 as i64,
            self.to.1 as i64 - self.from.1 as i64,
        )
    }
}

/// Closed boundary loops of `plane`, indexed `[x, y]`.
///
/// The first corner is not repeated at the end. With `simplify`, corners
/// where the boundary runs straight on are dropped.
pub fn trace(plane: ArrayView2<'_, bool>, simplify: bool) -> Vec<Vec<Corner>> {
    let edges = boundary_edges(plane);
    let mut outgoing: HashMap<Corner, Vec<usize>> = HashMap::with_capacity(edges.len());
    for (i, edge) in edges.iter().enumerate() {
        outgoing.entry(edge.from).or_default().push(i);
    }

    let mut used = vec![false; edges.len()];
    let mut loops = Vec::new();
    for start in 0..edges.len() {
        if used[start] {
            continue;
        }
        let origin = edges[start].from;
        let mut corners = vec![origin];
        let mut current = start;
        loop {
            used[current] = true;
            let edge = edges[current];
            if edge.to == origin {
                break;
            }
            corners.push(edge.to);
            match next_edge(&edges, &outgoing, &used, edge) {
                Some(next) => current = next,
                None => break,
            }
        }
        if simplify {
            corners = drop_collinear(corners);
        }
        loops.push(corners);
    }
    loops
}

fn boundary_edges(plane: ArrayView2<'_, bool>) -> Vec<Edge> {
    let (width, height) = plane.dim();
    let filled = |x: isize, y: isize| {
        x >= 0
            && y >= 0
            && (x as usize) < width
            && (y as usize) < height
            && plane[[x as usize, y as usize]]
    };

    let mut edges = Vec::new();
    for y in 0..height {
        for x in 0..width {
            if !plane[[x, y]] {
                continue;
            }
            let (xi, yi) = (x as isize, y as isize);
            if !filled(xi, yi - 1) {
                edges.push(Edge {
                    from: (x + 1, y),
                    to: (x, y),
                });
            }
            if !filled(xi - 1, yi) {
                edges.push(Edge {
                    from: (x, y),
                    to: (x, y + 1),
                });
            }
            if !filled(xi, yi + 1) {
                edges.push(Edge {
                    from: (x, y + 1),
                    to: (x + 1, y + 1),
                });
            }
            if !filled(xi + 1, yi) {
                edges.push(Edge {
                    from: (x + 1, y + 1),
                    to: (x + 1, y),
                });
            }
        }
    }
    edges
}

fn next_edge(
    edges: &[Edge],
    outgoing: &HashMap<Corner, Vec<usize>>,
    used: &[bool],
    incoming: Edge,
) -> Option<usize> {
    let (dx, dy) = incoming.direction();
    outgoing
        .get(&incoming.to)?
        .iter()
        .copied()
        .filter(|&i| !used[i])
        // the turn a lone pixel makes at every corner has a negative cross product
        .min_by_key(|&i| {
            let (ex, ey) = edges[i].direction();
            dx * ey - dy * ex
        })
}

fn drop_collinear(corners: Vec<Corner>) -> Vec<Corner> {
    let n = corners.len();
    if n < 4 {
        return corners;
    }
    (0..n)
        .filter(|&i| {
            let (px, py) = corners[(i + n - 1) % n];
            let (cx, cy) = corners[i];
            let (nx, ny) = corners[(i + 1) % n];
            let cross = (cx as i64 - px as i64) * (ny as i64 - cy as i64)
                - (cy as i64 - py as i64) * (nx as i64 - cx as i64);
            cross != 0
        })
        .map(|i| corners[i])
        .collect()
}
