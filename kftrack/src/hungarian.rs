//! Minimum-cost assignment for detection-to-track association.
//!
//! Thin wrapper around the Kuhn-Munkres solver: costs arrive as an `ndarray`
//! matrix of pixel distances, rows are tracks, columns are observations.

use ndarray::ArrayView2;
use pathfinding::prelude::{kuhn_munkres, Matrix};

/// Cost marking a forbidden pairing. Any feasible image-space distance is
/// orders of magnitude below this, so feasible pairings strictly dominate.
pub const FORBIDDEN: f64 = 1.0e7;

/// Fixed-point scale applied before handing costs to the integer solver.
const SCALE: f64 = 1000.0;

/// Solves the assignment problem over `costs`, minimising total cost.
///
/// Returns, for each row, the column the optimal assignment picked, or
/// `None` when the row landed on a dummy pad column. The matrix is padded
/// square with [`FORBIDDEN`], so callers with unequal row/column counts get
/// dummy assignments back; those either map out of range (filtered here) or
/// carry the sentinel cost (filtered by the caller's distance gate).
pub fn solve(costs: ArrayView2<f64>) -> Vec<Option<usize>> {
    let rows = costs.nrows();
    let cols = costs.ncols();
    if rows == 0 || cols == 0 {
        return vec![None; rows];
    }

    // kuhn_munkres maximises total weight over a matrix with rows <= columns:
    // negate the scaled costs and pad square with the sentinel.
    let size = rows.max(cols);
    let pad = -((FORBIDDEN * SCALE) as i64);
    let mut weights = Matrix::new(size, size, pad);
    for ((i, k), &cost) in costs.indexed_iter() {
        weights[(i, k)] = -((cost * SCALE) as i64);
    }

    let (_total, assignment) = kuhn_munkres(&weights);

    assignment
        .into_iter()
        .take(rows)
        .map(|col| (col < cols).then_some(col))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn picks_minimum_total_cost() {
        // greedy on row 0 would take column 0 (cost 1) and force row 1 onto
        // column 1 (cost 100); the optimal total is 2 + 3
        let costs = array![[1.0, 2.0], [3.0, 100.0]];
        let assignment = solve(costs.view());
        assert_eq!(assignment, vec![Some(1), Some(0)]);
    }

    #[test]
    fn diagonal_when_costs_agree() {
        let costs = array![[1.0, 50.0], [50.0, 1.0]];
        assert_eq!(solve(costs.view()), vec![Some(0), Some(1)]);
    }

    #[test]
    fn more_rows_than_columns_leaves_a_row_unassigned() {
        let costs = array![[1.0], [2.0], [3.0]];
        let assignment = solve(costs.view());
        assert_eq!(assignment.len(), 3);
        assert_eq!(assignment.iter().filter(|a| a.is_some()).count(), 1);
        assert_eq!(assignment[0], Some(0));
    }

    #[test]
    fn more_columns_than_rows_assigns_every_row() {
        let costs = array![[5.0, 1.0, 9.0]];
        assert_eq!(solve(costs.view()), vec![Some(1)]);
    }

    #[test]
    fn empty_input() {
        let costs = ndarray::Array2::<f64>::zeros((0, 3));
        assert!(solve(costs.view()).is_empty());
    }

    #[test]
    fn forbidden_cells_lose_to_any_feasible_pairing() {
        let costs = array![[FORBIDDEN, 400.0], [300.0, FORBIDDEN]];
        assert_eq!(solve(costs.view()), vec![Some(1), Some(0)]);
    }
}
