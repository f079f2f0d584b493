//! SciPy optimization functions port.
//!
//! Ported from scipy.optimize.linear_sum_assignment (rectangular_lsap.cpp,
//! shortest augmenting path after Crouse 2016).
//! License: BSD 3-Clause (SciPy Developers)

use nalgebra::DMatrix;

use crate::{Error, Result};

/// Represents a match between a row index and column index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub row_idx: usize,
    pub col_idx: usize,
}

/// Result of linear sum assignment.
#[derive(Debug, Clone)]
pub struct AssignmentResult {
    /// Assigned (row, col) pairs, sorted by row index.
    pub assignments: Vec<Assignment>,
    /// Indices of rows that were not assigned (only when rows > cols).
    pub unmatched_rows: Vec<usize>,
    /// Indices of columns that were not assigned (only when cols > rows).
    pub unmatched_cols: Vec<usize>,
}

impl AssignmentResult {
    fn empty(num_rows: usize, num_cols: usize) -> Self {
        Self {
            assignments: Vec::new(),
            unmatched_rows: (0..num_rows).collect(),
            unmatched_cols: (0..num_cols).collect(),
        }
    }

    /// Sum of the assigned entries of `cost_matrix`.
    pub fn total_cost(&self, cost_matrix: &DMatrix<f64>) -> f64 {
        self.assignments
            .iter()
            .map(|a| cost_matrix[(a.row_idx, a.col_idx)])
            .sum()
    }
}

/// Solve the rectangular linear sum assignment problem.
///
/// Finds the assignment of `min(rows, cols)` row/column pairs minimizing the
/// total cost. No entry is pruned before solving; gating on individual costs
/// is left to the caller.
///
/// The solver is deterministic: identical matrices always produce identical
/// assignments, and ties prefer unassigned columns in index order.
///
/// # Errors
/// `AssignmentError` if the matrix contains NaN or negative infinity, or if no
/// complete assignment with finite cost exists.
pub fn linear_sum_assignment(cost_matrix: &DMatrix<f64>) -> Result<AssignmentResult> {
    let (num_rows, num_cols) = cost_matrix.shape();
    if num_rows == 0 || num_cols == 0 {
        return Ok(AssignmentResult::empty(num_rows, num_cols));
    }

    if cost_matrix.iter().any(|c| c.is_nan() || *c == f64::NEG_INFINITY) {
        return Err(Error::AssignmentError(
            "cost matrix contains NaN or negative infinity".to_string(),
        ));
    }

    // The solver needs at least as many columns as rows
    let transposed = num_cols < num_rows;
    let col4row = if transposed {
        solve_rectangular(&cost_matrix.transpose())?
    } else {
        solve_rectangular(cost_matrix)?
    };

    let mut assignments: Vec<Assignment> = col4row
        .into_iter()
        .enumerate()
        .map(|(r, c)| {
            if transposed {
                Assignment { row_idx: c, col_idx: r }
            } else {
                Assignment { row_idx: r, col_idx: c }
            }
        })
        .collect();
    assignments.sort_by_key(|a| a.row_idx);

    let mut matched_rows = vec![false; num_rows];
    let mut matched_cols = vec![false; num_cols];
    for a in &assignments {
        matched_rows[a.row_idx] = true;
        matched_cols[a.col_idx] = true;
    }

    Ok(AssignmentResult {
        assignments,
        unmatched_rows: (0..num_rows).filter(|&i| !matched_rows[i]).collect(),
        unmatched_cols: (0..num_cols).filter(|&j| !matched_cols[j]).collect(),
    })
}

/// Scratch buffers reused across augmentations.
struct Workspace {
    u: Vec<f64>,
    v: Vec<f64>,
    shortest_path_costs: Vec<f64>,
    path: Vec<usize>,
    col4row: Vec<Option<usize>>,
    row4col: Vec<Option<usize>>,
    scanned_rows: Vec<bool>,
    scanned_cols: Vec<bool>,
    remaining: Vec<usize>,
}

impl Workspace {
    fn new(num_rows: usize, num_cols: usize) -> Self {
        Self {
            u: vec![0.0; num_rows],
            v: vec![0.0; num_cols],
            shortest_path_costs: vec![f64::INFINITY; num_cols],
            path: vec![usize::MAX; num_cols],
            col4row: vec![None; num_rows],
            row4col: vec![None; num_cols],
            scanned_rows: vec![false; num_rows],
            scanned_cols: vec![false; num_cols],
            remaining: vec![0; num_cols],
        }
    }

    /// Find the shortest augmenting path from `start_row` to a free column.
    ///
    /// Returns the sink column and the path length, or `None` when every
    /// reachable column has infinite reduced cost.
    fn augmenting_path(&mut self, cost: &DMatrix<f64>, start_row: usize) -> Option<(usize, f64)> {
        let num_cols = cost.ncols();
        let mut min_val = 0.0;

        // Reverse order so that ties resolve towards lower column indices
        let mut num_remaining = num_cols;
        for (it, slot) in self.remaining.iter_mut().enumerate() {
            *slot = num_cols - it - 1;
        }

        self.scanned_rows.fill(false);
        self.scanned_cols.fill(false);
        self.shortest_path_costs.fill(f64::INFINITY);

        let mut i = start_row;
        loop {
            self.scanned_rows[i] = true;

            let mut index = None;
            let mut lowest = f64::INFINITY;
            for it in 0..num_remaining {
                let j = self.remaining[it];
                let reduced = min_val + cost[(i, j)] - self.u[i] - self.v[j];
                if reduced < self.shortest_path_costs[j] {
                    self.path[j] = i;
                    self.shortest_path_costs[j] = reduced;
                }

                let spc = self.shortest_path_costs[j];
                if spc < lowest || (spc == lowest && self.row4col[j].is_none()) {
                    lowest = spc;
                    index = Some(it);
                }
            }

            min_val = lowest;
            if min_val == f64::INFINITY {
                return None;
            }

            let index = index?;
            let j = self.remaining[index];
            self.scanned_cols[j] = true;
            num_remaining -= 1;
            self.remaining[index] = self.remaining[num_remaining];

            match self.row4col[j] {
                None => return Some((j, min_val)),
                Some(next_row) => i = next_row,
            }
        }
    }
}

/// Solve for a cost matrix with `rows <= cols`; returns the column of each row.
fn solve_rectangular(cost: &DMatrix<f64>) -> Result<Vec<usize>> {
    let (num_rows, num_cols) = cost.shape();
    let mut ws = Workspace::new(num_rows, num_cols);

    for cur_row in 0..num_rows {
        let (sink, min_val) = ws.augmenting_path(cost, cur_row).ok_or_else(|| {
            Error::AssignmentError("cost matrix admits no finite assignment".to_string())
        })?;

        // Update dual variables
        ws.u[cur_row] += min_val;
        for i in 0..num_rows {
            if ws.scanned_rows[i] && i != cur_row {
                if let Some(j) = ws.col4row[i] {
                    ws.u[i] += min_val - ws.shortest_path_costs[j];
                }
            }
        }
        for j in 0..num_cols {
            if ws.scanned_cols[j] {
                ws.v[j] -= min_val - ws.shortest_path_costs[j];
            }
        }

        // Augment the previous solution along the path
        let mut j = sink;
        loop {
            let i = ws.path[j];
            ws.row4col[j] = Some(i);
            let previous = ws.col4row[i].replace(j);
            if i == cur_row {
                break;
            }
            j = previous.ok_or_else(|| {
                Error::AssignmentError("augmenting path reached an unassigned row".to_string())
            })?;
        }
    }

    ws.col4row
        .into_iter()
        .map(|c| c.ok_or_else(|| Error::AssignmentError("row left unassigned".to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pairs(result: &AssignmentResult) -> Vec<(usize, usize)> {
        result.assignments.iter().map(|a| (a.row_idx, a.col_idx)).collect()
    }

    #[test]
    fn test_linear_sum_assignment_basic_square() {
        let cost = DMatrix::from_row_slice(3, 3, &[
            4.0, 1.0, 3.0,
            2.0, 0.0, 5.0,
            3.0, 2.0, 2.0,
        ]);
        let result = linear_sum_assignment(&cost).unwrap();

        assert_eq!(result.assignments.len(), 3);
        assert!(result.unmatched_rows.is_empty());
        assert!(result.unmatched_cols.is_empty());

        // Optimal: (0,1)=1 + (1,0)=2 + (2,2)=2 = 5
        assert_relative_eq!(result.total_cost(&cost), 5.0, epsilon = 1e-10);
        assert_eq!(pairs(&result), vec![(0, 1), (1, 0), (2, 2)]);
    }

    #[test]
    fn test_linear_sum_assignment_beats_greedy() {
        // Greedy would take (0,0)=1 and be forced into (1,1)=100
        let cost = DMatrix::from_row_slice(2, 2, &[
            1.0, 2.0,
            2.0, 100.0,
        ]);
        let result = linear_sum_assignment(&cost).unwrap();
        assert_eq!(pairs(&result), vec![(0, 1), (1, 0)]);
        assert_relative_eq!(result.total_cost(&cost), 4.0, epsilon = 1e-10);
    }

    #[test]
    fn test_linear_sum_assignment_optimal_matching() {
        let cost = DMatrix::from_row_slice(3, 3, &[
            1.0, 2.0, 3.0,
            2.0, 4.0, 6.0,
            3.0, 6.0, 9.0,
        ]);
        let result = linear_sum_assignment(&cost).unwrap();

        // Anti-diagonal: 3 + 4 + 3 = 10
        assert_eq!(pairs(&result), vec![(0, 2), (1, 1), (2, 0)]);
        assert_relative_eq!(result.total_cost(&cost), 10.0, epsilon = 1e-10);
    }

    #[test]
    fn test_linear_sum_assignment_rectangular_more_rows() {
        let cost = DMatrix::from_row_slice(3, 2, &[
            1.0, 2.0,
            3.0, 4.0,
            5.0, 6.0,
        ]);
        let result = linear_sum_assignment(&cost).unwrap();

        assert_eq!(result.assignments.len(), 2);
        assert_eq!(result.unmatched_rows, vec![2]);
        assert!(result.unmatched_cols.is_empty());
        assert_relative_eq!(result.total_cost(&cost), 5.0, epsilon = 1e-10);
    }

    #[test]
    fn test_linear_sum_assignment_rectangular_more_cols() {
        let cost = DMatrix::from_row_slice(2, 3, &[
            5.0, 1.0, 9.0,
            1.0, 5.0, 9.0,
        ]);
        let result = linear_sum_assignment(&cost).unwrap();

        assert_eq!(pairs(&result), vec![(0, 1), (1, 0)]);
        assert!(result.unmatched_rows.is_empty());
        assert_eq!(result.unmatched_cols, vec![2]);
    }

    #[test]
    fn test_linear_sum_assignment_empty_matrix() {
        let cost = DMatrix::<f64>::zeros(0, 0);
        let result = linear_sum_assignment(&cost).unwrap();

        assert!(result.assignments.is_empty());
        assert!(result.unmatched_rows.is_empty());
        assert!(result.unmatched_cols.is_empty());
    }

    #[test]
    fn test_linear_sum_assignment_empty_columns() {
        let cost = DMatrix::<f64>::zeros(2, 0);
        let result = linear_sum_assignment(&cost).unwrap();

        assert!(result.assignments.is_empty());
        assert_eq!(result.unmatched_rows, vec![0, 1]);
        assert!(result.unmatched_cols.is_empty());
    }

    #[test]
    fn test_linear_sum_assignment_single_element() {
        let cost = DMatrix::from_row_slice(1, 1, &[3.0]);
        let result = linear_sum_assignment(&cost).unwrap();
        assert_eq!(pairs(&result), vec![(0, 0)]);
    }

    #[test]
    fn test_linear_sum_assignment_ties_break_by_index() {
        let cost = DMatrix::<f64>::zeros(3, 3);
        let result = linear_sum_assignment(&cost).unwrap();
        assert_eq!(pairs(&result), vec![(0, 0), (1, 1), (2, 2)]);
    }

    #[test]
    fn test_linear_sum_assignment_deterministic() {
        let cost = DMatrix::from_row_slice(3, 4, &[
            0.3, 0.3, 0.9, 0.1,
            0.3, 0.3, 0.2, 0.8,
            0.5, 0.5, 0.5, 0.5,
        ]);
        let first = pairs(&linear_sum_assignment(&cost).unwrap());
        for _ in 0..10 {
            assert_eq!(pairs(&linear_sum_assignment(&cost).unwrap()), first);
        }
    }

    #[test]
    fn test_linear_sum_assignment_infinite_entries() {
        let cost = DMatrix::from_row_slice(2, 2, &[
            f64::INFINITY, 1.0,
            2.0, f64::INFINITY,
        ]);
        let result = linear_sum_assignment(&cost).unwrap();
        assert_eq!(pairs(&result), vec![(0, 1), (1, 0)]);
    }

    #[test]
    fn test_linear_sum_assignment_infeasible() {
        let cost = DMatrix::from_row_slice(2, 2, &[
            f64::INFINITY, f64::INFINITY,
            1.0, 2.0,
        ]);
        assert!(linear_sum_assignment(&cost).is_err());
    }

    #[test]
    fn test_linear_sum_assignment_rejects_nan() {
        let cost = DMatrix::from_row_slice(1, 2, &[f64::NAN, 1.0]);
        assert!(linear_sum_assignment(&cost).is_err());
    }
}
