//! Second-order regression tree with per-node gain and cover
//!
//! Split scoring follows the XGBoost formulation:
//! - leaf weight: w* = -G / (H + lambda), soft-thresholded by alpha
//! - split gain: 0.5 * [GL²/(HL+λ) + GR²/(HR+λ) - (GL+GR)²/(HL+HR+λ)]
//!
//! Nodes are stored flat so attribution can walk them by index.

use ndarray::{Array1, ArrayView1, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::BoosterConfig;

/// A node of a fitted tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        weight: f64,
        cover: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        gain: f64,
        cover: f64,
    },
}

impl TreeNode {
    pub fn cover(&self) -> f64 {
        match self {
            TreeNode::Leaf { cover, .. } | TreeNode::Split { cover, .. } => *cover,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Gradient statistics a tree is grown against
pub(crate) struct GradientPair<'a> {
    pub grad: &'a Array1<f64>,
    pub hess: &'a Array1<f64>,
}

/// Regression tree fitted to gradients of a squared-error objective
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    /// Grow a tree over `rows`, considering only `features` for splits
    pub(crate) fn grow(
        x: ArrayView2<'_, f64>,
        gradients: &GradientPair<'_>,
        rows: &[usize],
        features: &[usize],
        config: &BoosterConfig,
    ) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow_node(x, gradients, rows, features, 0, config);
        tree
    }

    fn grow_node(
        &mut self,
        x: ArrayView2<'_, f64>,
        gradients: &GradientPair<'_>,
        rows: &[usize],
        features: &[usize],
        depth: usize,
        config: &BoosterConfig,
    ) -> usize {
        let g_sum: f64 = rows.iter().map(|&i| gradients.grad[i]).sum();
        let h_sum: f64 = rows.iter().map(|&i| gradients.hess[i]).sum();
        let weight = leaf_weight(g_sum, h_sum, config.reg_lambda, config.reg_alpha);

        let node_id = self.nodes.len();
        self.nodes.push(TreeNode::Leaf { weight, cover: h_sum });

        if depth >= config.max_depth || rows.len() < 2 || h_sum < config.min_child_weight {
            return node_id;
        }

        let best = features
            .par_iter()
            .filter_map(|&f| best_split_for_feature(x, gradients, rows, f, config))
            .max_by(|a, b| a.gain.partial_cmp(&b.gain).unwrap_or(std::cmp::Ordering::Equal));

        let Some(split) = best.filter(|s| s.gain > config.gamma) else {
            return node_id;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&i| x[[i, split.feature]] <= split.threshold);

        if left_rows.is_empty() || right_rows.is_empty() {
            return node_id;
        }

        let left = self.grow_node(x, gradients, &left_rows, features, depth + 1, config);
        let right = self.grow_node(x, gradients, &right_rows, features, depth + 1, config);

        self.nodes[node_id] = TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
            gain: split.gain,
            cover: h_sum,
        };
        node_id
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    /// Number of leaves
    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::Leaf { .. }))
            .count()
    }

    /// Raw leaf weight reached by `row`
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                None => return 0.0,
                Some(TreeNode::Leaf { weight, .. }) => return *weight,
                Some(TreeNode::Split { feature, threshold, left, right, .. }) => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Cover-weighted mean leaf weight
    pub fn expected_value(&self) -> f64 {
        if self.nodes.is_empty() {
            return 0.0;
        }
        self.node_expectation(0)
    }

    fn node_expectation(&self, idx: usize) -> f64 {
        match &self.nodes[idx] {
            TreeNode::Leaf { weight, .. } => *weight,
            TreeNode::Split { left, right, .. } => {
                let cl = self.nodes[*left].cover();
                let cr = self.nodes[*right].cover();
                let total = cl + cr;
                if total <= 0.0 {
                    return 0.5 * (self.node_expectation(*left) + self.node_expectation(*right));
                }
                (cl * self.node_expectation(*left) + cr * self.node_expectation(*right)) / total
            }
        }
    }

    /// Add `(split count, summed gain)` per feature into the accumulators
    pub(crate) fn accumulate_gain(&self, counts: &mut [usize], gains: &mut [f64]) {
        for node in &self.nodes {
            if let TreeNode::Split { feature, gain, .. } = node {
                if *feature < counts.len() {
                    counts[*feature] += 1;
                    gains[*feature] += gain;
                }
            }
        }
    }

    /// Path-dependent TreeSHAP: add this tree's attributions for `row`,
    /// scaled by `scale`, into `phi`.
    pub(crate) fn add_shap_values(&self, row: ArrayView1<'_, f64>, scale: f64, phi: &mut [f64]) {
        if self.nodes.is_empty() {
            return;
        }
        let walker = ShapWalker { tree: self, row, scale };
        walker.recurse(0, &[], 0, 1.0, 1.0, None, phi);
    }
}

fn leaf_weight(g_sum: f64, h_sum: f64, lambda: f64, alpha: f64) -> f64 {
    let denom = h_sum + lambda;
    if denom <= 0.0 {
        return 0.0;
    }
    if alpha > 0.0 {
        let g_adj = if g_sum > alpha {
            g_sum - alpha
        } else if g_sum < -alpha {
            g_sum + alpha
        } else {
            return 0.0;
        };
        -g_adj / denom
    } else {
        -g_sum / denom
    }
}

fn best_split_for_feature(
    x: ArrayView2<'_, f64>,
    gradients: &GradientPair<'_>,
    rows: &[usize],
    feature: usize,
    config: &BoosterConfig,
) -> Option<SplitCandidate> {
    let mut sorted: Vec<usize> = rows.to_vec();
    sorted.sort_by(|&a, &b| {
        x[[a, feature]]
            .partial_cmp(&x[[b, feature]])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let g_total: f64 = sorted.iter().map(|&i| gradients.grad[i]).sum();
    let h_total: f64 = sorted.iter().map(|&i| gradients.hess[i]).sum();
    let lambda = config.reg_lambda;
    let parent_score = g_total * g_total / (h_total + lambda);

    let mut g_left = 0.0;
    let mut h_left = 0.0;
    let mut best: Option<SplitCandidate> = None;

    for (pos, &idx) in sorted.iter().enumerate().take(sorted.len().saturating_sub(1)) {
        g_left += gradients.grad[idx];
        h_left += gradients.hess[idx];

        let current = x[[idx, feature]];
        let next = x[[sorted[pos + 1], feature]];
        if (next - current).abs() < 1e-12 {
            continue;
        }

        let g_right = g_total - g_left;
        let h_right = h_total - h_left;
        if h_left < config.min_child_weight || h_right < config.min_child_weight {
            continue;
        }

        let gain = 0.5
            * (g_left * g_left / (h_left + lambda) + g_right * g_right / (h_right + lambda)
                - parent_score);

        if best.map_or(true, |b| gain > b.gain) {
            best = Some(SplitCandidate {
                feature,
                threshold: (current + next) / 2.0,
                gain,
            });
        }
    }

    best
}

// ─── TreeSHAP ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct PathElement {
    feature: Option<usize>,
    zero_fraction: f64,
    one_fraction: f64,
    pweight: f64,
}

struct ShapWalker<'a, 'r> {
    tree: &'a RegressionTree,
    row: ArrayView1<'r, f64>,
    scale: f64,
}

impl ShapWalker<'_, '_> {
    #[allow(clippy::too_many_arguments)]
    fn recurse(
        &self,
        node: usize,
        parent_path: &[PathElement],
        unique_depth: usize,
        zero_fraction: f64,
        one_fraction: f64,
        feature: Option<usize>,
        phi: &mut [f64],
    ) {
        let mut path = parent_path.to_vec();
        extend_path(&mut path, unique_depth, zero_fraction, one_fraction, feature);

        match &self.tree.nodes[node] {
            TreeNode::Leaf { weight, .. } => {
                for i in 1..=unique_depth {
                    let w = unwound_path_sum(&path, unique_depth, i);
                    let el = path[i];
                    if let Some(f) = el.feature {
                        phi[f] += w * (el.one_fraction - el.zero_fraction) * weight * self.scale;
                    }
                }
            }
            TreeNode::Split { feature: split, threshold, left, right, cover, .. } => {
                let (hot, cold) = if self.row[*split] <= *threshold {
                    (*left, *right)
                } else {
                    (*right, *left)
                };
                let hot_zero = ratio(self.tree.nodes[hot].cover(), *cover);
                let cold_zero = ratio(self.tree.nodes[cold].cover(), *cover);

                let mut incoming_zero = 1.0;
                let mut incoming_one = 1.0;
                let mut depth = unique_depth;
                if let Some(k) = (1..=depth).find(|&k| path[k].feature == Some(*split)) {
                    incoming_zero = path[k].zero_fraction;
                    incoming_one = path[k].one_fraction;
                    unwind_path(&mut path, depth, k);
                    depth -= 1;
                }

                self.recurse(
                    hot,
                    &path,
                    depth + 1,
                    hot_zero * incoming_zero,
                    incoming_one,
                    Some(*split),
                    phi,
                );
                self.recurse(
                    cold,
                    &path,
                    depth + 1,
                    cold_zero * incoming_zero,
                    0.0,
                    Some(*split),
                    phi,
                );
            }
        }
    }
}

fn ratio(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole
    } else {
        0.0
    }
}

fn extend_path(
    path: &mut Vec<PathElement>,
    unique_depth: usize,
    zero_fraction: f64,
    one_fraction: f64,
    feature: Option<usize>,
) {
    path.push(PathElement {
        feature,
        zero_fraction,
        one_fraction,
        pweight: if unique_depth == 0 { 1.0 } else { 0.0 },
    });
    let d = (unique_depth + 1) as f64;
    for i in (0..unique_depth).rev() {
        path[i + 1].pweight += one_fraction * path[i].pweight * (i + 1) as f64 / d;
        path[i].pweight = zero_fraction * path[i].pweight * (unique_depth - i) as f64 / d;
    }
}

fn unwind_path(path: &mut Vec<PathElement>, unique_depth: usize, path_index: usize) {
    let one_fraction = path[path_index].one_fraction;
    let zero_fraction = path[path_index].zero_fraction;
    let d = (unique_depth + 1) as f64;
    let mut next_one_portion = path[unique_depth].pweight;

    for i in (0..unique_depth).rev() {
        if one_fraction != 0.0 {
            let tmp = path[i].pweight;
            path[i].pweight = next_one_portion * d / ((i + 1) as f64 * one_fraction);
            next_one_portion =
                tmp - path[i].pweight * zero_fraction * (unique_depth - i) as f64 / d;
        } else {
            path[i].pweight = path[i].pweight * d / (zero_fraction * (unique_depth - i) as f64);
        }
    }

    for i in path_index..unique_depth {
        path[i].feature = path[i + 1].feature;
        path[i].zero_fraction = path[i + 1].zero_fraction;
        path[i].one_fraction = path[i + 1].one_fraction;
    }
    path.pop();
}

fn unwound_path_sum(path: &[PathElement], unique_depth: usize, path_index: usize) -> f64 {
    let one_fraction = path[path_index].one_fraction;
    let zero_fraction = path[path_index].zero_fraction;
    let d = (unique_depth + 1) as f64;
    let mut next_one_portion = path[unique_depth].pweight;
    let mut total = 0.0;

    for i in (0..unique_depth).rev() {
        if one_fraction != 0.0 {
            let tmp = next_one_portion * d / ((i + 1) as f64 * one_fraction);
            total += tmp;
            next_one_portion =
                path[i].pweight - tmp * zero_fraction * (unique_depth - i) as f64 / d;
        } else if zero_fraction != 0.0 {
            total += path[i].pweight / zero_fraction / ((unique_depth - i) as f64 / d);
        }
    }
    total
}
