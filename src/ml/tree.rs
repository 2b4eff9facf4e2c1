//! Second-order regression tree grown depth-wise on histogram bins.

use crate::ml::histogram::{BinnedMatrix, FeatureCuts};
use ndarray::{Array1, ArrayView1, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_child_weight: f64,
    pub gamma: f64,
    pub reg_alpha: f64,
    pub reg_lambda: f64,
    pub learning_rate: f64,
}

impl TreeParams {
    fn threshold_l1(&self, g: f64) -> f64 {
        if g > self.reg_alpha {
            g - self.reg_alpha
        } else if g < -self.reg_alpha {
            g + self.reg_alpha
        } else {
            0.0
        }
    }

    /// 節點的結構分數 T(G)² / (H + λ)
    fn score(&self, g: f64, h: f64) -> f64 {
        if h < self.min_child_weight || h <= 0.0 {
            return 0.0;
        }
        self.threshold_l1(g).powi(2) / (h + self.reg_lambda)
    }

    /// 已乘上學習率的葉節點權重
    fn weight(&self, g: f64, h: f64) -> f64 {
        if h < self.min_child_weight || h <= 0.0 {
            return 0.0;
        }
        -self.threshold_l1(g) / (h + self.reg_lambda) * self.learning_rate
    }
}

/// A node of the flattened tree. Nodes are stored breadth-first, so the index
/// doubles as the exported `nodeid`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode {
    pub depth: usize,
    /// (feature, threshold, left, right); None for leaves
    pub split: Option<Split>,
    pub leaf_value: f64,
    pub gain: f64,
    pub cover: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Split {
    pub feature: usize,
    pub threshold: f64,
    pub left: usize,
    pub right: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    pub nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    bin: usize,
    gain: f64,
    left_g: f64,
    left_h: f64,
}

impl SplitCandidate {
    // 增益相同時取較小的特徵索引，平行計算下結果仍可重現
    fn better(self, other: Self) -> Self {
        if other.gain > self.gain || (other.gain == self.gain && other.feature < self.feature) {
            other
        } else {
            self
        }
    }
}

struct PendingNode {
    index: usize,
    rows: Vec<usize>,
    g: f64,
    h: f64,
}

impl RegressionTree {
    /// Grows one tree on the sampled `rows` using only `features` as split candidates.
    pub fn grow(
        binned: &BinnedMatrix,
        cuts: &FeatureCuts,
        grad: &Array1<f64>,
        hess: &Array1<f64>,
        rows: Vec<usize>,
        features: &[usize],
        params: &TreeParams,
    ) -> Self {
        let g: f64 = rows.iter().map(|&r| grad[r]).sum();
        let h: f64 = rows.iter().map(|&r| hess[r]).sum();

        let mut nodes = vec![TreeNode {
            depth: 0,
            split: None,
            leaf_value: params.weight(g, h),
            gain: 0.0,
            cover: h,
        }];
        let mut queue = VecDeque::from([PendingNode { index: 0, rows, g, h }]);

        while let Some(node) = queue.pop_front() {
            let depth = nodes[node.index].depth;
            if depth >= params.max_depth || node.rows.len() < 2 {
                continue;
            }

            let Some(best) = find_best_split(binned, cuts, grad, hess, &node, features, params) else {
                continue;
            };

            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = node
                .rows
                .iter()
                .partition(|&&r| binned.get(r, best.feature) <= best.bin);

            let right_g = node.g - best.left_g;
            let right_h = node.h - best.left_h;
            let left = nodes.len();
            let right = left + 1;

            nodes.push(TreeNode {
                depth: depth + 1,
                split: None,
                leaf_value: params.weight(best.left_g, best.left_h),
                gain: 0.0,
                cover: best.left_h,
            });
            nodes.push(TreeNode {
                depth: depth + 1,
                split: None,
                leaf_value: params.weight(right_g, right_h),
                gain: 0.0,
                cover: right_h,
            });

            let parent = &mut nodes[node.index];
            parent.gain = best.gain;
            parent.split = Some(Split {
                feature: best.feature,
                threshold: cuts.threshold(best.feature, best.bin),
                left,
                right,
            });

            queue.push_back(PendingNode {
                index: left,
                rows: left_rows,
                g: best.left_g,
                h: best.left_h,
            });
            queue.push_back(PendingNode {
                index: right,
                rows: right_rows,
                g: right_g,
                h: right_h,
            });
        }

        Self { nodes }
    }

    pub fn predict(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut idx = 0;
        loop {
            let node = &self.nodes[idx];
            match node.split {
                Some(split) => {
                    idx = if row[split.feature] < split.threshold {
                        split.left
                    } else {
                        split.right
                    };
                }
                None => return node.leaf_value,
            }
        }
    }

    /// 每一列的葉節點輸出
    pub fn predict_batch(&self, rows: ArrayView2<'_, f64>) -> Array1<f64> {
        rows.outer_iter().map(|row| self.predict(row)).collect()
    }

    pub fn num_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.split.is_none()).count()
    }
}

fn find_best_split(
    binned: &BinnedMatrix,
    cuts: &FeatureCuts,
    grad: &Array1<f64>,
    hess: &Array1<f64>,
    node: &PendingNode,
    features: &[usize],
    params: &TreeParams,
) -> Option<SplitCandidate> {
    let parent_score = params.score(node.g, node.h);

    features
        .par_iter()
        .filter_map(|&feature| {
            let num_bins = cuts.num_bins(feature);
            if num_bins < 2 {
                return None;
            }

            let mut hist = vec![(0.0f64, 0.0f64); num_bins];
            for &r in &node.rows {
                let slot = &mut hist[binned.get(r, feature)];
                slot.0 += grad[r];
                slot.1 += hess[r];
            }

            let mut best: Option<SplitCandidate> = None;
            let (mut left_g, mut left_h) = (0.0, 0.0);
            // 最後一個 bin 不能當切點，右子節點會是空的
            for (bin, &(bg, bh)) in hist.iter().enumerate().take(num_bins - 1) {
                left_g += bg;
                left_h += bh;
                let right_g = node.g - left_g;
                let right_h = node.h - left_h;
                if left_h < params.min_child_weight || right_h < params.min_child_weight {
                    continue;
                }
                if left_h + params.reg_lambda <= 0.0 || right_h + params.reg_lambda <= 0.0 {
                    continue;
                }

                let gain = params.score(left_g, left_h) + params.score(right_g, right_h) - parent_score;
                if gain <= params.gamma || !gain.is_finite() {
                    continue;
                }

                let candidate = SplitCandidate {
                    feature,
                    bin,
                    gain,
                    left_g,
                    left_h,
                };
                best = Some(match best {
                    Some(current) if current.gain >= gain => current,
                    _ => candidate,
                });
            }
            best
        })
        .reduce_with(SplitCandidate::better)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{aview1, array, Array2};

    fn params() -> TreeParams {
        TreeParams {
            max_depth: 3,
            min_child_weight: 0.0,
            gamma: 0.0,
            reg_alpha: 0.0,
            reg_lambda: 1.0,
            learning_rate: 1.0,
        }
    }

    fn fit(rows: &Array2<f64>, grad: &Array1<f64>, params: &TreeParams) -> RegressionTree {
        let cuts = FeatureCuts::from_rows(rows.view(), 256);
        let binned = BinnedMatrix::new(rows.view(), &cuts);
        let hess = Array1::ones(rows.nrows());
        let features: Vec<usize> = (0..cuts.num_features()).collect();
        RegressionTree::grow(
            &binned,
            &cuts,
            grad,
            &hess,
            (0..rows.nrows()).collect(),
            &features,
            params,
        )
    }

    #[test]
    fn test_splits_on_informative_feature() {
        // 特徵 1 可以完美分開梯度符號，特徵 0 是雜訊
        let rows = array![[0.3, -2.0], [0.1, -1.0], [0.2, 1.0], [0.4, 2.0]];
        let grad = array![1.0, 1.0, -1.0, -1.0];
        let tree = fit(&rows, &grad, &TreeParams { max_depth: 1, ..params() });

        let root = tree.nodes[0].split.expect("root should split");
        assert_eq!(root.feature, 1);
        assert_eq!(root.threshold, 1.0);
        assert_eq!(tree.num_leaves(), 2);
        // 左邊 G=2, H=2 → w = -2/3
        assert!((tree.predict(aview1(&[0.0, -5.0])) + 2.0 / 3.0).abs() < 1e-12);
        assert!((tree.predict(aview1(&[0.0, 5.0])) - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_gamma_prunes_weak_split() {
        let rows = array![[0.0], [1.0]];
        let grad = array![0.1, -0.1];
        let tree = fit(&rows, &grad, &TreeParams { gamma: 10.0, ..params() });
        assert_eq!(tree.nodes.len(), 1);
    }

    #[test]
    fn test_min_child_weight_blocks_small_children() {
        let rows = array![[0.0], [1.0], [2.0]];
        let grad = array![1.0, -1.0, -1.0];
        let tree = fit(&rows, &grad, &TreeParams { min_child_weight: 2.0, ..params() });
        // 任何切法都有一邊只有 1 個樣本 (H=1)
        assert!(tree.nodes[0].split.is_none());
    }

    #[test]
    fn test_l1_shrinks_leaf_to_zero() {
        let rows = array![[0.0], [1.0]];
        let grad = array![0.2, 0.2];
        let tree = fit(&rows, &grad, &TreeParams { reg_alpha: 1.0, ..params() });
        assert_eq!(tree.predict(aview1(&[0.0])), 0.0);
    }

    #[test]
    fn test_nodes_are_breadth_first() {
        let rows = Array2::from_shape_fn((8, 1), |(i, _)| i as f64);
        let grad = array![3.0, 1.0, -1.0, -3.0, 3.0, 1.0, -1.0, -3.0];
        let tree = fit(&rows, &grad, &params());

        let mut last_depth = 0;
        for node in &tree.nodes {
            assert!(node.depth >= last_depth);
            last_depth = node.depth;
        }
        for (i, node) in tree.nodes.iter().enumerate() {
            if let Some(split) = node.split {
                assert!(split.left > i && split.right == split.left + 1);
            }
        }
    }

    #[test]
    fn test_predict_batch_matches_rows() {
        let rows = array![[0.3, -2.0], [0.1, -1.0], [0.2, 1.0], [0.4, 2.0]];
        let grad = array![1.0, 1.0, -1.0, -1.0];
        let tree = fit(&rows, &grad, &params());

        let batch = tree.predict_batch(rows.view());
        for (row, &value) in rows.outer_iter().zip(batch.iter()) {
            assert_eq!(tree.predict(row), value);
        }
    }
}
