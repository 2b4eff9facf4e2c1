//! Quantile binning for histogram-based split finding.
//!
//! Every feature gets an ascending list of cut points. A value's bin is the
//! number of cuts `<= value`, so "bin <= j" is the same as "value < cuts[j]".
//! Splitting on bin `j` therefore exports as `x < cuts[j]`.

use ndarray::{Array2, ArrayView2, Axis};

/// 每個特徵的切點，計算一次後整個訓練過程共用
#[derive(Debug, Clone)]
pub struct FeatureCuts {
    cuts: Vec<Vec<f64>>,
}

impl FeatureCuts {
    pub fn from_rows(rows: ArrayView2<'_, f64>, max_bin: usize) -> Self {
        let max_bin = max_bin.max(2);

        let cuts = rows
            .axis_iter(Axis(1))
            .map(|column| {
                let mut sorted = column.to_vec();
                sorted.sort_by(f64::total_cmp);
                column_cuts(&sorted, max_bin)
            })
            .collect();

        Self { cuts }
    }

    pub fn num_features(&self) -> usize {
        self.cuts.len()
    }

    pub fn num_bins(&self, feature: usize) -> usize {
        self.cuts[feature].len() + 1
    }

    pub fn bin(&self, feature: usize, value: f64) -> u16 {
        self.cuts[feature].partition_point(|&c| c <= value) as u16
    }

    /// 以 bin `j` 分裂時的門檻值
    pub fn threshold(&self, feature: usize, split_bin: usize) -> f64 {
        self.cuts[feature][split_bin]
    }
}

fn column_cuts(sorted: &[f64], max_bin: usize) -> Vec<f64> {
    let Some(&min) = sorted.first() else {
        return Vec::new();
    };

    let mut unique = sorted.to_vec();
    unique.dedup();

    // 不同值夠少時每個值都是一個 bin
    if unique.len() <= max_bin {
        return unique.into_iter().skip(1).collect();
    }

    let n = sorted.len();
    let mut cuts: Vec<f64> = Vec::with_capacity(max_bin);
    for q in 1..max_bin {
        let value = sorted[q * n / max_bin];
        if value > min && cuts.last().map_or(true, |&last| value > last) {
            cuts.push(value);
        }
    }
    cuts
}

/// Bin indices for the whole training matrix, same shape as the input.
#[derive(Debug, Clone)]
pub struct BinnedMatrix {
    bins: Array2<u16>,
}

impl BinnedMatrix {
    pub fn new(rows: ArrayView2<'_, f64>, cuts: &FeatureCuts) -> Self {
        let bins = Array2::from_shape_fn(rows.dim(), |(r, f)| cuts.bin(f, rows[[r, f]]));
        Self { bins }
    }

    #[inline]
    pub fn get(&self, row: usize, feature: usize) -> usize {
        self.bins[[row, feature]] as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_few_unique_values_get_exact_cuts() {
        let rows = array![[0.0], [1.0], [1.0], [2.0]];
        let cuts = FeatureCuts::from_rows(rows.view(), 256);

        assert_eq!(cuts.num_bins(0), 3);
        assert_eq!(cuts.bin(0, 0.0), 0);
        assert_eq!(cuts.bin(0, 1.0), 1);
        assert_eq!(cuts.bin(0, 2.0), 2);
        // bin <= j 與 value < threshold(j) 一致
        assert_eq!(cuts.threshold(0, 0), 1.0);
        assert!(0.5 < cuts.threshold(0, 0));
    }

    #[test]
    fn test_quantile_cuts_are_bounded_and_increasing() {
        let rows = Array2::from_shape_fn((1000, 1), |(i, _)| i as f64);
        let cuts = FeatureCuts::from_rows(rows.view(), 16);

        assert!(cuts.num_bins(0) <= 16);
        for j in 1..cuts.num_bins(0) - 1 {
            assert!(cuts.threshold(0, j) > cuts.threshold(0, j - 1));
        }
    }

    #[test]
    fn test_constant_column_has_single_bin() {
        let rows = array![[3.0, 1.0], [3.0, 2.0]];
        let cuts = FeatureCuts::from_rows(rows.view(), 256);
        assert_eq!(cuts.num_bins(0), 1);
        assert_eq!(cuts.num_bins(1), 2);

        let binned = BinnedMatrix::new(rows.view(), &cuts);
        assert_eq!(binned.get(1, 0), 0);
        assert_eq!(binned.get(1, 1), 1);
    }
}
