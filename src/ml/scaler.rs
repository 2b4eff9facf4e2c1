//! Z-score normalization fitted on the training split.

use ndarray::{Array1, Array2, Axis};

#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    pub means: Array1<f64>,
    /// 母體標準差 (ddof = 0)，常數欄位以 1.0 代替
    pub stds: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(data: &Array2<f64>) -> Self {
        let width = data.ncols();
        if data.nrows() == 0 {
            return Self {
                means: Array1::zeros(width),
                stds: Array1::ones(width),
            };
        }

        let means = data
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(width));
        let mut stds = data.std_axis(Axis(0), 0.0);
        stds.mapv_inplace(|s| if s == 0.0 { 1.0 } else { s });

        Self { means, stds }
    }

    pub fn transform(&self, data: &Array2<f64>) -> Array2<f64> {
        (data - &self.means) / &self.stds
    }
}
