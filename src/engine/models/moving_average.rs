// ==========================================
// 基线模型 - 移动平均 / 加权移动平均
// ==========================================
// 窗口: 严格位于当前期之前的最近 w 期（w <= 窗口上限），不做前视
// 首期: 没有任何前序期，回退为全序列均值
//       这是唯一依赖本期及后续实际值的一期，从第 2 期起严格不前视
// 加权: 最近一期权重 = 窗口长度，最早一期权重 = 1，归一化后求和为 1
// ==========================================

use super::{ensure_min_periods, BaselineModel, ModelFit, PeriodEstimate};
use crate::domain::baseline::ModelConfig;
use crate::domain::types::CalculationMethod;
use crate::engine::error::EngineResult;
use crate::engine::stats;

/// 取第 i 期之前的尾随窗口
fn trailing_window(series: &[f64], i: usize, max_window: usize) -> &[f64] {
    let start = i.saturating_sub(max_window);
    &series[start..i]
}

/// 线性递减权重的加权均值，window 按时间升序
fn linear_weighted_mean(window: &[f64]) -> Option<f64> {
    if window.is_empty() {
        return None;
    }
    let k = window.len();
    let weight_sum = (k * (k + 1) / 2) as f64;
    let total: f64 = window
        .iter()
        .enumerate()
        .map(|(pos, v)| (pos + 1) as f64 * v)
        .sum();
    Some(total / weight_sum)
}

// ==========================================
// MovingAverageModel
// ==========================================
#[derive(Debug, Clone)]
pub struct MovingAverageModel {
    max_window: usize,
}

impl MovingAverageModel {
    pub fn new(max_window: usize) -> Self {
        Self {
            max_window: max_window.max(1),
        }
    }
}

impl BaselineModel for MovingAverageModel {
    fn method(&self) -> CalculationMethod {
        CalculationMethod::MovingAverage
    }

    fn min_periods(&self, _config: &ModelConfig) -> usize {
        1
    }

    fn fit(&self, series: &[f64], config: &ModelConfig) -> EngineResult<ModelFit> {
        ensure_min_periods(series, self.min_periods(config))?;
        let fallback = stats::mean(series).unwrap_or(0.0);

        let estimates = (0..series.len())
            .map(|i| {
                let window = trailing_window(series, i, self.max_window);
                PeriodEstimate::flat(stats::mean(window).unwrap_or(fallback))
            })
            .collect();

        Ok(ModelFit {
            method: self.method(),
            estimates,
            trend_coefficient: 0.0,
            parameters: vec![("max_window".to_string(), self.max_window as f64)],
        })
    }
}

// ==========================================
// WeightedMovingAverageModel
// ==========================================
#[derive(Debug, Clone)]
pub struct WeightedMovingAverageModel {
    max_window: usize,
}

impl WeightedMovingAverageModel {
    pub fn new(max_window: usize) -> Self {
        Self {
            max_window: max_window.max(1),
        }
    }
}

impl BaselineModel for WeightedMovingAverageModel {
    fn method(&self) -> CalculationMethod {
        CalculationMethod::WeightedMovingAverage
    }

    fn min_periods(&self, _config: &ModelConfig) -> usize {
        1
    }

    fn fit(&self, series: &[f64], config: &ModelConfig) -> EngineResult<ModelFit> {
        ensure_min_periods(series, self.min_periods(config))?;
        let fallback = stats::mean(series).unwrap_or(0.0);

        let estimates = (0..series.len())
            .map(|i| {
                let window = trailing_window(series, i, self.max_window);
                PeriodEstimate::flat(linear_weighted_mean(window).unwrap_or(fallback))
            })
            .collect();

        Ok(ModelFit {
            method: self.method(),
            estimates,
            trend_coefficient: 0.0,
            parameters: vec![("max_window".to_string(), self.max_window as f64)],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Granularity;

    fn config() -> ModelConfig {
        ModelConfig {
            granularity: Granularity::Weekly,
            seasonality_enabled: false,
            trend_enabled: false,
        }
    }

    fn ramp(n: usize) -> Vec<f64> {
        (0..n).map(|i| 10.0 * (i + 1) as f64).collect()
    }

    #[test]
    fn test_moving_average_has_no_look_ahead() {
        let model = MovingAverageModel::new(12);
        let series = ramp(20);
        let base = model.fit(&series, &config()).unwrap().fitted_values();

        for i in 1..series.len() {
            // 篡改第 i 期及之后的实际值，第 i 期基线不应变化
            let mut tampered = series.clone();
            for v in tampered.iter_mut().skip(i) {
                *v *= 7.0;
            }
            let other = model.fit(&tampered, &config()).unwrap().fitted_values();
            assert_eq!(base[i], other[i], "period {} depends on future values", i);
        }
    }

    #[test]
    fn test_first_period_falls_back_to_series_mean() {
        let series = ramp(10);
        let mut tampered = series.clone();
        tampered[9] = 1_000.0;

        let ma = MovingAverageModel::new(12);
        let wma = WeightedMovingAverageModel::new(12);
        for model in [&ma as &dyn BaselineModel, &wma] {
            let base = model.fit(&series, &config()).unwrap().fitted_values();
            let other = model.fit(&tampered, &config()).unwrap().fitted_values();
            assert_eq!(base[0], 55.0);
            assert_eq!(other[0], (550.0 - 100.0 + 1_000.0) / 10.0);
            // 首期之外不受末期篡改影响
            assert_eq!(base[1..9], other[1..9]);
        }
    }

    #[test]
    fn test_moving_average_window_values() {
        let model = MovingAverageModel::new(3);
        let series = ramp(6); // 10,20,30,40,50,60
        let base = model.fit(&series, &config()).unwrap().fitted_values();
        assert_eq!(base[0], 35.0); // 首期: 全序列均值
        assert_eq!(base[1], 10.0);
        assert_eq!(base[2], 15.0);
        assert_eq!(base[3], 20.0);
        assert_eq!(base[5], 40.0); // 30,40,50
    }

    #[test]
    fn test_weighted_moving_average_weights() {
        let model = WeightedMovingAverageModel::new(3);
        let series = ramp(5); // 10,20,30,40,50
        let base = model.fit(&series, &config()).unwrap().fitted_values();
        // 第 3 期 (i=3): 窗口 10,20,30，权重 1,2,3 / 6
        assert!((base[3] - (10.0 + 40.0 + 90.0) / 6.0).abs() < 1e-9);
        // 第 4 期 (i=4): 窗口 20,30,40
        assert!((base[4] - (20.0 + 60.0 + 120.0) / 6.0).abs() < 1e-9);
        // 第 2 期 (i=2): 窗口 10,20，权重 1,2 / 3
        assert!((base[2] - 50.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_moving_average_has_no_look_ahead() {
        let model = WeightedMovingAverageModel::new(12);
        let series = ramp(15);
        let base = model.fit(&series, &config()).unwrap().fitted_values();
        let mut tampered = series.clone();
        tampered[10] = 10_000.0;
        let other = model.fit(&tampered, &config()).unwrap().fitted_values();
        for i in 1..=10 {
            assert_eq!(base[i], other[i]);
        }
        assert_ne!(base[11], other[11]);
    }
}
