// ==========================================
// 基线模型 - 线性回归
// ==========================================
// 对期序号做 OLS，trend_coefficient = 斜率
// trend_enabled = false 时斜率强制为 0，退化为均值模型（R²/MAPE 仍照常评分）
// trend_adjustment = slope · (i - x̄)，即 base = ȳ + trend_adjustment
// ==========================================

use super::{ensure_min_periods, BaselineModel, ModelFit, PeriodEstimate};
use crate::domain::baseline::ModelConfig;
use crate::domain::types::CalculationMethod;
use crate::engine::error::{CalcStage, EngineError, EngineResult};
use crate::engine::stats;

#[derive(Debug, Clone, Copy, Default)]
pub struct LinearRegressionModel;

impl BaselineModel for LinearRegressionModel {
    fn method(&self) -> CalculationMethod {
        CalculationMethod::LinearRegression
    }

    fn min_periods(&self, _config: &ModelConfig) -> usize {
        2
    }

    fn fit(&self, series: &[f64], config: &ModelConfig) -> EngineResult<ModelFit> {
        ensure_min_periods(series, self.min_periods(config))?;

        let (_, fitted_slope) = stats::ols_on_index(series).ok_or_else(|| EngineError::Numeric {
            stage: CalcStage::Fit,
            message: format!("回归设计矩阵奇异 (n={})", series.len()),
        })?;

        let slope = if config.trend_enabled { fitted_slope } else { 0.0 };
        let y_mean = stats::mean(series).unwrap_or(0.0);
        let x_mean = (series.len() - 1) as f64 / 2.0;

        let estimates = (0..series.len())
            .map(|i| {
                let trend_adjustment = slope * (i as f64 - x_mean);
                PeriodEstimate {
                    base_volume: y_mean + trend_adjustment,
                    seasonality_factor: 1.0,
                    trend_adjustment,
                }
            })
            .collect();

        Ok(ModelFit {
            method: self.method(),
            estimates,
            trend_coefficient: slope,
            parameters: vec![
                ("intercept".to_string(), y_mean - slope * x_mean),
                ("fitted_slope".to_string(), fitted_slope),
            ],
        })
    }
}
