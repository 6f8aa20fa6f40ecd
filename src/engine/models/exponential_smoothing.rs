// ==========================================
// 基线模型 - 指数平滑
// ==========================================
// trend_enabled = false: 单指数平滑，α 在固定网格上按样本内 MAPE 最小选取
// trend_enabled = true : Holt 双指数平滑，(α, β) 在同一网格上联合选取
// 拟合值为一步前预测（第 t 期只用到 t 之前的实际值）
// 无正实际值时 MAPE 不可算，改用 MSE 选参
// ==========================================

use super::{ensure_min_periods, BaselineModel, ModelFit, PeriodEstimate};
use crate::domain::baseline::ModelConfig;
use crate::domain::types::CalculationMethod;
use crate::engine::error::{CalcStage, EngineError, EngineResult};
use crate::engine::stats;

#[derive(Debug, Clone)]
pub struct ExponentialSmoothingModel {
    grid: Vec<f64>,
}

/// 一次平滑运行的结果
struct SmoothingRun {
    fitted: Vec<f64>,
    trend_terms: Vec<f64>,
    final_trend: f64,
}

impl ExponentialSmoothingModel {
    pub fn new(grid: Vec<f64>) -> Self {
        let mut grid: Vec<f64> = grid.into_iter().filter(|a| *a > 0.0 && *a < 1.0).collect();
        grid.sort_by(|a, b| a.total_cmp(b));
        grid.dedup();
        Self { grid }
    }

    /// 单指数平滑
    fn run_simple(series: &[f64], alpha: f64) -> SmoothingRun {
        let mut fitted = Vec::with_capacity(series.len());
        let mut level = series[0];
        fitted.push(level);
        for &x in &series[1..] {
            fitted.push(level);
            level = alpha * x + (1.0 - alpha) * level;
        }
        SmoothingRun {
            trend_terms: vec![0.0; series.len()],
            fitted,
            final_trend: 0.0,
        }
    }

    /// Holt 双指数平滑
    fn run_holt(series: &[f64], alpha: f64, beta: f64) -> SmoothingRun {
        let mut fitted = Vec::with_capacity(series.len());
        let mut trend_terms = Vec::with_capacity(series.len());
        let mut level = series[0];
        let mut trend = series[1] - series[0];
        fitted.push(series[0]);
        trend_terms.push(0.0);

        for &x in &series[1..] {
            fitted.push(level + trend);
            trend_terms.push(trend);
            let prev_level = level;
            level = alpha * x + (1.0 - alpha) * (level + trend);
            trend = beta * (level - prev_level) + (1.0 - beta) * trend;
        }

        SmoothingRun {
            fitted,
            trend_terms,
            final_trend: trend,
        }
    }

    /// 选参损失: 首期为种子，不参与评估
    fn loss(series: &[f64], fitted: &[f64]) -> f64 {
        if let Some(m) = stats::mape(&series[1..], &fitted[1..]) {
            return m;
        }
        let sq: Vec<f64> = series[1..]
            .iter()
            .zip(&fitted[1..])
            .map(|(a, f)| (a - f) * (a - f))
            .collect();
        stats::mean(&sq).unwrap_or(0.0)
    }
}

impl BaselineModel for ExponentialSmoothingModel {
    fn method(&self) -> CalculationMethod {
        CalculationMethod::ExponentialSmoothing
    }

    fn min_periods(&self, config: &ModelConfig) -> usize {
        if config.trend_enabled {
            3
        } else {
            2
        }
    }

    fn fit(&self, series: &[f64], config: &ModelConfig) -> EngineResult<ModelFit> {
        ensure_min_periods(series, self.min_periods(config))?;
        if self.grid.is_empty() {
            return Err(EngineError::Numeric {
                stage: CalcStage::Fit,
                message: "平滑系数网格为空".to_string(),
            });
        }

        // 严格小于才替换: 损失相同时保留较小的系数
        let mut best: Option<(f64, f64, f64, SmoothingRun)> = None;
        for &alpha in &self.grid {
            let betas: &[f64] = if config.trend_enabled { &self.grid } else { &[0.0] };
            for &beta in betas {
                let run = if config.trend_enabled {
                    Self::run_holt(series, alpha, beta)
                } else {
                    Self::run_simple(series, alpha)
                };
                let loss = Self::loss(series, &run.fitted);
                let better = match &best {
                    Some((best_loss, _, _, _)) => loss < *best_loss,
                    None => true,
                };
                if better {
                    best = Some((loss, alpha, beta, run));
                }
            }
        }

        let (loss, alpha, beta, run) = best.ok_or_else(|| EngineError::Numeric {
            stage: CalcStage::Fit,
            message: "指数平滑选参失败".to_string(),
        })?;

        tracing::debug!(alpha, beta, loss, trend = config.trend_enabled, "指数平滑选参完成");

        let estimates = run
            .fitted
            .iter()
            .zip(run.trend_terms.iter())
            .map(|(f, t)| PeriodEstimate {
                base_volume: *f,
                seasonality_factor: 1.0,
                trend_adjustment: *t,
            })
            .collect();

        let mut parameters = vec![("alpha".to_string(), alpha), ("loss".to_string(), loss)];
        if config.trend_enabled {
            parameters.push(("beta".to_string(), beta));
        }

        Ok(ModelFit {
            method: self.method(),
            estimates,
            trend_coefficient: run.final_trend,
            parameters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Granularity;

    fn model() -> ExponentialSmoothingModel {
        ExponentialSmoothingModel::new((1..=9).map(|i| i as f64 / 10.0).collect())
    }

    fn config(trend_enabled: bool) -> ModelConfig {
        ModelConfig {
            granularity: Granularity::Weekly,
            seasonality_enabled: false,
            trend_enabled,
        }
    }

    #[test]
    fn test_simple_smoothing_constant_series() {
        let fit = model().fit(&[50.0; 8], &config(false)).unwrap();
        for e in &fit.estimates {
            assert_eq!(e.base_volume, 50.0);
        }
        assert_eq!(fit.trend_coefficient, 0.0);
        // 损失全为 0 时保留网格中最小的 α
        assert_eq!(fit.parameters[0], ("alpha".to_string(), 0.1));
    }

    #[test]
    fn test_simple_smoothing_is_one_step_ahead() {
        let series = [10.0, 20.0, 30.0, 40.0];
        let fit = model().fit(&series, &config(false)).unwrap();
        let fitted = fit.fitted_values();
        // 第 1 期预测只取决于第 0 期
        assert_eq!(fitted[1], 10.0);
        assert!(fitted[3] < 40.0);
    }

    #[test]
    fn test_holt_tracks_linear_trend() {
        let series: Vec<f64> = (0..20).map(|i| 100.0 + 3.0 * i as f64).collect();
        let fit = model().fit(&series, &config(true)).unwrap();
        assert!((fit.trend_coefficient - 3.0).abs() < 1e-6);
        let fitted = fit.fitted_values();
        for i in 1..series.len() {
            assert!((fitted[i] - series[i]).abs() < 1e-6);
        }
    }

    #[test]
    fn test_holt_needs_three_periods() {
        let err = model().fit(&[1.0, 2.0], &config(true)).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData { required: 3, .. }));
    }
}
