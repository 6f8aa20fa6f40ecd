// ==========================================
// 基线模型 - 季节分解（乘法）
// ==========================================
// 1. 宽度 = 一个季节周期的居中移动平均提取趋势（偶数周期用 2×m 移动平均）
// 2. 两端无法居中的期按内部趋势的线性拟合外推
// 3. 实际值 / 趋势 → 按季节位置求均值 → 归一化为均值 1 的季节因子
// 4. base = trend · seasonality_factor
// 开关: seasonality_enabled = false 时因子固定为 1（仅趋势）
//       trend_enabled = false 时趋势固定为序列均值（仅季节）
// 红线: 序列短于一个季节周期直接报 InsufficientSeasonalHistory
// ==========================================

use super::{ensure_min_periods, BaselineModel, ModelFit, PeriodEstimate};
use crate::domain::baseline::ModelConfig;
use crate::domain::types::CalculationMethod;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::stats;

/// 季节因子下限，保证因子 > 0
const MIN_SEASONALITY_FACTOR: f64 = 0.01;

#[derive(Debug, Clone, Copy, Default)]
pub struct SeasonalDecompositionModel;

impl BaselineModel for SeasonalDecompositionModel {
    fn method(&self) -> CalculationMethod {
        CalculationMethod::SeasonalDecomposition
    }

    fn min_periods(&self, config: &ModelConfig) -> usize {
        config.granularity.seasonal_cycle()
    }

    fn fit(&self, series: &[f64], config: &ModelConfig) -> EngineResult<ModelFit> {
        ensure_min_periods(series, 1)?;
        let cycle = config.granularity.seasonal_cycle();
        if series.len() < cycle {
            return Err(EngineError::InsufficientSeasonalHistory {
                granularity: config.granularity,
                required: cycle,
                available: series.len(),
            });
        }

        let level = stats::mean(series).unwrap_or(0.0);
        let trend = if config.trend_enabled {
            fill_edges(centered_moving_average(series, cycle), level)
        } else {
            vec![level; series.len()]
        };

        let factors = if config.seasonality_enabled {
            seasonal_factors(series, &trend, cycle)
        } else {
            vec![1.0; cycle]
        };

        let trend_mean = stats::mean(&trend).unwrap_or(level);
        let estimates = trend
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let factor = factors[i % cycle];
                PeriodEstimate {
                    base_volume: t * factor,
                    seasonality_factor: factor,
                    trend_adjustment: t - trend_mean,
                }
            })
            .collect();

        let trend_coefficient = if config.trend_enabled {
            stats::ols_on_index(&trend).map(|(_, slope)| slope).unwrap_or(0.0)
        } else {
            0.0
        };

        let mut parameters = vec![("cycle".to_string(), cycle as f64)];
        parameters.extend(
            factors
                .iter()
                .enumerate()
                .map(|(p, f)| (format!("season_{}", p + 1), *f)),
        );

        Ok(ModelFit {
            method: self.method(),
            estimates,
            trend_coefficient,
            parameters,
        })
    }
}

/// 居中移动平均，无法居中的位置为 None
fn centered_moving_average(series: &[f64], width: usize) -> Vec<Option<f64>> {
    let n = series.len();
    let mut out = vec![None; n];
    if width == 0 {
        return out;
    }

    if width % 2 == 1 {
        let half = width / 2;
        for i in half..n.saturating_sub(half) {
            let sum: f64 = series[i - half..=i + half].iter().sum();
            out[i] = Some(sum / width as f64);
        }
    } else {
        // 2×m 移动平均: 两端各取半权重
        let half = width / 2;
        for i in half..n.saturating_sub(half) {
            let inner: f64 = series[i + 1 - half..i + half].iter().sum();
            let sum = inner + 0.5 * (series[i - half] + series[i + half]);
            out[i] = Some(sum / width as f64);
        }
    }
    out
}

/// 两端缺失值按内部趋势线性外推；内部全缺失时取 fallback
fn fill_edges(raw: Vec<Option<f64>>, fallback: f64) -> Vec<f64> {
    let first = raw.iter().position(|v| v.is_some());
    let last = raw.iter().rposition(|v| v.is_some());
    let (first, last) = match (first, last) {
        (Some(f), Some(l)) => (f, l),
        _ => return vec![fallback; raw.len()],
    };

    let interior: Vec<f64> = raw[first..=last].iter().map(|v| v.unwrap_or(fallback)).collect();
    let line = stats::ols_on_index(&interior);

    raw.iter()
        .enumerate()
        .map(|(i, v)| match v {
            Some(t) => *t,
            None => match line {
                Some((a, b)) => a + b * (i as f64 - first as f64),
                None => interior[if i < first { 0 } else { interior.len() - 1 }],
            },
        })
        .collect()
}

/// 按季节位置平均 实际/趋势 比值并归一化
fn seasonal_factors(series: &[f64], trend: &[f64], cycle: usize) -> Vec<f64> {
    let mut sums = vec![0.0; cycle];
    let mut counts = vec![0usize; cycle];

    for (i, (x, t)) in series.iter().zip(trend.iter()).enumerate() {
        if *t > 0.0 {
            sums[i % cycle] += x / t;
            counts[i % cycle] += 1;
        }
    }

    let raw: Vec<f64> = sums
        .iter()
        .zip(counts.iter())
        .map(|(s, c)| if *c > 0 { s / *c as f64 } else { 1.0 })
        .collect();

    let norm = stats::mean(&raw).unwrap_or(1.0);
    raw.iter()
        .map(|f| {
            let normalized = if norm > 0.0 { f / norm } else { 1.0 };
            normalized.max(MIN_SEASONALITY_FACTOR)
        })
        .collect()
}
