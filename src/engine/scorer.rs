// ==========================================
// 促销基线估算系统 - 拟合质量评分
// ==========================================
// 输入: 拟合值 / 实际值 / 促销标记
// 输出: R² / MAPE / 置信半宽 / 趋势系数（透传）
// 红线: 只在非促销期上评分（促销期本就偏离基线）
// 红线: 无可评分期时 R²/MAPE 为 None，不能写成 0 或 100
// ==========================================

use crate::engine::error::{CalcStage, EngineError, EngineResult};
use crate::engine::stats;
use serde::{Deserialize, Serialize};

// ==========================================
// FitStatistics - 评分结果
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitStatistics {
    /// 1 - SS_res/SS_tot；实际值零方差或无可评分期时为 None
    pub r_squared: Option<f64>,
    /// 百分比；仅统计 actual > 0 的期
    pub mape: Option<f64>,
    /// z(置信水平) · 残差标准误
    pub confidence_half_width: Option<f64>,
    pub trend_coefficient: f64,
    /// 参与评分的期数
    pub scored_periods: usize,
}

// ==========================================
// StatisticalScorer
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct StatisticalScorer;

impl StatisticalScorer {
    pub fn new() -> Self {
        Self
    }

    /// 计算拟合质量
    ///
    /// # 参数
    /// - `actual`: 实际值
    /// - `fitted`: 拟合值（基线）
    /// - `promoted`: 每期是否促销
    /// - `confidence_level`: (0,1)
    /// - `trend_coefficient`: 模型趋势系数，原样透传
    pub fn score(
        &self,
        actual: &[f64],
        fitted: &[f64],
        promoted: &[bool],
        confidence_level: f64,
        trend_coefficient: f64,
    ) -> EngineResult<FitStatistics> {
        if actual.len() != fitted.len() || actual.len() != promoted.len() {
            return Err(EngineError::Numeric {
                stage: CalcStage::Score,
                message: format!(
                    "序列长度不一致: actual={}, fitted={}, promoted={}",
                    actual.len(),
                    fitted.len(),
                    promoted.len()
                ),
            });
        }
        if !(confidence_level > 0.0 && confidence_level < 1.0) {
            return Err(EngineError::invalid(
                CalcStage::Score,
                "confidence_level",
                format!("置信水平必须在 (0,1) 内，实际 {}", confidence_level),
            ));
        }

        let (a, f): (Vec<f64>, Vec<f64>) = actual
            .iter()
            .zip(fitted.iter())
            .zip(promoted.iter())
            .filter(|(_, is_promoted)| !**is_promoted)
            .map(|((a, f), _)| (*a, *f))
            .unzip();

        if a.is_empty() {
            return Ok(FitStatistics {
                r_squared: None,
                mape: None,
                confidence_half_width: None,
                trend_coefficient,
                scored_periods: 0,
            });
        }

        let residuals: Vec<f64> = a.iter().zip(f.iter()).map(|(x, y)| x - y).collect();
        let ss_res: f64 = residuals.iter().map(|r| r * r).sum();
        let a_mean = stats::mean(&a).unwrap_or(0.0);
        let ss_tot: f64 = a.iter().map(|x| (x - a_mean) * (x - a_mean)).sum();

        let r_squared = if ss_tot > f64::EPSILON {
            Some(1.0 - ss_res / ss_tot)
        } else {
            None
        };

        let confidence_half_width = if residuals.len() >= 2 {
            let stderr = (ss_res / (residuals.len() - 1) as f64).sqrt();
            let z = stats::normal_quantile((1.0 + confidence_level) / 2.0);
            Some(z * stderr)
        } else {
            None
        };

        Ok(FitStatistics {
            r_squared,
            mape: stats::mape(&a, &f),
            confidence_half_width,
            trend_coefficient,
            scored_periods: a.len(),
        })
    }
}
