// ==========================================
// 基线模型 - 历史均值
// ==========================================
// base = 全序列均值；seasonality_factor = 1，trend_adjustment = 0
// ==========================================

use super::{ensure_min_periods, BaselineModel, ModelFit, PeriodEstimate};
use crate::domain::baseline::ModelConfig;
use crate::domain::types::CalculationMethod;
use crate::engine::error::EngineResult;
use crate::engine::stats;

#[derive(Debug, Clone, Copy, Default)]
pub struct HistoricalAverageModel;

impl BaselineModel for HistoricalAverageModel {
    fn method(&self) -> CalculationMethod {
        CalculationMethod::HistoricalAverage
    }

    fn min_periods(&self, _config: &ModelConfig) -> usize {
        1
    }

    fn fit(&self, series: &[f64], config: &ModelConfig) -> EngineResult<ModelFit> {
        ensure_min_periods(series, self.min_periods(config))?;
        let avg = stats::mean(series).unwrap_or(0.0);

        Ok(ModelFit {
            method: self.method(),
            estimates: vec![PeriodEstimate::flat(avg); series.len()],
            trend_coefficient: 0.0,
            parameters: Vec::new(),
        })
    }
}
