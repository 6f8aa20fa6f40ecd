// ==========================================
// 促销基线估算系统 - 基线模型库
// ==========================================
// 职责: 每种计算方法一个纯函数实现，统一通过 BaselineModel trait 调用
// 输入: 清洗后的序列 + 粒度 + 开关
// 输出: 每期 {base_volume, seasonality_factor, trend_adjustment} + 趋势系数
// 红线: 历史不足时报错，不静默降级为更弱的方法
// ==========================================

pub mod exponential_smoothing;
pub mod historical_average;
pub mod linear_regression;
pub mod moving_average;
pub mod seasonal_decomposition;

pub use exponential_smoothing::ExponentialSmoothingModel;
pub use historical_average::HistoricalAverageModel;
pub use linear_regression::LinearRegressionModel;
pub use moving_average::{MovingAverageModel, WeightedMovingAverageModel};
pub use seasonal_decomposition::SeasonalDecompositionModel;

use crate::domain::baseline::ModelConfig;
use crate::domain::types::CalculationMethod;
use crate::engine::error::{CalcStage, EngineError, EngineResult};
use serde::{Deserialize, Serialize};

// ==========================================
// PeriodEstimate - 单期估计
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodEstimate {
    pub base_volume: f64,
    pub seasonality_factor: f64,
    pub trend_adjustment: f64,
}

impl PeriodEstimate {
    /// 无季节、无趋势的估计
    pub fn flat(base_volume: f64) -> Self {
        Self {
            base_volume,
            seasonality_factor: 1.0,
            trend_adjustment: 0.0,
        }
    }
}

// ==========================================
// ModelFit - 拟合结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFit {
    pub method: CalculationMethod,
    pub estimates: Vec<PeriodEstimate>,
    pub trend_coefficient: f64,
    /// 平滑参数等模型内部选择（便于复盘），无则为空
    pub parameters: Vec<(String, f64)>,
}

impl ModelFit {
    /// 拟合值序列（即每期 base_volume）
    pub fn fitted_values(&self) -> Vec<f64> {
        self.estimates.iter().map(|e| e.base_volume).collect()
    }
}

// ==========================================
// ModelSettings - 模型库可调参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    /// 移动平均窗口上限
    pub moving_average_max_window: usize,
    /// 指数平滑候选平滑系数
    pub smoothing_grid: Vec<f64>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            moving_average_max_window: 12,
            smoothing_grid: (1..=9).map(|i| i as f64 / 10.0).collect(),
        }
    }
}

// ==========================================
// Trait: BaselineModel
// ==========================================
pub trait BaselineModel: Send + Sync {
    /// 对应的计算方法
    fn method(&self) -> CalculationMethod;

    /// 拟合所需的最少期数
    fn min_periods(&self, config: &ModelConfig) -> usize;

    /// 拟合序列
    fn fit(&self, series: &[f64], config: &ModelConfig) -> EngineResult<ModelFit>;
}

/// 按计算方法选择模型
pub fn model_for(method: CalculationMethod, settings: &ModelSettings) -> Box<dyn BaselineModel> {
    match method {
        CalculationMethod::HistoricalAverage => Box::new(HistoricalAverageModel),
        CalculationMethod::MovingAverage => {
            Box::new(MovingAverageModel::new(settings.moving_average_max_window))
        }
        CalculationMethod::WeightedMovingAverage => {
            Box::new(WeightedMovingAverageModel::new(settings.moving_average_max_window))
        }
        CalculationMethod::LinearRegression => Box::new(LinearRegressionModel),
        CalculationMethod::SeasonalDecomposition => Box::new(SeasonalDecompositionModel),
        CalculationMethod::ExponentialSmoothing => {
            Box::new(ExponentialSmoothingModel::new(settings.smoothing_grid.clone()))
        }
    }
}

/// 通用的最少期数检查
pub(crate) fn ensure_min_periods(series: &[f64], required: usize) -> EngineResult<()> {
    if series.len() < required {
        return Err(EngineError::InsufficientData {
            stage: CalcStage::Fit,
            required,
            available: series.len(),
        });
    }
    Ok(())
}
