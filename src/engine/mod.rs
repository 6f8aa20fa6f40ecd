// ==========================================
// 促销基线估算系统 - 引擎层
// ==========================================
// 职责: 基线估算与促销量分解的数值核心及编排
// 红线: Engine 不拼 SQL，数据访问经 Repository / Provider
// 红线: 数值核心（预处理 / 模型 / 评分 / 分解计算）为纯函数，无 I/O
// ==========================================

pub mod calculator;
pub mod decomposer;
pub mod error;
pub mod gate;
pub mod models;
pub mod preprocessor;
pub mod providers;
pub mod scorer;
pub mod stats;
pub mod validation;

// 重导出核心引擎
pub use calculator::{BaselineCalculator, CalculationResult};
pub use decomposer::{
    compute_figures, efficiency_score, resolve_window_base, DecompositionFigures,
    DecompositionRequest, VolumeDecomposer,
};
pub use error::{CalcStage, EngineError, EngineResult};
pub use gate::{CalcTicket, CalculationGate};
pub use models::{model_for, BaselineModel, ModelFit, ModelSettings, PeriodEstimate};
pub use preprocessor::{OutlierSettings, PreprocessResult, TimeSeriesPreprocessor};
pub use providers::{HistoricalSalesProvider, PromotionProvider, ProviderError};
pub use scorer::{FitStatistics, StatisticalScorer};
pub use validation::{validate_baseline_config, validate_effect_rates, validate_new_baseline};
