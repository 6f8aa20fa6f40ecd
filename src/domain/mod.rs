// ==========================================
// 促销基线估算系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod baseline;
pub mod decomposition;
pub mod sales;
pub mod types;

// 重导出核心类型
pub use baseline::{
    Baseline, BaselineAggregates, BaselinePeriod, BaselineScope, ModelConfig, NewBaseline,
};
pub use decomposition::{EffectRates, VolumeDecomposition};
pub use sales::{Promotion, PromotionActual, SalesPeriod};
pub use types::{BaselineStatus, BaselineType, CalculationMethod, Granularity};
