// ==========================================
// 促销基线估算系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 贸易促销分析子系统（基线估算 / 增量分解）
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 数值核心与编排
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 组装
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{BaselineStatus, BaselineType, CalculationMethod, Granularity};

// 领域实体
pub use domain::{
    Baseline, BaselinePeriod, BaselineScope, EffectRates, NewBaseline, Promotion,
    PromotionActual, SalesPeriod, VolumeDecomposition,
};

// 引擎
pub use engine::{
    BaselineCalculator, CalcStage, CalculationGate, DecompositionRequest, EngineError,
    StatisticalScorer, TimeSeriesPreprocessor, VolumeDecomposer,
};

// API
pub use api::{ApiError, ApiResult, BaselineApi, CalculationSummary};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "促销基线估算系统";
