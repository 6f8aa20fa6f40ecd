// ==========================================
// 促销基线估算系统 - 配置层
// ==========================================
// 职责: 引擎参数管理（超时 / 模型参数 / 效率分权重）
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod engine_config_trait;
pub mod engine_settings;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use engine_config_trait::EngineConfigReader;
pub use engine_settings::{EfficiencyWeights, EngineSettings};
