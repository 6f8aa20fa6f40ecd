// ==========================================
// 促销基线估算系统 - 引擎配置读取 Trait
// ==========================================
// 职责: 定义引擎 / API 所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::config::engine_settings::{EfficiencyWeights, EngineSettings};
use async_trait::async_trait;
use std::error::Error;

// ==========================================
// EngineConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait EngineConfigReader: Send + Sync {
    /// 获取单次计算超时（毫秒）
    ///
    /// # 默认值
    /// - 30000
    async fn get_calc_timeout_ms(&self) -> Result<u64, Box<dyn Error + Send + Sync>>;

    /// 获取效率分权重
    ///
    /// # 默认值
    /// - lift 0.4 / roi 0.4 / leakage 0.2，lift 目标 100%，ROI 目标 1.0
    async fn get_efficiency_weights(&self) -> Result<EfficiencyWeights, Box<dyn Error + Send + Sync>>;

    /// 获取完整引擎参数
    async fn get_engine_settings(&self) -> Result<EngineSettings, Box<dyn Error + Send + Sync>>;
}
