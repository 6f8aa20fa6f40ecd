// ==========================================
// 促销基线估算系统 - 增量分解领域模型
// ==========================================
// 红线: VolumeDecomposition 创建后不可修改（仅追加）
// 红线: 蚕食 + 囤货 + 前移 <= 增量；光环为额外收益，不受此约束
// ==========================================

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ==========================================
// EffectRates - 效应比例
// ==========================================
// 每个比例取值 [0,1]，作用对象为增量
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EffectRates {
    pub cannibalization_rate: f64, // 蚕食
    pub pantry_loading_rate: f64,  // 囤货
    pub halo_rate: f64,            // 光环
    pub pull_forward_rate: f64,    // 需求前移
}

impl EffectRates {
    pub fn new(
        cannibalization_rate: f64,
        pantry_loading_rate: f64,
        halo_rate: f64,
        pull_forward_rate: f64,
    ) -> Self {
        Self {
            cannibalization_rate,
            pantry_loading_rate,
            halo_rate,
            pull_forward_rate,
        }
    }

    /// 从增量中扣减的比例之和（不含光环）
    pub fn deduction_sum(&self) -> f64 {
        self.cannibalization_rate + self.pantry_loading_rate + self.pull_forward_rate
    }

    /// 按名称列出全部比例（用于校验报错）
    pub fn named(&self) -> [(&'static str, f64); 4] {
        [
            ("cannibalization_rate", self.cannibalization_rate),
            ("pantry_loading_rate", self.pantry_loading_rate),
            ("halo_rate", self.halo_rate),
            ("pull_forward_rate", self.pull_forward_rate),
        ]
    }
}

// ==========================================
// VolumeDecomposition - 促销量分解结果
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeDecomposition {
    pub decomposition_id: String,
    pub baseline_id: String,
    pub promotion_id: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,

    // ===== 量 =====
    pub total_volume: f64,
    pub base_volume: f64,
    pub incremental_volume: f64,     // max(0, total - base)
    pub cannibalization_volume: f64,
    pub pantry_loading_volume: f64,
    pub halo_volume: f64,
    pub pull_forward_volume: f64,

    // ===== 指标 =====
    pub lift_pct: Option<f64>,       // base = 0 时为 None；不足基线时为负
    pub incremental_revenue: f64,
    pub promotion_cost: f64,
    pub roi: Option<f64>,            // cost <= 0 时为 None
    pub efficiency_score: f64,       // [0,100]
    pub underperformed: bool,        // total < base

    // ===== 可复现性 =====
    pub rates: EffectRates,
    pub weights_json: String,        // 计算效率分使用的权重快照
    pub baseline_revision: i32,      // 分解时基线的修订号

    pub created_at: NaiveDateTime,
}

impl VolumeDecomposition {
    /// 保守净增量 = 增量 - 蚕食 - 囤货 - 前移（读时计算，不落库）
    pub fn net_incremental_volume(&self) -> f64 {
        self.incremental_volume
            - self.cannibalization_volume
            - self.pantry_loading_volume
            - self.pull_forward_volume
    }
}
