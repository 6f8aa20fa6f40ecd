// ==========================================
// 促销基线估算系统 - 基线领域模型
// ==========================================
// 职责: Baseline / BaselinePeriod / BaselineScope
// 红线: BaselinePeriod 全集在每次重算时整体替换，不做局部修改
// ==========================================

use crate::domain::types::{BaselineStatus, BaselineType, CalculationMethod, Granularity};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ==========================================
// BaselineScope - 基线范围（值对象）
// ==========================================
// 用途: 作为历史销售查询的显式过滤条件，不依赖任何全局租户状态
// None 表示该维度不过滤
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BaselineScope {
    pub customer_id: Option<String>, // 客户
    pub product_id: Option<String>,  // 产品
    pub category: Option<String>,    // 品类
    pub brand: Option<String>,       // 品牌
    pub channel: Option<String>,     // 渠道
    pub region: Option<String>,      // 区域
}

impl BaselineScope {
    /// 全量范围（不过滤任何维度）
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_product(product_id: &str) -> Self {
        Self {
            product_id: Some(product_id.to_string()),
            ..Self::default()
        }
    }
}

// ==========================================
// Baseline - 基线
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Baseline {
    // ===== 标识 =====
    pub baseline_id: String,
    pub name: String,
    pub baseline_type: BaselineType,
    pub calculation_method: CalculationMethod,
    pub granularity: Granularity,

    // ===== 范围与时间 =====
    pub scope: BaselineScope,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub base_year: i32,
    pub periods_used: i32,

    // ===== 开关 =====
    pub seasonality_enabled: bool,
    pub trend_enabled: bool,
    pub outlier_removal_enabled: bool,
    pub outlier_threshold: f64,  // IQR 倍数
    pub confidence_level: f64,   // (0,1)

    // ===== 状态 =====
    pub status: BaselineStatus,
    pub prior_status: Option<BaselineStatus>, // 计算中时记录的原稳定态
    pub revision: i32,                        // 每次写入递增

    // ===== 派生汇总 =====
    pub total_base_volume: Option<f64>,
    pub avg_weekly_volume: Option<f64>,
    pub r_squared: Option<f64>,       // 全部期均为促销期或方差为0时为 None
    pub mape: Option<f64>,            // 全部期均为促销期时为 None
    pub trend_coefficient: Option<f64>,
    pub confidence_half_width: Option<f64>,
    pub calculated_at: Option<NaiveDateTime>,

    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Baseline {
    pub fn is_ready(&self) -> bool {
        self.status.is_ready()
    }

    /// 返回计算使用的配置快照
    pub fn model_config(&self) -> ModelConfig {
        ModelConfig {
            granularity: self.granularity,
            seasonality_enabled: self.seasonality_enabled,
            trend_enabled: self.trend_enabled,
        }
    }
}

// ==========================================
// BaselineAggregates - 计算后的汇总指标
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineAggregates {
    pub total_base_volume: f64,
    pub avg_weekly_volume: f64,
    pub r_squared: Option<f64>,
    pub mape: Option<f64>,
    pub trend_coefficient: f64,
    pub confidence_half_width: Option<f64>,
    pub calculated_at: NaiveDateTime,
}

/// 模型开关（显式传入策略，不使用全局开关）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelConfig {
    pub granularity: Granularity,
    pub seasonality_enabled: bool,
    pub trend_enabled: bool,
}

// ==========================================
// NewBaseline - 创建基线请求
// ==========================================
// 计算方法以字符串传入，未知方法在创建时即被拒绝
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBaseline {
    pub name: String,
    pub baseline_type: String,
    pub calculation_method: String,
    pub granularity: String,
    #[serde(default)]
    pub scope: BaselineScope,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub base_year: Option<i32>,
    pub periods_used: i32,
    #[serde(default)]
    pub seasonality_enabled: bool,
    #[serde(default)]
    pub trend_enabled: bool,
    #[serde(default)]
    pub outlier_removal_enabled: bool,
    #[serde(default = "default_outlier_threshold")]
    pub outlier_threshold: f64,
    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,
}

fn default_outlier_threshold() -> f64 {
    1.5
}

fn default_confidence_level() -> f64 {
    0.95
}

// ==========================================
// BaselinePeriod - 基线期明细
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselinePeriod {
    pub baseline_id: String,
    pub period_number: i32,        // 从 1 开始
    pub period_label: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,     // 含
    pub base_volume: f64,          // >= 0
    pub seasonality_factor: f64,   // > 0，围绕 1
    pub trend_adjustment: f64,
    pub actual_volume: f64,
    pub variance_volume: f64,      // actual - base
    pub variance_pct: Option<f64>, // base = 0 时为 None
    pub is_promoted: bool,
    pub incremental_volume: f64,   // 促销期 max(0, actual - base)，非促销期为 0
}

impl BaselinePeriod {
    /// 期长度（天）
    pub fn day_count(&self) -> i64 {
        (self.period_end - self.period_start).num_days() + 1
    }

    /// 与 [start, end] 的重叠天数（含两端）
    pub fn overlap_days(&self, start: NaiveDate, end: NaiveDate) -> i64 {
        let lo = self.period_start.max(start);
        let hi = self.period_end.min(end);
        if hi < lo {
            0
        } else {
            (hi - lo).num_days() + 1
        }
    }
}
