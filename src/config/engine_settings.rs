use crate::engine::models::ModelSettings;
use serde::{Deserialize, Serialize};

/// 效率分权重（持久化对象）
///
/// 存储位置：config_kv（scope_id='global'，key='efficiency_weights'，JSON）
/// 每条分解记录都保存一份快照（weights_json），保证分数可复现
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyWeights {
    /// lift 分项权重
    #[serde(default = "default_component_weight")]
    pub lift: f64,

    /// ROI 分项权重
    #[serde(default = "default_component_weight")]
    pub roi: f64,

    /// 蚕食 + 囤货 泄漏惩罚权重
    #[serde(default = "default_leakage_weight")]
    pub leakage: f64,

    /// lift 达到该百分比即记满分
    #[serde(default = "default_lift_target_pct")]
    pub lift_target_pct: f64,

    /// ROI 达到该值即记满分
    #[serde(default = "default_roi_target")]
    pub roi_target: f64,
}

fn default_component_weight() -> f64 {
    0.4
}

fn default_leakage_weight() -> f64 {
    0.2
}

fn default_lift_target_pct() -> f64 {
    100.0
}

fn default_roi_target() -> f64 {
    1.0
}

impl Default for EfficiencyWeights {
    fn default() -> Self {
        Self {
            lift: default_component_weight(),
            roi: default_component_weight(),
            leakage: default_leakage_weight(),
            lift_target_pct: default_lift_target_pct(),
            roi_target: default_roi_target(),
        }
    }
}

impl EfficiencyWeights {
    /// 权重非负且不全为 0，目标值为正
    pub fn validate(&self) -> Result<(), String> {
        let weights = [("lift", self.lift), ("roi", self.roi), ("leakage", self.leakage)];
        for (name, w) in weights {
            if !(w.is_finite() && w >= 0.0) {
                return Err(format!("权重 {} 必须为非负数，实际 {}", name, w));
            }
        }
        if self.lift + self.roi + self.leakage <= 0.0 {
            return Err("权重之和必须大于 0".to_string());
        }
        if !(self.lift_target_pct.is_finite() && self.lift_target_pct > 0.0) {
            return Err(format!("lift_target_pct 必须为正数，实际 {}", self.lift_target_pct));
        }
        if !(self.roi_target.is_finite() && self.roi_target > 0.0) {
            return Err(format!("roi_target 必须为正数，实际 {}", self.roi_target));
        }
        Ok(())
    }
}

/// 引擎运行参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// 单次计算超时（毫秒）
    pub calc_timeout_ms: u64,

    /// 移动平均窗口上限
    pub moving_average_max_window: usize,

    /// 异常值替换用的局部中位数窗口
    pub outlier_median_window: usize,

    /// 指数平滑候选系数
    pub es_alpha_grid: Vec<f64>,

    pub efficiency_weights: EfficiencyWeights,
}

impl Default for EngineSettings {
    fn default() -> Self {
        let model = ModelSettings::default();
        Self {
            calc_timeout_ms: 30_000,
            moving_average_max_window: model.moving_average_max_window,
            outlier_median_window: 5,
            es_alpha_grid: model.smoothing_grid,
            efficiency_weights: EfficiencyWeights::default(),
        }
    }
}

impl EngineSettings {
    pub fn model_settings(&self) -> ModelSettings {
        ModelSettings {
            moving_average_max_window: self.moving_average_max_window,
            smoothing_grid: self.es_alpha_grid.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_json_defaults() {
        let w: EfficiencyWeights = serde_json::from_str(r#"{"lift":0.6}"#).unwrap();
        assert_eq!(w.lift, 0.6);
        assert_eq!(w.roi, 0.4);
        assert_eq!(w.lift_target_pct, 100.0);
        assert!(w.validate().is_ok());
    }

    #[test]
    fn test_weights_validation() {
        let zero = EfficiencyWeights {
            lift: 0.0,
            roi: 0.0,
            leakage: 0.0,
            ..EfficiencyWeights::default()
        };
        assert!(zero.validate().is_err());

        let negative = EfficiencyWeights {
            roi: -0.1,
            ..EfficiencyWeights::default()
        };
        assert!(negative.validate().is_err());
    }
}
