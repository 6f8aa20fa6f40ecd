// ==========================================
// 促销基线估算系统 - 促销量分解
// ==========================================
// 输入: 已就绪基线 (active/approved) + 促销 + 窗口 + 效应比例
// 步骤:
//   1. 窗口内基线量 = Σ 重叠期 base_volume · 重叠天数/期天数
//   2. 增量 = max(0, 实际 - 基线)；实际不足基线时标记 underperformed
//   3. 蚕食 / 囤货 / 前移 = 增量 · 各自比例（分别存储，不预先净额化）
//   4. 光环 = 增量 · 光环比例（额外收益，不扣减）
//   5. lift / ROI / 效率分
// 红线: 分解结果只追加，失败时不落库
// ==========================================

use crate::config::EfficiencyWeights;
use crate::domain::baseline::{Baseline, BaselinePeriod};
use crate::domain::decomposition::{EffectRates, VolumeDecomposition};
use crate::domain::types::BaselineType;
use crate::engine::error::{CalcStage, EngineError, EngineResult};
use crate::engine::providers::PromotionProvider;
use crate::engine::validation::validate_effect_rates;
use crate::repository::{BaselineRepository, DecompositionRepository};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

// ==========================================
// DecompositionRequest - 分解请求
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecompositionRequest {
    pub baseline_id: String,
    pub promotion_id: String,
    /// 缺省为促销的执行起止日期
    #[serde(default)]
    pub period_start: Option<NaiveDate>,
    #[serde(default)]
    pub period_end: Option<NaiveDate>,
    pub rates: EffectRates,
}

// ==========================================
// DecompositionFigures - 纯计算结果
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecompositionFigures {
    pub total_volume: f64,
    pub base_volume: f64,
    pub incremental_volume: f64,
    pub cannibalization_volume: f64,
    pub pantry_loading_volume: f64,
    pub halo_volume: f64,
    pub pull_forward_volume: f64,
    pub lift_pct: Option<f64>,
    pub incremental_revenue: f64,
    pub roi: Option<f64>,
    pub efficiency_score: f64,
    pub underperformed: bool,
}

/// 汇总窗口内的基线量（部分重叠按天数分摊）
///
/// # 返回
/// - None: 窗口与任何基线期都不重叠
pub fn resolve_window_base(
    periods: &[BaselinePeriod],
    window_start: NaiveDate,
    window_end: NaiveDate,
) -> Option<f64> {
    let mut overlapped = false;
    let mut base = 0.0;
    for p in periods {
        let days = p.overlap_days(window_start, window_end);
        if days <= 0 {
            continue;
        }
        overlapped = true;
        base += p.base_volume * days as f64 / p.day_count() as f64;
    }
    overlapped.then_some(base)
}

/// 分解核心计算（纯函数）
///
/// # 参数
/// - `baseline_type`: 货币型基线的增量本身即为收入，不再乘单价
/// - `rates`: 调用方需先校验
pub fn compute_figures(
    total_volume: f64,
    base_volume: f64,
    rates: &EffectRates,
    baseline_type: BaselineType,
    average_selling_price: f64,
    promotion_cost: f64,
    weights: &EfficiencyWeights,
) -> DecompositionFigures {
    let incremental_volume = (total_volume - base_volume).max(0.0);
    let cannibalization_volume = incremental_volume * rates.cannibalization_rate;
    let pantry_loading_volume = incremental_volume * rates.pantry_loading_rate;
    let pull_forward_volume = incremental_volume * rates.pull_forward_rate;
    let halo_volume = incremental_volume * rates.halo_rate;

    // 不足基线时 lift 为负，如实报告缺口
    let lift_pct = if base_volume > 0.0 {
        Some((total_volume - base_volume) / base_volume * 100.0)
    } else {
        None
    };

    let incremental_revenue = if baseline_type.is_monetary() {
        incremental_volume
    } else {
        incremental_volume * average_selling_price
    };

    let roi = if promotion_cost > 0.0 {
        Some((incremental_revenue - promotion_cost) / promotion_cost)
    } else {
        None
    };

    let leakage_ratio = if incremental_volume > 0.0 {
        (cannibalization_volume + pantry_loading_volume) / incremental_volume
    } else {
        0.0
    };

    let efficiency_score = if incremental_volume > 0.0 {
        efficiency_score(lift_pct, roi, leakage_ratio, weights)
    } else {
        0.0
    };

    DecompositionFigures {
        total_volume,
        base_volume,
        incremental_volume,
        cannibalization_volume,
        pantry_loading_volume,
        halo_volume,
        pull_forward_volume,
        lift_pct,
        incremental_revenue,
        roi,
        efficiency_score,
        underperformed: total_volume < base_volume,
    }
}

/// 效率分 ∈ [0,100]
///
/// score = 100 · Σ wᵢ·cᵢ / Σ wᵢ
/// - c_lift    = clamp(lift_pct / lift_target_pct)
/// - c_roi     = clamp(roi / roi_target)；ROI 不可算时该项连同权重一起剔除
/// - c_leakage = 1 - clamp((蚕食 + 囤货) / 增量)
pub fn efficiency_score(
    lift_pct: Option<f64>,
    roi: Option<f64>,
    leakage_ratio: f64,
    weights: &EfficiencyWeights,
) -> f64 {
    let unit = |v: f64| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };

    let mut weighted = 0.0;
    let mut weight_sum = 0.0;

    let lift_component = lift_pct
        .map(|l| unit(l / weights.lift_target_pct))
        .unwrap_or(0.0);
    weighted += weights.lift * lift_component;
    weight_sum += weights.lift;

    if let Some(r) = roi {
        weighted += weights.roi * unit(r / weights.roi_target);
        weight_sum += weights.roi;
    }

    weighted += weights.leakage * (1.0 - unit(leakage_ratio));
    weight_sum += weights.leakage;

    if weight_sum <= 0.0 {
        return 0.0;
    }
    (100.0 * weighted / weight_sum).clamp(0.0, 100.0)
}

// ==========================================
// VolumeDecomposer - 分解服务
// ==========================================
pub struct VolumeDecomposer {
    baseline_repo: Arc<BaselineRepository>,
    decomposition_repo: Arc<DecompositionRepository>,
    promotion_provider: Arc<dyn PromotionProvider>,
    weights: EfficiencyWeights,
}

impl VolumeDecomposer {
    pub fn new(
        baseline_repo: Arc<BaselineRepository>,
        decomposition_repo: Arc<DecompositionRepository>,
        promotion_provider: Arc<dyn PromotionProvider>,
        weights: EfficiencyWeights,
    ) -> Self {
        Self {
            baseline_repo,
            decomposition_repo,
            promotion_provider,
            weights,
        }
    }

    /// 分解促销量并追加一条记录
    #[instrument(skip(self, request), fields(
        baseline_id = %request.baseline_id,
        promotion_id = %request.promotion_id
    ))]
    pub fn decompose(&self, request: &DecompositionRequest) -> EngineResult<VolumeDecomposition> {
        validate_effect_rates(&request.rates)?;

        let (baseline, periods) = self
            .baseline_repo
            .find_with_periods(&request.baseline_id)
            .map_err(|e| EngineError::storage(CalcStage::Decompose, &request.baseline_id, e))?
            .ok_or_else(|| EngineError::NotFound {
                entity: "Baseline".to_string(),
                id: request.baseline_id.clone(),
            })?;

        if !baseline.is_ready() {
            return Err(EngineError::BaselineNotReady {
                baseline_id: baseline.baseline_id.clone(),
                promotion_id: request.promotion_id.clone(),
                status: baseline.status,
            });
        }

        let promotion = self
            .promotion_provider
            .get_promotion(&request.promotion_id)
            .map_err(|e| EngineError::provider(CalcStage::Decompose, &request.promotion_id, e))?
            .ok_or_else(|| EngineError::NotFound {
                entity: "Promotion".to_string(),
                id: request.promotion_id.clone(),
            })?;

        let window_start = request.period_start.unwrap_or(promotion.run_start);
        let window_end = request.period_end.unwrap_or(promotion.run_end);
        if window_start > window_end {
            return Err(EngineError::invalid(
                CalcStage::Decompose,
                "window",
                format!("窗口起始 {} 晚于结束 {}", window_start, window_end),
            ));
        }

        let base_volume = resolve_window_base(&periods, window_start, window_end).ok_or_else(|| {
            EngineError::NoOverlap {
                baseline_id: baseline.baseline_id.clone(),
                promotion_id: promotion.promotion_id.clone(),
                window_start,
                window_end,
            }
        })?;

        let total_volume =
            promotion.total_in_window(baseline.baseline_type, window_start, window_end);

        let figures = compute_figures(
            total_volume,
            base_volume,
            &request.rates,
            baseline.baseline_type,
            promotion.average_selling_price,
            promotion.cost,
            &self.weights,
        );

        let record = self.build_record(
            &baseline,
            &promotion.promotion_id,
            promotion.cost,
            window_start,
            window_end,
            &request.rates,
            &figures,
        )?;

        self.decomposition_repo
            .insert(&record)
            .map_err(|e| EngineError::storage(CalcStage::Decompose, &record.decomposition_id, e))?;

        tracing::info!(
            decomposition_id = %record.decomposition_id,
            total = figures.total_volume,
            base = figures.base_volume,
            incremental = figures.incremental_volume,
            underperformed = figures.underperformed,
            "促销量分解完成"
        );

        Ok(record)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_record(
        &self,
        baseline: &Baseline,
        promotion_id: &str,
        promotion_cost: f64,
        window_start: NaiveDate,
        window_end: NaiveDate,
        rates: &EffectRates,
        figures: &DecompositionFigures,
    ) -> EngineResult<VolumeDecomposition> {
        let weights_json = serde_json::to_string(&self.weights)
            .map_err(|e| EngineError::storage(CalcStage::Decompose, "efficiency_weights", e))?;

        Ok(VolumeDecomposition {
            decomposition_id: Uuid::new_v4().to_string(),
            baseline_id: baseline.baseline_id.clone(),
            promotion_id: promotion_id.to_string(),
            period_start: window_start,
            period_end: window_end,
            total_volume: figures.total_volume,
            base_volume: figures.base_volume,
            incremental_volume: figures.incremental_volume,
            cannibalization_volume: figures.cannibalization_volume,
            pantry_loading_volume: figures.pantry_loading_volume,
            halo_volume: figures.halo_volume,
            pull_forward_volume: figures.pull_forward_volume,
            lift_pct: figures.lift_pct,
            incremental_revenue: figures.incremental_revenue,
            promotion_cost,
            roi: figures.roi,
            efficiency_score: figures.efficiency_score,
            underperformed: figures.underperformed,
            rates: *rates,
            weights_json,
            baseline_revision: baseline.revision,
            created_at: Utc::now().naive_utc(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, day).unwrap()
    }

    fn weekly_period(n: i32, start: NaiveDate, base: f64) -> BaselinePeriod {
        BaselinePeriod {
            baseline_id: "b1".to_string(),
            period_number: n,
            period_label: format!("W{}", n),
            period_start: start,
            period_end: start + chrono::Duration::days(6),
            base_volume: base,
            seasonality_factor: 1.0,
            trend_adjustment: 0.0,
            actual_volume: base,
            variance_volume: 0.0,
            variance_pct: Some(0.0),
            is_promoted: false,
            incremental_volume: 0.0,
        }
    }

    fn scenario_b_rates() -> EffectRates {
        EffectRates::new(0.10, 0.05, 0.03, 0.04)
    }

    #[test]
    fn test_scenario_b_components() {
        let f = compute_figures(
            150.0,
            100.0,
            &scenario_b_rates(),
            BaselineType::Volume,
            2.0,
            50.0,
            &EfficiencyWeights::default(),
        );
        assert!((f.incremental_volume - 50.0).abs() < 1e-9);
        assert!((f.cannibalization_volume - 5.0).abs() < 1e-9);
        assert!((f.pantry_loading_volume - 2.5).abs() < 1e-9);
        assert!((f.pull_forward_volume - 2.0).abs() < 1e-9);
        assert!((f.halo_volume - 1.5).abs() < 1e-9);
        assert!((f.lift_pct.unwrap() - 50.0).abs() < 1e-9);
        // 增量收入 = 50 · 2 = 100，ROI = (100 - 50) / 50
        assert!((f.incremental_revenue - 100.0).abs() < 1e-9);
        assert!((f.roi.unwrap() - 1.0).abs() < 1e-9);
        assert!(!f.underperformed);
    }

    #[test]
    fn test_shortfall_reports_negative_lift() {
        let f = compute_figures(
            80.0,
            100.0,
            &scenario_b_rates(),
            BaselineType::Volume,
            2.0,
            50.0,
            &EfficiencyWeights::default(),
        );
        assert_eq!(f.incremental_volume, 0.0);
        assert_eq!(f.cannibalization_volume, 0.0);
        assert_eq!(f.pantry_loading_volume, 0.0);
        assert_eq!(f.pull_forward_volume, 0.0);
        assert_eq!(f.halo_volume, 0.0);
        assert!((f.lift_pct.unwrap() + 20.0).abs() < 1e-9);
        assert!(f.underperformed);
        assert_eq!(f.efficiency_score, 0.0);
        assert!((f.roi.unwrap() + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_base_has_no_lift_and_no_cost_has_no_roi() {
        let f = compute_figures(
            40.0,
            0.0,
            &EffectRates::default(),
            BaselineType::Units,
            3.0,
            0.0,
            &EfficiencyWeights::default(),
        );
        assert_eq!(f.lift_pct, None);
        assert_eq!(f.roi, None);
        assert_eq!(f.incremental_volume, 40.0);
    }

    #[test]
    fn test_monetary_baseline_increment_is_revenue() {
        let f = compute_figures(
            1_500.0,
            1_000.0,
            &EffectRates::default(),
            BaselineType::Revenue,
            9.9,
            250.0,
            &EfficiencyWeights::default(),
        );
        assert_eq!(f.incremental_revenue, 500.0);
        assert!((f.roi.unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_conservation_over_rate_grid() {
        let steps: Vec<f64> = (0..=10).map(|i| i as f64 / 10.0).collect();
        let weights = EfficiencyWeights::default();
        for &c in &steps {
            for &p in &steps {
                for &pf in &steps {
                    if c + p + pf > 1.0 + 1e-9 {
                        continue;
                    }
                    let rates = EffectRates::new(c, p, 0.7, pf);
                    let f = compute_figures(
                        173.0,
                        100.0,
                        &rates,
                        BaselineType::Volume,
                        1.0,
                        10.0,
                        &weights,
                    );
                    let deducted =
                        f.cannibalization_volume + f.pantry_loading_volume + f.pull_forward_volume;
                    assert!(deducted <= f.incremental_volume + 1e-9);
                    assert!(f.halo_volume >= 0.0);
                    assert!((0.0..=100.0).contains(&f.efficiency_score));
                }
            }
        }
    }

    #[test]
    fn test_efficiency_score_reference_points() {
        let w = EfficiencyWeights::default();
        // 达标 lift、达标 ROI、无泄漏 → 满分
        assert!((efficiency_score(Some(100.0), Some(1.0), 0.0, &w) - 100.0).abs() < 1e-9);
        // lift 50%，ROI 1.0，泄漏 15%: (0.4·0.5 + 0.4·1 + 0.2·0.85) / 1.0
        let s = efficiency_score(Some(50.0), Some(1.0), 0.15, &w);
        assert!((s - 77.0).abs() < 1e-9);
        // ROI 不可算: 仅 lift 与泄漏参与，权重重新归一
        let s = efficiency_score(Some(100.0), None, 0.0, &w);
        assert!((s - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_window_base_apportions_partial_periods() {
        let periods = vec![
            weekly_period(1, d(1, 6), 70.0),
            weekly_period(2, d(1, 13), 140.0),
        ];
        // 1/10..1/16: 第 1 周 3 天 (30)，第 2 周 4 天 (80)
        let base = resolve_window_base(&periods, d(1, 10), d(1, 16)).unwrap();
        assert!((base - 110.0).abs() < 1e-9);

        assert_eq!(resolve_window_base(&periods, d(2, 1), d(2, 7)), None);
        assert!((resolve_window_base(&periods, d(1, 6), d(1, 19)).unwrap() - 210.0).abs() < 1e-9);
    }
}
