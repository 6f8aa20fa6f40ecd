// ==========================================
// 促销基线估算系统 - 配置校验
// ==========================================
// 职责: 计算前拒绝非法配置（InputValidation）
// 规则:
//   - periods_used > 0
//   - confidence_level ∈ (0,1)
//   - outlier_threshold > 0
//   - start_date <= end_date
//   - 基线类型 / 计算方法 / 粒度必须是已知值
// ==========================================

use crate::domain::baseline::{Baseline, NewBaseline};
use crate::domain::decomposition::EffectRates;
use crate::domain::types::{BaselineType, CalculationMethod, Granularity};
use crate::engine::error::{CalcStage, EngineError, EngineResult};
use chrono::NaiveDate;

/// 解析后的枚举配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedBaselineKinds {
    pub baseline_type: BaselineType,
    pub calculation_method: CalculationMethod,
    pub granularity: Granularity,
}

/// 校验创建请求并解析枚举字段
pub fn validate_new_baseline(draft: &NewBaseline) -> EngineResult<ParsedBaselineKinds> {
    if draft.name.trim().is_empty() {
        return Err(EngineError::invalid(CalcStage::Validate, "name", "基线名称不能为空"));
    }

    let baseline_type: BaselineType = draft
        .baseline_type
        .parse()
        .map_err(|e: String| EngineError::invalid(CalcStage::Validate, "baseline_type", e))?;
    let calculation_method: CalculationMethod = draft
        .calculation_method
        .parse()
        .map_err(|e: String| EngineError::invalid(CalcStage::Validate, "calculation_method", e))?;
    let granularity: Granularity = draft
        .granularity
        .parse()
        .map_err(|e: String| EngineError::invalid(CalcStage::Validate, "granularity", e))?;

    check_numeric_settings(
        draft.periods_used,
        draft.confidence_level,
        draft.outlier_threshold,
        draft.start_date,
        draft.end_date,
    )?;

    Ok(ParsedBaselineKinds {
        baseline_type,
        calculation_method,
        granularity,
    })
}

/// 校验已持久化基线的配置（计算前再查一次，库中数据可能被外部修改）
pub fn validate_baseline_config(baseline: &Baseline) -> EngineResult<()> {
    check_numeric_settings(
        baseline.periods_used,
        baseline.confidence_level,
        baseline.outlier_threshold,
        baseline.start_date,
        baseline.end_date,
    )
}

fn check_numeric_settings(
    periods_used: i32,
    confidence_level: f64,
    outlier_threshold: f64,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> EngineResult<()> {
    if periods_used <= 0 {
        return Err(EngineError::invalid(
            CalcStage::Validate,
            "periods_used",
            format!("periods_used 必须大于 0，实际 {}", periods_used),
        ));
    }
    if !(confidence_level > 0.0 && confidence_level < 1.0) {
        return Err(EngineError::invalid(
            CalcStage::Validate,
            "confidence_level",
            format!("confidence_level 必须在 (0,1) 内，实际 {}", confidence_level),
        ));
    }
    if !(outlier_threshold.is_finite() && outlier_threshold > 0.0) {
        return Err(EngineError::invalid(
            CalcStage::Validate,
            "outlier_threshold",
            format!("outlier_threshold 必须为正数，实际 {}", outlier_threshold),
        ));
    }
    if start_date > end_date {
        return Err(EngineError::invalid(
            CalcStage::Validate,
            "date_range",
            format!("起始日期 {} 晚于结束日期 {}", start_date, end_date),
        ));
    }
    Ok(())
}

/// 校验效应比例: 每个 ∈ [0,1]，蚕食 + 囤货 + 前移 <= 1
pub fn validate_effect_rates(rates: &EffectRates) -> EngineResult<()> {
    for (name, value) in rates.named() {
        if !(value.is_finite() && (0.0..=1.0).contains(&value)) {
            return Err(EngineError::invalid(
                CalcStage::Decompose,
                name,
                format!("比例必须在 [0,1] 内，实际 {}", value),
            ));
        }
    }
    let sum = rates.deduction_sum();
    if sum > 1.0 + 1e-9 {
        return Err(EngineError::invalid(
            CalcStage::Decompose,
            "effect_rates",
            format!("蚕食 + 囤货 + 前移 之和不能超过 1，实际 {:.4}", sum),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::baseline::BaselineScope;

    fn draft() -> NewBaseline {
        NewBaseline {
            name: "Q1 周基线".to_string(),
            baseline_type: "volume".to_string(),
            calculation_method: "historical_average".to_string(),
            granularity: "weekly".to_string(),
            scope: BaselineScope::for_product("SKU-1"),
            start_date: NaiveDate::from_ymd_opt(2025, 1, 6).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 3, 30).unwrap(),
            base_year: None,
            periods_used: 12,
            seasonality_enabled: false,
            trend_enabled: false,
            outlier_removal_enabled: false,
            outlier_threshold: 1.5,
            confidence_level: 0.95,
        }
    }

    #[test]
    fn test_valid_draft_is_parsed() {
        let kinds = validate_new_baseline(&draft()).unwrap();
        assert_eq!(kinds.calculation_method, CalculationMethod::HistoricalAverage);
        assert_eq!(kinds.granularity, Granularity::Weekly);
    }

    #[test]
    fn test_rejects_bad_settings() {
        let cases: Vec<(&str, Box<dyn Fn(&mut NewBaseline)>)> = vec![
            ("periods_used", Box::new(|d: &mut NewBaseline| d.periods_used = 0)),
            ("confidence_level", Box::new(|d: &mut NewBaseline| d.confidence_level = 1.0)),
            ("confidence_level", Box::new(|d: &mut NewBaseline| d.confidence_level = 0.0)),
            ("calculation_method", Box::new(|d: &mut NewBaseline| d.calculation_method = "arima".to_string())),
            ("granularity", Box::new(|d: &mut NewBaseline| d.granularity = "hourly".to_string())),
            ("outlier_threshold", Box::new(|d: &mut NewBaseline| d.outlier_threshold = -1.0)),
        ];

        for (expected_subject, mutate) in cases {
            let mut d = draft();
            mutate(&mut d);
            match validate_new_baseline(&d) {
                Err(EngineError::InputValidation { subject, stage, .. }) => {
                    assert_eq!(subject, expected_subject);
                    assert_eq!(stage, CalcStage::Validate);
                }
                other => panic!("expected InputValidation for {}, got {:?}", expected_subject, other),
            }
        }
    }

    #[test]
    fn test_effect_rates_bounds() {
        assert!(validate_effect_rates(&EffectRates::new(0.10, 0.05, 0.03, 0.04)).is_ok());
        assert!(validate_effect_rates(&EffectRates::new(0.5, 0.3, 1.0, 0.2)).is_ok());
        assert!(validate_effect_rates(&EffectRates::new(1.2, 0.0, 0.0, 0.0)).is_err());
        assert!(validate_effect_rates(&EffectRates::new(0.0, 0.0, -0.1, 0.0)).is_err());
        assert!(validate_effect_rates(&EffectRates::new(0.5, 0.4, 0.0, 0.2)).is_err());
    }
}
