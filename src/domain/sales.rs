// ==========================================
// 促销基线估算系统 - 外部数据领域模型
// ==========================================
// 职责: 历史销售期数据 / 促销活动数据
// 说明: 由 HistoricalSalesProvider / PromotionProvider 提供
// ==========================================

use crate::domain::types::BaselineType;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ==========================================
// SalesPeriod - 单期历史销售
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesPeriod {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate, // 含
    pub volume: f64,
    pub revenue: f64,
    pub units: f64,
    pub is_promoted: bool, // 该期内有促销活动
}

impl SalesPeriod {
    /// 按基线类型取度量值
    pub fn measure(&self, baseline_type: BaselineType) -> f64 {
        match baseline_type {
            BaselineType::Volume => self.volume,
            BaselineType::Revenue => self.revenue,
            BaselineType::Units => self.units,
        }
    }
}

// ==========================================
// Promotion - 促销活动
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Promotion {
    pub promotion_id: String,
    pub name: String,
    pub run_start: NaiveDate,
    pub run_end: NaiveDate,
    pub cost: f64,
    pub average_selling_price: f64,
    pub actuals: Vec<PromotionActual>,
}

impl Promotion {
    /// 汇总窗口内的实际值
    ///
    /// 与窗口部分重叠的记录按重叠天数/期天数分摊，口径与窗口基线量一致
    pub fn total_in_window(
        &self,
        baseline_type: BaselineType,
        window_start: NaiveDate,
        window_end: NaiveDate,
    ) -> f64 {
        self.actuals.iter().fold(0.0, |total, a| {
            let days = a.overlap_days(window_start, window_end);
            if days <= 0 {
                total
            } else {
                total + a.measure(baseline_type) * days as f64 / a.day_count() as f64
            }
        })
    }
}

// ==========================================
// PromotionActual - 促销期实际表现
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionActual {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub volume: f64,
    pub revenue: f64,
    pub units: f64,
}

impl PromotionActual {
    pub fn measure(&self, baseline_type: BaselineType) -> f64 {
        match baseline_type {
            BaselineType::Volume => self.volume,
            BaselineType::Revenue => self.revenue,
            BaselineType::Units => self.units,
        }
    }

    /// 期天数（含两端，至少 1 天）
    pub fn day_count(&self) -> i64 {
        ((self.period_end - self.period_start).num_days() + 1).max(1)
    }

    /// 与 [start, end] 的重叠天数
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

#[cfg(test)]
mod tests {
    use super::*;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, day).unwrap()
    }

    fn weekly_actual(start: NaiveDate, volume: f64) -> PromotionActual {
        PromotionActual {
            period_start: start,
            period_end: start + chrono::Duration::days(6),
            volume,
            revenue: volume * 2.0,
            units: volume,
        }
    }

    fn promotion(actuals: Vec<PromotionActual>) -> Promotion {
        Promotion {
            promotion_id: "P".to_string(),
            name: "p".to_string(),
            run_start: d(3, 10),
            run_end: d(3, 23),
            cost: 0.0,
            average_selling_price: 1.0,
            actuals,
        }
    }

    #[test]
    fn test_total_in_window_apportions_partial_periods() {
        let p = promotion(vec![
            weekly_actual(d(3, 10), 140.0),
            weekly_actual(d(3, 17), 70.0),
        ]);

        // 整期覆盖
        assert_eq!(p.total_in_window(BaselineType::Volume, d(3, 10), d(3, 23)), 210.0);
        // 窗口从第 1 周第 2 天开始: 6/7 · 140
        let t = p.total_in_window(BaselineType::Volume, d(3, 11), d(3, 16));
        assert!((t - 120.0).abs() < 1e-9);
        // 跨两周: 第 1 周 3 天 (60) + 第 2 周 2 天 (20)
        let t = p.total_in_window(BaselineType::Revenue, d(3, 14), d(3, 18));
        assert!((t - 160.0).abs() < 1e-9);
    }

    #[test]
    fn test_total_in_window_without_overlap_is_positive_zero() {
        let p = promotion(vec![weekly_actual(d(3, 10), 140.0)]);
        let t = p.total_in_window(BaselineType::Volume, d(4, 1), d(4, 7));
        assert_eq!(t, 0.0);
        assert!(t.is_sign_positive());

        let empty = promotion(vec![]);
        assert!(empty
            .total_in_window(BaselineType::Units, d(3, 10), d(3, 16))
            .is_sign_positive());
    }
}
