// ==========================================
// 促销基线估算系统 - 领域类型定义
// ==========================================
// 职责: 基线类型 / 计算方法 / 时间粒度 / 基线状态
// 序列化格式: snake_case (与数据库存储一致)
// ==========================================

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 基线类型 (Baseline Type)
// ==========================================
// 决定从销售历史中取哪一个度量
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineType {
    Volume,  // 销量
    Revenue, // 销售额
    Units,   // 件数
}

impl BaselineType {
    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            BaselineType::Volume => "volume",
            BaselineType::Revenue => "revenue",
            BaselineType::Units => "units",
        }
    }

    /// 度量本身是否为金额（金额型基线的增量不再乘以单价）
    pub fn is_monetary(&self) -> bool {
        matches!(self, BaselineType::Revenue)
    }
}

impl fmt::Display for BaselineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl std::str::FromStr for BaselineType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "volume" => Ok(BaselineType::Volume),
            "revenue" => Ok(BaselineType::Revenue),
            "units" => Ok(BaselineType::Units),
            other => Err(format!("未知基线类型: {}", other)),
        }
    }
}

// ==========================================
// 计算方法 (Calculation Method)
// ==========================================
// 每个方法对应 engine::models 下的一个独立实现
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationMethod {
    HistoricalAverage,
    MovingAverage,
    WeightedMovingAverage,
    LinearRegression,
    SeasonalDecomposition,
    ExponentialSmoothing,
}

impl CalculationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalculationMethod::HistoricalAverage => "historical_average",
            CalculationMethod::MovingAverage => "moving_average",
            CalculationMethod::WeightedMovingAverage => "weighted_moving_average",
            CalculationMethod::LinearRegression => "linear_regression",
            CalculationMethod::SeasonalDecomposition => "seasonal_decomposition",
            CalculationMethod::ExponentialSmoothing => "exponential_smoothing",
        }
    }

    /// 全部方法（用于配置校验 / 下拉展示）
    pub fn all() -> [CalculationMethod; 6] {
        [
            CalculationMethod::HistoricalAverage,
            CalculationMethod::MovingAverage,
            CalculationMethod::WeightedMovingAverage,
            CalculationMethod::LinearRegression,
            CalculationMethod::SeasonalDecomposition,
            CalculationMethod::ExponentialSmoothing,
        ]
    }
}

impl fmt::Display for CalculationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CalculationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "historical_average" | "historical-average" => Ok(CalculationMethod::HistoricalAverage),
            "moving_average" | "moving-average" => Ok(CalculationMethod::MovingAverage),
            "weighted_moving_average" | "weighted-moving-average" => {
                Ok(CalculationMethod::WeightedMovingAverage)
            }
            "linear_regression" | "linear-regression" => Ok(CalculationMethod::LinearRegression),
            "seasonal_decomposition" | "seasonal-decomposition" => {
                Ok(CalculationMethod::SeasonalDecomposition)
            }
            "exponential_smoothing" | "exponential-smoothing" => {
                Ok(CalculationMethod::ExponentialSmoothing)
            }
            other => Err(format!("未知计算方法: {}", other)),
        }
    }
}

// ==========================================
// 时间粒度 (Granularity)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
}

impl Granularity {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            Granularity::Daily => "daily",
            Granularity::Weekly => "weekly",
            Granularity::Monthly => "monthly",
            Granularity::Quarterly => "quarterly",
        }
    }

    /// 一个季节周期包含的期数
    ///
    /// daily=7（周内效应）, weekly=52, monthly=12, quarterly=4
    pub fn seasonal_cycle(&self) -> usize {
        match self {
            Granularity::Daily => 7,
            Granularity::Weekly => 52,
            Granularity::Monthly => 12,
            Granularity::Quarterly => 4,
        }
    }

    /// 计算下一期的起始日期
    pub fn next_period_start(&self, start: NaiveDate) -> NaiveDate {
        match self {
            Granularity::Daily => start + Duration::days(1),
            Granularity::Weekly => start + Duration::days(7),
            Granularity::Monthly => add_months(start, 1),
            Granularity::Quarterly => add_months(start, 3),
        }
    }

    /// 计算一期的结束日期（含）
    pub fn period_end(&self, start: NaiveDate) -> NaiveDate {
        self.next_period_start(start) - Duration::days(1)
    }

    /// 生成期标签
    ///
    /// daily: 2025-03-01, weekly: 2025-W09, monthly: 2025-03, quarterly: 2025-Q1
    pub fn period_label(&self, start: NaiveDate) -> String {
        match self {
            Granularity::Daily => start.format("%Y-%m-%d").to_string(),
            Granularity::Weekly => {
                let iso = start.iso_week();
                format!("{}-W{:02}", iso.year(), iso.week())
            }
            Granularity::Monthly => start.format("%Y-%m").to_string(),
            Granularity::Quarterly => {
                format!("{}-Q{}", start.year(), (start.month0() / 3) + 1)
            }
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl std::str::FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(Granularity::Daily),
            "weekly" => Ok(Granularity::Weekly),
            "monthly" => Ok(Granularity::Monthly),
            "quarterly" => Ok(Granularity::Quarterly),
            other => Err(format!("未知时间粒度: {}", other)),
        }
    }
}

fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(chrono::Months::new(months))
        .unwrap_or(date)
}

// ==========================================
// 基线状态 (Baseline Status)
// ==========================================
// 状态机:
//   draft → calculating → active → approved
//   active / approved → calculating（重算）
//   任意稳定态 → archived（终态）
// calculating 是唯一的瞬态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineStatus {
    Draft,       // 草稿
    Calculating, // 计算中
    Active,      // 生效
    Approved,    // 已审批
    Archived,    // 已归档
}

impl BaselineStatus {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            BaselineStatus::Draft => "draft",
            BaselineStatus::Calculating => "calculating",
            BaselineStatus::Active => "active",
            BaselineStatus::Approved => "approved",
            BaselineStatus::Archived => "archived",
        }
    }

    /// 是否为稳定态
    pub fn is_stable(&self) -> bool {
        !matches!(self, BaselineStatus::Calculating)
    }

    /// 是否可用于增量分解
    pub fn is_ready(&self) -> bool {
        matches!(self, BaselineStatus::Active | BaselineStatus::Approved)
    }

    /// 是否允许转换到目标状态
    pub fn can_transition_to(&self, target: BaselineStatus) -> bool {
        use BaselineStatus::*;
        match (self, target) {
            (Draft, Calculating) => true,
            (Active, Calculating) | (Approved, Calculating) => true,
            (Calculating, Active) => true,
            (Active, Approved) => true,
            (Archived, _) => false,
            (from, Archived) => from.is_stable(),
            _ => false,
        }
    }
}

impl fmt::Display for BaselineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl std::str::FromStr for BaselineStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "draft" => Ok(BaselineStatus::Draft),
            "calculating" => Ok(BaselineStatus::Calculating),
            "active" => Ok(BaselineStatus::Active),
            "approved" => Ok(BaselineStatus::Approved),
            "archived" => Ok(BaselineStatus::Archived),
            other => Err(format!("未知基线状态: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        use BaselineStatus::*;
        assert!(Draft.can_transition_to(Calculating));
        assert!(Calculating.can_transition_to(Active));
        assert!(Active.can_transition_to(Approved));
        assert!(Approved.can_transition_to(Calculating));
        assert!(Active.can_transition_to(Archived));
        assert!(Draft.can_transition_to(Archived));

        assert!(!Draft.can_transition_to(Approved));
        assert!(!Calculating.can_transition_to(Archived));
        assert!(!Archived.can_transition_to(Calculating));
        assert!(!Archived.can_transition_to(Draft));
    }

    #[test]
    fn test_method_from_str() {
        for method in CalculationMethod::all() {
            assert_eq!(method.as_str().parse::<CalculationMethod>(), Ok(method));
        }
        assert!("arima".parse::<CalculationMethod>().is_err());
    }

    #[test]
    fn test_period_labels() {
        let d = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        assert_eq!(Granularity::Daily.period_label(d), "2025-03-03");
        assert_eq!(Granularity::Weekly.period_label(d), "2025-W10");
        assert_eq!(Granularity::Monthly.period_label(d), "2025-03");
        assert_eq!(Granularity::Quarterly.period_label(d), "2025-Q1");
    }

    #[test]
    fn test_period_end() {
        let d = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert_eq!(
            Granularity::Monthly.period_end(d),
            NaiveDate::from_ymd_opt(2025, 1, 31).unwrap()
        );
        assert_eq!(
            Granularity::Quarterly.period_end(d),
            NaiveDate::from_ymd_opt(2025, 3, 31).unwrap()
        );
        assert_eq!(
            Granularity::Weekly.period_end(d),
            NaiveDate::from_ymd_opt(2025, 1, 7).unwrap()
        );
    }
}
