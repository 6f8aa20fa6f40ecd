// ==========================================
// 促销基线估算系统 - 外部数据源接口
// ==========================================
// 职责: 定义历史销售 / 促销活动的读取 trait，实现依赖倒置
// 说明: Engine 层定义 trait，Repository 层提供 SQLite 实现
// 红线: 范围过滤通过参数显式传入，不依赖全局租户状态
// ==========================================

use crate::domain::baseline::BaselineScope;
use crate::domain::sales::{Promotion, SalesPeriod};
use crate::domain::types::Granularity;
use chrono::NaiveDate;
use std::error::Error;

/// 数据源错误类型
pub type ProviderError = Box<dyn Error + Send + Sync>;

// ==========================================
// Trait: HistoricalSalesProvider
// ==========================================
// 实现者: SalesHistoryRepository（sales_history 表）
pub trait HistoricalSalesProvider: Send + Sync {
    /// 按范围与粒度读取 [start, end] 内的历史销售
    ///
    /// # 返回
    /// - 按 period_start 升序排列、互不重叠的期序列
    fn get_series(
        &self,
        scope: &BaselineScope,
        granularity: Granularity,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<SalesPeriod>, ProviderError>;
}

// ==========================================
// Trait: PromotionProvider
// ==========================================
// 实现者: PromotionRepository（promotion / promotion_actual 表）
pub trait PromotionProvider: Send + Sync {
    /// 读取促销活动（含按期实际表现）
    ///
    /// # 返回
    /// - Ok(None): 促销不存在
    fn get_promotion(&self, promotion_id: &str) -> Result<Option<Promotion>, ProviderError>;
}
