// ==========================================
// 促销基线估算系统 - 时间序列预处理
// ==========================================
// 职责: 基于 IQR 的异常值识别与局部中位数替换
// 输入: 按期有序的实际值序列 + 阈值 + 开关
// 输出: 清洗后的序列 + 被替换的期下标
// 红线: 不足 4 期的序列跳过检测，原样返回（detection_skipped = true）
// ==========================================

use crate::engine::error::{CalcStage, EngineError, EngineResult};
use crate::engine::stats;

/// 启用异常值检测的最小期数
pub const MIN_OUTLIER_SERIES_LEN: usize = 4;

// ==========================================
// OutlierSettings - 异常值处理参数
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierSettings {
    pub enabled: bool,
    pub threshold: f64,             // IQR 倍数 k
    pub seasonality_enabled: bool,  // 启用时按季节周期窗口计算四分位
    pub seasonal_cycle: usize,
}

// ==========================================
// PreprocessResult - 预处理结果
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessResult {
    pub values: Vec<f64>,
    pub replaced: Vec<usize>, // 被替换的期下标
    pub detection_skipped: bool,
}

// ==========================================
// TimeSeriesPreprocessor
// ==========================================
#[derive(Debug, Clone)]
pub struct TimeSeriesPreprocessor {
    median_window: usize, // 局部中位数窗口（居中，含两侧）
}

impl Default for TimeSeriesPreprocessor {
    fn default() -> Self {
        Self::new(5)
    }
}

impl TimeSeriesPreprocessor {
    pub fn new(median_window: usize) -> Self {
        Self {
            median_window: median_window.max(3),
        }
    }

    /// 清洗序列
    ///
    /// # 返回
    /// - Ok(PreprocessResult): 清洗结果
    /// - Err(InsufficientData): 空序列
    pub fn clean(&self, series: &[f64], settings: &OutlierSettings) -> EngineResult<PreprocessResult> {
        if series.is_empty() {
            return Err(EngineError::InsufficientData {
                stage: CalcStage::Preprocess,
                required: 1,
                available: 0,
            });
        }

        if !settings.enabled {
            return Ok(PreprocessResult {
                values: series.to_vec(),
                replaced: Vec::new(),
                detection_skipped: false,
            });
        }

        if series.len() < MIN_OUTLIER_SERIES_LEN {
            tracing::debug!(
                periods = series.len(),
                "序列不足 {} 期，跳过异常值检测",
                MIN_OUTLIER_SERIES_LEN
            );
            return Ok(PreprocessResult {
                values: series.to_vec(),
                replaced: Vec::new(),
                detection_skipped: true,
            });
        }

        // 先全部判定再替换，替换值只取原始序列，避免级联
        let outliers: Vec<usize> = (0..series.len())
            .filter(|&i| self.is_outlier(series, i, settings))
            .collect();

        let mut values = series.to_vec();
        for &i in &outliers {
            if let Some(replacement) = self.local_median(series, i) {
                tracing::debug!(index = i, original = series[i], replacement, "替换异常值");
                values[i] = replacement;
            }
        }

        Ok(PreprocessResult {
            values,
            replaced: outliers,
            detection_skipped: false,
        })
    }

    /// 判断第 i 期是否越过 [Q1 - k·IQR, Q3 + k·IQR]
    fn is_outlier(&self, series: &[f64], i: usize, settings: &OutlierSettings) -> bool {
        let reference = self.reference_window(series, i, settings);
        let (q1, q3) = match (stats::quantile(reference, 0.25), stats::quantile(reference, 0.75)) {
            (Some(q1), Some(q3)) => (q1, q3),
            _ => return false,
        };
        let iqr = q3 - q1;
        let lower = q1 - settings.threshold * iqr;
        let upper = q3 + settings.threshold * iqr;
        series[i] < lower || series[i] > upper
    }

    /// 四分位参考窗口
    ///
    /// 启用季节性时取以 i 为中心、长度为一个季节周期的窗口，避免把季节高峰误判为异常
    fn reference_window<'a>(&self, series: &'a [f64], i: usize, settings: &OutlierSettings) -> &'a [f64] {
        let n = series.len();
        if !settings.seasonality_enabled || settings.seasonal_cycle >= n {
            return series;
        }
        let width = settings.seasonal_cycle.max(MIN_OUTLIER_SERIES_LEN);
        let half = width / 2;
        let start = i.saturating_sub(half).min(n - width);
        &series[start..start + width]
    }

    /// 以 i 为中心的局部中位数（不含 i 自身）
    fn local_median(&self, series: &[f64], i: usize) -> Option<f64> {
        let half = self.median_window / 2;
        let start = i.saturating_sub(half);
        let end = (i + half + 1).min(series.len());
        let neighbours: Vec<f64> = (start..end)
            .filter(|&j| j != i)
            .map(|j| series[j])
            .collect();
        stats::median(&neighbours)
    }
}
