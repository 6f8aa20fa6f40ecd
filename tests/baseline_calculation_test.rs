// ==========================================
// 基线计算集成测试
// ==========================================
// 职责: 验证计算结果、幂等性、全有或全无、状态机
// ==========================================


#[cfg(test)]
mod baseline_calculation_test {
    use promo_baseline::api::ApiError;
    use promo_baseline::db::open_sqlite_connection;
    use promo_baseline::domain::{BaselineStatus, Granularity};
    use promo_baseline::engine::CalcStage;

    use crate::test_helpers::*;

    // ==========================================
    // 计算结果
    // ==========================================

    #[test]
    fn test_historical_average_flat_series() {
        promo_baseline::logging::init_test();
        let (_tmp, state) = create_test_state();
        seed_weekly_history(&state, &[100.0; 12], &[]);

        let api = &state.baseline_api;
        let baseline = api
            .create_baseline(weekly_draft("flat", "historical_average", 12))
            .unwrap();
        assert_eq!(baseline.status, BaselineStatus::Draft);
        assert_eq!(baseline.base_year, 2025);

        let summary = api.calculate_baseline(&baseline.baseline_id).unwrap();
        assert_eq!(summary.status, BaselineStatus::Active);
        assert_eq!(summary.period_count, 12);
        assert_eq!(summary.mape, Some(0.0));
        assert_eq!(summary.r_squared, None);
        assert_close(summary.total_base_volume.unwrap(), 1200.0);
        assert_close(summary.avg_weekly_volume.unwrap(), 100.0);

        let periods = api.list_periods(&baseline.baseline_id).unwrap();
        assert_eq!(periods.len(), 12);
        for (i, p) in periods.iter().enumerate() {
            assert_eq!(p.period_number, i as i32 + 1);
            assert_close(p.base_volume, 100.0);
            assert_close(p.seasonality_factor, 1.0);
            assert_close(p.variance_volume, 0.0);
            assert_eq!(p.incremental_volume, 0.0);
        }
        assert_eq!(periods[0].period_label, "2025-W02");
    }

    #[test]
    fn test_recalculation_is_idempotent() {
        let (_tmp, state) = create_test_state();
        let values: Vec<f64> = (0..16).map(|i| 100.0 + (i % 4) as f64 * 5.0).collect();
        seed_weekly_history(&state, &values, &[6]);

        let api = &state.baseline_api;
        let baseline = api
            .create_baseline(weekly_draft("wma", "weighted_moving_average", 16))
            .unwrap();

        let first = api.calculate_baseline(&baseline.baseline_id).unwrap();
        let first_periods = api.list_periods(&baseline.baseline_id).unwrap();
        let second = api.calculate_baseline(&baseline.baseline_id).unwrap();
        let second_periods = api.list_periods(&baseline.baseline_id).unwrap();

        assert_eq!(first_periods, second_periods);
        assert_eq!(first.total_base_volume, second.total_base_volume);
        assert_eq!(first.mape, second.mape);
        assert!(second.revision > first.revision);

        // 促销期的增量 = max(0, actual - base)，非促销期为 0
        for p in &second_periods {
            if p.is_promoted {
                assert_close(p.incremental_volume, (p.actual_volume - p.base_volume).max(0.0));
            } else {
                assert_eq!(p.incremental_volume, 0.0);
            }
        }
        assert!(second_periods[6].is_promoted);
    }

    #[test]
    fn test_seasonal_method_with_short_history_fails() {
        let (_tmp, state) = create_test_state();
        seed_weekly_history(&state, &[100.0; 10], &[]);

        let api = &state.baseline_api;
        let mut draft = weekly_draft("seasonal", "seasonal_decomposition", 10);
        draft.seasonality_enabled = true;
        let baseline = api.create_baseline(draft).unwrap();

        let err = api.calculate_baseline(&baseline.baseline_id).unwrap_err();
        match err {
            ApiError::CalculationFailed {
                baseline_id,
                stage,
                cause,
            } => {
                assert_eq!(baseline_id, baseline.baseline_id);
                assert_eq!(stage, CalcStage::Fit);
                assert!(cause.contains("52"), "cause: {}", cause);
            }
            other => panic!("unexpected: {:?}", other),
        }

        // 失败后恢复计算前状态，且没有任何基线期
        let reloaded = api.get_baseline(&baseline.baseline_id).unwrap();
        assert_eq!(reloaded.status, BaselineStatus::Draft);
        assert_eq!(reloaded.prior_status, None);
        assert!(api.list_periods(&baseline.baseline_id).unwrap().is_empty());
    }

    #[test]
    fn test_failed_recalculation_keeps_previous_result() {
        let (_tmp, state) = create_test_state();
        seed_weekly_history(&state, &[100.0; 12], &[]);

        let api = &state.baseline_api;
        let baseline = api
            .create_baseline(weekly_draft("keep", "historical_average", 12))
            .unwrap();
        api.calculate_baseline(&baseline.baseline_id).unwrap();
        api.approve_baseline(&baseline.baseline_id).unwrap();
        let before = api.list_periods(&baseline.baseline_id).unwrap();

        // 清空历史，重算在拉取阶段失败
        let conn = open_sqlite_connection(&state.db_path).unwrap();
        conn.execute("DELETE FROM sales_history", []).unwrap();
        drop(conn);

        let err = api.calculate_baseline(&baseline.baseline_id).unwrap_err();
        assert!(matches!(
            err,
            ApiError::CalculationFailed {
                stage: CalcStage::FetchHistory,
                ..
            }
        ));

        let reloaded = api.get_baseline(&baseline.baseline_id).unwrap();
        assert_eq!(reloaded.status, BaselineStatus::Approved);
        assert_eq!(api.list_periods(&baseline.baseline_id).unwrap(), before);
    }

    #[test]
    fn test_history_gap_is_rejected() {
        let (_tmp, state) = create_test_state();
        let mut history = weekly_history(&[100.0; 12], &[]);
        history.remove(4);
        state
            .sales_history_repo
            .insert_periods(&product_scope(), Granularity::Weekly, &history)
            .unwrap();

        let api = &state.baseline_api;
        let baseline = api
            .create_baseline(weekly_draft("gap", "historical_average", 12))
            .unwrap();

        let err = api.calculate_baseline(&baseline.baseline_id).unwrap_err();
        match err {
            ApiError::CalculationFailed {
                baseline_id,
                stage,
                cause,
            } => {
                assert_eq!(baseline_id, baseline.baseline_id);
                assert_eq!(stage, CalcStage::FetchHistory);
                assert!(cause.contains(&week_start(4).to_string()), "cause: {}", cause);
            }
            other => panic!("unexpected: {:?}", other),
        }

        let reloaded = api.get_baseline(&baseline.baseline_id).unwrap();
        assert_eq!(reloaded.status, BaselineStatus::Draft);
        assert!(api.list_periods(&baseline.baseline_id).unwrap().is_empty());
    }

    #[test]
    fn test_stored_periods_are_contiguous() {
        let (_tmp, state) = create_test_state();
        seed_weekly_history(&state, &[100.0; 12], &[3]);

        let api = &state.baseline_api;
        let baseline = api
            .create_baseline(weekly_draft("contiguous", "moving_average", 12))
            .unwrap();
        api.calculate_baseline(&baseline.baseline_id).unwrap();

        let periods = api.list_periods(&baseline.baseline_id).unwrap();
        for pair in periods.windows(2) {
            assert_eq!(
                pair[1].period_start,
                Granularity::Weekly.next_period_start(pair[0].period_start)
            );
            assert_eq!(
                pair[0].period_end,
                Granularity::Weekly.period_end(pair[0].period_start)
            );
        }
    }

    #[test]
    fn test_invalid_config_rejected_at_creation() {
        let (_tmp, state) = create_test_state();
        let api = &state.baseline_api;

        let mut unknown_method = weekly_draft("bad", "arima", 12);
        assert!(matches!(
            api.create_baseline(unknown_method.clone()),
            Err(ApiError::InvalidInput(_))
        ));

        unknown_method.calculation_method = "moving_average".to_string();
        unknown_method.confidence_level = 1.0;
        assert!(matches!(
            api.create_baseline(unknown_method),
            Err(ApiError::InvalidInput(_))
        ));

        let mut zero_periods = weekly_draft("bad", "moving_average", 12);
        zero_periods.periods_used = 0;
        assert!(matches!(
            api.create_baseline(zero_periods),
            Err(ApiError::InvalidInput(_))
        ));

        assert!(api.list_baselines(None).unwrap().is_empty());
    }

    // ==========================================
    // 状态机
    // ==========================================

    #[test]
    fn test_lifecycle_transitions() {
        let (_tmp, state) = create_test_state();
        seed_weekly_history(&state, &[100.0; 12], &[]);
        let api = &state.baseline_api;

        let baseline = api
            .create_baseline(weekly_draft("life", "moving_average", 12))
            .unwrap();
        let id = baseline.baseline_id.clone();

        // draft 不能直接审批
        assert!(matches!(
            api.approve_baseline(&id),
            Err(ApiError::InvalidStateTransition { .. })
        ));
        // 非 calculating 不能回滚
        assert!(matches!(
            api.force_rollback(&id),
            Err(ApiError::InvalidStateTransition { .. })
        ));

        api.calculate_baseline(&id).unwrap();
        let approved = api.approve_baseline(&id).unwrap();
        assert_eq!(approved.status, BaselineStatus::Approved);

        // 已审批的基线重算后回到 active
        let summary = api.calculate_baseline(&id).unwrap();
        assert_eq!(summary.status, BaselineStatus::Active);

        let archived = api.archive_baseline(&id).unwrap();
        assert_eq!(archived.status, BaselineStatus::Archived);

        // 归档为终态
        assert!(matches!(
            api.calculate_baseline(&id),
            Err(ApiError::InvalidStateTransition { .. })
        ));
        assert!(matches!(
            api.approve_baseline(&id),
            Err(ApiError::InvalidStateTransition { .. })
        ));

        let listed = api.list_baselines(Some(BaselineStatus::Archived)).unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[test]
    fn test_unknown_baseline_is_not_found() {
        let (_tmp, state) = create_test_state();
        let api = &state.baseline_api;
        assert!(matches!(
            api.calculate_baseline("missing"),
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(api.get_baseline("missing"), Err(ApiError::NotFound(_))));
        assert!(matches!(api.get_baseline(" "), Err(ApiError::InvalidInput(_))));
    }
}
