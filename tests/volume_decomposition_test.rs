// ==========================================
// 促销量分解集成测试
// ==========================================
// 职责: 验证分解数值、前置条件、只追加存储
// ==========================================


#[cfg(test)]
mod volume_decomposition_test {
    use promo_baseline::api::ApiError;
    use promo_baseline::app::AppState;
    use promo_baseline::db::open_sqlite_connection;
    use promo_baseline::domain::EffectRates;
    use promo_baseline::engine::DecompositionRequest;

    use crate::test_helpers::*;

    /// 12 周平稳历史，计算完成的 active 基线
    fn active_baseline(state: &AppState) -> String {
        seed_weekly_history(state, &[100.0; 12], &[]);
        let baseline = state
            .baseline_api
            .create_baseline(weekly_draft("flat", "historical_average", 12))
            .unwrap();
        state
            .baseline_api
            .calculate_baseline(&baseline.baseline_id)
            .unwrap();
        baseline.baseline_id
    }

    fn request(baseline_id: &str, promotion_id: &str, rates: EffectRates) -> DecompositionRequest {
        DecompositionRequest {
            baseline_id: baseline_id.to_string(),
            promotion_id: promotion_id.to_string(),
            period_start: None,
            period_end: None,
            rates,
        }
    }

    #[test]
    fn test_decompose_promoted_week() {
        let (_tmp, state) = create_test_state();
        let baseline_id = active_baseline(&state);
        seed_promotion(&state, "P-1", week_start(11), 150.0, 50.0, 2.0);

        let d = state
            .baseline_api
            .decompose_volume(request(&baseline_id, "P-1", EffectRates::new(0.10, 0.05, 0.03, 0.04)))
            .unwrap();

        assert_close(d.total_volume, 150.0);
        assert_close(d.base_volume, 100.0);
        assert_close(d.incremental_volume, 50.0);
        assert_close(d.cannibalization_volume, 5.0);
        assert_close(d.pantry_loading_volume, 2.5);
        assert_close(d.pull_forward_volume, 2.0);
        assert_close(d.halo_volume, 1.5);
        assert_close(d.lift_pct.unwrap(), 50.0);
        assert_close(d.net_incremental_volume(), 40.5);
        assert_close(d.incremental_revenue, 100.0);
        assert_close(d.roi.unwrap(), 1.0);
        assert!(!d.underperformed);
        assert!(d.efficiency_score > 0.0 && d.efficiency_score <= 100.0);
        assert_eq!(d.period_start, week_start(11));
        assert!(d.weights_json.contains("lift"));

        let baseline = state.baseline_api.get_baseline(&baseline_id).unwrap();
        assert_eq!(d.baseline_revision, baseline.revision);
    }

    #[test]
    fn test_shortfall_reports_negative_lift() {
        let (_tmp, state) = create_test_state();
        let baseline_id = active_baseline(&state);
        seed_promotion(&state, "P-2", week_start(11), 80.0, 0.0, 2.0);

        let d = state
            .baseline_api
            .decompose_volume(request(&baseline_id, "P-2", EffectRates::new(0.10, 0.05, 0.03, 0.04)))
            .unwrap();

        assert_eq!(d.incremental_volume, 0.0);
        assert_eq!(d.cannibalization_volume, 0.0);
        assert_eq!(d.pantry_loading_volume, 0.0);
        assert_eq!(d.halo_volume, 0.0);
        assert_eq!(d.pull_forward_volume, 0.0);
        assert_close(d.lift_pct.unwrap(), -20.0);
        assert!(d.underperformed);
        assert_eq!(d.roi, None);
        assert_eq!(d.efficiency_score, 0.0);
    }

    #[test]
    fn test_explicit_window_apportions_partial_period() {
        let (_tmp, state) = create_test_state();
        let baseline_id = active_baseline(&state);
        seed_promotion(&state, "P-3", week_start(10), 150.0, 0.0, 1.0);

        // 窗口覆盖第 11 周的后 3 天 + 第 12 周的前 2 天
        let mut req = request(&baseline_id, "P-3", EffectRates::default());
        req.period_start = Some(week_start(10) + chrono::Duration::days(4));
        req.period_end = Some(week_start(11) + chrono::Duration::days(1));

        let d = state.baseline_api.decompose_volume(req).unwrap();
        assert_close(d.base_volume, 100.0 * 5.0 / 7.0);
        // 实际值与基线同口径分摊: 促销只覆盖第 11 周，计入 3/7
        assert_close(d.total_volume, 150.0 * 3.0 / 7.0);
        assert!(d.underperformed);
    }

    #[test]
    fn test_window_starting_mid_period_keeps_lift() {
        let (_tmp, state) = create_test_state();
        let baseline_id = active_baseline(&state);
        seed_promotion(&state, "P-8", week_start(9), 150.0, 0.0, 1.0);

        // 从促销周第 2 天开始的 6 天窗口
        let mut req = request(&baseline_id, "P-8", EffectRates::default());
        req.period_start = Some(week_start(9) + chrono::Duration::days(1));
        req.period_end = Some(week_start(9) + chrono::Duration::days(6));

        let d = state.baseline_api.decompose_volume(req).unwrap();
        assert_close(d.base_volume, 100.0 * 6.0 / 7.0);
        assert_close(d.total_volume, 150.0 * 6.0 / 7.0);
        assert_close(d.incremental_volume, 50.0 * 6.0 / 7.0);
        assert_close(d.lift_pct.unwrap(), 50.0);
        assert!(!d.underperformed);
    }

    #[test]
    fn test_window_outside_promotion_actuals_records_zero_total() {
        let (_tmp, state) = create_test_state();
        let baseline_id = active_baseline(&state);
        seed_promotion(&state, "P-9", week_start(9), 150.0, 0.0, 1.0);

        let mut req = request(&baseline_id, "P-9", EffectRates::default());
        req.period_start = Some(week_start(2));
        req.period_end = Some(week_start(2) + chrono::Duration::days(6));

        let d = state.baseline_api.decompose_volume(req).unwrap();
        assert_eq!(d.total_volume, 0.0);
        assert!(d.total_volume.is_sign_positive());
        let stored = state
            .baseline_api
            .get_decomposition(&d.decomposition_id)
            .unwrap();
        assert!(stored.total_volume.is_sign_positive());
    }

    #[test]
    fn test_rejects_draft_baseline() {
        let (_tmp, state) = create_test_state();
        seed_weekly_history(&state, &[100.0; 12], &[]);
        let baseline = state
            .baseline_api
            .create_baseline(weekly_draft("draft", "historical_average", 12))
            .unwrap();
        seed_promotion(&state, "P-4", week_start(11), 150.0, 0.0, 1.0);

        let err = state
            .baseline_api
            .decompose_volume(request(&baseline.baseline_id, "P-4", EffectRates::default()))
            .unwrap_err();
        match err {
            ApiError::PreconditionFailed(msg) => {
                assert!(msg.contains(&baseline.baseline_id));
                assert!(msg.contains("P-4"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_window_without_overlap() {
        let (_tmp, state) = create_test_state();
        let baseline_id = active_baseline(&state);
        seed_promotion(&state, "P-5", date(2025, 6, 2), 150.0, 0.0, 1.0);

        let err = state
            .baseline_api
            .decompose_volume(request(&baseline_id, "P-5", EffectRates::default()))
            .unwrap_err();
        assert!(matches!(err, ApiError::PreconditionFailed(_)));
        assert!(state
            .baseline_api
            .list_decompositions(&baseline_id)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_rejects_invalid_rates_and_unknown_promotion() {
        let (_tmp, state) = create_test_state();
        let baseline_id = active_baseline(&state);
        seed_promotion(&state, "P-6", week_start(11), 150.0, 0.0, 1.0);

        for rates in [
            EffectRates::new(1.2, 0.0, 0.0, 0.0),
            EffectRates::new(-0.1, 0.0, 0.0, 0.0),
            EffectRates::new(0.5, 0.4, 0.0, 0.3),
        ] {
            assert!(matches!(
                state
                    .baseline_api
                    .decompose_volume(request(&baseline_id, "P-6", rates)),
                Err(ApiError::InvalidInput(_))
            ));
        }

        assert!(matches!(
            state
                .baseline_api
                .decompose_volume(request(&baseline_id, "missing", EffectRates::default())),
            Err(ApiError::NotFound(_))
        ));
    }

    #[test]
    fn test_decompositions_are_append_only() {
        let (_tmp, state) = create_test_state();
        let baseline_id = active_baseline(&state);
        seed_promotion(&state, "P-7", week_start(11), 150.0, 50.0, 2.0);

        let api = &state.baseline_api;
        let first = api
            .decompose_volume(request(&baseline_id, "P-7", EffectRates::new(0.1, 0.0, 0.0, 0.0)))
            .unwrap();
        let second = api
            .decompose_volume(request(&baseline_id, "P-7", EffectRates::new(0.2, 0.0, 0.0, 0.0)))
            .unwrap();
        assert_ne!(first.decomposition_id, second.decomposition_id);

        let listed = api.list_decompositions(&baseline_id).unwrap();
        assert_eq!(listed.len(), 2);
        assert_close(listed[0].cannibalization_volume, 5.0);
        assert_close(listed[1].cannibalization_volume, 10.0);

        // 直接 UPDATE 被触发器拦截
        let conn = open_sqlite_connection(&state.db_path).unwrap();
        let result = conn.execute(
            "UPDATE volume_decomposition SET total_volume = 0 WHERE decomposition_id = ?1",
            [&first.decomposition_id],
        );
        assert!(result.is_err());
        drop(conn);

        let reloaded = api.get_decomposition(&first.decomposition_id).unwrap();
        assert_close(reloaded.total_volume, 150.0);

        // 重算基线不影响已有分解记录
        api.calculate_baseline(&baseline_id).unwrap();
        assert_eq!(api.list_decompositions(&baseline_id).unwrap().len(), 2);
    }
}
