//! Integration tests for the Engine

#[cfg(test)]
mod tests {
    use crate::clock::{RecordingSleeper, Sleeper};
    use crate::{CaptionStatus, Engine, EngineConfig, ExtractorError, ProgressSink, RunRequest};
    use async_trait::async_trait;
    use ricettario_domain::{
        CaptionUnit, ExecutionMode, ExtractionErrorKind, ProcessingMode, RecipeCache, RunLedger,
    };
    use ricettario_llm::{MockBatchOutcome, MockProvider};
    use ricettario_store::{normalize_caption, SqliteStore};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    const YES: &str = r#"{"is_recipe": true, "confidence": 0.9, "reasoning": "has steps"}"#;
    const NO: &str = r#"{"is_recipe": false, "confidence": 0.95, "reasoning": "greeting"}"#;
    const EXTRACTED: &str = r#"{
        "title": "Baked dish",
        "ingredients": ["flour", "salt"],
        "proteins": ["Pollo", "chicken"],
        "vegetables": ["Pomodoro"],
        "dish_type": "chicken",
        "confidence_score": 0.6
    }"#;

    /// Only the extraction system prompt contains this text
    const EXTRACTION_MARKER: &str = "You extract a structured recipe";

    fn example_captions() -> Vec<CaptionUnit> {
        vec![
            CaptionUnit::new("0", "Bake chicken at 400F for 20 min with salt"),
            CaptionUnit::new("1", "Happy birthday!"),
            CaptionUnit::new("2", "Mix flour, sugar, eggs; bake 350F 25min"),
        ]
    }

    fn recipe_captions(n: usize) -> Vec<CaptionUnit> {
        (0..n)
            .map(|i| CaptionUnit::new(format!("r{}", i), format!("Recipe number {}: bake it", i)))
            .collect()
    }

    fn mock() -> MockProvider {
        let mock = MockProvider::new(YES);
        mock.add_response("Happy birthday", NO);
        mock.add_response(EXTRACTION_MARKER, EXTRACTED);
        mock
    }

    fn fast_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.retry.base_delay_ms = 1;
        config.retry.max_delay_ms = 2;
        config.retry.jitter = false;
        config
    }

    fn store() -> Arc<SqliteStore> {
        Arc::new(SqliteStore::new(":memory:").unwrap())
    }

    fn engine(mock: &MockProvider, store: &Arc<SqliteStore>, config: EngineConfig) -> Engine<SqliteStore> {
        Engine::new(Arc::new(mock.clone()), Arc::clone(store), config).unwrap()
    }

    fn batch_engine(mock: &MockProvider, store: &Arc<SqliteStore>) -> Engine<SqliteStore> {
        engine(mock, store, fast_config())
            .with_batch_service(Arc::new(mock.clone()))
            .with_sleeper(Arc::new(RecordingSleeper::default()))
    }

    async fn run(engine: &Engine<SqliteStore>, request: RunRequest) -> crate::RunReport {
        engine
            .run(request, ProgressSink::disabled(), CancellationToken::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_three_caption_example() {
        let mock = mock();
        let store = store();
        let engine = engine(&mock, &store, fast_config());

        let report = run(&engine, RunRequest::new(example_captions())).await;

        let statuses: Vec<_> = report.outcomes.iter().map(|o| o.status).collect();
        assert_eq!(
            statuses,
            vec![CaptionStatus::Accepted, CaptionStatus::Rejected, CaptionStatus::Accepted]
        );
        let ids: Vec<_> = report.recipes.iter().map(|r| r.caption_id.as_str()).collect();
        assert_eq!(ids, vec!["0", "2"]);

        // three classifications, two extractions
        assert_eq!(mock.call_count(), 5);
        assert_eq!(report.record.total_captions, 3);
        assert_eq!(report.record.accepted_count, 2);
        assert_eq!(report.record.rejected_count, 1);
        assert_eq!(report.record.errored_count, 0);
        assert_eq!(report.record.success_rate, 1.0);
        assert_eq!(report.record.mode_used, ExecutionMode::Concurrent);
        assert_eq!(report.record.model_name, "mock-model");
        assert!((report.record.total_cost_estimate - 5.0 * 0.00036).abs() < 1e-12);

        let latest = store.latest(1).unwrap();
        assert_eq!(latest, vec![report.record.clone()]);
    }

    #[tokio::test]
    async fn test_confidence_merge_and_term_normalization() {
        let mock = mock();
        let store = store();
        let report = run(&engine(&mock, &store, fast_config()), RunRequest::new(recipe_captions(1))).await;

        let record = &report.recipes[0].record;
        // classification 0.9 beats the extracted 0.6
        assert_eq!(record.confidence_score, 0.9);
        assert_eq!(record.proteins, vec!["chicken".to_string()]);
        assert_eq!(record.vegetables, vec!["tomato".to_string()]);
        assert_eq!(record.ingredients, vec!["flour".to_string(), "salt".to_string()]);
        assert!((report.record.average_confidence - 0.9).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_cached_caption_makes_no_calls() {
        let mock = mock();
        let store = store();
        let engine = engine(&mock, &store, fast_config());

        let first = run(&engine, RunRequest::new(recipe_captions(3))).await;
        mock.reset_call_count();
        let second = run(&engine, RunRequest::new(recipe_captions(3))).await;

        assert_eq!(mock.call_count(), 0);
        assert_eq!(second.record.cache_hits, 3);
        assert_eq!(second.record.total_cost_estimate, 0.0);
        assert!(second.outcomes.iter().all(|o| o.status == CaptionStatus::Cached));
        assert_eq!(first.recipes, second.recipes);
        assert_eq!(store.len().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_cache_ignores_case_and_spacing() {
        let mock = mock();
        let store = store();
        let engine = engine(&mock, &store, fast_config());

        run(&engine, RunRequest::new(vec![CaptionUnit::new("a", "Torta di mele, bake 40 min")])).await;
        mock.reset_call_count();
        let report = run(
            &engine,
            RunRequest::new(vec![CaptionUnit::new("b", "  TORTA di  méle,\nbake 40 min ")]),
        )
        .await;

        assert_eq!(mock.call_count(), 0);
        assert_eq!(report.outcomes[0].status, CaptionStatus::Cached);
        assert_eq!(report.recipes[0].caption_id.as_str(), "b");
    }

    #[tokio::test]
    async fn test_cache_can_be_bypassed() {
        let mock = mock();
        let store = store();
        let engine = engine(&mock, &store, fast_config());

        run(&engine, RunRequest::new(recipe_captions(2))).await;
        mock.reset_call_count();
        let report = run(&engine, RunRequest::new(recipe_captions(2)).without_cache()).await;

        assert_eq!(mock.call_count(), 4);
        assert_eq!(report.record.cache_hits, 0);
    }

    #[tokio::test]
    async fn test_rejected_captions_are_not_cached() {
        let mock = mock();
        let store = store();
        run(&engine(&mock, &store, fast_config()), RunRequest::new(example_captions())).await;

        assert!(store.get(&normalize_caption("Happy birthday!")).unwrap().is_none());
        assert_eq!(store.len().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_low_confidence_is_rejected() {
        let mock = MockProvider::new(r#"{"is_recipe": true, "confidence": 0.2}"#);
        let store = store();
        let report = run(&engine(&mock, &store, fast_config()), RunRequest::new(recipe_captions(2))).await;

        assert_eq!(report.record.rejected_count, 2);
        assert!(report.recipes.is_empty());
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_malformed_extraction_is_per_caption() {
        let mock = MockProvider::new(YES);
        mock.add_response(EXTRACTION_MARKER, "sorry, I cannot help");
        let store = store();
        let report = run(&engine(&mock, &store, fast_config()), RunRequest::new(recipe_captions(4))).await;

        assert_eq!(report.record.errored_count, 4);
        assert_eq!(report.record.success_rate, 0.0);
        for outcome in &report.outcomes {
            assert_eq!(outcome.status, CaptionStatus::Errored);
            assert_eq!(
                outcome.error.as_ref().unwrap().kind,
                ExtractionErrorKind::MalformedResponse
            );
            assert!(outcome.classification.as_ref().unwrap().is_recipe);
        }
        assert_eq!(report.errors().count(), 4);
        assert_eq!(report.record.details.extraction_errors.len(), 4);
        assert!(report.record.details.extraction_errors[0].starts_with("r0: "));
    }

    #[tokio::test]
    async fn test_blank_captions_make_no_calls() {
        let mock = mock();
        let store = store();
        let report = run(
            &engine(&mock, &store, fast_config()),
            RunRequest::new(vec![CaptionUnit::new("x", "   "), CaptionUnit::new("y", "")]),
        )
        .await;

        assert_eq!(mock.call_count(), 0);
        assert_eq!(report.record.rejected_count, 2);
    }

    #[tokio::test]
    async fn test_force_extraction_skips_classification() {
        let mock = mock();
        let store = store();
        let report = run(
            &engine(&mock, &store, fast_config()),
            RunRequest::new(recipe_captions(3)).force_extraction(),
        )
        .await;

        assert_eq!(mock.call_count(), 3);
        assert_eq!(report.recipes.len(), 3);
        assert!(report.outcomes.iter().all(|o| o.classification.is_none()));
        // no classification confidence to merge
        assert_eq!(report.recipes[0].record.confidence_score, 0.6);
    }

    #[tokio::test]
    async fn test_duplicate_ids_are_rejected() {
        let mock = mock();
        let store = store();
        let captions = vec![CaptionUnit::new("1", "a"), CaptionUnit::new("1", "b")];

        let result = engine(&mock, &store, fast_config())
            .run(RunRequest::new(captions), ProgressSink::disabled(), CancellationToken::new())
            .await;

        assert!(matches!(result, Err(ExtractorError::InvalidInput(_))));
        assert_eq!(mock.call_count(), 0);
        assert!(store.latest(10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_forced_batch_without_service_fails_before_calls() {
        let mock = mock();
        let store = store();

        let result = engine(&mock, &store, fast_config())
            .run(
                RunRequest::new(example_captions()).with_mode(ProcessingMode::Batch),
                ProgressSink::disabled(),
                CancellationToken::new(),
            )
            .await;

        assert!(matches!(result, Err(ExtractorError::Config(_))));
        assert_eq!(mock.call_count(), 0);
        assert!(store.latest(10).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = EngineConfig::default();
        config.concurrency = 0;
        let result = Engine::new(Arc::new(mock()), store(), config);
        assert!(matches!(result, Err(ExtractorError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_output_order_matches_input() {
        let mock = mock();
        // Later captions finish first in both stages
        for i in 0..15u64 {
            mock.add_latency(format!("number {}:", i), Duration::from_millis(150 - i * 10));
        }
        let store = store();
        let captions = recipe_captions(15);

        let report = run(&engine(&mock, &store, fast_config()), RunRequest::new(captions.clone())).await;

        let expected: Vec<_> = captions.iter().map(|c| c.id.clone()).collect();
        let outcome_ids: Vec<_> = report.outcomes.iter().map(|o| o.caption_id.clone()).collect();
        let recipe_ids: Vec<_> = report.recipes.iter().map(|r| r.caption_id.clone()).collect();
        assert_eq!(outcome_ids, expected);
        assert_eq!(recipe_ids, expected);
    }

    #[tokio::test]
    async fn test_in_flight_bound_holds_for_whole_run() {
        let mock = mock().with_latency(Duration::from_millis(10));
        let store = store();
        let mut config = fast_config();
        config.concurrency = 2;

        run(&engine(&mock, &store, config), RunRequest::new(recipe_captions(8))).await;

        assert!(mock.max_in_flight() <= 2);
    }

    #[tokio::test]
    async fn test_auto_mode_uses_batch_at_threshold() {
        let mock = mock();
        let store = store();
        let engine = batch_engine(&mock, &store);

        let report = run(&engine, RunRequest::new(recipe_captions(20))).await;

        assert_eq!(report.plan.recommended_mode, ExecutionMode::Batch);
        assert_eq!(report.record.mode_used, ExecutionMode::Batch);
        assert_eq!(report.record.accepted_count, 20);
        assert_eq!(mock.call_count(), 0);
        // one job per stage
        assert_eq!(mock.batch_submissions(), 2);
        // 40 requests at half price
        assert!((report.record.total_cost_estimate - 40.0 * 0.00036 * 0.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_auto_mode_below_threshold_stays_concurrent() {
        let mock = mock();
        let store = store();
        let report = run(&batch_engine(&mock, &store), RunRequest::new(recipe_captions(19))).await;

        assert_eq!(report.record.mode_used, ExecutionMode::Concurrent);
        assert_eq!(mock.batch_submissions(), 0);
    }

    #[tokio::test]
    async fn test_batch_failure_falls_back_for_the_rest() {
        let mock = mock();
        mock.set_batch_outcome(MockBatchOutcome::Fail { resolved: 10 });
        let store = store();
        let captions = recipe_captions(25);

        let report = run(
            &batch_engine(&mock, &store),
            RunRequest::new(captions.clone()).with_mode(ProcessingMode::Batch),
        )
        .await;

        // 15 fallback calls in each of the two stages
        assert_eq!(mock.call_count(), 30);
        assert_eq!(report.record.fallback_count, 30);
        assert_eq!(report.record.accepted_count, 25);
        assert_eq!(report.record.mode_used, ExecutionMode::Batch);
        let ids: Vec<_> = report.recipes.iter().map(|r| r.caption_id.clone()).collect();
        let expected: Vec<_> = captions.iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids, expected);

        let expected_cost = 20.0 * 0.00036 * 0.5 + 30.0 * 0.00036;
        assert!((report.record.total_cost_estimate - expected_cost).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_batch_rejection_in_example() {
        let mock = mock();
        let store = store();
        let report = run(
            &batch_engine(&mock, &store),
            RunRequest::new(example_captions()).with_mode(ProcessingMode::Batch),
        )
        .await;

        assert_eq!(report.record.accepted_count, 2);
        assert_eq!(report.record.rejected_count, 1);
        assert_eq!(report.outcomes[1].status, CaptionStatus::Rejected);
    }

    #[tokio::test]
    async fn test_cancelled_run_is_recorded() {
        let mock = mock();
        let store = store();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = engine(&mock, &store, fast_config())
            .run(RunRequest::new(recipe_captions(3)), ProgressSink::disabled(), cancel)
            .await
            .unwrap();

        assert_eq!(mock.call_count(), 0);
        assert!(report.record.cancelled);
        assert_eq!(report.record.errored_count, 3);
        assert_eq!(report.record.total_cost_estimate, 0.0);
        assert!(report
            .errors()
            .all(|(_, e)| e.kind == ExtractionErrorKind::Cancelled));
        assert_eq!(store.latest(1).unwrap().len(), 1);
    }

    /// Cancels the run the first time polling waits
    struct CancelOnSleep {
        token: CancellationToken,
    }

    #[async_trait]
    impl Sleeper for CancelOnSleep {
        async fn sleep(&self, _duration: Duration) {
            self.token.cancel();
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_interrupted_batch_resumes_on_next_run() {
        let mock = mock();
        mock.set_batch_outcome(MockBatchOutcome::Hang);
        let store = store();
        let captions = recipe_captions(4);

        let cancel = CancellationToken::new();
        let interrupted = engine(&mock, &store, fast_config())
            .with_batch_service(Arc::new(mock.clone()))
            .with_sleeper(Arc::new(CancelOnSleep { token: cancel.clone() }))
            .run(
                RunRequest::new(captions.clone()).with_mode(ProcessingMode::Batch),
                ProgressSink::disabled(),
                cancel,
            )
            .await
            .unwrap();

        assert!(interrupted.record.cancelled);
        assert_eq!(mock.batch_submissions(), 1);
        assert_eq!(mock.call_count(), 0);

        mock.set_batch_outcome(MockBatchOutcome::Complete);
        let resumed = run(
            &batch_engine(&mock, &store),
            RunRequest::new(captions).with_mode(ProcessingMode::Batch),
        )
        .await;

        // classification resumed the journaled job; only extraction was submitted
        assert_eq!(mock.batch_submissions(), 2);
        assert_eq!(resumed.record.accepted_count, 4);
        assert!(!resumed.record.cancelled);
    }

    #[tokio::test]
    async fn test_progress_reaches_the_channel() {
        let mock = mock();
        let store = store();
        let (sink, mut rx) = ProgressSink::channel();

        engine(&mock, &store, fast_config())
            .run(RunRequest::new(example_captions()), sink, CancellationToken::new())
            .await
            .unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push((event.description, event.completed, event.total));
        }
        assert_eq!(events.len(), 5);
        assert_eq!(events[2], ("classification".to_string(), 3, 3));
        assert_eq!(events[4], ("extraction".to_string(), 2, 2));
    }

    #[tokio::test]
    async fn test_history_and_comparison() {
        let mock = mock();
        let store = store();
        let engine = engine(&mock, &store, fast_config());

        let first = run(&engine, RunRequest::new(example_captions())).await;
        let second = run(&engine, RunRequest::new(recipe_captions(4)).without_cache()).await;

        let latest = store.latest(2).unwrap();
        assert_eq!(latest[0].run_id, second.record.run_id);
        assert_eq!(latest[1].run_id, first.record.run_id);

        let comparison = store.compare(first.record.run_id, second.record.run_id).unwrap();
        assert_eq!(comparison.count_change, 2);
        assert!(!comparison.prompt_changed);
    }

    #[tokio::test]
    async fn test_run_record_counts_tags_and_confidence() {
        let mock = mock();
        let store = store();
        let report = run(&engine(&mock, &store, fast_config()), RunRequest::new(example_captions())).await;

        let details = &report.record.details;
        assert_eq!(details.tag_counts.get("proteins:chicken"), Some(&2));
        assert_eq!(details.tag_counts.get("vegetables:tomato"), Some(&2));
        assert!(!details.tag_counts.contains_key("proteins:pollo"));
        assert_eq!(details.confidence_distribution.high, 2);
        assert_eq!(details.confidence_distribution.medium, 0);
        assert!(details.extraction_errors.is_empty());

        let stored = store.get_run(report.record.run_id).unwrap().unwrap();
        assert_eq!(&stored.details, details);
    }

    #[tokio::test]
    async fn test_latency_seed_comes_from_history() {
        let mock = mock();
        let store = store();
        let report = run(&engine(&mock, &store, fast_config()), RunRequest::new(recipe_captions(2))).await;

        let reopened = engine(&mock, &store, fast_config());
        let seeded = reopened.latency_estimate().as_secs_f64() * 1000.0;
        assert!((seeded - report.record.avg_call_latency_ms).abs() < 1.0);
    }

    #[tokio::test]
    async fn test_plan_counts_cache_hits() {
        let mock = mock();
        let store = store();
        let engine = batch_engine(&mock, &store);
        run(&engine, RunRequest::new(recipe_captions(5))).await;
        mock.reset_call_count();

        let plan = engine.plan(&RunRequest::new(recipe_captions(25))).unwrap();

        assert_eq!(plan.cached, 5);
        assert_eq!(plan.uncached, 20);
        assert_eq!(plan.recommended_mode, ExecutionMode::Batch);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_prompt_overrides_change_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(crate::IS_RECIPE_FILE), "Is this a recipe? JSON only.").unwrap();
        let mut config = fast_config();
        config.prompts_dir = Some(dir.path().to_path_buf());

        let mock = mock();
        let store = store();
        let default_run = run(&engine(&mock, &store, fast_config()), RunRequest::new(recipe_captions(1))).await;
        let custom_run = run(
            &engine(&mock, &store, config),
            RunRequest::new(recipe_captions(1)).without_cache(),
        )
        .await;

        assert_ne!(
            default_run.record.prompt_fingerprint,
            custom_run.record.prompt_fingerprint
        );
        let comparison = store
            .compare(default_run.record.run_id, custom_run.record.run_id)
            .unwrap();
        assert!(comparison.prompt_changed);
    }
}
