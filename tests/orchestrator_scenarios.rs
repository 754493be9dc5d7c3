//! 编排器端到端场景（模拟模式 + Mock 后端）

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use aegis::config::AppConfig;
    use aegis::core::{ToolArguments, ToolRequest};
    use aegis::knowledge::{StaticKnowledgeRepository, BASELINE_EXCERPTS};
    use aegis::llm::{LlmError, MockModel, RawReply, ReplyFragment, DEVIATION_ACK, PROTOCOL_ACK};
    use aegis::storage::{InMemoryDeviationLog, SqliteDeviationLog};
    use aegis::tools::{LOG_DEVIATION, SEARCH_KNOWLEDGE_VAULT};
    use aegis::{AuditComponents, Orchestrator};

    fn simulated(log: Arc<InMemoryDeviationLog>) -> Orchestrator {
        AuditComponents::builder(&AppConfig::default())
            .deviation_log(log)
            .knowledge(Arc::new(StaticKnowledgeRepository::baseline()))
            .build()
            .new_orchestrator("scenario")
    }

    /// 去掉记录 ID 与时间两行
    fn without_receipt(text: &str) -> String {
        text.lines()
            .filter(|l| !l.starts_with("**Record ID:**") && !l.starts_with("**Logged at:**"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[tokio::test]
    async fn scenario_a_unsafe_technique_logs_deviation() {
        let log = Arc::new(InMemoryDeviationLog::new());
        let mut orch = simulated(log.clone());

        let outcome = orch
            .handle_turn("The surgeon is using an unsafe scalpel technique.")
            .await;

        let request = outcome.tool_request.expect("tool request");
        assert_eq!(request.name, LOG_DEVIATION);
        assert_eq!(request.arg("severity"), Some("High"));
        assert!(outcome.message.starts_with(DEVIATION_ACK));
        assert!(outcome.message.contains("🚨 **SAFETY DEVIATION LOGGED**"));

        let records = log.records();
        assert_eq!(records.len(), 1);
        assert!(outcome
            .message
            .contains(&format!("**Record ID:** #{}", records[0].id)));
    }

    #[tokio::test]
    async fn scenario_b_protocol_question_lists_excerpts() {
        let mut orch = simulated(Arc::new(InMemoryDeviationLog::new()));
        let input = "What is the protocol for sterilization?";

        let outcome = orch.handle_turn(input).await;

        let request = outcome.tool_request.expect("tool request");
        assert_eq!(request.name, SEARCH_KNOWLEDGE_VAULT);
        assert_eq!(request.arg("query"), Some(input));
        assert!(outcome.message.starts_with(PROTOCOL_ACK));
        for excerpt in BASELINE_EXCERPTS {
            assert!(outcome.message.contains(&format!("  • {}", excerpt)));
        }
    }

    #[tokio::test]
    async fn scenario_d_routine_check_is_acknowledged() {
        let mut orch = simulated(Arc::new(InMemoryDeviationLog::new()));
        let outcome = orch.handle_turn("Routine check, all clear.").await;

        assert!(outcome.tool_request.is_none());
        assert_eq!(
            outcome.message,
            "✅ Acknowledged. Monitoring stream: Routine check, all clear...."
        );
    }

    #[tokio::test]
    async fn scenario_d_long_input_is_truncated_to_configured_prefix() {
        let mut cfg = AppConfig::default();
        cfg.simulation.ack_prefix_chars = 10;
        let mut orch = AuditComponents::builder(&cfg).build().new_orchestrator("s");

        let outcome = orch.handle_turn("Instrument count complete, closing now").await;
        assert_eq!(outcome.message, "✅ Acknowledged. Monitoring stream: Instrument...");
    }

    #[tokio::test]
    async fn scenario_e_backend_failure_then_recovery() {
        let model = MockModel::scripted(vec![Err(LlmError::Quota(
            "resource exhausted".into(),
        ))]);
        let components = AuditComponents::builder(&AppConfig::default())
            .model(Some(Arc::new(model)))
            .build();
        let mut orch = components.new_orchestrator("live");

        let failed = orch.process("Check the sterile field").await;
        assert_eq!(
            failed.content,
            "Error communicating with AI: quota exceeded: resource exhausted"
        );
        assert!(failed.tool_request.is_none());

        let next = orch.handle_turn("Check again").await;
        assert_eq!(next.message, "Echo from Mock: Check again");
        assert!(next.continuity_token.is_some());
    }

    #[tokio::test]
    async fn live_function_call_is_executed_and_composed() {
        let reply = RawReply::new(
            vec![
                ReplyFragment::Text("Glove breach observed.".into()),
                ReplyFragment::FunctionCall {
                    name: LOG_DEVIATION.into(),
                    arguments: serde_json::json!({
                        "severity": "critical",
                        "description": "Torn glove during incision",
                        "recommended_action": "Regown and reglove"
                    })
                    .as_object()
                    .cloned()
                    .unwrap(),
                },
            ],
            r#"{"candidates":[]}"#,
        );
        let log = Arc::new(InMemoryDeviationLog::new());
        let components = AuditComponents::builder(&AppConfig::default())
            .model(Some(Arc::new(MockModel::scripted(vec![Ok(reply)]))))
            .deviation_log(log.clone())
            .build();
        let mut orch = components.new_orchestrator("live");

        let outcome = orch.handle_turn("Watch the left hand").await;
        assert!(outcome
            .message
            .starts_with("Glove breach observed.\n\n\n🔴 **SAFETY DEVIATION LOGGED**"));
        assert_eq!(log.records()[0].severity, "CRITICAL");
        assert!(outcome.continuity_token.unwrap().starts_with("gemini_"));
    }

    #[tokio::test]
    async fn token_is_present_after_every_simulated_turn() {
        let mut orch = simulated(Arc::new(InMemoryDeviationLog::new()));
        let mut seen = Vec::new();
        for input in ["unsafe", "protocol", "all clear", "all clear"] {
            let resp = orch.process(input).await;
            let token = resp.continuity_token.expect("token");
            assert!(token.starts_with("sim_"));
            assert_eq!(orch.continuity_token(), Some(token.as_str()));
            seen.push(token);
        }
        assert_eq!(seen[2], seen[3]);
        assert_ne!(seen[0], seen[1]);
    }

    #[tokio::test]
    async fn repeated_execution_differs_only_in_receipt() {
        let mut orch = simulated(Arc::new(InMemoryDeviationLog::new()));
        let mut args = ToolArguments::new();
        args.insert("severity".into(), "medium".into());
        args.insert("description".into(), "Door propped open".into());
        args.insert("recommended_action".into(), "Close the door".into());
        let request = ToolRequest::new(LOG_DEVIATION, args);

        let first = orch.execute(&request).await;
        let second = orch.execute(&request).await;

        assert_ne!(first, second);
        assert_eq!(without_receipt(&first), without_receipt(&second));
        assert!(first.contains("**Record ID:** #dev_1"));
        assert!(second.contains("**Record ID:** #dev_2"));
    }

    #[tokio::test]
    async fn sqlite_log_keeps_session_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(SqliteDeviationLog::open(dir.path().join("deviations.db")).unwrap());
        let components = AuditComponents::builder(&AppConfig::default())
            .deviation_log(log.clone())
            .build();
        let mut orch = components.new_orchestrator("session-sqlite");

        let outcome = orch.handle_turn("Safety violation at bed 4").await;

        assert_eq!(log.count().await.unwrap(), 1);
        let recent = log.recent(10).await.unwrap();
        assert_eq!(recent[0].severity, "HIGH");
        assert_eq!(recent[0].session_id.as_deref(), Some("session-sqlite"));
        assert_eq!(recent[0].tool_signature, outcome.continuity_token);
        assert!(outcome
            .message
            .contains(&format!("**Record ID:** #{}", recent[0].id)));
    }
}
