#![allow(clippy::unwrap_used)]

#[cfg(test)]
mod integration_tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use widget_bridge::*;
    use widget_bridge_audit::{AuditEvent, EventSelector};
    use widget_bridge_core::{
        Category, CategoryPermission, ErrorCode, Operation, PermissionDeclaration, WidgetId,
        WidgetTimeouts,
    };

    /// Echoes the call back and counts invocations.
    #[derive(Default)]
    struct MockTransport {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BackendTransport for MockTransport {
        async fn execute(&self, ctx: CallContext, operation: Operation) -> Result<Value, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({
                "target": operation.target,
                "arguments": operation.arguments,
                "widget": ctx.widget_id.as_str(),
            }))
        }
    }

    struct FailingTransport(TransportError);

    #[async_trait]
    impl BackendTransport for FailingTransport {
        async fn execute(&self, _ctx: CallContext, _operation: Operation) -> Result<Value, TransportError> {
            Err(self.0.clone())
        }
    }

    struct SlowTransport(Duration);

    #[async_trait]
    impl BackendTransport for SlowTransport {
        async fn execute(&self, _ctx: CallContext, _operation: Operation) -> Result<Value, TransportError> {
            tokio::time::sleep(self.0).await;
            Ok(json!("late"))
        }
    }

    struct ListingTransport;

    #[async_trait]
    impl BackendTransport for ListingTransport {
        async fn execute(&self, _ctx: CallContext, _operation: Operation) -> Result<Value, TransportError> {
            Ok(json!({
                "tools": [
                    {"name": "github:create_issue"},
                    {"name": "gitlab:create_issue"},
                    {"name": "github:list_prs"}
                ]
            }))
        }
    }

    /// Counts prompts and never answers.
    #[derive(Default)]
    struct SilentPresenter {
        prompts: AtomicUsize,
    }

    impl ConfirmationPresenter for SilentPresenter {
        fn present(&self, _request: ConfirmationRequest, _responder: ConfirmationResponder) {
            self.prompts.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn widget() -> WidgetId {
        WidgetId::from("widget-1")
    }

    fn record(bridge: &Bridge, selector: EventSelector) -> Arc<Mutex<Vec<AuditEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        bridge.audit().on(selector, move |event| {
            sink.lock().push(event.clone());
            Ok(())
        });
        events
    }

    fn names(events: &Mutex<Vec<AuditEvent>>) -> Vec<String> {
        events.lock().iter().map(|e| e.name()).collect()
    }

    fn declaration(json: &str) -> PermissionDeclaration {
        PermissionDeclaration::from_json(json).unwrap()
    }

    const GITHUB_TOOLS: &str = r#"{
        "tool": {
            "scope": "allowlist",
            "patterns": ["github:*"],
            "requireConfirmation": ["github:create_issue"]
        },
        "resource": {"scope": "all"}
    }"#;

    #[tokio::test]
    async fn test_approved_tool_call() {
        let transport = Arc::new(MockTransport::default());
        let bridge = Bridge::builder()
            .presenter(Arc::new(AutoApprove))
            .transport(Category::Tool, transport.clone())
            .build();
        bridge.register_widget(widget(), &declaration(GITHUB_TOOLS)).unwrap();
        let events = record(&bridge, "tool:*".parse().unwrap());

        let done = bridge
            .call_tool(&widget(), "github:create_issue", json!({"title": "Bug"}))
            .await
            .unwrap();

        assert_eq!(done.result["target"], "github:create_issue");
        assert_eq!(done.result["arguments"], json!({"title": "Bug"}));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(names(&events), vec!["tool:invoke-requested", "tool:invoked"]);
        assert!(events.lock().iter().all(|e| e.request_id() == done.request_id));
    }

    #[tokio::test]
    async fn test_rejected_tool_call_never_reaches_transport() {
        let transport = Arc::new(MockTransport::default());
        let bridge = Bridge::builder()
            .presenter(Arc::new(AutoReject))
            .transport(Category::Tool, transport.clone())
            .build();
        bridge.register_widget(widget(), &declaration(GITHUB_TOOLS)).unwrap();
        let events = record(&bridge, "tool:*".parse().unwrap());

        let err = bridge
            .call_tool(&widget(), "github:create_issue", json!({}))
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::UserRejected);
        assert!(err.is_retryable());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert_eq!(names(&events), vec!["tool:invoke-requested", "tool:error"]);
        assert_eq!(
            events.lock()[1].error_info().map(|e| e.code),
            Some(ErrorCode::UserRejected)
        );
    }

    #[tokio::test]
    async fn test_unlisted_tool_skips_confirmation() {
        let presenter = Arc::new(SilentPresenter::default());
        let bridge = Bridge::builder()
            .presenter(presenter.clone())
            .transport(Category::Tool, Arc::new(MockTransport::default()))
            .build();
        bridge.register_widget(widget(), &declaration(GITHUB_TOOLS)).unwrap();

        bridge.call_tool(&widget(), "github:list_prs", json!({})).await.unwrap();
        assert_eq!(presenter.prompts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_resource_read_never_prompts() {
        let presenter = Arc::new(SilentPresenter::default());
        let bridge = Bridge::builder()
            .presenter(presenter.clone())
            .transport(Category::Resource, Arc::new(MockTransport::default()))
            .build();
        let decl = declaration(
            r#"{"resource": {"scope": "all", "requireConfirmation": true}, "tool": {"scope": "none"}}"#,
        );
        bridge.register_widget(widget(), &decl).unwrap();

        let done = bridge.read_resource(&widget(), "file:///README.md").await.unwrap();
        assert_eq!(done.result["target"], "file:///README.md");
        assert_eq!(presenter.prompts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_allowlist_denies_other_server() {
        let transport = Arc::new(MockTransport::default());
        let bridge = Bridge::builder()
            .transport(Category::Tool, transport.clone())
            .build();
        bridge.register_widget(widget(), &declaration(GITHUB_TOOLS)).unwrap();

        let err = bridge
            .call_tool(&widget(), "gitlab:create_issue", json!({}))
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::ScopeDenied);
        assert!(!err.is_retryable());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_denylist_names_the_pattern() {
        let bridge = Bridge::builder()
            .transport(Category::Prompt, Arc::new(MockTransport::default()))
            .build();
        let decl = declaration(r#"{"prompt": {"scope": "denylist", "patterns": ["internal_*"]}}"#);
        bridge.register_widget(widget(), &decl).unwrap();

        let err = bridge
            .get_prompt(&widget(), "internal_debug", json!({}))
            .await
            .unwrap_err();
        assert!(err.decision().unwrap().message().contains("internal_*"));

        bridge.get_prompt(&widget(), "summary", json!({})).await.unwrap();
    }

    #[tokio::test]
    async fn test_undeclared_category_is_denied() {
        let bridge = Bridge::builder()
            .transport(Category::Sampling, Arc::new(MockTransport::default()))
            .build();
        bridge.register_widget(widget(), &declaration(GITHUB_TOOLS)).unwrap();

        let op = Operation::new(
            Category::Sampling,
            widget_bridge_core::OperationKind::Call,
            "createMessage",
        );
        let err = bridge.invoke(&widget(), op).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ScopeDenied);
    }

    #[tokio::test]
    async fn test_unregistered_widget_is_denied() {
        let bridge = Bridge::builder()
            .transport(Category::Tool, Arc::new(MockTransport::default()))
            .build();
        let events = record(&bridge, EventSelector::All);

        let err = bridge
            .call_tool(&WidgetId::from("ghost"), "echo", json!({}))
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::ScopeDenied);
        assert_eq!(names(&events), vec!["tool:invoke-requested", "tool:error"]);
    }

    #[tokio::test]
    async fn test_constraint_violation() {
        let transport = Arc::new(MockTransport::default());
        let bridge = Bridge::builder()
            .transport(Category::Tool, transport.clone())
            .build();
        let decl = declaration(
            r#"{"tool": {"scope": "all", "constraints": {"maxArgumentBytes": 16}}}"#,
        );
        bridge.register_widget(widget(), &decl).unwrap();

        let err = bridge
            .call_tool(&widget(), "echo", json!({"message": "this payload is far too long"}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConstraintViolation);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);

        bridge.call_tool(&widget(), "echo", json!({"m": 1})).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_timeout() {
        let bridge = Bridge::builder()
            .transport(Category::Tool, Arc::new(SlowTransport(Duration::from_secs(60))))
            .build();
        bridge
            .register_widget(widget(), &declaration(r#"{"tool": {"scope": "all"}}"#))
            .unwrap();
        let events = record(&bridge, EventSelector::All);

        let err = bridge.call_tool(&widget(), "slow", json!({})).await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::Timeout);
        assert!(err.is_retryable());
        assert_eq!(names(&events), vec!["tool:invoke-requested", "tool:error"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_execution_time_overrides_default() {
        let bridge = Bridge::builder()
            .transport(Category::Tool, Arc::new(SlowTransport(Duration::from_secs(5))))
            .build();
        let decl = declaration(
            r#"{"tool": {"scope": "all", "constraints": {"maxExecutionTimeMs": 1000}}}"#,
        );
        bridge.register_widget(widget(), &decl).unwrap();

        let started = tokio::time::Instant::now();
        let err = bridge.call_tool(&widget(), "slow", json!({})).await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::Timeout);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_transport_errors_are_normalized() {
        let bridge = Bridge::builder()
            .transport(
                Category::Tool,
                Arc::new(FailingTransport(TransportError::ToolNotFound("nope".into()))),
            )
            .transport(
                Category::Resource,
                Arc::new(FailingTransport(TransportError::Network("reset".into()))),
            )
            .build();
        let decl = declaration(r#"{"tool": {"scope": "all"}, "resource": {"scope": "all"}}"#);
        bridge.register_widget(widget(), &decl).unwrap();

        let err = bridge.call_tool(&widget(), "nope", json!({})).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ToolNotFound);
        assert!(!err.is_retryable());

        let err = bridge.read_resource(&widget(), "file:///a").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NetworkError);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_missing_transport_reports_disconnected() {
        let bridge = Bridge::builder().build();
        bridge
            .register_widget(widget(), &declaration(r#"{"tool": {"scope": "all"}}"#))
            .unwrap();

        let err = bridge.call_tool(&widget(), "echo", json!({})).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ServerDisconnected);
    }

    #[tokio::test]
    async fn test_listing_is_filtered_by_patterns() {
        let bridge = Bridge::builder()
            .transport(Category::Tool, Arc::new(ListingTransport))
            .build();
        bridge.register_widget(widget(), &declaration(GITHUB_TOOLS)).unwrap();

        let done = bridge.list(&widget(), Category::Tool).await.unwrap();
        assert_eq!(
            done.result,
            json!({"tools": [{"name": "github:create_issue"}, {"name": "github:list_prs"}]})
        );
    }

    #[tokio::test]
    async fn test_grant_and_revoke_apply_to_next_call() {
        let bridge = Bridge::builder()
            .transport(Category::Storage, Arc::new(MockTransport::default()))
            .build();
        bridge.register_widget(widget(), &PermissionDeclaration::default()).unwrap();
        let op = || Operation::new(Category::Storage, widget_bridge_core::OperationKind::Read, "prefs");

        assert!(bridge.invoke(&widget(), op()).await.is_err());

        bridge.grant(&widget(), Category::Storage, CategoryPermission::all()).unwrap();
        assert!(bridge.invoke(&widget(), op()).await.is_ok());

        bridge.revoke(&widget(), Category::Storage).unwrap();
        let err = bridge.invoke(&widget(), op()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ScopeDenied);
    }

    #[tokio::test]
    async fn test_register_twice_and_unregister() {
        let bridge = Bridge::builder().build();
        let decl = declaration(r#"{"tool": {"scope": "all"}}"#);
        bridge.register_widget(widget(), &decl).unwrap();

        let err = bridge.register_widget(widget(), &decl).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered(_)));

        assert!(bridge.unregister_widget(&widget()));
        assert!(bridge.permissions(&widget()).is_none());
        assert!(bridge.widgets().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_declaration_is_rejected() {
        let bridge = Bridge::builder().build();
        let decl = declaration(r#"{"tool": {"scope": "allowlist", "patterns": [""]}}"#);

        let err = bridge.register_widget(widget(), &decl).unwrap_err();
        assert!(matches!(err, RegistryError::Declaration(_)));
        assert!(bridge.permissions(&widget()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_confirmation_times_out() {
        let transport = Arc::new(MockTransport::default());
        let bridge = Bridge::builder()
            .presenter(Arc::new(SilentPresenter::default()))
            .transport(Category::Tool, transport.clone())
            .build();
        let decl = declaration(r#"{"tool": {"scope": "all", "requireConfirmation": true}}"#);
        bridge.register_widget(widget(), &decl).unwrap();

        let err = bridge.call_tool(&widget(), "rm", json!({})).await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::UserTimeout);
        assert!(err.is_retryable());
        assert_eq!(err.error_info().retry_after_ms, Some(5000));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert!(bridge.confirmations().pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_confirmation_timeout() {
        let timeouts = WidgetTimeouts {
            confirmation_ms: 2_000,
            ..WidgetTimeouts::default()
        };
        let bridge = Bridge::builder()
            .timeouts(timeouts)
            .presenter(Arc::new(SilentPresenter::default()))
            .transport(Category::Tool, Arc::new(MockTransport::default()))
            .build();
        let decl = declaration(r#"{"tool": {"scope": "all", "requireConfirmation": true}}"#);
        bridge.register_widget(widget(), &decl).unwrap();

        let started = tokio::time::Instant::now();
        let err = bridge.call_tool(&widget(), "rm", json!({})).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::UserTimeout);
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(started.elapsed() < Duration::from_secs(30));
    }
}
