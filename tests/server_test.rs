//! Integration tests for the analytics collector server

#[cfg(feature = "server")]
mod server_tests {
    use page_engagement_agent::gateway::{CollectorAck, GatewayClient, GatewayConfig, GatewayError};
    use page_engagement_agent::server::{run, ServerConfig, StoredBatch};
    use page_engagement_agent::sink::CollectorPayload;
    use page_engagement_agent::tracker::{RevenueMetrics, UserProfile};
    use std::time::Duration;

    fn payload(events: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "sessionId": "sess_1700000000000_abcdefghi",
            "userId": "user_1700000000000_jklmnopqr",
            "events": events,
            "revenue": {
                "totalPotential": 80.0,
                "affiliateClicks": 1,
                "premiumInterest": 0,
                "subscriptions": 0,
                "conversionScore": 15
            },
            "userProfile": {
                "engagementLevel": "hot",
                "interests": ["watches"],
                "priceRange": {"min": 80.0, "max": 80.0},
                "sessionDuration": 4200,
                "pageViews": 1,
                "scrollDepth": 0
            }
        })
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::new(0, dir.path().join("analytics.jsonl"));

        let (addr, shutdown_tx) = run(config).await.expect("Failed to start server");
        tokio::time::sleep(Duration::from_millis(100)).await;

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["status"], "ok");
        assert!(body["version"].as_str().is_some());

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_analytics_batches_are_appended() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out").join("analytics.jsonl");
        let config = ServerConfig::new(0, output.clone());

        let (addr, shutdown_tx) = run(config).await.expect("Failed to start server");
        tokio::time::sleep(Duration::from_millis(100)).await;

        let event = serde_json::json!({
            "event": "affiliate_click",
            "timestamp": 1700000004200i64,
            "sessionId": "sess_1700000000000_abcdefghi",
            "userId": "user_1700000000000_jklmnopqr",
            "data": {"estimatedValue": 80.0, "category": "watches"}
        });

        let client = reqwest::Client::new();
        for events in [serde_json::json!([event]), serde_json::json!([event, event])] {
            let response = client
                .post(format!("http://{}/v1/analytics", addr))
                .json(&payload(events))
                .send()
                .await
                .expect("Failed to send request");
            assert!(response.status().is_success());
        }

        let _ = shutdown_tx.send(());

        let contents = std::fs::read_to_string(&output).unwrap();
        let batches: Vec<StoredBatch> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1].payload.events.len(), 2);
        assert_eq!(batches[0].payload.events[0].event, "affiliate_click");
    }

    #[tokio::test]
    async fn test_malformed_batch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::new(0, dir.path().join("analytics.jsonl"));

        let (addr, shutdown_tx) = run(config).await.expect("Failed to start server");
        tokio::time::sleep(Duration::from_millis(100)).await;

        let response = reqwest::Client::new()
            .post(format!("http://{}/v1/analytics", addr))
            .json(&serde_json::json!({"events": "nope"}))
            .send()
            .await
            .expect("Failed to send request");
        assert!(response.status().is_client_error());

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_gateway_client_round_trip_with_token() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::new(0, dir.path().join("analytics.jsonl")).with_token("s3cret");

        let (addr, shutdown_tx) = run(config).await.expect("Failed to start server");
        tokio::time::sleep(Duration::from_millis(100)).await;

        let batch = CollectorPayload {
            session_id: "sess_1".to_string(),
            user_id: "user_1".to_string(),
            events: Vec::new(),
            revenue: RevenueMetrics::default(),
            user_profile: UserProfile::default(),
        };

        let base = format!("http://{}", addr);
        let client = GatewayClient::new(GatewayConfig::new(base.clone(), Some("s3cret".to_string())))
            .expect("Failed to create client");
        assert!(client.test_connection().await.unwrap());
        assert_eq!(
            client.send_batch(&batch).await.unwrap(),
            CollectorAck { accepted: 0 }
        );

        let anonymous = GatewayClient::new(GatewayConfig::new(base, None)).unwrap();
        assert!(matches!(
            anonymous.send_batch(&batch).await,
            Err(GatewayError::Server { status: 401, .. })
        ));

        let _ = shutdown_tx.send(());
    }
}
