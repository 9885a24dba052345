//! Multipart Upload Integration Tests
//!
//! Runs the multipart orchestrator against a wiremock server playing both the
//! SimHub API and the presigned storage endpoint.

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use rand::Rng;
    use serde_json::Value;
    use simhub_client::{ClientConfig, FinalizePhase, ProgressFn, SimHubClient, SimHubError, UploadMeta};
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path, path_regex};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    const MIB: u64 = 1024 * 1024;
    const INIT: &str = "/api/v1/integration/upload/multipart/init";
    const PART_URL: &str = "/api/v1/integration/upload/multipart/part-url";
    const COMPLETE: &str = "/api/v1/integration/upload/multipart/complete";
    const CONFIRM: &str = "/api/v1/integration/upload/confirm";

    /// Hands out one storage URL per part; `fail_part` gets a 500
    struct PartUrlResponder {
        storage: String,
        fail_part: Option<u64>,
    }

    impl Respond for PartUrlResponder {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let body: Value = request.body_json().unwrap();
            let n = body["part_number"].as_u64().unwrap();
            if Some(n) == self.fail_part {
                return ResponseTemplate::new(500).set_body_string("presign failed");
            }
            ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "presigned_url": format!("{}/storage/part-{}?X-Amz-Signature=sig", self.storage, n)
            }))
        }
    }

    /// Answers part PUTs with a quoted ETag; earlier parts answer later
    struct StorageResponder {
        part_count: u64,
    }

    impl Respond for StorageResponder {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let n = part_from_path(request.url.path());
            let delay = (self.part_count.saturating_sub(n)) * 30;
            ResponseTemplate::new(200)
                .insert_header("ETag", format!("\"etag-{}\"", n).as_str())
                .set_delay(Duration::from_millis(delay))
        }
    }

    fn part_from_path(path: &str) -> u64 {
        path.rsplit('-').next().unwrap().parse().unwrap()
    }

    async fn mount_session(server: &MockServer, part_count: u64, fail_part: Option<u64>) {
        Mock::given(method("POST"))
            .and(path(INIT))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "upload_id": "upload-1",
                "object_key": "resources/map/town.bin",
                "ticket_id": "ticket-1"
            })))
            .expect(1)
            .mount(server)
            .await;

        Mock::given(method("POST"))
            .and(path(PART_URL))
            .respond_with(PartUrlResponder {
                storage: server.uri(),
                fail_part,
            })
            .mount(server)
            .await;

        Mock::given(method("PUT"))
            .and(path_regex(r"^/storage/part-\d+$"))
            .respond_with(StorageResponder { part_count })
            .mount(server)
            .await;
    }

    async fn mount_finalize(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path(COMPLETE))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"ticket_id": "ticket-1"})),
            )
            .expect(expected_calls)
            .mount(server)
            .await;

        Mock::given(method("POST"))
            .and(path(CONFIRM))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "resource_id": "res-1",
                "version_id": "ver-1",
                "version_num": 1,
                "semver": "1.0.0"
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    fn client(server: &MockServer, concurrency: usize) -> SimHubClient {
        let config = ClientConfig::new(server.uri(), Some("test-token".to_string()));
        SimHubClient::new(config).unwrap().with_concurrency(concurrency)
    }

    fn meta() -> UploadMeta {
        UploadMeta::new("map", "town.bin", "Town", "1.0.0").with_tags(["city"])
    }

    fn random_payload(len: u64) -> Vec<u8> {
        let mut data = vec![0u8; len as usize];
        rand::rng().fill(&mut data[..]);
        data
    }

    type Calls = Arc<Mutex<Vec<(u64, u64, bool)>>>;

    fn recording_progress() -> (Calls, ProgressFn) {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        let callback: ProgressFn = Arc::new(move |done, total, finished| {
            sink.lock().push((done, total, finished));
        });
        (calls, callback)
    }

    async fn requests_to(server: &MockServer, target: &str) -> Vec<Request> {
        server
            .received_requests()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.url.path() == target)
            .collect()
    }

    #[tokio::test]
    async fn test_upload_20mib_in_four_parts() {
        let server = MockServer::start().await;
        mount_session(&server, 4, None).await;
        mount_finalize(&server, 1).await;

        let data = random_payload(20 * MIB);
        let (calls, progress) = recording_progress();

        let confirmed = client(&server, 4)
            .upload_multipart(&meta(), &data[..], 20 * MIB, 5 * MIB, Some(progress))
            .await
            .unwrap();

        assert_eq!(confirmed.ticket_id, "ticket-1");
        assert_eq!(confirmed.parts, 4);
        assert_eq!(confirmed.size, 20 * MIB);
        assert_eq!(confirmed.object_key.as_deref(), Some("resources/map/town.bin"));
        assert_eq!(confirmed.response.version_num, Some(1));

        // Init announced the part count
        let init = requests_to(&server, INIT).await;
        let init_body: Value = init[0].body_json().unwrap();
        assert_eq!(init_body["part_count"], 4);
        assert_eq!(init_body["resource_type"], "map");

        // Manifest is sorted even though later parts finished first
        let complete = requests_to(&server, COMPLETE).await;
        let complete_body: Value = complete[0].body_json().unwrap();
        assert_eq!(complete_body["upload_id"], "upload-1");
        assert_eq!(complete_body["object_key"], "resources/map/town.bin");
        assert_eq!(complete_body["ticket_id"], "ticket-1");
        let parts = complete_body["parts"].as_array().unwrap();
        let numbers: Vec<u64> = parts.iter().map(|p| p["part_number"].as_u64().unwrap()).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        for part in parts {
            let n = part["part_number"].as_u64().unwrap();
            assert_eq!(part["etag"], format!("etag-{}", n));
        }

        // Every presign names the session's ticket
        let part_urls = requests_to(&server, PART_URL).await;
        assert_eq!(part_urls.len(), 4);
        for request in &part_urls {
            let body: Value = request.body_json().unwrap();
            assert_eq!(body["ticket_id"], "ticket-1");
            assert_eq!(body["upload_id"], "upload-1");
        }

        // Storage received exactly the source bytes
        let mut puts: Vec<(u64, Vec<u8>)> = server
            .received_requests()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.method.as_str() == "PUT")
            .map(|r| (part_from_path(r.url.path()), r.body))
            .collect();
        puts.sort_by_key(|(n, _)| *n);
        assert!(puts.iter().all(|(_, body)| body.len() as u64 == 5 * MIB));
        let reassembled: Vec<u8> = puts.into_iter().flat_map(|(_, body)| body).collect();
        assert_eq!(reassembled, data);

        // Confirm carries the ticket and display metadata
        let confirm = requests_to(&server, CONFIRM).await;
        let confirm_body: Value = confirm[0].body_json().unwrap();
        assert_eq!(confirm_body["ticket_id"], "ticket-1");
        assert_eq!(confirm_body["name"], "Town");
        assert_eq!(confirm_body["tags"], serde_json::json!(["city"]));

        // Progress is monotonic and finishes exactly once at the total
        let calls = calls.lock();
        assert_eq!(calls.len(), 4);
        assert!(calls.windows(2).all(|w| w[0].0 < w[1].0));
        assert_eq!(calls.iter().filter(|c| c.2).count(), 1);
        assert_eq!(*calls.last().unwrap(), (20 * MIB, 20 * MIB, true));
    }

    #[tokio::test]
    async fn test_presigned_put_has_no_bearer_token() {
        let server = MockServer::start().await;
        mount_session(&server, 2, None).await;
        mount_finalize(&server, 1).await;

        let data = random_payload(2 * MIB);
        client(&server, 2)
            .upload_multipart(&meta(), &data[..], 2 * MIB, MIB, None)
            .await
            .unwrap();

        for request in server.received_requests().await.unwrap() {
            let auth = request.headers.get("authorization");
            if request.method.as_str() == "PUT" {
                assert!(auth.is_none(), "presigned PUT carried a token");
            } else {
                assert_eq!(auth.unwrap().to_str().unwrap(), "Bearer test-token");
                assert!(request.headers.get("x-request-id").is_some());
            }
        }
    }

    #[tokio::test]
    async fn test_truncated_source_never_finalizes() {
        let server = MockServer::start().await;
        mount_session(&server, 4, None).await;
        mount_finalize(&server, 0).await;

        let data = random_payload(12 * MIB);
        let err = client(&server, 4)
            .upload_multipart(&meta(), &data[..], 20 * MIB, 5 * MIB, None)
            .await
            .unwrap_err();

        match err {
            SimHubError::TruncatedStream { expected, read } => {
                assert_eq!(expected, 20 * MIB);
                assert_eq!(read, 12 * MIB);
            }
            other => panic!("expected truncation, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_part_larger_than_payload_uploads_single_part() {
        let server = MockServer::start().await;
        mount_session(&server, 1, None).await;
        mount_finalize(&server, 1).await;

        let data = random_payload(1000);
        let (calls, progress) = recording_progress();
        let confirmed = client(&server, 4)
            .upload_multipart(&meta(), &data[..], 1000, 5 * MIB, Some(progress))
            .await
            .unwrap();

        assert_eq!(confirmed.parts, 1);
        let init: Value = requests_to(&server, INIT).await[0].body_json().unwrap();
        assert_eq!(init["part_count"], 1);
        let puts = requests_to(&server, "/storage/part-1").await;
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].body, data);
        assert_eq!(*calls.lock(), vec![(1000, 1000, true)]);
    }

    #[tokio::test]
    async fn test_part_url_failure_stops_upload() {
        let server = MockServer::start().await;
        mount_session(&server, 4, Some(3)).await;
        mount_finalize(&server, 0).await;

        let data = random_payload(4 * MIB);
        let err = client(&server, 4)
            .upload_multipart(&meta(), &data[..], 4 * MIB, MIB, None)
            .await
            .unwrap_err();

        assert_eq!(err.part_number(), Some(3));
        assert_eq!(err.status(), Some(500));
        assert!(!err.is_finalize());
    }

    #[tokio::test]
    async fn test_init_rejection_is_session_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(INIT))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(PART_URL))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = client(&server, 2)
            .upload_multipart(&meta(), &b"payload"[..], 7, 4, None)
            .await
            .unwrap_err();

        assert!(matches!(err, SimHubError::SessionInit(_)));
        assert_eq!(err.status(), Some(403));
    }

    #[tokio::test]
    async fn test_confirm_rejection_is_finalize_confirm() {
        let server = MockServer::start().await;
        mount_session(&server, 2, None).await;
        Mock::given(method("POST"))
            .and(path(COMPLETE))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(CONFIRM))
            .and(body_partial_json(serde_json::json!({"ticket_id": "ticket-1"})))
            .respond_with(ResponseTemplate::new(409).set_body_string("semver exists"))
            .expect(1)
            .mount(&server)
            .await;

        let data = random_payload(2 * MIB);
        let err = client(&server, 2)
            .upload_multipart(&meta(), &data[..], 2 * MIB, MIB, None)
            .await
            .unwrap_err();

        match &err {
            SimHubError::Finalize { phase, .. } => assert_eq!(*phase, FinalizePhase::Confirm),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.status(), Some(409));
    }

    #[tokio::test]
    async fn test_missing_etag_fails_part() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(INIT))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "upload_id": "upload-1",
                "key": "resources/map/town.bin"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(PART_URL))
            .respond_with(PartUrlResponder {
                storage: server.uri(),
                fail_part: None,
            })
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        mount_finalize(&server, 0).await;

        let err = client(&server, 1)
            .upload_multipart(&meta(), &b"0123456789"[..], 10, 10, None)
            .await
            .unwrap_err();

        match err {
            SimHubError::PartUpload { part_number, source } => {
                assert_eq!(part_number, 1);
                assert!(matches!(*source, SimHubError::InvalidResponse(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
