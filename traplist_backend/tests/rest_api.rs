use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};
use tokio::time::{sleep, Duration};
use traplist_backend::api;
use traplist_backend::bootstrap;
use traplist_backend::config::{ActionLimit, RateLimitConfig, TraplistConfig, TraplistPaths};
use traplist_backend::utils::system_clock;

struct TestServer {
    _dir: TempDir,
    server: tokio::task::JoinHandle<()>,
    base_url: String,
    client: reqwest::Client,
}

impl TestServer {
    async fn start(limits: RateLimitConfig) -> Self {
        let temp = tempdir().expect("tempdir");
        let port = next_port();
        let mut config = TraplistConfig::new(
            port,
            TraplistPaths::from_base_dir(temp.path()).expect("paths"),
        );
        config.limits = limits;

        let bootstrap = bootstrap::initialize(&config).expect("bootstrap");
        let database = bootstrap.database.clone();
        let server = tokio::spawn(async move {
            let _ = api::serve_http(config, database, system_clock()).await;
        });

        let base_url = format!("http://127.0.0.1:{port}");
        wait_for_health(&base_url).await;
        Self {
            _dir: temp,
            server,
            base_url,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(
        &self,
        method: reqwest::Method,
        path: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> (u16, Value) {
        let mut request = self.client.request(method, self.url(path));
        if let Some(user) = user {
            request = request.header("x-user-id", user);
            if user.starts_with("mod") {
                request = request.header("x-user-moderator", "true");
            }
            if user.starts_with("anon") {
                request = request.header("x-user-anonymous", "true");
            }
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.expect("response");
        let status = response.status().as_u16();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    async fn create_item(&self, id: &str, name: &str) {
        let (status, body) = self
            .send(
                reqwest::Method::POST,
                "/items",
                Some("mod-1"),
                Some(json!({
                    "id": id,
                    "name": name,
                    "creators": ["Jo"],
                    "item_type": "deadfall",
                    "categories": ["Small Game"],
                    "date": "2024-03-01"
                })),
            )
            .await;
        assert_eq!(status, 201, "{body}");
        assert_eq!(body["status"], "approved");
    }

    async fn shutdown(self) {
        self.server.abort();
        let _ = self.server.await;
    }
}

fn next_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .expect("bind ephemeral port")
        .local_addr()
        .unwrap()
        .port()
}

async fn wait_for_health(base_url: &str) {
    let client = reqwest::Client::new();
    for _ in 0..50 {
        if let Ok(resp) = client.get(format!("{base_url}/health")).send().await {
            if resp.status().is_success() {
                return;
            }
        }
        sleep(Duration::from_millis(100)).await;
    }
    panic!("server did not become healthy in time");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn comment_thread_and_votes_over_http() {
    let server = TestServer::start(RateLimitConfig::unlimited()).await;
    server.create_item("trap-1", "Figure Four").await;

    let (status, root) = server
        .send(
            reqwest::Method::POST,
            "/items/trap-1/comments",
            Some("alice"),
            Some(json!({ "body": "hello" })),
        )
        .await;
    assert_eq!(status, 201, "{root}");
    let root_id = root["id"].as_str().expect("root id").to_string();
    assert_eq!(root["thread_id"], root_id.as_str());

    let (status, reply) = server
        .send(
            reqwest::Method::POST,
            "/items/trap-1/comments",
            Some("bob"),
            Some(json!({ "body": "world", "parent_id": root_id })),
        )
        .await;
    assert_eq!(status, 201, "{reply}");
    let reply_id = reply["id"].as_str().expect("reply id").to_string();
    assert_eq!(reply["thread_id"], root_id.as_str());

    let (status, vote) = server
        .send(
            reqwest::Method::PUT,
            &format!("/items/trap-1/comments/{reply_id}/vote"),
            Some("alice"),
            Some(json!({ "value": 1 })),
        )
        .await;
    assert_eq!(status, 200, "{vote}");
    assert_eq!(vote["score"], 1);
    let (_, again) = server
        .send(
            reqwest::Method::PUT,
            &format!("/items/trap-1/comments/{reply_id}/vote"),
            Some("alice"),
            Some(json!({ "value": 1 })),
        )
        .await;
    assert_eq!(again["like_count"], 1);

    let (status, page) = server
        .send(
            reqwest::Method::GET,
            "/items/trap-1/comments?page_size=10",
            Some("alice"),
            None,
        )
        .await;
    assert_eq!(status, 200, "{page}");
    assert_eq!(page["ids"], json!([root_id, reply_id]));
    assert_eq!(page["by_id"][&reply_id]["depth"], 1);
    assert_eq!(page["by_id"][&reply_id]["parent_id"], root_id.as_str());
    assert_eq!(page["my_votes"][&reply_id], 1);
    assert_eq!(page["has_more"], false);

    let (_, item) = server
        .send(reqwest::Method::GET, "/items/trap-1", None, None)
        .await;
    assert_eq!(item["comment_count"], 2);

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn errors_carry_status_and_code() {
    let server = TestServer::start(RateLimitConfig::unlimited()).await;
    server.create_item("trap-1", "Figure Four").await;

    let body = Some(json!({ "body": "hi" }));
    let (status, err) = server
        .send(reqwest::Method::POST, "/items/trap-1/comments", None, body.clone())
        .await;
    assert_eq!((status, err["code"].as_str()), (401, Some("UNAUTHENTICATED")));

    let (status, err) = server
        .send(
            reqwest::Method::POST,
            "/items/trap-1/comments",
            Some("anon-1"),
            body.clone(),
        )
        .await;
    assert_eq!((status, err["code"].as_str()), (403, Some("PERMISSION_DENIED")));

    let (status, err) = server
        .send(
            reqwest::Method::POST,
            "/items/missing/comments",
            Some("alice"),
            body,
        )
        .await;
    assert_eq!((status, err["code"].as_str()), (404, Some("NOT_FOUND")));

    let (status, err) = server
        .send(
            reqwest::Method::PUT,
            "/items/trap-1/rating",
            Some("alice"),
            Some(json!({ "value": 9 })),
        )
        .await;
    assert_eq!((status, err["code"].as_str()), (400, Some("INVALID_ARGUMENT")));

    let (status, err) = server
        .send(
            reqwest::Method::GET,
            "/items/review",
            Some("alice"),
            None,
        )
        .await;
    assert_eq!((status, err["code"].as_str()), (403, Some("PERMISSION_DENIED")));

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_payloads_are_invalid_argument() {
    let server = TestServer::start(RateLimitConfig::unlimited()).await;
    server.create_item("trap-1", "Figure Four").await;

    let (status, created) = server
        .send(
            reqwest::Method::POST,
            "/items/trap-1/comments",
            Some("alice"),
            Some(json!({ "body": "hello" })),
        )
        .await;
    assert_eq!(status, 201, "{created}");
    let comment_id = created["id"].as_str().expect("comment id").to_string();

    let (status, err) = server
        .send(
            reqwest::Method::PUT,
            &format!("/items/trap-1/comments/{comment_id}/vote"),
            Some("bob"),
            Some(json!({ "value": "up" })),
        )
        .await;
    assert_eq!((status, err["code"].as_str()), (400, Some("INVALID_ARGUMENT")));
    assert!(err["message"].as_str().is_some_and(|message| !message.is_empty()));

    let (status, err) = server
        .send(
            reqwest::Method::POST,
            "/items/trap-1/comments",
            Some("alice"),
            Some(json!({})),
        )
        .await;
    assert_eq!((status, err["code"].as_str()), (400, Some("INVALID_ARGUMENT")));

    let (status, err) = server
        .send(
            reqwest::Method::GET,
            "/items/trap-1/comments?page_size=lots",
            Some("alice"),
            None,
        )
        .await;
    assert_eq!((status, err["code"].as_str()), (400, Some("INVALID_ARGUMENT")));

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rating_aggregate_and_search() {
    let server = TestServer::start(RateLimitConfig::unlimited()).await;
    server.create_item("trap-1", "Figure Four").await;
    server.create_item("trap-2", "Bucket").await;

    for (user, value) in [("alice", 6), ("bob", 0)] {
        let (status, _) = server
            .send(
                reqwest::Method::PUT,
                "/items/trap-1/rating",
                Some(user),
                Some(json!({ "value": value })),
            )
            .await;
        assert_eq!(status, 200);
    }
    let (_, aggregate) = server
        .send(
            reqwest::Method::PUT,
            "/items/trap-1/rating",
            Some("alice"),
            Some(json!({ "value": 4 })),
        )
        .await;
    assert_eq!(aggregate, json!({ "average": 2.0, "count": 2 }));

    let (_, item) = server
        .send(reqwest::Method::GET, "/items/trap-1", None, None)
        .await;
    assert_eq!(item["tier"], "D");

    let (status, found) = server
        .send(
            reqwest::Method::POST,
            "/items/search",
            None,
            Some(json!({ "text": "figure", "tiers": ["D"] })),
        )
        .await;
    assert_eq!(status, 200, "{found}");
    let ids: Vec<&str> = found["items"]
        .as_array()
        .expect("items")
        .iter()
        .filter_map(|item| item["id"].as_str())
        .collect();
    assert_eq!(ids, vec!["trap-1"]);

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rate_limit_rejects_with_429() {
    let limits = RateLimitConfig {
        add_comment: ActionLimit::new(2, 3600),
        ..RateLimitConfig::unlimited()
    };
    let server = TestServer::start(limits).await;
    server.create_item("trap-1", "Figure Four").await;

    let mut statuses = Vec::new();
    for n in 0..3 {
        let (status, _) = server
            .send(
                reqwest::Method::POST,
                "/items/trap-1/comments",
                Some("alice"),
                Some(json!({ "body": format!("comment {n}") })),
            )
            .await;
        statuses.push(status);
    }
    assert_eq!(statuses, vec![201, 201, 429]);

    server.shutdown().await;
}
