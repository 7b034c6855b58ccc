use super::*;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tempfile::tempdir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

type Routes = HashMap<&'static str, VecDeque<(u16, String)>>;

/// Minimal HTTP/1.1 responder keyed by the `:method` suffix of the path.
/// Returns the base URL and the list of methods hit, in order.
async fn mock_code_assist(mut routes: Routes) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&hits);
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let path = read_request_path(&mut socket).await;
            let method = path.rsplit(':').next().unwrap_or_default().to_string();
            recorded.lock().unwrap().push(method.clone());
            let (status, body) = routes
                .get_mut(method.as_str())
                .and_then(VecDeque::pop_front)
                .unwrap_or((404, "{}".to_string()));
            let response = format!(
                "HTTP/1.1 {status} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });
    (format!("http://{addr}/v1internal"), hits)
}

async fn read_request_path(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0_u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            return String::new();
        }
        buf.extend_from_slice(&chunk[..n]);
        let Some(header_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let body_len = head
            .lines()
            .find_map(|line| {
                let lower = line.to_ascii_lowercase();
                lower
                    .strip_prefix("content-length:")
                    .and_then(|v| v.trim().parse::<usize>().ok())
            })
            .unwrap_or(0);
        while buf.len() < header_end + 4 + body_len {
            let n = socket.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        return head
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .unwrap_or_default()
            .to_string();
    }
}

fn creds(access: &str, refresh: &str, expiry_ms: Option<i64>) -> OAuthCreds {
    OAuthCreds {
        access_token: Some(access.to_string()),
        refresh_token: Some(refresh.to_string()),
        id_token: None,
        expiry_date: expiry_ms,
    }
}

fn ok(body: serde_json::Value) -> (u16, String) {
    (200, body.to_string())
}

fn quota_body() -> serde_json::Value {
    json!({"buckets": [
        {"modelId": "gemini-2.5-pro", "remainingFraction": 0.25, "resetTime": "2026-04-03T00:00:00Z"},
        {"modelId": "gemini-2.5-flash", "remainingFraction": 1.0, "tokenType": "REQUESTS"}
    ]})
}

fn client(base_url: &str, project_cache: PathBuf, auth: GeminiAuth) -> GeminiQuotaClient {
    GeminiQuotaClient::new(auth, project_cache, Duration::from_secs(5))
        .unwrap()
        .with_base_url(base_url)
}

#[test]
fn test_fingerprint_prefers_refresh_token() {
    let a = GeminiAuth::from_creds("work", Some(creds("acc-1", "refresh-x", None)));
    let b = GeminiAuth::from_creds("work", Some(creds("acc-2", "refresh-x", None)));
    let c = GeminiAuth::from_creds("work", Some(creds("acc-1", "refresh-y", None)));
    assert_eq!(a.fingerprint, b.fingerprint);
    assert_ne!(a.fingerprint, c.fingerprint);
    assert_eq!(a.cache_key, format!("work::{}", a.fingerprint));
}

#[test]
fn test_missing_creds_file_yields_stable_key() {
    let dir = tempdir().unwrap();
    let auth = GeminiAuth::load(&dir.path().join("oauth_creds.json"), "default");
    assert!(auth.creds.is_none());
    assert_eq!(auth.cache_key, GeminiAuth::from_creds("default", None).cache_key);
}

#[test]
fn test_creds_expiry_accepts_string_millis() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("oauth_creds.json");
    std::fs::write(
        &path,
        r#"{"access_token":"t","refresh_token":"r","expiry_date":"5000"}"#,
    )
    .unwrap();
    let creds = OAuthCreds::load(&path).unwrap();
    assert_eq!(creds.usable_access_token(4_000), Some("t"));
    assert_eq!(creds.usable_access_token(6_000), None);
}

#[test]
fn test_bucket_lookup_and_usage() {
    let quota = GeminiQuota {
        account_id: "default".into(),
        token_fingerprint: "f".into(),
        buckets: serde_json::from_value(quota_body()["buckets"].clone()).unwrap(),
    };
    let pro = quota.bucket_for(Some("gemini-2.5-pro"), "gemini-2.5-flash").unwrap();
    assert_eq!(pro.used_percent(), 75);
    assert!(pro.resets_at().is_some());

    let fallback = quota.bucket_for(Some("gemini-9-ultra"), "gemini-2.5-flash").unwrap();
    assert_eq!(fallback.used_percent(), 0);
    assert_eq!(fallback.extra.get("tokenType"), Some(&json!("REQUESTS")));

    assert!(quota.bucket_for(None, "nope").is_none());
}

#[tokio::test]
async fn test_resolves_project_then_fetches_quota() {
    let dir = tempdir().unwrap();
    let routes = Routes::from([
        ("loadCodeAssist", VecDeque::from([ok(json!({"cloudaicompanionProject": "proj-1"}))])),
        ("retrieveUserQuota", VecDeque::from([ok(quota_body())])),
    ]);
    let (base_url, hits) = mock_code_assist(routes).await;
    let auth = GeminiAuth::from_creds("work", Some(creds("tok", "ref", None)));
    let project_path = dir.path().join("gemini_project_id.json");
    let client = client(&base_url, project_path.clone(), auth.clone());

    let quota = client.fetch_quota(now_ms()).await.unwrap();
    assert_eq!(quota.account_id, "work");
    assert_eq!(quota.token_fingerprint, auth.fingerprint);
    assert_eq!(quota.buckets.len(), 2);
    assert_eq!(*hits.lock().unwrap(), vec!["loadCodeAssist", "retrieveUserQuota"]);

    let cached = CacheFile::<String>::new(project_path).read().unwrap();
    assert_eq!(cached.payload, "proj-1");
    assert_eq!(cached.cache_key.as_deref(), Some(auth.cache_key.as_str()));
}

#[tokio::test]
async fn test_cached_project_skips_resolution() {
    let dir = tempdir().unwrap();
    let auth = GeminiAuth::from_creds("work", Some(creds("tok", "ref", None)));
    let project_path = dir.path().join("gemini_project_id.json");
    CacheFile::new(&project_path)
        .write(Some(auth.cache_key.as_str()), &"proj-cached".to_string(), now_ms())
        .unwrap();

    let routes = Routes::from([("retrieveUserQuota", VecDeque::from([ok(quota_body())]))]);
    let (base_url, hits) = mock_code_assist(routes).await;
    let quota = client(&base_url, project_path, auth).fetch_quota(now_ms()).await;

    assert!(quota.is_some());
    assert_eq!(*hits.lock().unwrap(), vec!["retrieveUserQuota"]);
}

#[tokio::test]
async fn test_stale_cached_project_is_re_resolved_once() {
    let dir = tempdir().unwrap();
    let auth = GeminiAuth::from_creds("work", Some(creds("tok", "ref", None)));
    let project_path = dir.path().join("gemini_project_id.json");
    CacheFile::new(&project_path)
        .write(Some(auth.cache_key.as_str()), &"proj-old".to_string(), now_ms())
        .unwrap();

    let routes = Routes::from([
        ("loadCodeAssist", VecDeque::from([ok(json!({"cloudaicompanionProject": {"id": "proj-new"}}))])),
        ("retrieveUserQuota", VecDeque::from([ok(json!({})), ok(quota_body())])),
    ]);
    let (base_url, hits) = mock_code_assist(routes).await;
    let quota = client(&base_url, project_path.clone(), auth)
        .fetch_quota(now_ms())
        .await
        .unwrap();

    assert_eq!(quota.buckets.len(), 2);
    assert_eq!(
        *hits.lock().unwrap(),
        vec!["retrieveUserQuota", "loadCodeAssist", "retrieveUserQuota"]
    );
    assert_eq!(CacheFile::<String>::new(project_path).read().unwrap().payload, "proj-new");
}

#[tokio::test]
async fn test_project_cached_for_other_account_is_ignored() {
    let dir = tempdir().unwrap();
    let project_path = dir.path().join("gemini_project_id.json");
    CacheFile::new(&project_path)
        .write(Some("someone-else::abc"), &"proj-foreign".to_string(), now_ms())
        .unwrap();

    let routes = Routes::from([
        ("loadCodeAssist", VecDeque::from([ok(json!({"cloudaicompanionProject": "proj-mine"}))])),
        ("retrieveUserQuota", VecDeque::from([ok(quota_body())])),
    ]);
    let (base_url, hits) = mock_code_assist(routes).await;
    let auth = GeminiAuth::from_creds("work", Some(creds("tok", "ref", None)));
    assert!(client(&base_url, project_path, auth).fetch_quota(now_ms()).await.is_some());
    assert_eq!(*hits.lock().unwrap(), vec!["loadCodeAssist", "retrieveUserQuota"]);
}

#[tokio::test]
async fn test_http_error_yields_none() {
    let dir = tempdir().unwrap();
    let routes = Routes::from([("loadCodeAssist", VecDeque::from([(401, "{}".to_string())]))]);
    let (base_url, _hits) = mock_code_assist(routes).await;
    let auth = GeminiAuth::from_creds("work", Some(creds("tok", "ref", None)));
    let quota = client(&base_url, dir.path().join("p.json"), auth)
        .fetch_quota(now_ms())
        .await;
    assert!(quota.is_none());
}

#[tokio::test]
async fn test_expired_token_makes_no_request() {
    let dir = tempdir().unwrap();
    let (base_url, hits) = mock_code_assist(Routes::new()).await;
    let auth = GeminiAuth::from_creds("work", Some(creds("tok", "ref", Some(1_000))));
    let quota = client(&base_url, dir.path().join("p.json"), auth)
        .fetch_quota(2_000)
        .await;
    assert!(quota.is_none());
    assert!(hits.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_snapshot_source_carries_cache_key() {
    let dir = tempdir().unwrap();
    let auth = GeminiAuth::from_creds("work", None);
    let client = client("http://127.0.0.1:9/v1internal", dir.path().join("p.json"), auth.clone());
    assert_eq!(client.cache_source(), CacheSource::GeminiQuota);
    assert_eq!(client.cache_key(), Some(auth.cache_key));
    assert!(client.fetch().await.is_none());
}
