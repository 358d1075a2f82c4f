//! Blocking REST client for the recording server.
//!
//! Session state lives in the agent's cookie store. Every non-success
//! status becomes an [`ApiError`]; 401/403 are additionally broadcast as
//! [`AuthEvent::Unauthorized`] so the UI can ask for a fresh login.

use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread;
use std::time::Duration;

use crossbeam_channel::Receiver;
use serde::de::DeserializeOwned;
use ureq::Body;
use ureq::http::Response;

use recorder_types::{
    ConvertTask, FileEntry, LoginRequest, PresignedLink, RecordFile, RecordState, RecordStats,
    RecordStatus, RecordTask, RoomInfo,
};

use crate::auth::{AuthBroadcast, AuthEvent};
use crate::cache::{Clock, DEFAULT_ROOM_INFO_TTL, RoomInfoCache, SystemClock};
use crate::download::{self, CancelToken, DownloadOutcome, DownloadRequest, Strategies};
use crate::error::{ApiError, Result};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_JSON_BYTES: u64 = 16 * 1024 * 1024;
const MAX_ERROR_BYTES: u64 = 200_000;
/// Upper bound on concurrent per-room requests.
const MAX_ROOM_WORKERS: usize = 8;

#[derive(Clone, Debug)]
pub struct ApiClientConfig {
    /// Server root, e.g. `https://rec.example.com/api`.
    pub base_url: String,
    /// Connect and response-header timeout. Body transfer is unbounded so
    /// large downloads are not cut off.
    pub timeout: Duration,
    pub room_info_ttl: Duration,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout: DEFAULT_TIMEOUT,
            room_info_ttl: DEFAULT_ROOM_INFO_TTL,
        }
    }
}

/// A subscribed room with its current recording flag.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct SubscribedRoom {
    pub info: RoomInfo,
    pub recording: bool,
}

/// Agent used for API calls and downloads. Status codes are inspected by
/// the caller instead of being turned into transport errors.
pub fn build_agent(timeout: Duration) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .timeout_connect(Some(timeout))
        .timeout_recv_response(Some(timeout))
        .build();
    ureq::Agent::new_with_config(config)
}

/// Percent-encode each `/`-separated segment, dropping empty ones.
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .filter(|seg| !seg.is_empty())
        .map(|seg| urlencoding::encode(seg).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

pub struct ApiClient {
    agent: ureq::Agent,
    base_url: RwLock<String>,
    room_cache: Mutex<RoomInfoCache>,
    auth: AuthBroadcast,
}

impl ApiClient {
    pub fn new(config: ApiClientConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: ApiClientConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            agent: build_agent(config.timeout),
            base_url: RwLock::new(normalize_base(&config.base_url)),
            room_cache: Mutex::new(RoomInfoCache::new(config.room_info_ttl, clock)),
            auth: AuthBroadcast::default(),
        }
    }

    pub fn base_url(&self) -> String {
        self.base_url
            .read()
            .map(|url| url.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    /// Point the client at another server. Cached room metadata is dropped.
    pub fn set_base_url(&self, url: &str) {
        let mut base = self.base_url.write().unwrap_or_else(|e| e.into_inner());
        *base = normalize_base(url);
        self.cache().clear();
        tracing::info!(base_url = %*base, "api base url set");
    }

    /// Receive a notification whenever the server rejects the session.
    pub fn subscribe_auth(&self) -> Receiver<AuthEvent> {
        self.auth.subscribe()
    }

    // --- session ---

    pub fn login(&self, user: &str, pass: &str) -> Result<()> {
        let url = self.endpoint("/login");
        let body = LoginRequest {
            user: user.to_string(),
            pass: pass.to_string(),
        };
        // A rejected login is not a lost session; don't broadcast it.
        self.check_quiet(&url, self.agent.post(&url).send_json(&body))?;
        tracing::info!(user, "logged in");
        Ok(())
    }

    /// Best effort: a failed logout is logged, not returned.
    pub fn logout(&self) {
        let url = self.endpoint("/logout");
        match self.check(&url, self.agent.post(&url).send_empty()) {
            Ok(_) => tracing::info!("logged out"),
            Err(err) => tracing::warn!(error = %err, "logout request failed"),
        }
        self.cache().clear();
    }

    // --- recording ---

    /// Room ids the server is tracking. A non-array payload yields no rooms.
    pub fn record_list(&self) -> Result<Vec<u64>> {
        let value: serde_json::Value = self.get_json("/record/list", "record list")?;
        let serde_json::Value::Array(items) = value else {
            tracing::warn!("record list payload is not an array");
            return Ok(Vec::new());
        };
        Ok(items.iter().filter_map(|item| item.as_u64()).collect())
    }

    pub fn record_status(&self, room_id: u64) -> Result<RecordStatus> {
        self.get_json(&format!("/record/{room_id}/status"), "record status")
    }

    pub fn record_stats(&self, room_id: u64) -> Result<RecordStats> {
        self.get_json(&format!("/record/{room_id}/stats"), "record stats")
    }

    /// Aggregate status, stats and room metadata for every tracked room.
    ///
    /// Room metadata comes from the TTL cache when fresh; otherwise it is
    /// fetched only for rooms that are currently recording.
    pub fn record_tasks(&self) -> Result<Vec<RecordTask>> {
        let ids = self.record_list()?;
        fan_out(&ids, |room_id| self.record_task(room_id))
            .into_iter()
            .map(|joined| {
                joined.unwrap_or_else(|_| Err(ApiError::Unsupported("room worker panicked".into())))
            })
            .collect()
    }

    fn record_task(&self, room_id: u64) -> Result<RecordTask> {
        let status = self.record_status(room_id)?.status;
        let stats = self.record_stats(room_id)?;

        let cached = self.cache().get(room_id);
        let room_info = match cached {
            Some(info) => Some(info),
            None if status.is_recording() => {
                let info = self.room_info(room_id)?;
                self.cache().insert(room_id, info.clone());
                Some(info)
            }
            None => None,
        };

        Ok(RecordTask {
            room_id,
            status,
            file_size: stats.bytes_written,
            recorded_time: stats.elapsed_seconds,
            start_time: stats.start_time,
            room_info,
        })
    }

    pub fn start_record(&self, room_id: u64) -> Result<()> {
        let url = self.endpoint(&format!("/record/{room_id}/start"));
        self.check(&url, self.agent.post(&url).send_json(serde_json::json!({})))?;
        self.cache().invalidate(room_id);
        tracing::info!(room_id, "recording started");
        Ok(())
    }

    pub fn stop_record(&self, room_id: u64) -> Result<()> {
        let url = self.endpoint(&format!("/record/{room_id}/stop"));
        self.check(&url, self.agent.post(&url).send_json(serde_json::json!({})))?;
        self.cache().invalidate(room_id);
        tracing::info!(room_id, "recording stopped");
        Ok(())
    }

    // --- rooms ---

    pub fn room_info(&self, room_id: u64) -> Result<RoomInfo> {
        self.get_json(&format!("/room/{room_id}/info"), "room info")
    }

    pub fn room_infos(&self, room_ids: &[u64]) -> Result<Vec<RoomInfo>> {
        if room_ids.is_empty() {
            return Ok(Vec::new());
        }
        let joined = room_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let url = self.endpoint("/room/infos");
        let resp = self.check(&url, self.agent.get(&url).query("roomIDs", &joined).call())?;
        read_json(resp, &url, "room infos")
    }

    pub fn subscribed_rooms(&self) -> Result<Vec<u64>> {
        let ids: Option<Vec<u64>> = self.get_json("/room/subscribe", "subscriptions")?;
        Ok(ids.unwrap_or_default())
    }

    pub fn subscribe_room(&self, room_id: u64) -> Result<()> {
        let url = self.endpoint(&format!("/room/{room_id}"));
        self.check(&url, self.agent.post(&url).send_empty())?;
        tracing::info!(room_id, "subscribed");
        Ok(())
    }

    pub fn unsubscribe_room(&self, room_id: u64) -> Result<()> {
        let url = self.endpoint(&format!("/room/{room_id}"));
        self.check(&url, self.agent.delete(&url).call())?;
        self.cache().invalidate(room_id);
        tracing::info!(room_id, "unsubscribed");
        Ok(())
    }

    /// Subscribed rooms with metadata and recording flag. A room whose
    /// status cannot be read is reported as not recording.
    pub fn subscriptions(&self) -> Result<Vec<SubscribedRoom>> {
        let ids = self.subscribed_rooms()?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let (infos, statuses) = thread::scope(|scope| {
            let infos = scope.spawn(|| self.room_infos(&ids));
            let statuses = fan_out(&ids, |id| match self.record_status(id) {
                Ok(status) => (id, status.status),
                Err(err) => {
                    tracing::debug!(room_id = id, error = %err, "status unavailable, assuming idle");
                    (id, RecordState::Idle)
                }
            });
            let infos = infos
                .join()
                .unwrap_or_else(|_| Err(ApiError::Unsupported("room info worker panicked".into())));
            let statuses: Vec<(u64, RecordState)> =
                statuses.into_iter().filter_map(|joined| joined.ok()).collect();
            (infos, statuses)
        });
        let infos = infos?;
        Ok(infos
            .into_iter()
            .map(|info| {
                let recording = statuses
                    .iter()
                    .any(|(id, state)| *id == info.room_id && state.is_recording());
                SubscribedRoom { info, recording }
            })
            .collect())
    }

    // --- files ---

    /// List a directory; `..` navigation rows are dropped.
    pub fn browse(&self, path: &str) -> Result<Vec<FileEntry>> {
        let encoded = encode_path(path);
        let route = if encoded.is_empty() {
            "/files/browse".to_string()
        } else {
            format!("/files/browse/{encoded}")
        };
        let files: Option<Vec<RecordFile>> = self.get_json(&route, "file list")?;
        Ok(files
            .unwrap_or_default()
            .into_iter()
            .map(FileEntry::from)
            .filter(|entry| !entry.is_parent_link())
            .collect())
    }

    pub fn download_url(&self, path: &str) -> String {
        self.endpoint(&format!("/files/download/{}", encode_path(path)))
    }

    /// Save a recorded file locally through the download helper, reusing
    /// this client's session cookies.
    pub fn download_to_disk(
        &self,
        path: &str,
        strategies: &Strategies<'_>,
        progress: &mut dyn FnMut(u64, Option<u64>),
        cancel: &CancelToken,
    ) -> Result<DownloadOutcome> {
        let url = self.download_url(path);
        let suggested = path.rsplit('/').find(|seg| !seg.is_empty());
        let req = DownloadRequest {
            url: &url,
            suggested_name: suggested,
        };
        let result = download::download_to_disk(&self.agent, &req, strategies, progress, cancel);
        if let Err(ApiError::Unauthorized { code, .. }) = &result {
            self.auth.emit(AuthEvent::Unauthorized { code: *code });
        }
        result
    }

    /// Delete several files in one call. Paths are sent as given.
    pub fn delete_files(&self, paths: &[String]) -> Result<()> {
        let url = self.endpoint("/files/batch");
        self.check(
            &url,
            self.agent.delete(&url).force_send_body().send_json(paths),
        )?;
        tracing::info!(count = paths.len(), "files deleted");
        Ok(())
    }

    pub fn delete_path(&self, path: &str) -> Result<()> {
        let encoded = encode_path(path);
        if encoded.is_empty() {
            return Err(ApiError::InvalidInput("refusing to delete the root directory".into()));
        }
        let url = self.endpoint(&format!("/files/{encoded}"));
        self.check(&url, self.agent.delete(&url).call())?;
        tracing::info!(path, "path deleted");
        Ok(())
    }

    /// Issue a share link for a file.
    pub fn presign(&self, path: &str) -> Result<PresignedLink> {
        let url = self.endpoint(&format!("/files/presigned/{}", encode_path(path)));
        let resp = self.check(&url, self.agent.post(&url).send_empty())?;
        let body = read_text(resp, MAX_JSON_BYTES, &url)?;
        parse_presigned(&body)
    }

    // --- conversion ---

    pub fn convert_tasks(&self) -> Result<Vec<ConvertTask>> {
        let tasks: Option<Vec<ConvertTask>> = self.get_json("/convert/tasks", "convert tasks")?;
        Ok(tasks.unwrap_or_default())
    }

    pub fn enqueue_convert(&self, path: &str, format: &str, delete_source: bool) -> Result<()> {
        let format = format.trim().to_ascii_lowercase();
        if format.is_empty() {
            return Err(ApiError::InvalidInput("convert format is empty".into()));
        }
        let url = self.endpoint(&format!("/convert/tasks/{}", encode_path(path)));
        self.check(
            &url,
            self.agent
                .post(&url)
                .query("delete", if delete_source { "true" } else { "false" })
                .query("format", &format)
                .send_empty(),
        )?;
        tracing::info!(path, format = %format, delete_source, "conversion queued");
        Ok(())
    }

    pub fn cancel_convert(&self, task_id: &str) -> Result<()> {
        let url = self.endpoint(&format!("/convert/tasks/{}", urlencoding::encode(task_id)));
        self.check(&url, self.agent.delete(&url).call())?;
        tracing::info!(task_id, "conversion cancelled");
        Ok(())
    }

    // --- plumbing ---

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    fn cache(&self) -> MutexGuard<'_, RoomInfoCache> {
        self.room_cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn get_json<T: DeserializeOwned>(&self, route: &str, what: &str) -> Result<T> {
        let url = self.endpoint(route);
        tracing::debug!(url = %url, "GET");
        let resp = self.check(&url, self.agent.get(&url).call())?;
        read_json(resp, &url, what)
    }

    fn check(
        &self,
        url: &str,
        result: std::result::Result<Response<Body>, ureq::Error>,
    ) -> Result<Response<Body>> {
        let result = self.check_quiet(url, result);
        if let Err(ApiError::Unauthorized { code, .. }) = &result {
            tracing::warn!(url, code, "session rejected");
            self.auth.emit(AuthEvent::Unauthorized { code: *code });
        }
        result
    }

    fn check_quiet(
        &self,
        url: &str,
        result: std::result::Result<Response<Body>, ureq::Error>,
    ) -> Result<Response<Body>> {
        let resp = result.map_err(|err| ApiError::transport(url, err))?;
        if resp.status().is_success() {
            return Ok(resp);
        }
        let code = resp.status().as_u16();
        let body = resp
            .into_body()
            .with_config()
            .limit(MAX_ERROR_BYTES)
            .read_to_string()
            .unwrap_or_default();
        tracing::debug!(url, code, "request failed");
        Err(ApiError::from_status(code, &body))
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url())
            .finish_non_exhaustive()
    }
}

/// Run `work` for every id, at most `MAX_ROOM_WORKERS` at a time. Results
/// keep the order of `ids`.
fn fan_out<T: Send>(ids: &[u64], work: impl Fn(u64) -> T + Sync) -> Vec<thread::Result<T>> {
    let work = &work;
    let mut results = Vec::with_capacity(ids.len());
    for batch in ids.chunks(MAX_ROOM_WORKERS) {
        thread::scope(|scope| {
            let handles: Vec<_> = batch
                .iter()
                .map(|&id| scope.spawn(move || work(id)))
                .collect();
            results.extend(handles.into_iter().map(|handle| handle.join()));
        });
    }
    results
}

fn normalize_base(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn read_text(resp: Response<Body>, limit: u64, url: &str) -> Result<String> {
    resp.into_body()
        .with_config()
        .limit(limit)
        .read_to_string()
        .map_err(|err| ApiError::transport(url, err))
}

fn read_json<T: DeserializeOwned>(resp: Response<Body>, url: &str, what: &str) -> Result<T> {
    let body = read_text(resp, MAX_JSON_BYTES, url)?;
    // Some endpoints answer an empty body where a list is expected.
    let body = if body.trim().is_empty() { "null" } else { body.as_str() };
    serde_json::from_str(body).map_err(|source| ApiError::Decode {
        what: what.to_string(),
        source,
    })
}

/// Accepts `{"url": ...}`, a JSON string, or a bare URL.
fn parse_presigned(body: &str) -> Result<PresignedLink> {
    let source = match serde_json::from_str::<PresignedLink>(body) {
        Ok(link) => return Ok(link),
        Err(err) => err,
    };
    if let Ok(url) = serde_json::from_str::<String>(body) {
        return Ok(PresignedLink {
            url,
            expires_at: None,
        });
    }
    let trimmed = body.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return Ok(PresignedLink {
            url: trimmed.to_string(),
            expires_at: None,
        });
    }
    Err(ApiError::Decode {
        what: "presigned link".to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::cache::ManualClock;

    fn client_for(server: &MockServer) -> Arc<ApiClient> {
        Arc::new(ApiClient::new(ApiClientConfig {
            base_url: server.uri(),
            timeout: Duration::from_secs(5),
            ..ApiClientConfig::default()
        }))
    }

    async fn blocking<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
        tokio::task::spawn_blocking(f).await.unwrap()
    }

    async fn mount_room(server: &MockServer, id: u64, state: &str, info_calls: u64) {
        Mock::given(method("GET"))
            .and(path(format!("/record/{id}/status")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"room_id": id, "status": state})))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/record/{id}/stats")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "bytes_written": 2048,
                "elapsed_seconds": 61,
                "start_time": "2024-05-01T10:00:00Z"
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/room/{id}/info")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "room_id": id, "uname": format!("streamer-{id}"), "live_status": 1
            })))
            .expect(info_calls)
            .mount(server)
            .await;
    }

    async fn mount_list(server: &MockServer, ids: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/record/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ids))
            .mount(server)
            .await;
    }

    #[test]
    fn encode_path_escapes_segments_individually() {
        assert_eq!(encode_path("2024 May/直播#1.flv"), "2024%20May/%E7%9B%B4%E6%92%AD%231.flv");
        assert_eq!(encode_path("/a//b/"), "a/b");
        assert_eq!(encode_path(""), "");
    }

    #[test]
    fn base_url_is_normalized() {
        let client = ApiClient::new(ApiClientConfig {
            base_url: " http://rec.lan:8080/api/ ".into(),
            ..ApiClientConfig::default()
        });
        assert_eq!(client.base_url(), "http://rec.lan:8080/api");
        assert_eq!(
            client.download_url("sub/a b.flv"),
            "http://rec.lan:8080/api/files/download/sub/a%20b.flv"
        );
        client.set_base_url("https://other/");
        assert_eq!(client.base_url(), "https://other");
    }

    #[test]
    fn fan_out_bounds_concurrency_and_keeps_order() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let running = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let ids: Vec<u64> = (1..=20).collect();
        let results = fan_out(&ids, |id| {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            running.fetch_sub(1, Ordering::SeqCst);
            id * 10
        });
        let values: Vec<u64> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, ids.iter().map(|id| id * 10).collect::<Vec<_>>());
        assert!(peak.load(Ordering::SeqCst) <= MAX_ROOM_WORKERS);
    }

    #[test]
    fn presigned_payload_shapes() {
        let obj = parse_presigned(r#"{"url":"https://s/x","expires_at":"soon"}"#).unwrap();
        assert_eq!(obj.expires_at.as_deref(), Some("soon"));
        assert_eq!(parse_presigned(r#""https://s/y""#).unwrap().url, "https://s/y");
        assert_eq!(parse_presigned("https://s/z\n").unwrap().url, "https://s/z");
        match parse_presigned("nope") {
            Err(ApiError::Decode { what, .. }) => assert_eq!(what, "presigned link"),
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn idle_rooms_skip_metadata_fetch() {
        let server = MockServer::start().await;
        mount_list(&server, json!([1001, 1002])).await;
        mount_room(&server, 1001, "idle", 0).await;
        mount_room(&server, 1002, "recording", 1).await;

        let client = client_for(&server);
        let tasks = blocking(move || client.record_tasks()).await.unwrap();

        assert_eq!(tasks.len(), 2);
        let idle = tasks.iter().find(|t| t.room_id == 1001).unwrap();
        assert_eq!(idle.status, RecordState::Idle);
        assert!(idle.room_info.is_none());
        let live = tasks.iter().find(|t| t.room_id == 1002).unwrap();
        assert_eq!(live.status, RecordState::Recording);
        assert_eq!(live.file_size, Some(2048));
        assert_eq!(live.recorded_time, Some(61));
        assert_eq!(
            live.room_info.as_ref().and_then(|i| i.uname.as_deref()),
            Some("streamer-1002")
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cached_room_info_served_within_ttl() {
        let server = MockServer::start().await;
        mount_list(&server, json!([7])).await;
        mount_room(&server, 7, "recording", 2).await;

        let clock = Arc::new(ManualClock::new());
        let client = Arc::new(ApiClient::with_clock(
            ApiClientConfig {
                base_url: server.uri(),
                room_info_ttl: Duration::from_secs(300),
                ..ApiClientConfig::default()
            },
            clock.clone(),
        ));

        let c = client.clone();
        blocking(move || c.record_tasks()).await.unwrap();
        clock.advance(Duration::from_secs(299));
        let c = client.clone();
        blocking(move || c.record_tasks()).await.unwrap();
        clock.advance(Duration::from_secs(1));
        let c = client.clone();
        let tasks = blocking(move || c.record_tasks()).await.unwrap();
        assert!(tasks[0].room_info.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_evicts_cached_room_info() {
        let server = MockServer::start().await;
        mount_list(&server, json!([1002])).await;
        mount_room(&server, 1002, "recording", 2).await;
        Mock::given(method("POST"))
            .and(path("/record/1002/stop"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let c = client.clone();
        blocking(move || {
            c.record_tasks()?;
            c.stop_record(1002)?;
            c.record_tasks()
        })
        .await
        .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn start_evicts_cached_room_info() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/record/5/start"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let client = client_for(&server);
        client.cache().insert(5, RoomInfo { room_id: 5, ..RoomInfo::default() });

        let c = client.clone();
        blocking(move || c.start_record(5)).await.unwrap();
        assert!(client.cache().get(5).is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_start_keeps_cache_and_reports_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/record/9/start"))
            .respond_with(ResponseTemplate::new(500).set_body_string("room is offline"))
            .mount(&server)
            .await;
        let client = client_for(&server);
        client.cache().insert(9, RoomInfo { room_id: 9, ..RoomInfo::default() });

        let c = client.clone();
        let err = blocking(move || c.start_record(9)).await.unwrap_err();
        assert_eq!(err.status_code(), Some(500));
        assert_eq!(err.server_message(), Some("room is offline"));
        assert!(err.to_string().contains("room is offline"));
        assert!(client.cache().get(9).is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_error_body_falls_back_to_status_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/convert/tasks"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;
        let client = client_for(&server);
        let err = blocking(move || client.convert_tasks()).await.unwrap_err();
        assert_eq!(err.server_message(), Some("HTTP 502"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unauthorized_is_broadcast() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/record/list"))
            .respond_with(ResponseTemplate::new(401).set_body_string("session expired"))
            .mount(&server)
            .await;
        let client = client_for(&server);
        let events = client.subscribe_auth();

        let c = client.clone();
        let err = blocking(move || c.record_list()).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(
            events.try_recv().ok(),
            Some(AuthEvent::Unauthorized { code: 401 })
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rejected_login_is_not_broadcast() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .and(body_json(json!({"user": "admin", "pass": "wrong"})))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
            .mount(&server)
            .await;
        let client = client_for(&server);
        let events = client.subscribe_auth();

        let c = client.clone();
        let err = blocking(move || c.login("admin", "wrong")).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn session_cookie_is_replayed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "session=abc123; Path=/; HttpOnly"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/record/list"))
            .and(wiremock::matchers::header("cookie", "session=abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([3])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let ids = blocking(move || {
            client.login("admin", "secret")?;
            client.record_list()
        })
        .await
        .unwrap();
        assert_eq!(ids, vec![3]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn non_array_record_list_is_empty() {
        let server = MockServer::start().await;
        mount_list(&server, json!({"error": "weird"})).await;
        let client = client_for(&server);
        let ids = blocking(move || client.record_list()).await.unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn batch_delete_sends_paths_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/files/batch"))
            .and(body_json(json!(["a.flv", "sub/b.mp4"])))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        let client = client_for(&server);
        blocking(move || client.delete_files(&["a.flv".to_string(), "sub/b.mp4".to_string()]))
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn browse_maps_entries_and_drops_parent_link() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/browse/2024/may"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"path": "2024", "name": "..", "size": 0, "isDir": true},
                {"path": "2024/may/day1", "name": "day1", "size": 0, "isDir": true},
                {"path": "2024/may/a.flv", "name": "a.flv", "size": 10, "modTime": "t", "isDir": false}
            ])))
            .mount(&server)
            .await;
        let client = client_for(&server);
        let entries = blocking(move || client.browse("/2024/may/")).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_dir());
        assert_eq!(entries[1].name(), "a.flv");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn browse_root_uses_bare_route() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/browse"))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .expect(1)
            .mount(&server)
            .await;
        let client = client_for(&server);
        let entries = blocking(move || client.browse("")).await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn enqueue_convert_sends_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/convert/tasks/sub/a.flv"))
            .and(query_param("delete", "true"))
            .and(query_param("format", "mp4"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        let client = client_for(&server);
        blocking(move || client.enqueue_convert("sub/a.flv", "MP4", true))
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn subscriptions_treat_status_failure_as_idle() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/room/subscribe"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/room/infos"))
            .and(query_param("roomIDs", "1,2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"room_id": 1, "uname": "one"},
                {"room_id": 2, "uname": "two"}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/record/1/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "recording"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/record/2/status"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let rooms = blocking(move || client.subscriptions()).await.unwrap();
        assert_eq!(rooms.len(), 2);
        assert!(rooms.iter().find(|r| r.info.room_id == 1).unwrap().recording);
        assert!(!rooms.iter().find(|r| r.info.room_id == 2).unwrap().recording);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn status_without_room_id_still_builds_task() {
        let server = MockServer::start().await;
        mount_list(&server, json!([1001])).await;
        Mock::given(method("GET"))
            .and(path("/record/1001/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "idle"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/record/1001/stats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let tasks = blocking(move || client.record_tasks()).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].room_id, 1001);
        assert_eq!(tasks[0].status, RecordState::Idle);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn body_read_failure_names_the_url() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = sock.read(&mut buf).await;
            let _ = sock
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 100\r\n\r\n[1,")
                .await;
        });

        let client = ApiClient::new(ApiClientConfig {
            base_url: base.clone(),
            timeout: Duration::from_secs(5),
            ..ApiClientConfig::default()
        });
        let err = blocking(move || client.record_list()).await.unwrap_err();
        let text = err.to_string();
        assert!(text.contains(&format!("{base}/record/list")), "got {text}");
    }

    #[test]
    fn delete_root_is_rejected_locally() {
        let client = ApiClient::new(ApiClientConfig {
            base_url: "http://127.0.0.1:9".into(),
            ..ApiClientConfig::default()
        });
        assert!(matches!(client.delete_path("/"), Err(ApiError::InvalidInput(_))));
    }
}
