use crate::app::config::NetworkConfig;
use crate::xhr::details::XhrDetails;
use crate::xhr::error::{XhrError, XhrResult};
use crate::xhr::lifecycle::{Lifecycle, XhrEventKind};
use crate::xhr::response::{decode_body, format_headers, XhrOutcome, XhrResponse};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Minimum spacing between two `progress` notifications
const MIN_PROGRESS_INTERVAL: Duration = Duration::from_millis(50);

/// How the transfer stopped short of `Done`
enum Interrupt {
    Aborted,
    TimedOut,
    Failed(String),
}

/// Executes `GM.xmlHttpRequest` operations on the host
#[derive(Clone)]
pub struct XhrEngine {
    client: reqwest::Client,
    max_response_bytes: u64,
}

impl XhrEngine {
    /// Create an engine from the network configuration
    pub fn new(config: &NetworkConfig) -> XhrResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects as usize))
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            max_response_bytes: config.max_response_bytes,
        })
    }

    /// Validate the details and build the HTTP request.
    ///
    /// Failures here happen before the operation is opened and emit no events.
    pub fn prepare(&self, details: &XhrDetails) -> XhrResult<reqwest::RequestBuilder> {
        let url = Url::parse(&details.url).map_err(|e| XhrError::InvalidUrl {
            url: details.url.clone(),
            message: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(XhrError::UnsupportedScheme(url.scheme().to_string()));
        }

        let method_name = details.method.as_deref().unwrap_or("GET");
        let method = Method::from_bytes(method_name.to_ascii_uppercase().as_bytes())
            .map_err(|_| XhrError::InvalidMethod(method_name.to_string()))?;

        let mut headers = HeaderMap::new();
        for (key, value) in &details.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|_| XhrError::InvalidHeader(key.clone()))?;
            let value =
                HeaderValue::from_str(value).map_err(|_| XhrError::InvalidHeader(key.clone()))?;
            headers.append(name, value);
        }

        let mut request = self.client.request(method, url);

        if let Some(body) = &details.data {
            let encoded = body.encode(details.binary)?;
            if let Some(content_type) = encoded.content_type {
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
                }
            }
            request = request.body(encoded.bytes);
        }

        if let Some(user) = &details.user {
            request = request.basic_auth(user, details.password.as_ref());
        }

        Ok(request.headers(headers))
    }

    /// Run one operation to a terminal stage, reporting every notification to `emit`.
    ///
    /// Cancelling `cancel` aborts the operation. Once a terminal stage is
    /// reached nothing else is emitted.
    pub async fn run<F>(
        &self,
        details: &XhrDetails,
        request: reqwest::RequestBuilder,
        cancel: CancellationToken,
        emit: &mut F,
    ) -> XhrOutcome
    where
        F: FnMut(XhrEventKind, &XhrResponse) + Send,
    {
        let mut lifecycle = Lifecycle::new();
        let mut snapshot = XhrResponse {
            response_type: details.response_type,
            timeout: details.timeout.unwrap_or(0),
            with_credentials: details.user.is_some(),
            ..Default::default()
        };

        // Aborted before it was sent: straight from unsent to aborted
        let interrupt = if cancel.is_cancelled() {
            Some(Interrupt::Aborted)
        } else {
            let transitions = lifecycle.open();
            notify(&lifecycle, transitions, &mut snapshot, emit);

            let deadline = details
                .timeout
                .filter(|ms| *ms > 0)
                .map(|ms| Instant::now() + Duration::from_millis(ms));

            tokio::select! {
                biased;
                _ = cancel.cancelled() => Some(Interrupt::Aborted),
                _ = expire(deadline) => Some(Interrupt::TimedOut),
                result = self.transfer(details, request, &mut lifecycle, &mut snapshot, &mut *emit) => {
                    result.err().map(Interrupt::Failed)
                }
            }
        };

        let mut error = None;
        if let Some(interrupt) = interrupt {
            let transitions = match interrupt {
                Interrupt::Aborted => {
                    tracing::debug!(url = %details.url, "Request aborted");
                    lifecycle.abort()
                }
                Interrupt::TimedOut => {
                    tracing::debug!(url = %details.url, "Request timed out after {}ms", snapshot.timeout);
                    lifecycle.time_out()
                }
                Interrupt::Failed(message) => {
                    tracing::warn!(url = %details.url, "Request failed: {}", message);
                    error = Some(message);
                    lifecycle.fail()
                }
            };
            snapshot.clear_for_failure();
            notify(&lifecycle, transitions, &mut snapshot, emit);
        }

        XhrOutcome {
            stage: lifecycle.stage(),
            response: snapshot,
            error,
        }
    }

    /// Send the request and read the body, driving the happy path to `Done`
    async fn transfer<F>(
        &self,
        details: &XhrDetails,
        request: reqwest::RequestBuilder,
        lifecycle: &mut Lifecycle,
        snapshot: &mut XhrResponse,
        emit: &mut F,
    ) -> Result<(), String>
    where
        F: FnMut(XhrEventKind, &XhrResponse) + Send,
    {
        tracing::trace!("Sending {} request", details.url);
        let mut response = request.send().await.map_err(|e| e.to_string())?;

        let status = response.status();
        let total = response.content_length();
        snapshot.status = status.as_u16();
        snapshot.status_text = status.canonical_reason().unwrap_or_default().to_string();
        snapshot.response_headers = format_headers(response.headers());
        snapshot.response_url = response.url().to_string();
        snapshot.total = total.unwrap_or(0);
        snapshot.length_computable = total.is_some();

        let transitions = lifecycle.headers_received();
        notify(lifecycle, transitions, snapshot, emit);

        let mut body = Vec::new();
        let mut last_progress: Option<Instant> = None;
        let mut reported_bytes = 0u64;

        while let Some(chunk) = response.chunk().await.map_err(|e| e.to_string())? {
            body.extend_from_slice(&chunk);
            if body.len() as u64 > self.max_response_bytes {
                return Err(format!(
                    "Response exceeds limit of {} bytes",
                    self.max_response_bytes
                ));
            }
            snapshot.loaded = body.len() as u64;

            // Throttle progress notifications
            let due = last_progress.is_none_or(|t| t.elapsed() >= MIN_PROGRESS_INTERVAL);
            if due {
                let transitions = lifecycle.progress();
                notify(lifecycle, transitions, snapshot, emit);
                last_progress = Some(Instant::now());
                reported_bytes = snapshot.loaded;
            }
        }

        // Final progress so the last notification reports the full body
        if snapshot.loaded > reported_bytes {
            let transitions = lifecycle.progress();
            notify(lifecycle, transitions, snapshot, emit);
        }

        let (decoded, text) = decode_body(
            &body,
            details.response_type,
            details.override_mime_type.as_deref(),
        );
        snapshot.response = decoded;
        snapshot.response_text = text;

        let transitions = lifecycle.complete();
        notify(lifecycle, transitions, snapshot, emit);
        Ok(())
    }
}

fn notify<F>(
    lifecycle: &Lifecycle,
    transitions: Vec<XhrEventKind>,
    snapshot: &mut XhrResponse,
    emit: &mut F,
) where
    F: FnMut(XhrEventKind, &XhrResponse),
{
    snapshot.ready_state = lifecycle.stage().ready_state();
    for kind in transitions {
        emit(kind, snapshot);
    }
}

async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xhr::details::{RequestBody, ResponseType};
    use crate::xhr::lifecycle::Stage;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn engine() -> XhrEngine {
        XhrEngine::new(&NetworkConfig::default()).unwrap()
    }

    async fn run_collect(
        engine: &XhrEngine,
        details: XhrDetails,
        cancel: CancellationToken,
    ) -> (XhrOutcome, Vec<XhrEventKind>) {
        let request = engine.prepare(&details).unwrap();
        let mut events = Vec::new();
        let mut sink = |kind: XhrEventKind, _: &XhrResponse| events.push(kind);
        let outcome = engine.run(&details, request, cancel, &mut sink).await;
        (outcome, events)
    }

    #[tokio::test]
    async fn test_get_json_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"n": 1})))
            .mount(&mock_server)
            .await;

        let details = XhrDetails {
            response_type: ResponseType::Json,
            ..XhrDetails::get(format!("{}/data", mock_server.uri()))
        };
        let (outcome, events) = run_collect(&engine(), details, CancellationToken::new()).await;

        assert_eq!(outcome.stage, Stage::Done);
        assert_eq!(outcome.response.status, 200);
        assert_eq!(outcome.response.status_text, "OK");
        assert_eq!(outcome.response.ready_state, 4);
        assert_eq!(outcome.response.response, serde_json::json!({"n": 1}));
        assert_eq!(outcome.response.response_text, None);
        assert_eq!(events.first(), Some(&XhrEventKind::ReadyStateChange));
        assert_eq!(&events[events.len() - 2..], &[XhrEventKind::Load, XhrEventKind::LoadEnd]);
        assert!(events.contains(&XhrEventKind::Progress));
    }

    #[tokio::test]
    async fn test_post_text_body_and_headers() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/submit"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(header("x-token", "abc"))
            .and(body_string("a=1&b=2"))
            .respond_with(ResponseTemplate::new(201).set_body_string("created"))
            .mount(&mock_server)
            .await;

        let mut headers = BTreeMap::new();
        headers.insert(
            "Content-Type".to_string(),
            "application/x-www-form-urlencoded".to_string(),
        );
        headers.insert("X-Token".to_string(), "abc".to_string());

        let details = XhrDetails {
            method: Some("post".to_string()),
            headers,
            data: Some(RequestBody::Text("a=1&b=2".to_string())),
            ..XhrDetails::get(format!("{}/submit", mock_server.uri()))
        };
        let (outcome, _) = run_collect(&engine(), details, CancellationToken::new()).await;

        assert_eq!(outcome.stage, Stage::Done);
        assert_eq!(outcome.response.status, 201);
        assert_eq!(outcome.response.response_text.as_deref(), Some("created"));
    }

    #[tokio::test]
    async fn test_http_error_status_still_loads() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("missing"))
            .mount(&mock_server)
            .await;

        let details = XhrDetails::get(format!("{}/nope", mock_server.uri()));
        let (outcome, events) = run_collect(&engine(), details, CancellationToken::new()).await;

        assert_eq!(outcome.stage, Stage::Done);
        assert_eq!(outcome.response.status, 404);
        assert!(events.contains(&XhrEventKind::Load));
    }

    #[tokio::test]
    async fn test_timeout_before_completion() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("late")
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&mock_server)
            .await;

        let details = XhrDetails {
            timeout: Some(100),
            ..XhrDetails::get(format!("{}/slow", mock_server.uri()))
        };
        let (outcome, events) = run_collect(&engine(), details, CancellationToken::new()).await;

        assert_eq!(outcome.stage, Stage::TimedOut);
        assert_eq!(outcome.response.status, 0);
        assert_eq!(
            events,
            vec![
                XhrEventKind::ReadyStateChange,
                XhrEventKind::LoadStart,
                XhrEventKind::Timeout,
                XhrEventKind::LoadEnd,
            ]
        );
    }

    #[tokio::test]
    async fn test_cancel_aborts() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&mock_server)
            .await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let details = XhrDetails::get(format!("{}/slow", mock_server.uri()));
        let (outcome, events) = run_collect(&engine(), details, cancel).await;

        assert_eq!(outcome.stage, Stage::Aborted);
        let abort_count = events.iter().filter(|e| **e == XhrEventKind::Abort).count();
        let loadend_count = events.iter().filter(|e| **e == XhrEventKind::LoadEnd).count();
        assert_eq!(abort_count, 1);
        assert_eq!(loadend_count, 1);
        assert_eq!(events.last(), Some(&XhrEventKind::LoadEnd));
        assert!(!events.contains(&XhrEventKind::Load));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_skips_open() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("unused"))
            .expect(0)
            .mount(&mock_server)
            .await;

        let cancel = CancellationToken::new();
        cancel.cancel();

        let details = XhrDetails::get(format!("{}/never", mock_server.uri()));
        let (outcome, events) = run_collect(&engine(), details, cancel).await;

        assert_eq!(outcome.stage, Stage::Aborted);
        assert_eq!(outcome.response.ready_state, 4);
        assert_eq!(events, vec![XhrEventKind::Abort, XhrEventKind::LoadEnd]);
    }

    /// Server that sends headers and part of the body, then stalls
    async fn stalled_body_server() -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nhello")
                .await
                .unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_timeout_while_loading() {
        let base = stalled_body_server().await;
        let details = XhrDetails {
            timeout: Some(300),
            ..XhrDetails::get(format!("{}/stalled", base))
        };
        let (outcome, events) = run_collect(&engine(), details, CancellationToken::new()).await;

        assert_eq!(outcome.stage, Stage::TimedOut);
        assert_eq!(outcome.response.status, 0);
        assert!(events.contains(&XhrEventKind::Progress));
        assert!(!events.contains(&XhrEventKind::Load));
        assert_eq!(&events[events.len() - 2..], &[XhrEventKind::Timeout, XhrEventKind::LoadEnd]);
    }

    #[tokio::test]
    async fn test_response_size_limit() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4096]))
            .mount(&mock_server)
            .await;

        let config = NetworkConfig {
            max_response_bytes: 1024,
            ..Default::default()
        };
        let engine = XhrEngine::new(&config).unwrap();
        let details = XhrDetails::get(format!("{}/big", mock_server.uri()));
        let (outcome, events) = run_collect(&engine, details, CancellationToken::new()).await;

        assert_eq!(outcome.stage, Stage::Errored);
        assert!(outcome.error.unwrap().contains("1024"));
        assert_eq!(&events[events.len() - 2..], &[XhrEventKind::Error, XhrEventKind::LoadEnd]);
    }

    #[tokio::test]
    async fn test_connection_refused_is_error_stage() {
        // Nothing listens on port 9 on loopback in the test environment
        let details = XhrDetails::get("http://127.0.0.1:9/");
        let (outcome, events) = run_collect(&engine(), details, CancellationToken::new()).await;

        assert_eq!(outcome.stage, Stage::Errored);
        assert!(events.contains(&XhrEventKind::Error));
        assert!(!events.contains(&XhrEventKind::Load));
    }

    #[test]
    fn test_prepare_rejects_invalid_details() {
        let engine = engine();

        let err = engine.prepare(&XhrDetails::get("not a url")).unwrap_err();
        assert!(matches!(err, XhrError::InvalidUrl { .. }));

        let err = engine.prepare(&XhrDetails::get("ftp://example.com/")).unwrap_err();
        assert!(matches!(err, XhrError::UnsupportedScheme(_)));

        let details = XhrDetails {
            method: Some("GE T".to_string()),
            ..XhrDetails::get("https://example.com/")
        };
        assert!(matches!(engine.prepare(&details), Err(XhrError::InvalidMethod(_))));

        let mut headers = BTreeMap::new();
        headers.insert("bad header".to_string(), "x".to_string());
        let details = XhrDetails {
            headers,
            ..XhrDetails::get("https://example.com/")
        };
        assert!(matches!(engine.prepare(&details), Err(XhrError::InvalidHeader(_))));
    }
}
