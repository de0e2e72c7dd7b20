// src/analysis/client.rs

use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::analysis::gate::AnalysisGate;
use crate::analysis::{resolve, AnalysisOutcome, TempoHint, TempoInfo};
use crate::config::AnalysisConfig;
use crate::error::{Result, TempoError};

#[derive(Debug, Deserialize)]
struct ServiceResponse {
    #[serde(default)]
    success: bool,
    bpm: Option<f64>,
    duration: Option<f64>,
    offset: Option<f64>,
    error: Option<String>,
}

impl ServiceResponse {
    fn into_info(self) -> Result<TempoInfo> {
        if !self.success {
            let reason = self.error.unwrap_or_else(|| "service reported failure".to_string());
            return Err(TempoError::NetworkFailure(reason));
        }
        let field = |v: Option<f64>, name: &str| {
            v.filter(|x| x.is_finite())
                .ok_or_else(|| TempoError::NetworkFailure(format!("response missing {name}")))
        };
        Ok(TempoInfo {
            // the service reports fractional tempo; callers work in whole beats per minute
            bpm: field(self.bpm, "bpm")?.round(),
            duration: field(self.duration, "duration")?,
            offset: field(self.offset, "offset")?,
        })
    }
}

/// HTTP client for the remote tempo analysis service.
#[derive(Debug, Clone)]
pub struct AnalysisClient {
    http: reqwest::Client,
    config: AnalysisConfig,
}

impl AnalysisClient {
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| TempoError::NetworkFailure(e.to_string()))?;
        Ok(Self { http, config })
    }

    pub fn with_client(http: reqwest::Client, config: AnalysisConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Upload the raw file as multipart field `file` and read back
    /// `{success, bpm, duration, offset}`.
    pub async fn analyze(&self, file_name: &str, bytes: Vec<u8>) -> Result<TempoInfo> {
        let url = self.config.endpoint();
        let part = Part::bytes(bytes).file_name(file_name.to_string());
        let form = Form::new().part("file", part);

        let res = self
            .http
            .post(&url)
            .timeout(self.config.timeout())
            .multipart(form)
            .send()
            .await
            .map_err(|e| TempoError::NetworkFailure(format!("{url}: {e}")))?;

        let status = res.status();
        if !status.is_success() {
            return Err(TempoError::NetworkFailure(format!("{url} answered {status}")));
        }

        let body: ServiceResponse = res
            .json()
            .await
            .map_err(|e| TempoError::NetworkFailure(format!("bad response body: {e}")))?;
        body.into_info()
    }
}

/// The analysis client behind a gate: one request in flight, extra requests
/// dropped, failures resolved against the caller's hint.
#[derive(Debug)]
pub struct TempoAnalyzer {
    client: AnalysisClient,
    gate: AnalysisGate,
}

impl TempoAnalyzer {
    pub fn new(client: AnalysisClient) -> Self {
        Self {
            client,
            gate: AnalysisGate::new(),
        }
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self::new(AnalysisClient::new(AnalysisConfig::from_env())?))
    }

    pub fn is_busy(&self) -> bool {
        self.gate.is_busy()
    }

    /// `Ok(None)` means another analysis was already running and this one
    /// was skipped.
    pub async fn analyze(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        hint: Option<TempoHint>,
    ) -> Result<Option<AnalysisOutcome>> {
        let Some(_guard) = self.gate.try_enter() else {
            log::warn!("⏳ Analysis already running, skipping {}", file_name);
            return Ok(None);
        };

        log::info!("🎵 Analyzing {} ({} bytes)", file_name, bytes.len());
        let result = self.client.analyze(file_name, bytes).await;
        let outcome = resolve(result, hint)?;
        let info = outcome.info();
        log::info!(
            "✅ {}: {} BPM, offset {:.3}s, {:.1}s long{}",
            file_name,
            info.bpm,
            info.offset,
            info.duration,
            if outcome.is_fallback() { " (fallback)" } else { "" }
        );
        Ok(Some(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;

    const HINT: TempoHint = TempoHint { bpm: 101.0, duration: 64.0 };

    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let header_end = loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break buf.len();
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
        let content_length = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok());
        let chunked = head.contains("transfer-encoding: chunked");

        loop {
            let body = &buf[header_end..];
            let done = match content_length {
                Some(len) => body.len() >= len,
                None if chunked => body.ends_with(b"0\r\n\r\n"),
                None => true,
            };
            if done {
                break;
            }
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
        let reply = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(reply.as_bytes()).await.unwrap();
        stream.shutdown().await.ok();
    }

    /// Answers one request, optionally waiting for `release` first, and hands
    /// back the raw request text.
    async fn serve_once(
        status: &'static str,
        body: &'static str,
        release: Option<oneshot::Receiver<()>>,
    ) -> (SocketAddr, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_request(&mut stream).await;
            if let Some(rx) = release {
                rx.await.ok();
            }
            respond(&mut stream, status, body).await;
            request
        });
        (addr, handle)
    }

    fn client_for(addr: SocketAddr) -> AnalysisClient {
        let http = reqwest::Client::builder().no_proxy().build().unwrap();
        let config = AnalysisConfig {
            base_url: format!("http://{addr}"),
            timeout_secs: 5,
        };
        AnalysisClient::with_client(http, config)
    }

    #[tokio::test]
    async fn uploads_file_and_rounds_bpm() {
        let (addr, server) = serve_once(
            "200 OK",
            r#"{"success":true,"bpm":127.6,"duration":200.5,"offset":0.42}"#,
            None,
        )
        .await;

        let info = client_for(addr).analyze("song.mp3", vec![1, 2, 3, 4]).await.unwrap();
        assert_eq!(info, TempoInfo { bpm: 128.0, duration: 200.5, offset: 0.42 });

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/analyze-audio"));
        assert!(request.contains(r#"name="file""#));
        assert!(request.contains(r#"filename="song.mp3""#));
    }

    #[tokio::test]
    async fn reported_failure_falls_back_to_hint() {
        let (addr, _server) = serve_once("200 OK", r#"{"success":false,"error":"too short"}"#, None).await;
        let analyzer = TempoAnalyzer::new(client_for(addr));

        let outcome = analyzer.analyze("a.wav", vec![0; 16], Some(HINT)).await.unwrap().unwrap();
        assert_eq!(outcome, AnalysisOutcome::Fallback(TempoInfo { bpm: 101.0, duration: 64.0, offset: 0.1 }));
    }

    #[tokio::test]
    async fn server_error_without_hint_is_network_failure() {
        let (addr, _server) = serve_once("500 Internal Server Error", r#"{"error":"boom"}"#, None).await;
        let err = client_for(addr).analyze("a.wav", vec![0; 16]).await.unwrap_err();
        assert!(matches!(err, TempoError::NetworkFailure(_)));
    }

    #[tokio::test]
    async fn missing_fields_are_rejected() {
        let (addr, _server) = serve_once("200 OK", r#"{"success":true,"bpm":120.0}"#, None).await;
        let err = client_for(addr).analyze("a.wav", vec![0; 16]).await.unwrap_err();
        assert!(matches!(err, TempoError::NetworkFailure(msg) if msg.contains("duration")));
    }

    #[tokio::test]
    async fn unreachable_service_falls_back() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let analyzer = TempoAnalyzer::new(client_for(addr));
        let outcome = analyzer.analyze("a.wav", vec![0; 16], Some(HINT)).await.unwrap().unwrap();
        assert!(outcome.is_fallback());
        assert_eq!(outcome.info().offset, 0.1);

        let err = analyzer.analyze("a.wav", vec![0; 16], None).await.unwrap_err();
        assert!(matches!(err, TempoError::NetworkFailure(_)));
        assert!(!analyzer.is_busy());
    }

    #[tokio::test]
    async fn concurrent_request_is_skipped() {
        let (release_tx, release_rx) = oneshot::channel();
        let (addr, _server) = serve_once(
            "200 OK",
            r#"{"success":true,"bpm":90.2,"duration":30.0,"offset":0.0}"#,
            Some(release_rx),
        )
        .await;
        let analyzer = Arc::new(TempoAnalyzer::new(client_for(addr)));

        let first = {
            let analyzer = analyzer.clone();
            tokio::spawn(async move { analyzer.analyze("a.wav", vec![7; 64], None).await })
        };
        while !analyzer.is_busy() {
            tokio::task::yield_now().await;
        }

        let second = analyzer.analyze("b.wav", vec![7; 64], Some(HINT)).await.unwrap();
        assert!(second.is_none());

        release_tx.send(()).unwrap();
        let outcome = first.await.unwrap().unwrap().unwrap();
        assert_eq!(outcome, AnalysisOutcome::Analyzed(TempoInfo { bpm: 90.0, duration: 30.0, offset: 0.0 }));
        assert!(!analyzer.is_busy());
    }
}
