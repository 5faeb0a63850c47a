use crate::budget::NotificationPayload;
use crate::error::AppError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

#[async_trait]
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, payload: &NotificationPayload) -> Result<(), AppError>;
}

pub struct WebhookSink {
    client: Client,
    url: Url,
    token: Option<String>,
}

impl WebhookSink {
    pub fn new(url: Url, token: Option<String>, timeout_seconds: u64) -> Result<Self, AppError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(timeout_seconds.max(1)))
            .build()?;
        Ok(Self { client, url, token })
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, payload: &NotificationPayload) -> Result<(), AppError> {
        let mut req = self.client.post(self.url.clone()).json(payload);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req.send().await?.error_for_status()?;
        Ok(())
    }
}

pub struct StdoutSink;

#[async_trait]
impl AlertSink for StdoutSink {
    fn name(&self) -> &'static str {
        "stdout"
    }

    async fn send(&self, payload: &NotificationPayload) -> Result<(), AppError> {
        println!("{}", serde_json::to_string(payload)?);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryReport {
    pub alert_name: String,
    pub recipient: String,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// a failed delivery does not stop the rest
pub async fn deliver_all(
    sink: &dyn AlertSink,
    payloads: &[NotificationPayload],
) -> Vec<DeliveryReport> {
    let mut reports = Vec::with_capacity(payloads.len());
    for payload in payloads {
        let outcome = sink.send(payload).await;
        let error = match outcome {
            Ok(()) => {
                info!(sink = sink.name(), alert = %payload.alert_name, "alert delivered");
                None
            }
            Err(e) => {
                warn!(sink = sink.name(), alert = %payload.alert_name, error = %e, "alert delivery failed");
                Some(e.to_string())
            }
        };
        reports.push(DeliveryReport {
            alert_name: payload.alert_name.clone(),
            recipient: payload.recipient_email.clone(),
            delivered: error.is_none(),
            error,
        });
    }
    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::{AlertStatus, PeriodType};
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn payload(name: &str) -> NotificationPayload {
        NotificationPayload {
            alert_name: name.to_string(),
            recipient_email: "devops-lead@company.com".into(),
            threshold: 1000.0,
            current_amount: 1200.0,
            period_type: PeriodType::Monthly,
            status: AlertStatus::Exceeded,
            filter_team: Some("DevOps".into()),
            filter_service: None,
            filter_environment: None,
        }
    }

    struct FlakySink {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AlertSink for FlakySink {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn send(&self, payload: &NotificationPayload) -> Result<(), AppError> {
            self.seen
                .lock()
                .expect("lock")
                .push(payload.alert_name.clone());
            if payload.alert_name.starts_with("fail") {
                return Err(AppError::Notify("endpoint rejected payload".into()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn deliver_all_continues_after_failure() {
        let sink = FlakySink {
            seen: Mutex::new(vec![]),
        };
        let reports = deliver_all(&sink, &[payload("fail first"), payload("second")]).await;

        assert_eq!(reports.len(), 2);
        assert!(!reports[0].delivered);
        assert!(reports[0]
            .error
            .as_deref()
            .is_some_and(|e| e.contains("endpoint rejected")));
        assert!(reports[1].delivered);
        assert_eq!(
            *sink.seen.lock().expect("lock"),
            vec!["fail first".to_string(), "second".to_string()]
        );
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.expect("read");
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(split) = text.find("\r\n\r\n") {
                let length = text[..split]
                    .lines()
                    .find_map(|l| {
                        let lower = l.to_ascii_lowercase();
                        lower
                            .strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                    })
                    .unwrap_or(0);
                if buf.len() >= split + 4 + length {
                    return text;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    #[tokio::test]
    async fn webhook_posts_camel_case_json_with_bearer_token() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let request = read_request(&mut socket).await;
            socket
                .write_all(b"HTTP/1.1 204 No Content\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await
                .expect("respond");
            request
        });

        let url = Url::parse(&format!("http://{addr}/alerts")).expect("url");
        let sink = WebhookSink::new(url, Some("s3cret".into()), 5).expect("sink");
        sink.send(&payload("DevOps budget")).await.expect("delivered");

        let request = server.await.expect("server task");
        assert!(request.starts_with("POST /alerts"));
        assert!(request
            .to_ascii_lowercase()
            .contains("authorization: bearer s3cret"));
        assert!(request.contains("\"alertName\":\"DevOps budget\""));
        assert!(request.contains("\"filterTeam\":\"DevOps\""));
        assert!(!request.contains("filterService"));
    }

    #[tokio::test]
    async fn webhook_error_status_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let _ = read_request(&mut socket).await;
            let _ = socket
                .write_all(b"HTTP/1.1 500 Internal Server Error\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await;
        });

        let url = Url::parse(&format!("http://{addr}/alerts")).expect("url");
        let sink = WebhookSink::new(url, None, 5).expect("sink");
        let err = sink
            .send(&payload("DevOps budget"))
            .await
            .expect_err("server error");
        assert!(matches!(err, AppError::Http(_)));
    }
}
