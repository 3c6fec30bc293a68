//! Delivery of packets to the reporting backend
//!
//! [`Transport`] is the seam between the reporter and the network. The
//! reporter never awaits a transport on the request path and never retries.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Url};

use super::packet::Packet;
use crate::{FaultlineError, Result};

/// Sentry protocol version spoken by [`HttpTransport`]
const SENTRY_VERSION: u32 = 7;

/// Submission timeout for [`HttpTransport`]
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Delivers packets to the reporting backend
#[async_trait]
pub trait Transport: Send + Sync {
    /// Submit one packet
    async fn send(&self, packet: &Packet) -> Result<()>;
}

/// Transport that discards every packet
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTransport;

#[async_trait]
impl Transport for NoopTransport {
    async fn send(&self, packet: &Packet) -> Result<()> {
        tracing::debug!(event_id = %packet.event_id, "discarding error report");
        Ok(())
    }
}

/// Parsed Sentry DSN: `{scheme}://{public_key}[:{secret_key}]@{host}[:{port}]/{path}/{project_id}`
#[derive(Clone, PartialEq, Eq)]
pub struct Dsn {
    scheme: String,
    public_key: String,
    secret_key: Option<String>,
    host: String,
    port: Option<u16>,
    path: String,
    project_id: String,
}

impl Dsn {
    /// Parse a DSN string
    pub fn parse(dsn: &str) -> Result<Self> {
        let url = Url::parse(dsn).map_err(|e| FaultlineError::InvalidDsn(e.to_string()))?;

        let scheme = url.scheme().to_string();
        if scheme != "http" && scheme != "https" {
            return Err(FaultlineError::InvalidDsn(format!("unsupported scheme: {}", scheme)));
        }

        let public_key = url.username().to_string();
        if public_key.is_empty() {
            return Err(FaultlineError::InvalidDsn("missing public key".to_string()));
        }

        let host = url
            .host_str()
            .ok_or_else(|| FaultlineError::InvalidDsn("missing host".to_string()))?
            .to_string();

        let full_path = url.path().trim_end_matches('/');
        let (path, project_id) = match full_path.rsplit_once('/') {
            Some((path, id)) if !id.is_empty() => (path.to_string(), id.to_string()),
            _ => return Err(FaultlineError::InvalidDsn("missing project id".to_string())),
        };

        Ok(Self {
            scheme,
            public_key,
            secret_key: url.password().map(str::to_string),
            host,
            port: url.port(),
            path,
            project_id,
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Endpoint events are posted to
    pub fn store_url(&self) -> String {
        let port = self.port.map(|p| format!(":{}", p)).unwrap_or_default();
        format!(
            "{}://{}{}{}/api/{}/store/",
            self.scheme, self.host, port, self.path, self.project_id
        )
    }

    /// Value of the `X-Sentry-Auth` header
    pub fn auth_header(&self, client: &str, timestamp: i64) -> String {
        let mut header = format!(
            "Sentry sentry_version={}, sentry_client={}, sentry_timestamp={}, sentry_key={}",
            SENTRY_VERSION, client, timestamp, self.public_key
        );
        if let Some(secret) = &self.secret_key {
            header.push_str(&format!(", sentry_secret={}", secret));
        }
        header
    }
}

impl FromStr for Dsn {
    type Err = FaultlineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Debug for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dsn")
            .field("host", &self.host)
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

/// Posts packets to a Sentry store endpoint
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    dsn: Dsn,
}

impl HttpTransport {
    /// Create a transport for `dsn`
    pub fn new(dsn: Dsn) -> Result<Self> {
        let client = Client::builder()
            .timeout(SUBMIT_TIMEOUT)
            .user_agent(client_name())
            .build()?;

        Ok(Self { client, dsn })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, packet: &Packet) -> Result<()> {
        let auth = self.dsn.auth_header(&client_name(), Utc::now().timestamp());

        let response = self
            .client
            .post(self.dsn.store_url())
            .header("X-Sentry-Auth", auth)
            .json(packet)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FaultlineError::Transport(format!(
                "Sentry rejected event {}: {}",
                packet.event_id, status
            )));
        }

        tracing::debug!(event_id = %packet.event_id, "error report delivered");
        Ok(())
    }
}

fn client_name() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}
