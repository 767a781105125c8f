use std::fmt;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;

use crate::endpoints::Endpoint;
use crate::error::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://webservices.iso-ne.com/api/v1.1";

/// Username and password for the web services API, passed through to the transport as-is.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn as_pair(&self) -> (&str, &str) {
        (&self.username, &self.password)
    }
}

impl From<(String, String)> for Credentials {
    fn from((username, password): (String, String)) -> Self {
        Self::new(username, password)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Performs one GET for a path and hands back the decoded JSON body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get_json(&self, path: &str, credentials: &Credentials) -> anyhow::Result<Value>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_json(&self, path: &str, credentials: &Credentials) -> anyhow::Result<Value> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        let (username, password) = credentials.as_pair();

        tracing::debug!("ISO-NE request: {url}");
        let resp = self
            .client
            .get(&url)
            .basic_auth(username, Some(password))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(anyhow!("ISO-NE API returned status {}", resp.status()));
        }
        let body = resp.text().await?;
        tracing::trace!("ISO-NE response: {} bytes", body.len());
        Ok(serde_json::from_str(&body)?)
    }
}

/// What to do when some endpoints of a multi-endpoint request fail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PartialPolicy {
    /// Any failure fails the whole request.
    #[default]
    Atomic,
    /// Failed endpoints are logged and skipped; fails only if nothing came back.
    BestEffort,
}

/// Fetches a single endpoint. No retries.
pub async fn fetch(
    transport: &dyn Transport,
    endpoint: &Endpoint,
    credentials: &Credentials,
    timeout: Option<Duration>,
) -> Result<Value> {
    let request = transport.get_json(endpoint.as_str(), credentials);
    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, request).await {
            Ok(outcome) => outcome,
            Err(_) => Err(anyhow!("timed out after {}ms", limit.as_millis())),
        },
        None => request.await,
    };

    outcome.map_err(|source| Error::FetchFailed {
        endpoint: endpoint.clone(),
        source,
    })
}

/// Upper bound on simultaneous requests when a call spans many days.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;

/// How a multi-endpoint request is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchSettings {
    pub policy: PartialPolicy,
    pub timeout: Option<Duration>,
    pub max_in_flight: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            policy: PartialPolicy::Atomic,
            timeout: None,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

/// Fetches the endpoints with at most `settings.max_in_flight` requests outstanding
/// and returns the documents in endpoint order, whatever order the responses arrive in.
pub async fn fetch_all(
    transport: &dyn Transport,
    endpoints: &[Endpoint],
    credentials: &Credentials,
    settings: FetchSettings,
) -> Result<Vec<(Endpoint, Value)>> {
    let mut pending = stream::iter(endpoints.iter().enumerate())
        .map(|(index, endpoint)| async move {
            (
                index,
                fetch(transport, endpoint, credentials, settings.timeout).await,
            )
        })
        .buffer_unordered(settings.max_in_flight.max(1));

    let mut fetched = Vec::with_capacity(endpoints.len());
    let mut last_error = None;
    while let Some((index, result)) = pending.next().await {
        match (result, settings.policy) {
            (Ok(document), _) => fetched.push((index, document)),
            (Err(e), PartialPolicy::Atomic) => return Err(e),
            (Err(e), PartialPolicy::BestEffort) => {
                tracing::warn!("Skipping {}: {e:#}", endpoints[index]);
                last_error = Some(e);
            }
        }
    }

    if fetched.is_empty() {
        if let Some(e) = last_error {
            return Err(e);
        }
    }

    fetched.sort_by_key(|(index, _)| *index);
    tracing::info!(
        "Fetched {}/{} ISO-NE documents",
        fetched.len(),
        endpoints.len()
    );
    Ok(fetched
        .into_iter()
        .map(|(index, document)| (endpoints[index].clone(), document))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers each path with its index, after a delay that makes earlier paths arrive last.
    struct ScrambledTransport {
        delays_ms: HashMap<String, u64>,
        failing: Vec<String>,
    }

    #[async_trait]
    impl Transport for ScrambledTransport {
        async fn get_json(&self, path: &str, _credentials: &Credentials) -> anyhow::Result<Value> {
            let delay = self.delays_ms.get(path).copied().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            if self.failing.iter().any(|p| p == path) {
                return Err(anyhow!("503 Service Unavailable"));
            }
            Ok(json!({ "path": path }))
        }
    }

    fn endpoints(n: usize) -> Vec<Endpoint> {
        (0..n)
            .map(|i| Endpoint::new(format!("/fiveminutesystemload/day/2015061{i}.json")))
            .collect()
    }

    fn scrambled(endpoints: &[Endpoint], failing: &[usize]) -> ScrambledTransport {
        let n = endpoints.len() as u64;
        ScrambledTransport {
            delays_ms: endpoints
                .iter()
                .enumerate()
                .map(|(i, e)| (e.to_string(), (n - i as u64) * 20))
                .collect(),
            failing: failing.iter().map(|&i| endpoints[i].to_string()).collect(),
        }
    }

    fn creds() -> Credentials {
        Credentials::new("user", "secret")
    }

    fn settings(policy: PartialPolicy) -> FetchSettings {
        FetchSettings {
            policy,
            ..FetchSettings::default()
        }
    }

    /// Tracks how many requests are outstanding at once.
    #[derive(Default)]
    struct CountingTransport {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Transport for CountingTransport {
        async fn get_json(&self, path: &str, _credentials: &Credentials) -> anyhow::Result<Value> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(json!({ "path": path }))
        }
    }

    #[tokio::test]
    async fn results_come_back_in_endpoint_order() {
        let eps = endpoints(4);
        let transport = scrambled(&eps, &[]);

        let docs = fetch_all(&transport, &eps, &creds(), settings(PartialPolicy::Atomic))
            .await
            .unwrap();

        let paths: Vec<_> = docs.iter().map(|(e, _)| e.clone()).collect();
        assert_eq!(paths, eps);
        for (endpoint, doc) in &docs {
            assert_eq!(doc["path"], endpoint.as_str());
        }
    }

    #[tokio::test]
    async fn atomic_policy_fails_whole_request() {
        let eps = endpoints(3);
        let transport = scrambled(&eps, &[1]);

        let err = fetch_all(&transport, &eps, &creds(), settings(PartialPolicy::Atomic))
            .await
            .unwrap_err();
        match err {
            Error::FetchFailed { endpoint, .. } => assert_eq!(endpoint, eps[1]),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn best_effort_skips_failures() {
        let eps = endpoints(3);
        let transport = scrambled(&eps, &[1]);

        let docs = fetch_all(&transport, &eps, &creds(), settings(PartialPolicy::BestEffort))
            .await
            .unwrap();
        let paths: Vec<_> = docs.into_iter().map(|(e, _)| e).collect();
        assert_eq!(paths, vec![eps[0].clone(), eps[2].clone()]);
    }

    #[tokio::test]
    async fn best_effort_still_fails_when_nothing_arrives() {
        let eps = endpoints(2);
        let transport = scrambled(&eps, &[0, 1]);

        let result = fetch_all(&transport, &eps, &creds(), settings(PartialPolicy::BestEffort)).await;
        assert!(matches!(result, Err(Error::FetchFailed { .. })));
    }

    #[tokio::test]
    async fn timeout_is_a_fetch_failure() {
        let eps = endpoints(1);
        let transport = ScrambledTransport {
            delays_ms: HashMap::from([(eps[0].to_string(), 500)]),
            failing: vec![],
        };

        let err = fetch(&transport, &eps[0], &creds(), Some(Duration::from_millis(10)))
            .await
            .unwrap_err();
        match err {
            Error::FetchFailed { source, .. } => assert!(source.to_string().contains("timed out")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn in_flight_requests_are_capped() {
        let eps: Vec<_> = (0..40)
            .map(|i| Endpoint::new(format!("/fiveminutesystemload/day/201501{i:02}.json")))
            .collect();
        let transport = CountingTransport::default();
        let settings = FetchSettings {
            max_in_flight: 3,
            ..FetchSettings::default()
        };

        let docs = fetch_all(&transport, &eps, &creds(), settings).await.unwrap();

        assert_eq!(docs.len(), 40);
        assert_eq!(transport.peak.load(Ordering::SeqCst), 3);
        assert_eq!(transport.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn zero_cap_still_makes_progress() {
        let eps = endpoints(3);
        let transport = CountingTransport::default();
        let settings = FetchSettings {
            max_in_flight: 0,
            ..FetchSettings::default()
        };

        let docs = fetch_all(&transport, &eps, &creds(), settings).await.unwrap();

        assert_eq!(docs.len(), 3);
        assert_eq!(transport.peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials::from(("user".to_string(), "hunter2".to_string()));
        assert_eq!(creds.as_pair(), ("user", "hunter2"));
        assert!(!format!("{creds:?}").contains("hunter2"));
    }
}
