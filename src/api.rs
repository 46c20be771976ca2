use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const AUTH_STATUS_PATH: &str = "/api/auth/status";
pub const AUTH_VALIDATE_PATH: &str = "/api/auth/validate";
pub const PROJECTS_PATH: &str = "/api/wiki/projects";

/// Minimal JSON-over-HTTP seam so the launcher can be exercised without a server.
///
/// Implementations must report non-success statuses as errors.
pub trait ApiHttp {
    fn get_json(&self, url: &str) -> Result<Value>;
    fn post_json(&self, url: &str, body: &Value) -> Result<Value>;
}

impl<T: ApiHttp + ?Sized> ApiHttp for &T {
    fn get_json(&self, url: &str) -> Result<Value> {
        (**self).get_json(url)
    }

    fn post_json(&self, url: &str, body: &Value) -> Result<Value> {
        (**self).post_json(url, body)
    }
}

pub struct BlockingApiHttp {
    client: Client,
}

impl BlockingApiHttp {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("deepwiki-launcher/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client })
    }
}

impl ApiHttp for BlockingApiHttp {
    fn get_json(&self, url: &str) -> Result<Value> {
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("Failed to reach {url}"))?;
        if !response.status().is_success() {
            bail!("{url} returned status {}", response.status());
        }
        response
            .json()
            .with_context(|| format!("{url} returned non-JSON payload"))
    }

    fn post_json(&self, url: &str, body: &Value) -> Result<Value> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .with_context(|| format!("Failed to post to {url}"))?;
        if !response.status().is_success() {
            bail!("{url} returned status {}", response.status());
        }
        response
            .json()
            .with_context(|| format!("{url} returned non-JSON payload"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct AuthStatus {
    pub auth_required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CodeValidation {
    #[serde(default)]
    pub success: bool,
}

/// A wiki the backend has already generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedProject {
    pub id: String,
    pub owner: String,
    pub repo: String,
    pub name: String,
    pub repo_type: String,
    /// Milliseconds since the Unix epoch.
    #[serde(rename = "submittedAt")]
    pub submitted_at: i64,
    pub language: String,
}

impl ProcessedProject {
    pub fn submitted_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp_millis(self.submitted_at)
    }
}

/// Typed access to the wiki backend endpoints the launcher consumes.
pub struct ApiClient<H> {
    origin: String,
    http: H,
}

impl<H: ApiHttp> ApiClient<H> {
    pub fn new(origin: &str, http: H) -> Self {
        Self {
            origin: origin.trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn http(&self) -> &H {
        &self.http
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.origin, path)
    }

    pub fn auth_status(&self) -> Result<AuthStatus> {
        let url = self.endpoint(AUTH_STATUS_PATH);
        let value = self.http.get_json(&url)?;
        serde_json::from_value(value).context("Malformed auth status response")
    }

    pub fn validate_code(&self, code: &str) -> Result<CodeValidation> {
        let url = self.endpoint(AUTH_VALIDATE_PATH);
        let value = self.http.post_json(&url, &json!({ "code": code }))?;
        serde_json::from_value(value).context("Malformed auth validation response")
    }

    pub fn list_projects(&self) -> Result<Vec<ProcessedProject>> {
        let url = self.endpoint(PROJECTS_PATH);
        let value = self.http.get_json(&url)?;
        if let Some(error) = value.get("error") {
            let message = error
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            bail!("Failed to fetch projects: {message}");
        }
        serde_json::from_value(value).context("Malformed project listing response")
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;
    use std::collections::HashMap;

    use super::*;

    #[derive(Debug, Clone)]
    pub struct StubCall {
        pub url: String,
        pub body: Option<Value>,
    }

    /// Canned responses keyed by URL; URLs without a stub fail like a transport error.
    #[derive(Default)]
    pub struct StubApiHttp {
        responses: RefCell<HashMap<String, Value>>,
        calls: RefCell<Vec<StubCall>>,
    }

    impl StubApiHttp {
        pub fn new(entries: Vec<(&str, Value)>) -> Self {
            let map = entries
                .into_iter()
                .map(|(url, value)| (url.to_string(), value))
                .collect();
            Self {
                responses: RefCell::new(map),
                calls: RefCell::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> Vec<StubCall> {
            self.calls.borrow().clone()
        }

        fn respond(&self, url: &str, body: Option<&Value>) -> Result<Value> {
            self.calls.borrow_mut().push(StubCall {
                url: url.to_string(),
                body: body.cloned(),
            });
            self.responses
                .borrow()
                .get(url)
                .cloned()
                .with_context(|| format!("no stub for {url}"))
        }
    }

    impl ApiHttp for StubApiHttp {
        fn get_json(&self, url: &str) -> Result<Value> {
            self.respond(url, None)
        }

        fn post_json(&self, url: &str, body: &Value) -> Result<Value> {
            self.respond(url, Some(body))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    use super::testing::StubApiHttp;
    use super::*;
    use crate::auth;

    const ORIGIN: &str = "http://wiki.test";

    /// Answer exactly one request with `status` and a JSON `body`.
    fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let origin = format!("http://{}", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut content_length = 0;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line.is_empty() || line == "\r\n" {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap();
                    }
                }
            }
            let mut request_body = vec![0; content_length];
            reader.read_exact(&mut request_body).unwrap();
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).unwrap();
        });
        (origin, handle)
    }

    fn blocking_http() -> BlockingApiHttp {
        BlockingApiHttp::new(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn server_error_rejects_code_even_with_success_body() {
        let http = blocking_http();

        let (origin, server) = serve_once("500 Internal Server Error", r#"{"success":true}"#);
        let err = ApiClient::new(&origin, &http)
            .validate_code("letmein")
            .unwrap_err();
        assert!(err.to_string().contains("500"), "{err}");
        server.join().unwrap();

        let (origin, server) = serve_once("500 Internal Server Error", r#"{"success":true}"#);
        assert!(!auth::check(&ApiClient::new(&origin, &http), true, "letmein"));
        server.join().unwrap();
    }

    #[test]
    fn server_error_on_status_requires_code() {
        let http = blocking_http();

        let (origin, server) = serve_once("503 Service Unavailable", r#"{"auth_required":false}"#);
        let err = ApiClient::new(&origin, &http).auth_status().unwrap_err();
        assert!(err.to_string().contains("503"), "{err}");
        server.join().unwrap();

        let (origin, server) = serve_once("503 Service Unavailable", r#"{"auth_required":false}"#);
        assert!(auth::fetch_auth_required(&ApiClient::new(&origin, &http)));
        server.join().unwrap();
    }

    #[test]
    fn success_status_is_decoded_by_blocking_client() {
        let http = blocking_http();
        let (origin, server) = serve_once("200 OK", r#"{"success":true}"#);
        assert!(auth::check(&ApiClient::new(&origin, &http), true, "letmein"));
        server.join().unwrap();
    }

    #[test]
    fn auth_status_reads_flag() {
        let stub = StubApiHttp::new(vec![(
            "http://wiki.test/api/auth/status",
            json!({"auth_required": true}),
        )]);
        let client = ApiClient::new("http://wiki.test/", &stub);
        assert!(client.auth_status().unwrap().auth_required);
        assert_eq!(stub.calls()[0].url, "http://wiki.test/api/auth/status");
    }

    #[test]
    fn auth_status_without_flag_is_malformed() {
        let stub = StubApiHttp::new(vec![("http://wiki.test/api/auth/status", json!({}))]);
        let client = ApiClient::new(ORIGIN, &stub);
        assert!(client.auth_status().is_err());
    }

    #[test]
    fn validate_posts_code_and_defaults_success() {
        let stub = StubApiHttp::new(vec![("http://wiki.test/api/auth/validate", json!({}))]);
        let client = ApiClient::new(ORIGIN, &stub);
        let validation = client.validate_code("s3cret").unwrap();
        assert!(!validation.success);
        let calls = stub.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].body, Some(json!({"code": "s3cret"})));
    }

    #[test]
    fn list_projects_parses_records() {
        let stub = StubApiHttp::new(vec![(
            "http://wiki.test/api/wiki/projects",
            json!([{
                "id": "github_a_b_en",
                "owner": "a",
                "repo": "b",
                "name": "a/b",
                "repo_type": "github",
                "submittedAt": 1_700_000_000_000_i64,
                "language": "en"
            }]),
        )]);
        let client = ApiClient::new(ORIGIN, &stub);
        let projects = client.list_projects().unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].name, "a/b");
        assert_eq!(
            projects[0].submitted_at_utc().unwrap().to_rfc3339(),
            "2023-11-14T22:13:20+00:00"
        );
    }

    #[test]
    fn list_projects_surfaces_error_field() {
        let stub = StubApiHttp::new(vec![(
            "http://wiki.test/api/wiki/projects",
            json!({"error": "cache directory missing"}),
        )]);
        let client = ApiClient::new(ORIGIN, &stub);
        let err = client.list_projects().unwrap_err();
        assert!(err.to_string().contains("cache directory missing"));
    }
}
