//! Prometheus instant-query client

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use url::Url;

/// Queries issued on every observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromQueries {
    /// Node CPU power in watts, one series per `instance`
    #[serde(default = "default_node_power")]
    pub node_power: String,
    /// Node CPU utilisation ratio, one series per `instance`
    #[serde(default = "default_node_cpu_util")]
    pub node_cpu_util: String,
    /// Node memory utilisation ratio, one series per `instance`
    #[serde(default = "default_node_mem_util")]
    pub node_mem_util: String,
    /// Pod CPU usage in cores, one series per `namespace`/`pod`
    #[serde(default = "default_pod_cpu")]
    pub pod_cpu: String,
    /// Total kube-system CPU usage in cores
    #[serde(default = "default_system_cpu")]
    pub system_cpu: String,
}

fn default_node_power() -> String {
    "sum by (instance) (kepler_node_cpu_watts)".to_string()
}

fn default_node_cpu_util() -> String {
    "instance:node_cpu_utilisation:ratio5m".to_string()
}

fn default_node_mem_util() -> String {
    "instance:node_memory_utilisation:ratio".to_string()
}

fn default_pod_cpu() -> String {
    r#"sum by (namespace, pod) (rate(container_cpu_usage_seconds_total{image!=""}[5m]))"#.to_string()
}

fn default_system_cpu() -> String {
    r#"sum(rate(container_cpu_usage_seconds_total{namespace="kube-system"}[5m]))"#.to_string()
}

impl Default for PromQueries {
    fn default() -> Self {
        Self {
            node_power: default_node_power(),
            node_cpu_util: default_node_cpu_util(),
            node_mem_util: default_node_mem_util(),
            pod_cpu: default_pod_cpu(),
            system_cpu: default_system_cpu(),
        }
    }
}

/// One series of an instant vector
#[derive(Debug, Clone, PartialEq)]
pub struct PromSample {
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(rename = "resultType")]
    result_type: String,
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct VectorSeries {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    value: (f64, String),
}

/// Minimal client for `/api/v1/query`
#[derive(Clone)]
pub struct PromClient {
    client: Client,
    base_url: Url,
}

impl PromClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        // Relative joins keep a path prefix only when the base ends in '/'
        let base_url = if base_url.ends_with('/') {
            Url::parse(base_url)
        } else {
            Url::parse(&format!("{}/", base_url))
        }
        .context("Invalid Prometheus URL")?;
        Ok(Self { client, base_url })
    }

    /// Run an instant query and return its series
    pub async fn query(&self, query: &str) -> Result<Vec<PromSample>> {
        let url = self
            .base_url
            .join("api/v1/query")
            .context("Invalid Prometheus URL")?;

        let response = self
            .client
            .get(url)
            .query(&[("query", query)])
            .send()
            .await
            .with_context(|| format!("Prometheus query failed: {}", query))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Prometheus error ({}): {}", status, body);
        }

        let body = response
            .text()
            .await
            .context("Failed to read Prometheus response")?;
        parse_response(&body).with_context(|| format!("Bad response for query: {}", query))
    }
}

/// Decode a query response into samples
///
/// Vector results yield one sample per series. Scalar results yield one
/// unlabelled sample. Values that are not numbers become NaN.
pub(crate) fn parse_response(body: &str) -> Result<Vec<PromSample>> {
    let response: QueryResponse =
        serde_json::from_str(body).context("Response is not valid JSON")?;
    if response.status != "success" {
        anyhow::bail!(
            "Query status {}: {}",
            response.status,
            response.error.unwrap_or_default()
        );
    }
    let Some(data) = response.data else {
        return Ok(Vec::new());
    };

    match data.result_type.as_str() {
        "vector" => {
            let series: Vec<VectorSeries> = serde_json::from_value(data.result)?;
            Ok(series
                .into_iter()
                .map(|s| PromSample {
                    labels: s.metric,
                    value: parse_value(&s.value.1),
                })
                .collect())
        }
        "scalar" => {
            let (_, value): (f64, String) = serde_json::from_value(data.result)?;
            Ok(vec![PromSample {
                labels: BTreeMap::new(),
                value: parse_value(&value),
            }])
        }
        other => anyhow::bail!("Unsupported result type {}", other),
    }
}

fn parse_value(raw: &str) -> f64 {
    raw.parse().unwrap_or(f64::NAN)
}

/// Strip a trailing `:port` from an instance label
pub(crate) fn strip_port(instance: &str) -> &str {
    match instance.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => host,
        _ => instance,
    }
}

/// Index samples by their `instance` label with any port removed
pub(crate) fn by_instance(samples: &[PromSample]) -> HashMap<String, f64> {
    samples
        .iter()
        .filter_map(|s| {
            s.labels
                .get("instance")
                .map(|i| (strip_port(i).to_string(), s.value))
        })
        .collect()
}

/// Index samples by `namespace/pod`
pub(crate) fn by_pod(samples: &[PromSample]) -> HashMap<String, f64> {
    samples
        .iter()
        .filter_map(|s| {
            let namespace = s.labels.get("namespace")?;
            let pod = s.labels.get("pod")?;
            Some((format!("{}/{}", namespace, pod), s.value))
        })
        .collect()
}

/// Value of a single-series result, if any
pub(crate) fn scalar(samples: &[PromSample]) -> Option<f64> {
    samples.first().map(|s| s.value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VECTOR: &str = r#"{
        "status": "success",
        "data": {
            "resultType": "vector",
            "result": [
                {"metric": {"instance": "10.0.0.1:9100"}, "value": [1717000000.5, "41.5"]},
                {"metric": {"instance": "worker-2"}, "value": [1717000000.5, "NaN"]}
            ]
        }
    }"#;

    #[test]
    fn test_parse_vector() {
        let samples = parse_response(VECTOR).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].value, 41.5);
        assert!(samples[1].value.is_nan());

        let by = by_instance(&samples);
        assert_eq!(by["10.0.0.1"], 41.5);
        assert!(by.contains_key("worker-2"));
    }

    #[test]
    fn test_parse_scalar_and_empty() {
        let body = r#"{"status":"success","data":{"resultType":"scalar","result":[1.0,"0.75"]}}"#;
        assert_eq!(scalar(&parse_response(body).unwrap()), Some(0.75));

        let body = r#"{"status":"success","data":{"resultType":"vector","result":[]}}"#;
        assert_eq!(scalar(&parse_response(body).unwrap()), None);
    }

    #[test]
    fn test_parse_error_status() {
        let body = r#"{"status":"error","errorType":"bad_data","error":"parse error"}"#;
        let err = parse_response(body).unwrap_err();
        assert!(err.to_string().contains("parse error"));
        assert!(parse_response("<html>").is_err());
    }

    #[test]
    fn test_by_pod_requires_both_labels() {
        let samples = vec![
            PromSample {
                labels: [("namespace", "default"), ("pod", "web-0")]
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                value: 0.2,
            },
            PromSample {
                labels: [("pod".to_string(), "orphan".to_string())].into_iter().collect(),
                value: 1.0,
            },
        ];
        let by = by_pod(&samples);
        assert_eq!(by.len(), 1);
        assert_eq!(by["default/web-0"], 0.2);
    }

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("node-1:9100"), "node-1");
        assert_eq!(strip_port("node-1"), "node-1");
        assert_eq!(strip_port("[::1]:9100"), "[::1]");
        assert_eq!(strip_port("host:"), "host:");
    }

    #[tokio::test]
    async fn test_query_against_server() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/query")
            .match_query(mockito::Matcher::UrlEncoded(
                "query".into(),
                "kepler_node_cpu_watts".into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(VECTOR)
            .create_async()
            .await;

        let client = PromClient::new(&server.url(), Duration::from_secs(5)).unwrap();
        let samples = client.query("kepler_node_cpu_watts").await.unwrap();
        assert_eq!(samples.len(), 2);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_query_http_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/query")
            .match_query(mockito::Matcher::Any)
            .with_status(503)
            .with_body("unavailable")
            .create_async()
            .await;

        let client = PromClient::new(&server.url(), Duration::from_secs(5)).unwrap();
        let err = client.query("up").await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_query_keeps_base_path_prefix() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/prometheus/api/v1/query")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(VECTOR)
            .create_async()
            .await;

        let base = format!("{}/prometheus", server.url());
        let client = PromClient::new(&base, Duration::from_secs(5)).unwrap();
        let samples = client.query("up").await.unwrap();
        assert_eq!(samples.len(), 2);
        mock.assert_async().await;
    }
}
