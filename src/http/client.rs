use super::auth::ApiCreds;
use crate::error::{Error, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client wrapper for REST and JSON-RPC endpoints
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
    next_id: Arc<AtomicU64>,
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

impl HttpClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        let url = base_url.into();
        let url = url.strip_suffix('/').map(str::to_string).unwrap_or(url);

        Self {
            client,
            base_url: url,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Make a GET request
    pub async fn get<T>(&self, path: &str, headers: Option<HashMap<&str, String>>) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.get(&url);

        if let Some(headers) = headers {
            for (key, value) in headers {
                request = request.header(key, value);
            }
        }

        let response = request.send().await?;
        self.handle_response(response).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T, B>(
        &self,
        path: &str,
        body: &B,
        headers: Option<HashMap<&str, String>>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.post(&url).json(body);

        if let Some(headers) = headers {
            for (key, value) in headers {
                request = request.header(key, value);
            }
        }

        let response = request.send().await?;
        self.handle_response(response).await
    }

    /// POST whose response body is not needed; only the status is checked
    pub async fn post_discard<B>(&self, path: &str, body: &B) -> Result<()>
    where
        B: Serialize,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(Error::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// POST carrying HMAC headers signed over the serialized body and the
    /// full request path
    pub async fn post_signed<T, B>(&self, path: &str, body: &B, creds: &ApiCreds) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        let body = serde_json::to_string(body)?;
        let signed_path = format!("{}{}", self.base_path().trim_end_matches('/'), path);
        let headers = creds.headers("POST", &signed_path, Some(&body))?;

        let mut request = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request.send().await?;
        self.handle_response(response).await
    }

    /// Make a JSON-RPC 2.0 call against the base URL
    ///
    /// A JSON-RPC `error` object becomes [`Error::Rpc`]; a missing or `null`
    /// result is returned as `Value::Null`.
    pub async fn rpc(&self, method: &str, params: Value) -> Result<Value> {
        let body = self.rpc_body(method, params)?;
        self.send_rpc(method, body, None).await
    }

    /// JSON-RPC call carrying HMAC headers signed over the exact request body
    pub async fn rpc_signed(&self, method: &str, params: Value, creds: &ApiCreds) -> Result<Value> {
        let body = self.rpc_body(method, params)?;
        let headers = creds.headers("POST", &self.base_path(), Some(&body))?;
        self.send_rpc(method, body, Some(headers)).await
    }

    fn rpc_body(&self, method: &str, params: Value) -> Result<String> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        Ok(serde_json::to_string(&request)?)
    }

    /// Path component of the base URL, as covered by request signatures
    fn base_path(&self) -> String {
        reqwest::Url::parse(&self.base_url)
            .map(|url| url.path().to_string())
            .unwrap_or_else(|_| "/".to_string())
    }

    async fn send_rpc(
        &self,
        method: &str,
        body: String,
        headers: Option<HashMap<&str, String>>,
    ) -> Result<Value> {
        log::debug!("rpc -> {} {}", self.base_url, method);
        let mut builder = self
            .client
            .post(&self.base_url)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(headers) = headers {
            for (key, value) in headers {
                builder = builder.header(key, value);
            }
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        // Some bundlers answer JSON-RPC errors with a 4xx status, so the body is
        // inspected before the status code.
        let response: RpcResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(Error::Api {
                    status: status.as_u16(),
                    message: body,
                })
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(err) = response.error {
            let message = match err.data {
                Some(Value::String(data)) => format!("{} ({})", err.message, data),
                _ => err.message,
            };
            log::debug!("rpc <- {} error {}: {}", method, err.code, message);
            return Err(Error::Rpc {
                code: err.code,
                message,
            });
        }
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Handle response and parse JSON or return error
    async fn handle_response<T>(&self, response: Response) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let status = response.status();

        if status.is_success() {
            response.json().await.map_err(|e| e.into())
        } else {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            Err(Error::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}
