//! JSON-RPC client for the nudge HTTP channel.
//!
//! Used by the CLI for every store command and by PROXY instances to forward
//! tool calls to the elected PRIMARY. Transport failures surface as typed
//! client errors with plain messages (`"Server not found on port P"`); RPC
//! error envelopes from the server pass through untouched.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use nudge::rpc::{
    BumpParams, DeleteHintParams, DeleteHintResult, ExportParams, ExportResult, GetHintParams,
    GetHintResult, HintEnvelope, ImportParams, ImportResult, JSONRPC_VERSION,
    ListComponentsResult, Method, QueryParams, QueryResult, RpcErrorObject, RpcResponse,
    SetHintParams,
};

pub const DEFAULT_PORT: u16 = 8765;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Server not found on port {0}")]
    ServerNotFound(u16),
    #[error("HTTP error {status}")]
    Http { status: u16 },
    #[error("Invalid response from server")]
    InvalidResponse,
    #[error("RPC error: {}", .0.message)]
    Rpc(RpcErrorObject),
}

/// High-level client for nudge RPC calls.
#[derive(Debug, Clone)]
pub struct NudgeClient {
    http: reqwest::Client,
    url: String,
    port: u16,
}

impl NudgeClient {
    pub fn new(port: u16) -> Self {
        NudgeClient {
            http: reqwest::Client::new(),
            url: format!("http://127.0.0.1:{port}/"),
            port,
        }
    }

    /// Point the client at an arbitrary endpoint (tests).
    pub fn with_url(url: impl Into<String>) -> Self {
        NudgeClient {
            http: reqwest::Client::new(),
            url: url.into(),
            port: 0,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Issue one JSON-RPC request and unwrap the result value.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        let request = json!({
            "jsonrpc": JSONRPC_VERSION,
            "method": method,
            "params": params,
            "id": 1,
        });
        debug!(method, "rpc call");

        let response = self
            .http
            .post(&self.url)
            .timeout(REQUEST_TIMEOUT)
            .json(&request)
            .send()
            .await
            .map_err(|_| ClientError::ServerNotFound(self.port))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Http {
                status: status.as_u16(),
            });
        }

        let envelope: RpcResponse = response
            .json()
            .await
            .map_err(|_| ClientError::InvalidResponse)?;
        if let Some(error) = envelope.error {
            return Err(ClientError::Rpc(error));
        }
        envelope.result.ok_or(ClientError::InvalidResponse)
    }

    async fn call_typed<T: DeserializeOwned>(
        &self,
        method: Method,
        params: Value,
    ) -> Result<T, ClientError> {
        let result = self.call(&method.rpc_name(), params).await?;
        serde_json::from_value(result).map_err(|_| ClientError::InvalidResponse)
    }

    pub async fn set_hint(&self, params: SetHintParams) -> Result<HintEnvelope, ClientError> {
        self.call_typed(Method::SetHint, to_params(&params)).await
    }

    pub async fn get_hint(&self, params: GetHintParams) -> Result<GetHintResult, ClientError> {
        self.call_typed(Method::GetHint, to_params(&params)).await
    }

    pub async fn query(&self, params: QueryParams) -> Result<QueryResult, ClientError> {
        self.call_typed(Method::Query, to_params(&params)).await
    }

    pub async fn delete_hint(
        &self,
        params: DeleteHintParams,
    ) -> Result<DeleteHintResult, ClientError> {
        self.call_typed(Method::DeleteHint, to_params(&params)).await
    }

    pub async fn list_components(&self) -> Result<ListComponentsResult, ClientError> {
        self.call_typed(Method::ListComponents, json!({})).await
    }

    pub async fn bump(&self, params: BumpParams) -> Result<HintEnvelope, ClientError> {
        self.call_typed(Method::Bump, to_params(&params)).await
    }

    pub async fn export(&self, params: ExportParams) -> Result<ExportResult, ClientError> {
        self.call_typed(Method::Export, to_params(&params)).await
    }

    pub async fn import(&self, params: ImportParams) -> Result<ImportResult, ClientError> {
        self.call_typed(Method::Import, to_params(&params)).await
    }
}

fn to_params<T: serde::Serialize>(params: &T) -> Value {
    serde_json::to_value(params).unwrap_or(Value::Null)
}
