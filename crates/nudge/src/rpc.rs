use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::NudgeError;
use crate::model::{ComponentInfo, Context, Hint, HintMeta, HintValue, MatchExplanation, RankedHint, Snapshot};
use crate::store::ImportMode;

pub const JSONRPC_VERSION: &str = "2.0";
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INTERNAL_ERROR: i64 = -32603;

/// The eight operations exposed on both transports.
///
/// HTTP JSON-RPC uses the `nudge_` prefix, the agent-tool channel the
/// dot-separated form; both resolve here so PRIMARY and PROXY share one
/// schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    SetHint,
    GetHint,
    Query,
    DeleteHint,
    ListComponents,
    Bump,
    Export,
    Import,
}

impl Method {
    pub const ALL: [Method; 8] = [
        Method::SetHint,
        Method::GetHint,
        Method::Query,
        Method::DeleteHint,
        Method::ListComponents,
        Method::Bump,
        Method::Export,
        Method::Import,
    ];

    fn bare_name(self) -> &'static str {
        match self {
            Method::SetHint => "set_hint",
            Method::GetHint => "get_hint",
            Method::Query => "query",
            Method::DeleteHint => "delete_hint",
            Method::ListComponents => "list_components",
            Method::Bump => "bump",
            Method::Export => "export",
            Method::Import => "import",
        }
    }

    /// Name on the HTTP JSON-RPC channel, e.g. `nudge_set_hint`.
    pub fn rpc_name(self) -> String {
        format!("nudge_{}", self.bare_name())
    }

    /// Name on the agent-tool channel, e.g. `nudge.set_hint`.
    pub fn tool_name(self) -> String {
        format!("nudge.{}", self.bare_name())
    }

    /// Resolve either spelling.
    pub fn parse(name: &str) -> Option<Method> {
        let bare = name
            .strip_prefix("nudge_")
            .or_else(|| name.strip_prefix("nudge."))?;
        Method::ALL.into_iter().find(|m| m.bare_name() == bare)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Value,
}

/// The JSON-RPC error object. `code` is a `Value` because semantic errors
/// carry numeric codes while proxy transport failures carry the
/// `"PROXY_ERROR"` marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: Value,
    pub message: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
    #[serde(default)]
    pub id: Value,
}

impl RpcResponse {
    pub fn success(result: Value, id: Value) -> Self {
        RpcResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn failure(error: RpcErrorObject, id: Value) -> Self {
        RpcResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

fn default_delta() -> u64 {
    1
}

fn default_limit() -> usize {
    10
}

fn default_format() -> String {
    "json".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetHintParams {
    pub component: String,
    pub key: String,
    pub value: HintValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<HintMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub if_match_version: Option<u64>,
    #[serde(default)]
    pub allow_secret: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetHintParams {
    pub component: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Context>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Context>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl Default for QueryParams {
    fn default() -> Self {
        QueryParams {
            component: None,
            keys: None,
            tags: None,
            regex: None,
            context: None,
            limit: default_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteHintParams {
    pub component: String,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BumpParams {
    pub component: String,
    pub key: String,
    #[serde(default = "default_delta")]
    pub delta: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportParams {
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for ExportParams {
    fn default() -> Self {
        ExportParams {
            format: default_format(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportParams {
    pub payload: Value,
    #[serde(default)]
    pub mode: ImportMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HintEnvelope {
    pub hint: Hint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetHintResult {
    pub hint: Hint,
    pub match_explain: MatchExplanation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub hints: Vec<RankedHint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteHintResult {
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<Hint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListComponentsResult {
    pub components: Vec<ComponentInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResult {
    pub payload: Snapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportResult {
    pub imported: usize,
    pub skipped: usize,
}

/// Errors a service implementation can produce.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// A typed store/handler error; becomes a numeric-code envelope.
    #[error(transparent)]
    Store(#[from] NudgeError),
    /// A semantic error forwarded verbatim from the PRIMARY.
    #[error("RPC error: {}", .0.message)]
    Forwarded(RpcErrorObject),
    /// The PRIMARY could not be reached at all.
    #[error("Proxy error: {0}")]
    Proxy(String),
}

impl ServiceError {
    pub fn into_error_object(self) -> RpcErrorObject {
        match self {
            ServiceError::Store(err) => RpcErrorObject {
                code: json!(err.code().as_i64()),
                message: err.to_string(),
                data: err.data(),
            },
            ServiceError::Forwarded(obj) => obj,
            ServiceError::Proxy(message) => RpcErrorObject {
                code: json!("PROXY_ERROR"),
                message: format!("Proxy error: {message}"),
                data: json!({}),
            },
        }
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// The operation surface shared by the PRIMARY (store-backed) and the PROXY
/// (forwarding) implementations.
#[async_trait]
pub trait HintService: Send + Sync + 'static {
    async fn set_hint(&self, params: SetHintParams) -> ServiceResult<HintEnvelope>;
    async fn get_hint(&self, params: GetHintParams) -> ServiceResult<GetHintResult>;
    async fn query(&self, params: QueryParams) -> ServiceResult<QueryResult>;
    async fn delete_hint(&self, params: DeleteHintParams) -> ServiceResult<DeleteHintResult>;
    async fn list_components(&self) -> ServiceResult<ListComponentsResult>;
    async fn bump(&self, params: BumpParams) -> ServiceResult<HintEnvelope>;
    async fn export(&self, params: ExportParams) -> ServiceResult<ExportResult>;
    async fn import(&self, params: ImportParams) -> ServiceResult<ImportResult>;
}

fn invalid_params(err: serde_json::Error) -> RpcErrorObject {
    RpcErrorObject {
        code: json!(crate::error::ErrorCode::Invalid.as_i64()),
        message: format!("Invalid params: {err}"),
        data: json!({}),
    }
}

fn to_value<T: Serialize>(result: T) -> Result<Value, RpcErrorObject> {
    serde_json::to_value(result).map_err(|err| RpcErrorObject {
        code: json!(INTERNAL_ERROR),
        message: err.to_string(),
        data: json!({}),
    })
}

/// Route one request to a service implementation. Accepts both method
/// spellings; unknown names get the standard JSON-RPC -32601.
pub async fn dispatch(
    service: &dyn HintService,
    method: &str,
    params: Value,
) -> Result<Value, RpcErrorObject> {
    let Some(method) = Method::parse(method) else {
        return Err(RpcErrorObject {
            code: json!(METHOD_NOT_FOUND),
            message: format!("Method not found: {method}"),
            data: json!({}),
        });
    };

    let call = async {
        match method {
            Method::SetHint => {
                let params = serde_json::from_value(params).map_err(invalid_params)?;
                to_value(service.set_hint(params).await.map_err(ServiceError::into_error_object)?)
            }
            Method::GetHint => {
                let params = serde_json::from_value(params).map_err(invalid_params)?;
                to_value(service.get_hint(params).await.map_err(ServiceError::into_error_object)?)
            }
            Method::Query => {
                let params = serde_json::from_value(params).map_err(invalid_params)?;
                to_value(service.query(params).await.map_err(ServiceError::into_error_object)?)
            }
            Method::DeleteHint => {
                let params = serde_json::from_value(params).map_err(invalid_params)?;
                to_value(
                    service
                        .delete_hint(params)
                        .await
                        .map_err(ServiceError::into_error_object)?,
                )
            }
            Method::ListComponents => to_value(
                service
                    .list_components()
                    .await
                    .map_err(ServiceError::into_error_object)?,
            ),
            Method::Bump => {
                let params = serde_json::from_value(params).map_err(invalid_params)?;
                to_value(service.bump(params).await.map_err(ServiceError::into_error_object)?)
            }
            Method::Export => {
                let params = if params.is_null() {
                    ExportParams::default()
                } else {
                    serde_json::from_value(params).map_err(invalid_params)?
                };
                to_value(service.export(params).await.map_err(ServiceError::into_error_object)?)
            }
            Method::Import => {
                let params = serde_json::from_value(params).map_err(invalid_params)?;
                to_value(service.import(params).await.map_err(ServiceError::into_error_object)?)
            }
        }
    };
    call.await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_names_resolve_on_both_channels() {
        for method in Method::ALL {
            assert_eq!(Method::parse(&method.rpc_name()), Some(method));
            assert_eq!(Method::parse(&method.tool_name()), Some(method));
        }
        assert_eq!(Method::parse("nudge_set_hint"), Some(Method::SetHint));
        assert_eq!(Method::parse("nudge.set_hint"), Some(Method::SetHint));
        assert_eq!(Method::parse("set_hint"), None);
        assert_eq!(Method::parse("nudge_unknown"), None);
    }

    #[test]
    fn query_params_default_limit() {
        let params: QueryParams = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(params.limit, 10);
        assert!(params.component.is_none());
    }

    #[test]
    fn import_mode_defaults_to_merge() {
        let params: ImportParams =
            serde_json::from_value(serde_json::json!({"payload": {}})).unwrap();
        assert_eq!(params.mode, ImportMode::Merge);
        let params: ImportParams =
            serde_json::from_value(serde_json::json!({"payload": {}, "mode": "replace"})).unwrap();
        assert_eq!(params.mode, ImportMode::Replace);
    }

    #[test]
    fn proxy_error_envelope_uses_marker_code() {
        let obj = ServiceError::Proxy("Server not found on port 8765".into()).into_error_object();
        assert_eq!(obj.code, json!("PROXY_ERROR"));
        assert!(obj.message.contains("Server not found"));
    }

    #[test]
    fn store_error_envelope_uses_numeric_code() {
        let obj = ServiceError::Store(NudgeError::NotFound("Hint c/k not found".into()))
            .into_error_object();
        assert_eq!(obj.code, json!(40401));
    }
}
