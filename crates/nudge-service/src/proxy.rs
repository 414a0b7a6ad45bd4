//! PROXY mode: the same operation surface, with every call forwarded to the
//! elected PRIMARY over HTTP.
//!
//! A proxy owns no store. Semantic errors from the PRIMARY flow through
//! unchanged; only transport failures are wrapped in the `PROXY_ERROR`
//! envelope.

use async_trait::async_trait;

use nudge::rpc::{
    BumpParams, DeleteHintParams, DeleteHintResult, ExportParams, ExportResult, GetHintParams,
    GetHintResult, HintEnvelope, HintService, ImportParams, ImportResult, ListComponentsResult,
    QueryParams, QueryResult, ServiceError, ServiceResult, SetHintParams,
};
use nudge_client::{ClientError, NudgeClient};

pub struct ProxyService {
    client: NudgeClient,
}

impl ProxyService {
    pub fn new(primary_port: u16) -> Self {
        ProxyService {
            client: NudgeClient::new(primary_port),
        }
    }

    pub fn with_client(client: NudgeClient) -> Self {
        ProxyService { client }
    }
}

fn forward_err(err: ClientError) -> ServiceError {
    match err {
        ClientError::Rpc(envelope) => ServiceError::Forwarded(envelope),
        other => ServiceError::Proxy(other.to_string()),
    }
}

#[async_trait]
impl HintService for ProxyService {
    async fn set_hint(&self, params: SetHintParams) -> ServiceResult<HintEnvelope> {
        self.client.set_hint(params).await.map_err(forward_err)
    }

    async fn get_hint(&self, params: GetHintParams) -> ServiceResult<GetHintResult> {
        self.client.get_hint(params).await.map_err(forward_err)
    }

    async fn query(&self, params: QueryParams) -> ServiceResult<QueryResult> {
        self.client.query(params).await.map_err(forward_err)
    }

    async fn delete_hint(&self, params: DeleteHintParams) -> ServiceResult<DeleteHintResult> {
        self.client.delete_hint(params).await.map_err(forward_err)
    }

    async fn list_components(&self) -> ServiceResult<ListComponentsResult> {
        self.client.list_components().await.map_err(forward_err)
    }

    async fn bump(&self, params: BumpParams) -> ServiceResult<HintEnvelope> {
        self.client.bump(params).await.map_err(forward_err)
    }

    async fn export(&self, params: ExportParams) -> ServiceResult<ExportResult> {
        self.client.export(params).await.map_err(forward_err)
    }

    async fn import(&self, params: ImportParams) -> ServiceResult<ImportResult> {
        self.client.import(params).await.map_err(forward_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn proxy_for(server: &MockServer) -> ProxyService {
        ProxyService::with_client(NudgeClient::with_url(format!("{}/", server.uri())))
    }

    #[tokio::test]
    async fn forwards_results_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_partial_json(json!({"method": "nudge_bump"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "result": {"hint": {
                    "value": "v",
                    "meta": {},
                    "version": 1,
                    "created_at": "2026-08-01T00:00:00Z",
                    "updated_at": "2026-08-01T00:00:00Z",
                    "last_used_at": "2026-08-01T00:00:00Z",
                    "use_count": 3
                }},
                "id": 1
            })))
            .mount(&server)
            .await;

        let proxy = proxy_for(&server);
        let result = proxy
            .bump(BumpParams {
                component: "c".into(),
                key: "k".into(),
                delta: 1,
            })
            .await
            .unwrap();
        assert_eq!(result.hint.use_count, 3);
    }

    #[tokio::test]
    async fn semantic_errors_flow_through_unchanged() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "error": {"code": 40401, "message": "Hint c/k not found", "data": {}},
                "id": 1
            })))
            .mount(&server)
            .await;

        let proxy = proxy_for(&server);
        let err = proxy
            .get_hint(GetHintParams {
                component: "c".into(),
                key: "k".into(),
                context: None,
            })
            .await
            .unwrap_err();
        match err {
            ServiceError::Forwarded(obj) => {
                assert_eq!(obj.code, json!(40401));
                assert_eq!(obj.message, "Hint c/k not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn transport_failure_becomes_proxy_error() {
        // No server behind this port.
        let proxy = ProxyService::new(1);
        let err = proxy.list_components().await.unwrap_err();
        let envelope = err.into_error_object();
        assert_eq!(envelope.code, json!("PROXY_ERROR"));
        assert!(envelope.message.contains("Server not found on port 1"));
    }
}
