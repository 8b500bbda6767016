use crate::handle_line;
use crate::mcp::*;
use crate::tests::test_helpers::create_test_context;
use pretty_assertions::assert_eq;
use serde_json::json;

#[tokio::test]
async fn test_initialize_request() {
    let request = InitializeRequest {
        protocol_version: "2024-11-05".to_string(),
        capabilities: ClientCapabilities {
            roots: Some(RootsCapability {
                list_changed: Some(true),
            }),
            sampling: None,
        },
        client_info: ClientInfo {
            name: "test-client".to_string(),
            version: "1.0.0".to_string(),
        },
    };

    let response = initialize(Some(request)).await.unwrap();

    assert_eq!(response.protocol_version, PROTOCOL_VERSION);
    assert_eq!(response.server_info.name, "shellbox");
    assert!(response.capabilities.tools.is_some());
}

#[tokio::test]
async fn test_initialize_without_request() {
    let response = initialize(None).await.unwrap();
    assert_eq!(response.protocol_version, "2024-11-05");
}

#[tokio::test]
async fn test_ping() {
    assert_eq!(ping(None).await.unwrap(), json!({}));
    assert_eq!(ping(Some(json!({"test": "value"}))).await.unwrap(), json!({}));
}

#[test]
fn test_initialize_request_deserialization() {
    let value = json!({
        "protocolVersion": "2024-11-05",
        "capabilities": {
            "roots": {
                "listChanged": true
            }
        },
        "clientInfo": {
            "name": "agent",
            "version": "1.0"
        }
    });

    let request: InitializeRequest = serde_json::from_value(value).unwrap();
    assert_eq!(request.protocol_version, "2024-11-05");
    assert_eq!(request.client_info.name, "agent");

    // capabilities may be omitted entirely
    let request: InitializeRequest = serde_json::from_value(json!({
        "protocolVersion": "2024-11-05",
        "clientInfo": {"name": "agent", "version": "1.0"}
    }))
    .unwrap();
    assert!(request.capabilities.roots.is_none());
}

#[tokio::test]
async fn test_initialize_over_the_wire() {
    let (_provider, context) = create_test_context().await;
    let line = r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","capabilities":{},"clientInfo":{"name":"agent","version":"1.0"}}}"#;

    let response = handle_line(line, &context).await.unwrap();

    assert_eq!(response["id"], json!(1));
    assert_eq!(response["result"]["serverInfo"]["name"], json!("shellbox"));
    assert!(response.get("error").is_none());
}

#[tokio::test]
async fn test_notifications_get_no_response() {
    let (_provider, context) = create_test_context().await;

    for method in ["notifications/initialized", "notifications/cancelled"] {
        let line = json!({"jsonrpc": "2.0", "method": method}).to_string();
        assert!(handle_line(&line, &context).await.is_none());
    }
}

#[tokio::test]
async fn test_unknown_method() {
    let (_provider, context) = create_test_context().await;
    let line = r#"{"jsonrpc":"2.0","id":"a","method":"resources/list"}"#;

    let response = handle_line(line, &context).await.unwrap();

    assert_eq!(response["id"], json!("a"));
    assert_eq!(response["error"]["code"], json!(METHOD_NOT_FOUND));
}

#[tokio::test]
async fn test_malformed_json() {
    let (_provider, context) = create_test_context().await;

    let response = handle_line("{not json", &context).await.unwrap();

    assert_eq!(response["error"]["code"], json!(PARSE_ERROR));
    assert_eq!(response["id"], serde_json::Value::Null);
}

#[tokio::test]
async fn test_missing_method() {
    let (_provider, context) = create_test_context().await;

    let response = handle_line(r#"{"jsonrpc":"2.0","id":7}"#, &context)
        .await
        .unwrap();

    assert_eq!(response["error"]["code"], json!(INVALID_REQUEST));
}

#[tokio::test]
async fn test_tools_call_without_name_is_invalid_params() {
    let (_provider, context) = create_test_context().await;
    let line = r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"arguments":{}}}"#;

    let response = handle_line(line, &context).await.unwrap();

    assert_eq!(response["error"]["code"], json!(INVALID_PARAMS));
}
