#[cfg(test)]
mod protocol_tests;



#[cfg(test)]
pub mod test_helpers {
    use crate::context::ToolContext;
    use crate::tools::{tools_call, CallToolRequest, CallToolResult};
    use serde_json::Value;
    use shellbox_sandbox::testing::FakeProvider;
    use std::sync::Arc;

    pub const CONTAINER: &str = "agent-execution-container";

    /// Context over an in-memory store and a fake engine with the execution container running.
    /// Each test gets its own database and engine.
    pub async fn create_test_context() -> (Arc<FakeProvider>, ToolContext) {
        let provider = Arc::new(FakeProvider::new());
        provider.add_running_container(CONTAINER);
        let context = ToolContext::test_context(provider.clone(), CONTAINER).await;
        (provider, context)
    }

    pub async fn call(context: &ToolContext, name: &str, arguments: Value) -> CallToolResult {
        let request = CallToolRequest {
            name: name.to_string(),
            arguments: Some(arguments),
        };
        tools_call(Some(request), context).await.unwrap()
    }

    /// Text of a successful call; panics on an error reply
    pub async fn call_ok(context: &ToolContext, name: &str, arguments: Value) -> String {
        let result = call(context, name, arguments).await;
        assert_eq!(result.is_error, None, "{} failed: {}", name, result.content[0].text);
        result.content[0].text.clone()
    }

    /// Text of an error reply; panics on success
    pub async fn call_err(context: &ToolContext, name: &str, arguments: Value) -> String {
        let result = call(context, name, arguments).await;
        assert_eq!(result.is_error, Some(true), "{} unexpectedly succeeded", name);
        result.content[0].text.clone()
    }
}
