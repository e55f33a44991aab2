//! Mail module.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::errors::StructuredError;
use crate::interfaces::{GraphClient, GraphOperation};
use crate::modules::error::DispatchFailure;
use crate::modules::module_def::{ModuleDependencies, ModuleInit};
use crate::modules::runtime::{
    DispatchContext, DispatcherBuilder, HandlerResult, Intent, IntentDispatcher, IntentResponse,
};

use super::{collection, entity_str, entity_top, require_str};

pub const MODULE_ID: &str = "mail";

const DEFAULT_FOLDER: &str = "inbox";
const DEFAULT_TOP: u32 = 25;
const MAX_TOP: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MailIntent {
    GetMessages,
    SendMail,
    SearchMail,
}

impl Intent for MailIntent {
    const ALL: &'static [Self] = &[Self::GetMessages, Self::SendMail, Self::SearchMail];

    fn as_str(&self) -> &'static str {
        match self {
            Self::GetMessages => "getMessages",
            Self::SendMail => "sendMail",
            Self::SearchMail => "searchMail",
        }
    }
}

struct MailState {
    graph: Arc<dyn GraphClient>,
}

pub struct MailModule {
    dispatcher: IntentDispatcher<MailIntent, MailState>,
}

impl_dispatch_module!(MailModule, "Mail");

#[async_trait]
impl ModuleInit for MailModule {
    async fn init(deps: ModuleDependencies) -> Result<Self, StructuredError> {
        let graph = deps
            .require_graph(
                MODULE_ID,
                &[
                    GraphOperation::ListMessages,
                    GraphOperation::SendMail,
                    GraphOperation::SearchMessages,
                ],
            )
            .await?;

        let dispatcher = DispatcherBuilder::new(MODULE_ID, MailState { graph })
            .route(MailIntent::GetMessages, get_messages)
            .route(MailIntent::SendMail, send_mail)
            .route(MailIntent::SearchMail, search_mail)
            .build(&deps);

        Ok(Self { dispatcher })
    }
}

/// Recipients from a string (comma/semicolon separated) or an array of
/// strings, as Graph `emailAddress` objects.
fn recipients(value: Option<&Value>) -> Vec<Value> {
    let addresses: Vec<String> = match value {
        Some(Value::String(s)) => s
            .split([',', ';'])
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Object(_) => item
                    .pointer("/emailAddress/address")
                    .or_else(|| item.get("address"))
                    .and_then(Value::as_str)
                    .map(|s| s.trim().to_string()),
                _ => None,
            })
            .filter(|a| !a.is_empty())
            .collect(),
        _ => Vec::new(),
    };
    addresses
        .into_iter()
        .map(|address| json!({"emailAddress": {"address": address}}))
        .collect()
}

async fn get_messages(state: Arc<MailState>, entities: Value, ctx: DispatchContext) -> HandlerResult {
    let folder = entity_str(&entities, &["folder"]).unwrap_or(DEFAULT_FOLDER);
    let top = entity_top(&entities, DEFAULT_TOP, MAX_TOP);
    let messages = state.graph.list_messages(ctx.principal(), folder, top).await?;
    Ok(IntentResponse::list("mailList", "messages", collection(messages)).with("folder", folder))
}

async fn send_mail(state: Arc<MailState>, entities: Value, ctx: DispatchContext) -> HandlerResult {
    let to = recipients(entities.get("to"));
    if to.is_empty() {
        return Err(DispatchFailure::invalid_input("missing required entity 'to'"));
    }
    let subject = require_str(&entities, &["subject"])?;
    let body = entity_str(&entities, &["body", "content"]).unwrap_or_default();
    let content_type = match entities.get("html").and_then(Value::as_bool) {
        Some(true) => "HTML",
        _ => "Text",
    };
    let cc = recipients(entities.get("cc"));

    let recipient_count = to.len() + cc.len();
    let message = json!({
        "message": {
            "subject": subject,
            "body": {"contentType": content_type, "content": body},
            "toRecipients": to,
            "ccRecipients": cc,
        },
        "saveToSentItems": entities.get("saveToSentItems").and_then(Value::as_bool).unwrap_or(true),
    });
    state.graph.send_mail(ctx.principal(), &message).await?;

    Ok(IntentResponse::new("mailSendResult")
        .with("sent", true)
        .with("subject", subject)
        .with("recipients", recipient_count))
}

async fn search_mail(state: Arc<MailState>, entities: Value, ctx: DispatchContext) -> HandlerResult {
    let query = require_str(&entities, &["query", "q"])?;
    let top = entity_top(&entities, DEFAULT_TOP, MAX_TOP);
    let messages = state
        .graph
        .search_messages(ctx.principal(), query, top)
        .await?;
    Ok(IntentResponse::list("mailSearchResult", "messages", collection(messages)).with("query", query))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ErrorCategory, ErrorKind, ErrorPipeline};
    use crate::events::EventBus;
    use crate::modules::builtin::testing::FakeGraph;
    use crate::modules::{IntentContext, Module};

    async fn mail(graph: FakeGraph) -> (MailModule, Arc<FakeGraph>) {
        let graph = Arc::new(graph);
        let deps = ModuleDependencies::new(Arc::new(ErrorPipeline::new()), Arc::new(EventBus::new()))
            .with_graph(graph.clone());
        (MailModule::init(deps).await.unwrap(), graph)
    }

    #[test]
    fn test_recipients() {
        assert_eq!(recipients(Some(&json!("a@x.com; b@x.com"))).len(), 2);
        let parsed = recipients(Some(&json!([
            "a@x.com",
            {"emailAddress": {"address": "b@x.com"}},
            {"address": "c@x.com"},
            42
        ])));
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[1], json!({"emailAddress": {"address": "b@x.com"}}));
        assert!(recipients(None).is_empty());
    }

    #[tokio::test]
    async fn test_get_messages_defaults() {
        let (module, graph) = mail(FakeGraph::new().respond(
            GraphOperation::ListMessages,
            json!({"value": [{"id": "m1"}]}),
        ))
        .await;
        let response = module
            .handle_intent("getMessages", &json!({}), &IntentContext::new())
            .await
            .unwrap();
        assert_eq!(response.response_type, "mailList");
        assert_eq!(response.item_count(), Some(1));
        let call = &graph.calls_to(GraphOperation::ListMessages)[0];
        assert_eq!(call["folder"], json!("inbox"));
        assert_eq!(call["top"], json!(25));
    }

    #[tokio::test]
    async fn test_send_mail() {
        let (module, graph) = mail(FakeGraph::new()).await;
        let response = module
            .handle_intent(
                "sendMail",
                &json!({"to": "bob@example.com", "subject": "Hi", "body": "Hello"}),
                &IntentContext::for_user("alice"),
            )
            .await
            .unwrap();
        assert_eq!(response.response_type, "mailSendResult");
        assert_eq!(response.payload["recipients"], json!(1));

        let call = &graph.calls_to(GraphOperation::SendMail)[0];
        assert_eq!(call["user"], json!("alice"));
        assert_eq!(
            call["message"]["message"]["toRecipients"][0]["emailAddress"]["address"],
            json!("bob@example.com")
        );
        assert_eq!(call["message"]["saveToSentItems"], json!(true));
    }

    #[tokio::test]
    async fn test_send_mail_without_recipient() {
        let (module, graph) = mail(FakeGraph::new()).await;
        let err = module
            .handle_intent("sendMail", &json!({"subject": "Hi"}), &IntentContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WrappedFailure);
        assert_eq!(err.category(), &ErrorCategory::Mail);
        assert!(graph.calls_to(GraphOperation::SendMail).is_empty());
    }

    #[tokio::test]
    async fn test_search_mail() {
        let (module, _) = mail(FakeGraph::new().respond(
            GraphOperation::SearchMessages,
            json!({"value": [{"id": "m1"}, {"id": "m2"}]}),
        ))
        .await;
        let response = module
            .handle_intent("searchMail", &json!({"query": "invoice"}), &IntentContext::new())
            .await
            .unwrap();
        assert_eq!(response.response_type, "mailSearchResult");
        assert_eq!(response.item_count(), Some(2));
        assert_eq!(response.payload["query"], json!("invoice"));
    }
}
