//! People module: directory search and person lookup.
//!
//! `getPerson` goes through the optional cache. Cache failures are logged and
//! fall through to the collaborator; they never fail the intent.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::StructuredError;
use crate::interfaces::{CacheClient, GraphClient, GraphOperation};
use crate::modules::module_def::{ModuleDependencies, ModuleInit};
use crate::modules::runtime::{
    DispatchContext, DispatcherBuilder, HandlerResult, Intent, IntentDispatcher, IntentResponse,
};

use super::{collection, entity_top, require_str};

pub const MODULE_ID: &str = "people";

const DEFAULT_TOP: u32 = 10;
const MAX_TOP: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeopleIntent {
    FindPeople,
    GetPerson,
}

impl Intent for PeopleIntent {
    const ALL: &'static [Self] = &[Self::FindPeople, Self::GetPerson];

    fn as_str(&self) -> &'static str {
        match self {
            Self::FindPeople => "findPeople",
            Self::GetPerson => "getPerson",
        }
    }
}

struct PeopleState {
    graph: Arc<dyn GraphClient>,
    cache: Option<Arc<dyn CacheClient>>,
    cache_ttl_secs: u64,
}

pub struct PeopleModule {
    dispatcher: IntentDispatcher<PeopleIntent, PeopleState>,
}

impl_dispatch_module!(PeopleModule, "People");

#[async_trait]
impl ModuleInit for PeopleModule {
    async fn init(deps: ModuleDependencies) -> Result<Self, StructuredError> {
        let graph = deps
            .require_graph(
                MODULE_ID,
                &[GraphOperation::SearchPeople, GraphOperation::GetUser],
            )
            .await?;

        let state = PeopleState {
            graph,
            cache: deps.cache.clone(),
            cache_ttl_secs: deps.cache_ttl_secs,
        };
        let dispatcher = DispatcherBuilder::new(MODULE_ID, state)
            .route(PeopleIntent::FindPeople, find_people)
            .route(PeopleIntent::GetPerson, get_person)
            .build(&deps);

        Ok(Self { dispatcher })
    }
}

fn cache_key(person_id: &str) -> String {
    format!("people:person:{}", person_id.to_lowercase())
}

async fn find_people(state: Arc<PeopleState>, entities: Value, ctx: DispatchContext) -> HandlerResult {
    let query = require_str(&entities, &["query", "name"])?;
    let top = entity_top(&entities, DEFAULT_TOP, MAX_TOP);
    let people = state.graph.search_people(ctx.principal(), query, top).await?;
    Ok(IntentResponse::list("peopleList", "people", collection(people)).with("query", query))
}

async fn get_person(state: Arc<PeopleState>, entities: Value, _ctx: DispatchContext) -> HandlerResult {
    let person_id = require_str(&entities, &["personId", "id", "email"])?;
    let key = cache_key(person_id);

    if let Some(cache) = &state.cache {
        match cache.get(&key).await {
            Ok(Some(person)) => {
                log::debug!("people: cache hit for {}", key);
                return Ok(IntentResponse::new("person")
                    .with("person", person)
                    .with("cached", true));
            }
            Ok(None) => {}
            Err(e) => log::warn!("people: cache read failed for {}: {}", key, e),
        }
    }

    let person = state.graph.get_user(person_id).await?;

    if let Some(cache) = &state.cache {
        if let Err(e) = cache.set(&key, person.clone(), state.cache_ttl_secs).await {
            log::warn!("people: cache write failed for {}: {}", key, e);
        }
    }

    Ok(IntentResponse::new("person")
        .with("person", person)
        .with("cached", false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ErrorKind, ErrorPipeline};
    use crate::events::EventBus;
    use crate::interfaces::InMemoryCache;
    use crate::modules::builtin::testing::FakeGraph;
    use crate::modules::{IntentContext, Module};
    use serde_json::json;

    async fn people(graph: FakeGraph, cache: Option<InMemoryCache>) -> (PeopleModule, Arc<FakeGraph>) {
        let graph = Arc::new(graph);
        let mut deps = ModuleDependencies::new(Arc::new(ErrorPipeline::new()), Arc::new(EventBus::new()))
            .with_graph(graph.clone())
            .cache_ttl(60);
        if let Some(cache) = cache {
            deps = deps.with_cache(Arc::new(cache));
        }
        (PeopleModule::init(deps).await.unwrap(), graph)
    }

    #[tokio::test]
    async fn test_find_people() {
        let (module, graph) = people(
            FakeGraph::new().respond(
                GraphOperation::SearchPeople,
                json!({"value": [{"displayName": "Ada"}]}),
            ),
            None,
        )
        .await;
        let response = module
            .handle_intent("findPeople", &json!({"name": "Ada"}), &IntentContext::new())
            .await
            .unwrap();
        assert_eq!(response.response_type, "peopleList");
        assert_eq!(response.item_count(), Some(1));
        assert_eq!(graph.calls_to(GraphOperation::SearchPeople)[0]["top"], json!(10));
    }

    #[tokio::test]
    async fn test_get_person_is_cached() {
        let cache = InMemoryCache::new();
        let (module, graph) = people(
            FakeGraph::new().respond(GraphOperation::GetUser, json!({"id": "u1", "displayName": "Ada"})),
            Some(cache.clone()),
        )
        .await;

        let first = module
            .handle_intent("getPerson", &json!({"personId": "U1"}), &IntentContext::new())
            .await
            .unwrap();
        assert_eq!(first.response_type, "person");
        assert_eq!(first.payload["cached"], json!(false));

        let second = module
            .handle_intent("getPerson", &json!({"personId": "u1"}), &IntentContext::new())
            .await
            .unwrap();
        assert_eq!(second.payload["cached"], json!(true));
        assert_eq!(second.payload["person"]["displayName"], json!("Ada"));

        assert_eq!(graph.calls_to(GraphOperation::GetUser).len(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_get_person_without_cache() {
        let (module, graph) = people(FakeGraph::new(), None).await;
        for _ in 0..2 {
            module
                .handle_intent("getPerson", &json!({"id": "u1"}), &IntentContext::new())
                .await
                .unwrap();
        }
        assert_eq!(graph.calls_to(GraphOperation::GetUser).len(), 2);
    }

    #[tokio::test]
    async fn test_get_person_not_found() {
        let (module, _) = people(FakeGraph::new().fail(GraphOperation::GetUser, 404), None).await;
        let err = module
            .handle_intent("getPerson", &json!({"id": "ghost"}), &IntentContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WrappedFailure);
        assert_eq!(err.context()["collaboratorCode"], json!("notFound"));
    }
}
