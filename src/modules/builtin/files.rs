//! Files module: drive listing, search, metadata and sharing links.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::StructuredError;
use crate::interfaces::{GraphClient, GraphOperation};
use crate::modules::error::DispatchFailure;
use crate::modules::module_def::{ModuleDependencies, ModuleInit};
use crate::modules::runtime::{
    DispatchContext, DispatcherBuilder, HandlerResult, Intent, IntentDispatcher, IntentResponse,
};

use super::{collection, entity_str, require_str};

pub const MODULE_ID: &str = "files";

const LINK_TYPES: &[&str] = &["view", "edit", "embed"];
const LINK_SCOPES: &[&str] = &["anonymous", "organization", "users"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilesIntent {
    ListFiles,
    SearchFiles,
    GetFile,
    ShareFile,
}

impl Intent for FilesIntent {
    const ALL: &'static [Self] = &[
        Self::ListFiles,
        Self::SearchFiles,
        Self::GetFile,
        Self::ShareFile,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            Self::ListFiles => "listFiles",
            Self::SearchFiles => "searchFiles",
            Self::GetFile => "getFile",
            Self::ShareFile => "shareFile",
        }
    }
}

struct FilesState {
    graph: Arc<dyn GraphClient>,
}

pub struct FilesModule {
    dispatcher: IntentDispatcher<FilesIntent, FilesState>,
}

impl_dispatch_module!(FilesModule, "Files");

#[async_trait]
impl ModuleInit for FilesModule {
    async fn init(deps: ModuleDependencies) -> Result<Self, StructuredError> {
        let graph = deps
            .require_graph(
                MODULE_ID,
                &[
                    GraphOperation::ListDriveItems,
                    GraphOperation::SearchDriveItems,
                    GraphOperation::GetDriveItem,
                    GraphOperation::CreateSharingLink,
                ],
            )
            .await?;

        let dispatcher = DispatcherBuilder::new(MODULE_ID, FilesState { graph })
            .route(FilesIntent::ListFiles, list_files)
            .route(FilesIntent::SearchFiles, search_files)
            .route(FilesIntent::GetFile, get_file)
            .route(FilesIntent::ShareFile, share_file)
            .build(&deps);

        Ok(Self { dispatcher })
    }
}

async fn list_files(state: Arc<FilesState>, entities: Value, ctx: DispatchContext) -> HandlerResult {
    let path = entity_str(&entities, &["path", "folder"]).filter(|p| *p != "/");
    let items = state.graph.list_drive_items(ctx.principal(), path).await?;
    Ok(IntentResponse::list("fileList", "files", collection(items)).with("path", path.unwrap_or("/")))
}

async fn search_files(state: Arc<FilesState>, entities: Value, ctx: DispatchContext) -> HandlerResult {
    let query = require_str(&entities, &["query", "q"])?;
    let items = state.graph.search_drive_items(ctx.principal(), query).await?;
    Ok(IntentResponse::list("fileSearchResult", "files", collection(items)).with("query", query))
}

async fn get_file(state: Arc<FilesState>, entities: Value, ctx: DispatchContext) -> HandlerResult {
    let file_id = require_str(&entities, &["fileId", "id"])?;
    let item = state.graph.get_drive_item(ctx.principal(), file_id).await?;
    Ok(IntentResponse::new("fileMetadata").with("file", item))
}

async fn share_file(state: Arc<FilesState>, entities: Value, ctx: DispatchContext) -> HandlerResult {
    let file_id = require_str(&entities, &["fileId", "id"])?;
    let link_type = entity_str(&entities, &["type", "linkType"]).unwrap_or("view");
    let scope = entity_str(&entities, &["scope"]).unwrap_or("organization");
    if !LINK_TYPES.contains(&link_type) {
        return Err(DispatchFailure::invalid_input(format!(
            "unsupported link type '{}'",
            link_type
        )));
    }
    if !LINK_SCOPES.contains(&scope) {
        return Err(DispatchFailure::invalid_input(format!(
            "unsupported link scope '{}'",
            scope
        )));
    }

    let mut permission = state
        .graph
        .create_sharing_link(ctx.principal(), file_id, link_type, scope)
        .await?;
    let link = permission
        .get_mut("link")
        .map(Value::take)
        .unwrap_or(Value::Null);

    Ok(IntentResponse::new("fileShareLink")
        .with("fileId", file_id)
        .with("linkType", link_type)
        .with("scope", scope)
        .with("link", link))
}
