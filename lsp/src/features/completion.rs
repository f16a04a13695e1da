//! Completion and completion-item resolve.
//!
//! Completion items are annotated with a per-call token (`label-index`) and
//! the server name. Resolve requests from the editor carry only those, so the
//! client keeps the original items in a [`CompletionCache`] until the next
//! completion call replaces them.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use lsp_types::request::{Completion, Request as LspRequest, ResolveCompletionItem};
use lsp_types::{
    CompletionContext, CompletionItem, CompletionParams, CompletionResponse, CompletionTextEdit,
    CompletionTriggerKind, Documentation, MarkupContent, MarkupKind, PartialResultParams, Position,
    TextDocumentIdentifier, TextDocumentPositionParams, TextEdit, WorkDoneProgressParams,
};
use serde::{Deserialize, Serialize};

use super::{FeatureResponse, filter};
use crate::client::LanguageClient;
use crate::error::ClientError;

const MAX_COMPLETION_ITEMS: usize = 100;
/// Longer `detail` strings are shown as `...` plus their last this-many chars.
const DETAIL_LIMIT: usize = 30;

/// Completion request as the editor sends it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorCompletionParams {
    pub text_document: TextDocumentIdentifier,
    pub position: Position,
    /// Text of the line holding the cursor.
    #[serde(default)]
    pub line: String,
    /// The word being completed.
    #[serde(default)]
    pub prefix: String,
    /// Buffer offset where the prefix starts.
    #[serde(default)]
    pub start_point: i64,
}

/// A completion item with the annotations the editor needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorCompletionItem {
    #[serde(flatten)]
    pub item: CompletionItem,
    /// Per-call token correlating a later resolve with this item.
    pub no: String,
    /// Name of the server that produced the item.
    pub source: String,
    pub start: i64,
    pub end: i64,
}

/// The item a resolve request refers to.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolveTarget {
    pub label: String,
    #[serde(default)]
    pub no: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

impl ResolveTarget {
    #[must_use]
    pub fn token(&self) -> &str {
        self.no.as_deref().unwrap_or(&self.label)
    }
}

type ResolveOutcome = Result<Option<CompletionItem>, ClientError>;
type SharedResolve = Shared<BoxFuture<'static, ResolveOutcome>>;

enum ResolveState {
    NotRequested,
    InFlight(SharedResolve),
    Resolved(Option<CompletionItem>),
}

struct CacheEntry {
    item: CompletionItem,
    state: ResolveState,
}

enum Lookup {
    Missing,
    Ready(CompletionItem, Option<CompletionItem>),
    Waiting(CompletionItem, SharedResolve),
}

/// Items of the latest completion call, keyed by token.
#[derive(Default)]
pub(crate) struct CompletionCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl CompletionCache {
    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn clear(&self) {
        self.entries().clear();
    }

    pub(crate) fn contains(&self, token: &str) -> bool {
        self.entries().contains_key(token)
    }

    fn remember(&self, token: String, item: CompletionItem) {
        self.entries().insert(
            token,
            CacheEntry {
                item,
                state: ResolveState::NotRequested,
            },
        );
    }

    /// Join the in-flight resolve for `token`, or start one with `start`.
    fn lookup_or_start(
        &self,
        token: &str,
        start: impl FnOnce(CompletionItem) -> Result<SharedResolve, ClientError>,
    ) -> Result<Lookup, ClientError> {
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(token) else {
            return Ok(Lookup::Missing);
        };
        match &entry.state {
            ResolveState::Resolved(resolved) => {
                Ok(Lookup::Ready(entry.item.clone(), resolved.clone()))
            }
            ResolveState::InFlight(pending) => {
                tracing::debug!(token, "Completion resolve cache hit");
                Ok(Lookup::Waiting(entry.item.clone(), pending.clone()))
            }
            ResolveState::NotRequested => {
                let pending = start(entry.item.clone())?;
                entry.state = ResolveState::InFlight(pending.clone());
                Ok(Lookup::Waiting(entry.item.clone(), pending))
            }
        }
    }

    fn settle(&self, token: &str, outcome: &ResolveOutcome) {
        if let Some(entry) = self.entries().get_mut(token)
            && matches!(entry.state, ResolveState::InFlight(_))
        {
            entry.state = match outcome {
                Ok(resolved) => ResolveState::Resolved(resolved.clone()),
                Err(_) => ResolveState::NotRequested,
            };
        }
    }
}

pub(crate) async fn complete(
    client: &LanguageClient,
    params: EditorCompletionParams,
) -> Result<FeatureResponse, ClientError> {
    let cache = client.completion_cache();
    cache.clear();

    let pretext = line_before(&params.line, params.position.character);
    let trigger_character = client
        .trigger_characters()
        .into_iter()
        .find(|c| pretext.ends_with(c.as_str()));

    let request = CompletionParams {
        text_document_position: TextDocumentPositionParams {
            text_document: params.text_document.clone(),
            position: params.position,
        },
        work_done_progress_params: WorkDoneProgressParams::default(),
        partial_result_params: PartialResultParams::default(),
        context: Some(CompletionContext {
            trigger_kind: if trigger_character.is_some() {
                CompletionTriggerKind::TRIGGER_CHARACTER
            } else {
                CompletionTriggerKind::INVOKED
            },
            trigger_character,
        }),
    };

    let items = match client.send_request::<Completion>(request).await? {
        None => Vec::new(),
        Some(CompletionResponse::Array(items)) => items,
        Some(CompletionResponse::List(list)) => list.items,
    };
    let received = items.len();

    let prefix_len = char_count(&params.prefix);
    let items: Vec<EditorCompletionItem> = filter::filter_items(&params.prefix, items)
        .into_iter()
        .take(MAX_COMPLETION_ITEMS)
        .enumerate()
        .map(|(idx, item)| {
            let no = format!("{}-{idx}", item.label);
            cache.remember(no.clone(), item.clone());

            let end = params.start_point + char_count(&item.label) - prefix_len;
            let mut item = item;
            if let Some(detail) = &item.detail {
                item.detail = Some(shorten_detail(detail));
            }
            EditorCompletionItem {
                item,
                no,
                source: client.name().to_string(),
                start: params.start_point,
                end,
            }
        })
        .collect();

    tracing::debug!(server = %client.name(), received, kept = items.len(), "Filtered completion items");
    Ok(FeatureResponse::Completion(items))
}

/// Resolve a previously returned item; concurrent calls share one request.
pub(crate) async fn resolve(
    client: &LanguageClient,
    target: &ResolveTarget,
) -> Result<FeatureResponse, ClientError> {
    let token = target.token();
    let cache = client.completion_cache();

    let lookup = cache.lookup_or_start(token, |item| {
        let connection = client.active_connection()?;
        let params = serde_json::to_value(&item)?;
        let pending: BoxFuture<'static, ResolveOutcome> = async move {
            let result = connection
                .request(ResolveCompletionItem::METHOD, params)
                .await?;
            serde_json::from_value::<Option<CompletionItem>>(result)
                .map_err(|e| ClientError::Serialization(format!("completionItem/resolve: {e}")))
        }
        .boxed();
        Ok(pending.shared())
    })?;

    let (original, resolved) = match lookup {
        Lookup::Missing => {
            tracing::debug!(server = %client.name(), token, "Resolve for unknown completion item");
            return Ok(FeatureResponse::Resolved(None));
        }
        Lookup::Ready(original, resolved) => (original, resolved),
        Lookup::Waiting(original, pending) => {
            let outcome = pending.await;
            cache.settle(token, &outcome);
            (original, outcome?)
        }
    };

    Ok(FeatureResponse::Resolved(
        resolved.map(|item| merge_resolved(&original, item)),
    ))
}

/// Fold a fresh `detail` into the documentation and flatten insert/replace
/// edits into a plain replace edit.
///
/// Always computed from the original item, so repeated resolves never grow
/// the documentation.
fn merge_resolved(original: &CompletionItem, mut resolved: CompletionItem) -> CompletionItem {
    if let Some(detail) = resolved.detail.clone()
        && Some(&detail) != original.detail.as_ref()
    {
        resolved.documentation = Some(match resolved.documentation.take() {
            None => Documentation::MarkupContent(MarkupContent {
                kind: MarkupKind::Markdown,
                value: detail.clone(),
            }),
            Some(Documentation::String(doc)) => Documentation::String(format!("{detail}\n\n{doc}")),
            Some(Documentation::MarkupContent(markup)) => {
                Documentation::MarkupContent(MarkupContent {
                    kind: markup.kind,
                    value: format!("```\n{detail}\n```\n\n{}", markup.value),
                })
            }
        });
        resolved.detail = Some(shorten_detail(&detail));
    }

    if let Some(CompletionTextEdit::InsertAndReplace(edit)) = &resolved.text_edit {
        resolved.text_edit = Some(CompletionTextEdit::Edit(TextEdit {
            range: edit.replace,
            new_text: edit.new_text.clone(),
        }));
    }
    resolved
}

fn shorten_detail(detail: &str) -> String {
    let count = detail.chars().count();
    if count <= DETAIL_LIMIT {
        return detail.to_string();
    }
    let tail: String = detail.chars().skip(count - DETAIL_LIMIT).collect();
    format!("...{tail}")
}

/// The part of `line` before UTF-16 column `character`.
fn line_before(line: &str, character: u32) -> &str {
    let limit = usize::try_from(character).unwrap_or(usize::MAX);
    let mut units = 0;
    for (idx, c) in line.char_indices() {
        if units >= limit {
            return &line[..idx];
        }
        units += c.len_utf16();
    }
    line
}

fn char_count(s: &str) -> i64 {
    i64::try_from(s.chars().count()).unwrap_or(i64::MAX)
}
