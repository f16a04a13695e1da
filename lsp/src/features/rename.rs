//! Rename and prepare-rename.

use lsp_types::request::{PrepareRenameRequest, Rename};
use lsp_types::{
    DocumentChangeOperation, DocumentChanges, OneOf, OptionalVersionedTextDocumentIdentifier,
    PrepareRenameResponse, Range, RenameParams, TextDocumentEdit, TextDocumentPositionParams,
    WorkspaceEdit,
};
use serde::Serialize;

use super::FeatureResponse;
use crate::client::LanguageClient;
use crate::error::ClientError;

/// The single prepare-rename shape handed to the editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditorPrepareRename {
    pub range: Range,
    pub placeholder: String,
}

pub(crate) async fn rename(
    client: &LanguageClient,
    params: RenameParams,
) -> Result<FeatureResponse, ClientError> {
    let edit = client.send_request::<Rename>(params).await?;
    Ok(FeatureResponse::Rename(edit.map(into_document_changes)))
}

pub(crate) async fn prepare_rename(
    client: &LanguageClient,
    params: TextDocumentPositionParams,
) -> Result<FeatureResponse, ClientError> {
    let response = client.send_request::<PrepareRenameRequest>(params).await?;
    Ok(FeatureResponse::PrepareRename(normalize_prepare(response)))
}

/// Move a legacy `changes` map into `documentChanges`, ordered by URI.
fn into_document_changes(mut edit: WorkspaceEdit) -> WorkspaceEdit {
    let Some(changes) = edit.changes.take() else {
        return edit;
    };

    let mut changes: Vec<_> = changes.into_iter().collect();
    changes.sort_by(|(a, _), (b, _)| a.as_str().cmp(b.as_str()));
    let flattened = changes.into_iter().map(|(uri, edits)| TextDocumentEdit {
        text_document: OptionalVersionedTextDocumentIdentifier { uri, version: None },
        edits: edits.into_iter().map(OneOf::Left).collect(),
    });

    edit.document_changes = Some(match edit.document_changes.take() {
        None => DocumentChanges::Edits(flattened.collect()),
        Some(DocumentChanges::Edits(mut existing)) => {
            existing.extend(flattened);
            DocumentChanges::Edits(existing)
        }
        Some(DocumentChanges::Operations(mut existing)) => {
            existing.extend(flattened.map(DocumentChangeOperation::Edit));
            DocumentChanges::Operations(existing)
        }
    });
    edit
}

fn normalize_prepare(response: Option<PrepareRenameResponse>) -> Option<EditorPrepareRename> {
    match response? {
        PrepareRenameResponse::DefaultBehavior { .. } => None,
        PrepareRenameResponse::Range(range) => Some(EditorPrepareRename {
            range,
            placeholder: String::new(),
        }),
        PrepareRenameResponse::RangeWithPlaceholder { range, placeholder } => {
            Some(EditorPrepareRename { range, placeholder })
        }
    }
}
