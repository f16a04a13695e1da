use lsp_types::DocumentFormattingParams;
use lsp_types::request::Formatting;

use super::FeatureResponse;
use crate::client::LanguageClient;
use crate::error::ClientError;

/// A null result means "no edits".
pub(crate) async fn format(
    client: &LanguageClient,
    params: DocumentFormattingParams,
) -> Result<FeatureResponse, ClientError> {
    let edits = client
        .send_request::<Formatting>(params)
        .await?
        .unwrap_or_default();
    Ok(FeatureResponse::Formatting(edits))
}
