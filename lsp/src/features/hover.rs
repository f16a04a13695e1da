//! Hover and signature help, passed through unchanged.

use lsp_types::request::{HoverRequest, SignatureHelpRequest};
use lsp_types::{HoverParams, SignatureHelpParams};

use super::FeatureResponse;
use crate::client::LanguageClient;
use crate::error::ClientError;

pub(crate) async fn hover(
    client: &LanguageClient,
    params: HoverParams,
) -> Result<FeatureResponse, ClientError> {
    let hover = client.send_request::<HoverRequest>(params).await?;
    Ok(FeatureResponse::Hover(hover))
}

pub(crate) async fn signature_help(
    client: &LanguageClient,
    params: SignatureHelpParams,
) -> Result<FeatureResponse, ClientError> {
    let help = client.send_request::<SignatureHelpRequest>(params).await?;
    Ok(FeatureResponse::SignatureHelp(help))
}
