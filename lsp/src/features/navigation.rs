//! Definition-family and references requests.

use lsp_types::request::{References, Request as LspRequest};
use lsp_types::{GotoDefinitionParams, GotoDefinitionResponse, Location, Range, ReferenceParams};
use serde::Serialize;

use super::FeatureResponse;
use crate::client::LanguageClient;
use crate::error::ClientError;
use crate::protocol;

/// A location with a filesystem path for `file://` URIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditorLocation {
    pub uri: String,
    pub range: Range,
}

impl From<Location> for EditorLocation {
    fn from(location: Location) -> Self {
        Self {
            uri: protocol::display_path(&location.uri),
            range: location.range,
        }
    }
}

/// Definition, declaration, type definition and implementation share one
/// request and response shape.
pub(crate) async fn goto<R>(
    client: &LanguageClient,
    params: GotoDefinitionParams,
) -> Result<FeatureResponse, ClientError>
where
    R: LspRequest<Params = GotoDefinitionParams, Result = Option<GotoDefinitionResponse>>,
{
    let response = client.send_request::<R>(params).await?;
    Ok(FeatureResponse::Locations(normalize(response)))
}

pub(crate) async fn references(
    client: &LanguageClient,
    params: ReferenceParams,
) -> Result<FeatureResponse, ClientError> {
    let locations = client
        .send_request::<References>(params)
        .await?
        .unwrap_or_default();
    Ok(FeatureResponse::Locations(
        locations.into_iter().map(EditorLocation::from).collect(),
    ))
}

fn normalize(response: Option<GotoDefinitionResponse>) -> Vec<EditorLocation> {
    match response {
        None => Vec::new(),
        Some(GotoDefinitionResponse::Scalar(location)) => vec![location.into()],
        Some(GotoDefinitionResponse::Array(locations)) => {
            locations.into_iter().map(EditorLocation::from).collect()
        }
        Some(GotoDefinitionResponse::Link(links)) => links
            .into_iter()
            .map(|link| EditorLocation {
                uri: protocol::display_path(&link.target_uri),
                range: link.target_range,
            })
            .collect(),
    }
}
