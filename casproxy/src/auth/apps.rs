use crate::utils::http::HttpsClient;
use anyhow::{Context, Result, anyhow, bail};
use hyper::Uri;
use log::info;
use serde::Deserialize;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Analysis {
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalysisList {
    #[serde(default)]
    pub analyses: Vec<Analysis>,
}

/// Look up the analysis behind `external_id` in the apps service and return its ID, which is the
/// resource name permission checks are made against.
pub async fn resolve_resource_name(client: &HttpsClient, apps_url: &Url, apps_user: &str, external_id: &str) -> Result<String> {
    let mut url = apps_url.clone();
    url.path_segments_mut()
        .map_err(|_| anyhow!("apps URL {} cannot carry a path", apps_url))?
        .pop_if_empty()
        .extend(["admin", "analyses", "by-external-id", external_id]);
    url.query_pairs_mut().clear().append_pair("user", apps_user);

    let uri: Uri = url.as_str().parse().with_context(|| format!("invalid analysis lookup URL {}", url))?;
    let response = client.get(uri).await.with_context(|| format!("analysis lookup at {} failed", url))?;
    if !response.status().is_success() {
        bail!("analysis lookup at {} returned {}", url, response.status());
    }
    let body = hyper::body::to_bytes(response.into_body()).await.context("failed to read analysis lookup response")?;
    let list: AnalysisList = serde_json::from_slice(&body).with_context(|| format!("analysis lookup at {} returned invalid JSON", url))?;

    let id = list.analyses.into_iter().next().map(|analysis| analysis.id).ok_or_else(|| anyhow!("no analyses found for external ID {}", external_id))?;
    info!("Resolved external ID {external_id} to analysis {id}", external_id = external_id, id = id);
    Ok(id)
}
