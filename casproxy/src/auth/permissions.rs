use crate::auth::Principal;
use crate::config::PermissionSettings;
use crate::error::AccessError;
use crate::utils::http::HttpsClient;
use hyper::Uri;
use log::debug;
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "resource_type", default)]
    pub resource_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "subject_id", default)]
    pub subject_id: String,
    #[serde(rename = "subject_source_id", default)]
    pub source_id: String,
    #[serde(rename = "subject_type", default)]
    pub subject_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "permission_level", default)]
    pub level: String,
    #[serde(default)]
    pub resource: Resource,
    #[serde(default)]
    pub subject: Subject,
}

/// Body of a permission lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PermissionList {
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

impl PermissionList {
    /// Only the first entry counts; any non-empty level on it grants access.
    pub fn grants_access(&self) -> bool {
        self.permissions.first().is_some_and(|permission| !permission.level.is_empty())
    }
}

/// Asks the permission service whether a principal may use the configured resource.
#[derive(Debug, Clone)]
pub struct AccessController {
    settings: PermissionSettings,
    client: HttpsClient,
}

impl AccessController {
    pub fn new(settings: PermissionSettings, client: HttpsClient) -> Self {
        Self { settings, client }
    }

    /// `{permissions}/permissions/subjects/{subject type}/{user}/{resource type}/{resource name}`
    pub fn lookup_url(&self, principal: &Principal) -> Url {
        let mut url = self.settings.permissions_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend([
                "permissions",
                "subjects",
                self.settings.subject_type.as_str(),
                principal.as_str(),
                self.settings.resource_type.as_str(),
                self.settings.resource_name.as_str(),
            ]);
        }
        url
    }

    /// Fails closed: anything but a parsed 2xx answer is an error, which callers treat as denial.
    pub async fn is_allowed(&self, principal: &Principal) -> Result<bool, AccessError> {
        let url = self.lookup_url(principal);
        let uri: Uri = url.as_str().parse()?;

        let response = self.client.get(uri).await.map_err(|source| AccessError::Transport { url: url.to_string(), source })?;
        if !response.status().is_success() {
            return Err(AccessError::Status { url: url.to_string(), status: response.status() });
        }
        let body = hyper::body::to_bytes(response.into_body()).await.map_err(|source| AccessError::Transport { url: url.to_string(), source })?;
        let list: PermissionList = serde_json::from_slice(&body).map_err(|source| AccessError::Parse { url: url.to_string(), source })?;

        let allowed = list.grants_access();
        debug!("Permission lookup on {resource}: allowed={allowed}", resource = self.settings.resource_name, allowed = allowed);
        Ok(allowed)
    }
}
