//! HTTP client for the Proxmox VE API.
//!
//! Only the pieces the coordination core needs: API token authentication and
//! the `/cluster/nextid` query that backs VM ID allocation.

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;

use crate::PVECOORD_VERSION;
use crate::authority::{AuthorityError, IdAuthority};
use crate::config::{ConfigError, Credentials, ProviderConfig};
use crate::vmid::VmId;

/// Body of a Proxmox API response: `{"data": ...}`, with `errors` on failure.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    errors: Option<serde_json::Value>,
}

enum NextIdReply {
    Free(VmId),
    /// The requested vmid is in use.
    Taken(VmId),
}

pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ConfigError> {
        let base_url = normalize_base_url(&config.api_url)?;

        let timeout = config.request_timeout()?;
        let (token_id, token_secret) = match config.credentials()? {
            Credentials::ApiToken { id, secret } => (id, secret),
            Credentials::Password { .. } => return Err(ConfigError::PasswordSessionUnsupported),
        };

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("PVEAPIToken={token_id}={token_secret}"))
            .map_err(|_| ConfigError::InvalidValue {
                name: "PM_API_TOKEN_ID",
                value: token_id.to_string(),
            })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(format!("pvecoord/{PVECOORD_VERSION}"))
            .timeout(timeout)
            .danger_accept_invalid_certs(config.tls_insecure)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn query_next_id(&self, vmid: Option<VmId>) -> Result<NextIdReply, AuthorityError> {
        let url = format!("{}/cluster/nextid", self.base_url);
        let mut request = self.http.get(&url);
        if let Some(id) = vmid {
            request = request.query(&[("vmid", id.get())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AuthorityError::Transport {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        // Proxmox answers 400 when the requested vmid is already in use.
        if status == StatusCode::BAD_REQUEST
            && let Some(id) = vmid
        {
            return Ok(NextIdReply::Taken(id));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthorityError::Status {
                url,
                status: status.as_u16(),
                body,
            });
        }

        let body: ApiResponse = response.json().await.map_err(|e| AuthorityError::Decode {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        if let Some(errors) = body.errors.filter(|e| !e.is_null()) {
            if let Some(id) = vmid {
                return Ok(NextIdReply::Taken(id));
            }
            return Err(AuthorityError::Decode {
                url,
                reason: format!("errors in response: {errors}"),
            });
        }

        parse_vm_id(body.data.as_ref())
            .map(NextIdReply::Free)
            .ok_or_else(|| AuthorityError::Decode {
                url,
                reason: format!("expected a VM ID in data, got {:?}", body.data),
            })
    }
}

#[async_trait]
impl IdAuthority for ApiClient {
    async fn next_free_id(&self, from: Option<VmId>) -> Result<VmId, AuthorityError> {
        let mut candidate = from;
        loop {
            match self.query_next_id(candidate).await? {
                NextIdReply::Free(id) => return Ok(id),
                NextIdReply::Taken(taken) => {
                    tracing::trace!(vm_id = %taken, "VM ID in use, trying the next one");
                    candidate = Some(taken.next().ok_or(AuthorityError::Exhausted(taken))?);
                }
            }
        }
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Proxmox returns the ID as a string; accept a bare number too.
fn parse_vm_id(data: Option<&serde_json::Value>) -> Option<VmId> {
    match data? {
        serde_json::Value::String(s) => s.parse().ok(),
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()).and_then(VmId::new),
        _ => None,
    }
}

fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };

    let url = reqwest::Url::parse(raw.trim()).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host"));
    }

    Ok(url.as_str().trim_end_matches('/').to_string())
}
