//! Managed-cloud member discovery.
//!
//! The discovery service answers `GET /cluster/discovery?token=<token>` with
//! a JSON array of members, each carrying a private and a public address.
//! The client sits outside the cloud network, so only public addresses are
//! used.

use crate::error::{GridError, GridResult};
use crate::models::{CloudConfig, MemberAddress};

use serde::Deserialize;
use std::time::Duration;

const DISCOVERY_PATH: &str = "/cluster/discovery";

#[derive(Debug, Deserialize)]
struct DiscoveredMember {
    #[serde(rename = "public-address")]
    public_address: String,
}

/// Discovery URL for a token; the base may be a bare host or a full URL.
pub fn discovery_url(url_base: &str, token: &str) -> String {
    let base = url_base.trim().trim_end_matches('/');
    let base = if base.starts_with("http://") || base.starts_with("https://") {
        base.to_string()
    } else {
        format!("https://{base}")
    };
    format!("{base}{DISCOVERY_PATH}?token={token}")
}

/// Parse the discovery response body into public member addresses.
pub fn parse_members(body: &str) -> GridResult<Vec<MemberAddress>> {
    let members: Vec<DiscoveredMember> = serde_json::from_str(body)?;
    members
        .iter()
        .map(|m| {
            MemberAddress::parse(&m.public_address).map_err(|e| {
                GridError::discovery(format!("Bad public address '{}': {e}", m.public_address))
            })
        })
        .collect()
}

/// Ask the discovery service for the current members.
pub async fn discover(cloud: &CloudConfig, timeout: Duration) -> GridResult<Vec<MemberAddress>> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let url = discovery_url(&cloud.url_base, &cloud.discovery_token);
    tracing::debug!(base = %cloud.url_base, "Querying cloud discovery");

    let response = client.get(&url).send().await?;
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(GridError::discovery(format!(
            "Discovery service returned {status}: {}",
            body.trim()
        )));
    }

    let members = parse_members(&body)?;
    if members.is_empty() {
        return Err(GridError::discovery("Discovery service returned no members"));
    }
    tracing::info!(count = members.len(), "Discovered cloud members");
    Ok(members)
}
