//! Chassis chain and port assignment.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{first_link, id_text, RestSession, CHASSIS_CONNECT_TIMEOUT};
use crate::error::{ApiError, PortRef, TransportError};
use crate::gateway::Gateway;
use crate::operation::{flag, is_locked_resource, Poller, DEFAULT_TIMEOUT};

/// Gateway error text for a port that a community already owns.
const ALREADY_ASSIGNED: &str = "has already been assigned";

/// Which chassis to use and which `(card, port)` pairs go to each community
/// (`"Traffic1@Network1"`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortPlan {
    pub chassis_ip: String,
    #[serde(default)]
    pub communities: BTreeMap<String, Vec<(u32, u32)>>,
}

/// A chassis in the session's chassis chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chassis {
    pub id: u64,
    /// Absolute URL of the chassis resource.
    pub url: String,
}

impl<G: Gateway> RestSession<G> {
    /// Find `chassis_ip` in the chassis chain, or add it, refresh its
    /// connection and wait until it is connected.
    pub async fn add_chassis(&self, chassis_ip: &str) -> Result<Chassis, ApiError> {
        let list_url = self.url("ixLoad/chassisChain/chassisList");
        let listing = self.gateway.get(&list_url).await?;

        for entry in listing.body.as_array().into_iter().flatten() {
            if entry.get("name").and_then(Value::as_str) != Some(chassis_ip) {
                continue;
            }
            let id = chassis_id(entry).ok_or_else(|| ApiError::protocol(&list_url, "listed chassis has no id"))?;
            let href = first_link(entry)
                .ok_or_else(|| ApiError::protocol(&list_url, "listed chassis has no links"))?;
            info!(%chassis_ip, id, "chassis already in chain");
            return Ok(Chassis {
                id,
                url: self.gateway.resolve(href.trim_end_matches("/docs")),
            });
        }

        info!(%chassis_ip, "adding chassis to chain");
        let response = self.gateway.post(&list_url, json!({ "name": chassis_ip })).await?;
        let url = self.gateway.resolve(response.operation_handle(&list_url)?);
        let created = self.gateway.get(&url).await?;
        let id = chassis_id(&created.body).ok_or_else(|| ApiError::protocol(&url, "new chassis has no id"))?;
        let chassis = Chassis { id, url };

        self.refresh_connection(&chassis).await?;
        self.wait_for_chassis_connected(&chassis).await?;
        Ok(chassis)
    }

    pub async fn refresh_connection(&self, chassis: &Chassis) -> Result<(), ApiError> {
        self.post_and_drain(
            &format!("{}/operations/refreshConnection", chassis.url),
            json!({}),
            DEFAULT_TIMEOUT,
        )
        .await
    }

    /// Wait for `isConnected`, retrying through locked-resource answers.
    pub async fn wait_for_chassis_connected(&self, chassis: &Chassis) -> Result<(), ApiError> {
        Poller::new(&self.gateway)
            .wait_for_condition(
                &chassis.url,
                |body| flag(body, "isConnected"),
                is_locked_resource,
                CHASSIS_CONNECT_TIMEOUT,
            )
            .await?;
        info!(id = chassis.id, "chassis connected");
        Ok(())
    }

    /// Add the plan's chassis and attach its ports to every community of the
    /// active test.
    ///
    /// Every community of the loaded configuration must appear in the plan;
    /// this is checked before any port is posted. Ports that are already
    /// assigned are accepted. All other failures are collected and reported
    /// together.
    pub async fn assign_chassis_and_ports(&self, plan: &PortPlan) -> Result<Chassis, ApiError> {
        let chassis = self.add_chassis(&plan.chassis_ip).await?;

        let community_url = self.url("ixLoad/test/activeTest/communityList");
        let listing = self.gateway.get(&community_url).await?;
        let mut communities = Vec::new();
        for entry in listing.body.as_array().into_iter().flatten() {
            let name = entry
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| ApiError::protocol(&community_url, "community without name"))?;
            let object_id = entry
                .get("objectID")
                .and_then(id_text)
                .ok_or_else(|| ApiError::protocol(&community_url, "community without objectID"))?;
            let Some(ports) = plan.communities.get(name) else {
                return Err(ApiError::UnknownCommunity {
                    name: name.to_string(),
                    planned: plan.communities.keys().cloned().collect(),
                });
            };
            communities.push((name.to_string(), object_id, ports));
        }

        self.refresh_connection(&chassis).await?;
        self.wait_for_chassis_connected(&chassis).await?;

        let mut failed = Vec::new();
        for (name, object_id, ports) in communities {
            let url = format!("{}/{}/network/portList", community_url, object_id);
            for &(card_id, port_id) in ports {
                let port = PortRef {
                    chassis_id: chassis.id,
                    card_id,
                    port_id,
                };
                let body = json!({ "chassisId": chassis.id, "cardId": card_id, "portId": port_id });
                match self.gateway.post(&url, body).await {
                    Ok(_) => info!(community = %name, %port, "port assigned"),
                    Err(e @ TransportError::Status { .. }) => {
                        if e.gateway_message().is_some_and(|m| m.contains(ALREADY_ASSIGNED)) {
                            info!(community = %name, %port, "port already assigned");
                        } else {
                            warn!(community = %name, %port, error = %e, "port assignment failed");
                            failed.push(port);
                        }
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        if !failed.is_empty() {
            return Err(ApiError::PortAssignment {
                chassis_ip: plan.chassis_ip.clone(),
                failed,
            });
        }
        Ok(chassis)
    }
}

fn chassis_id(entry: &Value) -> Option<u64> {
    id_text(entry.get("id")?)?.parse().ok()
}
