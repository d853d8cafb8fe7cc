// ── Resource fetchers ──
//
// One entry point per resource kind. Every fetch goes through the request
// cache, skips the network when the gating capability is inactive, and
// hands back normalized sub-state updates rather than raw payloads. The
// region decides which vendor endpoint serves a kind; in North America one
// status report serves several kinds and they share its cache entry.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use vwlink_api::models::{
    NaChargeSummary, NaClimateSummary, NaVehicleReport, ParkingPosition, RawCapability,
    RawVehicle, SelectiveStatus, VehicleImage,
};
use vwlink_api::{Region, VehicleClient};

use crate::cache::{Freshness, RequestCache, Source};
use crate::convert::{
    Blanket, access_updates, blanket_updates, charging_updates, climatisation_updates,
    fuel_status_updates, images_update, maintenance_updates, measurements_updates,
    na_charging_updates, na_climatisation_updates, na_report_updates, position_update,
};
use crate::error::FetchError;
use crate::model::{Capability, CapabilitySet, ResourceKey, ResourceKind, SubStateUpdate};

/// Cached vendor response, stamped with when it was actually fetched.
#[derive(Debug, Clone)]
pub struct Payload {
    fetched_at: DateTime<Utc>,
    body: Body,
}

#[derive(Debug, Clone)]
enum Body {
    Vehicles(Arc<Vec<RawVehicle>>),
    Capabilities(Arc<Vec<RawCapability>>),
    Status(Arc<SelectiveStatus>),
    /// `None` when the vendor reports no position.
    Position(Option<Arc<ParkingPosition>>),
    Images(Arc<Vec<VehicleImage>>),
    NaReport(Arc<NaVehicleReport>),
    NaClimate(Arc<NaClimateSummary>),
    NaCharge(Arc<NaChargeSummary>),
}

impl Payload {
    fn now(body: Body) -> Self {
        Self {
            fetched_at: Utc::now(),
            body,
        }
    }
}

/// Whether producing a result involved talking to the vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Contact {
    /// The vendor answered during this call.
    Vendor,
    /// Served from a fresh cache entry.
    Cached,
    /// Gated by an inactive capability; nothing was requested.
    Skipped,
}

/// Normalized outcome of one resource fetch.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Fetched {
    pub updates: Vec<SubStateUpdate>,
    pub contact: Contact,
}

fn mismatch(key: &ResourceKey) -> FetchError {
    FetchError::Unexpected {
        message: format!("cached payload for {key} has the wrong shape"),
    }
}

pub(crate) struct Fetchers {
    client: VehicleClient,
    cache: RequestCache<Payload>,
}

impl Fetchers {
    pub fn new(client: VehicleClient, cache: RequestCache<Payload>) -> Self {
        Self { client, cache }
    }

    pub fn client(&self) -> &VehicleClient {
        &self.client
    }

    pub fn cache(&self) -> &RequestCache<Payload> {
        &self.cache
    }

    /// Cache key holding `kind` for `vin` in this account's region.
    fn key(&self, vin: &str, kind: ResourceKind) -> ResourceKey {
        ResourceKey::vehicle(vin, cache_kind(self.client.region(), kind))
    }

    /// Drop the cached payload behind `kind` so the next fetch goes out.
    pub fn invalidate(&self, vin: &str, kind: ResourceKind) {
        self.cache.invalidate(&self.key(vin, kind));
    }

    /// Vehicles on the account.
    pub async fn vehicles(&self, max_age: Duration) -> Result<Arc<Vec<RawVehicle>>, FetchError> {
        let key = ResourceKey::account(ResourceKind::VehicleList);
        let client = self.client.clone();
        let payload = self
            .cache
            .fetch(key.clone(), Freshness::Window(max_age), move || async move {
                let vehicles = client.list_vehicles().await?;
                Ok::<_, FetchError>(Payload::now(Body::Vehicles(Arc::new(vehicles))))
            })
            .await?;
        match payload.body {
            Body::Vehicles(vehicles) => Ok(vehicles),
            _ => Err(mismatch(&key)),
        }
    }

    /// Capabilities of one vehicle. Fetched once and kept until invalidated.
    pub async fn capabilities(&self, vin: &str) -> Result<CapabilitySet, FetchError> {
        let key = ResourceKey::vehicle(vin, ResourceKind::Capabilities);
        let client = self.client.clone();
        let owned_vin = vin.to_owned();
        let payload = self
            .cache
            .fetch(key.clone(), Freshness::Lifetime, move || async move {
                let capabilities = client.capabilities(&owned_vin).await?;
                Ok::<_, FetchError>(Payload::now(Body::Capabilities(Arc::new(capabilities))))
            })
            .await?;
        match payload.body {
            Body::Capabilities(raw) => Ok(CapabilitySet::new(
                raw.iter().cloned().map(Capability::from),
            )),
            _ => Err(mismatch(&key)),
        }
    }

    /// Fetch one per-vehicle resource and normalize it.
    ///
    /// A 403 on the whole resource is reported as access-denied sub-states,
    /// not as an error, so the rest of the vehicle keeps syncing.
    pub async fn fetch(
        &self,
        vin: &str,
        kind: ResourceKind,
        capabilities: &CapabilitySet,
        max_age: Duration,
    ) -> Result<Fetched, FetchError> {
        if kind
            .capability()
            .is_some_and(|cap| !capabilities.is_active(&cap, Utc::now()))
        {
            trace!(vin, %kind, "capability inactive, skipping fetch");
            return Ok(Fetched {
                updates: blanket_updates(kind, &Blanket::Unsupported),
                contact: Contact::Skipped,
            });
        }

        let freshness = if kind.is_static() {
            Freshness::Lifetime
        } else {
            Freshness::Window(max_age)
        };
        let key = self.key(vin, kind);
        let client = self.client.clone();
        let owned_vin = vin.to_owned();
        let loaded = key.kind;
        let result = self
            .cache
            .fetch_with_source(key.clone(), freshness, move || load(client, owned_vin, loaded))
            .await;

        match result {
            Ok((payload, source)) => Ok(Fetched {
                updates: normalize(&key, kind, &payload)?,
                contact: match source {
                    Source::Cache => Contact::Cached,
                    Source::Network => Contact::Vendor,
                },
            }),
            // A refusal is still an answer from the vendor.
            Err(FetchError::Forbidden { message }) => {
                debug!(vin, %kind, %message, "resource denied by vendor");
                Ok(Fetched {
                    updates: blanket_updates(
                        kind,
                        &Blanket::Denied {
                            message,
                            since: Utc::now(),
                        },
                    ),
                    contact: Contact::Vendor,
                })
            }
            Err(e) => Err(e),
        }
    }
}

/// Kind whose cache entry holds `kind`.
///
/// The NA status report covers doors, odometer, range and maintenance, so
/// those four are stored under [`ResourceKind::Access`].
pub(crate) fn cache_kind(region: Region, kind: ResourceKind) -> ResourceKind {
    match (region, kind) {
        (
            Region::Na,
            ResourceKind::Measurements | ResourceKind::FuelStatus | ResourceKind::Maintenance,
        ) => ResourceKind::Access,
        _ => kind,
    }
}

async fn load(client: VehicleClient, vin: String, kind: ResourceKind) -> Result<Payload, FetchError> {
    if client.region() == Region::Na {
        let body = match kind {
            ResourceKind::Access => Body::NaReport(Arc::new(client.vehicle_report(&vin).await?)),
            ResourceKind::Charging => Body::NaCharge(Arc::new(client.charge_summary(&vin).await?)),
            ResourceKind::Climatisation => {
                Body::NaClimate(Arc::new(client.climate_summary(&vin).await?))
            }
            _ => return load_common(&client, &vin, kind).await,
        };
        return Ok(Payload::now(body));
    }
    load_common(&client, &vin, kind).await
}

/// Endpoints both regions share, plus the EMEA status jobs.
async fn load_common(
    client: &VehicleClient,
    vin: &str,
    kind: ResourceKind,
) -> Result<Payload, FetchError> {
    let body = match kind {
        ResourceKind::ParkingPosition => match client.parking_position(vin).await {
            Ok(position) => Body::Position(Some(Arc::new(position))),
            Err(vwlink_api::Error::ResourceUnavailable { .. }) => Body::Position(None),
            Err(e) => return Err(e.into()),
        },
        ResourceKind::Images => Body::Images(Arc::new(client.images(vin).await?)),
        other => {
            let job = other.status_job().ok_or_else(|| FetchError::Unexpected {
                message: format!("{other} is not a vehicle status resource"),
            })?;
            Body::Status(Arc::new(client.selective_status(vin, &[job]).await?))
        }
    };
    Ok(Payload::now(body))
}

fn normalize(
    key: &ResourceKey,
    kind: ResourceKind,
    payload: &Payload,
) -> Result<Vec<SubStateUpdate>, FetchError> {
    let at = payload.fetched_at;
    let updates = match (&payload.body, kind) {
        (Body::Status(s), ResourceKind::Access) => access_updates(s.access.as_ref(), at),
        (Body::Status(s), ResourceKind::Charging) => charging_updates(s.charging.as_ref(), at),
        (Body::Status(s), ResourceKind::Climatisation) => {
            climatisation_updates(s.climatisation.as_ref(), at)
        }
        (Body::Status(s), ResourceKind::Measurements) => {
            measurements_updates(s.measurements.as_ref(), at)
        }
        (Body::Status(s), ResourceKind::FuelStatus) => {
            fuel_status_updates(s.fuel_status.as_ref(), at)
        }
        (Body::Status(s), ResourceKind::Maintenance) => {
            maintenance_updates(s.vehicle_health_inspection.as_ref(), at)
        }
        (Body::Position(p), ResourceKind::ParkingPosition) => vec![position_update(p.as_deref(), at)],
        (Body::Images(images), ResourceKind::Images) => vec![images_update(images, at)],
        (
            Body::NaReport(report),
            kind @ (ResourceKind::Access
            | ResourceKind::Measurements
            | ResourceKind::FuelStatus
            | ResourceKind::Maintenance),
        ) => na_report_updates(kind, report, at),
        (Body::NaCharge(summary), ResourceKind::Charging) => na_charging_updates(summary, at),
        (Body::NaClimate(summary), ResourceKind::Climatisation) => {
            na_climatisation_updates(summary, at)
        }
        _ => return Err(mismatch(key)),
    };
    Ok(updates)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;
    use url::Url;
    use vwlink_api::{Credentials, Endpoints, Session, TransportConfig};

    use super::*;
    use crate::model::{SubState, SubStateUpdate as U};

    fn offline_fetchers() -> Fetchers {
        // Nothing listens on the discard port; any request would fail.
        let session = Session::new(
            Credentials::new("driver@example.com", SecretString::from("pw")),
            Endpoints::single_host(Url::parse("http://127.0.0.1:9").unwrap()),
            &TransportConfig::default(),
        )
        .unwrap();
        Fetchers::new(VehicleClient::new(Arc::new(session)), RequestCache::new())
    }

    #[tokio::test]
    async fn inactive_capability_yields_unsupported_without_network() {
        let fetchers = offline_fetchers();
        let fetched = fetchers
            .fetch(
                "WVWZZZ1KZAW000001",
                ResourceKind::ParkingPosition,
                &CapabilitySet::default(),
                Duration::from_secs(60),
            )
            .await
            .unwrap();
        assert_eq!(fetched.updates, vec![U::Position(SubState::Unsupported)]);
        assert_eq!(fetched.contact, Contact::Skipped);
    }

    #[tokio::test]
    async fn images_are_not_gated() {
        let fetchers = offline_fetchers();
        let result = fetchers
            .fetch(
                "WVWZZZ1KZAW000001",
                ResourceKind::Images,
                &CapabilitySet::default(),
                Duration::from_secs(60),
            )
            .await;
        // No capability needed, so the fetch was attempted and failed.
        assert!(result.is_err());
    }

    #[test]
    fn mismatched_payload_is_an_error() {
        let key = ResourceKey::vehicle("VIN", ResourceKind::Access);
        let payload = Payload::now(Body::Images(Arc::new(Vec::new())));
        assert!(matches!(
            normalize(&key, ResourceKind::Access, &payload),
            Err(FetchError::Unexpected { .. })
        ));
    }

    #[test]
    fn na_report_kinds_share_one_cache_entry() {
        for kind in [
            ResourceKind::Access,
            ResourceKind::Measurements,
            ResourceKind::FuelStatus,
            ResourceKind::Maintenance,
        ] {
            assert_eq!(cache_kind(Region::Na, kind), ResourceKind::Access);
            assert_eq!(cache_kind(Region::Emea, kind), kind);
        }
        assert_eq!(
            cache_kind(Region::Na, ResourceKind::Charging),
            ResourceKind::Charging
        );
    }
}
