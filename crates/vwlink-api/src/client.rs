// Vehicle API HTTP client
//
// Wraps the `Session` with vendor URL construction and status-code
// mapping. Endpoint groups (status, commands, North American status) are
// implemented as inherent methods in separate files to keep this module
// focused on transport.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::models::{DataEnvelope, NaGarageVehicle, RawVehicle};
use crate::session::{ApiRequest, Region, Session, decode, retry_after_secs};

/// Client for the connected-vehicle endpoints of one account.
///
/// Cheap to clone; all clones share the same [`Session`] and the same
/// garage snapshot.
#[derive(Clone)]
pub struct VehicleClient {
    session: Arc<Session>,
    /// Last NA garage listing by VIN. NA status paths need the vehicle id
    /// from it, and capabilities and images are only served there.
    garage: Arc<RwLock<HashMap<String, NaGarageVehicle>>>,
}

impl VehicleClient {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            garage: Arc::default(),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn region(&self) -> Region {
        self.session.endpoints().region
    }

    pub(crate) fn remember_garage(&self, vehicles: &[NaGarageVehicle]) {
        let mut garage = self.garage.write().unwrap_or_else(PoisonError::into_inner);
        garage.clear();
        garage.extend(vehicles.iter().map(|v| (v.vin.clone(), v.clone())));
    }

    pub(crate) fn garage_entry(&self, vin: &str) -> Option<NaGarageVehicle> {
        self.garage
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(vin)
            .cloned()
    }

    // ── URL builders ─────────────────────────────────────────────────

    pub(crate) fn url(&self, path: &str) -> Result<Url, Error> {
        self.session.endpoints().api_url(path)
    }

    pub(crate) fn vehicle_url(&self, vin: &str, path: &str) -> Result<Url, Error> {
        self.url(&format!("vehicle/v1/vehicles/{vin}/{path}"))
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Send an authorized request and map non-success statuses to errors.
    pub(crate) async fn execute(&self, request: &ApiRequest) -> Result<reqwest::Response, Error> {
        let resp = self.session.send(request).await?;
        check_status(resp, request.url.path()).await
    }

    /// GET a JSON document.
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        let resp = self.execute(&ApiRequest::get(url)).await?;
        decode(resp).await
    }

    // ── Vehicles ─────────────────────────────────────────────────────

    /// List all vehicles on the account.
    pub async fn list_vehicles(&self) -> Result<Vec<RawVehicle>, Error> {
        if self.region() == Region::Na {
            let garage = self.garage().await?;
            return Ok(garage
                .into_iter()
                .map(|v| RawVehicle {
                    vin: v.vin,
                    nickname: v.vehicle_nick_name,
                    model: v.model_name,
                })
                .collect());
        }
        let url = self.url("vehicle/v1/vehicles")?;
        let envelope: DataEnvelope<Vec<RawVehicle>> = self.get_json(url).await?;
        debug!(count = envelope.data.len(), "listed vehicles");
        Ok(envelope.data)
    }
}

/// Map vendor status codes onto the error taxonomy.
///
/// 401 never reaches here as a success: the session already retried once
/// and turned a second rejection into [`Error::TokenRejected`].
pub(crate) async fn check_status(
    resp: reqwest::Response,
    path: &str,
) -> Result<reqwest::Response, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let retry_after = retry_after_secs(resp.headers());
    let body = resp.text().await.unwrap_or_default();

    Err(match status {
        StatusCode::UNAUTHORIZED => Error::TokenRejected,
        StatusCode::FORBIDDEN if body.to_ascii_lowercase().contains("consent") => {
            Error::ConsentRequired {
                message: body,
                consent_url: None,
            }
        }
        StatusCode::FORBIDDEN => Error::Forbidden { message: body },
        StatusCode::NOT_FOUND => Error::NotFound {
            path: path.to_owned(),
        },
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimited {
            retry_after_secs: retry_after,
        },
        s if s.is_server_error() => Error::Server {
            status: s.as_u16(),
            message: body,
        },
        s => Error::Api {
            status: s.as_u16(),
            message: body,
        },
    })
}
