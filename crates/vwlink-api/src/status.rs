// Status endpoints
//
// Read-only vehicle resources: capabilities, selective status jobs,
// parking position, and image metadata.

use reqwest::StatusCode;
use tracing::debug;

use crate::client::{VehicleClient, check_status};
use crate::error::Error;
use crate::models::{
    CapabilityList, DataEnvelope, ParkingPosition, RawCapability, SelectiveStatus, VehicleImage,
};
use crate::session::{ApiRequest, Region, decode};

impl VehicleClient {
    /// Capabilities licensed for one vehicle.
    pub async fn capabilities(&self, vin: &str) -> Result<Vec<RawCapability>, Error> {
        if self.region() == Region::Na {
            return Ok(self.na_vehicle(vin).await?.capabilities);
        }
        let url = self.vehicle_url(vin, "capabilities")?;
        let list: CapabilityList = self.get_json(url).await?;
        Ok(list.capabilities)
    }

    /// Fetch the given status jobs (e.g. `access`, `charging`).
    pub async fn selective_status(&self, vin: &str, jobs: &[&str]) -> Result<SelectiveStatus, Error> {
        let mut url = self.vehicle_url(vin, "selectivestatus")?;
        url.query_pairs_mut().append_pair("jobs", &jobs.join(","));
        self.get_json(url).await
    }

    /// Last known parking position.
    ///
    /// The vendor answers 204 (or 404 on older backends) while the car is
    /// moving or position sharing is off; both map to
    /// [`Error::ResourceUnavailable`].
    pub async fn parking_position(&self, vin: &str) -> Result<ParkingPosition, Error> {
        let request = ApiRequest::get(self.vehicle_url(vin, "parkingposition")?);
        let resp = self.session().send(&request).await?;

        match resp.status() {
            StatusCode::NO_CONTENT | StatusCode::NOT_FOUND => {
                debug!(vin, "no parking position available");
                Err(Error::ResourceUnavailable {
                    message: "no parking position available".into(),
                })
            }
            _ => {
                let resp = check_status(resp, request.url.path()).await?;
                let envelope: DataEnvelope<ParkingPosition> = decode(resp).await?;
                Ok(envelope.data)
            }
        }
    }

    /// Image metadata for a vehicle. Images themselves are not downloaded.
    ///
    /// NA vehicles have a single representative image from the garage.
    pub async fn images(&self, vin: &str) -> Result<Vec<VehicleImage>, Error> {
        if self.region() == Region::Na {
            let vehicle = self.na_vehicle(vin).await?;
            return Ok(vehicle
                .representative_img_url
                .map(|url| VehicleImage {
                    id: "representative".into(),
                    url,
                    file_name: None,
                })
                .into_iter()
                .collect());
        }
        let url = self.url(&format!("media/v2/vehicle-images/{vin}"))?;
        let envelope: DataEnvelope<Vec<VehicleImage>> = self.get_json(url).await?;
        Ok(envelope.data)
    }
}
