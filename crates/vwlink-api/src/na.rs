// North American status endpoints
//
// The NA backend addresses vehicles by the garage's `vehicleId` rather
// than the VIN, so every call here resolves the VIN through the garage
// snapshot first and re-lists the garage once when the VIN is unknown.

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::client::VehicleClient;
use crate::error::Error;
use crate::models::{
    DataEnvelope, MaybeData, NaChargeSummary, NaClimateSummary, NaGarage, NaGarageVehicle,
    NaVehicleReport,
};

impl VehicleClient {
    /// Every vehicle on an NA account, with inline capabilities.
    pub async fn garage(&self) -> Result<Vec<NaGarageVehicle>, Error> {
        let url = self.url("account/v1/garage")?;
        let envelope: DataEnvelope<NaGarage> = self.get_json(url).await?;
        let vehicles = envelope.data.vehicles;
        debug!(count = vehicles.len(), "listed garage");
        self.remember_garage(&vehicles);
        Ok(vehicles)
    }

    /// Garage entry for `vin`, listing the garage if it is not known yet.
    pub(crate) async fn na_vehicle(&self, vin: &str) -> Result<NaGarageVehicle, Error> {
        if let Some(vehicle) = self.garage_entry(vin) {
            return Ok(vehicle);
        }
        self.garage()
            .await?
            .into_iter()
            .find(|v| v.vin == vin)
            .ok_or_else(|| Error::NotFound {
                path: format!("account/v1/garage/{vin}"),
            })
    }

    async fn na_get<T: DeserializeOwned>(&self, vin: &str, path: &str) -> Result<T, Error> {
        let vehicle = self.na_vehicle(vin).await?;
        let url = self.url(&path.replace("{id}", &vehicle.vehicle_id))?;
        let body: MaybeData<T> = self.get_json(url).await?;
        Ok(body.into_inner())
    }

    /// Doors, range, odometer and maintenance in one report.
    pub async fn vehicle_report(&self, vin: &str) -> Result<NaVehicleReport, Error> {
        self.na_get(vin, "rvs/v1/vehicle/{id}").await
    }

    pub async fn climate_summary(&self, vin: &str) -> Result<NaClimateSummary, Error> {
        self.na_get(vin, "ev/v1/vehicle/{id}/climate/summary").await
    }

    pub async fn charge_summary(&self, vin: &str) -> Result<NaChargeSummary, Error> {
        self.na_get(vin, "ev/v1/vehicle/{id}/charge/summary").await
    }
}
