// Remote command endpoints
//
// Submission returns an acknowledgement with an optional request id. When
// present, the request status endpoint reports progress until the vehicle
// confirms or rejects the action.

use reqwest::StatusCode;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::auth::Spin;
use crate::client::VehicleClient;
use crate::error::Error;
use crate::models::{DataEnvelope, FieldError};
use crate::session::ApiRequest;

/// Wire-level command with its vendor parameters.
#[derive(Debug, Clone)]
pub enum CommandRequest {
    Lock { spin: Spin },
    Unlock { spin: Spin },
    StartClimatisation { target_temperature_c: Option<f64> },
    StopClimatisation,
    ClimatisationSettings { target_temperature_c: f64 },
    WindowHeating { start: bool },
    StartCharging,
    StopCharging,
    ChargingSettings { target_soc_pct: u8 },
    WakeUp,
    HonkAndFlash {
        honk: bool,
        duration_secs: u32,
        latitude: f64,
        longitude: f64,
    },
}

/// Vendor temperatures are set in half-degree steps.
fn half_degree(celsius: f64) -> f64 {
    (celsius * 2.0).round() / 2.0
}

impl CommandRequest {
    fn to_request(&self, client: &VehicleClient, vin: &str) -> Result<ApiRequest, Error> {
        let post = |path: &str, body: Value| -> Result<ApiRequest, Error> {
            Ok(ApiRequest::post(client.vehicle_url(vin, path)?, body))
        };
        let put = |path: &str, body: Value| -> Result<ApiRequest, Error> {
            Ok(ApiRequest::put(client.vehicle_url(vin, path)?, body))
        };

        match self {
            Self::Lock { spin } => post(
                "access/lock",
                json!({ "spin": spin.secret().expose_secret() }),
            ),
            Self::Unlock { spin } => post(
                "access/unlock",
                json!({ "spin": spin.secret().expose_secret() }),
            ),
            Self::StartClimatisation {
                target_temperature_c,
            } => {
                let body = match target_temperature_c {
                    Some(t) => json!({
                        "targetTemperature": half_degree(*t),
                        "targetTemperatureUnit": "celsius",
                    }),
                    None => json!({}),
                };
                post("climatisation/start", body)
            }
            Self::StopClimatisation => post("climatisation/stop", json!({})),
            Self::ClimatisationSettings {
                target_temperature_c,
            } => put(
                "climatisation/settings",
                json!({
                    "targetTemperature": half_degree(*target_temperature_c),
                    "targetTemperatureUnit": "celsius",
                }),
            ),
            Self::WindowHeating { start: true } => post("windowheating/start", json!({})),
            Self::WindowHeating { start: false } => post("windowheating/stop", json!({})),
            Self::StartCharging => post("charging/start", json!({})),
            Self::StopCharging => post("charging/stop", json!({})),
            Self::ChargingSettings { target_soc_pct } => put(
                "charging/settings",
                json!({ "targetSOC_pct": target_soc_pct }),
            ),
            Self::WakeUp => post("vehiclewakeuptrigger", json!({})),
            Self::HonkAndFlash {
                honk,
                duration_secs,
                latitude,
                longitude,
            } => post(
                "honkandflash",
                json!({
                    "mode": if *honk { "HONK_AND_FLASH" } else { "FLASH" },
                    "duration_s": duration_secs,
                    "userPosition": { "latitude": latitude, "longitude": longitude },
                }),
            ),
        }
    }
}

/// Vendor acknowledgement of a submitted command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandAck {
    /// Id to poll. `None` means the vendor completed the action synchronously.
    pub request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AckBody {
    data: Option<AckData>,
}

#[derive(Debug, Deserialize)]
struct AckData {
    #[serde(rename = "requestID")]
    request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: String,
    error: Option<FieldError>,
}

/// Progress of a command as reported by the vendor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    Queued,
    InProgress,
    Succeeded,
    Failed { reason: String },
}

impl RemoteStatus {
    fn parse(body: StatusBody) -> Self {
        match body.status.to_ascii_lowercase().as_str() {
            "successful" | "succeeded" | "success" => Self::Succeeded,
            "queued" | "request_queued" => Self::Queued,
            "fail" | "failed" | "error" | "rejected" | "timeout" => Self::Failed {
                reason: body
                    .error
                    .and_then(|e| e.message.or(e.info))
                    .unwrap_or(body.status),
            },
            // in_progress, delayed, and anything new the vendor invents
            _ => Self::InProgress,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed { .. })
    }
}

impl VehicleClient {
    /// Submit a command. Returns once the vendor has accepted it.
    pub async fn submit_command(
        &self,
        vin: &str,
        command: &CommandRequest,
    ) -> Result<CommandAck, Error> {
        let request = command.to_request(self, vin)?;
        let resp = self.execute(&request).await?;

        if resp.status() == StatusCode::NO_CONTENT {
            return Ok(CommandAck { request_id: None });
        }

        let body = resp.text().await.map_err(Error::Transport)?;
        let request_id = serde_json::from_str::<AckBody>(&body)
            .ok()
            .and_then(|ack| ack.data)
            .and_then(|data| data.request_id);
        debug!(vin, ?request_id, "command accepted");
        Ok(CommandAck { request_id })
    }

    /// Poll the status of a previously submitted command.
    pub async fn command_status(&self, vin: &str, request_id: &str) -> Result<RemoteStatus, Error> {
        let url = self.vehicle_url(vin, &format!("requests/{request_id}/status"))?;
        let envelope: DataEnvelope<StatusBody> = self.get_json(url).await?;
        Ok(RemoteStatus::parse(envelope.data))
    }

    /// Check an S-PIN against the account without performing an action.
    pub async fn verify_spin(&self, spin: &Spin) -> Result<(), Error> {
        let url = self.url("vehicle/v1/spin/verify")?;
        let body = json!({ "spin": spin.secret().expose_secret() });
        self.execute(&ApiRequest::post(url, body)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(s: &str) -> RemoteStatus {
        RemoteStatus::parse(StatusBody {
            status: s.into(),
            error: None,
        })
    }

    #[test]
    fn maps_vendor_status_strings() {
        assert_eq!(status("successful"), RemoteStatus::Succeeded);
        assert_eq!(status("queued"), RemoteStatus::Queued);
        assert_eq!(status("in_progress"), RemoteStatus::InProgress);
        assert_eq!(status("delayed"), RemoteStatus::InProgress);
        assert!(matches!(status("fail"), RemoteStatus::Failed { .. }));
    }

    #[test]
    fn failure_reason_prefers_vendor_message() {
        let parsed = RemoteStatus::parse(StatusBody {
            status: "fail".into(),
            error: Some(FieldError {
                message: Some("vehicle unreachable".into()),
                code: Some(2101),
                group: None,
                info: None,
            }),
        });
        assert_eq!(
            parsed,
            RemoteStatus::Failed {
                reason: "vehicle unreachable".into()
            }
        );
    }

    #[test]
    fn rounds_temperature_to_half_degrees() {
        assert!((half_degree(21.3) - 21.5).abs() < f64::EPSILON);
        assert!((half_degree(21.2) - 21.0).abs() < f64::EPSILON);
    }
}
