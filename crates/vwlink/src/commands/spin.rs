//! S-PIN handlers.

use vwlink_core::{Connector, ConnectorConfig};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub async fn verify(config: ConnectorConfig, global: &GlobalOpts) -> Result<(), CliError> {
    Connector::oneshot(config, |connector| async move { connector.verify_spin().await }).await?;
    if !global.quiet {
        eprintln!("S-PIN verified");
    }
    Ok(())
}
