//! Shared health-probe classification for HTTP-checked deployers.

use promprobe_client::ClientError;
use promprobe_core::DeployError;

/// Maps a client probe onto the deployer health contract.
///
/// An unreachable or slow target is merely unhealthy (`Ok(false)`); only a
/// malformed response counts as failure to attempt the check.
pub(crate) fn probe_to_health(result: Result<bool, ClientError>) -> Result<bool, DeployError> {
    match result {
        Ok(healthy) => Ok(healthy),
        Err(ClientError::Connection { .. } | ClientError::Timeout { .. }) => Ok(false),
        Err(err) => Err(DeployError::HealthCheck(err.to_string())),
    }
}
