use crate::dto::HealthRes;

/// Liveness check shared by the REST server and the CLI.
///
/// The check does not touch the remote store; a reachable process reports healthy.
#[derive(Clone, Default)]
pub struct HealthService;

impl HealthService {
    pub fn new() -> Self {
        Self
    }

    /// # Returns
    /// A `HealthRes` indicating the service is healthy.
    pub fn check_health() -> HealthRes {
        HealthRes {
            ok: true,
            message: "Blood bank service is alive".into(),
        }
    }
}
