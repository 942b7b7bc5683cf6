use coze_api::{CallOptions, MessageRequest};
use tracing::{info, warn};

use crate::service::AgentService;

/// Canned health-check message ("health check").
pub const HEALTH_CHECK_MESSAGE: &str = "健康检查";
/// Reserved identity for health checks, kept apart from real users.
pub const HEALTH_CHECK_USER: &str = "health_check_user";

/// End-to-end check through the buffered send path.
pub struct HealthChecker<'a> {
    service: &'a AgentService,
}

impl<'a> HealthChecker<'a> {
    pub fn new(service: &'a AgentService) -> Self {
        Self { service }
    }

    /// `true` only when the check completed with a successful result. Checks
    /// are not written to history.
    pub async fn check(&self, options: &CallOptions) -> bool {
        let request = MessageRequest::new(HEALTH_CHECK_MESSAGE).with_user_id(HEALTH_CHECK_USER);
        match self.service.send_buffered(&request, options, false).await {
            Ok(response) if response.success => {
                info!("health check passed");
                true
            }
            Ok(response) => {
                warn!(
                    "health check failed: {}",
                    response.error_message.as_deref().unwrap_or("unsuccessful result")
                );
                false
            }
            Err(error) => {
                warn!("health check rejected: {error}");
                false
            }
        }
    }
}

impl AgentService {
    pub async fn health_check(&self, options: &CallOptions) -> bool {
        HealthChecker::new(self).check(options).await
    }
}
