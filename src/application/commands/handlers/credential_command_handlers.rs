//! Credential Command Handlers

use std::sync::Arc;

use crate::application::commands::credential_commands::*;
use crate::application::error::ApplicationError;
use crate::application::ports::{ApiCredential, CredentialStorePort};
use crate::infrastructure::events::EventPublisher;

/// SetCredential Handler - 写入进程级凭据
pub struct SetCredentialHandler {
    credential_store: Arc<dyn CredentialStorePort>,
    event_publisher: Arc<EventPublisher>,
}

impl SetCredentialHandler {
    pub fn new(
        credential_store: Arc<dyn CredentialStorePort>,
        event_publisher: Arc<EventPublisher>,
    ) -> Self {
        Self {
            credential_store,
            event_publisher,
        }
    }

    pub async fn handle(
        &self,
        cmd: SetCredentialCommand,
    ) -> Result<SetCredentialResponse, ApplicationError> {
        let credential = ApiCredential::new(cmd.api_key)
            .map_err(|e| ApplicationError::validation(e.to_string()))?;
        let masked = credential.masked();

        self.credential_store.set(credential);
        self.event_publisher.publish_credential_changed(true);

        tracing::info!(credential = %masked, "API credential updated");

        Ok(SetCredentialResponse { masked })
    }
}

/// ClearCredential Handler - 清除进程级凭据
///
/// 清除后控制器视为未挂载，后续提交一律拒绝
pub struct ClearCredentialHandler {
    credential_store: Arc<dyn CredentialStorePort>,
    event_publisher: Arc<EventPublisher>,
}

impl ClearCredentialHandler {
    pub fn new(
        credential_store: Arc<dyn CredentialStorePort>,
        event_publisher: Arc<EventPublisher>,
    ) -> Self {
        Self {
            credential_store,
            event_publisher,
        }
    }

    pub async fn handle(
        &self,
        _cmd: ClearCredentialCommand,
    ) -> Result<ClearCredentialResponse, ApplicationError> {
        let was_present = self.credential_store.clear();
        if was_present {
            self.event_publisher.publish_credential_changed(false);
        }

        tracing::info!(was_present = was_present, "API credential cleared");

        Ok(ClearCredentialResponse { was_present })
    }
}
