//! In-Memory Credential Store Implementation
//!
//! 进程级唯一凭据，所有会话共用

use std::sync::{Arc, RwLock};

use crate::application::ports::{ApiCredential, CredentialStorePort};

/// 内存凭据存储
pub struct InMemoryCredentialStore {
    credential: RwLock<Option<ApiCredential>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self {
            credential: RwLock::new(None),
        }
    }

    /// 以初始凭据创建（来自配置文件或环境变量）
    pub fn with_credential(credential: Option<ApiCredential>) -> Self {
        Self {
            credential: RwLock::new(credential),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl Default for InMemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStorePort for InMemoryCredentialStore {
    fn set(&self, credential: ApiCredential) {
        let masked = credential.masked();
        let mut guard = match self.credential.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(credential);
        tracing::debug!(credential = %masked, "Credential stored");
    }

    fn clear(&self) -> bool {
        let mut guard = match self.credential.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.take().is_some()
    }

    fn get(&self) -> Option<ApiCredential> {
        match self.credential.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn is_present(&self) -> bool {
        self.get().is_some()
    }
}
