//! Credential Store Port - 进程级 API 凭据
//!
//! 唯一一份补全服务凭据；凭据在场与否决定控制器路由是否挂载。
//! 日志与状态响应中只出现掩码形式

use thiserror::Error;

/// Credential 错误
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Credential must not be empty")]
    Empty,
}

/// API 凭据
///
/// Debug/Display 均为掩码形式，防止明文进入日志
#[derive(Clone, PartialEq, Eq)]
pub struct ApiCredential {
    key: String,
}

impl ApiCredential {
    pub fn new(key: impl Into<String>) -> Result<Self, CredentialError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(CredentialError::Empty);
        }
        Ok(Self { key })
    }

    /// 明文（仅供出站请求装配 Authorization 头）
    pub fn expose(&self) -> &str {
        &self.key
    }

    /// 掩码形式
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.key.chars().collect();
        if chars.len() <= 8 {
            return "***".to_string();
        }
        let head: String = chars[..3].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}***{}", head, tail)
    }
}

impl std::fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ApiCredential({})", self.masked())
    }
}

impl std::fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.masked())
    }
}

/// Credential Store Port
///
/// 进程级单例状态，随进程启动初始化，无需显式回收
pub trait CredentialStorePort: Send + Sync {
    /// 写入凭据（覆盖旧值）
    fn set(&self, credential: ApiCredential);

    /// 清除凭据，返回之前是否在场
    fn clear(&self) -> bool;

    /// 读取凭据
    fn get(&self) -> Option<ApiCredential>;

    /// 凭据是否在场（控制器挂载条件）
    fn is_present(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_credential_rejected() {
        assert!(ApiCredential::new("").is_err());
        assert!(ApiCredential::new("   ").is_err());
    }

    #[test]
    fn test_masked_hides_middle() {
        let cred = ApiCredential::new("sk-abcdef1234567890").unwrap();
        let masked = cred.masked();
        assert_eq!(masked, "sk-***7890");
        assert!(!masked.contains("abcdef"));
    }

    #[test]
    fn test_short_credential_fully_masked() {
        let cred = ApiCredential::new("short").unwrap();
        assert_eq!(cred.masked(), "***");
    }

    #[test]
    fn test_debug_is_masked() {
        let cred = ApiCredential::new("sk-abcdef1234567890").unwrap();
        let debug = format!("{:?}", cred);
        assert!(!debug.contains("abcdef"));
    }
}
