//! Credential Commands - 凭据相关命令

/// 写入凭据命令
#[derive(Debug, Clone)]
pub struct SetCredentialCommand {
    pub api_key: String,
}

/// 写入凭据响应
#[derive(Debug, Clone)]
pub struct SetCredentialResponse {
    /// 掩码形式，绝不回传明文
    pub masked: String,
}

/// 清除凭据命令
#[derive(Debug, Clone)]
pub struct ClearCredentialCommand;

/// 清除凭据响应
#[derive(Debug, Clone)]
pub struct ClearCredentialResponse {
    pub was_present: bool,
}
