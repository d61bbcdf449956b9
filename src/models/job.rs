//! 作业元数据模型
//!
//! 这些记录来自外部元数据写入进程维护的只读表，引擎从不修改它们。

use serde::{Deserialize, Serialize};

/// 从收件方 URI 中拆出的部分
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientParts {
    pub user: String,
    pub host: String,
    /// 仅当 URI 带有 `;server=` 选项时存在，形如 `user@host`
    pub mail_destination: Option<String>,
}

/// 目录记录
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryRecord {
    pub dir_id: u32,
    pub dir_name: String,
    pub dir_options: Vec<String>,
}

/// 作业记录
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: u32,
    pub dir_id: u32,
    /// 目录在目录表中的位置
    pub dir_id_pos: i32,
    pub priority: char,
    /// 收件方 URI（原样）
    pub recipient: String,
    pub recipient_parts: RecipientParts,
    pub file_masks: Vec<String>,
    /// 本地选项
    pub local_options: Vec<String>,
    /// 远端（协议相关）选项
    pub remote_options: Vec<String>,
    pub directory: DirectoryRecord,
}

impl JobRecord {
    /// 用户模式应当匹配的名字：有邮件目的地时使用它
    pub fn user_match_target(&self, pattern: &str) -> &str {
        match &self.recipient_parts.mail_destination {
            Some(dest) if pattern.contains('@') => dest,
            _ => &self.recipient_parts.user,
        }
    }
}
