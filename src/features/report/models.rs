use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// 一次构建上报
///
/// 缺失的键与 `null` 值都解码为空字符串，由校验器统一报告，而不是在解码阶段失败。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub app_name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub job_name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub version: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub build_number: String,
}

impl Record {
    /// 解码请求体；整体为 `null` 时得到全空的记录
    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice::<Option<Self>>(body).map(Option::unwrap_or_default)
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// 已落库的上报：存储分配的标识与时间戳
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredRecord {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub record: Record,
}
