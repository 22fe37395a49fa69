//! 线路协议
//!
//! 两条路径在传输层上交换的负载，全部是 JSON：
//! - 查询请求：`{"order_uid": "..."}`、JSON 字符串或裸 ID 文本
//! - 查询响应：`LookupResponse`，按 `status` 字段区分
//! - 摄入报告：`IngestReport`，按 `status` 字段区分

use crate::domain::order::Order;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 协议解析错误
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("empty lookup request")]
    Empty,

    #[error("lookup request is not valid UTF-8")]
    NotUtf8,

    #[error("malformed lookup request: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// 查询请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupRequest {
    pub order_uid: String,
}

impl LookupRequest {
    pub fn new(order_uid: impl Into<String>) -> Self {
        Self {
            order_uid: order_uid.into(),
        }
    }

    /// 解析查询请求，接受三种形式：JSON 对象、JSON 字符串、裸文本
    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(payload)
            .map_err(|_| ProtocolError::NotUtf8)?
            .trim();

        let order_uid = if text.starts_with('{') {
            serde_json::from_str::<LookupRequest>(text)?.order_uid
        } else if text.starts_with('"') {
            serde_json::from_str::<String>(text)?
        } else {
            text.to_string()
        };

        let order_uid = order_uid.trim();
        if order_uid.is_empty() {
            return Err(ProtocolError::Empty);
        }

        Ok(Self::new(order_uid))
    }
}

/// 查询结果来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedFrom {
    Cache,
    Store,
}

impl ResolvedFrom {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolvedFrom::Cache => "cache",
            ResolvedFrom::Store => "store",
        }
    }
}

/// 查询失败类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupErrorKind {
    /// 请求无法解析
    Request,
    /// 存储访问失败或超时
    Io,
}

/// 查询响应，每个请求恰好一条
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LookupResponse {
    Found {
        order_uid: String,
        source: ResolvedFrom,
        order: Arc<Order>,
    },
    NotFound {
        order_uid: String,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        order_uid: Option<String>,
        kind: LookupErrorKind,
        message: String,
    },
}

impl LookupResponse {
    /// 响应对应的订单 ID（无法解析的请求没有）
    pub fn order_uid(&self) -> Option<&str> {
        match self {
            LookupResponse::Found { order_uid, .. } | LookupResponse::NotFound { order_uid } => {
                Some(order_uid)
            }
            LookupResponse::Error { order_uid, .. } => order_uid.as_deref(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, LookupResponse::Error { .. })
    }

    pub fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    pub fn from_slice(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

/// 摄入被拒绝的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectKind {
    Validation,
    Conflict,
    Io,
    Decode,
}

impl RejectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectKind::Validation => "validation",
            RejectKind::Conflict => "conflict",
            RejectKind::Io => "io",
            RejectKind::Decode => "decode",
        }
    }
}

/// 摄入报告，每条入站订单消息恰好一条
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestReport {
    Accepted {
        order_uid: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        evicted: Option<String>,
    },
    Rejected {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        order_uid: Option<String>,
        kind: RejectKind,
        message: String,
    },
}

impl IngestReport {
    pub fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    pub fn from_slice(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}
