//! 会话账本（Session Ledger）
//!
//! 按 session_id 保存只追加的对话记录；每次 append 后若超过容量则从头部丢弃（FIFO），不重排。
//! SessionLedger 是注入式存储接口，可替换为持久化实现而不影响路由逻辑。
//!
//! 并发：外层 RwLock 只用于查找 / 插入会话槽位，单会话的读写在各自的 Mutex 内完成，
//! 不同会话之间互不阻塞。

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use super::{Message, Role};

/// 默认每个会话保留的条目数
pub const DEFAULT_LEDGER_CAPACITY: usize = 20;

/// 账本条目的说话方：只允许用户与助手，系统提示不入账
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerRole {
    User,
    Assistant,
}

impl LedgerRole {
    pub fn as_str(&self) -> &'static str {
        Role::from(*self).as_str()
    }
}

impl From<LedgerRole> for Role {
    fn from(role: LedgerRole) -> Self {
        match role {
            LedgerRole::User => Role::User,
            LedgerRole::Assistant => Role::Assistant,
        }
    }
}

/// 账本条目
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub session_id: String,
    pub role: LedgerRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn to_message(&self) -> Message {
        Message {
            role: self.role.into(),
            content: self.content.clone(),
        }
    }
}

/// 会话账本接口
#[async_trait]
pub trait SessionLedger: Send + Sync {
    /// 追加一条记录，随后按容量裁剪
    async fn append(&self, session_id: &str, role: LedgerRole, content: &str);

    /// 会话历史（按追加顺序）；未知会话返回空
    async fn history(&self, session_id: &str) -> Vec<LedgerEntry>;

    /// 删除会话；未知会话返回 false
    async fn clear(&self, session_id: &str) -> bool;

    /// 当前存在的会话 ID
    async fn sessions(&self) -> Vec<String>;
}

type SessionSlot = Arc<Mutex<VecDeque<LedgerEntry>>>;

/// 内存账本
pub struct InMemoryLedger {
    sessions: RwLock<HashMap<String, SessionSlot>>,
    capacity: usize,
}

impl InMemoryLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    async fn slot(&self, session_id: &str) -> Option<SessionSlot> {
        self.sessions.read().await.get(session_id).cloned()
    }

    async fn slot_or_insert(&self, session_id: &str) -> SessionSlot {
        if let Some(slot) = self.slot(session_id).await {
            return slot;
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new())))
            .clone()
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new(DEFAULT_LEDGER_CAPACITY)
    }
}

#[async_trait]
impl SessionLedger for InMemoryLedger {
    async fn append(&self, session_id: &str, role: LedgerRole, content: &str) {
        loop {
            let slot = self.slot_or_insert(session_id).await;
            let mut entries = slot.lock().await;
            // 拿到槽位后会话可能已被 clear 移除，此时换到新槽位重试
            let live = self
                .sessions
                .read()
                .await
                .get(session_id)
                .is_some_and(|current| Arc::ptr_eq(current, &slot));
            if !live {
                continue;
            }
            entries.push_back(LedgerEntry {
                session_id: session_id.to_string(),
                role,
                content: content.to_string(),
                timestamp: Utc::now(),
            });
            while entries.len() > self.capacity {
                entries.pop_front();
            }
            return;
        }
    }

    async fn history(&self, session_id: &str) -> Vec<LedgerEntry> {
        match self.slot(session_id).await {
            Some(slot) => slot.lock().await.iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    async fn clear(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        if removed {
            tracing::info!(session_id = %session_id, "session cleared");
        }
        removed
    }

    async fn sessions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}
