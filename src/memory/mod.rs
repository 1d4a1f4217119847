//! 记忆层：对话消息与按会话划分的对话账本

pub mod conversation;
pub mod ledger;

pub use conversation::{ConversationWindow, Message, Role};
pub use ledger::{InMemoryLedger, LedgerEntry, LedgerRole, SessionLedger, DEFAULT_LEDGER_CAPACITY};
