//! 短期记忆：会话历史
//!
//! 每个连接一份，按到达顺序只追加不修改；提交给后端时保持原有顺序，可只取最近 N 轮。

use serde::{Deserialize, Serialize};

/// 消息角色（与 Gemini contents.role 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// 单轮消息，追加后不可变
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            content: content.into(),
        }
    }
}

/// 会话历史：只追加，不剪枝（整段历史随会话销毁）
#[derive(Clone, Debug, Default)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// 最近 max_turns 轮完整往返，加上末尾尚未回复的 user 消息；0 表示全部。
    /// 窗口总是从 user 消息开始。
    pub fn window(&self, max_turns: usize) -> &[Turn] {
        let pending = usize::from(self.last().map(|t| t.role) == Some(Role::User));
        let keep = max_turns * 2 + pending;
        if max_turns == 0 || self.turns.len() <= keep {
            return &self.turns;
        }
        let mut start = self.turns.len() - keep;
        while start < self.turns.len() && self.turns[start].role == Role::Model {
            start += 1;
        }
        &self.turns[start..]
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_keeps_insertion_order() {
        let mut history = ConversationHistory::new();
        history.push(Turn::user("first"));
        history.push(Turn::model("ack"));
        history.push(Turn::user("second"));

        let contents: Vec<&str> = history.turns().iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "ack", "second"]);
        assert_eq!(history.last().map(|t| t.role), Some(Role::User));
    }

    #[test]
    fn test_window_takes_tail() {
        let mut history = ConversationHistory::new();
        for i in 0..5 {
            history.push(Turn::user(format!("u{i}")));
            history.push(Turn::model(format!("m{i}")));
        }

        assert_eq!(history.window(0).len(), 10);
        assert_eq!(history.window(20).len(), 10);

        let tail = history.window(2);
        assert_eq!(tail.len(), 4);
        assert_eq!(tail[0].content, "u3");
        assert_eq!(tail[3].content, "m4");
        // 原历史不受影响
        assert_eq!(history.len(), 10);
    }

    #[test]
    fn test_window_with_pending_user_starts_on_user() {
        let mut history = ConversationHistory::new();
        for turn in [
            Turn::user("u1"),
            Turn::model("m1"),
            Turn::user("u2"),
            Turn::model("m2"),
            Turn::user("u3"),
        ] {
            history.push(turn);
        }

        let tail = history.window(1);
        let contents: Vec<&str> = tail.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["u2", "m2", "u3"]);

        let tail = history.window(2);
        assert_eq!(tail[0].role, Role::User);
        assert_eq!(tail.len(), 5);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Turn::model("ok")).unwrap();
        assert_eq!(json, r#"{"role":"model","content":"ok"}"#);
    }
}
