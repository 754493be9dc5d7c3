//! 单轮处理的阶段状态机
//!
//! IDLE → AWAITING_MODEL → (TOOL_REQUESTED → EXECUTING_TOOL →) COMPOSING → IDLE

use serde::Serialize;

/// 会话当前所处阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    Idle,
    AwaitingModel,
    ToolRequested,
    ExecutingTool,
    Composing,
}

impl TurnPhase {
    /// 合法转移；其余组合说明同一会话出现了交错的两轮
    pub fn can_transition_to(self, next: TurnPhase) -> bool {
        use TurnPhase::*;
        matches!(
            (self, next),
            (Idle, AwaitingModel)
                | (AwaitingModel, ToolRequested)
                | (AwaitingModel, Composing)
                | (ToolRequested, ExecutingTool)
                | (ExecutingTool, Composing)
                | (Composing, Idle)
        )
    }

    pub fn is_idle(self) -> bool {
        self == TurnPhase::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_path_transitions() {
        let path = [
            TurnPhase::Idle,
            TurnPhase::AwaitingModel,
            TurnPhase::ToolRequested,
            TurnPhase::ExecutingTool,
            TurnPhase::Composing,
            TurnPhase::Idle,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_no_new_turn_while_composing() {
        assert!(!TurnPhase::Composing.can_transition_to(TurnPhase::AwaitingModel));
        assert!(!TurnPhase::ExecutingTool.can_transition_to(TurnPhase::AwaitingModel));
        assert!(TurnPhase::AwaitingModel.can_transition_to(TurnPhase::Composing));
    }
}
