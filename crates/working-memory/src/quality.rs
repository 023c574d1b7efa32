//! Conversation quality heuristic.

use tiermind_core::{Role, TurnInput};

const TURN_SATURATION: f32 = 10.0;
const ENTITY_SATURATION: f32 = 5.0;
const LENGTH_SATURATION: f32 = 40.0;

/// Score in [0, 1] rewarding real exchanges with substance:
/// 0.3 for having both user and assistant turns, up to 0.3 for turn count,
/// up to 0.2 for entities mentioned and up to 0.2 for average turn length.
pub fn quality_score(turns: &[TurnInput], entity_count: usize) -> f32 {
    if turns.is_empty() {
        return 0.0;
    }

    let has_user = turns.iter().any(|t| t.role == Role::User);
    let has_assistant = turns.iter().any(|t| t.role == Role::Assistant);
    let exchange = if has_user && has_assistant { 0.3 } else { 0.0 };

    let turn_part = 0.3 * (turns.len() as f32 / TURN_SATURATION).min(1.0);
    let entity_part = 0.2 * (entity_count as f32 / ENTITY_SATURATION).min(1.0);

    let total_chars: usize = turns.iter().map(|t| t.content.trim().chars().count()).sum();
    let avg_len = total_chars as f32 / turns.len() as f32;
    let length_part = 0.2 * (avg_len / LENGTH_SATURATION).min(1.0);

    (exchange + turn_part + entity_part + length_part).clamp(0.0, 1.0)
}
