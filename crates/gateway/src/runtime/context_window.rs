//! Context-window planner.
//!
//! Computes the token window to request from the daemon for the next
//! call, bounded by the safe ceiling (90% of the model maximum). Policy,
//! in order:
//!
//! 1. `manual_override` set: keep the stored window.
//! 2. Dynamic sizing disabled: keep the stored window.
//! 3. No tokens exchanged yet: `min(safe, 8192)`, reason `initial_setup`.
//! 4. Last usage above half the window: grow to `min(safe, ceil(1.5 x
//!    usage))`, reason `usage_threshold`.
//! 5. Model changed since the last recorded decision: reset to
//!    `min(safe, 8192)`, reason `model_change`.
//! 6. Otherwise: keep the window, reason `no_adjustment`.
//!
//! Only `initial_setup`, `usage_threshold`, and `model_change` decisions
//! append to the bounded adjustment history.

use mochi_sessions::{
    now_iso, AdjustmentReason, AdjustmentRecord, ContextWindowConfig, Message,
};

/// Default window for fresh conversations.
pub const DEFAULT_INITIAL_WINDOW: u64 = 8192;

/// Outcome of one planning decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanOutcome {
    pub window: u64,
    pub reason: AdjustmentReason,
}

/// The safe ceiling: 90% of the model's maximum context, floored.
pub fn safe_ceiling(model_max: u64) -> u64 {
    model_max * 9 / 10
}

/// Sum of the most recent assistant message's token counts, or 0 when no
/// assistant message carries counts yet.
pub fn last_usage_tokens(messages: &[Message]) -> u64 {
    for message in messages.iter().rev() {
        if let Message::Assistant {
            eval_count,
            prompt_eval_count,
            ..
        } = message
        {
            return eval_count.unwrap_or(0) + prompt_eval_count.unwrap_or(0);
        }
    }
    0
}

/// Compute the window for the next upstream call.
pub fn plan_window(
    model_max: u64,
    config: &ContextWindowConfig,
    last_usage: u64,
    model: &str,
) -> PlanOutcome {
    let safe = safe_ceiling(model_max);

    if config.manual_override {
        return PlanOutcome {
            window: config.current_window.min(safe),
            reason: AdjustmentReason::ManualOverride,
        };
    }

    if !config.dynamic_enabled {
        return PlanOutcome {
            window: config.current_window.min(safe),
            reason: AdjustmentReason::NoAdjustment,
        };
    }

    if last_usage == 0 {
        return PlanOutcome {
            window: safe.min(DEFAULT_INITIAL_WINDOW),
            reason: AdjustmentReason::InitialSetup,
        };
    }

    if last_usage * 2 > config.current_window {
        // ceil(1.5 x usage)
        let target = (last_usage * 3).div_ceil(2);
        return PlanOutcome {
            window: target.min(safe),
            reason: AdjustmentReason::UsageThreshold,
        };
    }

    let model_changed = config
        .adjustment_history
        .last()
        .is_some_and(|record| record.model != model);
    if model_changed {
        return PlanOutcome {
            window: safe.min(DEFAULT_INITIAL_WINDOW),
            reason: AdjustmentReason::ModelChange,
        };
    }

    PlanOutcome {
        window: config.current_window.min(safe),
        reason: AdjustmentReason::NoAdjustment,
    }
}

/// Record a planning outcome on the session's config.
///
/// Adjusting decisions append to the history (oldest evicted beyond 10);
/// `no_adjustment` and `manual_override` only update the reason.
pub fn apply_plan(config: &mut ContextWindowConfig, outcome: PlanOutcome, model: &str) {
    config.current_window = outcome.window;
    config.last_adjustment = outcome.reason;

    if matches!(
        outcome.reason,
        AdjustmentReason::InitialSetup
            | AdjustmentReason::UsageThreshold
            | AdjustmentReason::ModelChange
    ) {
        config.push_history(AdjustmentRecord {
            timestamp: now_iso(),
            reason: outcome.reason,
            window: outcome.window,
            model: model.to_string(),
        });
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL_MAX: u64 = 40_960; // safe ceiling 36_864

    fn config() -> ContextWindowConfig {
        ContextWindowConfig::default()
    }

    #[test]
    fn safe_ceiling_floors() {
        assert_eq!(safe_ceiling(40_960), 36_864);
        assert_eq!(safe_ceiling(2048), 1843);
    }

    #[test]
    fn manual_override_keeps_window() {
        let mut cfg = config();
        cfg.manual_override = true;
        cfg.current_window = 16_384;
        let outcome = plan_window(MODEL_MAX, &cfg, 30_000, "m1");
        assert_eq!(outcome.window, 16_384);
        assert_eq!(outcome.reason, AdjustmentReason::ManualOverride);
    }

    #[test]
    fn manual_override_clamped_to_safe_ceiling() {
        let mut cfg = config();
        cfg.manual_override = true;
        cfg.current_window = 1_000_000;
        let outcome = plan_window(MODEL_MAX, &cfg, 0, "m1");
        assert_eq!(outcome.window, safe_ceiling(MODEL_MAX));
    }

    #[test]
    fn dynamic_disabled_is_no_adjustment() {
        let mut cfg = config();
        cfg.dynamic_enabled = false;
        let outcome = plan_window(MODEL_MAX, &cfg, 30_000, "m1");
        assert_eq!(outcome.reason, AdjustmentReason::NoAdjustment);
        assert_eq!(outcome.window, cfg.current_window);
    }

    #[test]
    fn fresh_conversation_gets_initial_window() {
        let outcome = plan_window(MODEL_MAX, &config(), 0, "m1");
        assert_eq!(outcome.window, DEFAULT_INITIAL_WINDOW);
        assert_eq!(outcome.reason, AdjustmentReason::InitialSetup);
    }

    #[test]
    fn small_model_caps_initial_window() {
        let outcome = plan_window(2048, &config(), 0, "m1");
        assert_eq!(outcome.window, safe_ceiling(2048));
        assert_eq!(outcome.reason, AdjustmentReason::InitialSetup);
    }

    #[test]
    fn usage_over_half_grows_window() {
        let cfg = config(); // current 8192
        let outcome = plan_window(MODEL_MAX, &cfg, 5000, "m1");
        assert_eq!(outcome.reason, AdjustmentReason::UsageThreshold);
        assert_eq!(outcome.window, 7500); // ceil(1.5 x 5000)
    }

    #[test]
    fn usage_growth_respects_safe_ceiling() {
        let cfg = config();
        let outcome = plan_window(MODEL_MAX, &cfg, 30_000, "m1");
        assert_eq!(outcome.reason, AdjustmentReason::UsageThreshold);
        assert_eq!(outcome.window, safe_ceiling(MODEL_MAX));
    }

    #[test]
    fn usage_at_or_below_half_is_no_adjustment() {
        let cfg = config();
        let outcome = plan_window(MODEL_MAX, &cfg, 4096, "m1");
        assert_eq!(outcome.reason, AdjustmentReason::NoAdjustment);
        assert_eq!(outcome.window, 8192);
    }

    #[test]
    fn model_change_resets_window() {
        let mut cfg = config();
        cfg.current_window = 20_000;
        apply_plan(
            &mut cfg,
            PlanOutcome { window: 20_000, reason: AdjustmentReason::UsageThreshold },
            "m1",
        );
        let outcome = plan_window(MODEL_MAX, &cfg, 1000, "m2");
        assert_eq!(outcome.reason, AdjustmentReason::ModelChange);
        assert_eq!(outcome.window, DEFAULT_INITIAL_WINDOW);
    }

    #[test]
    fn apply_plan_appends_history_for_adjustments_only() {
        let mut cfg = config();

        apply_plan(
            &mut cfg,
            PlanOutcome { window: 8192, reason: AdjustmentReason::InitialSetup },
            "m1",
        );
        assert_eq!(cfg.adjustment_history.len(), 1);

        apply_plan(
            &mut cfg,
            PlanOutcome { window: 8192, reason: AdjustmentReason::NoAdjustment },
            "m1",
        );
        apply_plan(
            &mut cfg,
            PlanOutcome { window: 8192, reason: AdjustmentReason::ManualOverride },
            "m1",
        );
        assert_eq!(cfg.adjustment_history.len(), 1);
        assert_eq!(cfg.last_adjustment, AdjustmentReason::ManualOverride);
    }

    #[test]
    fn last_usage_reads_most_recent_assistant() {
        use mochi_sessions::generate_id;
        let messages = vec![
            Message::Assistant {
                content: "old".into(),
                model: "m1".into(),
                message_id: generate_id(),
                timestamp: now_iso(),
                eval_count: Some(1),
                prompt_eval_count: Some(1),
                tool_calls: None,
            },
            Message::User {
                content: "hi".into(),
                message_id: generate_id(),
                timestamp: now_iso(),
            },
            Message::Assistant {
                content: "new".into(),
                model: "m1".into(),
                message_id: generate_id(),
                timestamp: now_iso(),
                eval_count: Some(100),
                prompt_eval_count: Some(400),
                tool_calls: None,
            },
        ];
        assert_eq!(last_usage_tokens(&messages), 500);
        assert_eq!(last_usage_tokens(&[]), 0);
    }
}
