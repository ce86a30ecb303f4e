//! Relay tip sizing
//!
//! Entries pay more the further the curve has progressed: the base tip is
//! scaled linearly from 1.0x at 0% progress to 2.0x at 100%, then clamped.

use crate::config::SubmissionConfig;

/// `base * (1 + min(progress, 100) / 100)`, clamped to `max_tip`
pub fn scale_tip(base_tip: u64, progress_pct: f64, max_tip: u64) -> u64 {
    if base_tip == 0 {
        return 0;
    }
    let progress = if progress_pct.is_finite() {
        progress_pct.clamp(0.0, 100.0)
    } else {
        0.0
    };
    let scaled = (base_tip as f64 * (1.0 + progress / 100.0)) as u64;
    scaled.min(max_tip.max(base_tip))
}

/// Entry tip for a candidate whose curve sits at `progress_pct`
pub fn entry_tip(config: &SubmissionConfig, progress_pct: Option<f64>) -> u64 {
    scale_tip(
        config.base_tip_lamports,
        progress_pct.unwrap_or(0.0),
        config.max_tip_lamports,
    )
}

/// Exits pay the unscaled base tip
pub fn exit_tip(config: &SubmissionConfig) -> u64 {
    config.base_tip_lamports.min(config.max_tip_lamports)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tip_scaling_bounds() {
        assert_eq!(scale_tip(100_000, 0.0, 1_000_000), 100_000);
        assert_eq!(scale_tip(100_000, 50.0, 1_000_000), 150_000);
        assert_eq!(scale_tip(100_000, 100.0, 1_000_000), 200_000);
        // Progress above 100 does not scale further
        assert_eq!(scale_tip(100_000, 250.0, 1_000_000), 200_000);
    }

    #[test]
    fn test_tip_is_clamped() {
        assert_eq!(scale_tip(100_000, 80.0, 150_000), 150_000);
        assert_eq!(scale_tip(0, 80.0, 150_000), 0);
    }

    #[test]
    fn test_tip_is_monotonic_in_progress() {
        let mut last = 0;
        for step in 0..=20 {
            let tip = scale_tip(77_777, step as f64 * 5.0, 10_000_000);
            assert!(tip >= last);
            last = tip;
        }
    }

    #[test]
    fn test_entry_tip_without_progress_uses_base() {
        let config = SubmissionConfig::default();
        assert_eq!(entry_tip(&config, None), config.base_tip_lamports);
    }
}
