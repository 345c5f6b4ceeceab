//! Replica-sizing and damping constants.

// ─── Scale-up guard ───────────────────────────────────────────────────────

/// Lower bound of the per-pass scale-up ceiling.
/// Also the headroom added to `minReplicas` when `maxReplicas` is invalid.
pub const SCALE_UP_LIMIT_MINIMUM: i32 = 4;

/// A single pass may grow the workload to at most `current * SCALE_UP_LIMIT_FACTOR`.
pub const SCALE_UP_LIMIT_FACTOR: i32 = 2;

// ─── Hysteresis windows ───────────────────────────────────────────────────

/// Minimum time since the last scale before scaling up again, in seconds.
pub const UPSCALE_FORBIDDEN_WINDOW_SECS: i64 = 3 * 60;

/// Minimum time since the last scale before scaling down again, in seconds.
pub const DOWNSCALE_FORBIDDEN_WINDOW_SECS: i64 = 5 * 60;

// ─── Calculator ───────────────────────────────────────────────────────────

/// Tolerance band around the target, in percent of the target (10 = ±10%).
pub const TOLERANCE_PERCENT: i64 = 10;

// ─── Spec defaults ────────────────────────────────────────────────────────

/// Default `spec.minReplicas`.
pub const DEFAULT_MIN_REPLICAS: i32 = 1;

/// Default `spec.targetUtilizationPercentage`.
pub const DEFAULT_TARGET_UTILIZATION_PERCENT: i32 = 80;

/// Upper bound of `spec.targetUtilizationPercentage`.
pub const MAX_TARGET_UTILIZATION_PERCENT: i32 = 100;
