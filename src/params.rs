// ============================================================================
// PIPELINE PARAMETERS — red/blue weights and contrast-stretch thresholds
// ============================================================================

pub const DEFAULT_RED_WEIGHT: f32 = 0.50;
pub const DEFAULT_BLUE_WEIGHT: f32 = 0.50;
pub const DEFAULT_LOWER_THRESHOLD: u8 = 128;
pub const DEFAULT_UPPER_THRESHOLD: u8 = 255;

/// Highest value the lower threshold may take, so an upper threshold above it
/// always exists.
pub const MAX_LOWER_THRESHOLD: u8 = 254;

/// Rounding slack on the weight-sum advisory. Covers f32 noise in sums like
/// 0.55 + 0.45 and nothing a user could dial in.
const WEIGHT_SUM_EPSILON: f32 = 4.0 * f32::EPSILON;

/// Red/blue coefficients of the GrayNoGreen channel. Green is always 0.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Weights {
    pub red: f32,
    pub blue: f32,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            red: DEFAULT_RED_WEIGHT,
            blue: DEFAULT_BLUE_WEIGHT,
        }
    }
}

impl Weights {
    pub fn new(red: f32, blue: f32) -> Self {
        Self {
            red: clamp_weight(red, DEFAULT_RED_WEIGHT),
            blue: clamp_weight(blue, DEFAULT_BLUE_WEIGHT),
        }
    }

    pub fn sum(&self) -> f32 {
        self.red + self.blue
    }

    /// True when the weights can push bright pixels past 255.
    pub fn exceeds_unity(&self) -> bool {
        self.sum() > 1.0 + WEIGHT_SUM_EPSILON
    }
}

/// Clamp a weight into [0, 1]; non-finite input falls back to `fallback`.
pub fn clamp_weight(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        fallback
    }
}

/// Two-threshold contrast stretch settings.
///
/// The session keeps `upper > lower`; the stretch function itself tolerates
/// any ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StretchParams {
    pub lower: u8,
    pub upper: u8,
    /// Pixels below `lower` become white instead of black.
    pub invert_lower: bool,
    /// Pixels above `upper` become black instead of white.
    pub invert_upper: bool,
}

impl Default for StretchParams {
    fn default() -> Self {
        Self {
            lower: DEFAULT_LOWER_THRESHOLD,
            upper: DEFAULT_UPPER_THRESHOLD,
            invert_lower: false,
            invert_upper: false,
        }
    }
}

impl StretchParams {
    /// Apply the ordering rule: lower is capped at 254 and, when
    /// `upper <= lower`, upper is raised to `lower + 1`.
    /// Returns true if upper had to be raised.
    pub fn enforce_order(&mut self) -> bool {
        self.lower = self.lower.min(MAX_LOWER_THRESHOLD);
        if self.upper <= self.lower {
            self.upper = self.lower.saturating_add(1);
            true
        } else {
            false
        }
    }
}
