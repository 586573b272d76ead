// ---------------------------------------------------------------------------
// Linear interpolation between two anchors
// ---------------------------------------------------------------------------

/// Value at `x` on the straight line through `(x1, y1)` and `(x2, y2)`.
///
/// When the anchors share (almost) the same abscissa the line is undefined;
/// the left anchor value is returned instead of an infinity or NaN.
pub fn linear_interpolate(x1: f64, y1: f64, x2: f64, y2: f64, x: f64) -> f64 {
    if (x2 - x1).abs() < f64::EPSILON {
        return y1;
    }
    y1 + (y2 - y1) * (x - x1) / (x2 - x1)
}
