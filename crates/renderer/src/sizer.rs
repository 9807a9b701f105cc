use tracing::debug;

/// Drawing-buffer size in device pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
    /// Cap that was applied to the device pixel ratio.
    pub pixel_ratio_cap: f64,
}

impl SurfaceSize {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn as_vec2(&self) -> [f32; 2] {
        [self.width as f32, self.height as f32]
    }
}

/// Maps a host box and pixel ratio to a drawing-buffer size.
///
/// `ratio = min(device_pixel_ratio, cap)`; each axis is `round(box * ratio)`
/// clamped to at least one pixel. A degenerate (zero, negative, or NaN) box
/// lands on the 1-pixel floor instead of being reported.
pub fn compute_size(width: f64, height: f64, device_pixel_ratio: f64, cap: f64) -> SurfaceSize {
    let ratio = device_pixel_ratio.min(cap);
    let width_px = scale_axis(width, ratio);
    let height_px = scale_axis(height, ratio);
    if !(width * ratio >= 1.0 && height * ratio >= 1.0) {
        debug!(width, height, ratio, "degenerate host box clamped");
    }
    SurfaceSize {
        width: width_px,
        height: height_px,
        pixel_ratio_cap: cap,
    }
}

fn scale_axis(extent: f64, ratio: f64) -> u32 {
    let scaled = (extent * ratio).round();
    if scaled.is_nan() || scaled < 1.0 {
        1
    } else if scaled >= u32::MAX as f64 {
        u32::MAX
    } else {
        scaled as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cap_limits_high_density_displays() {
        assert_eq!(compute_size(800.0, 600.0, 3.0, 1.0).dimensions(), (800, 600));
        assert_eq!(compute_size(800.0, 600.0, 3.0, 2.0).dimensions(), (1600, 1200));
    }

    #[test]
    fn low_ratio_passes_through_uncapped() {
        assert_eq!(compute_size(400.0, 300.0, 1.0, 2.0).dimensions(), (400, 300));
        assert_eq!(compute_size(400.0, 300.0, 0.5, 2.0).dimensions(), (200, 150));
    }

    #[test]
    fn degenerate_boxes_clamp_to_one_pixel() {
        assert_eq!(compute_size(0.0, 0.0, 1.0, 1.0).dimensions(), (1, 1));
        assert_eq!(compute_size(-20.0, 10.0, 1.0, 1.0).dimensions(), (1, 10));
        assert_eq!(compute_size(f64::NAN, 10.0, 1.0, 1.0).dimensions(), (1, 10));
    }

    #[test]
    fn fractional_results_round_to_nearest() {
        assert_eq!(compute_size(101.0, 33.0, 1.5, 2.0).dimensions(), (152, 50));
    }
}
