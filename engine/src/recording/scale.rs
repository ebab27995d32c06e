//! Fitting captured frames into the recording surface

use common::{Dimensions, PipelineError};

/// Where and how large to draw a frame on the recording surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleParams {
    pub scale: f64,
    pub draw_width: u32,
    pub draw_height: u32,
    pub offset_x: u32,
    pub offset_y: u32,
    /// Letterbox or pillarbox bars are visible
    pub needs_clearing: bool,
}

impl ScaleParams {
    /// Fit `frame` inside `target`, keeping its aspect ratio.
    ///
    /// Upscaling uses the largest integer factor that fits so pixels stay
    /// square; downscaling uses the exact fractional factor. The result is
    /// centered.
    pub fn compute(frame: Dimensions, target: Dimensions) -> Result<Self, PipelineError> {
        if frame.is_empty() {
            return Err(PipelineError::InvalidDimensions {
                width: frame.width,
                height: frame.height,
            });
        }
        if target.is_empty() {
            return Err(PipelineError::InvalidDimensions {
                width: target.width,
                height: target.height,
            });
        }

        if frame == target {
            return Ok(Self {
                scale: 1.0,
                draw_width: target.width,
                draw_height: target.height,
                offset_x: 0,
                offset_y: 0,
                needs_clearing: false,
            });
        }

        let (fw, fh) = (frame.width as f64, frame.height as f64);
        let (tw, th) = (target.width as f64, target.height as f64);

        let min_scale = (tw / fw).min(th / fh);
        let scale = if min_scale >= 1.0 {
            min_scale.floor()
        } else {
            min_scale
        };

        let draw_width = (fw * scale).round();
        let draw_height = (fh * scale).round();
        let offset_x = ((tw - draw_width) / 2.0).round().max(0.0);
        let offset_y = ((th - draw_height) / 2.0).round().max(0.0);

        Ok(Self {
            scale,
            draw_width: draw_width as u32,
            draw_height: draw_height as u32,
            offset_x: offset_x as u32,
            offset_y: offset_y as u32,
            needs_clearing: offset_x > 0.0 || offset_y > 0.0,
        })
    }

    pub fn draw_dimensions(&self) -> Dimensions {
        Dimensions::new(self.draw_width, self.draw_height)
    }
}

/// Remembers the parameters for the last seen frame and target size
#[derive(Debug, Default)]
pub struct ScaleCache {
    entry: Option<(Dimensions, Dimensions, ScaleParams)>,
}

impl ScaleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameters for `frame` on `target`.
    ///
    /// The flag is true when they were recomputed, meaning the dimensions
    /// changed since the previous lookup.
    pub fn lookup(
        &mut self,
        frame: Dimensions,
        target: Dimensions,
    ) -> Result<(ScaleParams, bool), PipelineError> {
        if let Some((f, t, params)) = self.entry
            && f == frame
            && t == target
        {
            return Ok((params, false));
        }

        let params = ScaleParams::compute(frame, target)?;
        log::debug!(
            "Recording scale for {} on {}: {:.2}x, drawn {} at +{}+{}",
            frame,
            target,
            params.scale,
            params.draw_dimensions(),
            params.offset_x,
            params.offset_y
        );

        self.entry = Some((frame, target, params));
        Ok((params, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: Dimensions = Dimensions {
        width: 640,
        height: 576,
    };

    #[test]
    fn test_native_frame_fills_target() {
        let params = ScaleParams::compute(Dimensions::new(160, 144), TARGET).unwrap();
        assert_eq!(
            params,
            ScaleParams {
                scale: 4.0,
                draw_width: 640,
                draw_height: 576,
                offset_x: 0,
                offset_y: 0,
                needs_clearing: false,
            }
        );
    }

    #[test]
    fn test_upscale_uses_integer_factor() {
        let params = ScaleParams::compute(Dimensions::new(320, 200), TARGET).unwrap();
        assert_eq!(params.scale, 2.0);
        assert_eq!(params.draw_dimensions(), Dimensions::new(640, 400));
        assert_eq!((params.offset_x, params.offset_y), (0, 88));
        assert!(params.needs_clearing);
    }

    #[test]
    fn test_downscale_keeps_fraction() {
        let params = ScaleParams::compute(Dimensions::new(800, 600), TARGET).unwrap();
        assert!((params.scale - 0.8).abs() < 1e-9);
        assert_eq!(params.draw_dimensions(), Dimensions::new(640, 480));
        assert_eq!((params.offset_x, params.offset_y), (0, 48));
        assert!(params.needs_clearing);
    }

    #[test]
    fn test_same_size_is_identity() {
        let params = ScaleParams::compute(TARGET, TARGET).unwrap();
        assert_eq!(params.scale, 1.0);
        assert_eq!(params.draw_dimensions(), TARGET);
        assert!(!params.needs_clearing);
    }

    #[test]
    fn test_pillarbox_for_tall_frame() {
        let params = ScaleParams::compute(Dimensions::new(100, 144), TARGET).unwrap();
        assert_eq!(params.scale, 4.0);
        assert_eq!(params.draw_dimensions(), Dimensions::new(400, 576));
        assert_eq!((params.offset_x, params.offset_y), (120, 0));
        assert!(params.needs_clearing);
    }

    #[test]
    fn test_zero_sized_inputs_rejected() {
        assert!(matches!(
            ScaleParams::compute(Dimensions::new(0, 144), TARGET),
            Err(PipelineError::InvalidDimensions {
                width: 0,
                height: 144
            })
        ));
        assert!(matches!(
            ScaleParams::compute(Dimensions::new(160, 144), Dimensions::new(640, 0)),
            Err(PipelineError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn test_cache_recomputes_on_dimension_change() {
        let mut cache = ScaleCache::new();
        let native = Dimensions::new(160, 144);

        let (first, fresh) = cache.lookup(native, TARGET).unwrap();
        assert!(fresh);
        let (again, fresh) = cache.lookup(native, TARGET).unwrap();
        assert!(!fresh);
        assert_eq!(first, again);

        let (changed, fresh) = cache.lookup(Dimensions::new(320, 200), TARGET).unwrap();
        assert!(fresh);
        assert_eq!(changed.offset_y, 88);

        // Back to the first size is a change too
        assert!(cache.lookup(native, TARGET).unwrap().1);
    }

    #[test]
    fn test_cache_keeps_entry_after_invalid_lookup() {
        let mut cache = ScaleCache::new();
        let native = Dimensions::new(160, 144);
        cache.lookup(native, TARGET).unwrap();

        assert!(cache.lookup(Dimensions::new(0, 0), TARGET).is_err());
        assert!(!cache.lookup(native, TARGET).unwrap().1);
    }
}
