//! Geometry: rotate, flip and resize.

use image::imageops::FilterType;
use image::DynamicImage;
use tokio_util::sync::CancellationToken;

use crate::domain::CodecDefaults;

use super::{Parameters, ToolError, ToolGroup, ToolRegistry, ToolStep};

pub fn register(registry: &mut ToolRegistry) {
    registry.register(|| Box::new(Rotate::default()));
    registry.register(|| Box::new(Flip::default()));
    registry.register(|| Box::new(Resize::default()));
}

/// Rotate clockwise by a right angle
#[derive(Debug, Clone, Copy)]
pub struct Rotate {
    angle: u32,
}

impl Default for Rotate {
    fn default() -> Self {
        Self { angle: 90 }
    }
}

impl ToolStep for Rotate {
    fn name(&self) -> &str {
        "rotate"
    }

    fn group(&self) -> ToolGroup {
        ToolGroup::Transform
    }

    fn description(&self) -> &str {
        "Rotate by 90, 180 or 270 degrees"
    }

    fn configure(&mut self, parameters: &Parameters, _: &CodecDefaults) -> Result<(), ToolError> {
        let angle = parameters.u32("angle")?.unwrap_or(90);
        if !matches!(angle, 90 | 180 | 270) {
            return Err(ToolError::invalid("angle", "must be 90, 180 or 270"));
        }
        self.angle = angle;
        Ok(())
    }

    fn process(
        &mut self,
        image: DynamicImage,
        _cancel: &CancellationToken,
    ) -> Result<DynamicImage, ToolError> {
        Ok(match self.angle {
            180 => image.rotate180(),
            270 => image.rotate270(),
            _ => image.rotate90(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlipDirection {
    #[default]
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Flip {
    direction: FlipDirection,
}

impl ToolStep for Flip {
    fn name(&self) -> &str {
        "flip"
    }

    fn group(&self) -> ToolGroup {
        ToolGroup::Transform
    }

    fn description(&self) -> &str {
        "Mirror horizontally or vertically"
    }

    fn configure(&mut self, parameters: &Parameters, _: &CodecDefaults) -> Result<(), ToolError> {
        self.direction = match parameters.str("direction")? {
            None | Some("horizontal") => FlipDirection::Horizontal,
            Some("vertical") => FlipDirection::Vertical,
            Some(other) => {
                return Err(ToolError::invalid(
                    "direction",
                    format!("expected horizontal or vertical, got '{}'", other),
                ))
            }
        };
        Ok(())
    }

    fn process(
        &mut self,
        image: DynamicImage,
        _cancel: &CancellationToken,
    ) -> Result<DynamicImage, ToolError> {
        Ok(match self.direction {
            FlipDirection::Horizontal => image.fliph(),
            FlipDirection::Vertical => image.flipv(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Target {
    Percent(f32),
    Size {
        width: Option<u32>,
        height: Option<u32>,
    },
}

/// Resize to explicit dimensions or by a percentage
#[derive(Debug, Clone, Copy)]
pub struct Resize {
    target: Target,
    keep_aspect: bool,
}

impl Default for Resize {
    fn default() -> Self {
        Self {
            target: Target::Percent(100.0),
            keep_aspect: true,
        }
    }
}

impl Resize {
    fn dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        let scale = |value: u32, factor: f64| ((value as f64 * factor).round() as u32).max(1);

        match self.target {
            Target::Percent(percent) => {
                let factor = percent as f64 / 100.0;
                (scale(width, factor), scale(height, factor))
            }
            Target::Size {
                width: Some(w),
                height: Some(h),
            } => {
                if !self.keep_aspect {
                    return (w, h);
                }
                let factor = (w as f64 / width as f64).min(h as f64 / height as f64);
                (scale(width, factor), scale(height, factor))
            }
            Target::Size {
                width: Some(w),
                height: None,
            } => (w, scale(height, w as f64 / width as f64)),
            Target::Size {
                width: None,
                height: Some(h),
            } => (scale(width, h as f64 / height as f64), h),
            Target::Size {
                width: None,
                height: None,
            } => (width, height),
        }
    }
}

impl ToolStep for Resize {
    fn name(&self) -> &str {
        "resize"
    }

    fn group(&self) -> ToolGroup {
        ToolGroup::Transform
    }

    fn description(&self) -> &str {
        "Resize to a size or percentage"
    }

    fn configure(&mut self, parameters: &Parameters, _: &CodecDefaults) -> Result<(), ToolError> {
        self.keep_aspect = parameters.bool("keep_aspect")?.unwrap_or(true);

        if let Some(percent) = parameters.f32("percent")? {
            if !(percent > 0.0 && percent <= 1000.0) {
                return Err(ToolError::invalid("percent", "must be within (0, 1000]"));
            }
            self.target = Target::Percent(percent);
            return Ok(());
        }

        let width = parameters.u32("width")?;
        let height = parameters.u32("height")?;
        if width.is_none() && height.is_none() {
            return Err(ToolError::invalid(
                "width",
                "one of width, height or percent is required",
            ));
        }
        if width == Some(0) || height == Some(0) {
            return Err(ToolError::invalid("width", "dimensions must be positive"));
        }

        self.target = Target::Size { width, height };
        Ok(())
    }

    fn process(
        &mut self,
        image: DynamicImage,
        _cancel: &CancellationToken,
    ) -> Result<DynamicImage, ToolError> {
        let (width, height) = self.dimensions(image.width(), image.height());
        if (width, height) == (image.width(), image.height()) {
            return Ok(image);
        }
        Ok(image.resize_exact(width, height, FilterType::Lanczos3))
    }
}
