//! Color adjustments.

use image::DynamicImage;
use tokio_util::sync::CancellationToken;

use crate::domain::CodecDefaults;

use super::{Parameters, ToolError, ToolGroup, ToolRegistry, ToolStep};

pub fn register(registry: &mut ToolRegistry) {
    registry.register(|| Box::new(Grayscale));
    registry.register(|| Box::new(Invert));
    registry.register(|| Box::new(BrightnessContrast::default()));
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Grayscale;

impl ToolStep for Grayscale {
    fn name(&self) -> &str {
        "grayscale"
    }

    fn group(&self) -> ToolGroup {
        ToolGroup::Color
    }

    fn description(&self) -> &str {
        "Convert to black and white"
    }

    fn configure(&mut self, _: &Parameters, _: &CodecDefaults) -> Result<(), ToolError> {
        Ok(())
    }

    fn process(
        &mut self,
        image: DynamicImage,
        _cancel: &CancellationToken,
    ) -> Result<DynamicImage, ToolError> {
        Ok(image.grayscale())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Invert;

impl ToolStep for Invert {
    fn name(&self) -> &str {
        "invert"
    }

    fn group(&self) -> ToolGroup {
        ToolGroup::Color
    }

    fn description(&self) -> &str {
        "Invert colors"
    }

    fn configure(&mut self, _: &Parameters, _: &CodecDefaults) -> Result<(), ToolError> {
        Ok(())
    }

    fn process(
        &mut self,
        mut image: DynamicImage,
        _cancel: &CancellationToken,
    ) -> Result<DynamicImage, ToolError> {
        image.invert();
        Ok(image)
    }
}

/// Brightness offset in -255..=255 and contrast in -100..=100 percent
#[derive(Debug, Clone, Copy, Default)]
pub struct BrightnessContrast {
    brightness: i32,
    contrast: f32,
}

impl ToolStep for BrightnessContrast {
    fn name(&self) -> &str {
        "brightness_contrast"
    }

    fn group(&self) -> ToolGroup {
        ToolGroup::Color
    }

    fn description(&self) -> &str {
        "Adjust brightness and contrast"
    }

    fn configure(&mut self, parameters: &Parameters, _: &CodecDefaults) -> Result<(), ToolError> {
        let brightness = parameters.i32("brightness")?.unwrap_or(0);
        if !(-255..=255).contains(&brightness) {
            return Err(ToolError::invalid("brightness", "must be within -255..=255"));
        }

        let contrast = parameters.f32("contrast")?.unwrap_or(0.0);
        if !(-100.0..=100.0).contains(&contrast) {
            return Err(ToolError::invalid("contrast", "must be within -100..=100"));
        }

        self.brightness = brightness;
        self.contrast = contrast;
        Ok(())
    }

    fn process(
        &mut self,
        image: DynamicImage,
        _cancel: &CancellationToken,
    ) -> Result<DynamicImage, ToolError> {
        let mut image = image;
        if self.brightness != 0 {
            image = image.brighten(self.brightness);
        }
        if self.contrast != 0.0 {
            image = image.adjust_contrast(self.contrast);
        }
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage};

    fn red() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([200, 0, 0])))
    }

    #[test]
    fn test_invert() {
        let mut tool = Invert;
        let out = tool.process(red(), &CancellationToken::new()).unwrap();
        assert_eq!(out.get_pixel(0, 0).0, [55, 255, 255, 255]);
    }

    #[test]
    fn test_grayscale_drops_color() {
        let mut tool = Grayscale;
        let out = tool.process(red(), &CancellationToken::new()).unwrap();
        assert!(matches!(out, DynamicImage::ImageLuma8(_)));
    }

    #[test]
    fn test_brightness_out_of_range() {
        let mut tool = BrightnessContrast::default();
        let params = Parameters::new().with("brightness", 300);

        let err = tool.configure(&params, &CodecDefaults::default()).unwrap_err();
        assert!(err.to_string().contains("brightness"));
    }

    #[test]
    fn test_brighten() {
        let mut tool = BrightnessContrast::default();
        tool.configure(
            &Parameters::new().with("brightness", 20),
            &CodecDefaults::default(),
        )
        .unwrap();

        let out = tool.process(red(), &CancellationToken::new()).unwrap();
        assert_eq!(out.get_pixel(0, 0).0, [220, 20, 20, 255]);
    }
}
