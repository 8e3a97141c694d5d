//! Format converters.
//!
//! Converting steps declare an output suffix, which makes the invocation
//! write their result to disk even in the middle of a chain. Encoding itself
//! happens in `invocation::save_image`; converters only carry the encoder
//! settings for their format.

use image::DynamicImage;
use tokio_util::sync::CancellationToken;

use crate::domain::{CodecDefaults, PngCompression};

use super::{Parameters, ToolError, ToolGroup, ToolRegistry, ToolStep};

pub fn register(registry: &mut ToolRegistry) {
    registry.register(|| Box::new(ConvertTool::jpeg()));
    registry.register(|| Box::new(ConvertTool::png()));
    registry.register(|| Box::new(ConvertTool::tiff()));
    registry.register(|| Box::new(ConvertTool::bmp()));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFormat {
    Jpeg,
    Png,
    Tiff,
    Bmp,
}

impl TargetFormat {
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Tiff => "tif",
            Self::Bmp => "bmp",
        }
    }

    fn tool_name(self) -> &'static str {
        match self {
            Self::Jpeg => "convert_jpeg",
            Self::Png => "convert_png",
            Self::Tiff => "convert_tiff",
            Self::Bmp => "convert_bmp",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConvertTool {
    format: TargetFormat,
    codec: CodecDefaults,
}

impl ConvertTool {
    pub fn new(format: TargetFormat) -> Self {
        Self {
            format,
            codec: CodecDefaults::default(),
        }
    }

    pub fn jpeg() -> Self {
        Self::new(TargetFormat::Jpeg)
    }

    pub fn png() -> Self {
        Self::new(TargetFormat::Png)
    }

    pub fn tiff() -> Self {
        Self::new(TargetFormat::Tiff)
    }

    pub fn bmp() -> Self {
        Self::new(TargetFormat::Bmp)
    }
}

impl ToolStep for ConvertTool {
    fn name(&self) -> &str {
        self.format.tool_name()
    }

    fn group(&self) -> ToolGroup {
        ToolGroup::Convert
    }

    fn description(&self) -> &str {
        match self.format {
            TargetFormat::Jpeg => "Convert to JPEG",
            TargetFormat::Png => "Convert to PNG",
            TargetFormat::Tiff => "Convert to TIFF",
            TargetFormat::Bmp => "Convert to BMP",
        }
    }

    fn output_format_suffix(&self) -> Option<&str> {
        Some(self.format.suffix())
    }

    fn configure(&mut self, parameters: &Parameters, codec: &CodecDefaults) -> Result<(), ToolError> {
        self.codec = codec.clone();

        match self.format {
            TargetFormat::Jpeg => {
                if let Some(quality) = parameters.u32("quality")? {
                    if !(1..=100).contains(&quality) {
                        return Err(ToolError::invalid("quality", "must be within 1..=100"));
                    }
                    self.codec.jpeg_quality = quality as u8;
                }
            }
            TargetFormat::Png => {
                self.codec.png_compression = match parameters.str("compression")? {
                    None => codec.png_compression,
                    Some("default") => PngCompression::Default,
                    Some("fast") => PngCompression::Fast,
                    Some("best") => PngCompression::Best,
                    Some(other) => {
                        return Err(ToolError::invalid(
                            "compression",
                            format!("expected default, fast or best, got '{}'", other),
                        ))
                    }
                };
            }
            TargetFormat::Tiff | TargetFormat::Bmp => {}
        }

        Ok(())
    }

    fn codec_settings(&self) -> Option<CodecDefaults> {
        Some(self.codec.clone())
    }

    fn process(
        &mut self,
        image: DynamicImage,
        _cancel: &CancellationToken,
    ) -> Result<DynamicImage, ToolError> {
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jpeg_quality_overrides_run_default() {
        let mut tool = ConvertTool::jpeg();
        tool.configure(&Parameters::new().with("quality", 75), &CodecDefaults::default())
            .unwrap();

        assert_eq!(tool.codec_settings().unwrap().jpeg_quality, 75);
    }

    #[test]
    fn test_jpeg_quality_falls_back_to_run_default() {
        let defaults = CodecDefaults {
            jpeg_quality: 60,
            ..Default::default()
        };
        let mut tool = ConvertTool::jpeg();
        tool.configure(&Parameters::new(), &defaults).unwrap();

        assert_eq!(tool.codec_settings().unwrap().jpeg_quality, 60);
    }

    #[test]
    fn test_png_compression_parameter() {
        let mut tool = ConvertTool::png();
        tool.configure(
            &Parameters::new().with("compression", "best"),
            &CodecDefaults::default(),
        )
        .unwrap();
        assert_eq!(tool.codec_settings().unwrap().png_compression, PngCompression::Best);

        assert!(tool
            .configure(
                &Parameters::new().with("compression", "extreme"),
                &CodecDefaults::default()
            )
            .is_err());
    }

    #[test]
    fn test_suffixes() {
        assert_eq!(ConvertTool::jpeg().output_format_suffix(), Some("jpg"));
        assert_eq!(ConvertTool::tiff().output_format_suffix(), Some("tif"));
        assert_eq!(ConvertTool::bmp().name(), "convert_bmp");
    }
}
