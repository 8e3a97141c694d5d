//! Blur and sharpen.

use image::DynamicImage;
use tokio_util::sync::CancellationToken;

use crate::domain::CodecDefaults;

use super::{Parameters, ToolError, ToolGroup, ToolRegistry, ToolStep};

pub fn register(registry: &mut ToolRegistry) {
    registry.register(|| Box::new(Blur::default()));
    registry.register(|| Box::new(Sharpen::default()));
}

fn sigma(parameters: &Parameters) -> Result<f32, ToolError> {
    let sigma = parameters.f32("sigma")?.unwrap_or(1.0);
    if !(sigma > 0.0 && sigma <= 100.0) {
        return Err(ToolError::invalid("sigma", "must be within (0, 100]"));
    }
    Ok(sigma)
}

/// Gaussian blur
#[derive(Debug, Clone, Copy)]
pub struct Blur {
    sigma: f32,
}

impl Default for Blur {
    fn default() -> Self {
        Self { sigma: 1.0 }
    }
}

impl ToolStep for Blur {
    fn name(&self) -> &str {
        "blur"
    }

    fn group(&self) -> ToolGroup {
        ToolGroup::Enhance
    }

    fn description(&self) -> &str {
        "Gaussian blur"
    }

    fn configure(&mut self, parameters: &Parameters, _: &CodecDefaults) -> Result<(), ToolError> {
        self.sigma = sigma(parameters)?;
        Ok(())
    }

    fn process(
        &mut self,
        image: DynamicImage,
        _cancel: &CancellationToken,
    ) -> Result<DynamicImage, ToolError> {
        Ok(image.blur(self.sigma))
    }
}

/// Unsharp mask
#[derive(Debug, Clone, Copy)]
pub struct Sharpen {
    sigma: f32,
    threshold: i32,
}

impl Default for Sharpen {
    fn default() -> Self {
        Self {
            sigma: 1.0,
            threshold: 0,
        }
    }
}

impl ToolStep for Sharpen {
    fn name(&self) -> &str {
        "sharpen"
    }

    fn group(&self) -> ToolGroup {
        ToolGroup::Enhance
    }

    fn description(&self) -> &str {
        "Unsharp mask"
    }

    fn configure(&mut self, parameters: &Parameters, _: &CodecDefaults) -> Result<(), ToolError> {
        self.sigma = sigma(parameters)?;
        self.threshold = parameters.i32("threshold")?.unwrap_or(0);
        if self.threshold < 0 {
            return Err(ToolError::invalid("threshold", "must not be negative"));
        }
        Ok(())
    }

    fn process(
        &mut self,
        image: DynamicImage,
        _cancel: &CancellationToken,
    ) -> Result<DynamicImage, ToolError> {
        Ok(image.unsharpen(self.sigma, self.threshold))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigma_defaults_to_one() {
        let mut tool = Blur::default();
        tool.configure(&Parameters::new(), &CodecDefaults::default())
            .unwrap();
        assert_eq!(tool.sigma, 1.0);
    }

    #[test]
    fn test_rejects_non_positive_sigma() {
        let mut tool = Sharpen::default();
        let err = tool
            .configure(&Parameters::new().with("sigma", 0.0), &CodecDefaults::default())
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameter { .. }));
    }
}
