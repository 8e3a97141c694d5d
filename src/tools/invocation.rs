//! One execution of a step within a chain.
//!
//! Wraps a freshly built `ToolStep` with the behaviour every step shares:
//! temporary output naming, loading the input when it is not in memory yet,
//! and saving the result when the chain needs it on disk.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{
    sidecar_path, CodecDefaults, DecodeDefaults, PngCompression, TransientArtifact,
};

use super::{checkpoint, Parameters, ToolError, ToolStep};

/// Prefix of every temporary artifact written into the working directory
pub const TEMP_PREFIX: &str = ".batchq-";

/// A configured step bound to its input artifact
pub struct ToolInvocation {
    tool: Box<dyn ToolStep>,
    index: usize,
    last_in_chain: bool,
    input: Option<TransientArtifact>,
    working_directory: PathBuf,
    codec: CodecDefaults,
    decode: DecodeDefaults,
    output: Option<PathBuf>,
    cancel: CancellationToken,
}

impl ToolInvocation {
    /// Bind `tool` to the artifact produced by the previous step (or the
    /// source file for the first step).
    pub fn new(
        tool: Box<dyn ToolStep>,
        index: usize,
        input: TransientArtifact,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            tool,
            index,
            last_in_chain: false,
            input: Some(input),
            working_directory: PathBuf::from("."),
            codec: CodecDefaults::default(),
            decode: DecodeDefaults::default(),
            output: None,
            cancel,
        }
    }

    pub fn set_last_in_chain(&mut self, last: bool) {
        self.last_in_chain = last;
    }

    /// Apply parameters and run-wide defaults. No side effects.
    pub fn configure(
        &mut self,
        parameters: &Parameters,
        codec: &CodecDefaults,
        working_directory: &Path,
    ) -> Result<(), ToolError> {
        self.tool.configure(parameters, codec)?;
        self.codec = self.tool.codec_settings().unwrap_or_else(|| codec.clone());
        self.decode = codec.decode;
        self.working_directory = working_directory.to_path_buf();
        Ok(())
    }

    /// Derive the temporary path this step writes to.
    ///
    /// The suffix is the step's output format when it converts, otherwise the
    /// input's suffix.
    pub fn prepare_output_location(&mut self) -> PathBuf {
        let suffix = self
            .tool
            .output_format_suffix()
            .map(str::to_string)
            .or_else(|| self.input.as_ref().and_then(TransientArtifact::suffix));

        let mut name = format!("{}{}-{}", TEMP_PREFIX, self.index, Uuid::new_v4().simple());
        if let Some(suffix) = suffix {
            name.push('.');
            name.push_str(&suffix);
        }

        let path = self.working_directory.join(name);
        self.output = Some(path.clone());
        path
    }

    /// Whether this invocation writes its result to disk
    pub fn writes_output(&self) -> bool {
        self.last_in_chain || self.tool.output_format_suffix().is_some()
    }

    /// Stop this invocation at its next checkpoint
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Load, transform and (when needed) save.
    ///
    /// A failure may leave a partially written file at the output location;
    /// the caller owns cleaning it up.
    pub fn execute(&mut self) -> Result<TransientArtifact, ToolError> {
        let output = self.output.clone().ok_or(ToolError::OutputNotPrepared)?;
        let input = self
            .input
            .take()
            .ok_or_else(|| ToolError::Failed("step input was already consumed".to_string()))?;

        checkpoint(&self.cancel)?;
        let image = match input.image {
            Some(image) => image,
            None => load_image(&input.path, self.decode)?,
        };

        checkpoint(&self.cancel)?;
        let image = self.tool.process(image, &self.cancel)?;

        checkpoint(&self.cancel)?;
        let sidecar = self.tool.sidecar().or(input.sidecar);

        if self.writes_output() {
            debug!(step = self.index, tool = self.tool.name(), path = %output.display(), "Saving step output");
            save_image(&image, &output, &self.codec)?;

            if self.last_in_chain {
                if let Some(ref text) = sidecar {
                    fs::write(sidecar_path(&output), text)?;
                }
            }
        }

        Ok(TransientArtifact {
            image: Some(image),
            path: output,
            sidecar,
        })
    }
}

/// Decode a source file, guessing the format from its content
pub fn load_image(path: &Path, decode: DecodeDefaults) -> Result<DynamicImage, ToolError> {
    let bytes = fs::read(path)?;
    let image = image::load_from_memory(&bytes).map_err(|source| ToolError::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    if decode.half_size {
        let width = (image.width() / 2).max(1);
        let height = (image.height() / 2).max(1);
        return Ok(image.resize_exact(width, height, FilterType::Triangle));
    }

    Ok(image)
}

/// Encode `image` to `path`, choosing the format from the extension
pub fn save_image(image: &DynamicImage, path: &Path, codec: &CodecDefaults) -> Result<(), ToolError> {
    let format = ImageFormat::from_path(path)
        .map_err(|_| ToolError::UnsupportedFormat(path.display().to_string()))?;

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    let encoded = match format {
        ImageFormat::Jpeg => {
            let quality = codec.jpeg_quality.clamp(1, 100);
            let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut writer, quality))
        }
        ImageFormat::Png => {
            let compression = match codec.png_compression {
                PngCompression::Default => CompressionType::Default,
                PngCompression::Fast => CompressionType::Fast,
                PngCompression::Best => CompressionType::Best,
            };
            image.write_with_encoder(PngEncoder::new_with_quality(
                &mut writer,
                compression,
                PngFilter::Adaptive,
            ))
        }
        other => image.write_to(&mut writer, other),
    };

    encoded.map_err(|source| ToolError::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::transform::{Flip, Rotate};
    use crate::tools::convert::ConvertTool;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn write_source(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(4, 2, Rgb([200, 10, 10])).save(&path).unwrap();
        path
    }

    fn invocation(tool: Box<dyn ToolStep>, dir: &Path, source: &Path) -> ToolInvocation {
        let mut inv = ToolInvocation::new(
            tool,
            0,
            TransientArtifact::source(source),
            CancellationToken::new(),
        );
        inv.configure(&Parameters::new(), &CodecDefaults::default(), dir)
            .unwrap();
        inv
    }

    #[test]
    fn test_output_location_keeps_input_suffix() {
        let temp = TempDir::new().unwrap();
        let source = write_source(temp.path(), "a.png");
        let mut inv = invocation(Box::new(Flip::default()), temp.path(), &source);

        let output = inv.prepare_output_location();
        let name = output.file_name().unwrap().to_string_lossy().into_owned();

        assert_eq!(output.parent(), Some(temp.path()));
        assert!(name.starts_with(".batchq-0-"));
        assert!(name.ends_with(".png"));
    }

    #[test]
    fn test_output_location_uses_converted_suffix() {
        let temp = TempDir::new().unwrap();
        let source = write_source(temp.path(), "a.png");
        let mut inv = invocation(Box::new(ConvertTool::jpeg()), temp.path(), &source);

        let output = inv.prepare_output_location();
        assert_eq!(output.extension().unwrap(), "jpg");
    }

    #[test]
    fn test_output_locations_never_collide() {
        let temp = TempDir::new().unwrap();
        let source = write_source(temp.path(), "a.png");
        let mut a = invocation(Box::new(Flip::default()), temp.path(), &source);
        let mut b = invocation(Box::new(Flip::default()), temp.path(), &source);

        assert_ne!(a.prepare_output_location(), b.prepare_output_location());
    }

    #[test]
    fn test_intermediate_step_stays_in_memory() {
        let temp = TempDir::new().unwrap();
        let source = write_source(temp.path(), "a.png");
        let mut inv = invocation(Box::new(Rotate::default()), temp.path(), &source);
        let output = inv.prepare_output_location();

        let artifact = inv.execute().unwrap();

        assert!(!output.exists());
        let image = artifact.image.unwrap();
        assert_eq!((image.width(), image.height()), (2, 4));
    }

    #[test]
    fn test_last_step_writes_output() {
        let temp = TempDir::new().unwrap();
        let source = write_source(temp.path(), "a.png");
        let mut inv = invocation(Box::new(Flip::default()), temp.path(), &source);
        inv.set_last_in_chain(true);
        let output = inv.prepare_output_location();

        let artifact = inv.execute().unwrap();

        assert_eq!(artifact.path, output);
        let saved = image::open(&output).unwrap();
        assert_eq!((saved.width(), saved.height()), (4, 2));
    }

    #[test]
    fn test_execute_without_prepare_fails() {
        let temp = TempDir::new().unwrap();
        let source = write_source(temp.path(), "a.png");
        let mut inv = invocation(Box::new(Flip::default()), temp.path(), &source);

        assert!(matches!(inv.execute(), Err(ToolError::OutputNotPrepared)));
    }

    #[test]
    fn test_cancelled_before_execute() {
        let temp = TempDir::new().unwrap();
        let source = write_source(temp.path(), "a.png");
        let mut inv = invocation(Box::new(Flip::default()), temp.path(), &source);
        inv.set_last_in_chain(true);
        let output = inv.prepare_output_location();

        inv.cancel();

        assert!(matches!(inv.execute(), Err(ToolError::Cancelled)));
        assert!(!output.exists());
    }

    #[test]
    fn test_half_size_decoding() {
        let temp = TempDir::new().unwrap();
        let source = write_source(temp.path(), "a.png");

        let image = load_image(&source, DecodeDefaults { half_size: true }).unwrap();
        assert_eq!((image.width(), image.height()), (2, 1));
    }

    #[test]
    fn test_decode_error_names_the_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();

        let err = load_image(&path, DecodeDefaults::default()).unwrap_err();
        assert!(err.to_string().contains("broken.png"));
    }

    #[test]
    fn test_save_rejects_unknown_extension() {
        let temp = TempDir::new().unwrap();
        let image = DynamicImage::ImageRgb8(RgbImage::new(2, 2));

        let err = save_image(&image, &temp.path().join("out.unknown"), &CodecDefaults::default())
            .unwrap_err();
        assert!(matches!(err, ToolError::UnsupportedFormat(_)));
    }
}
