//! Shared fixtures for integration tests: tiny images, fake steps and
//! event collection.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use batchq::core::PoolEvent;
use batchq::tools::checkpoint;
use batchq::{
    ExecutionEvent, MediaItemRef, Parameters, StatusKind, StepConfig, ToolChain, ToolError,
    ToolGroup, ToolRegistry, ToolStep,
};
use image::{DynamicImage, Rgb, RgbImage};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use batchq::domain::CodecDefaults;

/// Write a small solid-color PNG and return its path
pub fn write_png(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    RgbImage::from_pixel(8, 4, Rgb([200, 40, 10])).save(&path).unwrap();
    path
}

/// Files in `dir`, sorted by name
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Temporary artifacts left behind in `dir`
pub fn temp_files(dir: &Path) -> Vec<String> {
    file_names(dir)
        .into_iter()
        .filter(|n| n.starts_with(".batchq-"))
        .collect()
}

/// Sleeps in small slices, honouring cancellation
#[derive(Default)]
pub struct Wait {
    millis: u64,
}

impl ToolStep for Wait {
    fn name(&self) -> &str {
        "wait"
    }

    fn group(&self) -> ToolGroup {
        ToolGroup::Custom
    }

    fn configure(&mut self, parameters: &Parameters, _codec: &CodecDefaults) -> Result<(), ToolError> {
        self.millis = parameters.u32("millis")?.unwrap_or(50) as u64;
        Ok(())
    }

    fn process(
        &mut self,
        image: DynamicImage,
        cancel: &CancellationToken,
    ) -> Result<DynamicImage, ToolError> {
        let mut waited = 0;
        while waited < self.millis {
            checkpoint(cancel)?;
            thread::sleep(Duration::from_millis(5));
            waited += 5;
        }
        Ok(image)
    }
}

/// Always fails
#[derive(Default)]
pub struct Explode;

impl ToolStep for Explode {
    fn name(&self) -> &str {
        "explode"
    }

    fn group(&self) -> ToolGroup {
        ToolGroup::Custom
    }

    fn configure(&mut self, _parameters: &Parameters, _codec: &CodecDefaults) -> Result<(), ToolError> {
        Ok(())
    }

    fn process(
        &mut self,
        _image: DynamicImage,
        _cancel: &CancellationToken,
    ) -> Result<DynamicImage, ToolError> {
        Err(ToolError::Failed("boom".to_string()))
    }
}

/// Panics while processing
#[derive(Default)]
pub struct Panic;

impl ToolStep for Panic {
    fn name(&self) -> &str {
        "panic"
    }

    fn group(&self) -> ToolGroup {
        ToolGroup::Custom
    }

    fn configure(&mut self, _parameters: &Parameters, _codec: &CodecDefaults) -> Result<(), ToolError> {
        Ok(())
    }

    fn process(
        &mut self,
        _image: DynamicImage,
        _cancel: &CancellationToken,
    ) -> Result<DynamicImage, ToolError> {
        panic!("step blew up")
    }
}

pub const SIDECAR_TEXT: &str = "<x:xmpmeta>rating=5</x:xmpmeta>";

/// Leaves pixels alone and attaches sidecar metadata
#[derive(Default)]
pub struct Annotate;

impl ToolStep for Annotate {
    fn name(&self) -> &str {
        "annotate"
    }

    fn group(&self) -> ToolGroup {
        ToolGroup::Custom
    }

    fn configure(&mut self, _parameters: &Parameters, _codec: &CodecDefaults) -> Result<(), ToolError> {
        Ok(())
    }

    fn process(
        &mut self,
        image: DynamicImage,
        _cancel: &CancellationToken,
    ) -> Result<DynamicImage, ToolError> {
        Ok(image)
    }

    fn sidecar(&self) -> Option<String> {
        Some(SIDECAR_TEXT.to_string())
    }
}

/// Built-in tools plus the fakes above
pub fn test_registry() -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::with_builtin_tools();
    registry.register(|| Box::new(Wait::default()));
    registry.register(|| Box::new(Explode));
    registry.register(|| Box::new(Panic));
    registry.register(|| Box::new(Annotate));
    Arc::new(registry)
}

pub fn custom(name: &str, index: usize) -> StepConfig {
    StepConfig::new(name, ToolGroup::Custom, index, 1)
}

pub fn wait(index: usize, millis: u64) -> StepConfig {
    custom("wait", index).with_parameters(Parameters::new().with("millis", millis))
}

pub fn rotate(index: usize) -> StepConfig {
    StepConfig::new("rotate", ToolGroup::Transform, index, 1)
        .with_parameters(Parameters::new().with("angle", 90))
}

pub fn flip(index: usize) -> StepConfig {
    StepConfig::new("flip", ToolGroup::Transform, index, 1)
}

/// Chain for `source` whose output keeps the source file name
pub fn chain(source: &Path, steps: Vec<StepConfig>, registry: &ToolRegistry) -> ToolChain {
    let item = MediaItemRef::from_path(source);
    let name = item.file_name();
    ToolChain::build(item, name, steps, registry).unwrap()
}

/// Drain a direct executor channel
pub fn collect(rx: &mut mpsc::UnboundedReceiver<ExecutionEvent>) -> Vec<ExecutionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn kinds(events: &[ExecutionEvent]) -> Vec<StatusKind> {
    events.iter().map(|e| e.kind).collect()
}

/// Receive pool events until the next `Drained` marker
pub async fn until_drained(rx: &mut mpsc::UnboundedReceiver<PoolEvent>) -> Vec<ExecutionEvent> {
    let mut events = Vec::new();
    loop {
        let next = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("pool did not drain in time");
        match next {
            Some(PoolEvent::Execution(event)) => events.push(event),
            Some(PoolEvent::Drained) => return events,
            None => panic!("pool event channel closed"),
        }
    }
}

/// Terminal events in arrival order
pub fn terminal(events: &[ExecutionEvent]) -> Vec<&ExecutionEvent> {
    events.iter().filter(|e| e.is_terminal()).collect()
}
