use thiserror::Error;

use crate::gpu::{BackendErrorCode, BackendErrorKind};
use crate::types::ShaderStage;

/// Fatal failures raised while standing up or driving the CRT pipeline.
///
/// Every variant aborts the pipeline; there is no partially working mode.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("could not compile {stage} shader {origin}\n\n{log}")]
    ShaderCompile {
        stage: ShaderStage,
        origin: String,
        log: String,
    },
    #[error("could not link shader program\n\n{log}")]
    ProgramLink { log: String },
    #[error("graphics backend error {kind}: {detail}")]
    Backend {
        code: BackendErrorCode,
        kind: BackendErrorKind,
        detail: String,
    },
    #[error("shader program does not expose {expected} `{name}`")]
    MissingBinding {
        name: String,
        expected: &'static str,
    },
    #[error("failed to create rendering surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),
    #[error("failed to create GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error("failed to create window: {0}")]
    Window(#[from] winit::error::OsError),
    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
    #[error("surface error: {0}")]
    Frame(wgpu::SurfaceError),
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}
