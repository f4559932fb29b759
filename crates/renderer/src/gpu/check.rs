//! Setup-time error checking.
//!
//! wgpu reports most failures asynchronously through error scopes instead of a
//! pollable error flag, so setup calls are wrapped in [`ErrorChecker::guarded`]
//! which pushes scopes, runs the calls, and pops them again. Anything a scope
//! (or the device-lost callback, or an explicit capability check) reports is
//! translated through a static table into a [`BackendErrorKind`] and aborts
//! setup. Steady-state frame calls are not checked.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::error::RenderError;

/// Failure classes the checker can observe on the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendErrorCode {
    /// A validation error scope caught a rejected call.
    Validation,
    /// An out-of-memory error scope fired.
    OutOfMemory,
    /// The device-lost callback ran.
    DeviceLost,
    /// The surface offers no texture format the pipeline can render to.
    UnsupportedFormat,
    /// A texture or surface extent is zero or beyond the device limits.
    ExtentOutOfRange,
    /// The surface offers no present or alpha mode.
    SurfaceUnpresentable,
}

/// Symbolic kind reported in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendErrorKind {
    InvalidEnum,
    InvalidValue,
    InvalidOperation,
    InvalidFramebufferOperation,
    OutOfMemory,
    ContextLost,
}

impl BackendErrorCode {
    pub const ALL: [BackendErrorCode; 6] = [
        BackendErrorCode::Validation,
        BackendErrorCode::OutOfMemory,
        BackendErrorCode::DeviceLost,
        BackendErrorCode::UnsupportedFormat,
        BackendErrorCode::ExtentOutOfRange,
        BackendErrorCode::SurfaceUnpresentable,
    ];

    /// Every code maps to exactly one kind and no two codes share a kind.
    pub const fn kind(self) -> BackendErrorKind {
        match self {
            BackendErrorCode::Validation => BackendErrorKind::InvalidOperation,
            BackendErrorCode::OutOfMemory => BackendErrorKind::OutOfMemory,
            BackendErrorCode::DeviceLost => BackendErrorKind::ContextLost,
            BackendErrorCode::UnsupportedFormat => BackendErrorKind::InvalidEnum,
            BackendErrorCode::ExtentOutOfRange => BackendErrorKind::InvalidValue,
            BackendErrorCode::SurfaceUnpresentable => {
                BackendErrorKind::InvalidFramebufferOperation
            }
        }
    }
}

impl BackendErrorKind {
    pub const fn label(self) -> &'static str {
        match self {
            BackendErrorKind::InvalidEnum => "INVALID_ENUM",
            BackendErrorKind::InvalidValue => "INVALID_VALUE",
            BackendErrorKind::InvalidOperation => "INVALID_OPERATION",
            BackendErrorKind::InvalidFramebufferOperation => "INVALID_FRAMEBUFFER_OPERATION",
            BackendErrorKind::OutOfMemory => "OUT_OF_MEMORY",
            BackendErrorKind::ContextLost => "CONTEXT_LOST",
        }
    }
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub(crate) fn backend_error(code: BackendErrorCode, detail: impl Into<String>) -> RenderError {
    RenderError::Backend {
        code,
        kind: code.kind(),
        detail: detail.into(),
    }
}

pub(crate) struct ErrorChecker {
    lost: Arc<Mutex<Option<String>>>,
}

impl ErrorChecker {
    /// Registers the device-lost hook; must be created once per device.
    pub fn attach(device: &wgpu::Device) -> Self {
        let lost = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            if reason == wgpu::DeviceLostReason::Destroyed {
                tracing::debug!(%message, "GPU device released");
                return;
            }
            tracing::error!(?reason, %message, "GPU device lost");
            if let Ok(mut slot) = sink.lock() {
                *slot = Some(format!("{reason:?}: {message}"));
            }
        });
        Self { lost }
    }

    /// Runs `calls` inside validation and out-of-memory scopes.
    pub fn guarded<T>(
        &self,
        device: &wgpu::Device,
        calls: impl FnOnce() -> T,
    ) -> Result<T, RenderError> {
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = calls();
        let validation = pollster::block_on(device.pop_error_scope());
        let out_of_memory = pollster::block_on(device.pop_error_scope());

        self.check_lost()?;
        if let Some(error) = out_of_memory {
            return Err(backend_error(BackendErrorCode::OutOfMemory, error.to_string()));
        }
        if let Some(error) = validation {
            return Err(backend_error(BackendErrorCode::Validation, error.to_string()));
        }
        Ok(value)
    }

    fn check_lost(&self) -> Result<(), RenderError> {
        let reason = self.lost.lock().ok().and_then(|slot| slot.clone());
        match reason {
            Some(reason) => Err(backend_error(BackendErrorCode::DeviceLost, reason)),
            None => Ok(()),
        }
    }
}

/// Rejects extents that are empty or exceed the device's 2D texture limit.
pub(crate) fn check_extent(
    max_dimension: u32,
    what: &str,
    width: u32,
    height: u32,
) -> Result<(), RenderError> {
    if width == 0 || height == 0 || width > max_dimension || height > max_dimension {
        return Err(backend_error(
            BackendErrorCode::ExtentOutOfRange,
            format!("{what} is {width}x{height}, GPU max texture dimension is {max_dimension}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn each_code_maps_to_a_distinct_kind() {
        let kinds: HashSet<_> = BackendErrorCode::ALL.iter().map(|code| code.kind()).collect();
        assert_eq!(kinds.len(), BackendErrorCode::ALL.len());
    }

    #[test]
    fn labels_are_distinct() {
        let labels: HashSet<_> = BackendErrorCode::ALL
            .iter()
            .map(|code| code.kind().label())
            .collect();
        assert_eq!(labels.len(), BackendErrorCode::ALL.len());
        assert_eq!(BackendErrorCode::Validation.kind().label(), "INVALID_OPERATION");
        assert_eq!(BackendErrorCode::ExtentOutOfRange.kind().label(), "INVALID_VALUE");
    }

    #[test]
    fn extent_check_rejects_empty_and_oversized() {
        assert!(check_extent(8192, "surface", 1920, 1080).is_ok());
        for (width, height) in [(0, 10), (10, 0), (8193, 10), (10, 9000)] {
            let err = check_extent(8192, "surface", width, height).expect_err("out of range");
            match err {
                RenderError::Backend { code, kind, .. } => {
                    assert_eq!(code, BackendErrorCode::ExtentOutOfRange);
                    assert_eq!(kind, BackendErrorKind::InvalidValue);
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn backend_error_message_names_the_kind() {
        let err = backend_error(BackendErrorCode::OutOfMemory, "texture allocation failed");
        assert_eq!(
            err.to_string(),
            "graphics backend error OUT_OF_MEMORY: texture allocation failed"
        );
    }
}
