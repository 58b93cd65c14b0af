//! The native window the status overlay is drawn in. Only size and
//! visibility cross this boundary.

use ovl_core::{encode_frame, FrameError, OutboundFrame, WindowSize, DEFAULT_MAX_FRAME_BYTES};
use std::io::Write;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("surface write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

pub trait WindowSurface: Send {
    fn resize(&mut self, size: WindowSize) -> Result<(), SurfaceError>;
    fn hide(&mut self) -> Result<(), SurfaceError>;
}

/// Emits `window_size` / `window_hidden` frames for a host process that
/// owns the real window.
pub struct NdjsonSurface<W> {
    out: W,
}

impl<W: Write + Send> NdjsonSurface<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    fn emit(&mut self, frame: &OutboundFrame) -> Result<(), SurfaceError> {
        let line = encode_frame(frame, DEFAULT_MAX_FRAME_BYTES)?;
        self.out.write_all(&line)?;
        self.out.flush()?;
        Ok(())
    }
}

impl<W: Write + Send> WindowSurface for NdjsonSurface<W> {
    fn resize(&mut self, size: WindowSize) -> Result<(), SurfaceError> {
        self.emit(&OutboundFrame::window_size(size))
    }

    fn hide(&mut self) -> Result<(), SurfaceError> {
        self.emit(&OutboundFrame::WindowHidden)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemorySurface {
    pub resizes: Vec<WindowSize>,
    pub hidden: usize,
    pub fail_resize: bool,
}

impl WindowSurface for MemorySurface {
    fn resize(&mut self, size: WindowSize) -> Result<(), SurfaceError> {
        if self.fail_resize {
            return Err(SurfaceError::Io(std::io::Error::other("window is gone")));
        }
        self.resizes.push(size);
        Ok(())
    }

    fn hide(&mut self) -> Result<(), SurfaceError> {
        self.hidden += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ndjson_surface_writes_one_frame_per_call() {
        let mut surface = NdjsonSurface::new(Vec::new());
        surface
            .resize(WindowSize {
                width: 600,
                height: 96,
            })
            .expect("resize");
        surface.hide().expect("hide");

        let text = String::from_utf8(surface.out).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                r#"{"type":"window_size","width":600,"height":96}"#,
                r#"{"type":"window_hidden"}"#,
            ]
        );
    }
}
