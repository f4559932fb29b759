//! Background decoding and rasterisation of the test card.
//!
//! The render loop never waits on the image. A worker thread owns the decoded
//! source, announces its intrinsic size once, and afterwards rasterises it at
//! whatever size the texture cache asks for. The loop drains replies with
//! [`ContentSource::poll`] once per tick. If decoding fails the worker simply
//! exits; the disconnected channel is the only signal, and the placeholder
//! texture stays in place for good.

use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use resvg::{tiny_skia, usvg};
use thiserror::Error;

use crate::error::RenderError;

#[derive(Debug)]
pub(crate) enum SourceEvent {
    /// The image decoded; carries its intrinsic size in pixels.
    Decoded { width: u32, height: u32 },
    /// Straight-alpha RGBA8 pixels rasterised at the requested size.
    Rasterized {
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    },
    /// No raster could be produced at the requested size.
    Failed { width: u32, height: u32 },
}

#[derive(Debug)]
pub(crate) enum SourcePoll {
    Ready(SourceEvent),
    Pending,
    /// The worker is gone; nothing further will arrive.
    Closed,
}

#[derive(Debug, Error)]
enum SourceError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse SVG: {0}")]
    Svg(#[from] usvg::Error),
    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),
}

enum SourceImage {
    Vector(usvg::Tree),
    Raster(image::RgbaImage),
}

impl SourceImage {
    fn load(path: &Path) -> Result<Self, SourceError> {
        let bytes = std::fs::read(path).map_err(|source| SourceError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if is_svg(path, &bytes) {
            let mut options = usvg::Options {
                resources_dir: path.parent().map(Path::to_path_buf),
                ..Default::default()
            };
            options.fontdb_mut().load_system_fonts();
            let tree = usvg::Tree::from_data(&bytes, &options)?;
            Ok(SourceImage::Vector(tree))
        } else {
            Ok(SourceImage::Raster(image::load_from_memory(&bytes)?.to_rgba8()))
        }
    }

    fn size(&self) -> (u32, u32) {
        match self {
            SourceImage::Vector(tree) => {
                let size = tree.size();
                (
                    (size.width().ceil() as u32).max(1),
                    (size.height().ceil() as u32).max(1),
                )
            }
            SourceImage::Raster(image) => image.dimensions(),
        }
    }

    fn rasterize(&self, width: u32, height: u32) -> Option<Vec<u8>> {
        if width == 0 || height == 0 {
            return None;
        }
        match self {
            SourceImage::Vector(tree) => {
                let mut pixmap = tiny_skia::Pixmap::new(width, height)?;
                let size = tree.size();
                let transform = tiny_skia::Transform::from_scale(
                    width as f32 / size.width(),
                    height as f32 / size.height(),
                );
                resvg::render(tree, transform, &mut pixmap.as_mut());
                let mut pixels = Vec::with_capacity(pixmap.data().len());
                for pixel in pixmap.pixels() {
                    let color = pixel.demultiply();
                    pixels.extend_from_slice(&[
                        color.red(),
                        color.green(),
                        color.blue(),
                        color.alpha(),
                    ]);
                }
                Some(pixels)
            }
            SourceImage::Raster(image) => Some(
                image::imageops::resize(
                    image,
                    width,
                    height,
                    image::imageops::FilterType::Triangle,
                )
                .into_raw(),
            ),
        }
    }
}

fn is_svg(path: &Path, bytes: &[u8]) -> bool {
    let by_extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("svg") || ext.eq_ignore_ascii_case("svgz"));
    if by_extension {
        return true;
    }
    let head = &bytes[..bytes.len().min(256)];
    let text = String::from_utf8_lossy(head);
    let trimmed = text.trim_start();
    trimmed.starts_with("<svg") || (trimmed.starts_with("<?xml") && text.contains("<svg"))
}

pub(crate) struct ContentSource {
    requests: Sender<(u32, u32)>,
    events: Receiver<SourceEvent>,
    _worker: JoinHandle<()>,
}

impl ContentSource {
    pub fn spawn(path: PathBuf) -> Result<Self, RenderError> {
        let (request_tx, request_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        let worker = thread::Builder::new()
            .name("phosphor-source".into())
            .spawn(move || run_worker(&path, request_rx, event_tx))
            .map_err(|source| RenderError::Spawn {
                name: "content source",
                source,
            })?;
        Ok(Self {
            requests: request_tx,
            events: event_rx,
            _worker: worker,
        })
    }

    /// Queues a rasterisation; returns false once the worker has exited.
    pub fn request(&self, width: u32, height: u32) -> bool {
        self.requests.send((width, height)).is_ok()
    }

    pub fn poll(&self) -> SourcePoll {
        match self.events.try_recv() {
            Ok(event) => SourcePoll::Ready(event),
            Err(TryRecvError::Empty) => SourcePoll::Pending,
            Err(TryRecvError::Disconnected) => SourcePoll::Closed,
        }
    }

    #[cfg(test)]
    fn wait(&self, timeout: std::time::Duration) -> SourcePoll {
        match self.events.recv_timeout(timeout) {
            Ok(event) => SourcePoll::Ready(event),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => SourcePoll::Pending,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => SourcePoll::Closed,
        }
    }
}

fn run_worker(path: &Path, requests: Receiver<(u32, u32)>, events: Sender<SourceEvent>) {
    let image = match SourceImage::load(path) {
        Ok(image) => image,
        Err(error) => {
            tracing::warn!(
                path = %path.display(),
                %error,
                "failed to decode test card; keeping placeholder"
            );
            return;
        }
    };
    let (width, height) = image.size();
    tracing::debug!(path = %path.display(), width, height, "decoded test card");
    if events.send(SourceEvent::Decoded { width, height }).is_err() {
        return;
    }

    while let Ok(mut target) = requests.recv() {
        // Only the newest size matters; older ones are already stale.
        while let Ok(next) = requests.try_recv() {
            target = next;
        }
        let (width, height) = target;
        let event = match image.rasterize(width, height) {
            Some(pixels) => SourceEvent::Rasterized {
                width,
                height,
                pixels,
            },
            None => {
                tracing::warn!(width, height, "failed to allocate test card raster");
                SourceEvent::Failed { width, height }
            }
        };
        if events.send(event).is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(10);

    const CARD: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="40" height="30">
        <rect width="20" height="30" fill="#ff0000"/>
        <rect x="20" width="20" height="30" fill="#0000ff"/>
    </svg>"##;

    fn write_temp(suffix: &str, contents: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(suffix)
            .tempfile()
            .expect("temp file");
        file.write_all(contents).expect("write");
        file
    }

    #[test]
    fn svg_decodes_then_rasterizes_on_request() {
        let file = write_temp(".svg", CARD.as_bytes());
        let source = ContentSource::spawn(file.path().to_path_buf()).expect("spawn");

        match source.wait(TIMEOUT) {
            SourcePoll::Ready(SourceEvent::Decoded { width, height }) => {
                assert_eq!((width, height), (40, 30));
            }
            other => panic!("expected decode, got {other:?}"),
        }

        assert!(source.request(80, 60));
        match source.wait(TIMEOUT) {
            SourcePoll::Ready(SourceEvent::Rasterized {
                width,
                height,
                pixels,
            }) => {
                assert_eq!((width, height), (80, 60));
                assert_eq!(pixels.len(), 80 * 60 * 4);
                assert_eq!(&pixels[..4], &[255, 0, 0, 255]);
                let last = pixels.len() - 4;
                assert_eq!(&pixels[last..], &[0, 0, 255, 255]);
            }
            other => panic!("expected raster, got {other:?}"),
        }
    }

    #[test]
    fn impossible_raster_size_reports_failure() {
        let file = write_temp(".svg", CARD.as_bytes());
        let source = ContentSource::spawn(file.path().to_path_buf()).expect("spawn");
        assert!(matches!(
            source.wait(TIMEOUT),
            SourcePoll::Ready(SourceEvent::Decoded { .. })
        ));

        assert!(source.request(0, 30));
        assert!(matches!(
            source.wait(TIMEOUT),
            SourcePoll::Ready(SourceEvent::Failed {
                width: 0,
                height: 30
            })
        ));

        assert!(source.request(40, 30));
        assert!(matches!(
            source.wait(TIMEOUT),
            SourcePoll::Ready(SourceEvent::Rasterized {
                width: 40,
                height: 30,
                ..
            })
        ));
    }

    #[test]
    fn raster_images_are_resized() {
        let mut image = image::RgbaImage::new(2, 2);
        for pixel in image.pixels_mut() {
            *pixel = image::Rgba([10, 200, 30, 255]);
        }
        let mut png = Vec::new();
        image
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .expect("encode png");
        let file = write_temp(".png", &png);
        let source = ContentSource::spawn(file.path().to_path_buf()).expect("spawn");

        assert!(matches!(
            source.wait(TIMEOUT),
            SourcePoll::Ready(SourceEvent::Decoded {
                width: 2,
                height: 2
            })
        ));
        assert!(source.request(6, 4));
        match source.wait(TIMEOUT) {
            SourcePoll::Ready(SourceEvent::Rasterized { pixels, .. }) => {
                assert_eq!(pixels.len(), 6 * 4 * 4);
                for texel in pixels.chunks(4) {
                    for (channel, expected) in texel.iter().zip([10u8, 200, 30, 255]) {
                        assert!(channel.abs_diff(expected) <= 1, "{texel:?}");
                    }
                }
            }
            other => panic!("expected raster, got {other:?}"),
        }
    }

    #[test]
    fn undecodable_source_closes_without_events() {
        let file = write_temp(".svg", b"<svg this is not xml");
        let source = ContentSource::spawn(file.path().to_path_buf()).expect("spawn");
        assert!(matches!(source.wait(TIMEOUT), SourcePoll::Closed));
        assert!(matches!(source.poll(), SourcePoll::Closed));
    }

    #[test]
    fn missing_file_closes_without_events() {
        let source = ContentSource::spawn(PathBuf::from("/nonexistent/testcard.svg"))
            .expect("spawn");
        assert!(matches!(source.wait(TIMEOUT), SourcePoll::Closed));
    }

    #[test]
    fn sniffs_svg_without_extension() {
        assert!(is_svg(Path::new("card"), CARD.as_bytes()));
        assert!(is_svg(
            Path::new("card.dat"),
            b"<?xml version=\"1.0\"?>\n<svg xmlns=\"http://www.w3.org/2000/svg\"/>"
        ));
        assert!(!is_svg(Path::new("card.png"), b"\x89PNG\r\n"));
    }
}
