//! Background image fetching and decoding.
//!
//! Fetches run on worker threads and report back over a channel. The owner
//! applies completions on its own thread, and only the completion tagged
//! with the current generation may change the state. Setting a new URL (or
//! clearing it) bumps the generation, which retires every fetch in flight.

use kurbo::Size;
use std::fs;
use std::future::Future;
use std::io::Cursor;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError, channel};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

/// Background fetch errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FetchError {
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Image data could not be decoded")]
    Undecodable,
}

/// Result type for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;

/// Future returned by an [`ImageFetcher`]. It is driven on a worker thread.
pub type FetchFuture = Pin<Box<dyn Future<Output = FetchResult<Vec<u8>>> + Send + 'static>>;

/// Retrieves the raw bytes behind a background URL.
pub trait ImageFetcher: Send + Sync {
    fn fetch(&self, url: &Url) -> FetchFuture;
}

/// Turns raw bytes into an image. `None` means "no image available".
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Option<DecodedImage>;
}

/// A decoded background image. Only its natural size matters to the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
}

impl DecodedImage {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width as f64, self.height as f64)
    }
}

/// Reads `file://` URLs from the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileFetcher;

impl ImageFetcher for FileFetcher {
    fn fetch(&self, url: &Url) -> FetchFuture {
        let path = if url.scheme() == "file" {
            url.to_file_path()
                .map_err(|_| FetchError::Io(format!("Not a local path: {}", url)))
        } else {
            Err(FetchError::UnsupportedScheme(url.scheme().to_string()))
        };
        Box::pin(async move {
            let path = path?;
            fs::read(&path)
                .map_err(|e| FetchError::Io(format!("Failed to read {}: {}", path.display(), e)))
        })
    }
}

/// Fetches `http(s)://` URLs with a blocking `reqwest` client.
#[cfg(feature = "http")]
#[derive(Debug, Default, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "http")]
impl ImageFetcher for HttpFetcher {
    fn fetch(&self, url: &Url) -> FetchFuture {
        let client = self.client.clone();
        let url = url.clone();
        Box::pin(async move {
            let response = client
                .get(url.as_str())
                .send()
                .and_then(|r| r.error_for_status())
                .map_err(|e| FetchError::Http(e.to_string()))?;
            let bytes = response
                .bytes()
                .map_err(|e| FetchError::Http(e.to_string()))?;
            Ok(bytes.to_vec())
        })
    }
}

/// Dispatches on the URL scheme to the fetchers compiled in.
#[derive(Debug, Default, Clone)]
pub struct SchemeFetcher {
    file: FileFetcher,
    #[cfg(feature = "http")]
    http: HttpFetcher,
}

impl ImageFetcher for SchemeFetcher {
    fn fetch(&self, url: &Url) -> FetchFuture {
        match url.scheme() {
            "file" => self.file.fetch(url),
            #[cfg(feature = "http")]
            "http" | "https" => self.http.fetch(url),
            other => {
                let err = FetchError::UnsupportedScheme(other.to_string());
                Box::pin(async move { Err(err) })
            }
        }
    }
}

/// Decodes PNG, JPEG and WebP headers with the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCrateDecoder;

impl ImageDecoder for ImageCrateDecoder {
    fn decode(&self, bytes: &[u8]) -> Option<DecodedImage> {
        let reader = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .ok()?;
        let (width, height) = reader.into_dimensions().ok()?;
        if width == 0 || height == 0 {
            return None;
        }
        Some(DecodedImage::new(width, height))
    }
}

/// Lifecycle of one document's background image.
#[derive(Debug, Clone, PartialEq)]
pub enum BackgroundState {
    /// No URL, or the last fetch failed.
    Empty,
    /// A fetch for this URL is in flight.
    Loading(Url),
    /// The image for this URL is available.
    Loaded { url: Url, image: DecodedImage },
}

impl BackgroundState {
    pub fn image(&self) -> Option<&DecodedImage> {
        match self {
            Self::Loaded { image, .. } => Some(image),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading(_))
    }
}

/// What happened to a completion handed back by a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// It belonged to the current generation and updated the state.
    Applied,
    /// A newer URL was set meanwhile; the result was dropped.
    Discarded,
}

struct FetchCompletion {
    generation: u64,
    url: Url,
    result: FetchResult<DecodedImage>,
}

/// Fetch the bytes and decode them, reporting undecodable data as an error.
fn fetch_image(fetch: FetchFuture, decoder: &dyn ImageDecoder) -> FetchResult<DecodedImage> {
    let bytes = pollster::block_on(fetch)?;
    decoder.decode(&bytes).ok_or(FetchError::Undecodable)
}

/// Generation-tagged background loader.
pub struct BackgroundLoader {
    fetcher: Arc<dyn ImageFetcher>,
    decoder: Arc<dyn ImageDecoder>,
    generation: u64,
    state: BackgroundState,
    last_error: Option<FetchError>,
    tx: Sender<FetchCompletion>,
    rx: Receiver<FetchCompletion>,
}

impl BackgroundLoader {
    pub fn new(fetcher: Arc<dyn ImageFetcher>, decoder: Arc<dyn ImageDecoder>) -> Self {
        let (tx, rx) = channel();
        Self {
            fetcher,
            decoder,
            generation: 0,
            state: BackgroundState::Empty,
            last_error: None,
            tx,
            rx,
        }
    }

    pub fn state(&self) -> &BackgroundState {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Why the current URL has no image, if its fetch failed.
    pub fn last_error(&self) -> Option<&FetchError> {
        self.last_error.as_ref()
    }

    /// Start loading `url`, retiring any fetch in flight.
    ///
    /// The state moves to `Loading` even if `url` equals the previous one;
    /// `None` moves it straight to `Empty`.
    pub fn load(&mut self, url: Option<Url>) {
        self.generation += 1;
        self.last_error = None;
        let Some(url) = url else {
            self.state = BackgroundState::Empty;
            return;
        };
        self.state = BackgroundState::Loading(url.clone());

        let generation = self.generation;
        let fetch = self.fetcher.fetch(&url);
        let decoder = self.decoder.clone();
        let tx = self.tx.clone();
        log::debug!("Fetching background {} (generation {})", url, generation);
        thread::spawn(move || {
            let result = fetch_image(fetch, decoder.as_ref());
            if let Err(e) = &result {
                log::warn!("Background {} failed to load: {}", url, e);
            }
            // The receiver lives as long as the loader; a send error only
            // means the document is gone.
            let _ = tx.send(FetchCompletion {
                generation,
                url,
                result,
            });
        });
    }

    fn apply(&mut self, completion: FetchCompletion) -> CompletionOutcome {
        if completion.generation != self.generation {
            log::debug!(
                "Discarding stale background {} (generation {}, current {})",
                completion.url,
                completion.generation,
                self.generation
            );
            return CompletionOutcome::Discarded;
        }
        self.state = match completion.result {
            Ok(image) => {
                self.last_error = None;
                BackgroundState::Loaded {
                    url: completion.url,
                    image,
                }
            }
            Err(e) => {
                self.last_error = Some(e);
                BackgroundState::Empty
            }
        };
        CompletionOutcome::Applied
    }

    /// Apply every completion that has arrived, without blocking.
    ///
    /// Returns `true` if the state changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        loop {
            match self.rx.try_recv() {
                Ok(completion) => {
                    changed |= self.apply(completion) == CompletionOutcome::Applied;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return changed,
            }
        }
    }

    /// Block for the next completion, up to `timeout`.
    pub fn wait(&mut self, timeout: Duration) -> Option<CompletionOutcome> {
        match self.rx.recv_timeout(timeout) {
            Ok(completion) => Some(self.apply(completion)),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Block until the current generation resolves or `timeout` elapses.
    ///
    /// Returns `true` if the state changed.
    pub fn wait_settled(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut changed = false;
        while self.state.is_loading() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.wait(remaining) {
                Some(CompletionOutcome::Applied) => changed = true,
                Some(CompletionOutcome::Discarded) => {}
                None => break,
            }
        }
        changed
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fetchers whose completion order the test controls.

    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// Encode an in-memory PNG of the given size.
    pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(image::RgbaImage::new(width, height))
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    /// Each fetch for a URL blocks until the test releases its gate.
    #[derive(Default)]
    pub struct GatedFetcher {
        gates: Mutex<HashMap<String, VecDeque<Receiver<FetchResult<Vec<u8>>>>>>,
    }

    impl GatedFetcher {
        /// Register the next fetch of `url`; send on the result to release it.
        pub fn gate(&self, url: &str) -> Sender<FetchResult<Vec<u8>>> {
            let (tx, rx) = channel();
            self.gates
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_default()
                .push_back(rx);
            tx
        }
    }

    impl ImageFetcher for GatedFetcher {
        fn fetch(&self, url: &Url) -> FetchFuture {
            let gate = self
                .gates
                .lock()
                .unwrap()
                .get_mut(url.as_str())
                .and_then(|q| q.pop_front());
            Box::pin(async move {
                match gate {
                    Some(rx) => rx
                        .recv()
                        .unwrap_or_else(|_| Err(FetchError::Io("gate dropped".to_string()))),
                    None => Err(FetchError::Io("no gate registered".to_string())),
                }
            })
        }
    }

    pub fn gated_loader() -> (Arc<GatedFetcher>, BackgroundLoader) {
        let fetcher = Arc::new(GatedFetcher::default());
        let loader = BackgroundLoader::new(fetcher.clone(), Arc::new(ImageCrateDecoder));
        (fetcher, loader)
    }
}
