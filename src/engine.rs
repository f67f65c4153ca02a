use crate::acquire::DecodedImage;
use crate::error::CaptionError;
use crate::model::{Caption, CaptioningModel, request_caption};
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
        mpsc,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};
use tokio::sync::oneshot;

/// Represents the current state of the caption engine.
#[derive(Clone, Debug, PartialEq)]
pub enum CaptionEngineState {
    /// Waiting for the next image.
    Idle,
    /// The model is captioning an image.
    Processing,
}

impl CaptionEngineState {
    /// Returns the state as a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptionEngineState::Idle => "idle",
            CaptionEngineState::Processing => "processing",
        }
    }
}

type CaptionReply = oneshot::Sender<Result<CaptionEngineResponse, CaptionError>>;

struct CaptionEngineRequest {
    id: u64,
    image: DecodedImage,
    reply: CaptionReply,
}

/// A finished caption together with its timing and the image it describes.
pub struct CaptionEngineResponse {
    /// Identifier assigned when the request was queued.
    pub id: u64,
    /// When the model started on this image.
    pub start_time: Instant,
    /// Time spent inside the model.
    pub duration: Duration,
    pub caption: Caption,
    /// The captioned image, handed back to the caller.
    pub image: DecodedImage,
}

/// Owns a captioning model on a dedicated thread and feeds it one image at a time.
///
/// The model is moved in once at construction and never shared, so requests coming from
/// concurrent callers are captioned strictly in arrival order.
pub struct CaptionEngine {
    model_id: String,
    state: Arc<Mutex<CaptionEngineState>>,
    req_tx: Option<mpsc::Sender<CaptionEngineRequest>>,
    inference_handle: Option<JoinHandle<()>>,
    id_counter: AtomicU64,
}

impl CaptionEngine {
    /// Creates a new engine and starts its inference thread.
    ///
    /// # Arguments
    /// * `model_id` - Name used in logs
    /// * `model` - The model that will caption every request
    pub fn new<M>(model_id: impl Into<String>, mut model: M) -> Self
    where
        M: CaptioningModel + Send + 'static,
    {
        let model_id = model_id.into();
        let (req_tx, req_rx) = mpsc::channel::<CaptionEngineRequest>();
        let state = Arc::new(Mutex::new(CaptionEngineState::Idle));

        let inference_handle = std::thread::spawn({
            let state = state.clone();
            let model_id = model_id.clone();
            move || {
                while let Ok(req) = req_rx.recv() {
                    if req.reply.is_closed() {
                        log::debug!("Caller of request {} went away, skipping", req.id);
                        continue;
                    }

                    log::debug!("Captioning request {} with {model_id}", req.id);

                    set_state(&state, CaptionEngineState::Processing);
                    let start_time = Instant::now();

                    // a panicking model fails this request only
                    let caption = panic::catch_unwind(AssertUnwindSafe(|| {
                        request_caption(&req.image, &mut model)
                    }))
                    .unwrap_or_else(|payload| Err(model_panicked(payload)));

                    let result = caption.map(|caption| CaptionEngineResponse {
                        id: req.id,
                        start_time,
                        duration: start_time.elapsed(),
                        caption,
                        image: req.image,
                    });

                    match &result {
                        Ok(response) => {
                            log::debug!("Request {} captioned in {:?}", req.id, response.duration)
                        }
                        Err(e) => log::warn!("Request {} failed: {e}", req.id),
                    }

                    set_state(&state, CaptionEngineState::Idle);

                    if req.reply.send(result).is_err() {
                        log::debug!("Caller of request {} went away", req.id);
                    }
                }
                log::debug!("Caption engine for {model_id} stopped");
            }
        });

        Self {
            model_id,
            state,
            req_tx: Some(req_tx),
            inference_handle: Some(inference_handle),
            id_counter: AtomicU64::new(0),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Returns the current state of the engine.
    pub fn state(&self) -> CaptionEngineState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Queues an image and waits for its caption.
    pub async fn caption(
        &self,
        image: DecodedImage,
    ) -> Result<CaptionEngineResponse, CaptionError> {
        let tx = self.req_tx.as_ref().ok_or_else(engine_stopped)?;

        let id = self.id_counter.fetch_add(1, Ordering::Relaxed);
        let (reply, rx) = oneshot::channel();
        tx.send(CaptionEngineRequest { id, image, reply })
            .map_err(|_| engine_stopped())?;

        rx.await.map_err(|_| engine_stopped())?
    }

    /// Stops the engine and waits for the inference thread to finish queued requests.
    pub fn stop(&mut self) {
        self.req_tx.take();
        if let Some(handle) = self.inference_handle.take() {
            if handle.join().is_err() {
                log::error!("Caption engine thread for {} panicked", self.model_id);
            }
        }
    }
}

impl Drop for CaptionEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn set_state(state: &Mutex<CaptionEngineState>, next: CaptionEngineState) {
    *state.lock().unwrap_or_else(PoisonError::into_inner) = next;
}

fn engine_stopped() -> CaptionError {
    CaptionError::inference(std::io::Error::other("caption engine is not running"))
}

fn model_panicked(payload: Box<dyn Any + Send>) -> CaptionError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    CaptionError::inference(std::io::Error::other(format!("model panicked: {message}")))
}
