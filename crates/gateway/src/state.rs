use inference::{InferenceConfig, PredictionService};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

pub type SharedService = Arc<Mutex<PredictionService>>;

/// Shared handler state. The service slot stays empty until models finish loading.
#[derive(Clone, Default)]
pub struct AppState {
    service: Arc<RwLock<Option<SharedService>>>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// State with models already in place.
    pub fn with_service(service: PredictionService) -> Self {
        Self {
            service: Arc::new(RwLock::new(Some(Arc::new(Mutex::new(service))))),
        }
    }

    pub async fn service(&self) -> Option<SharedService> {
        self.service.read().await.clone()
    }

    pub async fn models_loaded(&self) -> bool {
        self.service.read().await.is_some()
    }

    pub async fn install(&self, service: PredictionService) {
        *self.service.write().await = Some(Arc::new(Mutex::new(service)));
    }

    /// Load models on the blocking pool and install them when ready.
    ///
    /// A failure is logged and leaves the slot empty, so `/predict` keeps
    /// answering 503.
    pub fn spawn_model_loader(&self, config: InferenceConfig) -> JoinHandle<()> {
        let state = self.clone();
        tokio::spawn(async move {
            tracing::info!(
                segmentation = %config.segmentation_model_path,
                depth = ?config.depth_model_path,
                "Loading models"
            );

            match tokio::task::spawn_blocking(move || PredictionService::load(config)).await {
                Ok(Ok(service)) => {
                    state.install(service).await;
                    tracing::info!("Models ready, accepting predictions");
                }
                Ok(Err(e)) => {
                    tracing::error!(error = %format!("{:#}", e), "Failed to load models");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Model loader task panicked");
                }
            }
        })
    }
}
