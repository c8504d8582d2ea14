//! 模型服务 - initialise-once model holders injected into the orchestrator

use super::caption::CaptionModel;
use super::embedding::SimilarityModel;
use super::error::PipelineError;
use super::ocr::TextRecognizer;
use log::{error, info};
use once_cell::sync::OnceCell;
use std::sync::Arc;

type Factory<T> = Box<dyn Fn() -> Result<Arc<T>, PipelineError> + Send + Sync>;

/// Lazily loaded, read-only-after-load model.
///
/// The factory runs on first `get`; a failed load is not cached, so a later
/// run retries.
pub struct ModelSlot<T: ?Sized> {
    name: &'static str,
    cell: OnceCell<Arc<T>>,
    factory: Factory<T>,
}

impl<T: ?Sized> ModelSlot<T> {
    pub fn lazy<F>(name: &'static str, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<T>, PipelineError> + Send + Sync + 'static,
    {
        Self {
            name,
            cell: OnceCell::new(),
            factory: Box::new(factory),
        }
    }

    /// Slot around an already constructed instance
    pub fn ready(name: &'static str, instance: Arc<T>) -> Self
    where
        T: Send + Sync + 'static,
    {
        let cell = OnceCell::new();
        let _ = cell.set(instance.clone());
        Self {
            name,
            cell,
            factory: Box::new(move || Ok(instance.clone())),
        }
    }

    pub fn get(&self) -> Result<Arc<T>, PipelineError> {
        self.cell
            .get_or_try_init(|| {
                info!("🔧 Loading {}", self.name);
                (self.factory)().map_err(|e| {
                    error!("❌ Failed to load {}: {}", self.name, e);
                    e
                })
            })
            .cloned()
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Everything the pipeline needs from the outside world
pub struct PipelineServices {
    pub similarity: ModelSlot<SimilarityModel>,
    pub ocr: ModelSlot<dyn TextRecognizer>,
    pub caption: ModelSlot<dyn CaptionModel>,
}

/// Loaded handles for one run
pub struct ResolvedServices {
    pub similarity: Arc<SimilarityModel>,
    pub ocr: Arc<dyn TextRecognizer>,
    pub caption: Arc<dyn CaptionModel>,
}

impl PipelineServices {
    pub fn new(
        similarity: ModelSlot<SimilarityModel>,
        ocr: ModelSlot<dyn TextRecognizer>,
        caption: ModelSlot<dyn CaptionModel>,
    ) -> Self {
        Self {
            similarity,
            ocr,
            caption,
        }
    }

    pub fn from_instances(
        similarity: SimilarityModel,
        ocr: Arc<dyn TextRecognizer>,
        caption: Arc<dyn CaptionModel>,
    ) -> Self {
        Self {
            similarity: ModelSlot::ready("similarity model", Arc::new(similarity)),
            ocr: ModelSlot::ready("ocr engine", ocr),
            caption: ModelSlot::ready("caption model", caption),
        }
    }

    /// Load everything up front so environment errors surface before any stage runs
    pub fn resolve(&self) -> Result<ResolvedServices, PipelineError> {
        Ok(ResolvedServices {
            similarity: self.similarity.get()?,
            ocr: self.ocr.get()?,
            caption: self.caption.get()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_factory_runs_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let slot: ModelSlot<String> = ModelSlot::lazy("greeting", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new("hello".to_string()))
        });

        assert!(!slot.is_loaded());
        let a = slot.get().unwrap();
        let b = slot.get().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(slot.is_loaded());
    }

    #[test]
    fn test_failed_load_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let slot: ModelSlot<String> = ModelSlot::lazy("flaky", move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(PipelineError::ModelLoadFailed("weights missing".into()))
            } else {
                Ok(Arc::new("ok".to_string()))
            }
        });

        assert!(matches!(slot.get(), Err(PipelineError::ModelLoadFailed(_))));
        assert_eq!(slot.get().unwrap().as_str(), "ok");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
