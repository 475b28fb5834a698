use crate::config::{ConfigError, PlateConfig};
use crate::resolver::Playback;
use crate::schema::{InferenceResponse, PlateEntity, ResultSet};
use crate::store::{PlateStore, StoreSettings};
use crate::validate::PlateValidator;
use tracing::{debug, warn};

/// Runs the consolidation pipeline over one inference response.
pub struct ConsolidationEngine {
    config: PlateConfig,
    validator: PlateValidator,
}

impl ConsolidationEngine {
    pub fn new(config: PlateConfig) -> Result<Self, ConfigError> {
        let validator = PlateValidator::new(&config.validation)?;
        Ok(Self { config, validator })
    }

    pub fn config(&self) -> &PlateConfig {
        &self.config
    }

    /// A fresh, empty store carrying this engine's settings.
    pub fn store(&self) -> PlateStore {
        PlateStore::new(self.validator.clone(), StoreSettings::from(&self.config))
    }

    /// Ingest, pick best readings, merge near-duplicates, drop implausible plates.
    pub fn consolidate(&self, response: &InferenceResponse) -> PlateStore {
        let mut store = self.store();
        store.ingest_response(response);
        store.select_best_reading();
        store.merge();
        store.filter();

        debug!(
            plates = store.len(),
            failures = store.failures().len(),
            raw_boxes = store.raw_boxes().len(),
            skipped = store.skipped_records(),
            "consolidated result set"
        );

        // Development aid
        if cfg!(debug_assertions)
            && let Err(validation_error) = self.validate_store(&store)
        {
            warn!(%validation_error, "consolidated store violates an invariant");
        }

        store
    }

    /// Playback at the reported frame rate. A missing, zero, negative or
    /// non-finite rate falls back to `playback.default_fps`.
    pub fn playback(&self, store: &PlateStore) -> Playback {
        let fps = store
            .fps()
            .filter(|fps| fps.is_finite() && *fps > 0.0)
            .unwrap_or(self.config.playback.default_fps);
        Playback::new(fps)
    }

    pub fn max_gap(&self) -> Option<u32> {
        self.config.playback.max_gap()
    }

    pub fn result_set(&self, store: &PlateStore, response: &InferenceResponse) -> ResultSet {
        ResultSet::from_store(store, response.filename.clone(), self.playback(store).fps())
    }

    fn validate_store(&self, store: &PlateStore) -> Result<(), String> {
        let source = self.config.validation.text_source;
        for entity in store.entities() {
            let plate = match entity {
                PlateEntity::Recognized(plate) => plate,
                PlateEntity::Failed { message } => {
                    return Err(format!("failed entity survived filtering: {}", message));
                }
            };
            if !plate.is_timeline_sorted() {
                return Err(format!("timeline of {} is not strictly ascending", plate.track_id));
            }
            if !self.validator.is_valid(plate.best.text(source)) {
                return Err(format!("{} kept an invalid reading", plate.track_id));
            }
        }
        Ok(())
    }
}

impl Default for ConsolidationEngine {
    fn default() -> Self {
        Self {
            config: PlateConfig::default(),
            validator: PlateValidator::default(),
        }
    }
}
