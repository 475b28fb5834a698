use crate::config::{PlateConfig, TextSource};
use crate::matching::{SearchRank, levenshtein};
use crate::schema::{
    InferenceResponse, PlateEntity, RawBox, Record, TrackId, TrackedPlate,
};
use crate::validate::PlateValidator;
use tracing::{debug, warn};

/// Tunables the store applies during consolidation.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSettings {
    pub text_source: TextSource,
    pub length_ratio: f64,
    pub merge_threshold: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self::from(&PlateConfig::default())
    }
}

impl From<&PlateConfig> for StoreSettings {
    fn from(config: &PlateConfig) -> Self {
        Self {
            text_source: config.validation.text_source,
            length_ratio: config.consolidation.length_ratio,
            merge_threshold: config.consolidation.merge_threshold,
        }
    }
}

/// Registry of plate entities for one result set.
///
/// A store is built for a single upload and dropped afterwards; start a new
/// one for the next file rather than clearing it.
#[derive(Debug, Default)]
pub struct PlateStore {
    entities: Vec<PlateEntity>,
    raw_boxes: Vec<RawBox>,
    failures: Vec<String>,
    records_seen: u64,
    skipped_records: usize,
    fps: Option<f64>,
    validator: PlateValidator,
    settings: StoreSettings,
}

impl PlateStore {
    pub fn new(validator: PlateValidator, settings: StoreSettings) -> Self {
        Self {
            validator,
            settings,
            ..Self::default()
        }
    }

    /// Add one normalized record.
    pub fn ingest(&mut self, record: Record) {
        match record {
            Record::Failure { message } => {
                self.records_seen += 1;
                debug!(%message, "recording failed recognition");
                self.entities.push(PlateEntity::Failed { message });
            }
            Record::RawBox(raw) => self.raw_boxes.push(raw),
            Record::Detection {
                track_id,
                detection,
            } => {
                self.records_seen += 1;
                let id = match track_id {
                    Some(external) => TrackId::External(external),
                    None => TrackId::Sequential(self.records_seen),
                };
                match self.find_mut(&id) {
                    Some(plate) => plate.push(detection),
                    None => {
                        debug!(track_id = %id, frame = detection.frame, "new plate entity");
                        let mut plate = TrackedPlate::new(id);
                        plate.push(detection);
                        self.entities.push(PlateEntity::Recognized(plate));
                    }
                }
            }
        }
    }

    /// Normalize and ingest every record of a response. Malformed records are
    /// skipped; the frame rate is taken from the first record.
    pub fn ingest_response(&mut self, response: &InferenceResponse) {
        if self.fps.is_none() {
            self.fps = response.fps();
        }
        for (index, item) in response.results.iter().enumerate() {
            match Record::try_from(item) {
                Ok(record) => self.ingest(record),
                Err(err) => {
                    warn!(index, %err, "skipping malformed detection record");
                    self.skipped_records += 1;
                }
            }
        }
    }

    pub fn select_best_reading(&mut self) {
        for plate in self.entities.iter_mut().filter_map(PlateEntity::as_plate_mut) {
            plate.select_best_reading(
                &self.validator,
                self.settings.text_source,
                self.settings.length_ratio,
            );
        }
    }

    /// Drop plates whose best reading is not plausible. Failed recognitions
    /// leave the entity list here and are kept in [`PlateStore::failures`].
    pub fn filter(&mut self) {
        let source = self.settings.text_source;
        for entity in std::mem::take(&mut self.entities) {
            match entity {
                PlateEntity::Failed { message } => self.failures.push(message),
                PlateEntity::Recognized(plate) => {
                    if self.validator.is_valid(plate.best.text(source)) {
                        self.entities.push(PlateEntity::Recognized(plate));
                    } else {
                        debug!(track_id = %plate.track_id, "dropping plate without a valid reading");
                    }
                }
            }
        }
    }

    /// Merge entities whose best readings are within the edit-distance
    /// threshold. The earlier entity absorbs the later one.
    pub fn merge(&mut self) {
        for plate in self.entities.iter_mut().filter_map(PlateEntity::as_plate_mut) {
            plate.normalize_timeline();
        }

        let mut i = 0;
        while i < self.entities.len() {
            let mut j = i + 1;
            while j < self.entities.len() {
                let close = match (self.merge_key(i), self.merge_key(j)) {
                    (Some(a), Some(b)) => levenshtein(a, b) <= self.settings.merge_threshold,
                    _ => false,
                };
                if !close {
                    j += 1;
                    continue;
                }
                // j now names the next unvisited entity
                if let PlateEntity::Recognized(absorbed) = self.entities.remove(j)
                    && let Some(receiver) = self.entities[i].as_plate_mut()
                {
                    debug!(
                        into = %receiver.track_id,
                        from = %absorbed.track_id,
                        "merging plate entities"
                    );
                    receiver.absorb(absorbed);
                }
            }
            i += 1;
        }
    }

    /// Plates ranked against `query`, case-insensitively: substring hits first
    /// by match position, then everything else by edit distance.
    pub fn search(&self, query: &str) -> Vec<&TrackedPlate> {
        let query = query.to_lowercase();
        let mut ranked: Vec<(SearchRank, &TrackedPlate)> = self
            .plates()
            .map(|plate| (SearchRank::of(&plate.best.text, &query), plate))
            .collect();
        ranked.sort_by_key(|(rank, _)| *rank);
        ranked.into_iter().map(|(_, plate)| plate).collect()
    }

    pub fn entities(&self) -> &[PlateEntity] {
        &self.entities
    }

    pub fn plates(&self) -> impl Iterator<Item = &TrackedPlate> {
        self.entities.iter().filter_map(PlateEntity::as_plate)
    }

    pub fn find(&self, id: &TrackId) -> Option<&TrackedPlate> {
        self.plates().find(|plate| &plate.track_id == id)
    }

    pub fn raw_boxes(&self) -> &[RawBox] {
        &self.raw_boxes
    }

    pub fn failures(&self) -> &[String] {
        &self.failures
    }

    pub fn skipped_records(&self) -> usize {
        self.skipped_records
    }

    pub fn fps(&self) -> Option<f64> {
        self.fps
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    fn find_mut(&mut self, id: &TrackId) -> Option<&mut TrackedPlate> {
        self.entities
            .iter_mut()
            .filter_map(PlateEntity::as_plate_mut)
            .find(|plate| &plate.track_id == id)
    }

    fn merge_key(&self, index: usize) -> Option<&str> {
        self.entities[index]
            .as_plate()
            .filter(|plate| plate.has_reading())
            .map(|plate| plate.best.text.as_str())
    }
}
