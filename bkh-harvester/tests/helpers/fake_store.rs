//! In-memory workflow store

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use bkh_harvester::models::{CatalogRecord, LogLevel, Step, StepStatus, WorkflowRecord};
use bkh_harvester::workflow::{StoreError, WorkflowStore};

/// Snapshot of one stored record
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub record: WorkflowRecord,
    pub steps: Vec<Step>,
    pub metadata: BTreeMap<String, Vec<String>>,
    pub log: Vec<(LogLevel, String)>,
    pub catalog: Option<CatalogRecord>,
}

#[derive(Default)]
struct State {
    next_id: i64,
    templates: BTreeMap<String, Vec<(String, StepStatus)>>,
    records: BTreeMap<String, StoredRecord>,
    create_calls: usize,
    deleted: Vec<String>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn step_mut(&mut self, step_id: i64) -> Option<&mut Step> {
        self.records
            .values_mut()
            .flat_map(|r| r.steps.iter_mut())
            .find(|s| s.id == step_id)
    }

    fn record_mut(&mut self, record: &WorkflowRecord) -> Result<&mut StoredRecord, StoreError> {
        self.records
            .get_mut(&record.title)
            .ok_or_else(|| StoreError::RecordNotFound(record.title.clone()))
    }
}

/// Workflow store kept in memory; record directories live under `root`
pub struct FakeStore {
    root: PathBuf,
    state: Mutex<State>,
}

impl FakeStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            state: Mutex::new(State::default()),
        }
    }

    pub fn add_template(&self, title: &str, steps: &[(&str, StepStatus)]) {
        let steps = steps.iter().map(|(t, s)| (t.to_string(), *s)).collect();
        self.state.lock().unwrap().templates.insert(title.to_string(), steps);
    }

    /// Pretend a record was created by an earlier run
    pub fn add_existing(&self, title: &str) {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        let record = WorkflowRecord::new(id, title, self.root.join(id.to_string()));
        state.records.insert(
            title.to_string(),
            StoredRecord {
                record,
                steps: Vec::new(),
                metadata: BTreeMap::new(),
                log: Vec::new(),
                catalog: None,
            },
        );
    }

    pub fn record(&self, title: &str) -> Option<StoredRecord> {
        self.state.lock().unwrap().records.get(title).cloned()
    }

    pub fn create_calls(&self) -> usize {
        self.state.lock().unwrap().create_calls
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }
}

#[async_trait]
impl WorkflowStore for FakeStore {
    async fn record_exists(&self, title: &str) -> Result<bool, StoreError> {
        Ok(self.state.lock().unwrap().records.contains_key(title))
    }

    async fn create_from_template(
        &self,
        template_title: &str,
        new_title: &str,
    ) -> Result<WorkflowRecord, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.create_calls += 1;

        let template = state
            .templates
            .get(template_title)
            .cloned()
            .ok_or_else(|| StoreError::TemplateNotFound(template_title.to_string()))?;
        if state.records.contains_key(new_title) {
            return Err(StoreError::DuplicateTitle(new_title.to_string()));
        }

        let id = state.next_id();
        let record = WorkflowRecord::new(id, new_title, self.root.join(id.to_string()));
        let mut steps = Vec::new();
        for (ordinal, (title, status)) in template.into_iter().enumerate() {
            let step_id = state.next_id();
            steps.push(Step {
                id: step_id,
                record_id: id,
                ordinal: ordinal as i64 + 1,
                title,
                status,
            });
        }

        std::fs::create_dir_all(record.storage_dir()).map_err(|source| StoreError::Io {
            path: record.storage_dir().to_path_buf(),
            source,
        })?;

        state.records.insert(
            new_title.to_string(),
            StoredRecord {
                record: record.clone(),
                steps,
                metadata: BTreeMap::new(),
                log: Vec::new(),
                catalog: None,
            },
        );
        Ok(record)
    }

    async fn delete_record_and_storage(&self, record: &WorkflowRecord) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state
            .records
            .remove(&record.title)
            .ok_or_else(|| StoreError::RecordNotFound(record.title.clone()))?;
        state.deleted.push(record.title.clone());
        if record.storage_dir().exists() {
            std::fs::remove_dir_all(record.storage_dir()).map_err(|source| StoreError::Io {
                path: record.storage_dir().to_path_buf(),
                source,
            })?;
        }
        Ok(())
    }

    async fn first_open_step(&self, record: &WorkflowRecord) -> Result<Option<Step>, StoreError> {
        let mut state = self.state.lock().unwrap();
        let stored = state.record_mut(record)?;
        Ok(stored
            .steps
            .iter()
            .find(|s| s.status == StepStatus::Open)
            .cloned())
    }

    async fn first_step(&self, record: &WorkflowRecord) -> Result<Option<Step>, StoreError> {
        let mut state = self.state.lock().unwrap();
        let stored = state.record_mut(record)?;
        Ok(stored.steps.first().cloned())
    }

    async fn advance_step(&self, step: &Step) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let stored = state
            .records
            .values_mut()
            .find(|r| r.record.id == step.record_id)
            .ok_or_else(|| StoreError::RecordNotFound(format!("record {}", step.record_id)))?;

        let mut opened_next = false;
        for s in stored.steps.iter_mut() {
            if s.id == step.id {
                s.status = StepStatus::Done;
            } else if !opened_next && s.ordinal > step.ordinal && s.status == StepStatus::Locked {
                s.status = StepStatus::Open;
                opened_next = true;
            }
        }
        Ok(())
    }

    async fn set_step_status(&self, step: &Step, status: StepStatus) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let target = state
            .step_mut(step.id)
            .ok_or_else(|| StoreError::RecordNotFound(format!("step {}", step.id)))?;
        target.status = status;
        Ok(())
    }

    async fn append_log_entry(
        &self,
        record: &WorkflowRecord,
        message: &str,
        level: LogLevel,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.record_mut(record)?.log.push((level, message.to_string()));
        Ok(())
    }

    async fn set_metadata(
        &self,
        record: &WorkflowRecord,
        field: &str,
        values: &[String],
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state
            .record_mut(record)?
            .metadata
            .insert(field.to_string(), values.to_vec());
        Ok(())
    }

    async fn attach_catalog_record(
        &self,
        record: &WorkflowRecord,
        catalog: &CatalogRecord,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.record_mut(record)?.catalog = Some(catalog.clone());
        Ok(())
    }
}
