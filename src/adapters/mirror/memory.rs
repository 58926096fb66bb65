//! In-process mirror implementing [`MirrorClient`]
//!
//! Applies submissions the way the remote catalog does: `insertorreplace`
//! swaps the whole record and turns FFT fields into hosted 856 links,
//! `correct` replaces the tags carried by the payload and drops all-blank
//! fields. Used by tests and by local runs against fixture data.

use super::client::{MirrorClient, MirrorResult, SubmissionRequest, SubmitResponse};
use super::xml::{to_marcxml_collection, MirrorRecordReader};
use crate::core::clock::Clock;
use crate::core::transform::mirror_file_name;
use crate::domain::{
    Field, MarcFields, MirrorError, MirrorRecord, Nonce, RecordId, RecordType, Subfield,
    SubmitMode,
};
use async_trait::async_trait;
use regex::Regex;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// A submission as received, before it was applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedSubmission {
    pub mode: SubmitMode,
    pub nonce: Nonce,
    pub xml: String,
}

#[derive(Debug)]
struct State {
    records: HashMap<(RecordType, RecordId), Vec<Field>>,
    submissions: Vec<ReceivedSubmission>,
    apply: bool,
    reject: Option<(u16, String)>,
    search_failures: VecDeque<MirrorError>,
    file_sizes: HashMap<String, u64>,
    next_id: u64,
}

pub struct InMemoryMirror {
    state: Mutex<State>,
    clock: Arc<dyn Clock>,
    file_host: String,
}

impl InMemoryMirror {
    pub fn new(clock: Arc<dyn Clock>, file_host: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(State {
                records: HashMap::new(),
                submissions: Vec::new(),
                apply: true,
                reject: None,
                search_failures: VecDeque::new(),
                file_sizes: HashMap::new(),
                next_id: 1000,
            }),
            clock,
            file_host: file_host.into(),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seeds a mirror copy as-is
    pub fn insert(&self, record_type: RecordType, id: RecordId, fields: Vec<Field>) {
        self.state().records.insert((record_type, id), fields);
    }

    /// Drops a mirror copy, as if purged on the remote side
    pub fn remove(&self, record_type: RecordType, id: RecordId) {
        self.state().records.remove(&(record_type, id));
    }

    pub fn get(&self, record_type: RecordType, id: RecordId) -> Option<MirrorRecord> {
        self.state()
            .records
            .get(&(record_type, id))
            .map(|fields| MirrorRecord::new(fields.clone()))
    }

    pub fn submissions(&self) -> Vec<ReceivedSubmission> {
        self.state().submissions.clone()
    }

    /// When false, submissions are accepted but never become visible
    pub fn set_apply(&self, apply: bool) {
        self.state().apply = apply;
    }

    /// Answers every following submission with `status`
    pub fn reject_with(&self, status: u16, body: impl Into<String>) {
        self.state().reject = Some((status, body.into()));
    }

    pub fn accept_submissions(&self) {
        self.state().reject = None;
    }

    /// Makes the next search fail with `error`
    pub fn fail_next_search(&self, error: MirrorError) {
        self.state().search_failures.push_back(error);
    }

    /// Size reported in 856$s once the file at `source_url` is ingested
    pub fn register_file(&self, source_url: impl Into<String>, size: u64) {
        self.state().file_sizes.insert(source_url.into(), size);
    }

    fn marker(&self) -> String {
        self.clock.now().format("%Y%m%d%H%M%S.0").to_string()
    }

    fn hosted_link(&self, mirror_id: &str, fft: &Field, sizes: &HashMap<String, u64>) -> Field {
        let name = fft.get_value('n').unwrap_or_default();
        let mut subfields = vec![Subfield::new(
            'u',
            format!(
                "https://{}/record/{}/files/{}",
                self.file_host,
                mirror_id,
                mirror_file_name(name)
            ),
        )];
        if let Some(size) = fft.get_value('a').and_then(|url| sizes.get(url)) {
            subfields.push(Subfield::new('s', size.to_string()));
        }
        if let Some(description) = fft.get_value('d') {
            subfields.push(Subfield::new('y', description));
        }
        Field::data("856", '4', '2', subfields)
    }

    fn replace(&self, state: &mut State, key: (RecordType, RecordId), payload: Vec<Field>) {
        let mirror_id = match state
            .records
            .get(&key)
            .and_then(|fields| fields.iter().find(|f| f.tag == "001"))
            .and_then(Field::control_value)
        {
            Some(existing) => existing.to_string(),
            None => {
                state.next_id += 1;
                state.next_id.to_string()
            }
        };

        let mut fields = vec![
            Field::control("001", mirror_id.as_str()),
            Field::control("005", self.marker()),
        ];
        for field in payload {
            match field.tag.as_str() {
                "001" | "005" => {}
                "FFT" => fields.push(self.hosted_link(&mirror_id, &field, &state.file_sizes)),
                _ => fields.push(field),
            }
        }
        state.records.insert(key, fields);
    }

    fn correct(&self, state: &mut State, key: (RecordType, RecordId), payload: Vec<Field>) -> bool {
        let marker = self.marker();
        let Some(fields) = state.records.get_mut(&key) else {
            return false;
        };

        let tags: Vec<&str> = payload
            .iter()
            .filter(|f| !f.is_control())
            .map(|f| f.tag.as_str())
            .collect();
        fields.retain(|f| !tags.contains(&f.tag.as_str()));

        for field in payload.iter().filter(|f| !f.is_control()) {
            let blank = field
                .subfields()
                .iter()
                .all(|s| s.value.as_deref().map_or(true, str::is_empty));
            if !blank {
                fields.push(field.clone());
            }
        }

        match fields.iter_mut().find(|f| f.tag == "005") {
            Some(existing) => *existing = Field::control("005", marker),
            None => fields.push(Field::control("005", marker)),
        }
        true
    }
}

fn bad_request(message: impl Into<String>) -> SubmitResponse {
    SubmitResponse {
        status: 400,
        body: message.into(),
    }
}

#[async_trait]
impl MirrorClient for InMemoryMirror {
    async fn search(&self, record_type: RecordType, query: &str) -> MirrorResult<String> {
        let mut state = self.state();
        if let Some(error) = state.search_failures.pop_front() {
            return Err(error);
        }

        let pattern = Regex::new(r"\((DHLAUTH|DHL)\)(\d+)")
            .map_err(|e| MirrorError::InvalidResponse(e.to_string()))?;
        let prefix = record_type.control_prefix();

        let mut ids: Vec<RecordId> = pattern
            .captures_iter(query)
            .filter(|c| format!("({})", &c[1]) == prefix)
            .filter_map(|c| c[2].parse::<RecordId>().ok())
            .collect();
        ids.sort();
        ids.dedup();

        let found: Vec<&[Field]> = ids
            .iter()
            .filter_map(|id| state.records.get(&(record_type, *id)))
            .map(Vec::as_slice)
            .collect();

        to_marcxml_collection(found, RecordType::Auth.control_prefix())
            .map_err(|e| MirrorError::InvalidResponse(e.to_string()))
    }

    async fn submit(&self, request: &SubmissionRequest) -> MirrorResult<SubmitResponse> {
        let mut state = self.state();

        let nonce: Nonce = match serde_json::from_str(&request.nonce) {
            Ok(nonce) => nonce,
            Err(e) => return Ok(bad_request(format!("invalid nonce: {e}"))),
        };
        state.submissions.push(ReceivedSubmission {
            mode: request.mode,
            nonce: nonce.clone(),
            xml: request.xml.clone(),
        });

        if let Some((status, body)) = state.reject.clone() {
            return Ok(SubmitResponse { status, body });
        }

        let payload = match MirrorRecordReader::new(&request.xml).next() {
            Some(Ok(record)) => record.fields,
            Some(Err(e)) => return Ok(bad_request(format!("invalid MARCXML: {e}"))),
            None => return Ok(bad_request("empty payload")),
        };

        if state.apply {
            let key = (nonce.record_type, nonce.id);
            match request.mode {
                SubmitMode::InsertOrReplace => self.replace(&mut state, key, payload),
                SubmitMode::Correct => {
                    if !self.correct(&mut state, key, payload) {
                        return Ok(SubmitResponse {
                            status: 404,
                            body: format!("record {} not found", nonce.id),
                        });
                    }
                }
            }
        }

        Ok(SubmitResponse {
            status: 200,
            body: format!("{{\"status\": \"queued\", \"id\": {}}}", nonce.id),
        })
    }
}
