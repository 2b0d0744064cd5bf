use crate::models::SpeakerRecord;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading the speaker roster
#[derive(Debug, Error)]
pub enum RosterError {
    #[error("Failed to read roster file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse roster JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid roster: {0}")]
    Invalid(String),
}

/// Speaker entry as written by the agenda scraper
#[derive(Debug, Deserialize)]
struct RawSpeaker {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    organization: Option<String>,
    #[serde(default)]
    bio: Option<String>,
}

impl RawSpeaker {
    fn into_record(self, id: String) -> SpeakerRecord {
        SpeakerRecord {
            id,
            name: self.name.unwrap_or_default(),
            title: self.title.unwrap_or_default(),
            organization: self.organization.unwrap_or_default(),
            bio: self.bio.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawRoster {
    List(Vec<RawSpeaker>),
    Map(BTreeMap<String, RawSpeaker>),
}

/// Ordered, read-only set of speakers for one conference
///
/// Loaded once at startup and shared across requests behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    speakers: Vec<SpeakerRecord>,
}

impl Roster {
    /// Build a roster from records, rejecting empty or duplicate ids
    pub fn new(speakers: Vec<SpeakerRecord>) -> Result<Self, RosterError> {
        let mut seen = HashSet::with_capacity(speakers.len());
        for speaker in &speakers {
            if speaker.id.trim().is_empty() {
                return Err(RosterError::Invalid(format!(
                    "speaker '{}' has an empty id",
                    speaker.name
                )));
            }
            if !seen.insert(speaker.id.as_str()) {
                return Err(RosterError::Invalid(format!("duplicate speaker id '{}'", speaker.id)));
            }
        }
        Ok(Self { speakers })
    }

    /// Parse the scraper's JSON output
    ///
    /// Accepts either an array of speakers (ids default to `speaker-<n>`) or
    /// an object keyed by speaker id, which is ordered by id. A generated id
    /// never reuses one written in the file.
    pub fn from_json(json: &str) -> Result<Self, RosterError> {
        let speakers = match serde_json::from_str::<RawRoster>(json)? {
            RawRoster::List(list) => {
                let mut taken: HashSet<String> = list
                    .iter()
                    .filter_map(|raw| explicit_id(raw).map(str::to_string))
                    .collect();

                list.into_iter()
                    .enumerate()
                    .map(|(idx, raw)| {
                        let id = match explicit_id(&raw) {
                            Some(id) => id.to_string(),
                            None => generate_id(idx + 1, &mut taken),
                        };
                        raw.into_record(id)
                    })
                    .collect()
            }
            RawRoster::Map(map) => map
                .into_iter()
                .map(|(id, raw)| raw.into_record(id))
                .collect(),
        };
        Self::new(speakers)
    }

    /// Load the roster from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RosterError> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let roster = Self::from_json(&json)?;
        tracing::debug!("Loaded {} speakers from {}", roster.len(), path.as_ref().display());
        Ok(roster)
    }

    pub fn speakers(&self) -> &[SpeakerRecord] {
        &self.speakers
    }

    pub fn len(&self) -> usize {
        self.speakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.speakers.is_empty()
    }
}

fn explicit_id(raw: &RawSpeaker) -> Option<&str> {
    raw.id.as_deref().filter(|id| !id.trim().is_empty())
}

/// `speaker-<n>`, suffixed with `-2`, `-3`, ... while that id is taken
fn generate_id(position: usize, taken: &mut HashSet<String>) -> String {
    let base = format!("speaker-{}", position);
    let mut id = base.clone();
    let mut suffix = 2;
    while taken.contains(&id) {
        id = format!("{}-{}", base, suffix);
        suffix += 1;
    }
    taken.insert(id.clone());
    id
}
