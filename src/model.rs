use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::db::Record;
use crate::util::{escape_markup, name_key};

pub type PlaceId = String;

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

pub const NAME_FIELD: &str = "name";
pub const VOTES_FIELD: &str = "votes";
pub const CREATED_AT_FIELD: &str = "createdAt";
pub const LAST_VOTED_FIELD: &str = "lastVoted";

const UNKNOWN_PLACE: &str = "Unknown Place";

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Place {
    pub id: PlaceId,
    pub name: String,
    pub vote_count: u64,
    pub created_at: Timestamp,
    pub last_voted_at: Option<Timestamp>,
}

impl Place {
    /// Builds a place out of an untrusted store record.
    ///
    /// Anything that is not a JSON object is rejected. Missing or mistyped
    /// fields fall back to their defaults: `votes` and `createdAt` to 0,
    /// `lastVoted` to absent and `name` to a placeholder.
    pub fn from_record(id: &str, value: &Value) -> Option<Place> {
        let record = value.as_object()?;

        let name = record
            .get(NAME_FIELD)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(UNKNOWN_PLACE)
            .to_owned();

        let vote_count = record.get(VOTES_FIELD).map(coerce_count).unwrap_or(0);
        let created_at = record
            .get(CREATED_AT_FIELD)
            .and_then(coerce_timestamp)
            .unwrap_or(0);
        let last_voted_at = record.get(LAST_VOTED_FIELD).and_then(coerce_timestamp);

        Some(Place {
            id: id.to_owned(),
            name,
            vote_count,
            created_at,
            last_voted_at,
        })
    }

    /// The record written when a place is first created.
    pub fn new_record(name: &str, created_at: Timestamp) -> Record {
        let mut record = Map::new();
        record.insert(NAME_FIELD.to_owned(), Value::from(name));
        record.insert(VOTES_FIELD.to_owned(), Value::from(0u64));
        record.insert(CREATED_AT_FIELD.to_owned(), Value::from(created_at));
        record
    }

    /// Partial update carrying a new vote total. `lastVoted` is removed when
    /// the total drops to zero.
    pub fn vote_update(vote_count: u64, now: Timestamp) -> Record {
        let mut fields = Map::new();
        fields.insert(VOTES_FIELD.to_owned(), Value::from(vote_count));
        let last_voted = if vote_count > 0 { Value::from(now) } else { Value::Null };
        fields.insert(LAST_VOTED_FIELD.to_owned(), last_voted);
        fields
    }
}

fn coerce_count(value: &Value) -> u64 {
    if let Some(n) = value.as_u64() {
        return n;
    }
    match value.as_f64() {
        Some(f) if f.is_finite() && f > 0.0 => f.trunc() as u64,
        _ => 0,
    }
}

fn coerce_timestamp(value: &Value) -> Option<Timestamp> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    value
        .as_f64()
        .filter(|f| f.is_finite())
        .map(|f| f.trunc() as Timestamp)
}

/// The full set of places as last pushed by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollSnapshot {
    places: HashMap<PlaceId, Place>,
}

impl PollSnapshot {
    /// Coerces a raw collection payload. `None` and `null` mean an empty
    /// collection; entries that are not objects are dropped.
    pub fn from_value(value: Option<&Value>) -> PollSnapshot {
        let entries = match value {
            None | Some(Value::Null) => return PollSnapshot::default(),
            Some(Value::Object(entries)) => entries,
            Some(other) => {
                warn!("Ignoring collection payload that is not an object: {}", other);
                return PollSnapshot::default();
            }
        };

        let mut places = HashMap::with_capacity(entries.len());
        for (id, value) in entries {
            match Place::from_record(id, value) {
                Some(place) => {
                    places.insert(id.clone(), place);
                }
                None => warn!("Dropping malformed place record id={}", id),
            }
        }
        PollSnapshot { places }
    }

    pub fn get(&self, id: &str) -> Option<&Place> {
        self.places.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.places.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }

    pub fn places(&self) -> impl Iterator<Item = &Place> {
        self.places.values()
    }

    /// Whether a place with this name already exists, ignoring case and
    /// surrounding whitespace. Stored names are escaped, so both the raw and
    /// the escaped spelling are checked.
    pub fn has_name(&self, name: &str) -> bool {
        let raw = name_key(name);
        let escaped = name_key(&escape_markup(name.trim()));
        self.places.values().any(|p| {
            let existing = name_key(&p.name);
            existing == raw || existing == escaped
        })
    }
}

impl From<Vec<Place>> for PollSnapshot {
    fn from(places: Vec<Place>) -> Self {
        PollSnapshot {
            places: places.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteKind {
    FirstVote,
    ChangedVote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteOutcome {
    pub kind: VoteKind,
    pub place_id: PlaceId,
    pub place_name: String,
}

/// What the vote control next to a place should offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteButton {
    /// The client's current vote.
    Voted,
    /// The client voted elsewhere; pressing moves the vote here.
    ChangeVote,
    Vote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteButtonState {
    pub button: VoteButton,
    pub in_progress: bool,
}

impl VoteButtonState {
    pub fn enabled(&self) -> bool {
        !self.in_progress && self.button != VoteButton::Voted
    }
}
