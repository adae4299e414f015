use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::models::itinerary::{Day, DaysMap};

pub const GUEST_ID_PREFIX: &str = "guest_";

/// Storage origin of a trip, decided once from the id convention and threaded
/// through every façade call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TripRef {
    Guest(String),
    Remote(String),
}

impl TripRef {
    pub fn parse(id: &str) -> Self {
        if id.starts_with(GUEST_ID_PREFIX) {
            TripRef::Guest(id.to_string())
        } else {
            TripRef::Remote(id.to_string())
        }
    }

    pub fn new_guest() -> Self {
        TripRef::Guest(format!("{GUEST_ID_PREFIX}{}", Uuid::new_v4()))
    }

    pub fn id(&self) -> &str {
        match self {
            TripRef::Guest(id) | TripRef::Remote(id) => id,
        }
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, TripRef::Guest(_))
    }
}

impl fmt::Display for TripRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Trip-level link note, independent of any day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub title: String,
    pub link: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub participants: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invited_emails: Option<Vec<String>>,
    pub days: DaysMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<Vec<Note>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trip {
    pub fn new(id: String, owner_id: impl Into<String>, form: TripForm) -> Self {
        let owner_id = owner_id.into();
        let now = Utc::now();
        Self {
            id,
            owner_id: owner_id.clone(),
            title: form.title,
            start_date: form.start_date,
            end_date: form.end_date,
            participants: vec![owner_id],
            invited_emails: Some(Vec::new()),
            days: days_for_range(form.start_date, form.end_date),
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Day entry for `date`, created empty on first touch. Entries missing
    /// from the stored map read as empty days.
    pub fn day_mut(&mut self, date: NaiveDate) -> &mut Day {
        self.days.entry(date).or_default()
    }

    /// Membership union; adding an already-present participant is a no-op.
    pub fn add_participant(&mut self, user_id: &str) {
        if !self.participants.iter().any(|p| p == user_id) {
            self.participants.push(user_id.to_string());
        }
    }

    pub fn add_invited_email(&mut self, email: &str) {
        let emails = self.invited_emails.get_or_insert_with(Vec::new);
        if !emails.iter().any(|e| e == email) {
            emails.push(email.to_string());
        }
    }

    pub fn notes_mut(&mut self) -> &mut Vec<Note> {
        self.notes.get_or_insert_with(Vec::new)
    }
}

/// One empty day per calendar date in the inclusive `[start, end]` range.
pub fn days_for_range(start: NaiveDate, end: NaiveDate) -> DaysMap {
    let mut days = DaysMap::new();
    let mut date = start;
    while date <= end {
        days.insert(date, Day::default());
        let Some(next) = date.checked_add_days(Days::new(1)) else {
            break;
        };
        date = next;
    }
    days
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripForm {
    pub title: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteForm {
    pub title: String,
    pub link: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}
