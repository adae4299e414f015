use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// One scheduled item on a day's itinerary. Optional fields are omitted from
/// the stored document when unset, never written as nulls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_day: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Activity {
    pub fn from_form(form: ActivityForm, created_by: impl Into<String>) -> Self {
        let now = Utc::now();
        let mut activity = Self {
            id: Uuid::new_v4().to_string(),
            title: form.title,
            all_day: form.all_day,
            time: form.time,
            description: form.description,
            lat: form.lat,
            lng: form.lng,
            map_link: form.map_link,
            tags: form.tags,
            created_by: created_by.into(),
            created_at: now,
            updated_at: now,
        };
        activity.reconcile_all_day();
        activity
    }

    /// Applies a partial update. A field that is absent from the patch is
    /// left untouched; a field that is explicitly null is removed.
    pub fn apply_patch(&mut self, patch: ActivityPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(all_day) = patch.all_day {
            self.all_day = all_day;
        }
        if let Some(time) = patch.time {
            self.time = time;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(lat) = patch.lat {
            self.lat = lat;
        }
        if let Some(lng) = patch.lng {
            self.lng = lng;
        }
        if let Some(map_link) = patch.map_link {
            self.map_link = map_link;
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
        self.reconcile_all_day();
        self.updated_at = Utc::now();
    }

    // An all-day activity never carries a time of day.
    fn reconcile_all_day(&mut self) {
        if self.all_day == Some(true) {
            self.time = None;
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityForm {
    pub title: String,
    #[serde(default)]
    pub all_day: Option<bool>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub map_link: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// Partial activity update. The outer `Option` distinguishes "field omitted"
/// from "field present"; the inner one carries an explicit null that unsets
/// the stored value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, with = "serde_with::rust::double_option")]
    pub all_day: Option<Option<bool>>,
    #[serde(default, with = "serde_with::rust::double_option")]
    pub time: Option<Option<String>>,
    #[serde(default, with = "serde_with::rust::double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, with = "serde_with::rust::double_option")]
    pub lat: Option<Option<f64>>,
    #[serde(default, with = "serde_with::rust::double_option")]
    pub lng: Option<Option<f64>>,
    #[serde(default, with = "serde_with::rust::double_option")]
    pub map_link: Option<Option<String>>,
    #[serde(default, with = "serde_with::rust::double_option")]
    pub tags: Option<Option<Vec<String>>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DayReview {
    pub rating: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<String>,
    pub reviewed_by: String,
    pub reviewed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Day {
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_review: Option<DayReview>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

impl Day {
    pub fn activity_mut(&mut self, activity_id: &str) -> Option<&mut Activity> {
        self.activities.iter_mut().find(|a| a.id == activity_id)
    }
}

/// Days keyed by ISO calendar date; `NaiveDate` serializes to `YYYY-MM-DD`.
pub type DaysMap = BTreeMap<NaiveDate, Day>;
