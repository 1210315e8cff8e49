//! Remote page -> entity constructors.
//!
//! Structural fields (names, relations, dates) degrade to `None` when their
//! property is missing. The numeric fields of a set are required and fail
//! the record with [`ParseError::Malformed`].

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use log::warn;
use std::collections::BTreeMap;
use thiserror::Error;

use super::client::Page;
use super::properties::PropertyBag;
use crate::entity::{
    BodyPart, Difficulty, Exercise, MuscleGroup, Workout, WorkoutSet, truncate_to_seconds,
};

pub const NAME: &str = "Name.title.0.plain_text";
pub const BODY_PART: &str = "Body Part.select.name";
pub const DIFFICULTY: &str = "Difficulty.select.name";
pub const MUSCLE_GROUPS: &str = "Muscle Group.relation";
pub const DATE_START: &str = "Date.date.start";
pub const DATE_END: &str = "Date.date.end";
pub const SET_NUM: &str = "Sets.title.0.plain_text";
pub const REPS: &str = "Reps.number";
pub const WEIGHT: &str = "Poids.number";
pub const SET_EXERCISE: &str = "Exercise.relation.0.id";
pub const SET_WORKOUT: &str = "Weekly Split Schedule.relation.0.id";
pub const WORKOUT_SETS: &str = "Workout Exercises.relation";

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed record {page_id}: {path} {reason}")]
    Malformed {
        page_id: String,
        path: String,
        reason: String,
    },
}

impl ParseError {
    pub fn page_id(&self) -> &str {
        match self {
            ParseError::Malformed { page_id, .. } => page_id,
        }
    }
}

/// Accepts RFC 3339 timestamps, naive date-times (taken as UTC) and bare
/// dates (midnight UTC). Sub-second precision is dropped.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Some(truncate_to_seconds(date.with_timezone(&Utc)));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(truncate_to_seconds(naive.and_utc()));
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn date_at(bag: &PropertyBag<'_>, path: &str) -> Option<DateTime<Utc>> {
    let raw = bag.str(path)?;
    let parsed = parse_datetime(raw);
    if parsed.is_none() {
        warn!("page {}: unreadable date '{}' at {}", bag.page_id(), raw, path);
    }
    parsed
}

fn text_at(bag: &PropertyBag<'_>, path: &str) -> Option<String> {
    bag.str(path)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl MuscleGroup {
    pub fn from_remote_payload(page: &Page) -> Self {
        let bag = PropertyBag::new(page);
        MuscleGroup {
            id: page.id.clone(),
            name: text_at(&bag, NAME),
            body_part: text_at(&bag, BODY_PART),
        }
    }
}

/// Ids of the muscle groups an exercise page links to, in relation order.
pub fn muscle_group_ids(page: &Page) -> Vec<String> {
    PropertyBag::new(page).relation_ids(MUSCLE_GROUPS)
}

impl Exercise {
    /// `muscle_groups` are the already-resolved pages named by
    /// [`muscle_group_ids`].
    pub fn from_remote_payload(page: &Page, muscle_groups: Vec<MuscleGroup>) -> Self {
        let bag = PropertyBag::new(page);
        let difficulty = bag.str(DIFFICULTY).and_then(|raw| {
            let parsed = Difficulty::parse(raw);
            if parsed.is_none() {
                warn!("exercise {}: unknown difficulty '{}'", page.id, raw);
            }
            parsed
        });
        Exercise {
            id: page.id.clone(),
            name: text_at(&bag, NAME),
            muscle_groups,
            difficulty,
        }
    }
}

fn whole_number(bag: &PropertyBag<'_>, path: &str, min: f64) -> Result<u32, ParseError> {
    let value = bag.require_number(path)?;
    let rounded = value.round();
    if rounded < min || rounded > u32::MAX as f64 {
        return Err(bag.malformed(path, &format!("out of range: {}", value)));
    }
    Ok(rounded as u32)
}

impl WorkoutSet {
    pub fn from_remote_payload(page: &Page) -> Result<Self, ParseError> {
        let bag = PropertyBag::new(page);
        let num = whole_number(&bag, SET_NUM, 1.0)?;
        let reps = whole_number(&bag, REPS, 1.0)?;
        let weight = bag.require_number(WEIGHT)?;
        if weight < 0.0 {
            return Err(bag.malformed(WEIGHT, &format!("negative weight {}", weight)));
        }

        Ok(WorkoutSet {
            id: page.id.clone(),
            workout_id: text_at(&bag, SET_WORKOUT),
            exercise_id: text_at(&bag, SET_EXERCISE),
            num,
            reps,
            weight,
            date: date_at(&bag, DATE_START),
        })
    }
}

/// Ids of the set pages a workout page links to.
pub fn workout_set_ids(page: &Page) -> Vec<String> {
    PropertyBag::new(page).relation_ids(WORKOUT_SETS)
}

impl Workout {
    /// Builds the workout header with empty `content`; its sets are resolved
    /// separately from [`workout_set_ids`].
    pub fn from_remote_payload(page: &Page) -> Self {
        let bag = PropertyBag::new(page);
        let start = date_at(&bag, DATE_START);
        let end = date_at(&bag, DATE_END);

        let duration = match (start, end) {
            (Some(start), Some(end)) if end >= start => end - start,
            (Some(_), Some(_)) => {
                warn!("workout {}: date range ends before it starts", page.id);
                Duration::zero()
            }
            _ => Duration::zero(),
        };

        let body_part = bag.str(BODY_PART).and_then(|raw| {
            let parsed = BodyPart::parse(raw);
            if parsed.is_none() {
                warn!("workout {}: unknown body part '{}'", page.id, raw);
            }
            parsed
        });

        Workout {
            id: page.id.clone(),
            name: text_at(&bag, NAME),
            body_part,
            date: start,
            duration,
            content: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn set_page(props: serde_json::Value) -> Page {
        Page::new("s1", props)
    }

    #[test]
    fn set_page_yields_expected_values() {
        let page = set_page(json!({
            "Sets": { "title": [{ "plain_text": "3" }] },
            "Reps": { "number": 40 },
            "Poids": { "number": 82.5 },
            "Exercise": { "relation": [{ "id": "e1" }] },
            "Date": { "date": { "start": "2024-01-10" } }
        }));
        let set = WorkoutSet::from_remote_payload(&page).unwrap();
        assert_eq!(set.id, "s1");
        assert_eq!(set.num, 3);
        assert_eq!(set.reps, 40);
        assert_eq!(set.weight, 82.5);
        assert_eq!(set.exercise_id.as_deref(), Some("e1"));
        assert_eq!(set.workout_id, None);
        assert_eq!(set.date, Some(Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap()));
    }

    #[test]
    fn missing_numbers_make_the_set_malformed() {
        let page = set_page(json!({
            "Sets": { "title": [{ "plain_text": "1" }] },
            "Poids": { "number": 20 }
        }));
        match WorkoutSet::from_remote_payload(&page).unwrap_err() {
            ParseError::Malformed { page_id, path, .. } => {
                assert_eq!(page_id, "s1");
                assert_eq!(path, REPS);
            }
        }

        let negative = set_page(json!({
            "Sets": { "title": [{ "plain_text": "1" }] },
            "Reps": { "number": 5 },
            "Poids": { "number": -2.5 }
        }));
        assert!(WorkoutSet::from_remote_payload(&negative).is_err());
    }

    #[test]
    fn workout_without_end_has_zero_duration() {
        let page = Page::new(
            "w1",
            json!({
                "Name": { "title": [{ "plain_text": "Upper A" }] },
                "Body Part": { "select": { "name": "Upper Body" } },
                "Date": { "date": { "start": "2024-01-10T18:00:00.000+00:00", "end": null } },
                "Workout Exercises": { "relation": [{ "id": "s1" }, { "id": "s2" }] }
            }),
        );
        let workout = Workout::from_remote_payload(&page);
        assert_eq!(workout.duration, Duration::zero());
        assert_eq!(workout.body_part, Some(BodyPart::UpperBody));
        assert_eq!(workout.name.as_deref(), Some("Upper A"));
        assert!(workout.content.is_empty());
        assert_eq!(workout_set_ids(&page), vec!["s1", "s2"]);
    }

    #[test]
    fn workout_duration_spans_the_date_range() {
        let page = Page::new(
            "w1",
            json!({
                "Date": { "date": {
                    "start": "2024-01-10T18:00:00+01:00",
                    "end": "2024-01-10T19:05:30+01:00"
                } }
            }),
        );
        let workout = Workout::from_remote_payload(&page);
        assert_eq!(workout.duration, Duration::seconds(65 * 60 + 30));
        assert_eq!(workout.date, Some(Utc.with_ymd_and_hms(2024, 1, 10, 17, 0, 0).unwrap()));
        assert_eq!(workout.body_part, None);
    }

    #[test]
    fn exercise_degrades_to_nulls() {
        let page = Page::new(
            "e1",
            json!({
                "Difficulty": { "select": { "name": "Brutal" } },
                "Muscle Group": { "relation": [{ "id": "mg1" }] }
            }),
        );
        let exercise = Exercise::from_remote_payload(&page, vec![]);
        assert_eq!(exercise.name, None);
        assert_eq!(exercise.difficulty, None);
        assert_eq!(muscle_group_ids(&page), vec!["mg1"]);
    }

    #[test]
    fn dates_in_every_accepted_shape() {
        let midnight = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        assert_eq!(parse_datetime("2024-01-10"), Some(midnight));
        assert_eq!(parse_datetime("2024-01-10T00:00:00.250Z"), Some(midnight));
        assert_eq!(parse_datetime("2024-01-10T00:00:00"), Some(midnight));
        assert_eq!(parse_datetime("10/01/2024"), None);
    }
}
