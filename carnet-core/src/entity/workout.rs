use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyPart {
    UpperBody,
    LowerBody,
    FullBody,
}

impl BodyPart {
    pub fn as_str(&self) -> &'static str {
        match self {
            BodyPart::UpperBody => "Upper Body",
            BodyPart::LowerBody => "Lower Body",
            BodyPart::FullBody => "Full Body",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "upper body" => Some(BodyPart::UpperBody),
            "lower body" => Some(BodyPart::LowerBody),
            "full body" => Some(BodyPart::FullBody),
            _ => None,
        }
    }
}

impl fmt::Display for BodyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One performed set. Equality and hashing use (exercise, date, num); the
/// ordering is by `num` first so that sets of one exercise sort by position.
#[derive(Debug, Clone)]
pub struct WorkoutSet {
    pub id: String,
    pub workout_id: Option<String>,
    pub exercise_id: Option<String>,
    pub num: u32,
    pub reps: u32,
    pub weight: f64,
    pub date: Option<DateTime<Utc>>,
}

impl WorkoutSet {
    pub fn volume(&self) -> f64 {
        self.reps as f64 * self.weight
    }

    fn key(&self) -> (u32, Option<&str>, Option<&DateTime<Utc>>) {
        (self.num, self.exercise_id.as_deref(), self.date.as_ref())
    }
}

impl PartialEq for WorkoutSet {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for WorkoutSet {}

impl PartialOrd for WorkoutSet {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WorkoutSet {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl Hash for WorkoutSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for WorkoutSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Set {}: {} reps x {:.1}kg", self.num, self.reps, self.weight)
    }
}

/// One training session.
///
/// `content` maps an exercise name to that exercise's sets in ascending `num`
/// order. It is derived from each set's `exercise_id`; the sets themselves
/// are the authoritative relation.
#[derive(Debug, Clone, PartialEq)]
pub struct Workout {
    pub id: String,
    pub name: Option<String>,
    pub body_part: Option<BodyPart>,
    pub date: Option<DateTime<Utc>>,
    pub duration: Duration,
    pub content: BTreeMap<String, Vec<WorkoutSet>>,
}

impl Workout {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            body_part: None,
            date: None,
            duration: Duration::zero(),
            content: BTreeMap::new(),
        }
    }

    /// Replaces `content` with `sets` grouped by exercise name.
    ///
    /// `names` maps exercise id to display name; a set whose exercise is not
    /// in `names` is grouped under its raw exercise id.
    pub fn with_sets(mut self, sets: Vec<WorkoutSet>, names: &HashMap<String, String>) -> Self {
        self.content = group_sets(sets, names);
        self
    }

    pub fn sets(&self) -> impl Iterator<Item = &WorkoutSet> {
        self.content.values().flatten()
    }

    pub fn set_count(&self) -> usize {
        self.content.values().map(Vec::len).sum()
    }

    pub fn volume(&self) -> f64 {
        self.sets().map(WorkoutSet::volume).sum()
    }

    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("Workout {}", self.id))
    }
}

impl fmt::Display for Workout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let date = self
            .date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "undated".to_string());
        write!(f, "{} - {}", self.display_name(), date)
    }
}

const UNKNOWN_EXERCISE: &str = "unknown";

fn group_sets(
    sets: Vec<WorkoutSet>,
    names: &HashMap<String, String>,
) -> BTreeMap<String, Vec<WorkoutSet>> {
    let mut content: BTreeMap<String, Vec<WorkoutSet>> = BTreeMap::new();
    for set in sets {
        let key = match set.exercise_id.as_deref() {
            Some(id) => names.get(id).cloned().unwrap_or_else(|| id.to_string()),
            None => UNKNOWN_EXERCISE.to_string(),
        };
        content.entry(key).or_default().push(set);
    }
    for group in content.values_mut() {
        group.sort_by_key(|s| s.num);
    }
    content
}
