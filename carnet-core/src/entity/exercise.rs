use std::fmt;
use std::hash::{Hash, Hasher};

/// A body region an exercise targets. Identity is the remote id.
#[derive(Debug, Clone)]
pub struct MuscleGroup {
    pub id: String,
    pub name: Option<String>,
    /// Free-form: "Upper Body", "Lower Body", "Full Body" or anything the
    /// catalog author typed.
    pub body_part: Option<String>,
}

impl MuscleGroup {
    pub fn new(id: impl Into<String>, name: Option<String>, body_part: Option<String>) -> Self {
        Self {
            id: id.into(),
            name,
            body_part,
        }
    }
}

impl PartialEq for MuscleGroup {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MuscleGroup {}

impl Hash for MuscleGroup {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for MuscleGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name.as_deref().unwrap_or(&self.id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    /// Case-insensitive; `None` for anything outside the three levels.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }
}

/// A named movement from the catalog. Identity is the remote id.
#[derive(Debug, Clone)]
pub struct Exercise {
    pub id: String,
    pub name: Option<String>,
    /// Ordered as listed on the remote page.
    pub muscle_groups: Vec<MuscleGroup>,
    pub difficulty: Option<Difficulty>,
}

impl Exercise {
    pub fn new(id: impl Into<String>, name: Option<String>) -> Self {
        Self {
            id: id.into(),
            name,
            muscle_groups: Vec::new(),
            difficulty: None,
        }
    }

    /// The name used to group sets; falls back to the id for unnamed entries.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn primary_body_part(&self) -> Option<&str> {
        self.muscle_groups
            .first()
            .and_then(|group| group.body_part.as_deref())
    }
}

impl PartialEq for Exercise {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Exercise {}

impl Hash for Exercise {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Exercise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn identity_is_the_remote_id() {
        let a = MuscleGroup::new("mg1", Some("Pecs".into()), Some("Upper Body".into()));
        let b = MuscleGroup::new("mg1", Some("Chest".into()), None);
        assert_eq!(a, b);

        let mut seen = HashSet::new();
        seen.insert(Exercise::new("e1", Some("Bench".into())));
        assert!(!seen.insert(Exercise::new("e1", Some("Bench Press".into()))));
        assert!(seen.insert(Exercise::new("e2", Some("Bench".into()))));
    }

    #[test]
    fn difficulty_parses_any_case() {
        assert_eq!(Difficulty::parse("Hard"), Some(Difficulty::Hard));
        assert_eq!(Difficulty::parse(" easy "), Some(Difficulty::Easy));
        assert_eq!(Difficulty::parse("brutal"), None);
        assert_eq!(Difficulty::Medium.as_str(), "medium");
    }

    #[test]
    fn display_name_falls_back_to_id() {
        let unnamed = Exercise::new("e9", None);
        assert_eq!(unnamed.display_name(), "e9");
        assert_eq!(unnamed.primary_body_part(), None);
    }
}
