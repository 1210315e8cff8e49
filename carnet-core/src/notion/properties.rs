use log::warn;
use serde_json::Value;

use super::client::Page;
use super::parse::ParseError;

/// Dotted-path access into a page's property bag, e.g.
/// `Name.title.0.plain_text`. Numeric segments index into arrays.
///
/// A lookup that misses returns `None` and logs the segment where the walk
/// stopped; JSON `null` counts as a miss.
pub struct PropertyBag<'a> {
    page_id: &'a str,
    root: &'a Value,
}

impl<'a> PropertyBag<'a> {
    pub fn new(page: &'a Page) -> Self {
        Self {
            page_id: &page.id,
            root: &page.properties,
        }
    }

    pub fn page_id(&self) -> &'a str {
        self.page_id
    }

    pub fn get(&self, path: &str) -> Option<&'a Value> {
        let mut current = self.root;
        for segment in path.split('.') {
            let next = match current {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            };
            match next {
                Some(value) if !value.is_null() => current = value,
                _ => {
                    warn!(
                        "page {}: property '{}' missing at segment '{}'",
                        self.page_id, path, segment
                    );
                    return None;
                }
            }
        }
        Some(current)
    }

    pub fn str(&self, path: &str) -> Option<&'a str> {
        self.get(path).and_then(Value::as_str)
    }

    pub fn number(&self, path: &str) -> Option<f64> {
        self.get(path).and_then(Value::as_f64)
    }

    /// Ids of a relation property (`<Property>.relation`).
    pub fn relation_ids(&self, path: &str) -> Vec<String> {
        self.get(path)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("id").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn require_number(&self, path: &str) -> Result<f64, ParseError> {
        let value = self.get(path).ok_or_else(|| self.malformed(path, "missing"))?;
        value
            .as_f64()
            .or_else(|| value.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
            .filter(|n| n.is_finite())
            .ok_or_else(|| self.malformed(path, &format!("not a number: {}", value)))
    }

    pub fn malformed(&self, path: &str, reason: &str) -> ParseError {
        ParseError::Malformed {
            page_id: self.page_id.to_string(),
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page() -> Page {
        Page::new(
            "p1",
            json!({
                "Name": { "title": [{ "plain_text": "Bench Press" }] },
                "Reps": { "number": 8 },
                "Sets": { "title": [{ "plain_text": " 3 " }] },
                "Date": { "date": { "start": "2024-01-10", "end": null } },
                "Muscle Group": { "relation": [{ "id": "mg1" }, { "id": "mg2" }] }
            }),
        )
    }

    #[test]
    fn paths_walk_objects_and_arrays() {
        let page = page();
        let bag = PropertyBag::new(&page);
        assert_eq!(bag.str("Name.title.0.plain_text"), Some("Bench Press"));
        assert_eq!(bag.number("Reps.number"), Some(8.0));
        assert_eq!(bag.relation_ids("Muscle Group.relation"), vec!["mg1", "mg2"]);
    }

    #[test]
    fn misses_and_nulls_yield_none() {
        let page = page();
        let bag = PropertyBag::new(&page);
        assert_eq!(bag.get("Name.title.1.plain_text"), None);
        assert_eq!(bag.get("Date.date.end"), None);
        assert_eq!(bag.get("Nope"), None);
        assert!(bag.relation_ids("Exercise.relation").is_empty());
    }

    #[test]
    fn required_numbers_accept_numeric_text() {
        let page = page();
        let bag = PropertyBag::new(&page);
        assert_eq!(bag.require_number("Sets.title.0.plain_text").unwrap(), 3.0);
        let err = bag.require_number("Poids.number").unwrap_err();
        assert!(err.to_string().contains("Poids.number"));
        assert!(bag.require_number("Name.title.0.plain_text").is_err());
    }
}
