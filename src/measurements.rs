//! Insertion-ordered measurement lists attached to cells or reported for a
//! whole analysis.

/// Named numeric measurements preserving insertion order. Re-putting an
/// existing name replaces the value in place without moving it.
#[derive(Debug, Clone, Default)]
pub struct MeasurementList {
    entries: Vec<(String, f64)>,
}

impl MeasurementList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.entries.iter().map(|(n, v)| (n.as_str(), *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_insertion_order() {
        let mut list = MeasurementList::new();
        list.put("b", 2.0);
        list.put("a", 1.0);
        let names: Vec<_> = list.iter().map(|(n, _)| n.to_string()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn put_replaces_in_place() {
        let mut list = MeasurementList::new();
        list.put("a", 1.0);
        list.put("b", 2.0);
        list.put("a", 9.0);
        assert_eq!(list.get("a"), Some(9.0));
        assert_eq!(list.len(), 2);
        let names: Vec<_> = list.iter().map(|(n, _)| n.to_string()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
