use crate::base::neterror::NetError;
use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use std::str::FromStr;

/// A header list that strictly preserves insertion order and keeps
/// duplicate names as separate entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedHeaderMap {
    headers: Vec<(HeaderName, HeaderValue)>,
}

fn parse(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), NetError> {
    let name = HeaderName::from_str(name).map_err(|_| NetError::InvalidHeader)?;
    let value = HeaderValue::from_str(value).map_err(|_| NetError::InvalidHeader)?;
    Ok((name, value))
}

impl OrderedHeaderMap {
    pub fn new() -> Self {
        Self { headers: Vec::new() }
    }

    /// Add an entry, keeping any existing entries with the same name.
    pub fn append(&mut self, name: &str, value: &str) -> Result<(), NetError> {
        let entry = parse(name, value)?;
        self.headers.push(entry);
        Ok(())
    }

    /// Replace every entry named `name` with a single one.
    ///
    /// The replacement takes the position of the first existing entry, or is
    /// appended when the name is new.
    pub fn insert(&mut self, name: &str, value: &str) -> Result<(), NetError> {
        let (name, value) = parse(name, value)?;
        match self.headers.iter().position(|(n, _)| *n == name) {
            Some(first) => {
                self.headers[first].1 = value;
                let mut index = 0;
                self.headers.retain(|(n, _)| {
                    let keep = index <= first || *n != name;
                    index += 1;
                    keep
                });
            }
            None => self.headers.push((name, value)),
        }
        Ok(())
    }

    /// Remove every entry named `name`.
    pub fn remove(&mut self, name: &str) {
        if let Ok(target) = HeaderName::from_str(name) {
            self.headers.retain(|(n, _)| *n != target);
        }
    }

    /// First value for `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        let target = HeaderName::from_str(name).ok()?;
        self.headers.iter().find(|(n, _)| *n == target).map(|(_, v)| v)
    }

    /// All values for `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a HeaderValue> + 'a {
        let target = HeaderName::from_str(name).ok();
        self.headers
            .iter()
            .filter(move |(n, _)| target.as_ref() == Some(n))
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.headers.iter().map(|(n, v)| (n, v))
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Build a standard `http::HeaderMap`, appending duplicates.
    pub fn to_header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            map.append(name.clone(), value.clone());
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_keeps_duplicates() {
        let mut headers = OrderedHeaderMap::new();
        headers.append("Accept", "text/html").unwrap();
        headers.append("accept", "application/json").unwrap();

        let values: Vec<_> = headers.get_all("ACCEPT").map(|v| v.to_str().unwrap()).collect();
        assert_eq!(values, vec!["text/html", "application/json"]);
        assert_eq!(headers.to_header_map().get_all("accept").iter().count(), 2);
    }

    #[test]
    fn test_insert_replaces_all_in_place() {
        let mut headers = OrderedHeaderMap::new();
        headers.append("Host", "a").unwrap();
        headers.append("X-Dup", "1").unwrap();
        headers.append("User-Agent", "ua").unwrap();
        headers.append("X-Dup", "2").unwrap();

        headers.insert("x-dup", "3").unwrap();

        let names: Vec<_> = headers.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["host", "x-dup", "user-agent"]);
        assert_eq!(headers.get("X-Dup").unwrap(), "3");
    }

    #[test]
    fn test_remove_header() {
        let mut headers = OrderedHeaderMap::new();
        headers.append("X-Custom", "value").unwrap();
        headers.append("X-Custom", "other").unwrap();
        headers.remove("x-custom");
        assert!(headers.get("X-Custom").is_none());
        assert!(headers.is_empty());
    }

    #[test]
    fn test_preserves_insertion_order() {
        let mut headers = OrderedHeaderMap::new();
        headers.insert("Host", "example.com").unwrap();
        headers.insert("Accept", "text/html").unwrap();
        headers.insert("User-Agent", "test").unwrap();

        let names: Vec<_> = headers.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["host", "accept", "user-agent"]);
    }

    #[test]
    fn test_invalid_header() {
        let mut headers = OrderedHeaderMap::new();
        assert_eq!(headers.append("Bad Name", "v"), Err(NetError::InvalidHeader));
        assert_eq!(headers.append("X-Ok", "bad\nvalue"), Err(NetError::InvalidHeader));
    }
}
