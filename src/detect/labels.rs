use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};

/// Class-index to class-name lookup table.
///
/// Loaded once at startup. Unknown indices resolve to the stringified index.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassNames {
    names: BTreeMap<usize, String>,
}

impl ClassNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table where each name's index is its position in the list.
    pub fn from_list<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names
                .into_iter()
                .map(Into::into)
                .enumerate()
                .collect(),
        }
    }

    /// Load a labels file.
    ///
    /// Accepts one name per line (index = position among non-blank lines), or
    /// explicit `index: name` / `index,name` entries. Blank lines and `#` comments
    /// are skipped.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read labels file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid labels file {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let mut names = BTreeMap::new();
        let mut next_index = 0usize;
        for (line_no, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (index, name) = match split_indexed(line) {
                Some((index, name)) => (index, name),
                None => (next_index, line),
            };
            let name = name.trim().trim_matches(|c| c == '"' || c == '\'');
            if name.is_empty() {
                return Err(anyhow!("line {}: empty class name", line_no + 1));
            }
            if names.insert(index, name.to_string()).is_some() {
                return Err(anyhow!("line {}: duplicate class index {}", line_no + 1, index));
            }
            next_index = index + 1;
        }
        Ok(Self { names })
    }

    /// Resolve a class index, defaulting to the stringified index.
    pub fn name(&self, class_id: usize) -> Cow<'_, str> {
        match self.names.get(&class_id) {
            Some(name) => Cow::Borrowed(name.as_str()),
            None => Cow::Owned(class_id.to_string()),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

fn split_indexed(line: &str) -> Option<(usize, &str)> {
    let sep = line.find([':', ','])?;
    let index = line[..sep].trim().parse().ok()?;
    Some((index, &line[sep + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_list_uses_line_position() {
        let names = ClassNames::parse("helmet\nvest\n\n# comment\nglove\n").unwrap();
        assert_eq!(names.len(), 3);
        assert_eq!(names.name(0), "helmet");
        assert_eq!(names.name(2), "glove");
    }

    #[test]
    fn indexed_entries_are_respected() {
        let names = ClassNames::parse("0: person\n3: 'boots'\n4,vest\n").unwrap();
        assert_eq!(names.name(0), "person");
        assert_eq!(names.name(3), "boots");
        assert_eq!(names.name(4), "vest");
        assert_eq!(names.name(1), "1");
    }

    #[test]
    fn unknown_index_falls_back_to_number() {
        let names = ClassNames::new();
        assert_eq!(names.name(17), "17");
    }

    #[test]
    fn duplicate_index_is_rejected() {
        assert!(ClassNames::parse("0: a\n0: b\n").is_err());
    }
}
