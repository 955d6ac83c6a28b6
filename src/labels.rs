//! The label table: class index to mudra name, as fitted when the
//! classifier was trained.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
    names: Vec<String>,
}

impl LabelTable {
    pub fn new(names: Vec<String>) -> Result<Self> {
        if names.is_empty() {
            bail!("label table is empty");
        }
        Ok(LabelTable { names })
    }

    /// Load a table from disk. `.json` files hold an array of names; anything
    /// else is read as plain text with one name per line. The position of a
    /// name is its class index.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read label table {}", path.display()))?;

        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let names = if is_json {
            serde_json::from_str::<Vec<String>>(&raw)
                .with_context(|| format!("failed to parse label table {}", path.display()))?
        } else {
            raw.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(String::from)
                .collect()
        };

        Self::new(names).with_context(|| format!("invalid label table {}", path.display()))
    }

    pub fn decode(&self, index: usize) -> Result<&str> {
        self.names
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| anyhow!("class index {index} has no label ({} known)", self.len()))
    }

    pub(crate) fn len(&self) -> usize {
        self.names.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn loads_json_array() {
        let f = write_file(".json", r#"["Alapadma", "Anjali", "Pataka"]"#);
        let table = LabelTable::load(f.path()).unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.decode(1).unwrap(), "Anjali");
        assert_eq!(table.decode(2).unwrap(), "Pataka");
    }

    #[test]
    fn loads_text_lines() {
        let f = write_file(".txt", "Alapadma\n\n  Tripataka \nMayura\n");
        let table = LabelTable::load(f.path()).unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.decode(1).unwrap(), "Tripataka");
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let table = LabelTable::new(vec!["Pataka".into()]).unwrap();
        let err = table.decode(4).unwrap_err();
        assert!(err.to_string().contains("class index 4"));
    }

    #[test]
    fn rejects_empty_and_malformed_tables() {
        assert!(LabelTable::new(Vec::new()).is_err());

        let empty = write_file(".txt", "\n\n");
        assert!(LabelTable::load(empty.path()).is_err());

        let broken = write_file(".json", "{not json");
        assert!(LabelTable::load(broken.path()).is_err());

        assert!(LabelTable::load("/definitely/not/here.json").is_err());
    }
}
