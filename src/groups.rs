use anyhow::{bail, Context, Result};
use regex::Regex;

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

#[derive(Debug)]
struct Group {
    name: String,
    regex: Regex,
}

/// Named groups of tags or vendors, each matched by a regular expression.
#[derive(Debug, Default)]
pub struct Groups(Vec<Group>);

impl Groups {
    /// Reads group configuration from `path`.
    ///
    /// The file consists of group specifications, one per line, in the
    /// following format:
    ///
    /// ```txt
    /// GROUP_NAME | GROUP_REGEX
    /// ```
    ///
    /// Blank lines are ignored.
    ///
    /// # Errors
    ///
    /// Returns errors if:
    /// * The file cannot be opened or read
    /// * There is a line with an invalid format (no `|` character)
    /// * `GROUP_REGEX` is an invalid regular expression
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut groups = Self::default();
        let file = BufReader::new(
            File::open(&path).with_context(|| format!("opening {:?}", path.as_ref()))?,
        );
        for line in file.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let Some((name, regex_str)) = line.split_once(" | ") else {
                bail!(
                    "reading {:?}: bad line format (missing |): {line}",
                    path.as_ref(),
                );
            };
            groups.add(name, regex_str)?;
        }
        Ok(groups)
    }

    /// Adds a group named `name`, matching keys that match `regex_str`.
    ///
    /// # Errors
    ///
    /// Returns any errors from compiling `regex_str` with [`Regex::new`].
    pub fn add(&mut self, name: &str, regex_str: &str) -> Result<()> {
        self.0.push(Group {
            name: name.trim().to_string(),
            regex: Regex::new(regex_str.trim())?,
        });
        Ok(())
    }

    /// Returns the name of the first group matching `key`, if any.
    ///
    /// # Examples
    ///
    /// ```
    /// # use shop_reports::Groups;
    /// let mut groups = Groups::default();
    /// groups.add("Go", "^go").unwrap();
    /// assert_eq!(groups.group_for("golang"), Some("Go"));
    /// assert_eq!(groups.group_for("rust"), None);
    /// ```
    #[must_use]
    pub fn group_for(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|g| g.regex.is_match(key))
            .map(|g| g.name.as_str())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_file_fn_correctly_parses_groups_config_file() {
        let groups = Groups::from_file("testdata/groups").unwrap();
        assert_eq!(groups.group_for("go"), Some("Go"));
        assert_eq!(groups.group_for("ebooks"), Some("Books & more"));
        assert_eq!(groups.group_for("books"), Some("Books & more"));
        assert_eq!(groups.group_for("golang"), None);
    }

    #[test]
    fn from_file_fn_returns_error_for_bad_line_format() {
        assert!(Groups::from_file("testdata/groups.bad").is_err());
    }

    #[test]
    fn add_fn_returns_error_for_bad_regex() {
        let mut groups = Groups::default();
        assert!(groups.add("Broken", "(unclosed").is_err());
        assert!(groups.is_empty());
    }

    #[test]
    fn first_matching_group_wins() {
        let mut groups = Groups::default();
        groups.add("Specific", "^go tests$").unwrap();
        groups.add("General", "^go").unwrap();
        assert_eq!(groups.group_for("go tests"), Some("Specific"));
        assert_eq!(groups.group_for("go tools"), Some("General"));
    }
}
