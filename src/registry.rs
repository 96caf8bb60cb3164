use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_CLASS: &str = "Grade 1";

const LOWER_PRIMARY: &[&str] = &["maths", "english", "kiswahili", "integrated"];
const UPPER_PRIMARY: &[&str] = &[
    "maths",
    "english",
    "kiswahili",
    "integrated",
    "social",
    "creative",
];
const JUNIOR_SECONDARY: &[&str] = &[
    "maths",
    "english",
    "kiswahili",
    "integrated",
    "social",
    "pretech",
    "creative",
    "agriculture",
    "cre",
];

const BUILTIN_CLASSES: &[(&str, &[&str])] = &[
    (
        "Playgroup",
        &["maths", "language", "reading", "environmental", "integrated"],
    ),
    (
        "PP1",
        &["maths", "language", "reading", "creative", "cre", "environmental"],
    ),
    ("PP2", &["maths", "language", "reading", "kiswahili", "kusoma"]),
    ("Grade 1", LOWER_PRIMARY),
    ("Grade 2", LOWER_PRIMARY),
    ("Grade 3", LOWER_PRIMARY),
    ("Grade 4", UPPER_PRIMARY),
    ("Grade 5", UPPER_PRIMARY),
    ("Grade 6", UPPER_PRIMARY),
    ("Grade 7", JUNIOR_SECONDARY),
    ("Grade 8", JUNIOR_SECONDARY),
    ("Grade 9", JUNIOR_SECONDARY),
];

const BUILTIN_DISPLAY_NAMES: &[(&str, &str)] = &[
    ("maths", "Maths"),
    ("english", "English"),
    ("kiswahili", "Kiswahili"),
    ("language", "Language"),
    ("reading", "Reading"),
    ("environmental", "Environmental"),
    ("integrated", "Integrated"),
    ("creative", "Creative"),
    ("cre", "CRE"),
    ("kusoma", "Kusoma"),
    ("social", "Social"),
    ("pretech", "Pretech"),
    ("agriculture", "Agriculture"),
];

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to parse subject registry: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("class {class:?} has no subjects")]
    EmptySubjectSet { class: String },

    #[error("class {class:?} lists subject {subject:?} more than once")]
    DuplicateSubject { class: String, subject: String },

    #[error("class {0:?} is defined more than once")]
    DuplicateClass(String),

    #[error("default class {0:?} is not defined")]
    MissingDefault(String),
}

/// Ordered subject codes scored for one class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectSet {
    codes: Vec<String>,
}

impl SubjectSet {
    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    pub fn contains(&self, code: &str) -> bool {
        self.codes.iter().any(|c| c == code)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.codes.iter().map(String::as_str)
    }
}

/// Immutable class → subject mapping. Built once at startup and shared by
/// reference; there is no way to mutate it after construction.
#[derive(Debug, Clone)]
pub struct SubjectRegistry {
    classes: Vec<(String, SubjectSet)>,
    index: HashMap<String, usize>,
    default_index: usize,
    display_names: HashMap<String, String>,
}

fn builtin_display_names() -> HashMap<String, String> {
    BUILTIN_DISPLAY_NAMES
        .iter()
        .map(|(code, label)| (code.to_string(), label.to_string()))
        .collect()
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    default_class: String,
    classes: Vec<ClassEntry>,
    #[serde(default)]
    display_names: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ClassEntry {
    name: String,
    subjects: Vec<String>,
}

impl SubjectRegistry {
    /// The registry every school installation ships with. The static tables
    /// are checked against `build` in the unit tests below.
    pub fn builtin() -> Self {
        let classes: Vec<(String, SubjectSet)> = BUILTIN_CLASSES
            .iter()
            .map(|(name, codes)| {
                (
                    name.to_string(),
                    SubjectSet {
                        codes: codes.iter().map(|c| c.to_string()).collect(),
                    },
                )
            })
            .collect();
        let index: HashMap<String, usize> = classes
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.clone(), i))
            .collect();
        let default_index = index.get(DEFAULT_CLASS).copied().unwrap_or(0);
        Self {
            classes,
            index,
            default_index,
            display_names: builtin_display_names(),
        }
    }

    /// Parse a TOML override:
    ///
    /// ```toml
    /// default_class = "Grade 1"
    ///
    /// [[classes]]
    /// name = "Grade 1"
    /// subjects = ["maths", "english"]
    ///
    /// [display_names]
    /// maths = "Mathematics"
    /// ```
    ///
    /// Display names missing from the file fall back to the built-in labels.
    pub fn from_toml_str(s: &str) -> Result<Self, RegistryError> {
        let file: RegistryFile = toml::from_str(s)?;
        let mut display_names = builtin_display_names();
        display_names.extend(file.display_names);
        let classes = file
            .classes
            .into_iter()
            .map(|c| (c.name, c.subjects))
            .collect();
        Self::build(classes, &file.default_class, display_names)
    }

    fn build(
        classes: Vec<(String, Vec<String>)>,
        default_class: &str,
        display_names: HashMap<String, String>,
    ) -> Result<Self, RegistryError> {
        let mut out = Vec::with_capacity(classes.len());
        let mut index = HashMap::new();
        for (name, codes) in classes {
            if codes.is_empty() {
                return Err(RegistryError::EmptySubjectSet { class: name });
            }
            let mut seen = HashSet::new();
            for code in &codes {
                if !seen.insert(code.as_str()) {
                    return Err(RegistryError::DuplicateSubject {
                        class: name,
                        subject: code.clone(),
                    });
                }
            }
            if index.insert(name.clone(), out.len()).is_some() {
                return Err(RegistryError::DuplicateClass(name));
            }
            out.push((name, SubjectSet { codes }));
        }
        let default_index = *index
            .get(default_class)
            .ok_or_else(|| RegistryError::MissingDefault(default_class.to_string()))?;
        Ok(Self {
            classes: out,
            index,
            default_index,
            display_names,
        })
    }

    /// Subject set for an exact class id, or the default set for anything
    /// unknown (including an empty id). Never fails.
    pub fn subjects_for_class(&self, class_id: &str) -> &SubjectSet {
        &self.classes[self.resolve_index(class_id)].1
    }

    /// The class id whose set applies, and whether the default was used.
    pub fn resolve(&self, class_id: &str) -> (&str, bool) {
        let idx = self.resolve_index(class_id);
        (self.classes[idx].0.as_str(), !self.index.contains_key(class_id))
    }

    fn resolve_index(&self, class_id: &str) -> usize {
        self.index
            .get(class_id)
            .copied()
            .unwrap_or(self.default_index)
    }

    pub fn default_class(&self) -> &str {
        &self.classes[self.default_index].0
    }

    pub fn classes(&self) -> impl Iterator<Item = (&str, &SubjectSet)> {
        self.classes.iter().map(|(n, s)| (n.as_str(), s))
    }

    /// Human label for a subject code; unknown codes pass through unchanged.
    pub fn display_name<'a>(&'a self, code: &'a str) -> &'a str {
        self.display_names
            .get(code)
            .map(String::as_str)
            .unwrap_or(code)
    }

    /// Every subject code across all classes, in first-seen order.
    pub fn all_subjects(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (_, set) in &self.classes {
            for code in set.iter() {
                if seen.insert(code) {
                    out.push(code);
                }
            }
        }
        out
    }
}

impl Default for SubjectRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_is_valid() {
        let reg = SubjectRegistry::builtin();
        assert_eq!(reg.classes().count(), 12);
        assert_eq!(reg.default_class(), "Grade 1");
        for (_, set) in reg.classes() {
            assert!(!set.is_empty());
        }

        let checked = SubjectRegistry::build(
            BUILTIN_CLASSES
                .iter()
                .map(|(name, codes)| {
                    (
                        name.to_string(),
                        codes.iter().map(|c| c.to_string()).collect(),
                    )
                })
                .collect(),
            DEFAULT_CLASS,
            builtin_display_names(),
        )
        .expect("builtin tables pass validation");
        assert_eq!(checked.default_class(), reg.default_class());
        assert_eq!(
            checked.classes().collect::<Vec<_>>(),
            reg.classes().collect::<Vec<_>>()
        );
    }

    #[test]
    fn exact_class_lookup() {
        let reg = SubjectRegistry::builtin();
        assert_eq!(
            reg.subjects_for_class("Grade 1").codes(),
            ["maths", "english", "kiswahili", "integrated"]
        );
        assert_eq!(
            reg.subjects_for_class("PP2").codes(),
            ["maths", "language", "reading", "kiswahili", "kusoma"]
        );
        assert_eq!(reg.subjects_for_class("Grade 8").len(), 9);
    }

    #[test]
    fn unknown_or_empty_class_falls_back_to_default() {
        let reg = SubjectRegistry::builtin();
        let default = reg.subjects_for_class("Grade 1");
        assert_eq!(reg.subjects_for_class("Nonexistent Class"), default);
        assert_eq!(reg.subjects_for_class(""), default);
        // Lookup is exact, not case-folded.
        assert_eq!(reg.subjects_for_class("grade 7"), default);
        assert_eq!(reg.resolve("Nonexistent Class"), ("Grade 1", true));
        assert_eq!(reg.resolve("Grade 1"), ("Grade 1", false));
    }

    #[test]
    fn display_name_passes_unknown_codes_through() {
        let reg = SubjectRegistry::builtin();
        assert_eq!(reg.display_name("cre"), "CRE");
        assert_eq!(reg.display_name("maths"), "Maths");
        assert_eq!(reg.display_name("astronomy"), "astronomy");
        assert_eq!(reg.display_name(""), "");
    }

    #[test]
    fn all_subjects_is_distinct_in_first_seen_order() {
        let reg = SubjectRegistry::builtin();
        let all = reg.all_subjects();
        assert_eq!(all.len(), 13);
        assert_eq!(&all[..5], ["maths", "language", "reading", "environmental", "integrated"]);
        assert!(all.contains(&"agriculture"));
    }

    #[test]
    fn toml_override_replaces_classes_and_merges_labels() {
        let reg = SubjectRegistry::from_toml_str(
            r#"
default_class = "Form 1"

[[classes]]
name = "Form 1"
subjects = ["maths", "physics"]

[display_names]
physics = "Physics"
"#,
        )
        .expect("parse registry");
        assert_eq!(reg.subjects_for_class("Grade 1").codes(), ["maths", "physics"]);
        assert_eq!(reg.display_name("physics"), "Physics");
        assert_eq!(reg.display_name("maths"), "Maths");
    }

    #[test]
    fn toml_override_is_validated() {
        let empty = SubjectRegistry::from_toml_str(
            "default_class = \"A\"\n[[classes]]\nname = \"A\"\nsubjects = []\n",
        );
        assert!(matches!(empty, Err(RegistryError::EmptySubjectSet { .. })));

        let dup = SubjectRegistry::from_toml_str(
            "default_class = \"A\"\n[[classes]]\nname = \"A\"\nsubjects = [\"x\", \"x\"]\n",
        );
        assert!(matches!(dup, Err(RegistryError::DuplicateSubject { .. })));

        let missing = SubjectRegistry::from_toml_str(
            "default_class = \"B\"\n[[classes]]\nname = \"A\"\nsubjects = [\"x\"]\n",
        );
        assert!(matches!(missing, Err(RegistryError::MissingDefault(_))));

        assert!(matches!(
            SubjectRegistry::from_toml_str("not toml ["),
            Err(RegistryError::Parse(_))
        ));
    }
}
