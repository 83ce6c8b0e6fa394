use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

pub const INTERACTABLE_OBJECTS_PATH: &str = "./datasets/objects/int_objects.txt";
pub const RECEPTACLE_OBJECTS_PATH: &str = "./datasets/objects/rec_objects.txt";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VocabularyError {
    #[error("object list {path} has no entries")]
    Empty { path: PathBuf },
    #[error("object list {path}, line {line}: `{entry}` is not a single object type")]
    InvalidEntry {
        path: PathBuf,
        line: usize,
        entry: String,
    },
}

/// Interactable objects followed by receptacle objects. Read once, then shared read-only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectVocabulary {
    objects: Vec<String>,
    index: HashMap<String, usize>,
}

fn parse_list(path: &Path, raw: &str) -> Result<Vec<String>, VocabularyError> {
    let mut entries = vec![];
    for (line_idx, line) in raw.lines().enumerate() {
        let entry = line.trim();
        if entry.is_empty() {
            continue;
        }
        if entry.split_whitespace().count() != 1 {
            return Err(VocabularyError::InvalidEntry {
                path: path.to_path_buf(),
                line: line_idx + 1,
                entry: entry.to_owned(),
            });
        }
        entries.push(entry.to_owned());
    }
    if entries.is_empty() {
        return Err(VocabularyError::Empty {
            path: path.to_path_buf(),
        });
    }
    Ok(entries)
}

fn read_list(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading object list {}", path.display()))?;
    Ok(parse_list(path, &raw)?)
}

impl ObjectVocabulary {
    pub fn load(interactable: impl AsRef<Path>, receptacle: impl AsRef<Path>) -> Result<Self> {
        let interactable = read_list(interactable.as_ref())?;
        let receptacle = read_list(receptacle.as_ref())?;
        Ok(Self::from_lists(interactable, receptacle))
    }

    pub fn load_default() -> Result<Self> {
        Self::load(INTERACTABLE_OBJECTS_PATH, RECEPTACLE_OBJECTS_PATH)
    }

    pub fn from_lists(
        interactable: impl IntoIterator<Item = String>,
        receptacle: impl IntoIterator<Item = String>,
    ) -> Self {
        let mut vocabulary = Self::default();
        for object in interactable.into_iter().chain(receptacle) {
            // first occurrence keeps its index
            if !vocabulary.index.contains_key(&object) {
                vocabulary
                    .index
                    .insert(object.clone(), vocabulary.objects.len());
            }
            vocabulary.objects.push(object);
        }
        vocabulary
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn contains(&self, object_type: &str) -> bool {
        self.index.contains_key(object_type)
    }

    pub fn index_of(&self, object_type: &str) -> Option<usize> {
        self.index.get(object_type).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.objects.iter().map(String::as_str)
    }
}
