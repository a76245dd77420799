//! Static lesson graph: binyans in course order, their patterns, and which
//! tense slots each verb has conjugation data for.
//!
//! Ordering is the only relation the unlock rules use, so it is exposed as
//! plain functions (`Tense::previous`, `LessonGraph::previous_binyan`) rather
//! than leaking how the graph happens to be stored.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tense {
    Past,
    Present,
    Future,
    Imperative,
}

impl Tense {
    /// Course order.
    pub const ALL: [Tense; 4] = [Tense::Past, Tense::Present, Tense::Future, Tense::Imperative];

    pub fn previous(self) -> Option<Tense> {
        match self {
            Self::Past => None,
            Self::Present => Some(Self::Past),
            Self::Future => Some(Self::Present),
            Self::Imperative => Some(Self::Future),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Past => "past",
            Self::Present => "present",
            Self::Future => "future",
            Self::Imperative => "imperative",
        }
    }
}

impl std::fmt::Display for Tense {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Tense {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "past" => Ok(Self::Past),
            "present" => Ok(Self::Present),
            "future" => Ok(Self::Future),
            "imperative" => Ok(Self::Imperative),
            other => Err(format!("unknown tense: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerbUnit {
    pub id: String,
    #[serde(default)]
    pub tenses: BTreeSet<Tense>,
}

impl VerbUnit {
    pub fn has(&self, tense: Tense) -> bool {
        self.tenses.contains(&tense)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub verbs: Vec<VerbUnit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binyan {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub patterns: Vec<Pattern>,
}

impl Binyan {
    pub fn verbs(&self) -> impl Iterator<Item = &VerbUnit> {
        self.patterns.iter().flat_map(|p| p.verbs.iter())
    }

    /// Verbs that have conjugation data for `tense`.
    pub fn verbs_with(&self, tense: Tense) -> impl Iterator<Item = &VerbUnit> {
        self.verbs().filter(move |v| v.has(tense))
    }

    pub fn defines(&self, tense: Tense) -> bool {
        self.verbs().any(|v| v.has(tense))
    }

    /// Tenses at least one verb defines, in course order.
    pub fn defined_tenses(&self) -> Vec<Tense> {
        Tense::ALL.into_iter().filter(|t| self.defines(*t)).collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LessonGraphError {
    #[error("failed to read lesson graph: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse lesson graph: {0}")]
    Parse(#[from] serde_yml::Error),

    #[error("duplicate binyan id: {0}")]
    DuplicateBinyan(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonGraph {
    binyans: Vec<Binyan>,
}

impl LessonGraph {
    pub fn new(binyans: Vec<Binyan>) -> Result<Self, LessonGraphError> {
        let mut seen = HashSet::new();
        for b in &binyans {
            if !seen.insert(b.id.as_str()) {
                return Err(LessonGraphError::DuplicateBinyan(b.id.clone()));
            }
        }
        Ok(Self { binyans })
    }

    pub fn from_yaml(contents: &str) -> Result<Self, LessonGraphError> {
        let parsed: LessonGraph = serde_yml::from_str(contents)?;
        Self::new(parsed.binyans)
    }

    pub fn load(path: &Path) -> Result<Self, LessonGraphError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn binyans(&self) -> &[Binyan] {
        &self.binyans
    }

    pub fn binyan(&self, id: &str) -> Option<&Binyan> {
        self.binyans.iter().find(|b| b.id == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.binyans.iter().position(|b| b.id == id)
    }

    pub fn previous_binyan(&self, id: &str) -> Option<&Binyan> {
        let pos = self.position(id)?;
        pos.checked_sub(1).map(|p| &self.binyans[p])
    }

    /// Two binyans from the first lessons of the course. Binyan 2's
    /// first verb only has past and present data.
    pub fn sample() -> Self {
        fn verb(id: &str, tenses: &[Tense]) -> VerbUnit {
            VerbUnit {
                id: id.into(),
                tenses: tenses.iter().copied().collect(),
            }
        }
        let all = Tense::ALL;
        Self {
            binyans: vec![
                Binyan {
                    id: "binyan1".into(),
                    name: "בניין 1".into(),
                    patterns: vec![
                        Pattern {
                            id: "p1-faal".into(),
                            name: "פַעַל".into(),
                            verbs: vec![verb("v1-katab", &all), verb("v1-akal", &all)],
                        },
                        Pattern {
                            id: "p1-fiil".into(),
                            name: "פִעֵל".into(),
                            verbs: vec![verb("v1-shirib", &all)],
                        },
                    ],
                },
                Binyan {
                    id: "binyan2".into(),
                    name: "בניין 2".into(),
                    patterns: vec![Pattern {
                        id: "p2-faal".into(),
                        name: "פַעְעַל".into(),
                        verbs: vec![
                            verb("v2-allam", &[Tense::Past, Tense::Present]),
                            verb("v2-sakkar", &all),
                        ],
                    }],
                },
            ],
        }
    }
}
