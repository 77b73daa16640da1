//! Core memory type definitions.
//!
//! Defines [`Source`] (the two logical stores a record can live in) and
//! [`MemoryRecord`] (a full stored record).

use serde::{Deserialize, Serialize};

/// Origin of a memory record. Determines which logical table holds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// A chunk produced by ingesting a file.
    Document,
    /// A fact written through the explicit save tool.
    UserFact,
}

impl Source {
    /// SQL-compatible string representation (the stored source tag).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::UserFact => "user_fact",
        }
    }

    /// Name of the logical table holding records with this source.
    pub fn table(&self) -> &'static str {
        match self {
            Self::Document => "documents",
            Self::UserFact => "user_facts",
        }
    }

    /// Name of the vec0 virtual table paired with [`Source::table`].
    pub fn vec_table(&self) -> &'static str {
        match self {
            Self::Document => "documents_vec",
            Self::UserFact => "user_facts_vec",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document" => Ok(Self::Document),
            "user_fact" => Ok(Self::UserFact),
            _ => Err(format!("unknown memory source: {s}")),
        }
    }
}

/// A memory record, matching the shared schema of both logical tables.
///
/// The embedding vector lives in the paired vec0 table under the same id and
/// is not hydrated here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// UUID v7 (time-sortable) primary key.
    pub id: String,
    /// The original text of the record.
    pub text: String,
    /// Which store this record belongs to. Immutable after the write.
    pub source: Source,
    /// Category label — the source file's basename for document chunks,
    /// or the caller-supplied category for user facts.
    pub category: Option<String>,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_round_trips_through_str() {
        for source in [Source::Document, Source::UserFact] {
            let parsed: Source = source.as_str().parse().unwrap();
            assert_eq!(parsed, source);
        }
        assert!("archive".parse::<Source>().is_err());
    }

    #[test]
    fn table_names_are_paired() {
        assert_eq!(Source::Document.table(), "documents");
        assert_eq!(Source::Document.vec_table(), "documents_vec");
        assert_eq!(Source::UserFact.table(), "user_facts");
        assert_eq!(Source::UserFact.vec_table(), "user_facts_vec");
    }
}
