//! Work item relationship kinds and relation links.

use serde_json::{Map, Value};
use std::fmt;

use crate::models::RelationRecord;

/// Relationship kinds understood by the typed service operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relationship {
    Dependency,
    Related,
    Child,
    Parent,
    Affects,
    AffectedBy,
    Duplicate,
    DuplicateOf,
    ReferencedBy,
    TestedBy,
    Tests,
    TestCaseSharedSteps,
    ProducedFor,
    ConsumedBy,
    RemoteRelated,
    Hyperlink,
    ArtifactLink,
    /// A relation type this crate does not know about.
    Other,
    /// Every relation, for read operations only.
    All,
}

const LINK_TEXTS: &[(Relationship, &str)] = &[
    (Relationship::Dependency, "System.LinkTypes.Dependency-Forward"),
    (Relationship::Related, "System.LinkTypes.Related"),
    (Relationship::Child, "System.LinkTypes.Hierarchy-Forward"),
    (Relationship::Parent, "System.LinkTypes.Hierarchy-Reverse"),
    (Relationship::Affects, "Microsoft.VSTS.Common.Affects-Forward"),
    (Relationship::AffectedBy, "Microsoft.VSTS.Common.Affects-Reverse"),
    (Relationship::Duplicate, "System.LinkTypes.Duplicate-Forward"),
    (Relationship::DuplicateOf, "System.LinkTypes.Duplicate-Reverse"),
    (
        Relationship::ReferencedBy,
        "Microsoft.VSTS.TestCase.SharedParameterReferencedBy-Forward",
    ),
    (Relationship::TestedBy, "Microsoft.VSTS.Common.TestedBy-Forward"),
    (Relationship::Tests, "Microsoft.VSTS.Common.TestedBy-Reverse"),
    (
        Relationship::TestCaseSharedSteps,
        "Microsoft.VSTS.TestCase.SharedStepReferencedBy-Reverse",
    ),
    (Relationship::ProducedFor, "System.LinkTypes.Remote.Dependency-Forward"),
    (Relationship::ConsumedBy, "System.LinkTypes.Remote.Dependency-Reverse"),
    (Relationship::RemoteRelated, "System.LinkTypes.Remote.Related"),
    (Relationship::Hyperlink, "Hyperlink"),
    (Relationship::ArtifactLink, "ArtifactLink"),
];

impl Relationship {
    /// The relation type name used on the wire. `Other` and `All` have none.
    #[must_use]
    pub fn link_text(self) -> Option<&'static str> {
        LINK_TEXTS
            .iter()
            .find(|(kind, _)| *kind == self)
            .map(|(_, text)| *text)
    }

    /// Classify a wire relation type; unknown or missing text is `Other`.
    #[must_use]
    pub fn from_link_text(text: Option<&str>) -> Self {
        text.and_then(|text| LINK_TEXTS.iter().find(|(_, t)| *t == text))
            .map_or(Self::Other, |(kind, _)| *kind)
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A classified relation on a work item.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationLink {
    pub title: String,
    pub raw_type: String,
    pub kind: Relationship,
    pub related_id: Option<i32>,
    pub url: String,
    pub attributes: Map<String, Value>,
}

impl From<&RelationRecord> for RelationLink {
    fn from(record: &RelationRecord) -> Self {
        let title = record
            .title
            .clone()
            .or_else(|| {
                record
                    .attributes
                    .get("name")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_default();

        Self {
            title,
            raw_type: record.rel.clone(),
            kind: Relationship::from_link_text(Some(&record.rel)),
            related_id: parse_id_from_relationship(Some(&record.url)),
            url: record.url.clone(),
            attributes: record.attributes.clone(),
        }
    }
}

impl fmt::Display for RelationLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.kind == Relationship::Other {
            self.raw_type.clone()
        } else {
            self.kind.to_string()
        };
        match self.related_id {
            Some(id) => write!(f, "{kind} Id:{id}"),
            None => write!(f, "{kind}: {}", self.url),
        }
    }
}

/// Parse the work item id from the last path segment of a relation URL.
///
/// A URL with no separator past its first character, or whose last segment is
/// not a number, has no id.
#[must_use]
pub fn parse_id_from_relationship(url: Option<&str>) -> Option<i32> {
    let url = url?;
    let pos = url.rfind('/')?;
    if pos == 0 {
        return None;
    }
    url[pos + 1..].parse().ok()
}

/// Drop a trailing `/revisions/<n>` marker from a work item URL.
#[must_use]
pub fn strip_revision_from_url(url: &str) -> &str {
    match url.rfind("/revisions/") {
        Some(index) => &url[..index],
        None => url,
    }
}
