// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-page records of a ScanTailor project.
//
// A project keeps four parallel lists (files, images, pages, file-name
// disambiguation) whose i-th entries describe the same page. Grouping the
// four entries into one `PageUnit` makes it impossible to slice them apart.

/// One of the four index-aligned collections in a project file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Files,
    Images,
    Pages,
    FileNameDisambiguation,
}

impl Collection {
    /// All collections in the order they are stored in a `PageUnit`.
    pub const ALL: [Collection; 4] = [
        Collection::Files,
        Collection::Images,
        Collection::Pages,
        Collection::FileNameDisambiguation,
    ];

    /// Element name of the collection in the project file.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Files => "files",
            Self::Images => "images",
            Self::Pages => "pages",
            Self::FileNameDisambiguation => "file-name-disambiguation",
        }
    }

    pub fn from_tag(tag: &[u8]) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.tag().as_bytes() == tag)
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Self::Files => 0,
            Self::Images => 1,
            Self::Pages => 2,
            Self::FileNameDisambiguation => 3,
        }
    }
}

/// A single child element of one collection, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRecord {
    /// Whitespace and comments between the previous sibling and this element.
    pub(crate) leading: String,
    /// The element exactly as it appeared, including any children.
    pub(crate) raw: String,
    pub(crate) tag: String,
    pub(crate) attributes: Vec<(String, String)>,
}

impl PlanRecord {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Unescaped value of an attribute on the record's element.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn id(&self) -> Option<&str> {
        self.attribute("id")
    }

    /// Source text of the element.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub(crate) fn write_to(&self, out: &mut String) {
        out.push_str(&self.leading);
        out.push_str(&self.raw);
    }
}

/// The four records that together describe one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageUnit {
    pub file: PlanRecord,
    pub image: PlanRecord,
    pub page: PlanRecord,
    pub disambiguation: PlanRecord,
}

impl PageUnit {
    pub fn record(&self, collection: Collection) -> &PlanRecord {
        match collection {
            Collection::Files => &self.file,
            Collection::Images => &self.image,
            Collection::Pages => &self.page,
            Collection::FileNameDisambiguation => &self.disambiguation,
        }
    }

    /// Source image name, when the file record carries one.
    pub fn file_name(&self) -> Option<&str> {
        self.file.attribute("name")
    }
}
