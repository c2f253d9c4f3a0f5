// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Loading and saving ScanTailor project files.
//
// The document is split into a skeleton (everything that is not a child of
// one of the four page collections, kept as raw text) and a list of
// `PageUnit`s. Rendering writes the skeleton back with the selected units
// spliced in, so any field Scanwerk does not understand survives unchanged.

use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, info, instrument};

use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::ShardRange;

use crate::digest::fingerprint;
use crate::record::{Collection, PageUnit, PlanRecord};

/// File extension ScanTailor uses for project files.
pub const PROJECT_EXTENSION: &str = "ScanTailor";

/// A piece of the document outside the page collections.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// Text reproduced as-is.
    Verbatim(String),
    /// Insertion point for the children of one collection.
    Collection(Collection),
}

/// A loaded ScanTailor project: job-level settings plus aligned page units.
#[derive(Debug, Clone)]
pub struct ProcessingPlan {
    name: String,
    /// SHA-256 of the text this plan was parsed from.
    digest: String,
    skeleton: Vec<Segment>,
    units: Vec<PageUnit>,
}

impl ProcessingPlan {
    /// Read and parse a project file.
    ///
    /// The plan is named after the file stem, so `book.ScanTailor` yields a
    /// plan called `book`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ScanwerkError::PlanLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".into());

        let plan = Self::parse_named(name, &text, path)?;
        info!(pages = plan.len(), digest = %plan.digest, "plan loaded");
        Ok(plan)
    }

    /// Parse a project from text already in memory.
    pub fn parse(name: impl Into<String>, text: &str) -> Result<Self> {
        let name = name.into();
        let origin = Path::new(&name).to_path_buf();
        Self::parse_named(name, text, &origin)
    }

    fn parse_named(name: String, text: &str, origin: &Path) -> Result<Self> {
        let groups = scan_document(text).map_err(|reason| ScanwerkError::PlanLoad {
            path: origin.to_path_buf(),
            reason,
        })?;

        let mut skeleton = Vec::with_capacity(groups.len() * 2 + 1);
        let mut cursor = 0;
        let mut collections: [Vec<PlanRecord>; 4] = Default::default();
        for group in groups {
            skeleton.push(Segment::Verbatim(text[cursor..group.inner_start].to_owned()));
            skeleton.push(Segment::Collection(group.collection));
            cursor = group.tail_start;
            collections[group.collection.index()] = group.records;
        }
        skeleton.push(Segment::Verbatim(text[cursor..].to_owned()));

        for collection in Collection::ALL {
            let present = skeleton
                .iter()
                .any(|s| *s == Segment::Collection(collection));
            if !present {
                return Err(ScanwerkError::PlanLoad {
                    path: origin.to_path_buf(),
                    reason: format!("missing <{}> collection", collection.tag()),
                });
            }
        }

        let [files, images, pages, disambiguation] = collections;
        if images.len() != files.len()
            || pages.len() != files.len()
            || disambiguation.len() != files.len()
        {
            return Err(ScanwerkError::MisalignedPlan {
                files: files.len(),
                images: images.len(),
                pages: pages.len(),
                disambiguation: disambiguation.len(),
            });
        }

        let units = files
            .into_iter()
            .zip(images)
            .zip(pages)
            .zip(disambiguation)
            .map(|(((file, image), page), disambiguation)| PageUnit {
                file,
                image,
                page,
                disambiguation,
            })
            .collect();

        Ok(Self {
            name,
            digest: fingerprint(text.as_bytes()),
            skeleton,
            units,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fingerprint of the source text.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn units(&self) -> &[PageUnit] {
        &self.units
    }

    /// Number of pages (`N_total`).
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// A copy of this plan restricted to the pages in `range`.
    ///
    /// The range is clamped to the plan bounds. Job-level settings are copied
    /// unchanged.
    pub fn slice(&self, range: ShardRange) -> Self {
        let end = range.end.min(self.units.len());
        let start = range.start.min(end);
        let mut sliced = Self {
            name: self.name.clone(),
            digest: String::new(),
            skeleton: self.skeleton.clone(),
            units: self.units[start..end].to_vec(),
        };
        sliced.digest = fingerprint(sliced.render().as_bytes());
        sliced
    }

    /// Serialize to the project file format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for segment in &self.skeleton {
            match segment {
                Segment::Verbatim(text) => out.push_str(text),
                Segment::Collection(collection) => {
                    for unit in &self.units {
                        unit.record(*collection).write_to(&mut out);
                    }
                }
            }
        }
        out
    }

    /// Write the project file to `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display(), pages = self.len()))]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.render()).map_err(|e| ScanwerkError::PlanWrite {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        debug!("plan saved");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Document scanning
// ---------------------------------------------------------------------------

/// Byte offsets of one collection found in the document.
struct GroupSpan {
    collection: Collection,
    /// Just after the opening tag.
    inner_start: usize,
    /// End of the last child element, or `inner_start` when there is none.
    tail_start: usize,
    records: Vec<PlanRecord>,
}

/// A collection whose closing tag has not been reached yet.
struct OpenGroup {
    collection: Collection,
    inner_start: usize,
    cursor: usize,
    records: Vec<PlanRecord>,
    pending: Option<PendingRecord>,
}

/// A child element whose end tag has not been reached yet.
struct PendingRecord {
    start: usize,
    tag: String,
    attributes: Vec<(String, String)>,
}

impl OpenGroup {
    fn new(collection: Collection, inner_start: usize) -> Self {
        Self {
            collection,
            inner_start,
            cursor: inner_start,
            records: Vec::new(),
            pending: None,
        }
    }

    fn push(&mut self, text: &str, start: usize, end: usize, tag: String, attributes: Vec<(String, String)>) {
        self.records.push(PlanRecord {
            leading: text[self.cursor..start].to_owned(),
            raw: text[start..end].to_owned(),
            tag,
            attributes,
        });
        self.cursor = end;
    }

    fn finish(self) -> GroupSpan {
        GroupSpan {
            collection: self.collection,
            inner_start: self.inner_start,
            tail_start: self.cursor,
            records: self.records,
        }
    }
}

/// Walk the document once and collect the four page collections in document
/// order. Depth 1 is the root element, collections sit at depth 2 and their
/// records at depth 3.
fn scan_document(text: &str) -> std::result::Result<Vec<GroupSpan>, String> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(false);

    let mut depth = 0usize;
    let mut saw_root = false;
    let mut open: Option<OpenGroup> = None;
    let mut groups: Vec<GroupSpan> = Vec::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| format!("malformed XML: {e}"))?;
        let pos = reader.buffer_position() as usize;

        match event {
            Event::Start(e) => {
                depth += 1;
                match depth {
                    1 => saw_root = true,
                    2 => {
                        if let Some(collection) = Collection::from_tag(e.name().as_ref()) {
                            ensure_unique(&groups, collection)?;
                            open = Some(OpenGroup::new(collection, pos));
                        }
                    }
                    3 => {
                        if let Some(group) = open.as_mut() {
                            group.pending = Some(PendingRecord {
                                start: tag_start(text, pos)?,
                                tag: tag_name(&e),
                                attributes: parse_attributes(&e)?,
                            });
                        }
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => match depth {
                0 => saw_root = true,
                1 => {
                    if let Some(collection) = Collection::from_tag(e.name().as_ref()) {
                        ensure_unique(&groups, collection)?;
                        groups.push(OpenGroup::new(collection, pos).finish());
                    }
                }
                2 => {
                    if let Some(group) = open.as_mut() {
                        let start = tag_start(text, pos)?;
                        group.push(text, start, pos, tag_name(&e), parse_attributes(&e)?);
                    }
                }
                _ => {}
            },
            Event::End(_) => {
                match depth {
                    3 => {
                        if let Some(group) = open.as_mut() {
                            if let Some(pending) = group.pending.take() {
                                group.push(text, pending.start, pos, pending.tag, pending.attributes);
                            }
                        }
                    }
                    2 => {
                        if let Some(group) = open.take() {
                            groups.push(group.finish());
                        }
                    }
                    _ => {}
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err("document has no root element".into());
    }
    if depth != 0 || open.is_some() {
        return Err("document ends inside an open element".into());
    }
    Ok(groups)
}

fn ensure_unique(groups: &[GroupSpan], collection: Collection) -> std::result::Result<(), String> {
    if groups.iter().any(|g| g.collection == collection) {
        return Err(format!("duplicate <{}> collection", collection.tag()));
    }
    Ok(())
}

/// Offset of the `<` that opened the tag ending at `end`.
///
/// `<` cannot appear unescaped inside attribute values, so the last one
/// before the end of the tag is its start.
fn tag_start(text: &str, end: usize) -> std::result::Result<usize, String> {
    text[..end]
        .rfind('<')
        .ok_or_else(|| format!("no tag start before byte {end}"))
}

fn tag_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn parse_attributes(e: &BytesStart<'_>) -> std::result::Result<Vec<(String, String)>, String> {
    e.attributes()
        .map(|attr| -> std::result::Result<(String, String), String> {
            let attr = attr.map_err(|err| format!("bad attribute in <{}>: {err}", tag_name(e)))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let raw = String::from_utf8_lossy(&attr.value);
            let value = quick_xml::escape::unescape(&raw)
                .map_err(|err| format!("bad attribute value for {key}: {err}"))?
                .into_owned();
            Ok((key, value))
        })
        .collect()
}
