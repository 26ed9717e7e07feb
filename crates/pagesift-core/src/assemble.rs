//! Page-level PDF assembly on top of lopdf
//!
//! `PdfAssembly` owns a destination document and an ordered list of page
//! references. Pages are imported from other documents by deep-copying the
//! objects they reference, then placed with `add_page` / `insert_page`.
//! The page tree is rebuilt from that list on `save`.
//!
//! Indices passed to `insert_page` and `copy_pages` are 0-based.

use crate::error::SiftError;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::BTreeMap;

/// Page attributes a page may inherit from its ancestors in the page tree
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// US Letter, used for blank pages when no neighbouring page has a MediaBox
const DEFAULT_MEDIA_BOX: [i64; 4] = [0, 0, 612, 792];

/// A page object living in the destination document, not yet placed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHandle(ObjectId);

/// Mutable destination document
pub struct PdfAssembly {
    doc: Document,
    pages_id: ObjectId,
    pages: Vec<ObjectId>,
}

impl PdfAssembly {
    /// Empty document with a catalog and an empty page tree
    pub fn create() -> Self {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let pages = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(0)),
            ("Kids", Object::Array(vec![])),
        ]);
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]);
        let catalog_id = doc.add_object(catalog);
        doc.trailer.set("Root", Object::Reference(catalog_id));

        Self {
            doc,
            pages_id,
            pages: Vec::new(),
        }
    }

    /// Load an existing document so pages can be inserted around its own
    pub fn load(bytes: &[u8]) -> Result<Self, SiftError> {
        let mut doc = load_document(bytes)?;
        let pages_id = pages_root(&doc)?;
        let pages: Vec<ObjectId> = doc.get_pages().values().copied().collect();

        // The tree is flattened on save, so intermediate nodes stop providing inherited values
        for &page_id in &pages {
            let missing: Vec<(&[u8], Object)> = INHERITABLE
                .iter()
                .filter(|key| {
                    doc.get_dictionary(page_id)
                        .map(|page| !page.has(key))
                        .unwrap_or(false)
                })
                .filter_map(|&key| inherited_attribute(&doc, page_id, key).map(|v| (key, v)))
                .collect();
            if let Some(Object::Dictionary(page)) = doc.objects.get_mut(&page_id) {
                for (key, value) in missing {
                    page.set(key.to_vec(), value);
                }
            }
        }

        Ok(Self {
            doc,
            pages_id,
            pages,
        })
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Import pages of `source` (0-based indices) without placing them
    pub fn copy_pages(
        &mut self,
        source: &Document,
        indices: &[usize],
    ) -> Result<Vec<PageHandle>, SiftError> {
        let source_pages: Vec<ObjectId> = source.get_pages().values().copied().collect();
        // One map per call so resources shared between the copied pages are imported once
        let mut imported = BTreeMap::new();
        let mut handles = Vec::with_capacity(indices.len());

        for &index in indices {
            let page_id = *source_pages.get(index).ok_or_else(|| {
                SiftError::OperationError(format!(
                    "Page index {} does not exist (source has {} pages)",
                    index,
                    source_pages.len()
                ))
            })?;
            handles.push(self.import_page(source, page_id, &mut imported)?);
        }

        Ok(handles)
    }

    /// Append an imported page
    pub fn add_page(&mut self, page: PageHandle) {
        self.pages.push(page.0);
    }

    /// Insert `page` at `index`, or a blank page when `page` is None
    pub fn insert_page(&mut self, index: usize, page: Option<PageHandle>) -> Result<(), SiftError> {
        if index > self.pages.len() {
            return Err(SiftError::OperationError(format!(
                "Insert index {} out of range (document has {} pages)",
                index,
                self.pages.len()
            )));
        }

        let id = match page {
            Some(handle) => handle.0,
            None => self.blank_page(index),
        };
        self.pages.insert(index, id);
        Ok(())
    }

    /// Serialize, dropping objects no longer reachable from the page tree
    pub fn save(mut self) -> Result<Vec<u8>, SiftError> {
        let kids = self
            .pages
            .iter()
            .map(|&id| Object::Reference(id))
            .collect::<Vec<_>>();

        match self.doc.objects.get_mut(&self.pages_id) {
            Some(Object::Dictionary(pages_dict)) => {
                pages_dict.set("Kids", Object::Array(kids));
                pages_dict.set("Count", Object::Integer(self.pages.len() as i64));
            }
            _ => {
                return Err(SiftError::OperationError(
                    "Invalid pages dictionary".into(),
                ))
            }
        }

        for &page_id in &self.pages {
            if let Some(Object::Dictionary(page)) = self.doc.objects.get_mut(&page_id) {
                page.set("Parent", Object::Reference(self.pages_id));
            }
        }

        self.doc.prune_objects();
        self.doc.compress();

        let mut buffer = Vec::new();
        self.doc
            .save_to(&mut buffer)
            .map_err(|e| SiftError::OperationError(format!("Save failed: {}", e)))?;

        Ok(buffer)
    }

    fn import_page(
        &mut self,
        source: &Document,
        page_id: ObjectId,
        imported: &mut BTreeMap<ObjectId, ObjectId>,
    ) -> Result<PageHandle, SiftError> {
        let mut page = source
            .get_dictionary(page_id)
            .map_err(|e| SiftError::OperationError(format!("Invalid page object: {}", e)))?
            .clone();

        // Materialize inherited attributes before the link to the old tree is cut
        for key in INHERITABLE {
            if !page.has(key) {
                if let Some(value) = inherited_attribute(source, page_id, key) {
                    page.set(key.to_vec(), value);
                }
            }
        }
        page.remove(b"Parent");

        let new_id = self.doc.new_object_id();
        imported.insert(page_id, new_id);

        let mut remapped = Dictionary::new();
        for (key, value) in page.iter() {
            remapped.set(key.clone(), self.import_object(source, value.clone(), imported));
        }
        remapped.set("Parent", Object::Reference(self.pages_id));
        self.doc.objects.insert(new_id, Object::Dictionary(remapped));

        Ok(PageHandle(new_id))
    }

    /// Recursively copy `obj`, importing every object it references
    fn import_object(
        &mut self,
        source: &Document,
        obj: Object,
        imported: &mut BTreeMap<ObjectId, ObjectId>,
    ) -> Object {
        match obj {
            Object::Reference(id) => {
                if let Some(&existing) = imported.get(&id) {
                    return Object::Reference(existing);
                }
                let target = match source.objects.get(&id) {
                    Some(target) => target.clone(),
                    // Dangling references read as null per the PDF spec
                    None => return Object::Null,
                };
                let new_id = self.doc.new_object_id();
                imported.insert(id, new_id);
                let copied = self.import_object(source, target, imported);
                self.doc.objects.insert(new_id, copied);
                Object::Reference(new_id)
            }
            Object::Array(items) => Object::Array(
                items
                    .into_iter()
                    .map(|o| self.import_object(source, o, imported))
                    .collect(),
            ),
            Object::Dictionary(dict) => {
                Object::Dictionary(self.import_dictionary(source, dict, imported))
            }
            Object::Stream(mut stream) => {
                stream.dict = self.import_dictionary(source, stream.dict, imported);
                Object::Stream(stream)
            }
            other => other,
        }
    }

    fn import_dictionary(
        &mut self,
        source: &Document,
        dict: Dictionary,
        imported: &mut BTreeMap<ObjectId, ObjectId>,
    ) -> Dictionary {
        let mut out = Dictionary::new();
        for (key, value) in dict.iter() {
            out.set(key.clone(), self.import_object(source, value.clone(), imported));
        }
        out
    }

    /// New page without content, sized like the page it will follow
    fn blank_page(&mut self, index: usize) -> ObjectId {
        let neighbour = index
            .checked_sub(1)
            .and_then(|i| self.pages.get(i))
            .or_else(|| self.pages.get(index))
            .copied();

        let media_box = neighbour
            .and_then(|id| self.doc.get_dictionary(id).ok())
            .and_then(|page| page.get(b"MediaBox").ok())
            .cloned()
            .unwrap_or_else(|| {
                Object::Array(DEFAULT_MEDIA_BOX.iter().map(|&v| Object::Integer(v)).collect())
            });

        let page = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(self.pages_id)),
            ("MediaBox", media_box),
            ("Resources", Object::Dictionary(Dictionary::new())),
        ]);
        self.doc.add_object(page)
    }
}

pub(crate) fn load_document(bytes: &[u8]) -> Result<Document, SiftError> {
    if bytes.is_empty() {
        return Err(SiftError::InvalidInput("No PDF data provided".into()));
    }
    Document::load_mem(bytes).map_err(|e| SiftError::ParseError(e.to_string()))
}

/// Copy the given 1-indexed pages of `source`, in order, into a new document
pub fn extract_pages(source: &Document, pages: &[u32]) -> Result<Vec<u8>, SiftError> {
    if pages.contains(&0) {
        return Err(SiftError::InvalidInput("Page numbers must be >= 1".into()));
    }
    let indices: Vec<usize> = pages.iter().map(|&p| (p - 1) as usize).collect();

    let mut out = PdfAssembly::create();
    for handle in out.copy_pages(source, &indices)? {
        out.add_page(handle);
    }
    out.save()
}

fn pages_root(doc: &Document) -> Result<ObjectId, SiftError> {
    let catalog_id = doc
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|_| SiftError::ParseError("No Root in trailer".into()))?;

    doc.get_dictionary(catalog_id)
        .and_then(|catalog| catalog.get(b"Pages"))
        .and_then(Object::as_reference)
        .map_err(|_| SiftError::ParseError("No Pages in catalog".into()))
}

fn inherited_attribute(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    // Page trees are shallow; the bound guards against cyclic Parent links
    for _ in 0..64 {
        let parent_id = current.get(b"Parent").and_then(Object::as_reference).ok()?;
        let parent = doc.get_dictionary(parent_id).ok()?;
        if let Ok(value) = parent.get(key) {
            return Some(value.clone());
        }
        current = parent;
    }
    None
}
