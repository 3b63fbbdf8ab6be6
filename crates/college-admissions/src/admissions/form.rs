use std::collections::BTreeMap;

use axum::body::Bytes;
use serde_json::{Map, Value};

use super::domain::DocumentSlot;

/// Multipart field names accepted for the optional attachment list.
pub const ATTACHMENT_FIELDS: [&str; 2] = ["attachments", "otherDocuments"];

/// Raw form fields as received, keyed by the submitted field name.
///
/// Text fields are stored as JSON strings; a key repeated in a multipart body
/// becomes an array, and JSON bodies may carry nested objects as-is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFields {
    values: BTreeMap<String, Value>,
}

impl RawFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a text value, promoting the entry to an array on repeats.
    pub fn push_text(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let value = Value::String(value.into());
        match self.values.entry(name.into()) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(value);
            }
            std::collections::btree_map::Entry::Occupied(mut slot) => match slot.get_mut() {
                Value::Array(items) => items.push(value),
                existing => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
            },
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Trimmed, non-blank text for `name`. Arrays yield their first usable entry.
    pub fn text(&self, name: &str) -> Option<String> {
        self.values.get(name).and_then(scalar_text)
    }

    /// First non-blank text among `names`, in order.
    pub fn first_text(&self, names: &[&str]) -> Option<String> {
        names.iter().find_map(|name| self.text(name))
    }
}

impl From<Map<String, Value>> for RawFields {
    fn from(map: Map<String, Value>) -> Self {
        Self {
            values: map.into_iter().collect(),
        }
    }
}

impl FromIterator<(String, String)> for RawFields {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut fields = RawFields::new();
        for (name, value) in iter {
            fields.push_text(name, value);
        }
        fields
    }
}

/// Render a scalar JSON value as trimmed text; blanks count as absent.
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(number) => Some(number.to_string()),
        Value::Array(items) => items.iter().find_map(scalar_text),
        Value::Bool(_) | Value::Null | Value::Object(_) => None,
    }
}

/// A file received from the client, held in memory until staged.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, content_type: Option<&str>, bytes: Bytes) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.map(str::to_string),
            bytes,
        }
    }

    /// Declared content type, falling back to a guess from the file name.
    pub fn effective_content_type(&self) -> mime::Mime {
        self.content_type
            .as_deref()
            .and_then(|raw| raw.parse::<mime::Mime>().ok())
            .unwrap_or_else(|| mime_guess::from_path(&self.file_name).first_or_octet_stream())
    }

    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
    }
}

/// Everything a client submitted for one application.
#[derive(Debug, Clone, Default)]
pub struct RawSubmission {
    pub fields: RawFields,
    pub files: BTreeMap<DocumentSlot, UploadedFile>,
    pub attachments: Vec<UploadedFile>,
}

impl RawSubmission {
    pub fn new(fields: RawFields) -> Self {
        Self {
            fields,
            ..Self::default()
        }
    }

    pub fn with_file(mut self, slot: DocumentSlot, file: UploadedFile) -> Self {
        self.files.insert(slot, file);
        self
    }

    pub fn with_attachment(mut self, file: UploadedFile) -> Self {
        self.attachments.push(file);
        self
    }

    /// Route a received file to its slot or the attachment list. Unknown field
    /// names are returned back to the caller.
    pub fn accept_file(&mut self, field_name: &str, file: UploadedFile) -> Result<(), UploadedFile> {
        if let Some(slot) = DocumentSlot::from_field_name(field_name) {
            self.files.insert(slot, file);
            return Ok(());
        }
        let base = field_name.trim_end_matches("[]");
        if ATTACHMENT_FIELDS
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(base))
        {
            self.attachments.push(file);
            return Ok(());
        }
        Err(file)
    }
}
