use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

pub const FIELD_NAME: &str = "name";
pub const FIELD_EMAIL: &str = "email";
pub const FIELD_NUMBER: &str = "number";
pub const FIELD_ISSUE: &str = "issue";
pub const FIELD_REGISTRATION_CODE: &str = "registration_code";
pub const FIELD_DEPARTMENT_OR_COURSE: &str = "department_or_course";

/// Column order used by listings and exports. Keys outside this list sort
/// alphabetically after it.
pub const CANONICAL_FIELDS: [&str; 6] = [
    FIELD_NAME,
    FIELD_EMAIL,
    FIELD_NUMBER,
    FIELD_ISSUE,
    FIELD_REGISTRATION_CODE,
    FIELD_DEPARTMENT_OR_COURSE,
];

/// Which name the fifth field carries. Older collections hold
/// `registration_code`; current ones hold `department_or_course`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchemaVersion {
    Registration,
    #[default]
    Department,
}

impl SchemaVersion {
    pub fn code_field(self) -> &'static str {
        match self {
            SchemaVersion::Registration => FIELD_REGISTRATION_CODE,
            SchemaVersion::Department => FIELD_DEPARTMENT_OR_COURSE,
        }
    }

    pub fn fields(self) -> [&'static str; 5] {
        [
            FIELD_NAME,
            FIELD_EMAIL,
            FIELD_NUMBER,
            FIELD_ISSUE,
            self.code_field(),
        ]
    }
}

impl FromStr for SchemaVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "registration" | "registration_code" | "v1" => Ok(SchemaVersion::Registration),
            "department" | "department_or_course" | "v2" => Ok(SchemaVersion::Department),
            other => Err(format!("unknown record schema: {other}")),
        }
    }
}

/// Field values as collected from a form or an import row, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordInput {
    pub name: String,
    pub email: String,
    pub number: String,
    pub issue: String,
    pub code: String,
}

impl RecordInput {
    /// Names of the fields that are blank after trimming, in schema order.
    pub fn missing_fields(&self, schema: SchemaVersion) -> Vec<&'static str> {
        let values = [
            &self.name,
            &self.email,
            &self.number,
            &self.issue,
            &self.code,
        ];
        schema
            .fields()
            .into_iter()
            .zip(values)
            .filter(|(_, v)| v.trim().is_empty())
            .map(|(f, _)| f)
            .collect()
    }

    pub fn to_document(&self, schema: SchemaVersion) -> Document {
        let mut doc = Document::default();
        doc.insert(FIELD_NAME, self.name.trim());
        doc.insert(FIELD_EMAIL, self.email.trim());
        doc.insert(FIELD_NUMBER, self.number.trim());
        doc.insert(FIELD_ISSUE, self.issue.trim());
        doc.insert(schema.code_field(), self.code.trim());
        doc
    }
}

/// Flat field-name to string mapping, the stored shape of a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(BTreeMap<String, String>);

impl Document {
    pub fn insert(&mut self, field: &str, value: &str) {
        self.0.insert(field.to_string(), value.to_string());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl<const N: usize> From<[(&str, &str); N]> for Document {
    fn from(pairs: [(&str, &str); N]) -> Self {
        let mut doc = Document::default();
        for (k, v) in pairs {
            doc.insert(k, v);
        }
        doc
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub id: String,
    pub created_at: String,
    pub document: Document,
}

/// Sorts column names: canonical fields first, the rest alphabetically.
pub fn column_rank(field: &str) -> (usize, &str) {
    let pos = CANONICAL_FIELDS
        .iter()
        .position(|f| *f == field)
        .unwrap_or(CANONICAL_FIELDS.len());
    (pos, field)
}
