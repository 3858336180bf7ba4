use crate::error::StoreError;
use crate::record::FIELD_NUMBER;
use crate::store::RecordStore;
use once_cell::sync::Lazy;
use regex::Regex;

// Anchored at both ends: "a@b.c!!!" is not an address.
static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[\w.-]+@[\w.-]+\.\w+$").expect("hard-coded regular expression to be valid")
});

pub fn is_valid_email(text: &str) -> bool {
    EMAIL_REGEX.is_match(text)
}

/// Equality query on `number`. Backed by an index in the SQLite store; a store
/// without one makes bulk import quadratic.
pub fn number_exists(number: &str, store: &dyn RecordStore) -> Result<bool, StoreError> {
    Ok(!store.query_equals(FIELD_NUMBER, number)?.is_empty())
}
