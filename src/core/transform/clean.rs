//! Value cleanup applied before any comparison or submission
//!
//! The mirror rejects blank subfields, values made only of dashes and fields
//! without subfields. Unresolved cross-references are never sent.

use crate::domain::{Field, FieldKind, Record, Subfield};

/// Cleans every data field of a record in place
///
/// - empty or whitespace-only values are dropped
/// - unresolved cross-references are dropped
/// - dash-only values have their dashes replaced with underscores
/// - fields left without subfields are removed
/// - `_` indicators become blanks
pub fn clean_values(record: &mut Record) {
    for field in record.fields.iter_mut() {
        clean_field(field);
    }
    record.fields.retain(|f| match &f.kind {
        FieldKind::Control(_) => true,
        FieldKind::Data(subfields) => !subfields.is_empty(),
    });
}

fn clean_field(field: &mut Field) {
    if let Some(subfields) = field.subfields_mut() {
        subfields.retain(keep_subfield);
        for subfield in subfields.iter_mut() {
            if subfield.xref.is_some() {
                continue;
            }
            if let Some(value) = subfield.value.as_mut() {
                if is_dash_only(value) {
                    *value = value.replace('-', "_");
                }
            }
        }
    }

    if field.ind1 == '_' {
        field.ind1 = ' ';
    }
    if field.ind2 == '_' {
        field.ind2 = ' ';
    }
}

fn keep_subfield(subfield: &Subfield) -> bool {
    match &subfield.value {
        None => false,
        Some(_) if subfield.xref.is_some() => true,
        Some(value) => !value.trim().is_empty(),
    }
}

fn is_dash_only(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c == '-')
}
