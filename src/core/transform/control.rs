//! Control number and record status fields

use crate::domain::{Field, MarcFields, Record, RecordType, Subfield};

/// Authority type written to 980 for a heading tag
pub fn authority_type(heading_tag: &str) -> Option<&'static str> {
    match heading_tag {
        "100" => Some("PERSONAL"),
        "110" => Some("CORPORATE"),
        "111" => Some("MEETING"),
        "130" => Some("UNIFORM"),
        "150" => Some("TOPICAL"),
        "151" => Some("GEOGRAPHIC"),
        "190" => Some("SYMBOL"),
        "191" => Some("AGENDA"),
        _ => None,
    }
}

/// Removes every 001 and the 005 control field
pub fn strip_internal_controls(record: &mut Record) {
    record.remove_tag("001");
    record.remove_tag("005");
}

/// Rewrites existing 035 fields and appends the mirror control number
///
/// Each existing `$a` becomes `<id>X`, keeping a leading capital letter of
/// the old value as prefix; the old value moves to `$z`.
pub fn rewrite_control_numbers(record: &mut Record) {
    let id = record.id;
    for field in record.fields.iter_mut().filter(|f| f.tag == "035") {
        let Some(previous) = field.get_value('a').map(str::to_string) else {
            continue;
        };

        let mut rewritten = format!("{id}X");
        if let Some(prefix) = previous.chars().next().filter(char::is_ascii_uppercase) {
            rewritten.insert(0, prefix);
        }

        field.set_subfield('a', rewritten);
        field.set_subfield('z', previous);
    }

    let control_number = record.mirror_control_number();
    record.push(Field::data(
        "035",
        ' ',
        ' ',
        vec![Subfield::new('a', control_number)],
    ));
}

/// Adds the 980 status fields unless the record is a tombstone
pub fn set_record_status(record: &mut Record) {
    if record.is_tombstone() {
        return;
    }

    match record.record_type {
        RecordType::Bib => record.set("980", 'a', "BIB"),
        RecordType::Auth => {
            record.set("980", 'a', "AUTHORITY");

            let heading = record
                .heading_field()
                .map(|f| (f.tag.clone(), f.get_value('9') == Some("ms")));

            if let Some((tag, member)) = heading {
                if let Some(kind) = authority_type(&tag) {
                    record.push(status_field(kind));
                    if tag == "110" && member {
                        record.push(status_field("MEMBER"));
                    }
                }
            }
        }
    }
}

fn status_field(value: &str) -> Field {
    Field::data("980", ' ', ' ', vec![Subfield::new('a', value)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RecordId, DELETED_STATUS};
    use chrono::Utc;
    use test_case::test_case;

    #[test]
    fn test_control_numbers_rewritten() {
        let mut record = Record::new(RecordType::Bib, 123)
            .with_field(Field::data("035", ' ', ' ', vec![Subfield::new('a', "Q456")]))
            .with_field(Field::data("035", ' ', ' ', vec![Subfield::new('a', "(OCoLC)9")]));

        rewrite_control_numbers(&mut record);

        let fields: Vec<&Field> = record.get_fields("035").collect();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0].get_value('a'), Some("Q123X"));
        assert_eq!(fields[0].get_value('z'), Some("Q456"));
        assert_eq!(fields[1].get_value('a'), Some("123X"));
        assert_eq!(fields[1].get_value('z'), Some("(OCoLC)9"));
        assert_eq!(fields[2].get_value('a'), Some("(DHL)123"));
    }

    #[test]
    fn test_auth_control_prefix() {
        let mut record = Record::new(RecordType::Auth, 7);
        rewrite_control_numbers(&mut record);
        assert_eq!(record.get_value("035", 'a'), Some("(DHLAUTH)7"));
    }

    #[test_case("100", &["AUTHORITY", "PERSONAL"])]
    #[test_case("151", &["AUTHORITY", "GEOGRAPHIC"])]
    #[test_case("191", &["AUTHORITY", "AGENDA"])]
    #[test_case("180", &["AUTHORITY"])]
    fn test_authority_status(tag: &str, expected: &[&str]) {
        let mut record = Record::new(RecordType::Auth, 1)
            .with_field(Field::data(tag, ' ', ' ', vec![Subfield::new('a', "Heading")]));

        set_record_status(&mut record);

        assert_eq!(record.get_values("980", 'a'), expected.to_vec());
    }

    #[test]
    fn test_member_state_classification() {
        let mut record = Record::new(RecordType::Auth, 1).with_field(Field::data(
            "110",
            '1',
            ' ',
            vec![Subfield::new('a', "Ghana"), Subfield::new('9', "ms")],
        ));

        set_record_status(&mut record);

        assert_eq!(
            record.get_values("980", 'a'),
            vec!["AUTHORITY", "CORPORATE", "MEMBER"]
        );
    }

    #[test]
    fn test_tombstone_keeps_deleted_status() {
        let mut record = Record::tombstone(RecordType::Bib, RecordId::new(5), Utc::now());
        set_record_status(&mut record);
        assert_eq!(record.get_values("980", 'a'), vec![DELETED_STATUS]);
    }

    #[test]
    fn test_internal_controls_stripped() {
        let mut record = Record::new(RecordType::Bib, 1)
            .with_field(Field::control("001", "1"))
            .with_field(Field::control("001", "1"))
            .with_field(Field::control("005", "20240101"))
            .with_field(Field::control("008", "x"));

        strip_internal_controls(&mut record);

        assert_eq!(record.fields.len(), 1);
        assert_eq!(record.fields[0].tag, "008");
    }
}
