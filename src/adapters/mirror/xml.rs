//! MARCXML exchange format
//!
//! [`to_marcxml`] renders a record for submission. [`MirrorRecordReader`] is a
//! pull parser over a search response: it yields mirror records one at a time
//! and cannot be rewound.

use crate::domain::{Field, FieldKind, MirrorRecord, Result, Subfield, SyncError};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

/// Renders fields as a single MARCXML `<record>`
///
/// A data field holding cross-referenced subfields gets a trailing `$0`
/// carrying `xref_prefix` and the linked record id.
pub fn to_marcxml(fields: &[Field], xref_prefix: &str) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    write_record(&mut writer, fields, xref_prefix)?;
    String::from_utf8(writer.into_inner()).map_err(|e| SyncError::Xml(e.to_string()))
}

/// Wraps several records in a `<collection>`
pub fn to_marcxml_collection<'a, I>(records: I, xref_prefix: &str) -> Result<String>
where
    I: IntoIterator<Item = &'a [Field]>,
{
    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Start(BytesStart::new("collection")))?;
    for fields in records {
        write_record(&mut writer, fields, xref_prefix)?;
    }
    writer.write_event(Event::End(BytesEnd::new("collection")))?;
    String::from_utf8(writer.into_inner()).map_err(|e| SyncError::Xml(e.to_string()))
}

fn write_record(writer: &mut Writer<Vec<u8>>, fields: &[Field], xref_prefix: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new("record")))?;

    for field in fields {
        match &field.kind {
            FieldKind::Control(value) => {
                let mut start = BytesStart::new("controlfield");
                start.push_attribute(("tag", field.tag.as_str()));
                writer.write_event(Event::Start(start))?;
                writer.write_event(Event::Text(BytesText::new(&xml_safe(value))))?;
                writer.write_event(Event::End(BytesEnd::new("controlfield")))?;
            }
            FieldKind::Data(subfields) => {
                let ind1 = field.ind1.to_string();
                let ind2 = field.ind2.to_string();
                let mut start = BytesStart::new("datafield");
                start.push_attribute(("tag", field.tag.as_str()));
                start.push_attribute(("ind1", ind1.as_str()));
                start.push_attribute(("ind2", ind2.as_str()));
                writer.write_event(Event::Start(start))?;

                for subfield in subfields {
                    if let Some(value) = &subfield.value {
                        write_subfield(writer, subfield.code, value)?;
                    }
                }
                if let Some(xref) = subfields.iter().find_map(|s| s.xref) {
                    write_subfield(writer, '0', &format!("{xref_prefix}{}", xref.id))?;
                }

                writer.write_event(Event::End(BytesEnd::new("datafield")))?;
            }
        }
    }

    writer.write_event(Event::End(BytesEnd::new("record")))?;
    Ok(())
}

fn write_subfield(writer: &mut Writer<Vec<u8>>, code: char, value: &str) -> Result<()> {
    let code = code.to_string();
    let mut start = BytesStart::new("subfield");
    start.push_attribute(("code", code.as_str()));
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(&xml_safe(value))))?;
    writer.write_event(Event::End(BytesEnd::new("subfield")))?;
    Ok(())
}

/// Drops control characters XML 1.0 cannot carry
fn xml_safe(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect()
}

/// Lazy reader over the `<record>` elements of a search response
///
/// Namespaces are ignored; elements are matched by local name.
pub struct MirrorRecordReader<'a> {
    reader: Reader<&'a [u8]>,
    finished: bool,
}

impl<'a> MirrorRecordReader<'a> {
    pub fn new(xml: &'a str) -> Self {
        Self {
            reader: Reader::from_str(xml),
            finished: false,
        }
    }

    fn next_record(&mut self) -> Result<Option<MirrorRecord>> {
        let mut fields: Option<Vec<Field>> = None;
        let mut control_tag: Option<String> = None;
        let mut data_field: Option<Field> = None;
        let mut subfield_code: Option<char> = None;
        let mut text = String::new();

        loop {
            match self.reader.read_event()? {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"record" => fields = Some(Vec::new()),
                    b"controlfield" => {
                        control_tag = Some(attribute(&e, "tag")?.unwrap_or_default());
                        text.clear();
                    }
                    b"datafield" => data_field = Some(start_datafield(&e)?),
                    b"subfield" => {
                        subfield_code = Some(subfield_code_of(&e)?);
                        text.clear();
                    }
                    _ => {}
                },
                Event::Empty(e) => match e.local_name().as_ref() {
                    b"record" => return Ok(Some(MirrorRecord::new(Vec::new()))),
                    b"controlfield" => {
                        if let Some(fields) = fields.as_mut() {
                            let tag = attribute(&e, "tag")?.unwrap_or_default();
                            fields.push(Field::control(tag, String::new()));
                        }
                    }
                    b"datafield" => {
                        if let Some(fields) = fields.as_mut() {
                            fields.push(start_datafield(&e)?);
                        }
                    }
                    b"subfield" => {
                        let code = subfield_code_of(&e)?;
                        if let Some(subfields) = data_field.as_mut().and_then(|f| f.subfields_mut()) {
                            subfields.push(Subfield::new(code, String::new()));
                        }
                    }
                    _ => {}
                },
                Event::Text(t) => {
                    if control_tag.is_some() || subfield_code.is_some() {
                        text.push_str(&t.unescape()?);
                    }
                }
                Event::CData(c) => {
                    if control_tag.is_some() || subfield_code.is_some() {
                        text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                    }
                }
                Event::End(e) => match e.local_name().as_ref() {
                    b"controlfield" => {
                        if let (Some(tag), Some(fields)) = (control_tag.take(), fields.as_mut()) {
                            fields.push(Field::control(tag, std::mem::take(&mut text)));
                        }
                    }
                    b"subfield" => {
                        if let Some(code) = subfield_code.take() {
                            if let Some(subfields) =
                                data_field.as_mut().and_then(|f| f.subfields_mut())
                            {
                                subfields.push(Subfield::new(code, std::mem::take(&mut text)));
                            }
                        }
                    }
                    b"datafield" => {
                        if let (Some(field), Some(fields)) = (data_field.take(), fields.as_mut()) {
                            fields.push(field);
                        }
                    }
                    b"record" => {
                        if let Some(fields) = fields.take() {
                            return Ok(Some(MirrorRecord::new(fields)));
                        }
                    }
                    _ => {}
                },
                Event::Eof => {
                    if fields.is_some() {
                        return Err(SyncError::Xml(
                            "Search response ended inside a record".to_string(),
                        ));
                    }
                    return Ok(None);
                }
                _ => {}
            }
        }
    }
}

impl Iterator for MirrorRecordReader<'_> {
    type Item = Result<MirrorRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

fn attribute(e: &BytesStart<'_>, name: &str) -> Result<Option<String>> {
    match e
        .try_get_attribute(name)
        .map_err(|err| SyncError::Xml(err.to_string()))?
    {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

fn indicator(value: Option<String>) -> char {
    value.and_then(|v| v.chars().next()).unwrap_or(' ')
}

fn start_datafield(e: &BytesStart<'_>) -> Result<Field> {
    let tag = attribute(e, "tag")?
        .ok_or_else(|| SyncError::Xml("datafield without tag".to_string()))?;
    Ok(Field::data(
        tag,
        indicator(attribute(e, "ind1")?),
        indicator(attribute(e, "ind2")?),
        Vec::new(),
    ))
}

fn subfield_code_of(e: &BytesStart<'_>) -> Result<char> {
    attribute(e, "code")?
        .and_then(|c| c.chars().next())
        .ok_or_else(|| SyncError::Xml("subfield without code".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MarcFields, RecordId, RecordRef};

    const SEARCH_RESPONSE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<response>
  <search_id>abc</search_id>
  <collection xmlns="http://www.loc.gov/MARC21/slim">
    <record>
      <controlfield tag="001">900</controlfield>
      <controlfield tag="005">20240301120000.0</controlfield>
      <datafield tag="035" ind1=" " ind2=" ">
        <subfield code="a">(DHL)123</subfield>
      </datafield>
      <datafield tag="245" ind1="1" ind2="0">
        <subfield code="a">Peace &amp; security</subfield>
      </datafield>
    </record>
    <record>
      <datafield tag="035" ind1=" " ind2=" ">
        <subfield code="a">(DHL)456</subfield>
      </datafield>
      <datafield tag="500" ind1="" ind2="">
        <subfield code="a"/>
      </datafield>
    </record>
  </collection>
</response>"#;

    #[test]
    fn test_reader_yields_records_lazily() {
        let mut reader = MirrorRecordReader::new(SEARCH_RESPONSE);

        let first = reader.next().unwrap().unwrap();
        assert_eq!(first.id, Some(RecordId::new(123)));
        assert_eq!(first.marker(), Some("20240301120000.0"));
        assert_eq!(first.get_value("245", 'a'), Some("Peace & security"));

        let second = reader.next().unwrap().unwrap();
        assert_eq!(second.id, Some(RecordId::new(456)));
        let note = second.get_field("500").unwrap();
        assert_eq!((note.ind1, note.ind2), (' ', ' '));
        assert_eq!(note.get_value('a'), Some(""));

        assert!(reader.next().is_none());
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_reader_empty_collection() {
        let reader = MirrorRecordReader::new("<response><collection/></response>");
        assert_eq!(reader.count(), 0);
    }

    #[test]
    fn test_reader_truncated_response() {
        let mut reader = MirrorRecordReader::new("<collection><record><controlfield tag=\"001\">1");
        assert!(reader.next().unwrap().is_err());
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_marcxml_round_trip_with_xref() {
        let fields = vec![
            Field::control("008", "800101"),
            Field::data(
                "650",
                ' ',
                '7',
                vec![Subfield::linked(
                    'a',
                    Some("PEACE <keeping>".to_string()),
                    RecordRef::new(77),
                )],
            ),
        ];

        let xml = to_marcxml(&fields, "(DHLAUTH)").unwrap();
        assert!(xml.contains("&lt;keeping&gt;"));
        assert!(xml.contains("<subfield code=\"0\">(DHLAUTH)77</subfield>"));

        let parsed = MirrorRecordReader::new(&xml).next().unwrap().unwrap();
        assert_eq!(parsed.get_value("650", 'a'), Some("PEACE <keeping>"));
        assert_eq!(parsed.get_value("650", '0'), Some("(DHLAUTH)77"));
        assert_eq!(parsed.control_value("008"), Some("800101"));
    }

    #[test]
    fn test_collection_wrapper() {
        let a = vec![Field::control("001", "1")];
        let b = vec![Field::control("001", "2")];
        let xml = to_marcxml_collection([a.as_slice(), b.as_slice()], "(DHLAUTH)").unwrap();
        assert!(xml.starts_with("<collection>"));
        assert_eq!(MirrorRecordReader::new(&xml).count(), 2);
    }
}
