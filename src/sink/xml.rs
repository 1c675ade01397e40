use crate::error::SinkError;
use crate::models::Record;
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use serde_json::Value;
use std::io::Write;

const ROOT_ELEMENT: &str = "root";
const ENTRY_ELEMENT: &str = "entry";

/// Text form of a field value. Type information is not preserved.
fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn xml_err(err: impl std::fmt::Display) -> SinkError {
    SinkError::Xml(err.to_string())
}

/// Write records as `<root><entry><field>value</field>...</entry>...</root>`.
pub fn write_records(records: &[Record], writer: &mut impl Write) -> Result<(), SinkError> {
    let mut xml = Writer::new_with_indent(&mut *writer, b' ', 2);

    xml.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(xml_err)?;
    xml.write_event(Event::Start(BytesStart::new(ROOT_ELEMENT)))
        .map_err(xml_err)?;

    for record in records {
        xml.write_event(Event::Start(BytesStart::new(ENTRY_ELEMENT)))
            .map_err(xml_err)?;
        for (key, value) in record {
            let text = text_of(value);
            xml.write_event(Event::Start(BytesStart::new(key.as_str())))
                .map_err(xml_err)?;
            xml.write_event(Event::Text(BytesText::new(&text)))
                .map_err(xml_err)?;
            xml.write_event(Event::End(BytesEnd::new(key.as_str())))
                .map_err(xml_err)?;
        }
        xml.write_event(Event::End(BytesEnd::new(ENTRY_ELEMENT)))
            .map_err(xml_err)?;
    }

    xml.write_event(Event::End(BytesEnd::new(ROOT_ELEMENT)))
        .map_err(xml_err)?;
    writer.write_all(b"\n")?;
    Ok(())
}

/// Read-back helper: parse an export into `(field, text)` pairs per entry, in
/// document order. The export run itself never parses XML; this exists for
/// checking written files.
pub fn read_entries(xml: &str) -> Result<Vec<Vec<(String, String)>>, SinkError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<Vec<(String, String)>> = None;
    let mut field: Option<(String, String)> = None;

    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if name == ENTRY_ELEMENT && current.is_none() {
                    current = Some(Vec::new());
                } else if current.is_some() {
                    field = Some((name, String::new()));
                }
            }
            Event::Empty(e) => {
                if let Some(entry) = current.as_mut() {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    entry.push((name, String::new()));
                }
            }
            Event::Text(e) => {
                if let Some((_, text)) = field.as_mut() {
                    text.push_str(&e.unescape().map_err(xml_err)?);
                }
            }
            Event::End(_) => {
                if let Some(done) = field.take() {
                    if let Some(entry) = current.as_mut() {
                        entry.push(done);
                    }
                } else if let Some(entry) = current.take() {
                    entries.push(entry);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn escapes_markup_in_values() {
        let record = json!({"room_name": "A & <B>"})
            .as_object()
            .cloned()
            .expect("object");
        let mut out = Vec::new();
        write_records(&[record], &mut out).expect("write");

        let text = String::from_utf8(out).expect("utf-8");
        assert!(text.contains("A &amp; &lt;B&gt;"));

        let entries = read_entries(&text).expect("parse");
        assert_eq!(entries[0][0].1, "A & <B>");
    }

    #[test]
    fn null_becomes_empty_text() {
        let record = json!({"room_id": 4, "room_name": null})
            .as_object()
            .cloned()
            .expect("object");
        let mut out = Vec::new();
        write_records(&[record], &mut out).expect("write");

        let entries = read_entries(std::str::from_utf8(&out).expect("utf-8")).expect("parse");
        assert_eq!(
            entries[0],
            vec![
                ("room_id".to_string(), "4".to_string()),
                ("room_name".to_string(), String::new()),
            ]
        );
    }
}
