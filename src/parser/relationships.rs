//! Workbook-level parts: relationships, sheet list, defined names and shared strings.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{BufReader, Read, Seek};
use zip::ZipArchive;

use crate::error::Result;

/// Paths of the workbook parts we read, resolved to full archive paths.
#[derive(Default, Debug)]
pub(super) struct WorkbookRelationships {
    /// rId -> archive path, e.g. "rId1" -> "xl/worksheets/sheet1.xml"
    pub worksheets: HashMap<String, String>,
    pub shared_strings: Option<String>,
    pub styles: Option<String>,
}

/// A worksheet entry from xl/workbook.xml.
#[derive(Debug, Clone)]
pub(super) struct SheetInfo {
    pub name: String,
    pub path: String,
}

/// A `<definedName>`; `local_sheet` is the sheet position for sheet-scoped names.
#[derive(Debug, Clone)]
pub(super) struct DefinedName {
    pub name: String,
    pub local_sheet: Option<usize>,
    pub formula: String,
}

#[derive(Debug, Default)]
pub(super) struct WorkbookInfo {
    pub sheets: Vec<SheetInfo>,
    pub defined_names: Vec<DefinedName>,
    pub date1904: bool,
}

fn attr_string(value: &[u8]) -> String {
    std::str::from_utf8(value).unwrap_or("").to_string()
}

/// Parse xl/_rels/workbook.xml.rels. The part is optional.
pub(super) fn parse_workbook_relationships<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
) -> WorkbookRelationships {
    let mut rels = WorkbookRelationships::default();

    let Ok(file) = archive.by_name("xl/_rels/workbook.xml.rels") else {
        return rels;
    };

    let mut xml = Reader::from_reader(BufReader::new(file));
    xml.trim_text(true);
    let mut buf = Vec::new();

    loop {
        match xml.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e) | Event::Start(ref e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let mut id = String::new();
                let mut target = String::new();
                let mut rel_type = String::new();

                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"Id" => id = attr_string(&attr.value),
                        b"Target" => target = attr_string(&attr.value),
                        b"Type" => rel_type = attr_string(&attr.value),
                        _ => {}
                    }
                }

                let full_path = match target.strip_prefix('/') {
                    Some(stripped) => stripped.to_string(),
                    None => format!("xl/{target}"),
                };

                if rel_type.ends_with("/worksheet") && !id.is_empty() && !target.is_empty() {
                    rels.worksheets.insert(id, full_path);
                } else if rel_type.ends_with("/sharedStrings") {
                    rels.shared_strings = Some(full_path);
                } else if rel_type.ends_with("/styles") {
                    rels.styles = Some(full_path);
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    rels
}

/// Read sheet names, sheet paths, defined names and the date1904 flag from xl/workbook.xml.
pub(super) fn parse_workbook_info<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    relationships: &HashMap<String, String>,
) -> Result<WorkbookInfo> {
    let file = archive.by_name("xl/workbook.xml")?;

    let mut xml = Reader::from_reader(BufReader::new(file));
    xml.trim_text(true);

    let mut info = WorkbookInfo::default();
    let mut buf = Vec::new();
    let mut current_name: Option<DefinedName> = None;

    loop {
        match xml.read_event_into(&mut buf)? {
            Event::Empty(ref e) | Event::Start(ref e) => match e.local_name().as_ref() {
                b"workbookPr" => {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"date1904" {
                            let val = attr_string(&attr.value);
                            info.date1904 = val == "1" || val.eq_ignore_ascii_case("true");
                        }
                    }
                }
                b"sheet" => {
                    let mut name = String::new();
                    let mut r_id = String::new();
                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"name" => name = attr_string(&attr.value),
                            key if key.ends_with(b":id") || key == b"id" => {
                                r_id = attr_string(&attr.value);
                            }
                            _ => {}
                        }
                    }
                    if !name.is_empty() {
                        let path = relationships.get(&r_id).cloned().unwrap_or_else(|| {
                            format!("xl/worksheets/sheet{}.xml", info.sheets.len() + 1)
                        });
                        info.sheets.push(SheetInfo { name, path });
                    }
                }
                b"definedName" => {
                    let mut defined = DefinedName {
                        name: String::new(),
                        local_sheet: None,
                        formula: String::new(),
                    };
                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"name" => defined.name = attr_string(&attr.value),
                            b"localSheetId" => {
                                defined.local_sheet = attr_string(&attr.value).parse().ok();
                            }
                            _ => {}
                        }
                    }
                    current_name = Some(defined);
                }
                _ => {}
            },
            Event::Text(ref e) => {
                if let Some(defined) = current_name.as_mut() {
                    defined.formula.push_str(&e.unescape()?);
                }
            }
            Event::End(ref e) if e.local_name().as_ref() == b"definedName" => {
                if let Some(defined) = current_name.take() {
                    if !defined.name.is_empty() {
                        info.defined_names.push(defined);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(info)
}

/// Parse the shared string table. Rich-text runs are concatenated; phonetic runs are skipped.
pub(super) fn parse_shared_strings<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    path: Option<&str>,
) -> Vec<String> {
    let sst_path = path.unwrap_or("xl/sharedStrings.xml");
    let Ok(file) = archive.by_name(sst_path) else {
        return Vec::new();
    };

    let mut xml = Reader::from_reader(BufReader::new(file));
    xml.trim_text(false);

    let mut strings = Vec::new();
    let mut buf = Vec::new();
    let mut current = String::new();
    let mut in_si = false;
    let mut in_t = false;
    let mut in_phonetic = false;

    loop {
        match xml.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"si" => {
                    in_si = true;
                    current.clear();
                }
                b"rPh" => in_phonetic = true,
                b"t" if in_si && !in_phonetic => in_t = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"si" => {
                strings.push(String::new());
            }
            Ok(Event::Text(ref e)) if in_t => {
                if let Ok(text) = e.unescape() {
                    current.push_str(&text);
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"si" => {
                    strings.push(std::mem::take(&mut current));
                    in_si = false;
                }
                b"rPh" => in_phonetic = false,
                b"t" => in_t = false,
                _ => {}
            },
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    strings
}
