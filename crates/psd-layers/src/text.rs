/*
 * Copyright (c) 2024.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! Text layer payload extraction
//!
//! A type-tool chunk carries the display text twice: as a plain string
//! in the text descriptor and again inside the engine-data blob with
//! full per-run styling. The extractor prefers the styled form and
//! degrades to a single default-styled run covering the plain string
//! when the blob fails to parse.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use psd_core::value::Value;

use crate::engine_data;
use crate::errors::Warning;

/// One same-styled span of a text layer.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text:      String,
    pub font_name: String,
    /// Point size.
    pub size:      f64,
    /// RGBA, each component in 0..=1.
    pub color:     [f64; 4],
    pub bold:      bool,
    pub italic:    bool
}

impl Default for TextRun {
    fn default() -> TextRun {
        TextRun {
            text:      String::new(),
            font_name: String::new(),
            size:      12.0,
            color:     [0.0, 0.0, 0.0, 1.0],
            bold:      false,
            italic:    false
        }
    }
}

/// Paragraph justification saved with the first paragraph.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum Alignment {
    #[default]
    Left,
    Right,
    Center,
    Justify
}

/// Everything extracted from one text layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextInfo {
    /// The full text, as stored in the type-tool descriptor.
    pub text:      String,
    pub runs:      Vec<TextRun>,
    pub alignment: Alignment
}

/// Extract text info from a decoded `TySh` chunk value.
///
/// Returns `None` when the value carries no text descriptor at all.
pub fn extract(tysh: &Value, warnings: &mut Vec<Warning>) -> Option<TextInfo> {
    let descriptor = tysh.get("text").and_then(Value::as_descriptor)?;

    let text = descriptor
        .get("Txt ")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut info = TextInfo {
        text: text.clone(),
        runs: Vec::new(),
        alignment: Alignment::Left
    };

    let engine = descriptor.get("EngineData").and_then(Value::as_bytes);

    match engine.map(engine_data::parse) {
        Some(Ok(parsed)) => {
            info.runs = styled_runs(&parsed, &text);
            info.alignment = paragraph_alignment(&parsed);
        }
        Some(Err(error)) => {
            warnings.push(Warning::EngineDataParse {
                position: error.position,
                message:  error.message
            });
        }
        None => {}
    }

    if info.runs.is_empty() {
        info.runs.push(TextRun {
            text,
            ..TextRun::default()
        });
    }

    Some(info)
}

fn editor_text(parsed: &Value) -> Option<&str> {
    parsed
        .get("EngineDict")
        .and_then(|d| d.get("Editor"))
        .and_then(|d| d.get("Text"))
        .and_then(Value::as_str)
}

/// Font names live in a separate resource table indexed by the style
/// sheets.
fn font_names(parsed: &Value) -> Vec<String> {
    let Some(fonts) = parsed
        .get("ResourceDict")
        .and_then(|d| d.get("FontSet"))
        .and_then(Value::as_list)
    else {
        return Vec::new();
    };

    fonts
        .iter()
        .map(|font| {
            font.get("Name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        })
        .collect()
}

fn style_color(sheet: &Value) -> [f64; 4] {
    let values = sheet
        .get("FillColor")
        .and_then(|color| color.get("Values"))
        .and_then(Value::as_list);

    let Some(values) = values else {
        return [0.0, 0.0, 0.0, 1.0];
    };

    // stored ARGB, surfaced RGBA
    let component = |i: usize| values.get(i).and_then(Value::as_double).unwrap_or(0.0);

    [component(1), component(2), component(3), component(0)]
}

fn run_from_sheet(text: String, sheet: &Value, fonts: &[String]) -> TextRun {
    let data = sheet.get("StyleSheetData").unwrap_or(sheet);

    let font_name = data
        .get("Font")
        .and_then(Value::as_int)
        .and_then(|index| fonts.get(index.max(0) as usize))
        .cloned()
        .unwrap_or_default();

    TextRun {
        text,
        font_name,
        size: data.get("FontSize").and_then(Value::as_double).unwrap_or(12.0),
        color: style_color(data),
        bold: data
            .get("FauxBold")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        italic: data
            .get("FauxItalic")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Slice the editor text into runs using the style run-length table.
fn styled_runs(parsed: &Value, fallback_text: &str) -> Vec<TextRun> {
    let text = editor_text(parsed).unwrap_or(fallback_text);
    let fonts = font_names(parsed);

    let style_run = parsed.get("EngineDict").and_then(|d| d.get("StyleRun"));

    let Some(style_run) = style_run else {
        return Vec::new();
    };

    let lengths: Vec<usize> = style_run
        .get("RunLengthArray")
        .and_then(Value::as_list)
        .map(|list| {
            list.iter()
                .filter_map(Value::as_int)
                .map(|length| length.max(0) as usize)
                .collect()
        })
        .unwrap_or_default();

    let Some(sheets) = style_run.get("RunArray").and_then(Value::as_list) else {
        return Vec::new();
    };

    let characters: Vec<char> = text.chars().collect();
    let mut offset = 0;
    let mut runs = Vec::with_capacity(sheets.len());

    for (run_index, sheet) in sheets.iter().enumerate() {
        let length = lengths
            .get(run_index)
            .copied()
            .unwrap_or(characters.len().saturating_sub(offset));
        let end = (offset + length).min(characters.len());
        let span: String = characters[offset..end].iter().collect();
        offset = end;

        runs.push(run_from_sheet(span, sheet, &fonts));
    }
    runs
}

fn paragraph_alignment(parsed: &Value) -> Alignment {
    let justification = parsed
        .get("EngineDict")
        .and_then(|d| d.get("ParagraphRun"))
        .and_then(|d| d.get("RunArray"))
        .and_then(Value::as_list)
        .and_then(|runs| runs.first())
        .and_then(|run| run.get("ParagraphSheet"))
        .and_then(|sheet| sheet.get("Properties"))
        .and_then(|properties| properties.get("Justification"))
        .and_then(Value::as_int);

    match justification {
        Some(1) => Alignment::Right,
        Some(2) => Alignment::Center,
        Some(3 | 4 | 5 | 6) => Alignment::Justify,
        _ => Alignment::Left
    }
}

#[cfg(test)]
mod tests {
    use alloc::boxed::Box;
    use alloc::vec;

    use psd_core::value::Descriptor;

    use super::*;

    fn tysh_with(text: &str, engine: Option<Vec<u8>>) -> Value {
        let mut entries = vec![("Txt ".to_string(), Value::String(text.into()))];

        if let Some(engine) = engine {
            entries.push(("EngineData".to_string(), Value::Bytes(engine)));
        }

        Value::Map(vec![(
            "text".to_string(),
            Value::Descriptor(Box::new(Descriptor {
                class_id: "TxLr".to_string(),
                entries
            }))
        )])
    }

    #[test]
    fn missing_engine_data_yields_fallback_run() {
        let mut warnings = vec![];

        let info = extract(&tysh_with("Hello", None), &mut warnings).unwrap();

        assert_eq!(info.text, "Hello");
        assert_eq!(info.runs.len(), 1);
        assert_eq!(info.runs[0].text, "Hello");
        assert_eq!(info.runs[0].size, 12.0);
        assert!(warnings.is_empty());
    }

    #[test]
    fn broken_engine_data_degrades_with_warning() {
        let mut warnings = vec![];

        let info = extract(
            &tysh_with("Hi", Some(b"<</Unterminated (".to_vec())),
            &mut warnings
        )
        .unwrap();

        assert_eq!(info.runs.len(), 1);
        assert_eq!(info.runs[0].text, "Hi");
        assert!(matches!(warnings[0], Warning::EngineDataParse { .. }));
    }

    #[test]
    fn style_runs_slice_the_text() {
        let engine = b"<<\
            /EngineDict <<\
                /Editor << /Text (HiThere) >>\
                /StyleRun <<\
                    /RunLengthArray [ 2 5 ]\
                    /RunArray [\
                        << /StyleSheetData << /FontSize 24.0 /FauxBold true >> >>\
                        << /StyleSheetData << /FontSize 10.0 >> >>\
                    ]\
                >>\
            >>\
        >>";
        let mut warnings = vec![];

        let info = extract(&tysh_with("HiThere", Some(engine.to_vec())), &mut warnings).unwrap();

        assert!(warnings.is_empty());
        assert_eq!(info.runs.len(), 2);
        assert_eq!(info.runs[0].text, "Hi");
        assert_eq!(info.runs[0].size, 24.0);
        assert!(info.runs[0].bold);
        assert_eq!(info.runs[1].text, "There");
        assert_eq!(info.runs[1].size, 10.0);
    }

    #[test]
    fn paragraph_justification_maps_to_alignment() {
        let engine = b"<<\
            /EngineDict <<\
                /Editor << /Text (x) >>\
                /ParagraphRun <<\
                    /RunArray [\
                        << /ParagraphSheet << /Properties << /Justification 2 >> >> >>\
                    ]\
                >>\
            >>\
        >>";
        let mut warnings = vec![];

        let info = extract(&tysh_with("x", Some(engine.to_vec())), &mut warnings).unwrap();

        assert_eq!(info.alignment, Alignment::Center);
    }
}
