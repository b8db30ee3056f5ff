#![allow(dead_code)]

use std::path::Path;

use bookref_core::config::PipelineConfig;
use bookref_core::contract::FetchedResponse;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

pub const BASE_URL: &str = "https://example.org";

pub fn config_for(output_dir: &Path) -> PipelineConfig {
    PipelineConfig {
        base_url: BASE_URL.to_string(),
        output_dir: output_dir.to_path_buf(),
        concurrency: 4,
        ..PipelineConfig::default()
    }
}

pub fn index_url(entity_id: &str) -> String {
    format!("{BASE_URL}/projects/{entity_id}/documents?searchTerm=book+of+reference")
}

pub fn html(body: &str) -> FetchedResponse {
    FetchedResponse {
        status: 200,
        content_type: Some("text/html; charset=utf-8".to_string()),
        body: format!("<html><body>{body}</body></html>").into_bytes(),
    }
}

pub fn pdf(bytes: Vec<u8>) -> FetchedResponse {
    FetchedResponse {
        status: 200,
        content_type: Some("application/pdf".to_string()),
        body: bytes,
    }
}

/// Builds a PDF from raw page operations; `resources` adds whatever objects
/// the pages need and returns the resource dictionary they share.
pub fn pdf_from_operations(
    pages: Vec<Vec<Operation>>,
    resources: impl FnOnce(&mut Document) -> Dictionary,
) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let resources = resources(&mut doc);
    let resources_id = doc.add_object(resources);

    let mut kids: Vec<Object> = Vec::new();
    for operations in pages {
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

fn courier(doc: &mut Document) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    })
}

/// A Word-style composite font: `Identity-H`, optionally with a `ToUnicode` map.
fn composite_font(doc: &mut Document, to_unicode: Option<&str>) -> ObjectId {
    let descendant = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType2",
        "BaseFont" => "Calibri",
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("Identity"),
            "Supplement" => 0,
        },
    });
    let mut font = dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => "Calibri",
        "Encoding" => "Identity-H",
        "DescendantFonts" => vec![descendant.into()],
    };
    if let Some(cmap) = to_unicode {
        let cmap_id = doc.add_object(Stream::new(dictionary! {}, cmap.as_bytes().to_vec()));
        font.set("ToUnicode", cmap_id);
    }
    doc.add_object(font)
}

/// Identity mapping for printable ASCII as two-byte codes.
pub const ASCII_TO_UNICODE: &str = "/CIDInit /ProcSet findresource begin\n\
    12 dict begin\nbegincmap\n\
    1 begincodespacerange <0000> <FFFF> endcodespacerange\n\
    1 beginbfrange <0020> <007E> <0020> endbfrange\n\
    endcmap\nend\nend";

/// Encodes ASCII text as two-byte codes for a composite font.
pub fn two_byte(text: &str) -> Object {
    let bytes = text.bytes().flat_map(|b| [0, b]).collect();
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// One `BT ... ET` block showing `text` with `font` at line `i`.
pub fn text_block(font: &str, i: usize, text: Object) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![font.into(), 12.into()]),
        Operation::new("Td", vec![50.into(), (780 - 16 * i as i64).into()]),
        Operation::new("Tj", vec![text]),
        Operation::new("ET", vec![]),
    ]
}

fn line_blocks(lines: &[&str]) -> Vec<Operation> {
    lines
        .iter()
        .enumerate()
        .flat_map(|(i, line)| text_block("F1", i, Object::string_literal(format!("{line} "))))
        .collect()
}

/// Builds a PDF with one page per entry; each line becomes its own text block.
pub fn pdf_with_pages(pages: &[&[&str]]) -> Vec<u8> {
    pdf_from_operations(pages.iter().map(|lines| line_blocks(lines)).collect(), |doc| {
        let font_id = courier(doc);
        dictionary! { "Font" => dictionary! { "F1" => font_id } }
    })
}

/// Page 1 draws its category 3 text only through a Form XObject.
pub fn form_xobject_pdf() -> Vec<u8> {
    let page_1 = vec![
        Operation::new("q", vec![]),
        Operation::new("Do", vec!["X1".into()]),
        Operation::new("Q", vec![]),
    ];
    pdf_from_operations(vec![page_1, line_blocks(&["Schedule of plots"])], |doc| {
        let font_id = courier(doc);
        let fonts = dictionary! { "F1" => font_id };
        let form = Content {
            operations: line_blocks(&["Category 3", "SW1A 1AA", "M1 1AE"]),
        };
        let form_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
                "Resources" => dictionary! { "Font" => fonts.clone() },
            },
            form.encode().unwrap(),
        ));
        dictionary! {
            "Font" => fonts,
            "XObject" => dictionary! { "X1" => form_id },
        }
    })
}

/// Two WinAnsi pages whose resources also list an unused `Identity-H` font
/// without `ToUnicode`.
pub fn unused_composite_font_pdf() -> Vec<u8> {
    let pages = vec![
        line_blocks(&["Category 3", "SW1A 1AA", "M1 1AE"]),
        line_blocks(&["Schedule of plots"]),
    ];
    pdf_from_operations(pages, |doc| {
        let f1 = courier(doc);
        let f2 = composite_font(doc, None);
        dictionary! { "Font" => dictionary! { "F1" => f1, "F2" => f2 } }
    })
}

/// Page 1 mixes a readable font with an `Identity-H` font lacking `ToUnicode`;
/// only "SW1A 1AA" is readable, "M1 1AE" is drawn with the opaque font.
pub fn opaque_glyphs_pdf() -> Vec<u8> {
    let mut page_1 = text_block("F1", 0, Object::string_literal("Category 3 SW1A 1AA "));
    page_1.extend(text_block("F2", 1, two_byte("M1 1AE")));
    pdf_from_operations(vec![page_1, line_blocks(&["Schedule of plots"])], |doc| {
        let f1 = courier(doc);
        let f2 = composite_font(doc, None);
        dictionary! { "Font" => dictionary! { "F1" => f1, "F2" => f2 } }
    })
}

/// Page 1 is drawn entirely with a composite font that carries `ToUnicode`.
pub fn to_unicode_pdf() -> Vec<u8> {
    let page_1 = text_block("F2", 0, two_byte("Category 3 SW1A 1AA M1 1AE"));
    pdf_from_operations(vec![page_1, line_blocks(&["Schedule of plots"])], |doc| {
        let f2 = composite_font(doc, Some(ASCII_TO_UNICODE));
        dictionary! { "Font" => dictionary! { "F2" => f2 } }
    })
}

/// Page 1 shows its lines with `'`, `"` and a kerned `TJ` array.
pub fn quote_operators_pdf() -> Vec<u8> {
    let page_1 = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), 12.into()]),
        Operation::new("TL", vec![14.into()]),
        Operation::new("Td", vec![50.into(), 780.into()]),
        Operation::new("Tj", vec![Object::string_literal("Category 3")]),
        Operation::new("'", vec![Object::string_literal("SW1A 1AA")]),
        Operation::new(
            "\"",
            vec![0.into(), 0.into(), Object::string_literal("M1 1AE")],
        ),
        Operation::new("T*", vec![]),
        Operation::new(
            "TJ",
            vec![Object::Array(vec![
                Object::string_literal("B33"),
                (-300).into(),
                Object::string_literal("8TH"),
            ])],
        ),
        Operation::new("ET", vec![]),
    ];
    pdf_from_operations(vec![page_1, line_blocks(&["Schedule of plots"])], |doc| {
        let font_id = courier(doc);
        dictionary! { "Font" => dictionary! { "F1" => font_id } }
    })
}

/// Two pages: category 3 with two distinct postcodes, then a page with no markers.
pub fn processed_pdf() -> Vec<u8> {
    pdf_with_pages(&[
        &["Part 2", "Category 3", "SW1A 1AA", "M1 1AE"],
        &["Schedule of plots"],
    ])
}

pub fn single_page_pdf() -> Vec<u8> {
    pdf_with_pages(&[&["This document has been archived"]])
}
