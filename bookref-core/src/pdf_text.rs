//! Page text extraction over `lopdf`'s object model.
//!
//! The page content stream is decoded into operations and walked directly:
//! text from `Tj`, `TJ`, `'` and `"` is collected, `Do` descends into Form
//! XObjects, and a font is only looked at when `Tf` selects it. A font whose
//! glyphs cannot be mapped back to text contributes nothing; it never fails
//! the page.

use std::collections::HashMap;
use std::rc::Rc;

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

const MAX_FORM_DEPTH: usize = 8;
const MAX_REFERENCE_HOPS: usize = 16;
const MAX_TREE_DEPTH: usize = 32;
/// `TJ` adjustments at or below this (thousandths of an em) read as a word gap.
const WORD_GAP: f32 = -200.0;
const MAX_RANGE_LEN: u32 = 0x1_0000;

static CODESPACE_SECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)begincodespacerange(.*?)endcodespacerange").expect("static codespace pattern")
});
static BFCHAR_SECTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)beginbfchar(.*?)endbfchar").expect("static bfchar pattern"));
static BFRANGE_SECTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)beginbfrange(.*?)endbfrange").expect("static bfrange pattern"));
static HEX_PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<([0-9A-Fa-f]+)>\s*<([0-9A-Fa-f]*)>").expect("static hex pair pattern")
});
static HEX_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<([0-9A-Fa-f]+)>\s*<([0-9A-Fa-f]+)>\s*(?:<([0-9A-Fa-f]*)>|\[([^\]]*)\])")
        .expect("static hex range pattern")
});
static HEX_STRING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<([0-9A-Fa-f]*)>").expect("static hex string pattern"));

/// How the bytes of a shown string turn into text for one font.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FontDecoder {
    /// Simple fonts without a `ToUnicode` map; bytes are read as Latin-1.
    SingleByte,
    /// A `ToUnicode` map with a fixed code width in bytes.
    CMap {
        width: usize,
        map: HashMap<u32, String>,
    },
    /// Composite fonts without a `ToUnicode` map.
    Opaque,
}

impl FontDecoder {
    pub fn for_font(doc: &Document, font: &Dictionary) -> Self {
        if let Some(stream) = font
            .get(b"ToUnicode")
            .ok()
            .and_then(|o| resolve(doc, o))
            .and_then(|o| o.as_stream().ok())
        {
            let data = stream
                .decompressed_content()
                .unwrap_or_else(|_| stream.content.clone());
            if let Some(decoder) = FontDecoder::from_to_unicode(&data) {
                return decoder;
            }
        }

        match font.get(b"Subtype").and_then(Object::as_name) {
            Ok(b"Type0") => FontDecoder::Opaque,
            _ => FontDecoder::SingleByte,
        }
    }

    /// Parses the `bfchar`/`bfrange` sections of a `ToUnicode` CMap.
    pub fn from_to_unicode(data: &[u8]) -> Option<Self> {
        let text = String::from_utf8_lossy(data);
        let mut map = HashMap::new();
        let mut width = CODESPACE_SECTION
            .captures(&text)
            .and_then(|c| HEX_STRING.captures(c.get(1)?.as_str()))
            .map(|c| hex_bytes(&c[1]).len());

        for section in BFCHAR_SECTION.captures_iter(&text) {
            for pair in HEX_PAIR.captures_iter(&section[1]) {
                let src = hex_bytes(&pair[1]);
                width.get_or_insert(src.len());
                map.insert(code_value(&src), utf16_text(&hex_bytes(&pair[2])));
            }
        }

        for section in BFRANGE_SECTION.captures_iter(&text) {
            for range in HEX_RANGE.captures_iter(&section[1]) {
                let lo = hex_bytes(&range[1]);
                width.get_or_insert(lo.len());
                let (lo, hi) = (code_value(&lo), code_value(&hex_bytes(&range[2])));
                if hi < lo || hi - lo >= MAX_RANGE_LEN {
                    continue;
                }
                if let Some(dst) = range.get(3) {
                    let base = utf16_units(&hex_bytes(dst.as_str()));
                    for (offset, code) in (lo..=hi).enumerate() {
                        let mut units = base.clone();
                        if let Some(last) = units.last_mut() {
                            *last = last.wrapping_add(offset as u16);
                        }
                        map.insert(code, String::from_utf16_lossy(&units));
                    }
                } else if let Some(list) = range.get(4) {
                    for (code, dst) in (lo..=hi).zip(HEX_STRING.captures_iter(list.as_str())) {
                        map.insert(code, utf16_text(&hex_bytes(&dst[1])));
                    }
                }
            }
        }

        if map.is_empty() {
            return None;
        }
        Some(FontDecoder::CMap {
            width: width.unwrap_or(2).max(1),
            map,
        })
    }

    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            FontDecoder::SingleByte => bytes.iter().map(|&b| b as char).collect(),
            FontDecoder::CMap { width, map } => bytes
                .chunks_exact(*width)
                .filter_map(|code| map.get(&code_value(code)))
                .map(String::as_str)
                .collect(),
            FontDecoder::Opaque => String::new(),
        }
    }
}

fn hex_bytes(hex: &str) -> Vec<u8> {
    let digits: Vec<u8> = hex
        .chars()
        .filter_map(|c| c.to_digit(16))
        .map(|d| d as u8)
        .collect();
    digits
        .chunks(2)
        .map(|pair| (pair[0] << 4) | pair.get(1).copied().unwrap_or(0))
        .collect()
}

fn code_value(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b))
}

fn utf16_units(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks(2)
        .map(|pair| (u16::from(pair[0]) << 8) | u16::from(pair.get(1).copied().unwrap_or(0)))
        .collect()
}

fn utf16_text(bytes: &[u8]) -> String {
    String::from_utf16_lossy(&utf16_units(bytes))
}

/// Follows indirect references to the object they name.
fn resolve<'a>(doc: &'a Document, mut object: &'a Object) -> Option<&'a Object> {
    for _ in 0..MAX_REFERENCE_HOPS {
        match object {
            Object::Reference(id) => object = doc.get_object(*id).ok()?,
            other => return Some(other),
        }
    }
    None
}

fn resolve_dict<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Dictionary> {
    match resolve(doc, object)? {
        Object::Dictionary(dict) => Some(dict),
        Object::Stream(stream) => Some(&stream.dict),
        _ => None,
    }
}

/// Resources of a page, inherited from the page tree when the page has none.
fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(resources) = node.get(b"Resources") {
            return resolve_dict(doc, resources);
        }
        node = resolve_dict(doc, node.get(b"Parent").ok()?)?;
    }
    None
}

/// Text of one page, in content stream order.
pub fn page_text(doc: &Document, page_id: ObjectId) -> Result<String, lopdf::Error> {
    let content = doc.get_page_content(page_id)?;
    let mut walker = TextWalker::new(doc);
    walker.walk(&content, page_resources(doc, page_id), 0)?;
    Ok(walker.out)
}

struct TextWalker<'a> {
    doc: &'a Document,
    fonts: HashMap<ObjectId, Rc<FontDecoder>>,
    open_forms: Vec<ObjectId>,
    out: String,
}

impl<'a> TextWalker<'a> {
    fn new(doc: &'a Document) -> Self {
        Self {
            doc,
            fonts: HashMap::new(),
            open_forms: Vec::new(),
            out: String::new(),
        }
    }

    fn walk(
        &mut self,
        data: &[u8],
        resources: Option<&'a Dictionary>,
        depth: usize,
    ) -> Result<(), lopdf::Error> {
        let content = Content::decode(data)?;
        let mut font = Rc::new(FontDecoder::SingleByte);
        let mut saved = Vec::new();

        for op in &content.operations {
            match op.operator.as_str() {
                "q" => saved.push(font.clone()),
                "Q" => {
                    if let Some(previous) = saved.pop() {
                        font = previous;
                    }
                }
                "Tf" => {
                    if let Some(name) = op.operands.first().and_then(|o| o.as_name().ok()) {
                        font = self.font(resources, name);
                    }
                }
                "Tj" => self.show(&font, op.operands.first()),
                "'" => {
                    self.separate('\n');
                    self.show(&font, op.operands.first());
                }
                "\"" => {
                    self.separate('\n');
                    self.show(&font, op.operands.get(2));
                }
                "TJ" => {
                    if let Some(Ok(items)) = op.operands.first().map(Object::as_array) {
                        for item in items {
                            match item {
                                Object::String(bytes, _) => self.out.push_str(&font.decode(bytes)),
                                other => {
                                    if other.as_float().map_or(false, |gap| gap <= WORD_GAP) {
                                        self.separate(' ');
                                    }
                                }
                            }
                        }
                    }
                }
                "Td" | "TD" => {
                    let moves_line = op
                        .operands
                        .get(1)
                        .and_then(|o| o.as_float().ok())
                        .map_or(false, |ty| ty != 0.0);
                    self.separate(if moves_line { '\n' } else { ' ' });
                }
                "T*" | "Tm" | "ET" => self.separate('\n'),
                "Do" => {
                    if let Some(name) = op.operands.first().and_then(|o| o.as_name().ok()) {
                        self.form(resources, name, depth);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn show(&mut self, font: &FontDecoder, operand: Option<&Object>) {
        if let Some(Object::String(bytes, _)) = operand {
            self.out.push_str(&font.decode(bytes));
        }
    }

    fn separate(&mut self, separator: char) {
        if !self.out.is_empty() && !self.out.ends_with(char::is_whitespace) {
            self.out.push(separator);
        }
    }

    fn font(&mut self, resources: Option<&'a Dictionary>, name: &[u8]) -> Rc<FontDecoder> {
        let doc = self.doc;
        let Some(entry) = resources
            .and_then(|r| r.get(b"Font").ok())
            .and_then(|fonts| resolve_dict(doc, fonts))
            .and_then(|fonts| fonts.get(name).ok())
        else {
            debug!(font = %String::from_utf8_lossy(name), "Font not in resources; reading bytes as Latin-1");
            return Rc::new(FontDecoder::SingleByte);
        };

        if let Object::Reference(id) = entry {
            if let Some(cached) = self.fonts.get(id) {
                return cached.clone();
            }
        }

        let decoder = Rc::new(match resolve_dict(doc, entry) {
            Some(dict) => FontDecoder::for_font(doc, dict),
            None => FontDecoder::SingleByte,
        });
        if *decoder == FontDecoder::Opaque {
            debug!(font = %String::from_utf8_lossy(name), "Composite font without ToUnicode; its glyphs are skipped");
        }
        if let Object::Reference(id) = entry {
            self.fonts.insert(*id, decoder.clone());
        }
        decoder
    }

    fn form(&mut self, resources: Option<&'a Dictionary>, name: &[u8], depth: usize) {
        let doc = self.doc;
        let Some(Object::Reference(id)) = resources
            .and_then(|r| r.get(b"XObject").ok())
            .and_then(|xobjects| resolve_dict(doc, xobjects))
            .and_then(|xobjects| xobjects.get(name).ok())
        else {
            return;
        };
        if depth >= MAX_FORM_DEPTH || self.open_forms.contains(id) {
            debug!(form = ?id, depth, "Form XObject nesting stopped");
            return;
        }
        let Ok(Object::Stream(stream)) = doc.get_object(*id) else {
            return;
        };
        let is_form = stream
            .dict
            .get(b"Subtype")
            .and_then(Object::as_name)
            .map_or(false, |subtype| subtype == b"Form");
        if !is_form {
            return;
        }

        let inner = stream
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|r| resolve_dict(doc, r))
            .or(resources);
        let data = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());

        self.open_forms.push(*id);
        if let Err(e) = self.walk(&data, inner, depth + 1) {
            warn!(form = ?id, error = %e, "Form XObject content unreadable; skipped");
        }
        self.open_forms.pop();
    }
}
