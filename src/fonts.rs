use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use memmap2::Mmap;
use pdf_writer::{Name, Pdf, Rect, Ref};
use ttf_parser::Face;
use unicode_normalization::UnicodeNormalization;

use crate::layout::MM_PER_PT;
use crate::model::FontFamily;

/// Anything that can tell how wide a run of text is. Both the preview probe
/// and the PDF renderer lay text out through the same implementation.
pub trait TextMeasure {
    fn text_width_mm(&self, text: &str, size_pt: f32, bold: bool) -> f32;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StandardFont {
    Helvetica,
    HelveticaBold,
    TimesRoman,
    TimesBold,
    Courier,
    CourierBold,
}

impl StandardFont {
    fn base_name(self) -> &'static [u8] {
        match self {
            StandardFont::Helvetica => b"Helvetica",
            StandardFont::HelveticaBold => b"Helvetica-Bold",
            StandardFont::TimesRoman => b"Times-Roman",
            StandardFont::TimesBold => b"Times-Bold",
            StandardFont::Courier => b"Courier",
            StandardFont::CourierBold => b"Courier-Bold",
        }
    }

    fn ascii_widths(self) -> Option<&'static [u16; 95]> {
        match self {
            StandardFont::Helvetica => Some(&HELVETICA),
            StandardFont::HelveticaBold => Some(&HELVETICA_BOLD),
            StandardFont::TimesRoman => Some(&TIMES_ROMAN),
            StandardFont::TimesBold => Some(&TIMES_BOLD),
            StandardFont::Courier | StandardFont::CourierBold => None,
        }
    }

    /// Advance width in 1000-units. Accented Latin letters use their base
    /// letter; anything else unknown gets an average width.
    fn char_width_1000(self, ch: char) -> f32 {
        let Some(table) = self.ascii_widths() else {
            return 600.0;
        };
        let base = if ch.is_ascii() {
            ch
        } else {
            ch.to_string().nfd().next().unwrap_or(ch)
        };
        match base as u32 {
            32..=126 => table[(base as u32 - 32) as usize] as f32,
            _ => 556.0,
        }
    }
}

// AFM advance widths for ASCII 32..=126.
#[rustfmt::skip]
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556,
    278, 278, 584, 584, 584, 556, 1015,
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, 667,
    778, 722, 667, 611, 722, 667, 944, 667, 667, 611,
    278, 278, 278, 469, 556, 333,
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, 556,
    556, 333, 500, 278, 556, 500, 722, 500, 500, 500,
    334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556,
    333, 333, 584, 584, 584, 611, 975,
    722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778, 667,
    778, 722, 667, 611, 722, 667, 944, 667, 667, 611,
    333, 278, 333, 584, 556, 333,
    556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611, 611,
    611, 389, 556, 333, 611, 556, 778, 556, 556, 500,
    389, 280, 389, 584,
];

#[rustfmt::skip]
const TIMES_ROMAN: [u16; 95] = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500,
    278, 278, 564, 564, 564, 444, 921,
    722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889, 722, 722, 556,
    722, 667, 556, 611, 722, 722, 944, 722, 722, 611,
    333, 278, 333, 469, 500, 333,
    444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778, 500, 500, 500,
    500, 333, 389, 278, 500, 500, 722, 500, 500, 444,
    480, 200, 480, 541,
];

#[rustfmt::skip]
const TIMES_BOLD: [u16; 95] = [
    250, 333, 555, 500, 500, 1000, 833, 278, 333, 333, 500, 570, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500,
    333, 333, 570, 570, 570, 500, 930,
    722, 667, 722, 722, 667, 611, 778, 778, 389, 500, 778, 667, 944, 722, 778, 611,
    778, 722, 556, 667, 722, 722, 1000, 722, 722, 667,
    333, 278, 333, 581, 500, 333,
    500, 556, 444, 556, 444, 333, 500, 556, 278, 333, 556, 278, 833, 556, 500, 556,
    556, 444, 389, 333, 556, 500, 722, 500, 500, 444,
    394, 220, 394, 520,
];

/// A TrueType face loaded from disk, kept as raw bytes so it can be both
/// measured and embedded.
pub(crate) struct TrueTypeFace {
    family: String,
    data: Vec<u8>,
    face_index: u32,
}

impl TrueTypeFace {
    fn char_width_1000(&self, ch: char) -> f32 {
        let Ok(face) = Face::parse(&self.data, self.face_index) else {
            return 0.0;
        };
        let units = face.units_per_em() as f32;
        face.glyph_index(ch)
            .and_then(|gid| face.glyph_hor_advance(gid))
            .map(|adv| adv as f32 / units * 1000.0)
            .unwrap_or(0.0)
    }
}

pub(crate) enum FaceSource {
    Standard(StandardFont),
    TrueType(TrueTypeFace),
}

impl FaceSource {
    fn text_width_1000(&self, text: &str) -> f32 {
        match self {
            FaceSource::Standard(std_font) => {
                text.chars().map(|ch| std_font.char_width_1000(ch)).sum()
            }
            FaceSource::TrueType(face) => text.chars().map(|ch| face.char_width_1000(ch)).sum(),
        }
    }
}

/// Regular and bold faces of the poster's font family.
pub struct FontSet {
    pub family: FontFamily,
    regular: FaceSource,
    bold: FaceSource,
}

impl FontSet {
    /// Resolve a family to concrete faces. DejaVu Sans is looked up among the
    /// system fonts; when it cannot be found the poster falls back to Helvetica.
    pub fn load(family: FontFamily) -> FontSet {
        let standard = |regular, bold| FontSet {
            family,
            regular: FaceSource::Standard(regular),
            bold: FaceSource::Standard(bold),
        };
        match family {
            FontFamily::Helvetica => standard(StandardFont::Helvetica, StandardFont::HelveticaBold),
            FontFamily::Times => standard(StandardFont::TimesRoman, StandardFont::TimesBold),
            FontFamily::Courier => standard(StandardFont::Courier, StandardFont::CourierBold),
            FontFamily::Dejavusans => {
                let regular = load_truetype("DejaVu Sans", false);
                let bold = load_truetype("DejaVu Sans", true);
                match (regular, bold) {
                    (Some(regular), Some(bold)) => FontSet {
                        family,
                        regular: FaceSource::TrueType(regular),
                        bold: FaceSource::TrueType(bold),
                    },
                    _ => {
                        log::warn!("Font not found: DejaVu Sans, using Helvetica");
                        standard(StandardFont::Helvetica, StandardFont::HelveticaBold)
                    }
                }
            }
        }
    }

    /// Standard-font metrics only; never touches the file system.
    pub fn builtin(family: FontFamily) -> FontSet {
        match family {
            FontFamily::Dejavusans => FontSet {
                family,
                regular: FaceSource::Standard(StandardFont::Helvetica),
                bold: FaceSource::Standard(StandardFont::HelveticaBold),
            },
            other => FontSet::load(other),
        }
    }

    /// True when both faces come from font files and get embedded.
    pub fn is_embedded(&self) -> bool {
        matches!(
            (&self.regular, &self.bold),
            (FaceSource::TrueType(_), FaceSource::TrueType(_))
        )
    }

    fn face(&self, bold: bool) -> &FaceSource {
        if bold { &self.bold } else { &self.regular }
    }

    /// Write both faces into the document. `used_chars` drives subsetting of
    /// embedded TrueType faces.
    pub(crate) fn register(
        &self,
        pdf: &mut Pdf,
        alloc: &mut impl FnMut() -> Ref,
        used_chars: &HashSet<char>,
    ) -> RegisteredFonts {
        RegisteredFonts {
            regular: register_face(pdf, &self.regular, "F1".into(), alloc, used_chars),
            bold: register_face(pdf, &self.bold, "F2".into(), alloc, used_chars),
        }
    }
}

impl TextMeasure for FontSet {
    fn text_width_mm(&self, text: &str, size_pt: f32, bold: bool) -> f32 {
        self.face(bold).text_width_1000(text) * size_pt / 1000.0 * MM_PER_PT
    }
}

pub(crate) struct FontEntry {
    pub(crate) pdf_name: String,
    pub(crate) font_ref: Ref,
    pub(crate) char_to_gid: Option<HashMap<char, u16>>,
}

impl FontEntry {
    /// Bytes for a `Tj` operand in this font's encoding.
    pub(crate) fn encode(&self, text: &str) -> Vec<u8> {
        match &self.char_to_gid {
            Some(map) => encode_as_gids(text, map),
            None => to_winansi_bytes(text),
        }
    }
}

pub(crate) struct RegisteredFonts {
    pub(crate) regular: FontEntry,
    pub(crate) bold: FontEntry,
}

impl RegisteredFonts {
    pub(crate) fn get(&self, bold: bool) -> &FontEntry {
        if bold { &self.bold } else { &self.regular }
    }
}

fn register_face(
    pdf: &mut Pdf,
    source: &FaceSource,
    pdf_name: String,
    alloc: &mut impl FnMut() -> Ref,
    used_chars: &HashSet<char>,
) -> FontEntry {
    let t0 = std::time::Instant::now();
    let font_ref = alloc();

    let char_to_gid = match source {
        FaceSource::Standard(std_font) => {
            pdf.type1_font(font_ref)
                .base_font(Name(std_font.base_name()))
                .encoding_predefined(Name(b"WinAnsiEncoding"));
            None
        }
        FaceSource::TrueType(face) => {
            let descriptor_ref = alloc();
            let data_ref = alloc();
            match embed_truetype(pdf, font_ref, descriptor_ref, data_ref, face, used_chars, alloc)
            {
                Some(map) => Some(map),
                None => {
                    log::warn!("Cannot embed {}, using Helvetica", face.family);
                    pdf.type1_font(font_ref)
                        .base_font(Name(b"Helvetica"))
                        .encoding_predefined(Name(b"WinAnsiEncoding"));
                    None
                }
            }
        }
    };

    log::debug!(
        "register_face: {pdf_name} → {:.1}ms",
        t0.elapsed().as_secs_f64() * 1000.0,
    );

    FontEntry {
        pdf_name,
        font_ref,
        char_to_gid,
    }
}

/// Embed a TrueType face as a CIDFont (Type0 composite) with Identity-H encoding,
/// subsetted to the characters the poster uses.
fn embed_truetype(
    pdf: &mut Pdf,
    font_ref: Ref,
    descriptor_ref: Ref,
    data_ref: Ref,
    source: &TrueTypeFace,
    used_chars: &HashSet<char>,
    alloc: &mut impl FnMut() -> Ref,
) -> Option<HashMap<char, u16>> {
    let face = Face::parse(&source.data, source.face_index).ok()?;

    let units = face.units_per_em() as f32;
    let to_1000 = |v: f32| v / units * 1000.0;
    let bb = face.global_bounding_box();
    let bbox = Rect::new(
        to_1000(bb.x_min as f32),
        to_1000(bb.y_min as f32),
        to_1000(bb.x_max as f32),
        to_1000(bb.y_max as f32),
    );

    let mut remapper = subsetter::GlyphRemapper::new();
    let mut char_to_gid = HashMap::new();
    let mut gid_widths: Vec<(u16, f32)> = Vec::new();
    for &ch in used_chars {
        if let Some(gid) = face.glyph_index(ch) {
            let new_gid = remapper.remap(gid.0);
            char_to_gid.insert(ch, new_gid);
            let w = face
                .glyph_hor_advance(gid)
                .map(|adv| to_1000(adv as f32))
                .unwrap_or(0.0);
            gid_widths.push((new_gid, w));
        }
    }
    gid_widths.sort_by_key(|&(gid, _)| gid);
    gid_widths.dedup_by_key(|&mut (gid, _)| gid);

    let subset_data = subsetter::subset(&source.data, source.face_index, &remapper)
        .unwrap_or_else(|e| {
            log::warn!("Font subsetting failed for {}: {e}, embedding full font", source.family);
            source.data.clone()
        });

    let data_len = i32::try_from(subset_data.len()).ok()?;
    pdf.stream(data_ref, &subset_data)
        .pair(Name(b"Length1"), data_len);

    let ps_name = format!(
        "{}{}",
        source.family.replace(' ', ""),
        if face.is_bold() { "-Bold" } else { "" }
    );

    pdf.font_descriptor(descriptor_ref)
        .name(Name(ps_name.as_bytes()))
        .flags(pdf_writer::types::FontFlags::NON_SYMBOLIC)
        .bbox(bbox)
        .italic_angle(0.0)
        .ascent(to_1000(face.ascender() as f32))
        .descent(to_1000(face.descender() as f32))
        .cap_height(face.capital_height().map(|h| to_1000(h as f32)).unwrap_or(700.0))
        .stem_v(80.0)
        .font_file2(data_ref);

    let system_info = || pdf_writer::types::SystemInfo {
        registry: pdf_writer::Str(b"Adobe"),
        ordering: pdf_writer::Str(b"Identity"),
        supplement: 0,
    };

    let cid_font_ref = alloc();
    {
        let mut cid = pdf.cid_font(cid_font_ref);
        cid.subtype(pdf_writer::types::CidFontType::Type2);
        cid.base_font(Name(ps_name.as_bytes()));
        cid.system_info(system_info());
        cid.font_descriptor(descriptor_ref);
        cid.default_width(0.0);
        cid.cid_to_gid_map_predefined(Name(b"Identity"));
        if !gid_widths.is_empty() {
            let mut w = cid.widths();
            for &(gid, width) in &gid_widths {
                w.consecutive(gid, [width]);
            }
        }
    }

    let tounicode_ref = alloc();
    let cmap_name = format!("{ps_name}-UTF16");
    let mut cmap = pdf_writer::types::UnicodeCmap::new(Name(cmap_name.as_bytes()), system_info());
    for (&ch, &new_gid) in &char_to_gid {
        cmap.pair(new_gid, ch);
    }
    let cmap_data = cmap.finish();
    pdf.stream(tounicode_ref, cmap_data.as_slice());

    pdf.type0_font(font_ref)
        .base_font(Name(ps_name.as_bytes()))
        .encoding_predefined(Name(b"Identity-H"))
        .descendant_font(cid_font_ref)
        .to_unicode(tounicode_ref);

    Some(char_to_gid)
}

/// (lowercase family name, bold) -> (file path, face index within TTC)
type FontLookup = HashMap<(String, bool), (PathBuf, u32)>;

static FONT_INDEX: OnceLock<FontLookup> = OnceLock::new();

fn font_directories() -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();

    if let Ok(val) = std::env::var(crate::config::ENV_FONTS) {
        let sep = if cfg!(windows) { ';' } else { ':' };
        dirs.extend(
            val.split(sep)
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
        );
    }

    #[cfg(target_os = "macos")]
    {
        dirs.extend(["/Library/Fonts".into(), "/System/Library/Fonts".into()]);
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(home).join("Library/Fonts"));
        }
    }

    #[cfg(target_os = "linux")]
    {
        dirs.extend(["/usr/share/fonts".into(), "/usr/local/share/fonts".into()]);
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(home).join(".local/share/fonts"));
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(windir) = std::env::var("WINDIR") {
            dirs.push(PathBuf::from(windir).join("Fonts"));
        } else {
            dirs.push("C:\\Windows\\Fonts".into());
        }
    }

    dirs
}

fn is_font_file(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref(),
        Some("ttf" | "otf" | "ttc")
    )
}

fn font_family_name(face: &Face) -> Option<String> {
    face.names()
        .into_iter()
        .filter(|name| name.name_id == ttf_parser::name_id::FAMILY && name.is_unicode())
        .find_map(|name| name.to_string())
}

fn scan_font_dirs() -> FontLookup {
    let t0 = std::time::Instant::now();
    let mut index = FontLookup::new();
    let mut visited: HashSet<PathBuf> = HashSet::new();
    let mut stack = font_directories();
    let mut files_scanned = 0u32;

    while let Some(dir) = stack.pop() {
        if !visited.insert(dir.clone()) {
            continue;
        }
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            if !is_font_file(&path) {
                continue;
            }
            files_scanned += 1;
            let Ok(file) = std::fs::File::open(&path) else {
                continue;
            };
            let Ok(data) = (unsafe { Mmap::map(&file) }) else {
                continue;
            };
            let face_count = ttf_parser::fonts_in_collection(&data).unwrap_or(1);
            for face_idx in 0..face_count {
                let Ok(face) = Face::parse(&data, face_idx) else {
                    continue;
                };
                if face.is_italic() {
                    continue;
                }
                if let Some(family) = font_family_name(&face) {
                    index
                        .entry((family.to_lowercase(), face.is_bold()))
                        .or_insert((path.clone(), face_idx));
                }
            }
        }
    }

    log::info!(
        "Font scan: {:.1}ms, {} files parsed → {} entries",
        t0.elapsed().as_secs_f64() * 1000.0,
        files_scanned,
        index.len(),
    );
    index
}

fn load_truetype(family: &str, bold: bool) -> Option<TrueTypeFace> {
    let index = FONT_INDEX.get_or_init(scan_font_dirs);
    let (path, face_index) = index.get(&(family.to_lowercase(), bold))?.clone();
    let data = std::fs::read(&path).ok()?;
    Face::parse(&data, face_index).ok()?;
    log::debug!("Resolved {family} bold={bold} → {}", path.display());
    Some(TrueTypeFace {
        family: family.to_string(),
        data,
        face_index,
    })
}

/// Convert a UTF-8 string to WinAnsi (Windows-1252) bytes; unmappable
/// characters are dropped.
pub(crate) fn to_winansi_bytes(s: &str) -> Vec<u8> {
    s.chars().filter_map(char_to_winansi).collect()
}

fn char_to_winansi(c: char) -> Option<u8> {
    let byte = match c as u32 {
        0x0020..=0x007E | 0x00A0..=0x00FF => c as u8,
        0x20AC => 0x80,
        0x201A => 0x82,
        0x0192 => 0x83,
        0x201E => 0x84,
        0x2026 => 0x85,
        0x2020 => 0x86,
        0x2021 => 0x87,
        0x02C6 => 0x88,
        0x2030 => 0x89,
        0x0160 => 0x8A,
        0x2039 => 0x8B,
        0x0152 => 0x8C,
        0x017D => 0x8E,
        0x2018 => 0x91,
        0x2019 => 0x92,
        0x201C => 0x93,
        0x201D => 0x94,
        0x2022 => 0x95,
        0x2013 => 0x96,
        0x2014 => 0x97,
        0x02DC => 0x98,
        0x2122 => 0x99,
        0x0161 => 0x9A,
        0x203A => 0x9B,
        0x0153 => 0x9C,
        0x017E => 0x9E,
        0x0178 => 0x9F,
        _ => return None,
    };
    Some(byte)
}

/// Encode UTF-8 text as big-endian 2-byte glyph IDs for CIDFont content streams.
pub(crate) fn encode_as_gids(text: &str, char_to_gid: &HashMap<char, u16>) -> Vec<u8> {
    text.chars()
        .map(|ch| char_to_gid.get(&ch).copied().unwrap_or(0))
        .flat_map(u16::to_be_bytes)
        .collect()
}
