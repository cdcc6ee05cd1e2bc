#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use poster_studio::config::StudioConfig;
use poster_studio::model::{
    FeaturedImage, PageSize, PostStatus, PosterParameters, SourceContent,
};
use poster_studio::service::{ExportService, JsonContentSource, StaticTokenAuthorizer};

pub const TOKEN: &str = "test-token";
pub const POST_ID: u64 = 42;

/// Fresh output directory: tests/output/<case>/
pub fn output_dir(case: &str) -> PathBuf {
    let dir = PathBuf::from("tests/output").join(case);
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).expect("create output dir");
    dir
}

pub fn montseny_params(page_size: PageSize) -> PosterParameters {
    PosterParameters {
        title: "SORTIDA AL MONTSENY".into(),
        date_text: "12/05/2024".into(),
        details: "Lloc: Montseny\nDificultat: Mitjana".into(),
        image_width_mm: page_size.width_mm(),
        page_size,
        ..PosterParameters::default()
    }
}

pub fn montseny_content(status: PostStatus) -> SourceContent {
    let mut meta = BTreeMap::new();
    meta.insert("activitat-localitzacio".to_string(), "Montseny".to_string());
    meta.insert("activitat-nivell".to_string(), "Mitjana".to_string());
    meta.insert("activitat_data_inici".to_string(), "20240512".to_string());
    SourceContent {
        id: POST_ID,
        title: "Sortida al Montseny".into(),
        status,
        published: NaiveDate::from_ymd_opt(2024, 4, 2).unwrap(),
        featured_image: None,
        permalink: format!("https://www.gem-malgrat.cat/?p={POST_ID}"),
        meta,
    }
}

pub fn png_bytes(w: u32, h: u32, rgb: [u8; 3]) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(w, h, image::Rgb(rgb));
    let mut out = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}

pub fn jpeg_bytes(w: u32, h: u32, rgb: [u8; 3]) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(w, h, image::Rgb(rgb));
    let mut out = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Jpeg)
        .unwrap();
    out
}

/// A throwaway deployment: content records, uploads and a logo under one
/// output directory.
pub struct TestEnv {
    pub root: PathBuf,
    pub config: StudioConfig,
}

impl TestEnv {
    pub fn new(case: &str) -> Self {
        let root = output_dir(case);
        let content_dir = root.join("content");
        fs::create_dir_all(&content_dir).unwrap();
        let logo_path = root.join("logo.png");
        fs::write(&logo_path, png_bytes(40, 40, [144, 25, 30])).unwrap();
        let config = StudioConfig {
            upload_dir: root.join("uploads"),
            upload_url: "https://gem.example/uploads".into(),
            logo_path: Some(logo_path),
            content_dir,
            ..StudioConfig::default()
        };
        Self { root, config }
    }

    /// Store a content record, with a featured image next to it.
    pub fn add_content(&self, mut content: SourceContent) {
        let image_name = format!("featured-{}.jpg", content.id);
        fs::write(
            self.config.content_dir.join(&image_name),
            jpeg_bytes(300, 200, [40, 90, 140]),
        )
        .unwrap();
        content.featured_image = Some(FeaturedImage {
            path: PathBuf::from(image_name),
            url: String::new(),
        });
        let json = serde_json::to_vec_pretty(&content).unwrap();
        fs::write(
            self.config.content_dir.join(format!("{}.json", content.id)),
            json,
        )
        .unwrap();
    }

    pub fn editor_service(&self) -> ExportService {
        ExportService::new(
            self.config.clone(),
            StaticTokenAuthorizer::editor(TOKEN),
            JsonContentSource::new(&self.config.content_dir),
        )
    }

    pub fn viewer_service(&self) -> ExportService {
        ExportService::new(
            self.config.clone(),
            StaticTokenAuthorizer::viewer(TOKEN),
            JsonContentSource::new(&self.config.content_dir),
        )
    }

    pub fn stored_pdfs(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(self.config.upload_dir.join("pdfs")) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
        files.sort();
        files
    }
}

/// Page size in points from the first /MediaBox entry.
pub fn pdf_mediabox(pdf: &[u8]) -> Option<(f32, f32)> {
    let text = String::from_utf8_lossy(pdf);
    let start = text.find("/MediaBox")?;
    let rest = &text[start..];
    let open = rest.find('[')?;
    let close = rest.find(']')?;
    let nums: Vec<f32> = rest[open + 1..close]
        .split_whitespace()
        .filter_map(|s| s.parse().ok())
        .collect();
    if nums.len() == 4 {
        Some((nums[2] - nums[0], nums[3] - nums[1]))
    } else {
        None
    }
}

pub fn page_count(pdf: &[u8]) -> usize {
    count(pdf, b"/Type /Page") - count(pdf, b"/Type /Pages")
}

pub fn image_xobject_count(pdf: &[u8]) -> usize {
    count(pdf, b"/Subtype /Image")
}

pub fn count(haystack: &[u8], needle: &[u8]) -> usize {
    haystack
        .windows(needle.len())
        .filter(|w| *w == needle)
        .count()
}

/// Every Flate stream in the file that inflates, concatenated.
pub fn inflated_streams(pdf: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut pos = 0;
    while let Some(start) = find(&pdf[pos..], b"stream\n") {
        let body_start = pos + start + b"stream\n".len();
        let Some(end) = find(&pdf[body_start..], b"\nendstream") else {
            break;
        };
        let body = &pdf[body_start..body_start + end];
        if let Ok(data) = miniz_oxide::inflate::decompress_to_vec_zlib(body) {
            out.extend_from_slice(&data);
            out.push(b'\n');
        }
        pos = body_start + end + b"\nendstream".len();
    }
    out
}

pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

pub fn contains_text(streams: &[u8], text: &str) -> bool {
    find(streams, format!("({text}) Tj").as_bytes()).is_some()
}

/// Content-stream operations whose operands are all numbers, as
/// (operands, operator), in stream order.
pub fn numeric_ops(streams: &[u8]) -> Vec<(Vec<f32>, String)> {
    String::from_utf8_lossy(streams)
        .lines()
        .filter_map(|line| {
            let mut tokens: Vec<&str> = line.split_whitespace().collect();
            let op = tokens.pop()?;
            let operands = tokens
                .iter()
                .map(|t| t.parse::<f32>().ok())
                .collect::<Option<Vec<f32>>>()?;
            Some((operands, op.to_string()))
        })
        .collect()
}

pub fn assert_close(actual: f32, expected: f32, tolerance: f32, what: &str) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "{what}: expected {expected}, got {actual}"
    );
}

pub fn read(path: &Path) -> Vec<u8> {
    fs::read(path).unwrap_or_else(|e| panic!("read {}: {e}", path.display()))
}
