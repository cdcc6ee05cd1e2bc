use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const TITLE_SIZE_RANGE: (u32, u32) = (20, 80);
pub const IMAGE_HEIGHT_RANGE_MM: (f32, f32) = (60.0, 220.0);
pub const MIN_IMAGE_WIDTH_MM: f32 = 50.0;

pub const DEFAULT_TITLE_SIZE_PT: u32 = 30;
pub const DEFAULT_IMAGE_HEIGHT_MM: f32 = 141.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontFamily {
    #[default]
    Helvetica,
    Times,
    Courier,
    Dejavusans,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PageSize {
    #[default]
    A4,
    A3,
}

impl PageSize {
    /// Portrait (width, height) in millimetres.
    pub fn dimensions_mm(self) -> (f32, f32) {
        match self {
            PageSize::A4 => (210.0, 297.0),
            PageSize::A3 => (297.0, 420.0),
        }
    }

    pub fn width_mm(self) -> f32 {
        self.dimensions_mm().0
    }

    pub fn height_mm(self) -> f32 {
        self.dimensions_mm().1
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PageSize::A4 => "A4",
            PageSize::A3 => "A3",
        }
    }
}

/// Everything the editor lets the user change. The user zoom factor is
/// deliberately absent: it lives in the viewport session only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PosterParameters {
    pub title: String,
    pub date_text: String,
    pub details: String,
    pub font_family: FontFamily,
    pub title_size_pt: u32,
    pub image_height_mm: f32,
    pub image_width_mm: f32,
    pub image_top_offset_px: i32,
    pub page_size: PageSize,
}

impl Default for PosterParameters {
    fn default() -> Self {
        Self {
            title: String::new(),
            date_text: String::new(),
            details: String::new(),
            font_family: FontFamily::Helvetica,
            title_size_pt: DEFAULT_TITLE_SIZE_PT,
            image_height_mm: DEFAULT_IMAGE_HEIGHT_MM,
            image_width_mm: PageSize::A4.width_mm(),
            image_top_offset_px: 0,
            page_size: PageSize::A4,
        }
    }
}

const META_DATE_KEY: &str = "activitat_data_inici";

/// Metadata keys shown in the details block, in display order.
const DETAIL_LABELS: [(&str, &str); 3] = [
    ("activitat-localitzacio", "Lloc"),
    ("activitat-nivell", "Dificultat"),
    ("activitat-places", "Places"),
];

impl PosterParameters {
    /// Initial editor values for a piece of content.
    pub fn prefill(content: &SourceContent) -> Self {
        let date_text = match content.meta.get(META_DATE_KEY).map(|s| s.trim()) {
            Some(raw) if !raw.is_empty() => NaiveDate::parse_from_str(raw, "%Y%m%d")
                .map(|d| d.format("%d/%m/%Y").to_string())
                .unwrap_or_else(|_| raw.to_string()),
            _ => content.published.format("%d/%m/%Y").to_string(),
        };

        let details = DETAIL_LABELS
            .iter()
            .filter_map(|(key, label)| {
                content
                    .meta
                    .get(*key)
                    .map(|v| v.trim())
                    .filter(|v| !v.is_empty())
                    .map(|v| format!("{label}: {v}"))
            })
            .collect::<Vec<_>>()
            .join("\n");

        Self {
            title: content.title.to_uppercase(),
            date_text,
            details,
            ..Self::default()
        }
    }

    /// Title as it appears on the poster.
    pub fn display_title(&self) -> String {
        self.title.to_uppercase()
    }

    /// Clamp every numeric field into its legal range.
    pub fn normalized(mut self) -> Self {
        let (page_w, _) = self.page_size.dimensions_mm();

        self.title_size_pt = self
            .title_size_pt
            .clamp(TITLE_SIZE_RANGE.0, TITLE_SIZE_RANGE.1);

        if !self.image_height_mm.is_finite() {
            self.image_height_mm = DEFAULT_IMAGE_HEIGHT_MM;
        }
        self.image_height_mm = self
            .image_height_mm
            .clamp(IMAGE_HEIGHT_RANGE_MM.0, IMAGE_HEIGHT_RANGE_MM.1);

        if !self.image_width_mm.is_finite() || self.image_width_mm <= 0.0 {
            self.image_width_mm = page_w;
        }
        self.image_width_mm = self.image_width_mm.clamp(MIN_IMAGE_WIDTH_MM, page_w);

        self.image_top_offset_px = self.image_top_offset_px.min(0);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Publish,
    Future,
    Draft,
    Pending,
    Private,
    Trash,
}

impl PostStatus {
    /// Only content reachable by the public gets a QR code, in the preview
    /// placeholder and in the rendered document alike.
    pub fn shows_qr(&self) -> bool {
        matches!(self, PostStatus::Publish | PostStatus::Future)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeaturedImage {
    pub path: PathBuf,
    pub url: String,
}

/// What the content collaborator knows about the post the poster is for.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceContent {
    pub id: u64,
    pub title: String,
    pub status: PostStatus,
    pub published: NaiveDate,
    #[serde(default)]
    pub featured_image: Option<FeaturedImage>,
    pub permalink: String,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

#[derive(Clone)]
pub struct EmbeddedImage {
    pub data: Vec<u8>,
    pub format: ImageFormat,
    pub pixel_width: u32,
    pub pixel_height: u32,
    /// 1 for grayscale JPEGs, 3 for RGB; PNGs are always re-encoded as RGB.
    pub components: u8,
}

/// One export, consumed once by the renderer.
pub struct ExportRequest {
    pub parameters: PosterParameters,
    pub captured_image: Option<EmbeddedImage>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GeneratedDocument {
    pub path: PathBuf,
    pub file_name: String,
    pub url: String,
}
