use std::collections::BTreeMap;
use std::fmt;

use anyhow::{Result, bail};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub type Mapping = BTreeMap<String, SchemaKey>;

pub type FillSet = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn distance_to(self, other: Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RectRepr")]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RectRepr {
    Sized {
        left: f64,
        top: f64,
        width: f64,
        height: f64,
    },
    Corners([f64; 4]),
}

impl From<RectRepr> for Rect {
    fn from(repr: RectRepr) -> Self {
        match repr {
            RectRepr::Sized {
                left,
                top,
                width,
                height,
            } => Rect::new(left, top, width, height),
            RectRepr::Corners([x0, y0, x1, y1]) => Rect::from_corners(x0, y0, x1, y1),
        }
    }
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn from_corners(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            left: x0.min(x1),
            top: y0.min(y1),
            width: (x1 - x0).abs(),
            height: (y1 - y0).abs(),
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn center(&self) -> Point {
        Point {
            x: self.left + self.width / 2.0,
            y: self.top + self.height / 2.0,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub short_id: String,
    pub full_id: String,
    pub page: u32,
    pub rect: Rect,
}

impl Region {
    pub fn from_full_id(full_id: &str, page: u32, rect: Rect) -> Self {
        let short_id = full_id.rsplit('.').next().unwrap_or(full_id).to_string();
        Self {
            short_id,
            full_id: full_id.to_string(),
            page,
            rect,
        }
    }

    pub fn center(&self) -> Point {
        self.rect.center()
    }
}

pub fn sort_reading_order(regions: &mut [Region]) {
    regions.sort_by(|a, b| {
        a.page
            .cmp(&b.page)
            .then(a.rect.top.total_cmp(&b.rect.top))
            .then(a.rect.left.total_cmp(&b.rect.left))
    });
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    pub page: u32,
    pub rect: Rect,
}

impl TextRun {
    pub fn center(&self) -> Point {
        self.rect.center()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaKey(String);

impl SchemaKey {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let mut segments = trimmed.split('.');
        let (Some(category), Some(attribute), None) =
            (segments.next(), segments.next(), segments.next())
        else {
            bail!("schema key must have exactly two dotted segments: {raw:?}");
        };

        for segment in [category, attribute] {
            let valid = !segment.is_empty()
                && segment.chars().all(|character| {
                    character.is_ascii_lowercase()
                        || character.is_ascii_digit()
                        || character == '_'
                });
            if !valid {
                bail!("invalid schema key segment {segment:?} in {raw:?}");
            }
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn category(&self) -> &str {
        self.0.split('.').next().unwrap_or_default()
    }
}

impl fmt::Display for SchemaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for SchemaKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SchemaKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        SchemaKey::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub form_description: Option<String>,
    #[serde(default)]
    pub regions: Vec<Region>,
    #[serde(default)]
    pub text_runs: Vec<TextRun>,
}

impl DocumentSnapshot {
    pub fn runs_on_page(&self, page: u32) -> Vec<&TextRun> {
        self.text_runs.iter().filter(|run| run.page == page).collect()
    }

    pub fn page_text(&self, page: u32) -> String {
        let mut runs = self.runs_on_page(page);
        runs.sort_by(|a, b| {
            a.rect
                .top
                .total_cmp(&b.rect.top)
                .then(a.rect.left.total_cmp(&b.rect.left))
        });
        runs.iter()
            .map(|run| run.text.as_str())
            .collect::<Vec<&str>>()
            .join("\n")
    }

    pub fn region(&self, full_id: &str) -> Option<&Region> {
        self.regions.iter().find(|region| region.full_id == full_id)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunCounts {
    pub total_regions: usize,
    pub filtered_out: usize,
    pub eligible: usize,
    pub inferred: usize,
    pub classified: usize,
    pub mapped: usize,
    pub filled: usize,
    pub mapped_without_value: usize,
    pub skipped: usize,
    pub failed_batches: usize,
    pub classification_failed_regions: usize,
    pub render_failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingSource {
    Identifier,
    Label,
    Classifier,
}

#[derive(Debug, Clone, Serialize)]
pub struct MappedRegion {
    pub key: SchemaKey,
    pub source: MappingSource,
    pub filled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub page: u32,
    pub index: usize,
    pub size: usize,
    pub status: BatchStatus,
    pub mapped: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub manifest_version: u32,
    pub run_id: String,
    pub generated_at: String,
    pub source: Option<String>,
    pub source_sha256: Option<String>,
    pub form_description: String,
    pub classifier: String,
    pub chunk_size: usize,
    pub counts: RunCounts,
    pub mapping: BTreeMap<String, MappedRegion>,
    pub batches: Vec<BatchOutcome>,
    pub warnings: Vec<String>,
}
