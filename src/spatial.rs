use anyhow::{Context, Result};
use regex::Regex;
use tracing::debug;

use crate::model::{Region, TextRun};
use crate::util::normalize_whitespace;

pub const DEFAULT_SEARCH_RADIUS: f64 = 0.15;
pub const DEFAULT_HORIZONTAL_TOLERANCE: f64 = 0.05;
pub const DEFAULT_VERTICAL_TOLERANCE: f64 = 0.02;
pub const DEFAULT_MAX_LABEL_CHARS: usize = 100;

const INSTRUCTION_PREFIX: &str =
    r"(?i)^(please|click|enter|select|check|complete|attach|indicate)\b";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Placement {
    AboveAligned,
    LeftAligned,
    Above,
    Left,
    Elsewhere,
}

#[derive(Debug, Clone, Copy)]
pub struct LabelResolverConfig {
    pub search_radius: f64,
    pub horizontal_tolerance: f64,
    pub vertical_tolerance: f64,
    pub max_label_chars: usize,
}

impl Default for LabelResolverConfig {
    fn default() -> Self {
        Self {
            search_radius: DEFAULT_SEARCH_RADIUS,
            horizontal_tolerance: DEFAULT_HORIZONTAL_TOLERANCE,
            vertical_tolerance: DEFAULT_VERTICAL_TOLERANCE,
            max_label_chars: DEFAULT_MAX_LABEL_CHARS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LabelResolver {
    config: LabelResolverConfig,
    instruction: Regex,
}

impl LabelResolver {
    pub fn new(config: LabelResolverConfig) -> Result<Self> {
        let instruction =
            Regex::new(INSTRUCTION_PREFIX).context("failed to compile instruction prefix regex")?;
        Ok(Self {
            config,
            instruction,
        })
    }

    pub fn config(&self) -> &LabelResolverConfig {
        &self.config
    }

    pub fn placement(&self, region: &Region, run: &TextRun) -> Placement {
        let region_center = region.center();
        let run_center = run.center();

        let above = run.rect.bottom() <= region.rect.top;
        let left = run.rect.right() <= region.rect.left;
        let horizontally_aligned = (run.rect.left - region.rect.left).abs()
            <= self.config.horizontal_tolerance
            || (run_center.x - region_center.x).abs() <= self.config.horizontal_tolerance;
        let vertically_aligned =
            (run_center.y - region_center.y).abs() <= self.config.vertical_tolerance;

        if above && horizontally_aligned {
            Placement::AboveAligned
        } else if left && vertically_aligned {
            Placement::LeftAligned
        } else if above {
            Placement::Above
        } else if left {
            Placement::Left
        } else {
            Placement::Elsewhere
        }
    }

    pub fn clean_label(&self, raw: &str) -> Option<String> {
        let collapsed = normalize_whitespace(raw);
        let cleaned = collapsed
            .trim_end_matches(|character: char| {
                character == ':' || character == '*' || character.is_whitespace()
            })
            .trim();

        if cleaned.is_empty()
            || cleaned.chars().count() > self.config.max_label_chars
            || self.instruction.is_match(cleaned)
        {
            return None;
        }

        Some(cleaned.to_string())
    }

    pub fn resolve<'r, I>(&self, region: &Region, runs: I) -> Option<String>
    where
        I: IntoIterator<Item = &'r TextRun>,
    {
        let region_center = region.center();
        let mut best: Option<(Placement, f64, String)> = None;

        for run in runs {
            if run.page != region.page {
                continue;
            }

            let distance = run.center().distance_to(region_center);
            if distance > self.config.search_radius {
                continue;
            }

            let Some(label) = self.clean_label(&run.text) else {
                continue;
            };

            let placement = self.placement(region, run);
            let better = match &best {
                None => true,
                Some((best_placement, best_distance, _)) => {
                    (placement, distance) < (*best_placement, *best_distance)
                }
            };
            if better {
                best = Some((placement, distance, label));
            }
        }

        if let Some((placement, distance, label)) = &best {
            debug!(
                region = %region.full_id,
                ?placement,
                distance,
                label = %label,
                "resolved region label"
            );
        }

        best.map(|(_, _, label)| label)
    }
}
