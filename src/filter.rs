use crate::model::Region;

pub const MIN_SHORT_ID_CHARS: usize = 3;

pub const DEFAULT_DENYLIST: &[&str] = &[
    "formmaster",
    "pageset",
    "subform",
    "subsection",
    "section",
    "border",
    "table",
    "header",
    "footer",
    "btn",
    "button",
    "checkbox",
    "radiobutton",
    "signature",
    "signline",
    "signhere",
    "datesigned",
    "qrcode",
    "barcod",
    "clrpnt",
    "image",
];

// Matched case-sensitively and only when a digit follows, so "ck" does not
// catch "Check".
pub const NUMBERED_WIDGET_PREFIXES: &[&str] = &["RB", "ck", "Row"];

#[derive(Debug, Clone)]
pub struct RegionFilter {
    denylist: Vec<String>,
    min_chars: usize,
}

impl Default for RegionFilter {
    fn default() -> Self {
        Self::new(DEFAULT_DENYLIST, MIN_SHORT_ID_CHARS)
    }
}

impl RegionFilter {
    pub fn new<S: AsRef<str>>(denylist: &[S], min_chars: usize) -> Self {
        Self {
            denylist: denylist
                .iter()
                .map(|entry| entry.as_ref().to_lowercase())
                .filter(|entry| !entry.is_empty())
                .collect(),
            min_chars,
        }
    }

    pub fn with_extra_entries<S: AsRef<str>>(mut self, entries: &[S]) -> Self {
        self.denylist.extend(
            entries
                .iter()
                .map(|entry| entry.as_ref().to_lowercase())
                .filter(|entry| !entry.is_empty()),
        );
        self
    }

    pub fn keeps(&self, region: &Region) -> bool {
        if region.short_id.chars().count() < self.min_chars {
            return false;
        }

        if NUMBERED_WIDGET_PREFIXES.iter().any(|prefix| {
            region
                .short_id
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
        }) {
            return false;
        }

        let short_id = region.short_id.to_lowercase();
        !self
            .denylist
            .iter()
            .any(|entry| short_id.contains(entry.as_str()))
    }

    pub fn filter(&self, regions: &[Region]) -> Vec<Region> {
        regions
            .iter()
            .filter(|region| self.keeps(region))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Rect;

    fn region(full_id: &str) -> Region {
        Region::from_full_id(full_id, 1, Rect::new(0.1, 0.1, 0.2, 0.02))
    }

    fn sample() -> Vec<Region> {
        vec![
            region("form1[0].Holder[0].FirstName[0]"),
            region("form1[0].Holder[0].SubmitBtn[0]"),
            region("form1[0].Holder[0].CheckBox1[0]"),
            region("form1[0].Holder[0].Signature[0]"),
            region("form1[0].#subform[3]"),
            region("form1[0].Holder[0].ab"),
            region("form1[0].Holder[0].BARCODE1"),
            region("form1[0].Holder[0].City[0]"),
            region("form1[0].Options[0].RB1[0]"),
            region("form1[0].Options[0].ck2[0]"),
            region("form1[0].Table[0].Row1[0]"),
            region("form1[0].Holder[0].CheckAmount[0]"),
            region("form1[0].Benef[0].City[0]"),
        ]
    }

    #[test]
    fn structural_and_short_regions_are_dropped_in_order() {
        let kept = RegionFilter::default().filter(&sample());
        let full_ids = kept
            .iter()
            .map(|region| region.full_id.as_str())
            .collect::<Vec<&str>>();
        assert_eq!(
            full_ids,
            vec![
                "form1[0].Holder[0].FirstName[0]",
                "form1[0].Holder[0].City[0]",
                "form1[0].Holder[0].CheckAmount[0]",
                "form1[0].Benef[0].City[0]",
            ]
        );
    }

    #[test]
    fn filtering_twice_changes_nothing() {
        let filter = RegionFilter::default();
        let once = filter.filter(&sample());
        let twice = filter.filter(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn extra_entries_extend_default_denylist() {
        let filter = RegionFilter::default().with_extra_entries(&["City"]);
        let kept = filter.filter(&sample());
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].short_id, "FirstName[0]");
        assert_eq!(kept[1].short_id, "CheckAmount[0]");
    }
}
