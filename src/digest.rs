//! Markdown digest of stored news.
//!
//! Records are grouped into one `## date` section per distinct date,
//! newest section first. Dates are free-form text, so each is parsed
//! against a handful of common layouts; sections whose date does not
//! parse go last, in first-seen order. Records without a date are
//! collected under `Misc`.
//!
//! [`parse_digest`] reads the same layout back into [`NewsItem`]s.

use chrono::NaiveDate;

use crate::models::{NewsItem, StoredRecord};

/// Section title for records without a date.
pub const UNDATED_SECTION: &str = "Misc";

const DATE_FORMATS: &[&str] = &["%d %b %Y", "%b %d %Y", "%d %B %Y", "%B %d %Y", "%Y-%m-%d"];

/// Parse a section date, trying each known layout in turn.
pub fn parse_section_date(date: &str) -> Option<NaiveDate> {
    let date = date.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date, fmt).ok())
}

/// Render `records` as a markdown digest under `# heading`.
pub fn render_digest(heading: &str, records: &[StoredRecord]) -> String {
    let mut sections: Vec<(&str, Vec<&StoredRecord>)> = Vec::new();
    for record in records {
        let date = match record.date.trim() {
            "" => UNDATED_SECTION,
            d => d,
        };
        match sections.iter_mut().find(|(d, _)| *d == date) {
            Some((_, items)) => items.push(record),
            None => sections.push((date, vec![record])),
        }
    }

    sections.sort_by_key(|(date, _)| {
        let parsed = parse_section_date(date);
        (parsed.is_none(), std::cmp::Reverse(parsed))
    });

    let mut out = format!("# {}\n\n", heading);
    for (date, items) in sections {
        out.push_str(&format!("## {}\n", date));
        for record in items {
            out.push_str(&record.to_string());
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

/// Parse a markdown digest back into news items.
///
/// Each `* title - [domain](url)` bullet becomes an item dated by the
/// nearest `## ` heading above it; bullets under `Misc` or before any
/// heading get an empty date. Bullets without a link keep an empty `url`.
pub fn parse_digest(markdown: &str) -> Vec<NewsItem> {
    let mut date = String::new();
    let mut items = Vec::new();
    for line in markdown.lines() {
        let line = line.trim_end();
        if let Some(heading) = line.strip_prefix("## ") {
            let heading = heading.trim();
            date = if heading == UNDATED_SECTION {
                String::new()
            } else {
                heading.to_string()
            };
        } else if let Some(bullet) = line.strip_prefix("* ") {
            items.push(parse_bullet(bullet).with_date(date.clone()));
        }
    }
    items
}

fn parse_bullet(bullet: &str) -> NewsItem {
    let linked = bullet.strip_suffix(')').and_then(|body| {
        let sep = body.rfind(" - [")?;
        let (domain, url) = body[sep + 4..].split_once("](")?;
        Some(NewsItem::new(&body[..sep], url).with_domain(domain))
    });
    linked.unwrap_or_else(|| NewsItem::new(bullet, ""))
}
