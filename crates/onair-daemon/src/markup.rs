//! Icecast HTML status page → `ListenerSnapshot`.
//!
//! The page is meant for humans.  Each mount is rendered as a `.roundbox`
//! holding an `h3.mount` heading and a two-column table of labelled rows.
//! Nothing about that layout is a contract, so every lookup degrades to an
//! extraction miss instead of an error that would disturb the poll cycle.

use crate::error::{FeedError, Result};
use crate::fetch::Fetcher;
use onair_proto::protocol::ListenerSnapshot;
use scraper::{ElementRef, Html, Selector};

const MOUNT_HEADING: &str = "h3.mount";
const INFO_BOX_CLASS: &str = "roundbox";
const ROWS: &str = "table tr";
const CELLS: &str = "td";

const LABEL_NOW_PLAYING: &str = "Currently playing:";
const LABEL_LISTENERS: &str = "Listeners (current):";

#[derive(Clone)]
pub struct MarkupClient {
    fetcher: Fetcher,
    url: String,
    mount_heading: String,
}

impl MarkupClient {
    pub fn new(fetcher: Fetcher, url: String, mount_heading: String) -> Self {
        Self {
            fetcher,
            url,
            mount_heading,
        }
    }

    /// Fetch the status page and extract our mount.  `ExtractionMiss` means
    /// "leave the current snapshot alone".
    pub async fn fetch(&self) -> Result<ListenerSnapshot> {
        let html = self.fetcher.get_text(&self.url).await?;
        extract_from_html(&html, &self.mount_heading)
    }
}

pub fn extract_from_html(html: &str, mount_heading: &str) -> Result<ListenerSnapshot> {
    let document = Html::parse_document(html);
    extract_snapshot(&document, mount_heading)
}

/// Locate the mount whose heading text is exactly `mount_heading`, climb to
/// its info box and read the labelled rows inside it.
pub fn extract_snapshot(document: &Html, mount_heading: &str) -> Result<ListenerSnapshot> {
    let heading_sel = selector(MOUNT_HEADING)?;
    let rows_sel = selector(ROWS)?;
    let cells_sel = selector(CELLS)?;

    // Exact text match: other mounts on the same page share the prefix.
    let heading = document
        .select(&heading_sel)
        .find(|h| text_of(h) == mount_heading)
        .ok_or_else(|| FeedError::ExtractionMiss(format!("mount '{}' not found", mount_heading)))?;

    let info_box = closest_with_class(heading, INFO_BOX_CLASS).ok_or_else(|| {
        FeedError::ExtractionMiss(format!("mount '{}' has no info box", mount_heading))
    })?;

    let mut snapshot = ListenerSnapshot::default();
    for row in info_box.select(&rows_sel) {
        let cells: Vec<ElementRef> = row.select(&cells_sel).collect();
        let [label, value] = cells.as_slice() else {
            continue;
        };
        let value = text_of(value);
        match text_of(label).as_str() {
            LABEL_NOW_PLAYING => snapshot.now_playing = value,
            LABEL_LISTENERS => snapshot.listeners = parse_leading_int(&value),
            _ => {}
        }
    }
    Ok(snapshot)
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| FeedError::Decode(format!("selector '{}': {}", css, e)))
}

fn text_of(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// The element itself or its nearest ancestor carrying `class`.
fn closest_with_class<'a>(element: ElementRef<'a>, class: &str) -> Option<ElementRef<'a>> {
    std::iter::once(element)
        .chain(element.ancestors().filter_map(ElementRef::wrap))
        .find(|el| el.value().classes().any(|c| c == class))
}

/// Leading decimal digits of `raw` (`"12 listeners"` → 12).  No digits, a
/// negative sign or overflow yield 0.
pub fn parse_leading_int(raw: &str) -> u64 {
    let raw = raw.trim_start();
    let raw = raw.strip_prefix('+').unwrap_or(raw);
    let digits_end = raw
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(raw.len());
    raw[..digits_end].parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOUNT: &str = "Mount Point /stream.mp3";

    fn mount_box(heading: &str, rows: &[(&str, &str)]) -> String {
        let rows: String = rows
            .iter()
            .map(|(l, v)| format!("<tr><td>{}</td><td class=\"streamstats\">{}</td></tr>", l, v))
            .collect();
        format!(
            r#"<div class="roundbox">
                 <div class="mounthead"><h3 class="mount">{}</h3></div>
                 <div class="mountcont"><table class="yellowkeys"><tbody>{}</tbody></table></div>
               </div>"#,
            heading, rows
        )
    }

    fn page(boxes: &[String]) -> String {
        format!(
            "<html><head><title>Icecast Streaming Media Server</title></head><body>{}</body></html>",
            boxes.concat()
        )
    }

    #[test]
    fn test_extracts_now_playing_and_listeners() {
        let html = page(&[mount_box(
            MOUNT,
            &[
                ("Stream Name:", "Live Radio"),
                ("Listeners (current):", "7"),
                ("Currently playing:", "Artist - Song.mp3"),
            ],
        )]);
        let snapshot = extract_from_html(&html, MOUNT).unwrap();
        assert_eq!(snapshot.now_playing, "Artist - Song.mp3");
        assert_eq!(snapshot.listeners, 7);
    }

    #[test]
    fn test_missing_mount_is_extraction_miss() {
        let html = page(&[mount_box("Mount Point /other.ogg", &[("Listeners (current):", "3")])]);
        let err = extract_from_html(&html, MOUNT).unwrap_err();
        assert!(err.is_extraction_miss());

        let err = extract_from_html("<html><body>maintenance</body></html>", MOUNT).unwrap_err();
        assert!(err.is_extraction_miss());
    }

    #[test]
    fn test_mount_match_is_exact_not_prefix() {
        let html = page(&[
            mount_box(
                "Mount Point /stream.mp3.backup",
                &[("Currently playing:", "wrong"), ("Listeners (current):", "99")],
            ),
            mount_box(
                &format!("  {}\n", MOUNT),
                &[("Currently playing:", "right"), ("Listeners (current):", "2")],
            ),
        ]);
        let snapshot = extract_from_html(&html, MOUNT).unwrap();
        assert_eq!(snapshot.now_playing, "right");
        assert_eq!(snapshot.listeners, 2);
    }

    #[test]
    fn test_heading_without_info_box_is_miss() {
        let html = format!(
            "<html><body><h3 class=\"mount\">{}</h3><table><tr><td>Currently playing:</td><td>x</td></tr></table></body></html>",
            MOUNT
        );
        assert!(extract_from_html(&html, MOUNT).unwrap_err().is_extraction_miss());
    }

    #[test]
    fn test_partial_rows_keep_defaults() {
        let html = page(&[mount_box(MOUNT, &[("Currently playing:", "Only Title")])]);
        let snapshot = extract_from_html(&html, MOUNT).unwrap();
        assert_eq!(snapshot.now_playing, "Only Title");
        assert_eq!(snapshot.listeners, 0);

        // located box with no recognised rows is still an update
        let html = page(&[mount_box(MOUNT, &[("Bitrate:", "128")])]);
        assert_eq!(extract_from_html(&html, MOUNT).unwrap(), ListenerSnapshot::default());
    }

    #[test]
    fn test_rows_with_other_cell_counts_skipped() {
        let html = format!(
            r#"<html><body><div class="roundbox"><h3 class="mount">{}</h3><table>
                 <tr><td>Currently playing:</td><td>A</td><td>extra</td></tr>
                 <tr><td>Listeners (current):</td></tr>
                 <tr><td>Listeners (current):</td><td>4</td></tr>
               </table></div></body></html>"#,
            MOUNT
        );
        let snapshot = extract_from_html(&html, MOUNT).unwrap();
        assert_eq!(snapshot.now_playing, "");
        assert_eq!(snapshot.listeners, 4);
    }

    #[test]
    fn test_row_order_does_not_matter() {
        let html = page(&[mount_box(
            MOUNT,
            &[("Currently playing:", "B - Two"), ("Listeners (current):", "11")],
        )]);
        let reversed = page(&[mount_box(
            MOUNT,
            &[("Listeners (current):", "11"), ("Currently playing:", "B - Two")],
        )]);
        assert_eq!(
            extract_from_html(&html, MOUNT).unwrap(),
            extract_from_html(&reversed, MOUNT).unwrap()
        );
    }

    #[test]
    fn test_listener_count_garbage_is_zero() {
        let html = page(&[mount_box(MOUNT, &[("Listeners (current):", "n/a")])]);
        assert_eq!(extract_from_html(&html, MOUNT).unwrap().listeners, 0);
    }

    #[test]
    fn test_parse_leading_int() {
        assert_eq!(parse_leading_int("12"), 12);
        assert_eq!(parse_leading_int("12 listeners"), 12);
        assert_eq!(parse_leading_int("+5"), 5);
        assert_eq!(parse_leading_int("  8"), 8);
        assert_eq!(parse_leading_int("-3"), 0);
        assert_eq!(parse_leading_int("abc"), 0);
        assert_eq!(parse_leading_int(""), 0);
        assert_eq!(parse_leading_int("99999999999999999999999"), 0);
    }
}
