//! SRT caption parsing.
//!
//! Turns a captions file into an ordered sequence of [`Cue`]s. Only the
//! cue texts matter downstream (the rewrite pipeline works on fragments);
//! timestamps are parsed strictly so malformed files fail early instead of
//! producing silently truncated transcripts.

use anyhow::{bail, Context, Result};
use std::time::Duration;

/// One subtitle entry: a time span and its text, markup stripped.
#[derive(Debug, Clone)]
pub struct Cue {
    pub start: Duration,
    pub end: Duration,
    pub text: String,
}

/// Parse SRT content into cues ordered by start time.
///
/// The numeric index line is tolerated but not required. Text lines are
/// joined with a single space.
pub fn parse_srt(input: &str) -> Result<Vec<Cue>> {
    let mut cues = Vec::new();
    let mut lines = input.lines().peekable();

    while let Some(line) = lines.next() {
        let header = line.trim().trim_start_matches('\u{feff}');
        if header.is_empty() {
            continue;
        }

        // A lone counter line precedes the timestamps in well-formed files;
        // some files omit it.
        let timing_line = if header.parse::<usize>().is_ok() {
            lines
                .next()
                .map(str::trim)
                .context("SRT cue is missing a timestamp line")?
        } else {
            header
        };

        let (start_raw, end_raw) = timing_line
            .split_once("-->")
            .map(|(a, b)| (a.trim(), b.trim()))
            .context("SRT cue timestamp line must contain '-->'")?;

        let start = parse_timestamp(start_raw)
            .with_context(|| format!("Failed to parse SRT start timestamp '{start_raw}'"))?;
        let end = parse_timestamp(end_raw)
            .with_context(|| format!("Failed to parse SRT end timestamp '{end_raw}'"))?;

        if end < start {
            bail!("SRT cue ends before it starts: {start_raw} --> {end_raw}");
        }

        let mut text_lines = Vec::new();
        while let Some(next) = lines.peek() {
            if next.trim().is_empty() {
                break;
            }
            text_lines.push(strip_markup(lines.next().unwrap().trim()));
        }

        cues.push(Cue {
            start,
            end,
            text: text_lines.join(" "),
        });
    }

    cues.sort_by_key(|cue| cue.start);
    Ok(cues)
}

/// Ordered, non-empty fragment texts for the rewrite pipeline.
pub fn fragments(cues: &[Cue]) -> Vec<String> {
    cues.iter()
        .map(|cue| cue.text.trim().to_string())
        .filter(|text| !text.is_empty())
        .collect()
}

fn strip_markup(line: &str) -> String {
    // Inline italic/bold tags show up in downloaded subs; drop them.
    line.replace("<i>", "")
        .replace("</i>", "")
        .replace("<b>", "")
        .replace("</b>", "")
}

fn parse_timestamp(value: &str) -> Result<Duration> {
    let cleaned = value.trim().replace(',', ".");
    let (time_part, fractional_part) = match cleaned.split_once('.') {
        Some((t, f)) => (t, f),
        None => (cleaned.as_str(), "0"),
    };

    let mut hms = time_part.split(':');
    let hours = hms
        .next()
        .context("Timestamp missing hours")?
        .parse::<u64>()
        .context("Invalid hours in timestamp")?;
    let minutes = hms
        .next()
        .context("Timestamp missing minutes")?
        .parse::<u64>()
        .context("Invalid minutes in timestamp")?;
    let seconds = hms
        .next()
        .context("Timestamp missing seconds")?
        .parse::<u64>()
        .context("Invalid seconds in timestamp")?;

    if hms.next().is_some() {
        bail!("Timestamp has more than three components: {value}");
    }

    let mut millis_str = fractional_part.to_string();
    while millis_str.len() < 3 {
        millis_str.push('0');
    }
    let millis = millis_str
        .chars()
        .take(3)
        .collect::<String>()
        .parse::<u64>()
        .context("Invalid millisecond component in timestamp")?;

    Ok(Duration::from_secs(hours * 3600 + minutes * 60 + seconds) + Duration::from_millis(millis))
}
