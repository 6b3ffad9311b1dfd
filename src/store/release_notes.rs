//! Release notes: one text in, every target language out in a single job.

use crate::job::{Job, KeyRecord};
use anyhow::{Context, Result};
use std::io::BufRead;
use std::path::Path;

pub const RELEASE_NOTES_FIELD: &str = "release_notes";

/// Marker ending interactive input.
const END_MARKER: &str = "END";

/// Single-key job asking for `notes` in every target language.
pub fn build_job(notes: &str, source: &str, targets: &[String]) -> Job {
    let mut record = KeyRecord::new().with(source, notes);
    for target in targets.iter().filter(|target| target.as_str() != source) {
        record.set(target.as_str(), None);
    }
    Job::new().with(RELEASE_NOTES_FIELD, record)
}

/// Read notes line by line until a line ending in `END`.
///
/// Each line is trimmed; text before the marker on the last line is kept.
/// Hitting end of input without the marker keeps everything read.
pub fn read_until_end<R: BufRead>(reader: R) -> Result<String> {
    let mut lines = Vec::new();
    for line in reader.lines() {
        let line = line.context("Failed to read release notes")?;
        if let Some(last) = line.trim_end().strip_suffix(END_MARKER) {
            lines.push(last.trim().to_string());
            break;
        }
        lines.push(line.trim().to_string());
    }
    Ok(lines.join("\n").trim_end().to_string())
}

pub fn read_notes_file(path: &Path) -> Result<String> {
    let notes = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read release notes from {}", path.display()))?;
    Ok(notes.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_build_job() {
        let targets = vec!["en-US".to_string(), "ru".to_string(), "de-DE".to_string()];
        let job = build_job("Bug fixes", "en-US", &targets);

        assert_eq!(job.len(), 1);
        let record = job.get(RELEASE_NOTES_FIELD).unwrap();
        assert_eq!(
            record.requested_languages().collect::<Vec<_>>(),
            vec!["de-DE", "ru"]
        );
        assert_eq!(
            job.payload(),
            r#"{"release_notes":{"de-DE":null,"en-US":"Bug fixes","ru":null}}"#
        );
    }

    #[test]
    fn test_read_until_end() {
        let input = "  - Faster sync  \n- Dark mode END\nignored\n";
        assert_eq!(
            read_until_end(Cursor::new(input)).unwrap(),
            "- Faster sync\n- Dark mode"
        );
    }

    #[test]
    fn test_read_until_end_marker_on_own_line() {
        let input = "Bug fixes\nEND\n";
        assert_eq!(read_until_end(Cursor::new(input)).unwrap(), "Bug fixes");
    }

    #[test]
    fn test_read_until_eof() {
        assert_eq!(read_until_end(Cursor::new("One\nTwo")).unwrap(), "One\nTwo");
    }
}
