//! Streaming collector for decompressed GKG record sets.
//!
//! GKG files are tab-delimited with no reliable quoting and occasionally
//! broken rows; parsing is deliberately lenient and row errors never abort
//! the stream.

use std::borrow::Cow;
use std::io::Read;

use anyhow::Result;
use csv::{ByteRecord, ReaderBuilder, Trim};
use itertools::Itertools;
use tracing::{debug, warn};

use crate::models::Collector;
use crate::tokenize::split_and_clean;

const HEADER_MARKERS: [&str; 4] = ["v2themes", "v2persons", "v2organizations", "documentidentifier"];

/// Column positions of the four fields the pipeline extracts. Defaults are
/// the canonical GKG v2 layout; a detected header row overrides them for the
/// stream it appears in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnIndices {
    pub themes: usize,
    pub persons: usize,
    pub orgs: usize,
    pub document_identifier: usize,
}

impl Default for ColumnIndices {
    fn default() -> Self {
        ColumnIndices {
            themes: 7,
            persons: 9,
            orgs: 10,
            document_identifier: 4,
        }
    }
}

/// Stream-parse tab-delimited records into a [`Collector`].
///
/// The first record is checked for a header; if one is found it remaps the
/// column indices for this stream and is not emitted as data. Out-of-range
/// columns read as empty, row-level parse failures are counted and skipped.
pub fn read_records<R: Read>(reader: R, seed: ColumnIndices) -> Result<Collector> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .trim(Trim::All)
        .from_reader(reader);

    let mut indices = seed;
    let mut collector = Collector::default();
    let mut first = true;

    for (row, result) in rdr.byte_records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!("Row parse error - row={}, error={}", row + 1, e);
                collector.row_errors += 1;
                continue;
            }
        };
        if first {
            first = false;
            if apply_header(&record, &mut indices) {
                debug!(
                    "Header detected - themes={}, persons={}, orgs={}, document_identifier={}",
                    indices.themes, indices.persons, indices.orgs, indices.document_identifier
                );
                continue;
            }
        }
        absorb_row(&mut collector, &record, &indices);
        collector.rows += 1;
    }

    Ok(collector)
}

/// Returns true when the record is a header row, remapping `indices` to the
/// detected positions.
fn apply_header(record: &ByteRecord, indices: &mut ColumnIndices) -> bool {
    let joined = record
        .iter()
        .map(String::from_utf8_lossy)
        .join("\t")
        .to_lowercase();
    if !HEADER_MARKERS.iter().any(|marker| joined.contains(marker)) {
        return false;
    }

    let find = |marker: &str| {
        record
            .iter()
            .position(|cell| String::from_utf8_lossy(cell).to_lowercase().contains(marker))
    };
    if let Some(i) = find("v2themes") {
        indices.themes = i;
    }
    if let Some(i) = find("v2persons") {
        indices.persons = i;
    }
    if let Some(i) = find("v2organizations") {
        indices.orgs = i;
    }
    if let Some(i) = find("documentidentifier") {
        indices.document_identifier = i;
    }
    true
}

fn absorb_row(collector: &mut Collector, record: &ByteRecord, indices: &ColumnIndices) {
    let field = |i: usize| -> Cow<'_, str> {
        record
            .get(i)
            .map(String::from_utf8_lossy)
            .unwrap_or(Cow::Borrowed(""))
    };

    let themes = field(indices.themes);
    if !themes.is_empty() {
        collector.themes.extend(split_and_clean(&themes));
    }
    let persons = field(indices.persons);
    if !persons.is_empty() {
        collector.persons.extend(split_and_clean(&persons));
    }
    let orgs = field(indices.orgs);
    if !orgs.is_empty() {
        collector.orgs.extend(split_and_clean(&orgs));
    }

    let doc = field(indices.document_identifier);
    if !doc.is_empty() {
        collector.document_identifiers.extend(
            doc.split('|')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(data: &str) -> Collector {
        read_records(data.as_bytes(), ColumnIndices::default()).unwrap()
    }

    #[test]
    fn header_row_remaps_indices_and_is_not_data() {
        let data = "date\tV2Themes\tV2Persons\tV2Organizations\tDocumentIdentifier\n\
                    20240501\tTAX_POLITICAL;WAR_CONFLICT\tJohn Doe\tUnited Nations\thttp://a.example/x\n";
        let collector = collect(data);
        assert_eq!(collector.rows, 1);
        assert_eq!(
            collector.themes,
            vec!["tax_political".to_string(), "war_conflict".to_string()]
        );
        assert_eq!(collector.persons, vec!["john doe".to_string()]);
        assert_eq!(collector.orgs, vec!["united nations".to_string()]);
        assert_eq!(collector.document_identifiers, vec!["http://a.example/x".to_string()]);
    }

    #[test]
    fn headerless_rows_use_canonical_positions() {
        // canonical layout: docid at 4, themes at 7, persons at 9, orgs at 10
        let mut cols = vec![""; 11];
        cols[4] = "http://b.example/y";
        cols[7] = "ECON_TAXATION";
        cols[9] = "Jane Roe";
        cols[10] = "World Bank";
        let data = format!("{}\n", cols.join("\t"));

        let collector = collect(&data);
        assert_eq!(collector.rows, 1);
        assert_eq!(collector.themes, vec!["econ_taxation".to_string()]);
        assert_eq!(collector.persons, vec!["jane roe".to_string()]);
        assert_eq!(collector.orgs, vec!["world bank".to_string()]);
        assert_eq!(collector.document_identifiers, vec!["http://b.example/y".to_string()]);
    }

    #[test]
    fn document_identifiers_split_on_pipe() {
        let data = "h\tV2Themes\tDocumentIdentifier\nECON\tECON_TRADE\thttp://a |http://b||http://c\n";
        let collector = read_records(data.as_bytes(), ColumnIndices::default()).unwrap();
        assert_eq!(
            collector.document_identifiers,
            vec!["http://a".to_string(), "http://b".to_string(), "http://c".to_string()]
        );
    }

    #[test]
    fn short_rows_read_missing_columns_as_empty() {
        let collector = collect("only\ttwo\n");
        assert_eq!(collector.rows, 1);
        assert!(collector.is_empty());
        assert_eq!(collector.row_errors, 0);
    }

    #[test]
    fn configured_indices_apply_without_header() {
        let seed = ColumnIndices {
            themes: 1,
            persons: 2,
            orgs: 3,
            document_identifier: 0,
        };
        let data = "http://doc.example\tENV_CLIMATE\tGreta Thunberg\tGreenpeace\n";
        let collector = read_records(data.as_bytes(), seed).unwrap();
        assert_eq!(collector.themes, vec!["env_climate".to_string()]);
        assert_eq!(collector.persons, vec!["greta thunberg".to_string()]);
        assert_eq!(collector.orgs, vec!["greenpeace".to_string()]);
        assert_eq!(collector.document_identifiers, vec!["http://doc.example".to_string()]);
    }

    #[test]
    fn invalid_utf8_does_not_abort_the_stream() {
        let mut data: Vec<u8> = Vec::new();
        let mut cols = vec![b"".to_vec(); 11];
        cols[7] = b"WAR_\xffCONFLICT".to_vec();
        data.extend(cols.join(&b"\t"[..]));
        data.push(b'\n');
        data.extend(b"second\trow\n".iter());

        let collector = read_records(&data[..], ColumnIndices::default()).unwrap();
        // lossy decoding keeps the row; both rows are counted
        assert_eq!(collector.rows, 2);
        assert_eq!(collector.row_errors, 0);
        assert_eq!(collector.themes.len(), 1);
    }
}
