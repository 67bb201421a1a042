use super::{record_key, MetadataIndex, MetadataRecord, AUDIO_SCORES_COLUMN, FILE_COLUMN};
use crate::hasher;
use crate::progress::PipelineReporter;
use crate::table::Cell;
use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};
use serde_json::Value;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("record has no 'audio_scores' field")]
    MissingAudioScores,

    #[error("could not render 'audio_scores': {0}")]
    Render(#[from] serde_json::Error),
}

/// A metadata record copied out of the index and extended with the file's
/// bytes and its rendered scores.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRow {
    pub source: PathBuf,
    pub key: String,
    fields: HashMap<String, Cell>,
}

impl JoinedRow {
    pub fn get(&self, name: &str) -> Option<&Cell> {
        self.fields.get(name)
    }

    pub fn take(&mut self, name: &str) -> Option<Cell> {
        self.fields.remove(name)
    }
}

/// Pairs each incoming file with its metadata record, skipping (and reporting)
/// files without a usable key, without a record, or that fail to read or merge.
pub struct Join<'m, 'r, I> {
    files: I,
    index: &'m MetadataIndex,
    reporter: &'r dyn PipelineReporter,
}

impl<'m, 'r, I> Join<'m, 'r, I>
where
    I: Iterator<Item = PathBuf>,
{
    pub fn new(files: I, index: &'m MetadataIndex, reporter: &'r dyn PipelineReporter) -> Self {
        Self {
            files,
            index,
            reporter,
        }
    }
}

impl<I> Iterator for Join<'_, '_, I>
where
    I: Iterator<Item = PathBuf>,
{
    type Item = JoinedRow;

    fn next(&mut self) -> Option<JoinedRow> {
        for file in self.files.by_ref() {
            if let Some(row) = join_one(self.index, self.reporter, file) {
                return Some(row);
            }
        }
        None
    }
}

pub trait JoinMetadata: Iterator<Item = PathBuf> + Sized {
    fn join_metadata<'m, 'r>(
        self,
        index: &'m MetadataIndex,
        reporter: &'r dyn PipelineReporter,
    ) -> Join<'m, 'r, Self> {
        Join::new(self, index, reporter)
    }
}

impl<I: Iterator<Item = PathBuf>> JoinMetadata for I {}

fn join_one(
    index: &MetadataIndex,
    reporter: &dyn PipelineReporter,
    file: PathBuf,
) -> Option<JoinedRow> {
    let Some(key) = record_key(&file) else {
        reporter.on_key_missing(&file);
        return None;
    };

    let Some(record) = index.get(&key) else {
        reporter.on_metadata_missing(&file, &key);
        return None;
    };

    let bytes = match hasher::read_full_file(&file) {
        Ok(bytes) => bytes,
        Err(e) => {
            reporter.on_read_failed(&file, &e);
            return None;
        }
    };

    match merge(record, bytes) {
        Ok(fields) => Some(JoinedRow {
            source: file,
            key,
            fields,
        }),
        Err(e) => {
            reporter.on_merge_failed(&file, &e);
            None
        }
    }
}

/// The nested metadata is cloned so rows never alias the shared index.
fn merge(record: &MetadataRecord, file_bytes: Vec<u8>) -> Result<HashMap<String, Cell>, MergeError> {
    let scores = record
        .audio_scores
        .as_ref()
        .ok_or(MergeError::MissingAudioScores)?;

    let mut fields: HashMap<String, Cell> = record
        .metadata
        .iter()
        .map(|(name, value)| (name.clone(), Cell::Json(value.clone())))
        .collect();
    fields.insert(AUDIO_SCORES_COLUMN.to_string(), Cell::Text(render_scores(scores)?));
    fields.insert(FILE_COLUMN.to_string(), Cell::Binary(file_bytes));
    Ok(fields)
}

/// JSON text in the layout Python's `json.dumps` produces: `", "` and `": "`
/// separators, `repr`-style floats (`1e-05`, `1.0`) and non-ASCII escaped
/// as `\uXXXX`.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_f64<W>(&mut self, writer: &mut W, value: f64) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(float_repr(value).as_bytes())
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (i, ch) in fragment.char_indices() {
            if ch.is_ascii() && ch != '\x7f' {
                continue;
            }
            writer.write_all(fragment[start..i].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units).iter() {
                write!(writer, "\\u{:04x}", unit)?;
            }
            start = i + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

/// Shortest round-trip digits, fixed notation for exponents in `-4..16` and
/// `d.ddde+XX` otherwise.
fn float_repr(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }

    // `{:e}` gives the shortest digits that round-trip, e.g. `-1.25e-7`.
    let sci = format!("{:e}", value);
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", mantissa),
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    if (-4..16).contains(&exp) {
        let point = exp + 1;
        if point <= 0 {
            format!("{sign}0.{}{digits}", "0".repeat(point.unsigned_abs() as usize))
        } else if point as usize >= digits.len() {
            format!("{sign}{digits}{}.0", "0".repeat(point as usize - digits.len()))
        } else {
            let (int, frac) = digits.split_at(point as usize);
            format!("{sign}{int}.{frac}")
        }
    } else {
        let (lead, rest) = digits.split_at(1);
        let frac = if rest.is_empty() { String::new() } else { format!(".{rest}") };
        let exp_sign = if exp < 0 { '-' } else { '+' };
        format!("{sign}{lead}{frac}e{exp_sign}{:02}", exp.unsigned_abs())
    }
}

fn render_scores(scores: &Value) -> Result<String, serde_json::Error> {
    let mut out = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut out, SpacedFormatter);
    scores.serialize(&mut serializer)?;
    // serde_json only ever emits UTF-8.
    Ok(String::from_utf8_lossy(&out).into_owned())
}
