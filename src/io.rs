//! Record readers and writers for the command line pipeline.
//!
//! `-` stands for stdin (inputs) or stdout (outputs).

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};

use crate::error::{Error, Result};
use crate::models::{Entity, GeocodingResult, ResultRow};

/// Output encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Format {
    Csv,
    /// JSON lines of graph entities
    #[default]
    #[value(alias = "ftm")]
    Entities,
}

/// One row of address input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostalRow {
    pub original_line: String,
    pub country: Option<String>,
    pub language: Option<String>,
    /// Other columns, passed through in input order
    pub extra: Vec<(String, String)>,
}

impl PostalRow {
    pub fn new(original_line: &str) -> Self {
        Self {
            original_line: original_line.to_string(),
            ..Default::default()
        }
    }

    /// All columns, known ones first
    pub fn fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("original_line".to_string(), self.original_line.clone()),
            ("country".to_string(), self.country.clone().unwrap_or_default()),
            ("language".to_string(), self.language.clone().unwrap_or_default()),
        ];
        fields.extend(self.extra.iter().cloned());
        fields
    }
}

/// One row of coordinate input.
#[derive(Debug, Clone, PartialEq)]
pub struct LatLonRow {
    pub lat: f64,
    pub lon: f64,
    pub extra: Vec<(String, String)>,
}

impl LatLonRow {
    pub fn fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("lat".to_string(), self.lat.to_string()),
            ("lon".to_string(), self.lon.to_string()),
        ];
        fields.extend(self.extra.iter().cloned());
        fields
    }
}

pub fn open_input(path: &str) -> Result<Box<dyn Read + Send>> {
    if path == "-" {
        return Ok(Box::new(io::stdin()));
    }
    let file = File::open(path)
        .map_err(|e| Error::Input(format!("cannot open '{}': {}", path, e)))?;
    Ok(Box::new(file))
}

pub fn open_output(path: &str) -> Result<Box<dyn Write + Send>> {
    if path == "-" {
        return Ok(Box::new(io::stdout()));
    }
    let file = File::create(path)
        .map_err(|e| Error::Input(format!("cannot create '{}': {}", path, e)))?;
    Ok(Box::new(file))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Lazily read CSV records as header-keyed field lists.
fn read_records<R: Read>(reader: R) -> Result<(Vec<String>, csv::StringRecordsIntoIter<R>)> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    Ok((headers, reader.into_records()))
}

pub fn postal_rows<R: Read>(reader: R) -> Result<impl Iterator<Item = Result<PostalRow>>> {
    let (headers, records) = read_records(reader)?;
    if !headers.iter().any(|h| h == "original_line") {
        return Err(Error::Input("missing column 'original_line'".to_string()));
    }
    Ok(records.map(move |record| -> Result<PostalRow> {
        let record = record?;
        let mut row = PostalRow::default();
        for (name, value) in headers.iter().zip(record.iter()) {
            match name.as_str() {
                "original_line" => row.original_line = value.to_string(),
                "country" => row.country = non_empty(Some(value)),
                "language" => row.language = non_empty(Some(value)),
                _ => row.extra.push((name.clone(), value.to_string())),
            }
        }
        Ok(row)
    }))
}

pub fn read_postal_csv(path: &str) -> Result<impl Iterator<Item = Result<PostalRow>>> {
    postal_rows(open_input(path)?)
}

pub fn latlon_rows<R: Read>(reader: R) -> Result<impl Iterator<Item = Result<LatLonRow>>> {
    let (headers, records) = read_records(reader)?;
    for column in ["lat", "lon"] {
        if !headers.iter().any(|h| h == column) {
            return Err(Error::Input(format!("missing column '{}'", column)));
        }
    }
    Ok(records.map(move |record| -> Result<LatLonRow> {
        let record = record?;
        let (mut lat, mut lon) = (None, None);
        let mut extra = Vec::new();
        for (name, value) in headers.iter().zip(record.iter()) {
            match name.as_str() {
                "lat" => lat = value.trim().parse::<f64>().ok(),
                "lon" => lon = value.trim().parse::<f64>().ok(),
                _ => extra.push((name.clone(), value.to_string())),
            }
        }
        match (lat, lon) {
            (Some(lat), Some(lon)) => Ok(LatLonRow { lat, lon, extra }),
            _ => Err(Error::Input(format!(
                "invalid coordinates in record {:?}",
                record.position().map(|p| p.line())
            ))),
        }
    }))
}

pub fn read_latlon_csv(path: &str) -> Result<impl Iterator<Item = Result<LatLonRow>>> {
    latlon_rows(open_input(path)?)
}

pub fn result_rows<R: Read>(reader: R) -> impl Iterator<Item = Result<GeocodingResult>> {
    csv::Reader::from_reader(reader)
        .into_deserialize::<ResultRow>()
        .map(|row| -> Result<GeocodingResult> { GeocodingResult::from_row(row?) })
}

pub fn read_results_csv(path: &str) -> Result<impl Iterator<Item = Result<GeocodingResult>>> {
    Ok(result_rows(open_input(path)?))
}

pub fn entities<R: Read>(reader: R) -> impl Iterator<Item = Result<Entity>> {
    BufReader::new(reader)
        .lines()
        .filter(|line| !matches!(line, Ok(l) if l.trim().is_empty()))
        .map(|line| -> Result<Entity> { Ok(serde_json::from_str(&line?)?) })
}

pub fn read_entities(path: &str) -> Result<impl Iterator<Item = Result<Entity>>> {
    Ok(entities(open_input(path)?))
}

enum Sink {
    Csv {
        writer: csv::Writer<Box<dyn Write + Send>>,
        header: Option<Vec<String>>,
    },
    Lines(BufWriter<Box<dyn Write + Send>>),
}

/// Writes flat records (CSV) or entities (JSON lines).
pub struct RecordWriter {
    sink: Sink,
    written: usize,
}

impl RecordWriter {
    pub fn new(output: Box<dyn Write + Send>, format: Format) -> Self {
        let sink = match format {
            Format::Csv => Sink::Csv {
                writer: csv::Writer::from_writer(output),
                header: None,
            },
            Format::Entities => Sink::Lines(BufWriter::new(output)),
        };
        Self { sink, written: 0 }
    }

    pub fn create(path: &str, format: Format) -> Result<Self> {
        Ok(Self::new(open_output(path)?, format))
    }

    pub fn format(&self) -> Format {
        match self.sink {
            Sink::Csv { .. } => Format::Csv,
            Sink::Lines(_) => Format::Entities,
        }
    }

    /// Write a flat record. In CSV the first record fixes the columns; later
    /// records are matched by name, missing values left blank. In entity
    /// output the record becomes a JSON object.
    pub fn write_fields(&mut self, fields: &[(String, String)]) -> Result<()> {
        match &mut self.sink {
            Sink::Csv { writer, header } => {
                if header.is_none() {
                    let columns: Vec<String> = fields.iter().map(|(k, _)| k.clone()).collect();
                    writer.write_record(&columns)?;
                    *header = Some(columns);
                }
                let columns = header.as_deref().unwrap_or_default();
                let row: Vec<&str> = columns
                    .iter()
                    .map(|c| {
                        fields
                            .iter()
                            .rev()
                            .find(|(k, _)| k == c)
                            .map(|(_, v)| v.as_str())
                            .unwrap_or("")
                    })
                    .collect();
                writer.write_record(&row)?;
            }
            Sink::Lines(out) => {
                let object: serde_json::Map<String, serde_json::Value> = fields
                    .iter()
                    .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                    .collect();
                serde_json::to_writer(&mut *out, &object)?;
                out.write_all(b"\n")?;
            }
        }
        self.written += 1;
        Ok(())
    }

    /// Write an entity. CSV output flattens it to `id`, `schema` and
    /// `;`-joined properties.
    pub fn write_entity(&mut self, entity: &Entity) -> Result<()> {
        match &mut self.sink {
            Sink::Lines(out) => {
                serde_json::to_writer(&mut *out, entity)?;
                out.write_all(b"\n")?;
                self.written += 1;
                Ok(())
            }
            Sink::Csv { .. } => self.write_fields(&entity.fields()),
        }
    }

    /// Write a geocoding result in the writer's format.
    pub fn write_result(&mut self, result: &GeocodingResult, include_raw: bool) -> Result<()> {
        match self.sink {
            Sink::Csv { .. } => self.write_fields(&result.to_row().fields(include_raw)),
            Sink::Lines(_) => self.write_entity(&result.to_entity()),
        }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn flush(&mut self) -> Result<()> {
        match &mut self.sink {
            Sink::Csv { writer, .. } => writer.flush()?,
            Sink::Lines(out) => out.flush()?,
        }
        Ok(())
    }
}

/// In-memory output that stays readable after the writer is done.
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct SharedBuf(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

#[cfg(test)]
impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
impl SharedBuf {
    pub(crate) fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }

    pub(crate) fn writer(&self, format: Format) -> RecordWriter {
        RecordWriter::new(Box::new(self.clone()), format)
    }
}
