use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};

use hscpcore::dedx::calibration::{DeDxTemplates, TrackerGains};

use crate::error::Result;
use crate::event::record::EventRecord;
use crate::output::histogram::HistogramBook;
use crate::output::ntuple::EventRow;

const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

#[derive(Serialize, Deserialize)]
pub struct NtupleFile {
    pub version: u32,
    pub events: Vec<EventRow>,
}

impl NtupleFile {
    pub fn new(events: Vec<EventRow>) -> Self {
        Self { version: 1, events }
    }
}

fn to_io<E>(e: E) -> io::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    io::Error::new(io::ErrorKind::Other, e)
}

fn is_zstd(path: &Path) -> io::Result<bool> {
    let mut magic = [0u8; 4];
    let mut f = File::open(path)?;
    match f.read_exact(&mut magic) {
        Ok(()) => Ok(magic == ZSTD_MAGIC),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

fn write_bincode<T: Serialize>(path: &Path, value: &T, compress: bool) -> io::Result<()> {
    let f = File::create(path)?;
    if compress {
        let mut zw = zstd::Encoder::new(f, 3)?;
        bincode::serialize_into(&mut zw, value).map_err(to_io)?;
        zw.finish()?;
        Ok(())
    } else {
        let mut bw = BufWriter::new(f);
        bincode::serialize_into(&mut bw, value).map_err(to_io)
    }
}

fn read_bincode<T: for<'de> Deserialize<'de>>(path: &Path) -> io::Result<T> {
    if is_zstd(path)? {
        let mut zr = zstd::Decoder::new(File::open(path)?)?;
        return bincode::deserialize_from(&mut zr).map_err(to_io);
    }
    let f = BufReader::new(File::open(path)?);
    bincode::deserialize_from(f).map_err(to_io)
}

// --- n-tuple, JSON ---
pub fn save_json(path: impl AsRef<Path>, events: &[EventRow]) -> io::Result<()> {
    let f = BufWriter::new(File::create(path)?);
    let nf = NtupleFile::new(events.to_vec());
    serde_json::to_writer_pretty(f, &nf).map_err(to_io)
}

pub fn load_json(path: impl AsRef<Path>) -> io::Result<Vec<EventRow>> {
    let f = BufReader::new(File::open(path)?);
    let nf: NtupleFile = serde_json::from_reader(f).map_err(to_io)?;
    Ok(nf.events)
}

// --- n-tuple, bincode with optional zstd compression ---
pub fn save_bincode(path: impl AsRef<Path>, events: &[EventRow], compress: bool) -> io::Result<()> {
    write_bincode(path.as_ref(), &NtupleFile::new(events.to_vec()), compress)
}

/// Load a bincode n-tuple, compressed or not.
pub fn load_bincode(path: impl AsRef<Path>) -> io::Result<Vec<EventRow>> {
    let nf: NtupleFile = read_bincode(path.as_ref())?;
    Ok(nf.events)
}

// --- histograms ---
pub fn save_histograms_json(path: impl AsRef<Path>, book: &HistogramBook) -> io::Result<()> {
    let f = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(f, book).map_err(to_io)
}

pub fn load_histograms_json(path: impl AsRef<Path>) -> io::Result<HistogramBook> {
    let f = BufReader::new(File::open(path)?);
    serde_json::from_reader(f).map_err(to_io)
}

pub fn save_histograms_bincode(path: impl AsRef<Path>, book: &HistogramBook, compress: bool) -> io::Result<()> {
    write_bincode(path.as_ref(), book, compress)
}

pub fn load_histograms_bincode(path: impl AsRef<Path>) -> io::Result<HistogramBook> {
    read_bincode(path.as_ref())
}

// --- inputs ---

/// Read event records, JSON when the file ends in `.json`, bincode otherwise.
pub fn load_events(path: impl AsRef<Path>) -> io::Result<Vec<EventRecord>> {
    let path = path.as_ref();
    if path.extension().is_some_and(|e| e == "json") {
        let f = BufReader::new(File::open(path)?);
        return serde_json::from_reader(f).map_err(to_io);
    }
    read_bincode(path)
}

pub fn save_events_bincode(path: impl AsRef<Path>, events: &[EventRecord], compress: bool) -> io::Result<()> {
    write_bincode(path.as_ref(), &events, compress)
}

/// load the dE/dx templates from a JSON file
///
/// Arguments:
///
/// * `path` - path of the template file
///
/// Returns:
///
/// * validated templates
pub fn load_templates(path: impl AsRef<Path>) -> Result<DeDxTemplates> {
    let f = BufReader::new(File::open(path)?);
    let mut templates: DeDxTemplates = serde_json::from_reader(f)?;
    templates.validate()?;
    Ok(templates)
}

/// Load per module gains, a JSON object from module id to gain.
pub fn load_gains(path: impl AsRef<Path>) -> Result<TrackerGains> {
    let f = BufReader::new(File::open(path)?);
    let gains = serde_json::from_reader(f)?;
    Ok(TrackerGains::new(gains)?)
}
