use std::{
    collections::BTreeMap,
    fs,
    io::{self, Cursor, Read, Write},
    path::{Path, PathBuf},
};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use libppc::{
    instruction::{condition::ConditionSpec, kind::BranchKind},
    Addr, Word,
};
use log::{error, info};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::{
    record::{BranchKey, BranchRecord, InspectionFlags},
    snapshot::Snapshot,
    store::BranchWatch,
};

pub mod autosave;


pub const FORMAT_MAGIC: [u8; 4] = *b"BWCH";
pub const FORMAT_NAME: &str = "branchwatch";
pub const FORMAT_VERSION: u32 = 1;

pub const DEFAULT_FILE_NAME: &str = "branchwatch.bwr";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Not a branch watch file")]
    BadMagic,

    #[error("Unsupported branch watch file version {0}")]
    UnsupportedVersion(u32),

    #[error("Unknown branch kind tag {0}")]
    UnknownBranchKind(u8),

    #[error("Unknown inspection flags {0:#04x}")]
    UnknownInspectionFlags(u8),

    #[error("Duplicate record {origin:#010x} -> {destination:#010x} ({kind})")]
    DuplicateRecord {
        origin: Addr,
        destination: Addr,
        kind: BranchKind,
    },

    #[error("Malformed records ({0})")]
    Decode(String),

    #[error("Couldn't encode records ({0})")]
    Encode(String),
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Bad branch watch file '{}': {source}", path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: FormatError,
    },
}

impl PersistError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn format(path: &Path, source: FormatError) -> Self {
        Self::Format {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// Magic, big-endian version, MessagePack records.
    MessagePack,
    /// A RON header line followed by a RON record list.
    Ron,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("ron") => Self::Ron,
            _ => Self::MessagePack,
        }
    }
}

/// A record as stored on disk. Session flags are left out on purpose, hit counts are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct PersistedRecord {
    origin: Addr,
    destination: Addr,
    kind: u8,
    original_instruction: Word,
    condition: Option<ConditionSpec>,
    total_hits: u64,
    inspection: u8,
}

impl From<&BranchRecord> for PersistedRecord {
    fn from(record: &BranchRecord) -> Self {
        Self {
            origin: record.key.origin,
            destination: record.key.destination,
            kind: record.key.kind.tag(),
            original_instruction: record.original_instruction,
            condition: record.condition,
            total_hits: record.total_hits,
            inspection: record.inspection.bits(),
        }
    }
}

impl TryFrom<PersistedRecord> for BranchRecord {
    type Error = FormatError;

    fn try_from(persisted: PersistedRecord) -> Result<Self, Self::Error> {
        let kind = BranchKind::from_tag(persisted.kind)
            .ok_or(FormatError::UnknownBranchKind(persisted.kind))?;

        let inspection = InspectionFlags::from_bits(persisted.inspection)
            .ok_or(FormatError::UnknownInspectionFlags(persisted.inspection))?;

        let key = BranchKey::new(persisted.origin, persisted.destination, kind);

        Ok(Self {
            condition: persisted.condition,
            total_hits: persisted.total_hits,
            hits_snapshot: persisted.total_hits,
            inspection,
            ..BranchRecord::new(key, persisted.original_instruction)
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RonHeader {
    format: String,
    version: u32,
}

pub fn encode<'a, I>(records: I, format: FileFormat) -> Result<Vec<u8>, FormatError>
where
    I: IntoIterator<Item = &'a BranchRecord>,
{
    let records: Vec<PersistedRecord> = records.into_iter().map(PersistedRecord::from).collect();

    match format {
        FileFormat::MessagePack => {
            let mut output = Vec::new();
            output.extend(FORMAT_MAGIC);
            output
                .write_u32::<BigEndian>(FORMAT_VERSION)
                .map_err(|e| FormatError::Encode(e.to_string()))?;

            rmp_serde::encode::write(&mut output, &records)
                .map_err(|e| FormatError::Encode(e.to_string()))?;

            Ok(output)
        }

        FileFormat::Ron => {
            let header = RonHeader {
                format: FORMAT_NAME.to_string(),
                version: FORMAT_VERSION,
            };

            let header = ron::to_string(&header).map_err(|e| FormatError::Encode(e.to_string()))?;
            let body = ron::ser::to_string_pretty(&records, ron::ser::PrettyConfig::default())
                .map_err(|e| FormatError::Encode(e.to_string()))?;

            Ok(format!("{}\n{}\n", header, body).into_bytes())
        }
    }
}

/// Decodes a whole file, checking the version before touching any record.
pub fn decode(data: &[u8], format: FileFormat) -> Result<Vec<BranchRecord>, FormatError> {
    let persisted: Vec<PersistedRecord> = match format {
        FileFormat::MessagePack => {
            let mut reader = Cursor::new(data);

            let mut magic = [0; FORMAT_MAGIC.len()];
            reader
                .read_exact(&mut magic)
                .map_err(|_| FormatError::BadMagic)?;

            if magic != FORMAT_MAGIC {
                return Err(FormatError::BadMagic);
            }

            let version = reader
                .read_u32::<BigEndian>()
                .map_err(|_| FormatError::BadMagic)?;

            if version != FORMAT_VERSION {
                return Err(FormatError::UnsupportedVersion(version));
            }

            rmp_serde::from_read(reader).map_err(|e| FormatError::Decode(e.to_string()))?
        }

        FileFormat::Ron => {
            let text = std::str::from_utf8(data).map_err(|_| FormatError::BadMagic)?;
            let (header, body) = text.split_once('\n').ok_or(FormatError::BadMagic)?;

            let header: RonHeader = ron::from_str(header).map_err(|_| FormatError::BadMagic)?;

            if header.format != FORMAT_NAME {
                return Err(FormatError::BadMagic);
            }

            if header.version != FORMAT_VERSION {
                return Err(FormatError::UnsupportedVersion(header.version));
            }

            ron::from_str(body).map_err(|e| FormatError::Decode(e.to_string()))?
        }
    };

    let mut records = BTreeMap::new();

    for persisted in persisted {
        let record = BranchRecord::try_from(persisted)?;
        let key = record.key;

        if records.insert(key, record).is_some() {
            return Err(FormatError::DuplicateRecord {
                origin: key.origin,
                destination: key.destination,
                kind: key.kind,
            });
        }
    }

    Ok(records.into_values().collect())
}

/// Writes a temp file next to `path` and renames it over, so readers never see a
/// truncated file and concurrent writers never share a temp file.
pub(crate) fn write_file(path: &Path, data: &[u8]) -> Result<(), PersistError> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let write = || -> io::Result<()> {
        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(data)?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|e| e.error)?;
        Ok(())
    };

    write().map_err(|e| PersistError::io(path, e))
}

impl BranchWatch {
    /// Saves every record to `path` and makes it the autosave path.
    pub fn save(&mut self, path: &Path) -> Result<(), PersistError> {
        let data = encode(self.records.values(), FileFormat::from_path(path))
            .map_err(|e| PersistError::format(path, e))?;

        // Queued autosaves hold older images and must not land after this one.
        self.autosave.sync();
        write_file(path, &data)?;
        self.autosave.mark_clean();

        info!("Saved {} branch records to '{}'", self.records.len(), path.display());
        self.autosave.set_path(path.to_path_buf());

        Ok(())
    }

    /// Replaces the store with the records in `path`. On error the store is untouched.
    pub fn load(&mut self, path: &Path) -> Result<(), PersistError> {
        let data = fs::read(path).map_err(|e| PersistError::io(path, e))?;
        let records = decode(&data, FileFormat::from_path(path))
            .map_err(|e| PersistError::format(path, e))?;

        self.records = records
            .into_iter()
            .map(|record| (record.key, record))
            .collect();
        self.baseline = Snapshot::capture(self.records.values(), self.generation());

        info!("Loaded {} branch records from '{}'", self.records.len(), path.display());
        self.commit();

        Ok(())
    }

    pub fn set_autosave(&mut self, enabled: bool) {
        self.autosave.set_enabled(enabled);

        if enabled {
            // Catch the worker up with everything that happened while it was off.
            self.autosave.mark_dirty();
            self.flush_autosave();
        }
    }

    pub fn is_autosave_enabled(&self) -> bool {
        self.autosave.is_enabled()
    }

    /// The path of the last explicit save, which autosaves go to.
    pub fn autosave_path(&self) -> Option<&Path> {
        self.autosave.path()
    }

    /// Queues an autosave if the store changed since the last one.
    pub fn flush_autosave(&mut self) {
        let Some(path) = self.autosave.take_pending() else {
            return;
        };

        match encode(self.records.values(), FileFormat::from_path(&path)) {
            Ok(data) => self.autosave.submit(path, data),
            Err(e) => {
                error!("Autosave to '{}' failed: {}", path.display(), e);
                self.autosave.report(PersistError::format(&path, e));
            }
        }
    }

    /// Blocks until queued autosaves are on disk.
    pub fn sync_autosave(&self) {
        self.autosave.sync();
    }

    /// Takes the last asynchronous autosave failure, if any.
    pub fn take_autosave_error(&self) -> Option<PersistError> {
        self.autosave.take_error()
    }
}
