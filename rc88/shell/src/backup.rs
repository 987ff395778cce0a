//! Whole-machine backup archive.
//!
//! A zip file holding `backup.json` (metadata, magic/version checked on
//! load), `state.json` (the serialized machine state), `program.bin` (user
//! program cells, little-endian), and one `lib<N>.bin` per occupied
//! library slot. Backups are written by explicit host commands only, never
//! from inside a running program.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zip::read::ZipArchive;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use rc88_core::constants::NUM_LIB_SLOTS;
use rc88_core::opcode::Word;
use rc88_core::state::{Machine, MachineState};

pub const BACKUP_MAGIC: &str = "rc88.backup";
pub const BACKUP_VERSION: u32 = 1;

pub type Result<T> = std::result::Result<T, BackupError>;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("serialize error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("backup error: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub magic: String,
    pub version: u32,
    pub created: String,
    pub program_len: u16,
    pub lib_lens: Vec<u16>,
}

fn now_timestamp() -> String {
    match SystemTime::now().duration_since(SystemTime::UNIX_EPOCH) {
        Ok(duration) => format!("{}Z", duration.as_secs()),
        Err(_) => "0Z".to_string(),
    }
}

fn words_to_bytes(words: &[Word]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(words.len() * 2);
    for word in words {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    bytes
}

fn bytes_to_words(bytes: &[u8]) -> Result<Vec<Word>> {
    if bytes.len() % 2 != 0 {
        return Err(BackupError::Invalid(format!(
            "odd program payload length {}",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| Word::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

pub fn save_backup(path: &Path, m: &Machine) -> Result<()> {
    let file = File::create(path)?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let metadata = BackupMetadata {
        magic: BACKUP_MAGIC.to_string(),
        version: BACKUP_VERSION,
        created: now_timestamp(),
        program_len: m.program.ram_len(),
        lib_lens: (0..NUM_LIB_SLOTS as u8)
            .map(|slot| m.program.library_words(slot).len() as u16)
            .collect(),
    };

    zip.start_file("backup.json", options)?;
    zip.write_all(&serde_json::to_vec_pretty(&metadata)?)?;

    zip.start_file("state.json", options)?;
    zip.write_all(&serde_json::to_vec(&m.state)?)?;

    zip.start_file("program.bin", options)?;
    zip.write_all(&words_to_bytes(m.program.ram_words()))?;

    for slot in 0..NUM_LIB_SLOTS as u8 {
        let words = m.program.library_words(slot);
        if words.is_empty() {
            continue;
        }
        zip.start_file(format!("lib{slot}.bin"), options)?;
        zip.write_all(&words_to_bytes(words))?;
    }

    zip.finish()?;
    Ok(())
}

pub fn load_backup(path: &Path, m: &mut Machine) -> Result<BackupMetadata> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file)?;

    let metadata: BackupMetadata = {
        let mut buf = Vec::new();
        let mut entry = archive
            .by_name("backup.json")
            .map_err(|e| BackupError::Invalid(format!("backup.json missing: {e}")))?;
        entry.read_to_end(&mut buf)?;
        serde_json::from_slice(&buf)?
    };
    if metadata.magic != BACKUP_MAGIC || metadata.version != BACKUP_VERSION {
        return Err(BackupError::Invalid(
            "backup magic/version mismatch".to_string(),
        ));
    }

    let state: MachineState = {
        let mut buf = Vec::new();
        let mut entry = archive
            .by_name("state.json")
            .map_err(|e| BackupError::Invalid(format!("state.json missing: {e}")))?;
        entry.read_to_end(&mut buf)?;
        serde_json::from_slice(&buf)?
    };

    let program = {
        let mut buf = Vec::new();
        let mut entry = archive
            .by_name("program.bin")
            .map_err(|e| BackupError::Invalid(format!("program.bin missing: {e}")))?;
        entry.read_to_end(&mut buf)?;
        bytes_to_words(&buf)?
    };

    let mut libs: Vec<(u8, Vec<Word>)> = Vec::new();
    for slot in 0..NUM_LIB_SLOTS as u8 {
        if let Ok(mut entry) = archive.by_name(&format!("lib{slot}.bin")) {
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf)?;
            libs.push((slot, bytes_to_words(&buf)?));
        }
    }

    m.state = state;
    m.program.load_ram(program);
    for (slot, words) in libs {
        m.program.load_library(slot, words);
    }
    Ok(metadata)
}
