// LDK-to-LND watchtower bridge
// Written in 2024 by
//     Dr. Maxim Orlovsky <orlovsky@pandoracore.com>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the MIT License
// along with this software.
// If not, see <https://opensource.org/licenses/MIT>.

//! On-disk fallback storage for justice blobs the delivery pipeline could
//! not push. One file per blob, named `<hint_hex>.blob`, holding exactly
//! the 314-byte `EncryptedBlob` and nothing else, written atomically
//! (`.blob.tmp` → fsync → rename) so a crash mid-write never leaves a
//! corrupt blob behind for the next load. The channel a blob came from is
//! not part of this file: that association lives in the delivery
//! pipeline's in-memory bookkeeping, not on disk.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::model::{EncryptedBlob, Hint};

/// A blob persisted to disk, identified by the hint encoded in its
/// filename.
#[derive(Clone, Debug)]
pub struct LocalBlob {
    pub hint: Hint,
    pub blob: EncryptedBlob,
}

/// Manages the `blob_dir` directory: one `<hint_hex>.blob` file per pending
/// blob.
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    /// Creates the backing directory if it does not already exist.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, std::io::Error> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(LocalStore { dir })
    }

    fn path_for(&self, hint: &Hint) -> PathBuf {
        self.dir.join(format!("{}.blob", hint.to_hex()))
    }

    /// Writes one blob via the temp-file-then-rename pattern: a reader only
    /// ever sees either the previous state of the directory or a complete
    /// file, never a partial write.
    pub fn store(&self, hint: &Hint, blob: &EncryptedBlob) -> Result<(), std::io::Error> {
        let final_path = self.path_for(hint);
        let tmp_path = final_path.with_extension("blob.tmp");

        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(blob.as_bytes())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp_path, &final_path)?;
        Ok(())
    }

    /// Deletes a blob after it has been successfully delivered to the tower
    /// (or explicitly discarded by the embedding application).
    pub fn remove(&self, hint: &Hint) -> Result<(), std::io::Error> {
        let path = self.path_for(hint);
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Loads every `<hint>.blob` file in the directory, for resumption on
    /// startup or before the next `push_pending()` call. Stray `.blob.tmp`
    /// files left by a crash mid-write are ignored, not cleaned up, since a
    /// concurrent writer could legitimately still own one.
    pub fn load_all(&self) -> Result<Vec<LocalBlob>, std::io::Error> {
        let mut blobs = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("blob") {
                continue;
            }
            if let Some(local_blob) = self.load_one(&path)? {
                blobs.push(local_blob);
            }
        }
        Ok(blobs)
    }

    fn load_one(&self, path: &Path) -> Result<Option<LocalBlob>, std::io::Error> {
        let contents = fs::read(path)?;
        if contents.len() != EncryptedBlob::LEN {
            tracing::warn!(?path, "discarding local blob with unexpected length");
            return Ok(None);
        }

        let mut blob_bytes = [0u8; EncryptedBlob::LEN];
        blob_bytes.copy_from_slice(&contents);

        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        let hint_bytes = match hex::decode(stem) {
            Ok(bytes) if bytes.len() == 16 => bytes,
            _ => {
                tracing::warn!(?path, "discarding local blob with unparsable hint filename");
                return Ok(None);
            }
        };
        let mut hint_array = [0u8; 16];
        hint_array.copy_from_slice(&hint_bytes);

        Ok(Some(LocalBlob { hint: Hint(hint_array), blob: EncryptedBlob::from_bytes(blob_bytes) }))
    }

    pub fn pending_count(&self) -> Result<usize, std::io::Error> {
        Ok(self.load_all()?.len())
    }
}
