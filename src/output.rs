//! Escritura atómica de artefactos.
//!
//! Todos los artefactos de una compilación se escriben primero a
//! archivos temporales en el mismo directorio de destino. Solo cuando
//! todos se escribieron con éxito, y tras copiar los respaldos
//! solicitados, se renombran a su ruta final. Una falla al generar o al
//! respaldar nunca deja salidas parciales.
//!
//! Cada renombre es atómico por sí solo, pero no el conjunto: si falla
//! el renombre de un archivo, los anteriores ya fueron reemplazados.
//! Con [`OutputOptions::BACKUP`] su contenido previo sigue disponible
//! en los respaldos.

use std::{
    ffi::OsString,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use bitflags::bitflags;
use tempfile::{NamedTempFile, PersistError};
use thiserror::Error;
use tracing::{debug, info};

bitflags! {
    /// Opciones de escritura.
    pub struct OutputOptions: u32 {
        /// Copiar cada archivo que será reemplazado a `<ruta>.backup`.
        const BACKUP = 0x01;
    }
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("I/O error on `{}`", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to move output into `{}`", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: PersistError,
    },
}

/// Conjunto de archivos a reemplazar en bloque.
pub struct Commit {
    options: OutputOptions,
    staged: Vec<(PathBuf, NamedTempFile)>,
}

impl Commit {
    pub fn new(options: OutputOptions) -> Self {
        Commit {
            options,
            staged: Vec::new(),
        }
    }

    /// Escribe `contents` a un temporal junto a `path`.
    pub fn add<P: AsRef<Path>>(&mut self, path: P, contents: &str) -> Result<(), OutputError> {
        let path = path.as_ref().to_path_buf();
        let io_error = |source| OutputError::Io {
            path: path.clone(),
            source,
        };

        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        fs::create_dir_all(directory).map_err(io_error)?;

        let mut file = NamedTempFile::new_in(directory).map_err(io_error)?;
        file.write_all(contents.as_bytes()).map_err(io_error)?;
        file.flush().map_err(io_error)?;

        debug!(path = %path.display(), temporary = %file.path().display(), "staged output");
        self.staged.push((path, file));

        Ok(())
    }

    /// Respalda lo que será reemplazado y luego mueve todos los
    /// temporales a su destino.
    pub fn finish(self) -> Result<Vec<PathBuf>, OutputError> {
        if self.options.contains(OutputOptions::BACKUP) {
            for (path, _) in &self.staged {
                if path.exists() {
                    backup(path)?;
                }
            }
        }

        let mut written = Vec::with_capacity(self.staged.len());
        for (path, file) in self.staged {
            file.persist(&path).map_err(|source| OutputError::Persist {
                path: path.clone(),
                source,
            })?;

            info!(path = %path.display(), "wrote output");
            written.push(path);
        }

        Ok(written)
    }
}

fn backup(path: &Path) -> Result<(), OutputError> {
    let backup = backup_path(path);
    fs::copy(path, &backup).map_err(|source| OutputError::Io {
        path: backup.clone(),
        source,
    })?;

    info!(backup = %backup.display(), "created backup");
    Ok(())
}

/// `dir/a_build.puml` → `dir/a_build.puml.backup`
pub fn backup_path(path: &Path) -> PathBuf {
    let mut backup = OsString::from(path.as_os_str());
    backup.push(".backup");

    PathBuf::from(backup)
}
