//! # File Service
//! src/fileserver/mod.rs
//!
//! Interfaz estrecha que el handler de conexión usa para llegar al disco:
//! "¿es archivo?", "¿es directorio?", "resolver" y "listar". Todas las rutas
//! son relativas al directorio base.
//!
//! [`LocalFileService`] es la implementación sobre el filesystem local.
//! Rechaza cualquier ruta que intente salir del directorio base con
//! `io::ErrorKind::PermissionDenied`, que el handler traduce a 403.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::info;

/// Una entrada de un listado de directorio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    /// Nombre del archivo (sin ruta)
    pub name: String,

    /// `true` si la entrada es a su vez un directorio
    pub is_dir: bool,
}

/// Servicio de archivos consumido por el handler de conexión
pub trait FileService: Send + Sync {
    /// Directorio base contra el que se resuelven las rutas
    fn base_path(&self) -> &Path;

    /// `true` si la ruta existe y es un archivo regular
    fn is_file(&self, relative_path: &str) -> io::Result<bool>;

    /// `true` si la ruta existe y es un directorio
    fn is_directory(&self, relative_path: &str) -> io::Result<bool>;

    /// Ruta absoluta del recurso
    fn resolve(&self, relative_path: &str) -> io::Result<PathBuf>;

    /// Entradas directas del directorio, en el orden nativo del sistema
    fn list_directory(&self, relative_path: &str) -> io::Result<Vec<DirEntryInfo>>;
}

/// File service sobre el filesystem local
#[derive(Debug, Clone)]
pub struct LocalFileService {
    base_path: PathBuf,
}

impl LocalFileService {
    /// Crea el servicio con `base_path` como raíz
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        let base_path = base_path.into();
        info!(base_path = %base_path.display(), "Serving from directory");
        Self { base_path }
    }

    /// Une la ruta relativa a la base rechazando `..`, raíces absolutas y
    /// symlinks que escapen del directorio base.
    fn checked_join(&self, relative_path: &str) -> io::Result<PathBuf> {
        for component in Path::new(relative_path).components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => {
                    return Err(io::Error::new(
                        io::ErrorKind::PermissionDenied,
                        format!("path escapes base directory: {}", relative_path),
                    ))
                }
            }
        }

        let full_path = self.base_path.join(relative_path);

        // Si existe, la ruta canónica tiene que seguir dentro de la base
        if let Ok(canonical) = full_path.canonicalize() {
            let canonical_base = self.base_path.canonicalize()?;
            if !canonical.starts_with(&canonical_base) {
                return Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    format!("path escapes base directory: {}", relative_path),
                ));
            }
        }

        Ok(full_path)
    }

    /// Metadata de la ruta; `None` si no existe
    fn metadata(&self, relative_path: &str) -> io::Result<Option<fs::Metadata>> {
        let path = self.checked_join(relative_path)?;
        match fs::metadata(path) {
            Ok(metadata) => Ok(Some(metadata)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl FileService for LocalFileService {
    fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn is_file(&self, relative_path: &str) -> io::Result<bool> {
        Ok(self.metadata(relative_path)?.is_some_and(|m| m.is_file()))
    }

    fn is_directory(&self, relative_path: &str) -> io::Result<bool> {
        Ok(self.metadata(relative_path)?.is_some_and(|m| m.is_dir()))
    }

    fn resolve(&self, relative_path: &str) -> io::Result<PathBuf> {
        self.checked_join(relative_path)
    }

    fn list_directory(&self, relative_path: &str) -> io::Result<Vec<DirEntryInfo>> {
        let dir = self.checked_join(relative_path)?;
        let mut entries = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            // Sigue symlinks, igual que is_directory()
            let is_dir = fs::metadata(entry.path())
                .map(|m| m.is_dir())
                .unwrap_or(false);
            entries.push(DirEntryInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir,
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, LocalFileService) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"ABCD").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("b.txt"), b"B").unwrap();
        let service = LocalFileService::new(dir.path());
        (dir, service)
    }

    #[test]
    fn test_is_file_and_directory() {
        let (_dir, service) = setup();

        assert!(service.is_file("a.txt").unwrap());
        assert!(!service.is_directory("a.txt").unwrap());
        assert!(service.is_directory("sub").unwrap());
        assert!(service.is_directory("").unwrap());
        assert!(service.is_file("sub/b.txt").unwrap());
    }

    #[test]
    fn test_missing_path_is_neither() {
        let (_dir, service) = setup();

        assert!(!service.is_file("missing").unwrap());
        assert!(!service.is_directory("missing").unwrap());
    }

    #[test]
    fn test_parent_dir_is_denied() {
        let (_dir, service) = setup();

        let err = service.is_file("../etc/passwd").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        let err = service.list_directory("sub/../..").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_list_directory() {
        let (_dir, service) = setup();

        let mut entries = service.list_directory("").unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        assert_eq!(
            entries,
            vec![
                DirEntryInfo { name: "a.txt".to_string(), is_dir: false },
                DirEntryInfo { name: "sub".to_string(), is_dir: true },
            ]
        );
    }

    #[test]
    fn test_resolve() {
        let (dir, service) = setup();
        assert_eq!(service.resolve("a.txt").unwrap(), dir.path().join("a.txt"));
    }
}
