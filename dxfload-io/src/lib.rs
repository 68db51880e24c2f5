mod blocks;
mod builders;
mod importer;
mod reader;
mod state;

use std::path::{Path, PathBuf};

use dxfload_core::model::Drawing;
use dxfload_core::options::ImportOptions;
use thiserror::Error;

pub use importer::{DropReason, Dropped, DxfImporter};
pub use reader::{LineReader, parse_group_code};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to open file {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read input near line {line}: {source}")]
    Read {
        line: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid DXF structure at line {line}: {message}")]
    Structure { line: usize, message: String },
    #[error("importer has already parsed an input")]
    AlreadyParsed,
}

impl ImportError {
    pub(crate) fn structure(line: usize, message: impl Into<String>) -> Self {
        Self::Structure {
            line,
            message: message.into(),
        }
    }
}

pub trait DrawingLoader {
    fn load(&self, path: &Path) -> Result<Drawing, ImportError>;
}

/// 每次加载都使用一个新的导入器。
#[derive(Debug, Clone, Default)]
pub struct DxfFacade {
    options: ImportOptions,
}

impl DxfFacade {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ImportOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }
}

impl DrawingLoader for DxfFacade {
    fn load(&self, path: &Path) -> Result<Drawing, ImportError> {
        let mut importer = DxfImporter::new(self.options.clone());
        importer.parse_file(path)?;
        Ok(importer.into_drawing())
    }
}
