use std::{fs, path::PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::{error::ExportError, render::Raster};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Landscape,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ImagePlacement {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Single-page document whose page is exactly the canvas size, with the
/// rasterized frame placed at 1:1.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExportDocument {
    pub orientation: Orientation,
    pub page_width_px: u32,
    pub page_height_px: u32,
    pub pages: u32,
    pub image: ImagePlacement,
    pub raster: Raster,
}

impl ExportDocument {
    pub fn from_raster(raster: Raster) -> Result<Self, ExportError> {
        if raster.width_px == 0 || raster.height_px == 0 {
            return Err(ExportError::EmptyRaster);
        }
        Ok(Self {
            orientation: Orientation::Landscape,
            page_width_px: raster.width_px,
            page_height_px: raster.height_px,
            pages: 1,
            image: ImagePlacement {
                x: 0,
                y: 0,
                width: raster.width_px,
                height: raster.height_px,
            },
            raster,
        })
    }
}

pub trait DocumentWriter {
    /// Persists the document and returns where it went.
    fn write(&mut self, document: &ExportDocument) -> Result<PathBuf, ExportError>;
}

/// Writes `thoughts-<timestamp>.json` files into a directory.
#[derive(Debug, Clone)]
pub struct JsonDocumentWriter {
    dir: PathBuf,
}

impl JsonDocumentWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn file_name(at: DateTime<Local>) -> String {
        format!("thoughts-{}.json", at.format("%Y%m%d-%H%M%S"))
    }

    fn unique_path(&self, at: DateTime<Local>) -> PathBuf {
        let base = self.dir.join(Self::file_name(at));
        if !base.exists() {
            return base;
        }
        let stem = format!("thoughts-{}", at.format("%Y%m%d-%H%M%S"));
        (1..)
            .map(|n| self.dir.join(format!("{stem}-{n}.json")))
            .find(|p| !p.exists())
            .unwrap_or(base)
    }
}

impl DocumentWriter for JsonDocumentWriter {
    fn write(&mut self, document: &ExportDocument) -> Result<PathBuf, ExportError> {
        fs::create_dir_all(&self.dir).map_err(|source| ExportError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.unique_path(Local::now());
        let body = serde_json::to_vec_pretty(document)?;
        fs::write(&path, body).map_err(|source| ExportError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}
