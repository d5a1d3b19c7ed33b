//! Media Catalog Module
//!
//! Ingests already-probed media metadata and organises it into per-camera
//! tracks. Probing itself happens outside the engine.

mod models;
mod track;

pub use models::*;
pub use track::*;

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::{CameraIndex, CoreResult};

/// The set of media items known to an editing session
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaCatalog {
    #[serde(default)]
    pub clips: Vec<MediaClip>,
}

impl MediaCatalog {
    pub fn new(clips: Vec<MediaClip>) -> Self {
        Self { clips }
    }

    /// Parses a catalog document (`{ "clips": [...] }`)
    pub fn from_json_str(json: &str) -> CoreResult<Self> {
        let catalog: MediaCatalog = serde_json::from_str(json)?;
        Ok(catalog)
    }

    /// Reads and parses a catalog file
    pub fn from_path(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let catalog = Self::from_json_str(&content)?;
        info!(
            "Loaded {} clips from catalog {:?}",
            catalog.clips.len(),
            path
        );
        Ok(catalog)
    }

    /// Distinct camera indices present, ascending
    pub fn camera_indices(&self) -> Vec<CameraIndex> {
        self.clips
            .iter()
            .map(|c| c.camera_index())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Builds per-camera tracks
    pub fn tracks(&self) -> CoreResult<Vec<Track>> {
        build_tracks(&self.clips)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CoreError;

    const CATALOG: &str = r#"{
        "clips": [
            {"id": "v1", "path": "/cam1/a.mp4", "startTime": 1700000000.0, "duration": 60.0, "cameraIndex": 1,
             "probe": {"codec": "h264", "width": 1920, "height": 1080, "frameRate": 29.97, "bitrate": 8000000}},
            {"id": "v2", "path": "/cam2/a.mp4", "startTime": 1700000010.0, "duration": 45.0, "cameraIndex": 2},
            {"id": "v3", "path": "/cam1/b.mp4", "startTime": 1700000060.0, "duration": 30.0, "cameraIndex": 1}
        ]
    }"#;

    #[test]
    fn test_catalog_parses_and_builds_tracks() {
        let catalog = MediaCatalog::from_json_str(CATALOG).unwrap();

        assert_eq!(catalog.clips.len(), 3);
        assert_eq!(catalog.camera_indices(), vec![1, 2]);

        let tracks = catalog.tracks().unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].clips().len(), 2);
        assert_eq!(
            tracks[0].clips()[0].probe().and_then(|p| p.width),
            Some(1920)
        );
    }

    #[test]
    fn test_catalog_rejects_overlapping_clips() {
        let json = r#"{"clips": [
            {"id": "a", "path": "/a", "startTime": 0.0, "duration": 10.0, "cameraIndex": 1},
            {"id": "b", "path": "/b", "startTime": 5.0, "duration": 10.0, "cameraIndex": 1}
        ]}"#;
        let catalog = MediaCatalog::from_json_str(json).unwrap();
        assert!(matches!(
            catalog.tracks(),
            Err(CoreError::ClipOverlap { .. })
        ));
    }

    #[test]
    fn test_catalog_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, CATALOG).unwrap();

        let catalog = MediaCatalog::from_path(&path).unwrap();
        assert_eq!(catalog.clips.len(), 3);
    }

    #[test]
    fn test_empty_catalog() {
        let catalog = MediaCatalog::from_json_str("{}").unwrap();
        assert!(catalog.clips.is_empty());
        assert!(catalog.tracks().unwrap().is_empty());
    }
}
