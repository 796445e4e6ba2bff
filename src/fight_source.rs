// src/fight_source.rs
//
// Locating and loading per-fight inputs. Each fight is one JSON file holding
// a FightInput (metadata plus the extractor/tracker frame records).

use crate::config::IoConfig;
use crate::error::MinerResult;
use crate::types::FightInput;
use anyhow::Result;
use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Files under `dir` (recursively, following links) with extension `ext`,
/// case-insensitive, in path order.
pub fn find_files_with_extension(dir: &Path, ext: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|x| x.to_str())
                .map_or(false, |x| x.eq_ignore_ascii_case(ext))
        })
        .collect();
    files.sort();
    files
}

pub struct FightSource {
    input_dir: PathBuf,
}

impl FightSource {
    pub fn new(config: &IoConfig) -> Self {
        Self {
            input_dir: PathBuf::from(&config.input_dir),
        }
    }

    pub fn find_fight_files(&self) -> Result<Vec<PathBuf>> {
        if !self.input_dir.is_dir() {
            anyhow::bail!("input directory {} does not exist", self.input_dir.display());
        }
        let fights = find_files_with_extension(&self.input_dir, "json");
        info!("Found {} fight files in {}", fights.len(), self.input_dir.display());
        Ok(fights)
    }

    pub fn load(path: &Path) -> MinerResult<FightInput> {
        let reader = BufReader::new(fs::File::open(path)?);
        let fight: FightInput = serde_json::from_reader(reader)?;
        debug!(
            "loaded fight {} from {} ({} frames)",
            fight.fight_id,
            path.display(),
            fight.frames.len()
        );
        Ok(fight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::strike_detector::tests::jab_fight;

    #[test]
    fn test_finds_json_recursively_in_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("card/main")).unwrap();
        fs::write(dir.path().join("b.json"), "{}").unwrap();
        fs::write(dir.path().join("card/main/a.JSON"), "{}").unwrap();
        fs::write(dir.path().join("card/readme.md"), "").unwrap();

        let files = find_files_with_extension(dir.path(), "json");
        assert_eq!(files.len(), 2);
        assert!(files[0] < files[1]);
    }

    #[test]
    fn test_load_fight_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f1.json");
        let fight = jab_fight();
        fs::write(&path, serde_json::to_string(&fight).unwrap()).unwrap();

        let source = FightSource::new(&IoConfig {
            input_dir: dir.path().display().to_string(),
            ..IoConfig::default()
        });
        let found = source.find_fight_files().unwrap();
        assert_eq!(found, vec![path.clone()]);
        assert_eq!(FightSource::load(&path).unwrap(), fight);
    }

    #[test]
    fn test_missing_input_dir_is_an_error() {
        let source = FightSource::new(&IoConfig {
            input_dir: "/definitely/not/here".into(),
            ..IoConfig::default()
        });
        assert!(source.find_fight_files().is_err());
    }
}
