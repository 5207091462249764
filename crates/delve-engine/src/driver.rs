//! Scripted expedition run by the headless binary.

use std::path::Path;

use anyhow::Result;
use delve_common::StoreResult;
use delve_world::{DirectoryStore, Expedition, KeyValueStore, MemoryStore, MoveOutcome};
use tracing::{debug, info};

use crate::config::DelveConfig;

const DIRECTIONS: [(i32, i32); 8] = [
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
];

/// Tallies from one scripted walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkReport {
    /// Seed the expedition ran with
    pub seed: u64,
    /// Successful steps
    pub moves: u32,
    /// Steps refused by terrain or occupants
    pub blocked: u32,
    /// Tiles dug out
    pub dug: u32,
    /// Doors opened
    pub doors_opened: u32,
    /// Gold picked up
    pub gold: u32,
    /// Staircases taken
    pub levels_changed: u32,
    /// Depth at the end of the walk
    pub final_depth: i32,
}

/// Opens the diff store for `seed` under `save_dir`.
///
/// Diff keys carry only depth and chunk, so each seed gets its own
/// subdirectory (`{seed:x}`).
pub fn open_store(save_dir: &Path, seed: u64) -> StoreResult<DirectoryStore> {
    DirectoryStore::open(save_dir.join(format!("{seed:x}")))
}

/// Runs the configured walk against the configured store.
pub fn run(config: &DelveConfig) -> Result<WalkReport> {
    let seed = config.resolved_seed();
    match &config.save_dir {
        Some(dir) => walk(config, seed, open_store(dir, seed)?),
        None => walk(config, seed, MemoryStore::new()),
    }
}

/// Walks a seeded random path, digging through rock, opening doors,
/// collecting treasure and taking any stairs stepped on.
pub fn walk<S: KeyValueStore>(config: &DelveConfig, seed: u64, store: S) -> Result<WalkReport> {
    let mut expedition = Expedition::starting_at(seed, config.start_depth, &config.streaming(), store)?;
    let mut rng = fastrand::Rng::with_seed(seed);
    let mut report = WalkReport {
        seed,
        ..WalkReport::default()
    };
    let mut heading = DIRECTIONS[rng.usize(..DIRECTIONS.len())];

    for step in 0..config.walk_steps {
        if rng.u8(..8) == 0 {
            heading = DIRECTIONS[rng.usize(..DIRECTIONS.len())];
        }
        let target = expedition.player_position().offset(heading.0, heading.1);

        match expedition.move_player(heading.0, heading.1) {
            MoveOutcome::Moved => {
                report.moves += 1;
                let here = expedition.player_position();
                if let Some(gold) = expedition.pick_up(here) {
                    report.gold += gold;
                }
                if let Some(depth) = expedition.take_stairs()? {
                    debug!("Step {}: took stairs to depth {}", step, depth);
                    report.levels_changed += 1;
                }
            },
            MoveOutcome::Blocked => {
                report.blocked += 1;
                if expedition.open_door(target) {
                    report.doors_opened += 1;
                } else if expedition.dig(target) {
                    report.dug += 1;
                } else {
                    heading = DIRECTIONS[rng.usize(..DIRECTIONS.len())];
                }
            },
            MoveOutcome::Unloaded => {
                heading = DIRECTIONS[rng.usize(..DIRECTIONS.len())];
            },
        }
    }

    report.final_depth = expedition.depth();
    info!(
        "Walk finished: seed={} moves={} blocked={} dug={} doors={} gold={} depth={}",
        report.seed,
        report.moves,
        report.blocked,
        report.dug,
        report.doors_opened,
        report.gold,
        report.final_depth
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(steps: u32) -> DelveConfig {
        DelveConfig {
            seed: Some(1337),
            walk_steps: steps,
            ..DelveConfig::default()
        }
    }

    #[test]
    fn test_walk_is_deterministic() {
        let config = config(300);
        let first = walk(&config, 1337, MemoryStore::new()).expect("walk");
        let second = walk(&config, 1337, MemoryStore::new()).expect("walk");
        assert_eq!(first, second);
        assert_eq!(first.seed, 1337);
    }

    #[test]
    fn test_walk_zero_steps() {
        let report = walk(&config(0), 1337, MemoryStore::new()).expect("walk");
        assert_eq!(report.moves, 0);
        assert_eq!(report.final_depth, 0);
    }

    #[test]
    fn test_run_against_directory_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = DelveConfig {
            start_depth: 2,
            save_dir: Some(dir.path().join("saves")),
            ..config(200)
        };
        let report = run(&config).expect("run");
        assert!(report.moves + report.blocked > 0);
        assert!(dir.path().join("saves").join("539").is_dir());
    }

    #[test]
    fn test_seeds_do_not_share_edits() {
        use delve_world::{StreamingConfig, Tile};

        let dir = tempfile::tempdir().expect("tempdir");
        let streaming = StreamingConfig::default();

        let mut first = Expedition::new(1, &streaming, open_store(dir.path(), 1).expect("store"))
            .expect("expedition");
        let edited = first.player_position().offset(2, 0);
        first.chunks_mut().set_tile(edited, Tile::Rubble);
        first.change_level(1).expect("flush");

        let second = Expedition::new(2, &streaming, open_store(dir.path(), 2).expect("store"))
            .expect("expedition");
        assert_eq!(second.chunks().get_tile(edited), Some(Tile::Floor));

        let again = Expedition::new(1, &streaming, open_store(dir.path(), 1).expect("store"))
            .expect("expedition");
        assert_eq!(again.chunks().get_tile(edited), Some(Tile::Rubble));
    }
}
