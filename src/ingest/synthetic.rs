use crate::core::records::MessageEvent;
use crate::error::ImportError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Parameters for a CollegeMsg-shaped random dataset.
pub struct SyntheticConfig {
    pub user_count: u32,
    pub event_count: u64,
    pub seed: u64,
    pub start_ts: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            user_count: 1_899,
            event_count: 59_835,
            seed: 42,
            start_ts: 1_082_040_961,
        }
    }
}

/// Events between users `1..=user_count`, never self-addressed, with
/// strictly increasing timestamps.
pub fn generate(cfg: &SyntheticConfig) -> impl Iterator<Item = MessageEvent> + use<> {
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let user_count = cfg.user_count.max(2);
    let mut timestamp = cfg.start_ts;

    (0..cfg.event_count).map(move |_| {
        let src = rng.random_range(0..user_count);
        let mut dst = rng.random_range(0..user_count);
        if dst == src {
            dst = (dst + 1) % user_count;
        }
        timestamp += rng.random_range(1..3_600);

        MessageEvent {
            source_id: (src + 1).to_string(),
            target_id: (dst + 1).to_string(),
            timestamp,
        }
    })
}

pub fn write_dataset(path: &Path, cfg: &SyntheticConfig) -> Result<u64, ImportError> {
    let mut out = BufWriter::new(File::create(path)?);
    let mut written = 0;
    for event in generate(cfg) {
        writeln!(
            out,
            "{} {} {}",
            event.source_id, event.target_id, event.timestamp
        )?;
        written += 1;
    }
    out.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::edge_list::EdgeListSource;

    fn small() -> SyntheticConfig {
        SyntheticConfig {
            user_count: 10,
            event_count: 200,
            seed: 7,
            start_ts: 1_000,
        }
    }

    #[test]
    fn test_same_seed_same_events() {
        let a = generate(&small()).collect::<Vec<_>>();
        let b = generate(&small()).collect::<Vec<_>>();
        assert_eq!(a, b);
    }

    #[test]
    fn test_events_are_well_formed() {
        let events = generate(&small()).collect::<Vec<_>>();
        assert_eq!(200, events.len());
        assert!(events.iter().all(|e| !e.is_self_loop()));
        assert!(events.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert!(events.iter().all(|e| {
            let id = e.source_id.parse::<u32>().unwrap();
            (1..=10).contains(&id)
        }));
    }

    #[test]
    fn test_written_dataset_parses_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("msgs.txt");

        let written = write_dataset(&path, &small()).unwrap();
        let parsed = EdgeListSource::new(&path)
            .open()
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert_eq!(written, parsed.len() as u64);
        assert_eq!(generate(&small()).collect::<Vec<_>>(), parsed);
    }
}
