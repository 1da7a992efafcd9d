use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

/// Shape of a generated data/seed pair.
#[derive(Debug, Clone, Copy)]
pub struct GenDataOptions {
    /// Size of the data file in bytes.
    pub data_size: u64,
    /// Size of the seed file; `None` means same as the data file.
    pub seed_data_size: Option<u64>,
    /// Granularity at which the seed diverges from the data.
    pub fragment_size: u64,
    /// Percentage of fragments the seed shares with the data.
    pub similarity: u32,
    /// Seed for the generator, so failures reproduce.
    pub rng_seed: u64,
}

impl Default for GenDataOptions {
    fn default() -> Self {
        Self {
            data_size: 1_000_000,
            seed_data_size: None,
            fragment_size: 123_456,
            similarity: 90,
            rng_seed: 1,
        }
    }
}

/// Writes `data.bin` and `seed_data.bin` under `dir`: random data plus a
/// seed that shares roughly `similarity` percent of its fragments.
///
/// Both files stream out one fragment at a time, so corpus size is bounded
/// by disk, not memory.
pub fn generate_pair(dir: &Path, options: GenDataOptions) -> io::Result<(PathBuf, PathBuf)> {
    let mut rng = StdRng::seed_from_u64(options.rng_seed);

    let data_path = dir.join("data.bin");
    let seed_path = dir.join("seed_data.bin");
    let mut data_out = BufWriter::new(File::create(&data_path)?);
    let mut seed_out = BufWriter::new(File::create(&seed_path)?);

    let fragment_size = options.fragment_size.max(1);
    let seed_size = options.seed_data_size.unwrap_or(options.data_size);

    let mut fragment = vec![0u8; fragment_size as usize];
    let mut divergent = vec![0u8; fragment_size as usize];

    let mut data_remaining = options.data_size;
    let mut seed_remaining = seed_size;
    while data_remaining > 0 || seed_remaining > 0 {
        let piece = fragment_size.min(data_remaining.max(seed_remaining)) as usize;
        rng.fill_bytes(&mut fragment[..piece]);

        if data_remaining > 0 {
            let take = (data_remaining.min(piece as u64)) as usize;
            data_out.write_all(&fragment[..take])?;
            data_remaining -= take as u64;
        }

        if seed_remaining > 0 {
            let take = (seed_remaining.min(piece as u64)) as usize;
            if rng.gen_range(0u32..100) >= options.similarity {
                rng.fill_bytes(&mut divergent[..take]);
                seed_out.write_all(&divergent[..take])?;
            } else {
                seed_out.write_all(&fragment[..take])?;
            }
            seed_remaining -= take as u64;
        }
    }

    data_out.flush()?;
    seed_out.flush()?;
    Ok((data_path, seed_path))
}
