use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use phase_noise_conditioner::data::model::PhaseNoiseDataset;
use phase_noise_conditioner::export::write_parquet;

/// Write a synthetic phase-noise sweep with a spurious reference channel.
#[derive(Debug, Parser)]
#[command(name = "generate_sample", version, about)]
struct Args {
    /// Directory receiving sample_phase_noise.csv and sample_phase_noise.parquet
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// PRNG seed
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

const POINTS_PER_DECADE: usize = 100;
const DECADES: usize = 7;

/// (frequency Hz, height dB) of the injected spurs.
const SPURS: [(f64, f64); 4] = [(50.0, 18.0), (150.0, 12.0), (25e3, 15.0), (1.2e6, 20.0)];

/// Oscillator noise floor in dBc/Hz: close-in 1/f^3, then 1/f, then flat.
fn noise_profile(f: f64) -> f64 {
    let flicker = -55.0 - 30.0 * f.log10();
    let thermal = -105.0 - 10.0 * f.log10();
    let floor = -160.0;
    let power: f64 = [flicker, thermal, floor]
        .iter()
        .map(|db| 10f64.powf(db / 10.0))
        .sum();
    10.0 * power.log10()
}

/// Spur contribution at `f`: narrow peaks a couple of samples wide on the
/// log axis.
fn spur_profile(f: f64) -> f64 {
    let width = 1.5 / POINTS_PER_DECADE as f64;
    SPURS
        .iter()
        .map(|&(center, height)| {
            let d = (f.log10() - center.log10()) / width;
            height * (-d * d).exp()
        })
        .sum()
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

fn generate(seed: u64) -> Result<PhaseNoiseDataset> {
    let mut rng = SimpleRng::new(seed);

    // 1 Hz → 10 MHz, log spaced
    let frequency: Vec<f64> = (0..=POINTS_PER_DECADE * DECADES)
        .map(|k| 10f64.powf(k as f64 / POINTS_PER_DECADE as f64))
        .collect();

    let mut measured = Vec::with_capacity(frequency.len());
    let mut reference = Vec::with_capacity(frequency.len());
    for &f in &frequency {
        let spur = spur_profile(f);
        measured.push(noise_profile(f) + spur + rng.gauss(0.0, 1.0));
        // the reference source sits well below the DUT but carries the same spurs
        reference.push(noise_profile(f) - 20.0 + spur + rng.gauss(0.0, 0.5));
    }

    Ok(PhaseNoiseDataset::new(
        "sample_phase_noise",
        frequency,
        measured,
        Some(reference),
    )?)
}

fn write_csv(path: &PathBuf, dataset: &PhaseNoiseDataset) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    writeln!(file, "# frequency_hz,measured_dbc_hz,reference_dbc_hz")?;

    let mut csv = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    let reference = dataset.reference().unwrap_or_default();
    for (i, (&f, &m)) in dataset.frequency().iter().zip(dataset.measured()).enumerate() {
        let r = reference.get(i).copied().unwrap_or(f64::NAN);
        csv.write_record([format!("{f:.6}"), format!("{m:.3}"), format!("{r:.3}")])?;
    }
    csv.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir.display()))?;
    let dataset = generate(args.seed)?;

    let csv_path = args.output_dir.join("sample_phase_noise.csv");
    write_csv(&csv_path, &dataset)?;
    info!("wrote {}", csv_path.display());

    let parquet_path = args.output_dir.join("sample_phase_noise.parquet");
    write_parquet(&parquet_path, &dataset)?;
    info!("wrote {}", parquet_path.display());

    println!(
        "Wrote {} points ({} spurs) to {} and {}",
        dataset.len(),
        SPURS.len(),
        csv_path.display(),
        parquet_path.display()
    );
    Ok(())
}
