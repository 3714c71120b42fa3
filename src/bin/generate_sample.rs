use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use arrow::array::{Float64Builder, TimestampMillisecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use clap::Parser;
use parquet::arrow::ArrowWriter;

/// Write a synthetic plant trend (CSV and Parquet) for trying out the dashboard.
#[derive(Debug, Parser)]
struct Args {
    /// Output directory
    #[arg(default_value = ".")]
    out_dir: PathBuf,

    /// Days of data to generate
    #[arg(long, default_value_t = 3)]
    days: i64,

    /// Minutes between samples
    #[arg(long, default_value_t = 1)]
    step_min: i64,
}

/// Code, mean, daily swing, noise, chance of a missing sample.
const TAGS: [(&str, f64, f64, f64, f64); 6] = [
    ("FT101", 85.0, 20.0, 1.5, 0.002),
    ("TT200", 850.0, 35.0, 4.0, 0.002),
    ("PT300", 62.0, 3.0, 0.3, 0.001),
    ("LT400", 0.0, 40.0, 8.0, 0.001),
    ("PWR500", 24.0, 6.0, 0.4, 0.002),
    ("O2_600", 3.5, 0.8, 0.15, 0.01),
];

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
        let result = (self.state[1].wrapping_mul(5)).rotate_left(7).wrapping_mul(9);
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

struct Trend {
    times: Vec<NaiveDateTime>,
    /// One column per entry of `TAGS`.
    columns: Vec<Vec<Option<f64>>>,
}

fn generate(start: NaiveDateTime, days: i64, step_min: i64) -> Trend {
    let mut rng = SimpleRng::new(42);
    let step = step_min.max(1);
    let rows = (days.max(1) * 24 * 60 / step) as usize;

    let times: Vec<NaiveDateTime> = (0..rows)
        .map(|i| start + Duration::minutes(i as i64 * step))
        .collect();

    // slowly drifting load shared by every tag so the trends move together
    let mut load = 0.0_f64;
    let mut columns = vec![Vec::with_capacity(rows); TAGS.len()];
    for t in &times {
        let hours = (*t - start).num_minutes() as f64 / 60.0;
        let daily = (2.0 * std::f64::consts::PI * (hours - 6.0) / 24.0).sin();
        load = (load + rng.gauss(0.0, 0.02)).clamp(-1.0, 1.0);

        for (col, &(_, mean, swing, noise, gap)) in columns.iter_mut().zip(TAGS.iter()) {
            if rng.next_f64() < gap {
                col.push(None);
                continue;
            }
            let value = mean + swing * (0.8 * daily + 0.2 * load) + rng.gauss(0.0, noise);
            col.push(Some((value * 1000.0).round() / 1000.0));
        }
    }
    Trend { times, columns }
}

fn write_csv(path: &std::path::Path, trend: &Trend) -> anyhow::Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;

    let mut header = vec!["Time".to_string()];
    header.extend(TAGS.iter().map(|(code, ..)| code.to_string()));
    writer.write_record(&header)?;

    for (row, t) in trend.times.iter().enumerate() {
        let mut record = vec![t.format("%Y-%m-%d %H:%M:%S").to_string()];
        for col in &trend.columns {
            record.push(col[row].map(|v| v.to_string()).unwrap_or_default());
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_parquet(path: &std::path::Path, trend: &Trend) -> anyhow::Result<()> {
    let mut fields = vec![Field::new(
        "Time",
        DataType::Timestamp(TimeUnit::Millisecond, None),
        false,
    )];
    fields.extend(
        TAGS.iter()
            .map(|(code, ..)| Field::new(*code, DataType::Float64, true)),
    );
    let schema = Arc::new(Schema::new(fields));

    let time_array = TimestampMillisecondArray::from(
        trend
            .times
            .iter()
            .map(|t| t.and_utc().timestamp_millis())
            .collect::<Vec<_>>(),
    );
    let mut arrays: Vec<arrow::array::ArrayRef> = vec![Arc::new(time_array)];
    for col in &trend.columns {
        let mut builder = Float64Builder::with_capacity(col.len());
        for v in col {
            builder.append_option(*v);
        }
        arrays.push(Arc::new(builder.finish()));
    }

    let batch = RecordBatch::try_new(schema.clone(), arrays).context("building record batch")?;

    let file = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;

    let start = NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .context("invalid start date")?;
    let trend = generate(start, args.days, args.step_min);

    let csv_path = args.out_dir.join("sample_trend.csv");
    let parquet_path = args.out_dir.join("sample_trend.parquet");
    write_csv(&csv_path, &trend)?;
    write_parquet(&parquet_path, &trend)?;

    println!(
        "Wrote {} rows x {} tags to {} and {}",
        trend.times.len(),
        TAGS.len(),
        csv_path.display(),
        parquet_path.display()
    );
    Ok(())
}
