use anyhow::Context;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

use expsim::evaluation::{evaluate_experiments, summarize_results, write_csv};
use expsim::SweepConfig;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = SweepConfig::from_env();
    config.validate().context("invalid sweep configuration")?;
    tracing::info!(?config, "starting evaluation sweep");

    let mut rng = match config.seed {
        Some(seed) => {
            tracing::info!(seed, "seeding RNG");
            StdRng::seed_from_u64(seed)
        }
        None => StdRng::from_entropy(),
    };

    let rows = evaluate_experiments(&config, &mut rng)?;
    let summary = summarize_results(&rows);

    for line in &summary {
        tracing::info!(
            test = %line.test,
            effect = line.true_effect,
            alpha = line.alpha,
            power = line.power,
            avg_sample_size = line.avg_sample_size,
            "summary"
        );
    }

    if config.write_output {
        std::fs::create_dir_all(&config.output_dir).with_context(|| {
            format!("creating output directory {}", config.output_dir.display())
        })?;
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let results_path = config.output_dir.join(format!("results_{stamp}.csv"));
        let summary_path = config
            .output_dir
            .join(format!("summarized_results_{stamp}.csv"));
        write_csv(&results_path, &rows)?;
        write_csv(&summary_path, &summary)?;
    }

    Ok(())
}
