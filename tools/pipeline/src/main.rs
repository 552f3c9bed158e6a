use pipeline::{Pipeline, PipelineConfig};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let queries: Vec<String> = std::env::args().skip(1).collect();
    if queries.is_empty() {
        anyhow::bail!("usage: dealer-markets <dealer id or name>...");
    }

    let config = PipelineConfig::from_env()?;
    let report_path = config.report_path.clone();

    tracing::info!(version = pipeline::VERSION, queries = queries.len(), "Starting dealer market analysis");

    let report = Pipeline::new(config).run(&queries)?;

    match report_path {
        Some(path) => {
            report.write_to(&path)?;
            tracing::info!(path = %path.display(), "Report written");
        }
        None => println!("{}", report.to_json()?),
    }

    Ok(())
}
