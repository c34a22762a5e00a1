use batch_detect::job::{self, JobConfig};
use batch_detect::logging::setup_logging;
use batch_detect::visualize::{BoxPainter, Visualizer};

fn main() -> anyhow::Result<()> {
    setup_logging();

    let config = JobConfig::from_env()?;
    log::debug!("{:?}", config);

    let result = job::run(&config)?;

    let mut painter = BoxPainter::new(&config.output_dir)
        .with_threshold(config.score_threshold)
        .with_class_ids(config.model_format.class_ids());
    if let Some(font) = &config.font_path {
        painter = painter.with_font(font)?;
    }
    painter.visualize(&result)?;

    Ok(())
}
