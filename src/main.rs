use anyhow::Result;
use tracing_subscriber::EnvFilter;

use justified_grid::bench;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("justified_grid=info".parse()?)
                .add_directive("jgrid=info".parse()?),
        )
        .init();

    if let Some(args) = bench::maybe_parse_args()? {
        let code = bench::run_benchmark(args)?;
        std::process::exit(code);
    }

    run_gui()
}

#[cfg(feature = "gtk")]
fn run_gui() -> Result<()> {
    let app = justified_grid::app::GridApp::new();
    std::process::exit(app.run());
}

#[cfg(not(feature = "gtk"))]
fn run_gui() -> Result<()> {
    anyhow::bail!("built without the `gtk` feature; use --benchmark or rebuild with --features gtk")
}
