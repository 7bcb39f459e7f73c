use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = hyrax_api::Args::parse();

	hyrax_api::run(args).await
}
