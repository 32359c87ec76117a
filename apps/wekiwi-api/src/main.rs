use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = wekiwi_api::Args::parse();
	wekiwi_api::run(args).await
}
