use std::process::ExitCode;

use station_cli::demo::PowerSupplyCheck;

#[tokio::main]
async fn main() -> ExitCode {
    station_cli::run_from_cli(|| Box::new(PowerSupplyCheck::new()))
        .await
        .into()
}
