use anyhow::Error;
use clap::Parser;
use nowcasting_model::{
    db::{self, Connection},
    init_logging,
    query::{Clock, History},
};
use std::path::PathBuf;

mod app;
mod docs;
mod gsp;
mod national;
mod process_time;
mod status;
mod system;
mod test_runner;

pub use app::State;

/// Start the Nowcasting API server.
#[derive(Clone, Debug, Parser)]
#[group(id = "ServerOptions")]
struct Options {
    /// The port where the app should be served.
    #[clap(short, long, env = "NOWCASTING_PORT", default_value = "80")]
    port: u16,

    /// Origins allowed to make cross-origin requests, separated by commas.
    #[clap(
        long,
        env = "ORIGINS",
        value_delimiter = ',',
        default_value = "https://app.nowcasting.io"
    )]
    origins: Vec<String>,

    /// How much history to include in forecasts and truth values.
    ///
    /// Either "yesterday", to include everything since the start of yesterday, or a number of days.
    #[clap(long, env = "N_HISTORY_DAYS", default_value = "yesterday")]
    history: History,

    /// Icon served at /favicon.ico.
    #[clap(long, env = "NOWCASTING_FAVICON", default_value = "static/favicon.ico")]
    favicon: PathBuf,

    #[clap(flatten)]
    db: db::Options,
}

impl Options {
    /// Connect to the database and serve the API.
    async fn serve(&self) -> Result<(), Error> {
        let conn = self.db.connect().await?;
        self.serve_with(conn, Clock::System).await
    }

    /// Serve the API from the given database.
    async fn serve_with(
        &self,
        conn: impl Connection + 'static,
        clock: Clock,
    ) -> Result<(), Error> {
        let state = State::new(conn, self.history, clock, self.favicon.clone());
        let app = app::app(state, &self.origins)?;
        tracing::info!(port = self.port, history = %self.history, "serving Nowcasting API");
        app.listen(format!("0.0.0.0:{}", self.port)).await?;
        Ok(())
    }
}

#[async_std::main]
async fn main() -> Result<(), Error> {
    init_logging();
    Options::parse().serve().await
}
