use clap::Parser;
use nowcasting_model::{
    db::{self, Dataset},
    init_logging,
};
use std::path::PathBuf;

/// Manage the forecast database.
#[derive(Parser)]
enum Command {
    /// Perform one-time setup of the database.
    Init {
        #[clap(flatten)]
        db: db::Options,
    },
    /// Set up the database and populate it from a dataset saved in local storage.
    Load {
        /// The path to a JSON dataset.
        ///
        /// This should be a file with the structure
        ///
        ///     {
        ///         "locations": [...],
        ///         "forecasts": [...],
        ///         "gspYields": [{ "gspId": ..., "yields": [...] }],
        ///         "statuses": [...]
        ///     }
        #[clap(short, long, env = "NOWCASTING_DATASET", name = "FILE")]
        file: PathBuf,

        #[clap(flatten)]
        db: db::Options,
    },
}

#[async_std::main]
async fn main() -> Result<(), anyhow::Error> {
    init_logging();

    match Command::parse() {
        Command::Init { db } => {
            let conn = db.connect().await?;
            db::setup(&conn).await?;
        }
        Command::Load { file, db } => {
            let dataset = Dataset::open(&file)?;
            let conn = db.connect().await?;
            db::setup(&conn).await?;
            db::load(&conn, &dataset).await?;
            tracing::info!("loaded {}", file.display());
        }
    }

    Ok(())
}
