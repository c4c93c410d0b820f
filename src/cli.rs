//! Argument structs for the cellarium binaries.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cellarium-server", about = "Remote store for cellarium clients")]
pub struct ServerArgs {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: String,

    /// Port to listen on
    #[arg(long, default_value_t = 3200, env = "CELLARIUM_PORT")]
    pub port: u16,
}

#[derive(Parser, Debug)]
#[command(name = "cellarium-cmd", about = "Manage a wine cellar from the terminal")]
pub struct CmdArgs {
    /// Config file (JSON); defaults apply when absent
    #[arg(long, env = "CELLARIUM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Remote store base URL (overrides config)
    #[arg(long, env = "CELLARIUM_SERVER")]
    pub server: Option<String>,

    /// Identity to sync as; remote sync is skipped without it
    #[arg(long, env = "CELLARIUM_USER")]
    pub user: Option<String>,

    #[command(subcommand)]
    pub command: CellarCommand,
}

#[derive(Subcommand, Debug)]
pub enum CellarCommand {
    /// List the active cellar and the archive
    List,
    /// Add a bottle by hand
    Add {
        name: String,
        #[arg(long, default_value = "red")]
        wine_type: String,
        #[arg(long)]
        producer: Option<String>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        region: Option<String>,
        #[arg(long)]
        grape: Option<String>,
        #[arg(long, default_value_t = 3)]
        boldness: u8,
        #[arg(long, default_value_t = 3)]
        tannins: u8,
        #[arg(long, default_value_t = 3)]
        acidity: u8,
        #[arg(long)]
        price: Option<f64>,
        #[arg(long, default_value_t = 1)]
        quantity: u32,
        #[arg(long)]
        store: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Photograph-to-entry: recognize a label image and add the bottle
    Scan {
        /// Path to the label photo
        image: PathBuf,
        /// Skip the product-photo search
        #[arg(long)]
        no_photo_search: bool,
    },
    /// Adjust quantity by a delta (e.g. -1 after opening a bottle)
    Quantity {
        id: String,
        #[arg(allow_negative_numbers = true)]
        delta: i64,
    },
    /// Move a bottle to the archive with a verdict
    Archive {
        id: String,
        #[arg(long, default_value_t = 0)]
        rating: u8,
        /// yes | maybe | no
        #[arg(long)]
        rebuy: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Restore an archived bottle to the cellar (new identity)
    Restore { id: String },
    /// Delete a record permanently
    Delete {
        id: String,
        /// Delete from the archive instead of the active cellar
        #[arg(long)]
        archived: bool,
    },
}
