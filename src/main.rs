#![allow(clippy::doc_markdown)]
#![doc = include_str!("../README.md")]

mod accumulator;
mod api;
mod calendar;
mod catalog;
mod cli;
mod levy;
mod prelude;
mod pricing;
mod quantity;
mod store;
mod tables;
mod tier;

use clap::{Parser, crate_version};

use crate::{cli::Args, prelude::*};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().without_time().compact().init();
    info!(version = crate_version!(), "starting…");

    Args::parse().command.run().await?;

    info!("done!");
    Ok(())
}
