use clap::Parser;

use crate::{cli::CatalogArgs, prelude::*, tables::build_providers_table};

#[derive(Parser)]
pub struct ProvidersArgs {
    #[clap(flatten)]
    catalog: CatalogArgs,
}

impl ProvidersArgs {
    pub fn run(self) -> Result {
        println!("{}", build_providers_table(&self.catalog.load()?));
        Ok(())
    }
}
