// malt/src/cli/list.rs
use clap::Args;
use malt_common::config::Config;
use malt_common::error::Result;
use malt_common::registry::Formulary;
use malt_core::keg::KegRegistry;

#[derive(Debug, Args)]
pub struct List {
    /// List every formula the formulary knows instead of installed kegs.
    #[arg(long)]
    available: bool,
}

impl List {
    pub async fn run(&self, config: &Config) -> Result<()> {
        if self.available {
            let formulary = Formulary::load_dir(config.formulary_dir())?;
            for name in formulary.names() {
                println!("{name}");
            }
            return Ok(());
        }
        let kegs = KegRegistry::new(config);
        for keg in kegs.list_installed()? {
            println!("{}", keg.name);
        }
        Ok(())
    }
}
