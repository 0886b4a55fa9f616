// malt/src/cli/uninstall.rs
use clap::Args;
use colored::Colorize;
use malt_common::config::Config;
use malt_common::error::Result;
use malt_core::keg::KegRegistry;

#[derive(Debug, Args)]
pub struct Uninstall {
    #[arg(required = true)]
    names: Vec<String>,
}

impl Uninstall {
    pub async fn run(&self, config: &Config) -> Result<()> {
        let kegs = KegRegistry::new(config);
        for name in &self.names {
            kegs.remove_keg(name)?;
            println!("{} Uninstalled {}", "==>".green().bold(), name.bold());
        }
        Ok(())
    }
}
