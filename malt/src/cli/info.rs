// malt/src/cli/info.rs
use clap::Args;
use colored::Colorize;
use malt_common::config::Config;
use malt_common::error::Result;
use malt_common::registry::Formulary;
use malt_core::keg::KegRegistry;

#[derive(Debug, Args)]
pub struct Info {
    name: String,
}

impl Info {
    pub async fn run(&self, config: &Config) -> Result<()> {
        let formulary = Formulary::load_dir(config.formulary_dir())?;
        let formula = formulary.lookup(&self.name)?;

        println!("{}", formula.name.bold());
        if let Some(description) = &formula.description {
            println!("{description}");
        }
        if let Some(homepage) = &formula.homepage {
            println!("{homepage}");
        }
        println!("Source: {}", formula.source_url);
        println!("SHA256: {}", formula.content_hash);
        if !formula.dependencies.is_empty() {
            println!("Depends on: {}", formula.dependencies.join(", "));
        }
        println!(
            "Install procedure: {}",
            serde_json::to_string_pretty(&formula.install)?
        );

        let kegs = KegRegistry::new(config);
        match kegs.get_installed_keg(&self.name)? {
            Some(keg) => println!("{} {}", "Installed:".green().bold(), keg.path.display()),
            None => println!("{}", "Not installed".yellow()),
        }
        Ok(())
    }
}
